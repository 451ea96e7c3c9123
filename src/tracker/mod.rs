//! Elapsed work time of a single task.
//!
//! [ElapsedTimeTracker] keeps an hours/minutes pair that can be changed by hand or accrued
//! automatically while tracking is running. Every mutation publishes an [ElapsedTimeChanged] with
//! snapshots taken right before and right after it.
//!
//! Minutes are never carried into hours by `set_*`/`increment_*`. Only the tick converts the
//! minutes it accrued into an hours/minutes pair before adding them.

pub mod error;
pub mod snapshot;
mod subscribers;

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use error::TrackerError;
use snapshot::{ElapsedTimeChanged, ElapsedTimeSnapshot};
use subscribers::Subscribers;
pub use subscribers::SubscriptionId;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::utils::clock::Clock;

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(30);
pub const MAX_TICK_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

struct TrackerState {
    hours: u32,
    minutes: u32,
    running: bool,
    /// Minutes accrued by ticks that were not yet added to `hours`/`minutes`.
    accumulated_minutes: f64,
    ticker: Option<CancellationToken>,
}

struct Shared {
    task_id: Arc<str>,
    period: Duration,
    state: Mutex<TrackerState>,
    subscribers: Subscribers,
    clock: Box<dyn Clock>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_of(&self, state: &TrackerState) -> ElapsedTimeSnapshot {
        ElapsedTimeSnapshot::new(self.task_id.clone(), state.hours, state.minutes)
    }

    /// Runs `mutation` under the state lock and publishes the before/after pair once the lock is
    /// released. Nothing is published when `mutation` returns false.
    fn mutate(&self, mutation: impl FnOnce(&mut TrackerState) -> bool) -> bool {
        let event = {
            let mut state = self.lock();
            let before = self.snapshot_of(&state);
            if !mutation(&mut state) {
                return false;
            }
            ElapsedTimeChanged {
                before,
                after: self.snapshot_of(&state),
            }
        };
        trace!("Publishing {event:?}");
        self.subscribers.publish(&event);
        true
    }

    fn tick(&self, token: &CancellationToken) {
        let period_minutes = self.period.as_secs_f64() / 60.;
        self.mutate(|state| {
            // Stop won the race for the lock.
            if token.is_cancelled() {
                return false;
            }
            state.accumulated_minutes += period_minutes;
            let whole = state.accumulated_minutes.floor();
            state.accumulated_minutes -= whole;

            let whole = whole as u32;
            state.hours = state.hours.saturating_add(whole / 60);
            state.minutes = state.minutes.saturating_add(whole % 60);
            true
        });
    }
}

/// Tick loop. Runs until `token` is cancelled.
async fn run_ticker(shared: Arc<Shared>, token: CancellationToken) {
    let mut tick_point = shared.clock.instant();
    loop {
        let Some(next) = tick_point.checked_add(shared.period) else {
            warn!("Next tick is out of range, stopping the tick loop");
            return;
        };
        tick_point = next;
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Tick loop stopped");
                return;
            }
            _ = shared.clock.sleep_until(tick_point) => ()
        }
        shared.tick(&token);
    }
}

/// Hours/minutes accumulated against one task.
///
/// All state sits behind one mutex, so manual changes and ticks never lose updates. Subscribers
/// are called synchronously on the thread doing the mutation; for ticks that is the tokio worker
/// running the tick loop. Moving notifications onto a UI thread is the subscriber's job.
pub struct ElapsedTimeTracker {
    shared: Arc<Shared>,
}

impl ElapsedTimeTracker {
    pub fn new(
        task_id: impl Into<Arc<str>>,
        period: Duration,
        clock: Box<dyn Clock>,
    ) -> Result<Self, TrackerError> {
        let task_id = task_id.into();
        if task_id.is_empty() {
            return Err(TrackerError::InvalidArgument("task id must not be empty"));
        }
        if period.is_zero() {
            return Err(TrackerError::InvalidArgument("tick period must be positive"));
        }
        if period > MAX_TICK_PERIOD {
            return Err(TrackerError::InvalidArgument("tick period must be at most a day"));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                task_id,
                period,
                state: Mutex::new(TrackerState {
                    hours: 0,
                    minutes: 0,
                    running: false,
                    accumulated_minutes: 0.,
                    ticker: None,
                }),
                subscribers: Subscribers::default(),
                clock,
            }),
        })
    }

    /// Restores previously recorded time without publishing anything.
    pub fn with_elapsed(self, hours: u32, minutes: u32) -> Self {
        {
            let mut state = self.shared.lock();
            state.hours = hours;
            state.minutes = minutes;
        }
        self
    }

    pub fn task_id(&self) -> &Arc<str> {
        &self.shared.task_id
    }

    pub fn period(&self) -> Duration {
        self.shared.period
    }

    pub fn hours(&self) -> u32 {
        self.shared.lock().hours
    }

    pub fn minutes(&self) -> u32 {
        self.shared.lock().minutes
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn snapshot(&self) -> ElapsedTimeSnapshot {
        self.shared.snapshot_of(&self.shared.lock())
    }

    /// Returns whether the value changed. Equal values publish nothing.
    pub fn set_hours(&self, value: u32) -> bool {
        self.shared.mutate(|state| {
            if state.hours == value {
                return false;
            }
            state.hours = value;
            true
        })
    }

    /// Returns whether the value changed. Equal values publish nothing.
    pub fn set_minutes(&self, value: u32) -> bool {
        self.shared.mutate(|state| {
            if state.minutes == value {
                return false;
            }
            state.minutes = value;
            true
        })
    }

    pub fn increment_hours(&self) {
        self.shared.mutate(|state| {
            state.hours = state.hours.saturating_add(1);
            true
        });
    }

    pub fn increment_minutes(&self) {
        self.shared.mutate(|state| {
            state.minutes = state.minutes.saturating_add(1);
            true
        });
    }

    /// Starts accruing time every [period](Self::period). Does nothing when already running, in
    /// particular the accumulator is left alone.
    ///
    /// Fails without touching any state when called outside a tokio runtime.
    pub fn start_tracking(&self) -> Result<(), TrackerError> {
        let runtime = Handle::try_current().map_err(|_| TrackerError::NoRuntime)?;
        let token = {
            let mut state = self.shared.lock();
            if state.running {
                debug!(task_id = %self.shared.task_id, "Tracking already running");
                return Ok(());
            }
            state.running = true;
            state.accumulated_minutes = 0.;
            let token = CancellationToken::new();
            state.ticker = Some(token.clone());
            token
        };

        let span = info_span!("tracking", task_id = %self.shared.task_id);
        runtime.spawn(run_ticker(self.shared.clone(), token).instrument(span));
        info!(task_id = %self.shared.task_id, period = ?self.shared.period, "Started tracking");
        Ok(())
    }

    /// Stops the tick loop. Does nothing when not running.
    pub fn stop_tracking(&self) {
        let mut state = self.shared.lock();
        if !state.running {
            debug!(task_id = %self.shared.task_id, "Tracking already stopped");
            return;
        }
        if let Some(token) = state.ticker.take() {
            token.cancel();
        }
        state.running = false;
        info!(task_id = %self.shared.task_id, "Stopped tracking");
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&ElapsedTimeChanged) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.shared.subscribers.add(Arc::new(callback))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.subscribers.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }
}

impl Drop for ElapsedTimeTracker {
    fn drop(&mut self) {
        if let Some(token) = self.shared.lock().ticker.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::time::Instant;

    use crate::{
        tracker::{
            error::TrackerError,
            snapshot::{ElapsedTimeChanged, ElapsedTimeSnapshot},
            ElapsedTimeTracker, DEFAULT_TICK_PERIOD, MAX_TICK_PERIOD,
        },
        utils::{
            clock::{Clock, SystemClock},
            logging::TEST_LOGGING,
        },
    };

    /// Lets a full tick period pass after one real millisecond.
    struct HurriedClock;

    #[async_trait]
    impl Clock for HurriedClock {
        fn time(&self) -> DateTime<Utc> {
            Utc::now()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, _instant: Instant) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn tracker(period: Duration) -> ElapsedTimeTracker {
        ElapsedTimeTracker::new("T1", period, Box::new(SystemClock)).unwrap()
    }

    fn record_events(tracker: &ElapsedTimeTracker) -> Arc<Mutex<Vec<ElapsedTimeChanged>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        tracker.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    fn snapshot(hours: u32, minutes: u32) -> ElapsedTimeSnapshot {
        ElapsedTimeSnapshot::new("T1".into(), hours, minutes)
    }

    #[test]
    fn rejects_empty_task_id() {
        let result = ElapsedTimeTracker::new("", DEFAULT_TICK_PERIOD, Box::new(SystemClock));
        assert!(matches!(result, Err(TrackerError::InvalidArgument(_))));
    }

    #[test]
    fn rejects_zero_period() {
        let result = ElapsedTimeTracker::new("T1", Duration::ZERO, Box::new(SystemClock));
        assert!(matches!(result, Err(TrackerError::InvalidArgument(_))));
    }

    #[test]
    fn rejects_periods_longer_than_a_day() {
        let result = ElapsedTimeTracker::new(
            "T1",
            MAX_TICK_PERIOD + Duration::from_secs(1),
            Box::new(SystemClock),
        );
        assert!(matches!(result, Err(TrackerError::InvalidArgument(_))));

        let result = ElapsedTimeTracker::new("T1", Duration::MAX, Box::new(SystemClock));
        assert!(matches!(result, Err(TrackerError::InvalidArgument(_))));
        assert!(ElapsedTimeTracker::new("T1", MAX_TICK_PERIOD, Box::new(SystemClock)).is_ok());
    }

    #[test]
    fn starting_outside_a_runtime_changes_nothing() {
        let tracker = tracker(DEFAULT_TICK_PERIOD);

        assert_eq!(tracker.start_tracking(), Err(TrackerError::NoRuntime));
        assert!(!tracker.is_running());

        // A later start inside a runtime is not blocked by the failed one.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async { tracker.start_tracking() }).unwrap();
        assert!(tracker.is_running());
        tracker.stop_tracking();
    }

    #[test]
    fn set_hours_publishes_before_and_after() {
        let tracker = tracker(DEFAULT_TICK_PERIOD);
        let events = record_events(&tracker);

        assert!(tracker.set_hours(2));
        assert!(!tracker.set_hours(2));

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![ElapsedTimeChanged {
                before: snapshot(0, 0),
                after: snapshot(2, 0),
            }]
        );
    }

    #[test]
    fn only_changing_sets_publish() {
        let tracker = tracker(DEFAULT_TICK_PERIOD);
        let events = record_events(&tracker);

        let calls = [(true, 1), (true, 1), (false, 5), (true, 3), (false, 5), (false, 0)];
        let mut expected = 0;
        let (mut hours, mut minutes) = (0, 0);
        for (is_hours, value) in calls {
            let changed = if is_hours {
                let changed = hours != value;
                hours = value;
                assert_eq!(tracker.set_hours(value), changed);
                changed
            } else {
                let changed = minutes != value;
                minutes = value;
                assert_eq!(tracker.set_minutes(value), changed);
                changed
            };
            expected += changed as usize;
        }

        assert_eq!(events.lock().unwrap().len(), expected);
        assert_eq!(tracker.snapshot(), snapshot(3, 0));
    }

    #[test]
    fn increments_always_publish() {
        let tracker = tracker(DEFAULT_TICK_PERIOD);
        let events = record_events(&tracker);

        for _ in 0..5 {
            tracker.increment_hours();
        }
        tracker.increment_minutes();

        assert_eq!(tracker.hours(), 5);
        assert_eq!(tracker.minutes(), 1);
        assert_eq!(events.lock().unwrap().len(), 6);
    }

    #[test]
    fn minutes_do_not_carry_into_hours() {
        let tracker = tracker(DEFAULT_TICK_PERIOD).with_elapsed(1, 59);
        tracker.increment_minutes();
        assert_eq!(tracker.snapshot(), snapshot(1, 60));
        assert_eq!(tracker.snapshot().total_minutes(), 120);
    }

    #[test]
    fn unsubscribed_callbacks_stop_receiving() {
        let tracker = tracker(DEFAULT_TICK_PERIOD);
        let events = Arc::new(Mutex::new(0));
        let sink = events.clone();
        let id = tracker.subscribe(move |_| *sink.lock().unwrap() += 1);

        tracker.increment_hours();
        assert!(tracker.unsubscribe(id));
        assert!(!tracker.unsubscribe(id));
        tracker.increment_hours();

        assert_eq!(*events.lock().unwrap(), 1);
        assert_eq!(tracker.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_before_first_tick_keeps_time() {
        *TEST_LOGGING;
        let tracker = tracker(DEFAULT_TICK_PERIOD);
        let events = record_events(&tracker);

        tracker.start_tracking().unwrap();
        tracker.stop_tracking();
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert!(!tracker.is_running());
        assert_eq!(tracker.snapshot(), snapshot(0, 0));
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_accrue_elapsed_minutes() {
        let tracker = tracker(DEFAULT_TICK_PERIOD);
        let events = record_events(&tracker);

        tracker.start_tracking().unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;

        // Two ticks: the first accrues half a minute, the second completes it.
        assert_eq!(tracker.snapshot(), snapshot(0, 1));
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].is_unchanged());
        assert_eq!(events[1].before, snapshot(0, 0));
        assert_eq!(events[1].after, snapshot(0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn consumed_minutes_leave_the_accumulator() {
        let tracker = tracker(Duration::from_secs(60));
        tracker.start_tracking().unwrap();
        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        tracker.stop_tracking();

        assert_eq!(tracker.snapshot(), snapshot(0, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn long_periods_accrue_hours() {
        let tracker = tracker(Duration::from_secs(90 * 60));
        tracker.start_tracking().unwrap();
        tokio::time::sleep(Duration::from_secs(90 * 60 + 1)).await;
        tracker.stop_tracking();

        assert_eq!(tracker.snapshot(), snapshot(1, 30));
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_a_no_op() {
        let tracker = tracker(DEFAULT_TICK_PERIOD);
        let events = record_events(&tracker);

        tracker.start_tracking().unwrap();
        tokio::time::sleep(Duration::from_secs(45)).await;
        tracker.start_tracking().unwrap();
        assert!(tracker.is_running());
        tokio::time::sleep(Duration::from_secs(16)).await;

        // A reset accumulator or a second tick loop would both show up here.
        assert_eq!(tracker.snapshot(), snapshot(0, 1));
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resets_the_accumulator() {
        let tracker = tracker(DEFAULT_TICK_PERIOD);

        tracker.start_tracking().unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;
        tracker.stop_tracking();
        tracker.stop_tracking();
        tracker.start_tracking().unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(tracker.snapshot(), snapshot(0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_tracker_stops_ticks() {
        let tracker = tracker(DEFAULT_TICK_PERIOD);
        let events = record_events(&tracker);

        tracker.start_tracking().unwrap();
        drop(tracker);
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_changes_interleave_with_ticks() {
        let tracker = tracker(Duration::from_secs(60));

        tracker.start_tracking().unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        tracker.set_hours(3);
        tokio::time::sleep(Duration::from_secs(60)).await;
        tracker.stop_tracking();

        assert_eq!(tracker.snapshot(), snapshot(3, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn day_long_periods_keep_ticking() {
        let tracker = tracker(MAX_TICK_PERIOD);
        tracker.start_tracking().unwrap();
        tokio::time::sleep(MAX_TICK_PERIOD * 2 + Duration::from_secs(1)).await;
        tracker.stop_tracking();

        assert_eq!(tracker.snapshot(), snapshot(48, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_and_ticks_lose_nothing() {
        const THREADS: usize = 4;
        const INCREMENTS: usize = 250;

        let tracker = Arc::new(
            ElapsedTimeTracker::new("T1", Duration::from_secs(60), Box::new(HurriedClock))
                .unwrap(),
        );
        let events = record_events(&tracker);

        // Every tick of a one minute period adds exactly one minute, as does every increment.
        tracker.start_tracking().unwrap();
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::task::spawn_blocking(move || {
                    for _ in 0..INCREMENTS {
                        tracker.increment_minutes();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        tracker.stop_tracking();
        // Lets a tick that took the lock just before the stop finish publishing.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let total = tracker.snapshot().total_minutes();
        let events = events.lock().unwrap();
        assert!(total >= (THREADS * INCREMENTS) as u64);
        assert_eq!(events.len() as u64, total);

        // Serialized mutations each see a distinct predecessor.
        let mut afters: Vec<_> = events
            .iter()
            .map(|event| event.after.total_minutes())
            .collect();
        afters.sort_unstable();
        assert_eq!(afters, (1..=total).collect::<Vec<_>>());
        assert!(events
            .iter()
            .all(|event| event.after.total_minutes() == event.before.total_minutes() + 1));
    }
}
