use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, warn};

use crate::{
    tracker::snapshot::{ElapsedTimeChanged, ElapsedTimeSnapshot},
    utils::clock::Clock,
};

use super::{entities::TaskEntity, storage::TaskStorage};

/// Persists tracker changes of one task. Runs until every sender of the channel is dropped.
pub struct TrackingRecorder {
    receiver: Receiver<ElapsedTimeChanged>,
    storage: Arc<dyn TaskStorage>,
    clock: Box<dyn Clock>,
    task: TaskEntity,
}

impl TrackingRecorder {
    pub fn new(
        receiver: Receiver<ElapsedTimeChanged>,
        storage: Arc<dyn TaskStorage>,
        clock: Box<dyn Clock>,
        task: TaskEntity,
    ) -> Self {
        Self {
            receiver,
            storage,
            clock,
            task,
        }
    }

    /// Saves changes until every sender is dropped.
    pub async fn run(&mut self) {
        while let Some(event) = self.receiver.recv().await {
            debug!("Recording {:?}", event);
            if *event.task_id() != self.task.id {
                warn!(
                    "Ignoring change of {} while recording {}",
                    event.task_id(),
                    self.task.id
                );
                continue;
            }
            match self.record(&event.after).await {
                Ok(_) => {
                    info!("Recorded {} for {}", event.after, event.task_id())
                }
                Err(e) => {
                    error!("Error recording {:?}: {e:?}", event)
                }
            }
        }

        self.receiver.close();
    }

    /// Saves `total` once more. Changes dropped on the way or whose save failed are covered by
    /// it. Returns the task as stored.
    pub async fn finish(mut self, total: &ElapsedTimeSnapshot) -> Result<TaskEntity> {
        self.record(total).await?;
        Ok(self.task)
    }

    /// Writes only the elapsed fields. The rest of the stored task may have been changed by
    /// another command while tracking runs.
    async fn record(&mut self, total: &ElapsedTimeSnapshot) -> Result<()> {
        let Some(mut task) = self.storage.get(&self.task.id).await? else {
            bail!("Task {} was removed while tracking", self.task.id);
        };
        // Unchanged ticks still mark the task as being worked on.
        task.hours = total.hours;
        task.minutes = total.minutes;
        task.last_tracked = Some(self.clock.time());

        self.storage.save(task.clone()).await?;
        self.task = task;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;

    use super::TrackingRecorder;
    use crate::{
        tasks::{entities::TaskEntity, storage::MockTaskStorage},
        tracker::snapshot::{ElapsedTimeChanged, ElapsedTimeSnapshot},
        utils::{clock::FixedClock, logging::TEST_LOGGING},
    };

    fn snapshot(task_id: &str, (hours, minutes): (u32, u32)) -> ElapsedTimeSnapshot {
        ElapsedTimeSnapshot::new(task_id.into(), hours, minutes)
    }

    fn change(task_id: &str, before: (u32, u32), after: (u32, u32)) -> ElapsedTimeChanged {
        ElapsedTimeChanged {
            before: snapshot(task_id, before),
            after: snapshot(task_id, after),
        }
    }

    fn task() -> TaskEntity {
        TaskEntity::new("t1".into(), "design", Utc.timestamp_opt(1_530_662_400, 0).unwrap())
    }

    #[tokio::test]
    async fn saves_every_change_of_the_task() -> Result<()> {
        *TEST_LOGGING;
        let now = Utc.timestamp_opt(1_530_700_000, 0).unwrap();
        let mut storage = MockTaskStorage::new();
        storage.expect_get().returning(|_| Ok(Some(task())));
        let saved = Arc::new(Mutex::new(Vec::new()));
        let sink = saved.clone();
        storage
            .expect_save()
            .withf(|task| &*task.id == "t1")
            .times(3)
            .returning(move |task| {
                sink.lock().unwrap().push((task.hours, task.minutes));
                Ok(())
            });

        let (sender, receiver) = mpsc::channel(10);
        let mut recorder =
            TrackingRecorder::new(receiver, Arc::new(storage), Box::new(FixedClock(now)), task());

        sender.send(change("t1", (0, 0), (0, 1))).await?;
        sender.send(change("other", (0, 0), (5, 0))).await?;
        sender.send(change("t1", (0, 1), (1, 1))).await?;
        drop(sender);

        recorder.run().await;
        let recorded = recorder.finish(&snapshot("t1", (1, 1))).await?;
        assert_eq!(recorded.hours, 1);
        assert_eq!(recorded.minutes, 1);
        assert_eq!(recorded.last_tracked, Some(now));
        assert_eq!(*saved.lock().unwrap(), [(0, 1), (1, 1), (1, 1)]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_saves_do_not_stop_recording() -> Result<()> {
        let now = Utc.timestamp_opt(1_530_700_000, 0).unwrap();
        let mut storage = MockTaskStorage::new();
        storage.expect_get().returning(|_| Ok(Some(task())));
        let mut calls = 0;
        storage.expect_save().times(3).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(anyhow!("disk full"))
            } else {
                Ok(())
            }
        });

        let (sender, receiver) = mpsc::channel(10);
        let mut recorder =
            TrackingRecorder::new(receiver, Arc::new(storage), Box::new(FixedClock(now)), task());

        sender.send(change("t1", (0, 0), (0, 1))).await?;
        sender.send(change("t1", (0, 1), (0, 2))).await?;
        drop(sender);

        recorder.run().await;
        let recorded = recorder.finish(&snapshot("t1", (0, 2))).await?;
        assert_eq!(recorded.minutes, 2);
        Ok(())
    }

    #[tokio::test]
    async fn other_fields_are_taken_from_storage() -> Result<()> {
        let now = Utc.timestamp_opt(1_530_700_000, 0).unwrap();
        let mut storage = MockTaskStorage::new();
        // Renamed by another command after tracking started.
        storage.expect_get().returning(|_| {
            let mut task = task();
            task.name = "design v2".into();
            Ok(Some(task))
        });
        storage
            .expect_save()
            .withf(|task| task.name == "design v2" && task.minutes == 1)
            .times(1)
            .returning(|_| Ok(()));

        let (sender, receiver) = mpsc::channel(10);
        drop(sender);
        let mut recorder =
            TrackingRecorder::new(receiver, Arc::new(storage), Box::new(FixedClock(now)), task());

        recorder.run().await;
        let recorded = recorder.finish(&snapshot("t1", (0, 1))).await?;
        assert_eq!(recorded.name, "design v2");
        Ok(())
    }

    #[tokio::test]
    async fn removed_tasks_are_not_recreated() {
        let now = Utc.timestamp_opt(1_530_700_000, 0).unwrap();
        let mut storage = MockTaskStorage::new();
        storage.expect_get().returning(|_| Ok(None));
        storage.expect_save().never();

        let (_sender, receiver) = mpsc::channel(10);
        let recorder =
            TrackingRecorder::new(receiver, Arc::new(storage), Box::new(FixedClock(now)), task());

        assert!(recorder.finish(&snapshot("t1", (0, 1))).await.is_err());
    }
}
