use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::{
    settings::Settings,
    tasks::{entities::TaskEntity, recorder::TrackingRecorder, storage::TaskStorage},
    tracker::snapshot::ElapsedTimeChanged,
    utils::clock::Clock,
};

use super::commands::open_editor;

const CHANGE_BUFFER: usize = 16;

/// Tracks `id` until `shutdown` is cancelled, persisting every change on the way. The final total
/// is saved once more after tracking stops and the stored task is returned.
pub async fn track_task(
    storage: Arc<dyn TaskStorage>,
    id: &str,
    settings: &Settings,
    clock: impl Fn() -> Box<dyn Clock>,
    shutdown: CancellationToken,
) -> Result<TaskEntity> {
    let editor = open_editor(&*storage, id, settings, clock()).await?;

    let (sender, receiver) = mpsc::channel::<ElapsedTimeChanged>(CHANGE_BUFFER);
    let subscription = editor.tracker().subscribe(move |event| {
        // The tick loop must never wait for the disk.
        if let Err(e) = sender.try_send(event.clone()) {
            warn!("Dropped change {e:?}");
        }
    });
    let mut recorder = TrackingRecorder::new(receiver, storage, clock(), editor.to_entity());

    editor.tracker().start_tracking()?;
    println!(
        "Tracking {} ({}), press Ctrl-C to stop",
        editor.draft().name,
        editor.displayed_total()
    );

    tokio::join!(
        async {
            shutdown.cancelled().await;
            editor.tracker().stop_tracking();
            // Dropping the sender lets the recorder drain and finish.
            editor.tracker().unsubscribe(subscription);
        },
        recorder
            .run()
            .instrument(info_span!("Recording changes", task_id = %editor.id())),
    );

    // Changes may have been dropped while the recorder waited for the disk.
    let recorded = recorder.finish(&editor.tracker().snapshot()).await?;
    info!("Finished tracking {} at {}h {}m", recorded.id, recorded.hours, recorded.minutes);
    Ok(recorded)
}
