use std::path::Path;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::entry::EventRecord;
use crate::writer::EventWriter;

/// Channel buffer size used between producers and the background writer task.
const CHANNEL_BUFFER: usize = 1024;

/// Flush the writer at most every this many seconds when the channel is idle.
const FLUSH_INTERVAL_SECS: u64 = 1;

/// A cheap, cloneable handle used to submit [`EventRecord`] values into the
/// background event-log writer.
///
/// `EventSink` is `Clone + Send + Sync` so it can be shared freely across the
/// listeners and every per-connection relay task.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<EventRecord>,
}

impl EventSink {
    /// Spawn the background writer task and return a `(sink, join_handle)`
    /// pair.
    ///
    /// The writer opens (or creates) the file at `path` in append mode and
    /// begins draining records from the internal channel. The background task
    /// will:
    ///
    /// * Write each record as a JSON line via [`EventWriter`].
    /// * Flush periodically (every ~1 second of channel inactivity).
    /// * Flush once more when the last `EventSink` clone is dropped and the
    ///   channel closes, then exit cleanly.
    ///
    /// The background task never panics; I/O errors are logged via
    /// `tracing::error` and the record is skipped.
    pub async fn start(
        path: impl AsRef<Path>,
    ) -> Result<(Self, JoinHandle<()>), crate::writer::EventWriteError> {
        let (tx, rx) = mpsc::channel::<EventRecord>(CHANNEL_BUFFER);

        let mut writer = EventWriter::new(path).await?;

        let handle = tokio::spawn(async move {
            run_writer_loop(&mut writer, rx).await;
        });

        Ok((Self { tx }, handle))
    }

    /// Send an event record to the background writer.
    ///
    /// If the channel is full this will wait asynchronously until space is
    /// available. If the background task has already exited (e.g. after a
    /// fatal I/O error) the record is silently dropped and a warning is
    /// logged.
    pub async fn log(&self, record: EventRecord) {
        if let Err(err) = self.tx.send(record).await {
            tracing::warn!(
                event_type = ?err.0.event_type,
                "event sink channel closed — record dropped"
            );
        }
    }
}

/// Core loop executed inside the background task.
///
/// Reads records from the channel and writes them to the event log. When the
/// channel has no records ready for [`FLUSH_INTERVAL_SECS`] the writer is
/// flushed. On channel close a final flush is performed.
async fn run_writer_loop(writer: &mut EventWriter, mut rx: mpsc::Receiver<EventRecord>) {
    let flush_interval = tokio::time::Duration::from_secs(FLUSH_INTERVAL_SECS);
    let mut dirty = false;

    loop {
        // Wait for the next record, but time out so we can periodically flush.
        let maybe_record = tokio::time::timeout(flush_interval, rx.recv()).await;

        match maybe_record {
            // Received a record before the timeout.
            Ok(Some(record)) => {
                if let Err(err) = writer.write(&record).await {
                    tracing::error!(%err, "failed to write event record");
                } else {
                    dirty = true;
                }
            }
            // Channel closed — perform final flush and exit.
            Ok(None) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "failed to flush event log on shutdown");
                    }
                }
                tracing::debug!("event writer background task shutting down");
                return;
            }
            // Timeout — flush if we have outstanding writes.
            Err(_) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "periodic event log flush failed");
                    } else {
                        dirty = false;
                    }
                }
            }
        }
    }
}
