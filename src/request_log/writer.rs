//! Fire-and-forget persistence of finished log entries
//!
//! [`LogDispatcher`] is the handle the interceptor holds. Each sink has its
//! own bounded channel and background writer task:
//! - the store writer batches inserts (`batch_size` entries or
//!   `flush_interval`, whichever comes first)
//! - the file writer is the single owner of the day-files
//!
//! Sends never wait. A full buffer drops the entry with a warning; a failing
//! sink is reported and does not affect the other sink.

use super::entry::LogEntry;
use super::file_sink::FileSink;
use super::store::LogStore;
use crate::config::WriterConfig;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Store,
    File,
}

impl Sink {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::File => "file",
        }
    }
}

/// Non-blocking handle to the sink writer tasks
#[derive(Clone)]
pub struct LogDispatcher {
    store_tx: mpsc::Sender<LogEntry>,
    file_tx: mpsc::Sender<LogEntry>,
}

/// Join handles of the writer tasks
///
/// The tasks exit once every [`LogDispatcher`] clone has been dropped and
/// their queues are drained.
pub struct WriterTasks {
    store: JoinHandle<()>,
    file: JoinHandle<()>,
}

impl WriterTasks {
    /// Wait for both writers to drain and exit
    pub async fn join(self) {
        for (sink, handle) in [(Sink::Store, self.store), (Sink::File, self.file)] {
            if let Err(e) = handle.await {
                tracing::error!(sink = sink.as_str(), error = %e, "Log writer task failed");
            }
        }
    }
}

impl LogDispatcher {
    /// Spawn the store and file writer tasks
    ///
    /// # Example
    ///
    /// ```ignore
    /// let (dispatcher, tasks) = LogDispatcher::spawn(store, file_sink, &config.writer);
    /// dispatcher.dispatch(entry); // returns immediately
    /// drop(dispatcher);
    /// tasks.join().await;         // queued entries are flushed
    /// ```
    pub fn spawn(
        store: Arc<dyn LogStore>,
        file_sink: FileSink,
        config: &WriterConfig,
    ) -> (Self, WriterTasks) {
        let capacity = config.max_buffer_size.max(1);
        let batch_size = config.batch_size.max(1);
        let flush_interval = Duration::from_millis(config.flush_interval_ms.max(1));

        let (store_tx, store_rx) = mpsc::channel(capacity);
        let (file_tx, file_rx) = mpsc::channel(capacity);

        let store_task = spawn_writer(
            Sink::Store,
            batch_loop(Sink::Store, store_rx, batch_size, flush_interval, move |batch| {
                let store = store.clone();
                async move { flush_to_store(store.as_ref(), batch).await }
            }),
        );

        let file_task = spawn_writer(
            Sink::File,
            batch_loop(Sink::File, file_rx, batch_size, flush_interval, move |batch| {
                let file_sink = file_sink.clone();
                async move { flush_to_file(&file_sink, batch).await }
            }),
        );

        (
            Self { store_tx, file_tx },
            WriterTasks {
                store: store_task,
                file: file_task,
            },
        )
    }

    /// Queue an entry for both sinks
    pub fn dispatch(&self, entry: LogEntry) {
        enqueue(&self.store_tx, Sink::Store, entry.clone());
        enqueue(&self.file_tx, Sink::File, entry);
    }

    /// Queue an entry for the day-files only
    pub fn dispatch_to_file(&self, entry: LogEntry) {
        enqueue(&self.file_tx, Sink::File, entry);
    }
}

fn enqueue(tx: &mpsc::Sender<LogEntry>, sink: Sink, entry: LogEntry) {
    match tx.try_send(entry) {
        Ok(()) => {}
        Err(TrySendError::Full(entry)) => {
            tracing::warn!(
                sink = sink.as_str(),
                id = %entry.id,
                "Log buffer full, dropping entry"
            );
            crate::metrics::record_entry_dropped(sink.as_str());
        }
        Err(TrySendError::Closed(entry)) => {
            tracing::error!(
                sink = sink.as_str(),
                id = %entry.id,
                "Log writer is not running, dropping entry"
            );
            crate::metrics::record_entry_dropped(sink.as_str());
        }
    }
}

fn spawn_writer<F>(sink: Sink, writer: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        match std::panic::AssertUnwindSafe(writer).catch_unwind().await {
            Ok(()) => tracing::debug!(sink = sink.as_str(), "Log writer shut down"),
            Err(e) => tracing::error!(sink = sink.as_str(), panic = ?e, "Log writer panicked"),
        }
    })
}

/// Collect entries into batches and hand each batch to `flush`
///
/// Returns after the channel is closed and the last batch is flushed. A
/// panicking flush loses its batch only; the loop keeps draining.
async fn batch_loop<F, Fut>(
    sink: Sink,
    mut rx: mpsc::Receiver<LogEntry>,
    batch_size: usize,
    flush_interval: Duration,
    mut flush: F,
) where
    F: FnMut(Vec<LogEntry>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut batch: Vec<LogEntry> = Vec::with_capacity(batch_size);

    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(entry) => {
                    batch.push(entry);
                    if batch.len() >= batch_size {
                        guarded_flush(sink, &mut flush, &mut batch).await;
                    }
                }
                None => {
                    if !batch.is_empty() {
                        guarded_flush(sink, &mut flush, &mut batch).await;
                    }
                    break;
                }
            },

            _ = ticker.tick() => {
                if !batch.is_empty() {
                    guarded_flush(sink, &mut flush, &mut batch).await;
                }
            }
        }
    }
}

async fn guarded_flush<F, Fut>(sink: Sink, flush: &mut F, batch: &mut Vec<LogEntry>)
where
    F: FnMut(Vec<LogEntry>) -> Fut,
    Fut: Future<Output = ()>,
{
    let count = batch.len();
    let pending = flush(std::mem::take(batch));

    if let Err(e) = std::panic::AssertUnwindSafe(pending).catch_unwind().await {
        tracing::error!(
            sink = sink.as_str(),
            count = count,
            panic = ?e,
            "Log flush panicked, batch dropped"
        );
        crate::metrics::record_persist_failure(sink.as_str(), count);
    }
}

async fn flush_to_store(store: &dyn LogStore, batch: Vec<LogEntry>) {
    let count = batch.len();
    let start = Instant::now();

    match store.save_batch(&batch).await {
        Ok(()) => {
            tracing::debug!(
                count = count,
                duration_ms = start.elapsed().as_millis() as u64,
                "Flushed log batch to store"
            );
        }
        Err(e) => {
            tracing::error!(
                error = %format!("{:#}", e),
                count = count,
                "Failed to persist log batch to store"
            );
            crate::metrics::record_persist_failure(Sink::Store.as_str(), count);
        }
    }
}

async fn flush_to_file(file_sink: &FileSink, batch: Vec<LogEntry>) {
    let count = batch.len();
    let start = Instant::now();

    match file_sink.append_batch(&batch).await {
        Ok(()) => {
            tracing::debug!(
                count = count,
                duration_ms = start.elapsed().as_millis() as u64,
                "Flushed log batch to day-file"
            );
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                count = count,
                "Failed to append log batch to day-file"
            );
            crate::metrics::record_persist_failure(Sink::File.as_str(), count);
        }
    }
}
