//! Persistence backends for batched readings.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use sensewatch_types::Batch;

/// Persistence destination for batches.
///
/// Writes are fire-and-forget from the middleware's point of view; a single
/// writer task feeds each output, so batches of one monitor arrive in the
/// order they were flushed. A channel output applies backpressure to that
/// writer instead of dropping batches.
#[derive(Debug, Clone)]
pub enum Output {
    /// Append batches to a file, one JSON document per line.
    File(PathBuf),

    /// Send batches through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    #[cfg(feature = "tokio")]
    Channel(tokio::sync::mpsc::Sender<Batch>),

    /// Keep batches in memory.
    ///
    /// Use `Output::memory()` to create this variant and get the store.
    Memory(MemoryStore),
}

impl Output {
    /// Create a JSON-lines file output.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sensewatch_sdk::Output;
    ///
    /// let output = Output::file("readings.jsonl");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    /// Create a channel output and return both the output and receiver.
    #[cfg(feature = "tokio")]
    pub fn channel(buffer: usize) -> (Self, tokio::sync::mpsc::Receiver<Batch>) {
        let (tx, rx) = tokio::sync::mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    /// Create an in-memory output and return a handle to its store.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sensewatch_sdk::Output;
    ///
    /// let (output, store) = Output::memory();
    /// assert!(store.batches().is_empty());
    /// ```
    pub fn memory() -> (Self, MemoryStore) {
        let store = MemoryStore::default();
        (Output::Memory(store.clone()), store)
    }

    /// Write a batch to this output.
    #[cfg(feature = "tokio")]
    pub async fn write(&self, batch: &Batch) -> std::io::Result<()> {
        match self {
            Output::File(path) => {
                use tokio::io::AsyncWriteExt;

                let mut line = serde_json::to_vec(batch)?;
                line.push(b'\n');
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                file.write_all(&line).await?;
                file.flush().await?;
            }
            Output::Channel(tx) => {
                // Waits for room: batches are the only copy of the readings
                tx.send(batch.clone()).await.map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "batch receiver closed")
                })?;
            }
            Output::Memory(store) => store.push(batch.clone()),
        }
        Ok(())
    }
}

/// Shared in-memory batch store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    batches: Arc<Mutex<Vec<Batch>>>,
}

impl MemoryStore {
    fn push(&self, batch: Batch) {
        self.batches.lock().push(batch);
    }

    /// Copy of every batch written so far, in write order.
    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().clone()
    }

    /// Total number of readings across all batches.
    pub fn reading_count(&self) -> usize {
        self.batches.lock().iter().map(Batch::len).sum()
    }
}

#[cfg(all(test, feature = "tokio"))]
mod tests {
    use super::*;
    use sensewatch_types::{Metric, MetricValue, MonitorId, Reading};

    fn batch(monitor: u64, n: u64) -> Batch {
        Batch::new(
            MonitorId(monitor),
            Metric::CPU_USAGE,
            (0..n)
                .map(|i| Reading::new(i * 100, MetricValue::Byte(i as i8)))
                .collect(),
        )
    }

    #[tokio::test]
    async fn memory_output_keeps_order() {
        let (output, store) = Output::memory();
        output.write(&batch(1, 2)).await.unwrap();
        output.write(&batch(2, 3)).await.unwrap();

        let batches = store.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].monitor, MonitorId(1));
        assert_eq!(store.reading_count(), 5);
    }

    #[tokio::test]
    async fn file_output_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.jsonl");
        let output = Output::file(&path);

        output.write(&batch(1, 1)).await.unwrap();
        output.write(&batch(1, 2)).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: Batch = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second.monitor, MonitorId(1));
        assert!(second.is_readable());
    }

    #[tokio::test]
    async fn channel_output_forwards() {
        let (output, mut rx) = Output::channel(4);
        output.write(&batch(5, 1)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().monitor, MonitorId(5));
    }

    #[tokio::test]
    async fn full_channel_waits_for_reader() {
        let (output, mut rx) = Output::channel(1);
        output.write(&batch(1, 1)).await.unwrap();

        let writer = tokio::spawn({
            let output = output.clone();
            async move { output.write(&batch(2, 1)).await }
        });
        tokio::task::yield_now().await;
        assert!(!writer.is_finished());

        assert_eq!(rx.recv().await.unwrap().monitor, MonitorId(1));
        writer.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().monitor, MonitorId(2));
    }

    #[tokio::test]
    async fn closed_channel_reports_error() {
        let (output, rx) = Output::channel(1);
        drop(rx);
        let err = output.write(&batch(1, 1)).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}
