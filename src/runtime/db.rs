//! The db task: hands batches to the persistence output.

use sensewatch_sdk::Output;
use sensewatch_types::{Batch, SchemaVersion};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Write every batch in arrival order until all senders are gone.
pub(crate) async fn run(output: Option<Output>, mut rx: mpsc::UnboundedReceiver<Batch>) {
    info!(
        persisting = output.is_some(),
        layout = %SchemaVersion::current(),
        "db task starting"
    );
    let mut written = 0usize;

    while let Some(batch) = rx.recv().await {
        let Some(output) = &output else {
            debug!(monitor = %batch.monitor, readings = batch.len(), "no output, batch dropped");
            continue;
        };
        match output.write(&batch).await {
            Ok(()) => written += 1,
            Err(e) => warn!(monitor = %batch.monitor, "batch write failed: {}", e),
        }
    }

    info!(written, "db task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensewatch_types::{Metric, MetricValue, MonitorId, Reading};

    fn batch(monitor: u64) -> Batch {
        Batch::new(
            MonitorId(monitor),
            Metric::CPU_USAGE,
            vec![Reading::new(0, MetricValue::Byte(1))],
        )
    }

    #[tokio::test]
    async fn slow_channel_reader_loses_nothing() {
        let (output, mut out_rx) = Output::channel(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(Some(output), rx));

        for monitor in 1..=3 {
            tx.send(batch(monitor)).unwrap();
        }
        drop(tx);

        let mut received = Vec::new();
        while let Some(batch) = out_rx.recv().await {
            received.push(batch.monitor);
        }
        task.await.unwrap();
        assert_eq!(received, vec![MonitorId(1), MonitorId(2), MonitorId(3)]);
    }

    #[tokio::test]
    async fn writes_until_senders_drop() {
        let (output, store) = Output::memory();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(Some(output), rx));

        for monitor in 1..=3 {
            tx.send(batch(monitor)).unwrap();
        }
        drop(tx);
        task.await.unwrap();

        let monitors: Vec<_> = store.batches().iter().map(|b| b.monitor).collect();
        assert_eq!(monitors, vec![MonitorId(1), MonitorId(2), MonitorId(3)]);
    }
}
