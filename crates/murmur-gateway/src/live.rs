//! Live query handle.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::GatewayError;

/// A stream of full snapshots for one query.
///
/// The first item is the snapshot at the time the query was opened. An
/// `Err` item is terminal: nothing follows it. `None` means the feed closed.
/// Dropping the handle stops the background task feeding it.
#[derive(Debug)]
pub struct LiveQuery<T> {
    rx: mpsc::Receiver<Result<Vec<T>, GatewayError>>,
    task: Option<JoinHandle<()>>,
}

impl<T> LiveQuery<T> {
    /// Wraps a receiver fed by some other producer.
    pub fn new(rx: mpsc::Receiver<Result<Vec<T>, GatewayError>>) -> Self {
        Self { rx, task: None }
    }

    pub(crate) fn with_task(
        rx: mpsc::Receiver<Result<Vec<T>, GatewayError>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Waits for the next snapshot.
    pub async fn next(&mut self) -> Option<Result<Vec<T>, GatewayError>> {
        self.rx.recv().await
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
