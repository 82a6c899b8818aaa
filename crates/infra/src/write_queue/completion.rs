//! Completion handles for tracked operations.

use tokio::sync::oneshot;

use super::error::{WriteQueueError, WriteQueueResult};

/// Resolves once a tracked operation succeeds or fails for good.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<WriteQueueResult<()>>,
}

impl Completion {
    /// Wait for the terminal outcome.
    ///
    /// Returns [`WriteQueueError::Abandoned`] if the queue was dropped with
    /// the operation still outstanding.
    pub async fn wait(self) -> WriteQueueResult<()> {
        self.rx.await.unwrap_or(Err(WriteQueueError::Abandoned))
    }
}

#[derive(Debug)]
pub(crate) struct CompletionSender(oneshot::Sender<WriteQueueResult<()>>);

impl CompletionSender {
    pub fn send(self, result: WriteQueueResult<()>) {
        // The caller may have dropped its handle; nothing to do then.
        let _ = self.0.send(result);
    }
}

pub(crate) fn channel() -> (CompletionSender, Completion) {
    let (tx, rx) = oneshot::channel();
    (CompletionSender(tx), Completion { rx })
}
