//! Handle to a running device-code poll

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AuthError;

/// A device-token poll loop running on the runtime.
///
/// Dropping the handle cancels the loop.
#[derive(Debug)]
pub struct DevicePoll {
    progress: watch::Receiver<u64>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<(), AuthError>>>,
}

impl DevicePoll {
    pub(crate) fn new(
        progress: watch::Receiver<u64>,
        cancel: CancellationToken,
        handle: JoinHandle<Result<(), AuthError>>,
    ) -> Self {
        Self {
            progress,
            cancel,
            handle: Some(handle),
        }
    }

    /// Number of attempts answered with "authorization pending" so far
    pub fn attempts(&self) -> u64 {
        *self.progress.borrow()
    }

    /// Receiver that changes every time another attempt comes back pending
    pub fn progress(&self) -> watch::Receiver<u64> {
        self.progress.clone()
    }

    /// Stop polling before the next attempt
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this loop, for wiring into signal handlers
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the loop to finish
    pub async fn wait(mut self) -> Result<(), AuthError> {
        let Some(handle) = self.handle.take() else {
            return Err(AuthError::Cancelled);
        };

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(AuthError::Cancelled),
        }
    }
}

impl Drop for DevicePoll {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
