//! Progress reporting and cancellation for long-running operations.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives progress of a long-running operation and decides whether it
/// goes on.
///
/// `T` is the payload, e.g. `PackProgress` for the packager.
pub trait ProgressCallback<T>: Send + Sync {
    /// Returns `false` to cancel the operation.
    fn on_progress(&self, progress: &T) -> bool;
}

/// Adapts a closure to [`ProgressCallback`].
pub struct FnProgress<F, T> {
    callback: F,
    _marker: PhantomData<T>,
}

impl<F, T> FnProgress<F, T>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            _marker: PhantomData,
        }
    }
}

impl<F, T> ProgressCallback<T> for FnProgress<F, T>
where
    F: Fn(&T) -> bool + Send + Sync,
    T: Send + Sync,
{
    fn on_progress(&self, progress: &T) -> bool {
        (self.callback)(progress)
    }
}

/// Create a progress callback from a closure.
pub fn progress_fn<F, T>(f: F) -> FnProgress<F, T>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    FnProgress::new(f)
}

/// Shared cancellation flag.
///
/// Clones observe the same flag, so one clone can be handed to a blocking
/// operation while another is cancelled from a signal handler. As a
/// [`ProgressCallback`] it continues until cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The operation stops at its next progress report.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<T> ProgressCallback<T> for CancelToken {
    fn on_progress(&self, _progress: &T) -> bool {
        !self.is_cancelled()
    }
}
