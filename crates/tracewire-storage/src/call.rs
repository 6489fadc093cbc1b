use std::sync::atomic::{AtomicBool, Ordering};

use crate::StorageError;

/// A single-shot storage result.
///
/// Mirrors the contract durable backends present: a call is executed or
/// enqueued exactly once, and a fresh clone is needed to retry. The
/// in-memory store computes results eagerly under its lock, so executing
/// here only hands the value over; a remote backend would do its I/O at
/// that point instead.
#[derive(Debug)]
pub struct Call<T> {
    result: Result<T, StorageError>,
    executed: AtomicBool,
    canceled: AtomicBool,
}

impl<T: Clone> Call<T> {
    pub fn value(value: T) -> Call<T> {
        Call::new(Ok(value))
    }

    pub fn error(error: StorageError) -> Call<T> {
        Call::new(Err(error))
    }

    fn new(result: Result<T, StorageError>) -> Call<T> {
        Call {
            result,
            executed: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
        }
    }

    /// Runs the call on the current thread. Fails with
    /// [`StorageError::AlreadyExecuted`] on reuse and
    /// [`StorageError::Canceled`] after [`Call::cancel`].
    pub fn execute(&self) -> Result<T, StorageError> {
        self.claim()?;
        self.result.clone()
    }

    /// Callback form of [`Call::execute`], for callers bridging to an
    /// async convention. The misuse checks are identical.
    pub fn enqueue<F>(&self, callback: F)
    where
        F: FnOnce(Result<T, StorageError>),
    {
        match self.claim() {
            Ok(()) => callback(self.result.clone()),
            Err(error) => callback(Err(error)),
        }
    }

    fn claim(&self) -> Result<(), StorageError> {
        if self.canceled.load(Ordering::Acquire) {
            return Err(StorageError::Canceled);
        }
        if self.executed.swap(true, Ordering::AcqRel) {
            return Err(StorageError::AlreadyExecuted);
        }
        Ok(())
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

/// A clone is a fresh call: unexecuted and not canceled.
impl<T: Clone> Clone for Call<T> {
    fn clone(&self) -> Call<T> {
        Call::new(self.result.clone())
    }
}
