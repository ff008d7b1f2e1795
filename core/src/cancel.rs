//! Cancellation of an executing request.
//!
//! The executor waits on one channel per execution for either an attempt
//! result or a cancellation. `CancelToken` holds the sending side while the
//! executor is waiting, so `cancel()` wakes it immediately instead of waiting
//! for the transport to return.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::NetworkError;
use crate::http::HttpResponse;

pub(crate) enum Signal {
    Finished(Result<HttpResponse, NetworkError>),
    Cancelled,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    waiter: Mutex<Option<Sender<Signal>>>,
}

/// Cloneable handle used to cancel one request.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the request. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(waiter) = self.inner.waiter.lock().take() {
            let _ = waiter.send(Signal::Cancelled);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Install the channel the executor is waiting on. If cancellation
    /// already happened, the signal is sent right away.
    pub(crate) fn arm(&self, waiter: Sender<Signal>) {
        let mut slot = self.inner.waiter.lock();
        if self.is_cancelled() {
            let _ = waiter.send(Signal::Cancelled);
        } else {
            *slot = Some(waiter);
        }
    }

    pub(crate) fn disarm(&self) {
        self.inner.waiter.lock().take();
    }
}
