//! Fan-out of a terminal outcome to the delivery channels.
//!
//! # Design
//! An outcome reaches, in this order:
//! 1. the direct callbacks passed to `send_with`, or the one-shot receiver
//!    passed to `send_for`,
//! 2. the request's own delegate, then every live delegate in the shared
//!    registry that registered interest in this kind of outcome,
//! 3. the broadcaster, under the success or failure event name.
//!
//! When the request asks for the main thread and a main dispatcher exists,
//! the whole batch is dispatched there in one job; otherwise it runs on the
//! current thread. A panic in one channel is logged and does not stop the
//! others.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::broadcast::{Broadcaster, Notification};
use crate::dispatch::Dispatcher;
use crate::error::{DeliveryError, NetworkError};
use crate::outcome::Outcome;
use crate::registry::WeakRegistry;
use crate::request::{Request, RequestInfo};

/// Receives outcomes of requests it is registered for. Both methods default
/// to doing nothing; the `Interest` given at registration decides which one
/// is called.
pub trait NetworkDelegate: Send + Sync {
    fn request_succeeded(&self, _request: &RequestInfo, _status: u16, _data: &Value) {}

    fn request_failed(&self, _request: &RequestInfo, _status: u16, _error: &NetworkError) {}
}

/// Which outcomes a registered delegate wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Success,
    Failure,
    All,
}

impl Interest {
    pub fn wants(self, outcome: &Outcome) -> bool {
        match self {
            Interest::All => true,
            Interest::Success => outcome.is_success(),
            Interest::Failure => !outcome.is_success(),
        }
    }
}

pub type ObserverFn = Arc<dyn Fn(&dyn NetworkDelegate, &RequestInfo, &Outcome) + Send + Sync>;

/// What a registry entry stores next to its weak delegate reference.
#[derive(Clone)]
pub struct Registration {
    pub interest: Interest,
    /// Called instead of the delegate's trait methods when present.
    pub callback: Option<ObserverFn>,
}

impl Registration {
    pub fn delegate(interest: Interest) -> Self {
        Self {
            interest,
            callback: None,
        }
    }

    pub fn callback<F>(interest: Interest, callback: F) -> Self
    where
        F: Fn(&dyn NetworkDelegate, &RequestInfo, &Outcome) + Send + Sync + 'static,
    {
        Self {
            interest,
            callback: Some(Arc::new(callback)),
        }
    }
}

pub type DelegateRegistry = WeakRegistry<dyn NetworkDelegate, Registration>;

pub type SuccessFn = Box<dyn FnOnce(u16, &Value) + Send>;
pub type FailureFn = Box<dyn FnOnce(u16, &NetworkError) + Send>;

/// Direct targets for one request: closures, a weakly held receiver, or
/// neither.
#[derive(Default)]
pub struct Callbacks {
    pub on_success: Option<SuccessFn>,
    pub on_failure: Option<FailureFn>,
    /// Notified through its delegate methods for this request only.
    pub receiver: Option<Weak<dyn NetworkDelegate>>,
}

impl Callbacks {
    pub fn new<S, F>(on_success: S, on_failure: F) -> Self
    where
        S: FnOnce(u16, &Value) + Send + 'static,
        F: FnOnce(u16, &NetworkError) + Send + 'static,
    {
        Self {
            on_success: Some(Box::new(on_success)),
            on_failure: Some(Box::new(on_failure)),
            receiver: None,
        }
    }

    /// Target `receiver` for a single request. It is not kept alive; if it
    /// is gone by delivery time it is skipped.
    pub fn for_receiver(receiver: &Arc<dyn NetworkDelegate>) -> Self {
        Self {
            receiver: Some(Arc::downgrade(receiver)),
            ..Self::default()
        }
    }
}

/// Delivers the outcome of one request, once.
pub struct Fanout {
    info: RequestInfo,
    run_on_main_thread: bool,
    callbacks: parking_lot::Mutex<Callbacks>,
    delegate: Option<Weak<dyn NetworkDelegate>>,
    registry: Arc<DelegateRegistry>,
    broadcaster: Arc<Broadcaster>,
    main: Option<Arc<dyn Dispatcher>>,
    delivered: AtomicBool,
}

impl Fanout {
    pub fn new(
        request: &Request,
        callbacks: Callbacks,
        registry: Arc<DelegateRegistry>,
        broadcaster: Arc<Broadcaster>,
        main: Option<Arc<dyn Dispatcher>>,
    ) -> Self {
        Self {
            info: request.info().clone(),
            run_on_main_thread: request.runs_on_main_thread(),
            callbacks: parking_lot::Mutex::new(callbacks),
            delegate: request.delegate_ref().cloned(),
            registry,
            broadcaster,
            main,
            delivered: AtomicBool::new(false),
        }
    }

    pub fn request(&self) -> &RequestInfo {
        &self.info
    }

    /// Deliver `outcome` to every channel. A second call for the same
    /// request is rejected.
    pub fn deliver(&self, outcome: Outcome) -> Result<(), DeliveryError> {
        if self.delivered.swap(true, Ordering::SeqCst) {
            tracing::error!(request = %self.info.id, "outcome delivered twice");
            return Err(DeliveryError::AlreadyDelivered(self.info.id));
        }

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        let batch = Batch {
            info: self.info.clone(),
            outcome,
            callbacks,
            delegate: self.delegate.clone(),
            registry: Arc::clone(&self.registry),
            broadcaster: Arc::clone(&self.broadcaster),
        };

        match (&self.main, self.run_on_main_thread) {
            (Some(main), true) => main.dispatch(Box::new(move || batch.run())),
            (None, true) => {
                tracing::debug!(
                    request = %self.info.id,
                    "no main dispatcher configured, delivering on the current thread"
                );
                batch.run();
            }
            (_, false) => batch.run(),
        }
        Ok(())
    }
}

/// Everything one delivery needs, movable to another thread.
struct Batch {
    info: RequestInfo,
    outcome: Outcome,
    callbacks: Callbacks,
    delegate: Option<Weak<dyn NetworkDelegate>>,
    registry: Arc<DelegateRegistry>,
    broadcaster: Arc<Broadcaster>,
}

impl Batch {
    fn run(self) {
        let Batch {
            info,
            outcome,
            callbacks,
            delegate,
            registry,
            broadcaster,
        } = self;

        let Callbacks {
            on_success,
            on_failure,
            receiver,
        } = callbacks;

        guarded(&info, "callback", || match &outcome {
            Outcome::Success { status, data } => {
                if let Some(on_success) = on_success {
                    on_success(*status, data);
                }
            }
            Outcome::Failure { status, error } => {
                if let Some(on_failure) = on_failure {
                    on_failure(*status, error);
                }
            }
        });
        if let Some(receiver) = receiver.and_then(|r| r.upgrade()) {
            guarded(&info, "receiver", || notify(&*receiver, &info, &outcome));
        }

        if let Some(delegate) = delegate.and_then(|d| d.upgrade()) {
            guarded(&info, "delegate", || notify(&*delegate, &info, &outcome));
        }
        registry.for_each_live(|delegate, registration| {
            if !registration.interest.wants(&outcome) {
                return;
            }
            guarded(&info, "delegate", || match &registration.callback {
                Some(callback) => callback(&*delegate, &info, &outcome),
                None => notify(&*delegate, &info, &outcome),
            });
        });

        // `post` guards each subscriber itself.
        let reached = broadcaster.post(&Notification::from_outcome(&outcome, &info));
        tracing::trace!(request = %info.id, reached, "broadcast posted");
    }
}

fn notify(delegate: &dyn NetworkDelegate, info: &RequestInfo, outcome: &Outcome) {
    match outcome {
        Outcome::Success { status, data } => delegate.request_succeeded(info, *status, data),
        Outcome::Failure { status, error } => delegate.request_failed(info, *status, error),
    }
}

fn guarded<F: FnOnce()>(info: &RequestInfo, channel: &'static str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(request = %info.id, channel, "delivery channel panicked");
    }
}
