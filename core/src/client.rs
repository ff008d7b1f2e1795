//! The client facade.
//!
//! # Design
//! `Network` ties the pieces together: it owns an `Executor`, the shared
//! delegate registry, a broadcaster handle and an optional main dispatcher.
//! `send*` methods run each request on its own thread and return a
//! `RequestHandle`; `execute_blocking` runs it on the caller's thread.
//! Delivery without the main queue happens on that same thread, after the
//! executor has received the final attempt's result.
//! Either way the outcome goes through one `Fanout`.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde_json::Value;

use crate::broadcast::Broadcaster;
use crate::cancel::CancelToken;
use crate::config::NetworkConfig;
use crate::delivery::{
    Callbacks, DelegateRegistry, Fanout, Interest, NetworkDelegate, Registration,
};
use crate::dispatch::Dispatcher;
use crate::error::{NetworkError, TransportErrorKind};
use crate::executor::Executor;
use crate::http::HttpMethod;
use crate::outcome::Outcome;
use crate::request::{Request, RequestInfo};
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use crate::ureq_transport::UreqTransport;

/// Shared client for sending requests. Cheap to clone.
#[derive(Clone)]
pub struct Network {
    executor: Executor,
    config: NetworkConfig,
    delegates: Arc<DelegateRegistry>,
    broadcaster: Arc<Broadcaster>,
    main: Option<Arc<dyn Dispatcher>>,
}

pub struct NetworkBuilder {
    transport: Option<Arc<dyn Transport>>,
    policy: Option<RetryPolicy>,
    config: NetworkConfig,
    broadcaster: Option<Arc<Broadcaster>>,
    main: Option<Arc<dyn Dispatcher>>,
}

impl NetworkBuilder {
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the policy derived from the config.
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn config(mut self, config: NetworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to `Broadcaster::global()`.
    pub fn broadcaster(mut self, broadcaster: Arc<Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn main_queue<D: Dispatcher + 'static>(mut self, main: D) -> Self {
        self.main = Some(Arc::new(main));
        self
    }

    /// Without an explicit transport a `UreqTransport` is used.
    pub fn build(self) -> Network {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(UreqTransport::new()));
        let policy = self.policy.unwrap_or_else(|| self.config.retry_policy());
        Network {
            executor: Executor::new(transport).with_policy(policy),
            config: self.config,
            delegates: Arc::new(DelegateRegistry::new()),
            broadcaster: self.broadcaster.unwrap_or_else(Broadcaster::global),
            main: self.main,
        }
    }
}

impl Network {
    pub fn builder() -> NetworkBuilder {
        NetworkBuilder {
            transport: None,
            policy: None,
            config: NetworkConfig::default(),
            broadcaster: None,
            main: None,
        }
    }

    /// Start a request pre-filled with the configured defaults.
    pub fn request(&self, method: HttpMethod, url: impl Into<String>) -> Request {
        Request::new(method, url)
            .timeout(self.config.timeout())
            .max_attempts(self.config.max_attempts)
            .run_on_main_thread(self.config.run_on_main_thread)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Register a delegate for the outcomes of every request sent through
    /// this client. Held weakly.
    pub fn add_delegate(&self, delegate: &Arc<dyn NetworkDelegate>, interest: Interest) -> bool {
        self.delegates.add(delegate, Registration::delegate(interest))
    }

    /// Register `observer` with a callback that is used instead of its
    /// delegate methods. Re-registering replaces the previous callback.
    pub fn add_observer<F>(
        &self,
        observer: &Arc<dyn NetworkDelegate>,
        interest: Interest,
        callback: F,
    ) -> bool
    where
        F: Fn(&dyn NetworkDelegate, &RequestInfo, &Outcome) + Send + Sync + 'static,
    {
        self.delegates.add(observer, Registration::callback(interest, callback))
    }

    pub fn remove_delegate(&self, delegate: &Arc<dyn NetworkDelegate>) -> bool {
        self.delegates.remove(delegate)
    }

    pub fn delegate_count(&self) -> usize {
        self.delegates.len()
    }

    /// Send with direct success and failure callbacks.
    pub fn send_with<S, F>(&self, request: Request, on_success: S, on_failure: F) -> RequestHandle
    where
        S: FnOnce(u16, &Value) + Send + 'static,
        F: FnOnce(u16, &NetworkError) + Send + 'static,
    {
        self.spawn(request, Callbacks::new(on_success, on_failure))
    }

    /// Send with `receiver` as a one-shot target for this request's outcome,
    /// called through its `NetworkDelegate` methods. It is held weakly and is
    /// independent of `Request::delegate` and the shared registry.
    pub fn send_for(&self, request: Request, receiver: &Arc<dyn NetworkDelegate>) -> RequestHandle {
        self.spawn(request, Callbacks::for_receiver(receiver))
    }

    /// Send without a direct callback; delegates and broadcast subscribers
    /// still receive the outcome.
    pub fn send(&self, request: Request) -> RequestHandle {
        self.spawn(request, Callbacks::default())
    }

    /// Run the request on the calling thread, deliver it, and return the
    /// outcome as well.
    pub fn execute_blocking(&self, request: Request) -> Outcome {
        let fanout = self.fanout(&request, Callbacks::default());
        let mut result = None;
        self.executor
            .execute(&request, &CancelToken::new(), |outcome| {
                result = Some(outcome.clone());
                deliver(&fanout, outcome);
            });
        result.unwrap_or_else(Outcome::cancelled)
    }

    fn fanout(&self, request: &Request, callbacks: Callbacks) -> Fanout {
        Fanout::new(
            request,
            callbacks,
            Arc::clone(&self.delegates),
            Arc::clone(&self.broadcaster),
            self.main.clone(),
        )
    }

    fn spawn(&self, request: Request, callbacks: Callbacks) -> RequestHandle {
        let info = request.info().clone();
        let cancel = CancelToken::new();
        let fanout = Arc::new(self.fanout(&request, callbacks));
        let outcome = Arc::new(Mutex::new(None));

        let executor = self.executor.clone();
        let token = cancel.clone();
        let slot = Arc::clone(&outcome);
        let deliver_to = Arc::clone(&fanout);
        let thread = thread::Builder::new()
            .name(format!("netcall-request-{}", info.id))
            .spawn(move || {
                executor.execute(&request, &token, |result| {
                    *slot.lock() = Some(result.clone());
                    deliver(&deliver_to, result);
                });
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(request = %info.id, error = %e, "failed to spawn request thread");
                let failure = Outcome::failure(
                    0,
                    NetworkError::transport(
                        TransportErrorKind::Other,
                        format!("failed to spawn request thread: {e}"),
                    ),
                );
                *outcome.lock() = Some(failure.clone());
                deliver(&fanout, failure);
                None
            }
        };

        RequestHandle {
            info,
            cancel,
            thread,
            outcome,
        }
    }
}

fn deliver(fanout: &Fanout, outcome: Outcome) {
    if let Err(e) = fanout.deliver(outcome) {
        tracing::error!(error = %e, "delivery rejected");
    }
}

/// Handle to a request running on its own thread.
pub struct RequestHandle {
    info: RequestInfo,
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
    outcome: Arc<Mutex<Option<Outcome>>>,
}

impl RequestHandle {
    pub fn info(&self) -> &RequestInfo {
        &self.info
    }

    /// Stop the request. The outcome becomes `Failure(Cancelled)` unless it
    /// was already final.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Block until the request has produced its outcome and handed it to
    /// delivery. With a main dispatcher the delivery itself may still be
    /// queued on the main loop.
    pub fn wait(mut self) -> Outcome {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(request = %self.info.id, "request thread panicked");
            }
        }
        self.outcome.lock().take().unwrap_or_else(Outcome::cancelled)
    }
}
