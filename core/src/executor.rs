//! The attempt loop.
//!
//! # Design
//! `Executor::execute` drives one request to exactly one `Outcome`. Each
//! attempt runs the transport on its own thread while the executor blocks on
//! a channel that receives either that attempt's result or a cancellation
//! from the request's `CancelToken`. The next attempt is only started after
//! the previous result has been received, so attempts never overlap.
//!
//! Successful responses are decoded as JSON here; an undecodable body is a
//! terminal `MalformedResponse`. Retryable transport errors go back to the
//! retry policy; every other error ends the request.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use serde_json::Value;
use tracing::{debug, info, info_span, warn};

use crate::cancel::{CancelToken, Signal};
use crate::error::{NetworkError, TransportErrorKind};
use crate::http::{HttpRequest, HttpResponse};
use crate::outcome::{Attempt, Outcome};
use crate::request::Request;
use crate::retry::RetryPolicy;
use crate::transport::Transport;

#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

/// How a single attempt ended, from the executor's point of view.
enum AttemptResult {
    Done(Outcome),
    Retryable(NetworkError),
    Cancelled,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `request` to completion and hand the outcome to `on_terminal`.
    ///
    /// Blocks the calling thread. `on_terminal` runs on this thread, exactly
    /// once.
    pub fn execute<F>(&self, request: &Request, cancel: &CancelToken, on_terminal: F)
    where
        F: FnOnce(Outcome),
    {
        let span = info_span!(
            "request",
            id = %request.id(),
            method = %request.method(),
            url = request.url()
        );
        let _enter = span.enter();

        let outcome = self.run(request, cancel);
        match &outcome {
            Outcome::Success { status, .. } => info!(status, "request succeeded"),
            Outcome::Failure { status, error } => info!(status, %error, "request failed"),
        }
        on_terminal(outcome);
    }

    fn run(&self, request: &Request, cancel: &CancelToken) -> Outcome {
        let http = match request.to_http() {
            Ok(http) => Arc::new(http),
            Err(error) => return Outcome::failure(0, error),
        };
        let max_attempts = request.effective_max_attempts();

        let (tx, rx) = mpsc::channel();
        cancel.arm(tx.clone());
        let outcome = self.attempt_loop(&http, max_attempts, &tx, &rx);
        cancel.disarm();
        outcome
    }

    fn attempt_loop(
        &self,
        http: &Arc<HttpRequest>,
        max_attempts: u32,
        tx: &mpsc::Sender<Signal>,
        rx: &Receiver<Signal>,
    ) -> Outcome {
        let mut attempt = Attempt::first();
        loop {
            // A cancellation that landed between attempts is already queued.
            if let Ok(Signal::Cancelled) = rx.try_recv() {
                return Outcome::cancelled();
            }

            debug!(attempt = attempt.ordinal, max_attempts, "starting attempt");
            self.spawn_attempt(attempt, Arc::clone(http), tx.clone());

            let error = match self.await_attempt(rx) {
                AttemptResult::Done(outcome) => return outcome,
                AttemptResult::Cancelled => return Outcome::cancelled(),
                AttemptResult::Retryable(error) => error,
            };

            if !self.policy.should_retry(attempt.ordinal, max_attempts) {
                return Outcome::failure(error.status(), error);
            }
            warn!(attempt = attempt.ordinal, %error, "attempt failed, retrying");

            let delay = self.policy.delay_after(attempt.ordinal);
            if !delay.is_zero() {
                match rx.recv_timeout(delay) {
                    Ok(Signal::Cancelled) => return Outcome::cancelled(),
                    Ok(Signal::Finished(_)) | Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {}
                }
            }
            attempt = attempt.next();
        }
    }

    fn spawn_attempt(&self, attempt: Attempt, http: Arc<HttpRequest>, tx: mpsc::Sender<Signal>) {
        let transport = Arc::clone(&self.transport);
        let on_spawn_error = tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("netcall-attempt-{}", attempt.ordinal))
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| transport.send(&http)))
                    .unwrap_or_else(|_| {
                        Err(NetworkError::transport(
                            TransportErrorKind::Other,
                            "transport panicked",
                        ))
                    });
                // The executor may have stopped listening after a cancel.
                let _ = tx.send(Signal::Finished(result));
            });
        if let Err(e) = spawned {
            let _ = on_spawn_error.send(Signal::Finished(Err(NetworkError::transport(
                TransportErrorKind::Other,
                format!("failed to spawn attempt thread: {e}"),
            ))));
        }
    }

    fn await_attempt(&self, rx: &Receiver<Signal>) -> AttemptResult {
        match rx.recv() {
            Ok(Signal::Cancelled) => AttemptResult::Cancelled,
            Ok(Signal::Finished(Ok(response))) => AttemptResult::Done(decode(response)),
            Ok(Signal::Finished(Err(error))) if error.is_retryable() => {
                AttemptResult::Retryable(error)
            }
            Ok(Signal::Finished(Err(error))) => {
                AttemptResult::Done(Outcome::failure(error.status(), error))
            }
            // `run` keeps a sender alive, so the channel cannot close here.
            Err(_) => AttemptResult::Done(Outcome::failure(
                0,
                NetworkError::transport(TransportErrorKind::Other, "attempt channel closed"),
            )),
        }
    }
}

fn decode(response: HttpResponse) -> Outcome {
    if response.body.trim().is_empty() {
        return Outcome::success(response.status, Value::Null);
    }
    match serde_json::from_str::<Value>(&response.body) {
        Ok(data) => Outcome::success(response.status, data),
        Err(e) => Outcome::failure(
            response.status,
            NetworkError::malformed(response.status, e.to_string()),
        ),
    }
}
