//! Process-wide publish/subscribe for request outcomes.
//!
//! # Design
//! Subscriptions are keyed by event name. Two names are fixed: one for
//! successful requests and one for failed ones. `post` snapshots the matching
//! handlers under a read lock and calls them after releasing it, so handlers
//! may subscribe or unsubscribe while being called. A panicking handler is
//! logged and skipped; the remaining handlers still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::NetworkError;
use crate::outcome::Outcome;
use crate::request::RequestInfo;

pub const REQUEST_SUCCESS_EVENT: &str = "netcall.request.success";
pub const REQUEST_FAILURE_EVENT: &str = "netcall.request.failure";

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationPayload {
    Success(Value),
    Failure(NetworkError),
}

/// A posted outcome together with the request it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub name: &'static str,
    pub status: u16,
    pub payload: NotificationPayload,
    pub request: RequestInfo,
}

impl Notification {
    pub fn from_outcome(outcome: &Outcome, request: &RequestInfo) -> Self {
        let (name, status, payload) = match outcome {
            Outcome::Success { status, data } => (
                REQUEST_SUCCESS_EVENT,
                *status,
                NotificationPayload::Success(data.clone()),
            ),
            Outcome::Failure { status, error } => (
                REQUEST_FAILURE_EVENT,
                *status,
                NotificationPayload::Failure(error.clone()),
            ),
        };
        Self {
            name,
            status,
            payload,
            request: request.clone(),
        }
    }

    /// Recover the outcome carried by this notification.
    pub fn outcome(&self) -> Outcome {
        match &self.payload {
            NotificationPayload::Success(data) => Outcome::success(self.status, data.clone()),
            NotificationPayload::Failure(error) => Outcome::failure(self.status, error.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Default)]
pub struct Broadcaster {
    subscribers: RwLock<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared instance used when a client is not given its own.
    pub fn global() -> Arc<Broadcaster> {
        static GLOBAL: OnceLock<Arc<Broadcaster>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Broadcaster::new())))
    }

    pub fn subscribe<F>(&self, name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns `true` if the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let mut found = false;
        subscribers.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(sid, _)| *sid != id);
            found |= handlers.len() != before;
            !handlers.is_empty()
        });
        found
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.subscribers.read().get(name).map_or(0, Vec::len)
    }

    /// Call every handler subscribed to `notification.name`. Returns how
    /// many returned normally.
    pub fn post(&self, notification: &Notification) -> usize {
        let handlers: Vec<(SubscriptionId, Handler)> =
            match self.subscribers.read().get(notification.name) {
                Some(handlers) => handlers
                    .iter()
                    .map(|(id, h)| (*id, Arc::clone(h)))
                    .collect(),
                None => return 0,
            };
        let mut completed = 0;
        for (id, handler) in &handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(notification))) {
                Ok(()) => completed += 1,
                Err(_) => tracing::error!(
                    event = notification.name,
                    subscription = id.0,
                    request = %notification.request.id,
                    "broadcast handler panicked"
                ),
            }
        }
        completed
    }
}
