//! Request execution with retry and multi-channel delivery.
//!
//! # Overview
//! A caller configures a `Request` and sends it through a `Network`. The
//! `Executor` runs attempts through a `Transport` until one succeeds, a
//! terminal error occurs, or the retry policy runs out, then hands the single
//! `Outcome` to a `Fanout`. The fan-out delivers it to the direct callback,
//! to weakly held delegates, and to `Broadcaster` subscribers, optionally
//! hopping onto a designated main execution context first.
//!
//! # Design
//! - The transport is a trait; `UreqTransport` is the bundled blocking
//!   implementation. Everything above it is transport-agnostic.
//! - Attempts for one request are strictly sequential. Distinct requests run
//!   on their own threads and share only the delegate registry and the
//!   broadcaster, both lock-protected.
//! - Delegates are held through `Weak` references and skipped once dropped.

pub mod broadcast;
pub mod cancel;
pub mod client;
pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod http;
pub mod outcome;
pub mod registry;
pub mod request;
pub mod retry;
pub mod transport;
pub mod ureq_transport;

pub use broadcast::{
    Broadcaster, Notification, NotificationPayload, SubscriptionId, REQUEST_FAILURE_EVENT,
    REQUEST_SUCCESS_EVENT,
};
pub use cancel::CancelToken;
pub use client::{Network, NetworkBuilder, RequestHandle};
pub use config::{BackoffConfig, NetworkConfig};
pub use delivery::{
    Callbacks, DelegateRegistry, Fanout, Interest, NetworkDelegate, Registration,
};
pub use dispatch::{main_queue, Dispatcher, MainLoop, MainQueue};
pub use error::{ConfigError, DeliveryError, NetworkError, TransportErrorKind};
pub use executor::Executor;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use outcome::{Attempt, Outcome};
pub use registry::WeakRegistry;
pub use request::{Request, RequestInfo};
pub use retry::{should_retry, Backoff, RetryPolicy};
pub use transport::Transport;
pub use ureq_transport::UreqTransport;
