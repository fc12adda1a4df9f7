//! funnelgate - single-port HTTP ingress for many funnels
//!
//! Requests arriving under `/funnelgate/<funnel id>/` are forwarded to the
//! funnel's local target:
//! - Path routing with a locally answered hello path for certificate warm-up
//! - Full buffering of request and response bodies
//! - Bounded per-funnel capture history for inspection
//! - Non-blocking notifications to an external observer

pub mod capture;
pub mod config;
pub mod directory;
pub mod error;
pub mod notify;
pub mod proxy;
pub mod router;
pub mod server;

pub use capture::{CaptureRecord, CaptureStore, RequestSnapshot, ResponseSnapshot};
pub use config::IngressConfig;
pub use directory::{Funnel, FunnelDescriptor, FunnelDirectory};
pub use error::{FunnelError, Result};
pub use notify::{spawn_dispatcher, EventObserver, NotificationSink, ProxyEvent};
pub use proxy::Forwarder;
pub use router::{RoutedPath, HELLO_PATH, MOUNT_PREFIX};
pub use server::IngressServer;
