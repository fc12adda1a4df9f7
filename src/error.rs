//! Error types for funnel routing, forwarding and capture lookups

use hyper::StatusCode;
use std::io;
use thiserror::Error;

/// Errors produced while routing and forwarding funnel traffic
#[derive(Error, Debug)]
pub enum FunnelError {
    /// The path under the mount prefix has no funnel id
    #[error("invalid path format for funnel request")]
    InvalidPath,

    /// No funnel is registered under this id
    #[error("funnel not found: {0}")]
    FunnelNotFound(String),

    /// No capture record with this id in the funnel's history
    #[error("capture record not found: {0}")]
    RecordNotFound(String),

    /// Funnel exists but has no local target configured yet
    #[error("funnel {0} has no local target configured")]
    NotReady(String),

    /// The funnel's local target is not a usable http URL
    #[error("failed to parse funnel target URL {target:?}: {reason}")]
    TargetParse { target: String, reason: String },

    /// Could not connect to, or exchange with, the local target
    #[error("local target unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The local target's response body could not be read
    #[error("failed to read response body: {0}")]
    UpstreamRead(String),

    /// The ingress port could not be bound
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl FunnelError {
    /// HTTP status returned to the requester for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            FunnelError::InvalidPath => StatusCode::BAD_REQUEST,
            FunnelError::FunnelNotFound(_)
            | FunnelError::RecordNotFound(_)
            | FunnelError::NotReady(_) => StatusCode::NOT_FOUND,
            FunnelError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            FunnelError::TargetParse { .. }
            | FunnelError::UpstreamRead(_)
            | FunnelError::Listen { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for both funnel and record lookups that came up empty
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FunnelError::FunnelNotFound(_) | FunnelError::RecordNotFound(_)
        )
    }
}

/// Result type for funnel operations
pub type Result<T> = std::result::Result<T, FunnelError>;
