//! Ingress configuration

use crate::capture::DEFAULT_CAPTURE_LIMIT;
use crate::notify::DEFAULT_EVENT_BUFFER;

/// Default ingress port
pub const DEFAULT_PORT: u16 = 4141;

/// Ingress server configuration
#[derive(Debug, Clone)]
pub struct IngressConfig {
    pub host: String,
    pub port: u16,
    /// Exchanges kept per funnel
    pub capture_limit: usize,
    /// Truncate captured bodies to this many bytes; forwarded bodies are untouched
    pub capture_body_limit: Option<usize>,
    /// Depth of the notification queue
    pub event_buffer: usize,
}

impl IngressConfig {
    /// `host:port` the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            capture_body_limit: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}
