//! Path routing under the ingress mount prefix
//!
//! Requests for a funnel arrive as `/funnelgate/<funnel id>/<rest>`. The
//! router peels off the prefix and the id; `rest` is what gets appended to
//! the funnel's local target.

use crate::error::{FunnelError, Result};

/// Name used for the mount prefix and the well-known hello path
pub const PROGRAM_NAME: &str = "funnelgate";

/// All proxied traffic lives under this prefix
pub const MOUNT_PREFIX: &str = "/funnelgate/";

/// Sub-path answered locally, used to warm certificates on a fresh tunnel
pub const HELLO_PATH: &str = ".well-known/funnelgate/hello";

/// Body returned for the hello path
pub const HELLO_BODY: &str = "hello";

/// Funnel id and forwarded sub-path extracted from a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedPath {
    pub funnel_id: String,
    pub rest: String,
}

impl RoutedPath {
    /// Split the path remaining after the mount prefix into id and rest
    pub fn parse(path_after_prefix: &str) -> Result<Self> {
        if path_after_prefix.is_empty() || path_after_prefix == "/" {
            return Err(FunnelError::InvalidPath);
        }

        let (funnel_id, rest) = match path_after_prefix.split_once('/') {
            Some((id, rest)) => (id, rest),
            None => (path_after_prefix, ""),
        };

        if funnel_id.is_empty() || rest.split('/').any(is_dot_segment) {
            return Err(FunnelError::InvalidPath);
        }

        Ok(Self {
            funnel_id: funnel_id.to_string(),
            rest: rest.to_string(),
        })
    }

    /// Parse a full request path, `None` when it is outside the mount prefix
    pub fn from_request_path(path: &str) -> Option<Result<Self>> {
        strip_mount_prefix(path).map(Self::parse)
    }

    /// Whether this is the locally answered hello path
    pub fn is_hello(&self) -> bool {
        self.rest == HELLO_PATH
    }
}

/// `.` or `..`, including percent-encoded forms such as `%2e%2E`
///
/// These would be resolved away when the outbound URL is built and could
/// climb out of the target's base path.
fn is_dot_segment(segment: &str) -> bool {
    matches!(
        segment.to_ascii_lowercase().replace("%2e", ".").as_str(),
        "." | ".."
    )
}

/// Path remaining after the mount prefix
pub fn strip_mount_prefix(path: &str) -> Option<&str> {
    path.strip_prefix(MOUNT_PREFIX)
}

/// Join two path segments with exactly one `/` between them
pub fn join_paths(a: &str, b: &str) -> String {
    if a.is_empty() && b.is_empty() {
        return "/".to_string();
    }

    let a_slash = a.ends_with('/');
    let b_slash = b.starts_with('/');

    match (a_slash, b_slash) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => {
            if b.is_empty() || a == "/" {
                format!("{}{}", a, b)
            } else {
                format!("{}/{}", a, b)
            }
        }
        _ => format!("{}{}", a, b),
    }
}

/// Combine the target's own query with the request query
pub fn join_query(target: Option<&str>, request: Option<&str>) -> Option<String> {
    match (target.filter(|q| !q.is_empty()), request.filter(|q| !q.is_empty())) {
        (Some(t), Some(r)) => Some(format!("{}&{}", t, r)),
        (Some(q), None) | (None, Some(q)) => Some(q.to_string()),
        (None, None) => None,
    }
}
