//! Registry of active funnels
//!
//! Funnels are registered by whoever establishes the public tunnel and
//! looked up by every proxied exchange. The map is sharded (dashmap) so
//! lookups for one funnel never wait on traffic for another; each funnel's
//! capture history sits behind its own lock in `CaptureStore`.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

use crate::capture::{CaptureRecord, CaptureStore, DEFAULT_CAPTURE_LIMIT};
use crate::error::{FunnelError, Result};

/// Static description of one funnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunnelDescriptor {
    pub id: String,
    /// URL of the local process traffic is forwarded to, empty until ready
    pub local_target: String,
    /// Externally visible URL of the tunnel
    pub public_target: String,
    pub inspect: bool,
}

impl FunnelDescriptor {
    pub fn new(
        id: impl Into<String>,
        local_target: impl Into<String>,
        public_target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            local_target: local_target.into(),
            public_target: public_target.into(),
            inspect: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn local_target(&self) -> &str {
        &self.local_target
    }

    pub fn public_target(&self) -> &str {
        &self.public_target
    }

    /// Display name: first DNS label of the public host, else the id
    pub fn name(&self) -> String {
        Url::parse(&self.public_target)
            .ok()
            .and_then(|url| {
                url.host_str()
                    .and_then(|host| host.split('.').next())
                    .map(|label| label.to_string())
            })
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// A registered funnel: its descriptor plus a handle to its capture history
#[derive(Debug, Clone)]
pub struct Funnel {
    pub descriptor: Arc<FunnelDescriptor>,
    pub captures: Arc<CaptureStore>,
}

impl Funnel {
    pub fn id(&self) -> &str {
        self.descriptor.id()
    }

    pub fn local_target(&self) -> &str {
        self.descriptor.local_target()
    }
}

/// Concurrency-safe mapping from funnel id to funnel
#[derive(Debug)]
pub struct FunnelDirectory {
    funnels: DashMap<String, Funnel>,
    capture_limit: usize,
}

impl FunnelDirectory {
    pub fn new() -> Self {
        Self::with_capture_limit(DEFAULT_CAPTURE_LIMIT)
    }

    /// Directory whose funnels keep at most `capture_limit` exchanges each
    pub fn with_capture_limit(capture_limit: usize) -> Self {
        Self {
            funnels: DashMap::new(),
            capture_limit,
        }
    }

    /// Register a funnel, replacing any descriptor under the same id
    ///
    /// Re-registering an id keeps its existing capture history.
    pub fn add(&self, descriptor: FunnelDescriptor) -> Funnel {
        let descriptor = Arc::new(descriptor);
        let mut entry = self
            .funnels
            .entry(descriptor.id.clone())
            .or_insert_with(|| Funnel {
                descriptor: descriptor.clone(),
                captures: Arc::new(CaptureStore::new(self.capture_limit)),
            });
        entry.descriptor = descriptor;
        entry.value().clone()
    }

    /// Remove a funnel; absent ids are ignored
    pub fn remove(&self, id: &str) -> Option<Funnel> {
        self.funnels.remove(id).map(|(_, funnel)| funnel)
    }

    /// Look up a funnel by id
    pub fn get(&self, id: &str) -> Result<Funnel> {
        self.funnels
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FunnelError::FunnelNotFound(id.to_string()))
    }

    /// All funnels, ordered by id
    pub fn list(&self) -> Vec<Funnel> {
        let mut funnels: Vec<Funnel> = self.funnels.iter().map(|e| e.value().clone()).collect();
        funnels.sort_by(|a, b| a.id().cmp(b.id()));
        funnels
    }

    /// Find one captured exchange of a funnel
    pub fn find_record(&self, funnel_id: &str, record_id: &str) -> Result<CaptureRecord> {
        self.get(funnel_id)?.captures.find_by_id(record_id)
    }

    pub fn len(&self) -> usize {
        self.funnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funnels.is_empty()
    }

    /// Remove every funnel, returning what was registered
    pub fn clear(&self) -> Vec<Funnel> {
        let funnels = self.list();
        self.funnels.clear();
        funnels
    }
}

impl Default for FunnelDirectory {
    fn default() -> Self {
        Self::new()
    }
}
