//! Bounded per-funnel history of proxied exchanges
//!
//! Each funnel owns one `CaptureStore`: a fixed-capacity ring of
//! `CaptureRecord`s, iterated newest-first. Once the ring is full every
//! insert overwrites the oldest slot, so eviction and insertion happen under
//! the same lock acquisition and readers never see a torn history.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::error::{FunnelError, Result};

/// Default number of exchanges kept per funnel
pub const DEFAULT_CAPTURE_LIMIT: usize = 100;

/// Header map flattened to one comma-joined value per lower-case name
pub type HeaderSnapshot = BTreeMap<String, String>;

/// Outbound request as it was sent to the local target
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestSnapshot {
    pub method: String,
    /// Fully rewritten URL the exchange was forwarded to
    pub url: String,
    pub headers: HeaderSnapshot,
    #[serde(serialize_with = "lossy_body")]
    pub body: Bytes,
}

impl RequestSnapshot {
    /// Originating client address as reported by forwarding headers
    pub fn client_ip(&self) -> Option<&str> {
        if let Some(xff) = self.headers.get("x-forwarded-for") {
            let first = xff.split(',').next().unwrap_or("").trim();
            if !first.is_empty() {
                return Some(first);
            }
        }
        self.headers
            .get("x-real-ip")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Decoded query parameters of the forwarded URL, in order
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        match Url::parse(&self.url) {
            Ok(url) => url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Response as it was delivered back to the requester
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: HeaderSnapshot,
    #[serde(serialize_with = "lossy_body")]
    pub body: Bytes,
}

/// Immutable snapshot of one proxied exchange
#[derive(Debug, Clone, Serialize)]
pub struct CaptureRecord {
    pub id: String,
    pub funnel_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "duration_ms", serialize_with = "duration_millis")]
    pub duration: Duration,
    pub request: RequestSnapshot,
    pub response: ResponseSnapshot,
}

impl CaptureRecord {
    pub fn method(&self) -> &str {
        &self.request.method
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }

    /// Path component of the forwarded URL, always rooted
    pub fn path(&self) -> String {
        match Url::parse(&self.request.url) {
            Ok(url) if url.path().starts_with('/') => url.path().to_string(),
            Ok(url) => format!("/{}", url.path()),
            Err(_) => String::new(),
        }
    }

    /// Short content classification derived from the response content type
    pub fn kind(&self) -> &str {
        let content_type = match self.response.headers.get("content-type") {
            Some(ct) if !ct.is_empty() => ct.as_str(),
            _ => return "",
        };

        const KNOWN: [(&str, &str); 6] = [
            ("application/json", "json"),
            ("text/html", "html"),
            ("text/xml", "xml"),
            ("text/css", "css"),
            ("text/javascript", "js"),
            ("text/plain", "txt"),
        ];
        for (prefix, kind) in KNOWN {
            if content_type.starts_with(prefix) {
                return kind;
            }
        }

        content_type.split('/').next().unwrap_or("")
    }

    /// Duration for display: one decimal of seconds past 1s, else whole ms
    pub fn rounded_duration(&self) -> String {
        let secs = self.duration.as_secs_f64();
        if secs >= 1.0 {
            format!("{:.1}s", secs)
        } else {
            format!("{}ms", (secs * 1000.0).round() as u64)
        }
    }
}

fn lossy_body<S: Serializer>(body: &Bytes, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

fn duration_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Thread-safe bounded history for one funnel
#[derive(Debug)]
pub struct CaptureStore {
    inner: Mutex<Ring>,
}

#[derive(Debug)]
struct Ring {
    /// Grows until `capacity`, then slots are overwritten in place
    slots: Vec<CaptureRecord>,
    /// Slot the next insert writes to
    write_pos: usize,
    capacity: usize,
}

impl Ring {
    /// Slot index of the i-th newest record
    fn newest_index(&self, i: usize) -> usize {
        let n = self.slots.len();
        (self.write_pos + n - 1 - i) % n
    }

    fn push(&mut self, record: CaptureRecord) {
        if self.slots.len() < self.capacity {
            self.slots.push(record);
            self.write_pos = self.slots.len() % self.capacity;
        } else {
            self.slots[self.write_pos] = record;
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
    }

    fn newest_first(&self) -> impl Iterator<Item = &CaptureRecord> + '_ {
        (0..self.slots.len()).map(move |i| &self.slots[self.newest_index(i)])
    }

    fn oldest_first(&self) -> impl Iterator<Item = &CaptureRecord> + '_ {
        let n = self.slots.len();
        (0..n).rev().map(move |i| &self.slots[self.newest_index(i)])
    }
}

impl CaptureStore {
    /// Create a store holding at most `capacity` records (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Ring {
                slots: Vec::with_capacity(capacity.min(DEFAULT_CAPTURE_LIMIT)),
                write_pos: 0,
                capacity,
            }),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPTURE_LIMIT)
    }

    /// Insert a record as the new head, evicting the tail when full
    pub fn add(&self, record: CaptureRecord) {
        self.inner.lock().push(record);
    }

    /// Copy of all records, newest first
    pub fn snapshot(&self) -> Vec<CaptureRecord> {
        self.inner.lock().newest_first().cloned().collect()
    }

    /// Copy of all records, oldest first
    pub fn oldest_first(&self) -> Vec<CaptureRecord> {
        self.inner.lock().oldest_first().cloned().collect()
    }

    /// Find a record by id
    pub fn find_by_id(&self, id: &str) -> Result<CaptureRecord> {
        self.inner
            .lock()
            .newest_first()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| FunnelError::RecordNotFound(id.to_string()))
    }

    /// Most recent record
    pub fn head(&self) -> Option<CaptureRecord> {
        self.inner.lock().newest_first().next().cloned()
    }

    /// Oldest record still held
    pub fn tail(&self) -> Option<CaptureRecord> {
        self.inner.lock().oldest_first().next().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Drop all records
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.write_pos = 0;
    }
}

impl Default for CaptureStore {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
