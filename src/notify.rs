//! Fire-and-forget notifications for completed exchanges
//!
//! The forwarder hands each event to a bounded queue with `try_send` and
//! moves on. A dispatcher task drains the queue toward whatever observer is
//! attached. When the queue is full or nobody is listening the event is
//! dropped, so a slow observer never adds latency to proxied requests.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default queue depth between the forwarder and the dispatcher
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Emitted after an exchange has been appended to its funnel's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyEvent {
    pub funnel_id: String,
}

/// Consumer side of the notification queue
pub type EventReceiver = mpsc::Receiver<ProxyEvent>;

/// Something that wants to hear about completed exchanges
#[async_trait]
pub trait EventObserver: Send + Sync {
    async fn on_event(&self, event: ProxyEvent);
}

/// Producer handle, cloned into every request handler
#[derive(Debug, Clone)]
pub struct NotificationSink {
    sender: Option<mpsc::Sender<ProxyEvent>>,
}

impl NotificationSink {
    /// Create a sink and the receiver that drains it
    pub fn new(buffer: usize) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender: Some(sender) }, receiver)
    }

    /// A sink that discards every event
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Publish an event without waiting; never fails the caller
    pub fn notify(&self, funnel_id: &str) {
        let Some(sender) = &self.sender else {
            return;
        };

        let event = ProxyEvent {
            funnel_id: funnel_id.to_string(),
        };
        if let Err(e) = sender.try_send(event) {
            debug!("Dropping event for funnel {}: {}", funnel_id, e);
        }
    }
}

/// Drain `receiver` on its own task, handing each event to `observer`
pub fn spawn_dispatcher(
    mut receiver: EventReceiver,
    observer: Arc<dyn EventObserver>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            observer.on_event(event).await;
        }
        debug!("Notification queue closed, dispatcher exiting");
    })
}
