//! Preview lifecycle events.
//!
//! The preview engine emits a pre and a post event around each clone and
//! transfer. Listeners run synchronously on the emitting task and must
//! return quickly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::cache::{rw_read, rw_write};
use crate::domain::entities::ContainerRecord;

const SOURCE: &str = "application::events";

/// Monotonic per-process ordering of events.
pub type Epoch = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerEventKind {
    /// Carries the container about to be cloned.
    PreCreatePreview,
    /// Carries the new preview.
    PostCreatePreview,
    /// Carries the preview about to be transferred.
    PreTransferPreview,
    /// Carries the production container after the transfer.
    PostTransferPreview,
}

impl ContainerEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerEventKind::PreCreatePreview => "pre_create_preview",
            ContainerEventKind::PostCreatePreview => "post_create_preview",
            ContainerEventKind::PreTransferPreview => "pre_transfer_preview",
            ContainerEventKind::PostTransferPreview => "post_transfer_preview",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerEvent {
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: ContainerEventKind,
    pub container: ContainerRecord,
    pub timestamp: OffsetDateTime,
}

pub trait ContainerListener: Send + Sync {
    fn on_event(&self, event: &ContainerEvent);
}

/// Logs every event at info level.
pub struct TracingListener;

impl ContainerListener for TracingListener {
    fn on_event(&self, event: &ContainerEvent) {
        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = event.kind.as_str(),
            container_id = event.container.id,
            container_slug = %event.container.slug,
            "Container event"
        );
    }
}

pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn ContainerListener>>>,
    epoch_counter: AtomicU64,
}

impl EventBus {
    /// A bus with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    /// A bus with the [`TracingListener`] installed.
    pub fn with_tracing() -> Self {
        let bus = Self::new();
        bus.subscribe(Arc::new(TracingListener));
        bus
    }

    pub fn subscribe(&self, listener: Arc<dyn ContainerListener>) {
        rw_write(&self.listeners, SOURCE, "subscribe").push(listener);
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Deliver an event to every listener in subscription order.
    pub fn emit(&self, kind: ContainerEventKind, container: &ContainerRecord) -> ContainerEvent {
        let event = ContainerEvent {
            id: Uuid::new_v4(),
            epoch: self.next_epoch(),
            kind,
            container: container.clone(),
            timestamp: OffsetDateTime::now_utc(),
        };
        let listeners = rw_read(&self.listeners, SOURCE, "emit").clone();
        for listener in listeners {
            listener.on_event(&event);
        }
        event
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_tracing()
    }
}
