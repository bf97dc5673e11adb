//! Event bus: trait for emitting funnel analytics events from any module.
//!
//! The store accepts an `Arc<dyn EventSink>` and emits page views, leads and
//! A/B test lifecycle changes through it.

use crate::types::{EventType, FunnelEvent};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: FunnelEvent);
}

/// No-op sink for modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: FunnelEvent) {}
}

/// Sink that writes every event to the tracing pipeline.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: FunnelEvent) {
        tracing::info!(
            event_type = ?event.event_type,
            funnel_id = %event.funnel_id,
            page_id = ?event.page_id,
            variant_id = ?event.variant_id,
            "Funnel event"
        );
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<FunnelEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<FunnelEvent> {
        self.guard().clone()
    }

    pub fn count(&self) -> usize {
        self.guard().len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.guard()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    fn guard(&self) -> MutexGuard<'_, Vec<FunnelEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: FunnelEvent) {
        self.guard().push(event);
    }
}

/// Convenience builder for creating a `FunnelEvent`.
pub fn make_event(event_type: EventType, funnel_id: Uuid) -> FunnelEvent {
    FunnelEvent {
        event_id: Uuid::new_v4(),
        event_type,
        funnel_id,
        page_id: None,
        visitor_id: None,
        variant_id: None,
        timestamp: Utc::now(),
    }
}

impl FunnelEvent {
    pub fn with_page(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }

    pub fn with_visitor(mut self, visitor_id: impl Into<String>) -> Self {
        self.visitor_id = Some(visitor_id.into());
        self
    }

    pub fn with_variant(mut self, variant_id: impl Into<String>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn tracing_sink() -> Arc<dyn EventSink> {
    Arc::new(TracingSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
