//! Lifecycle analytics — fire-and-forget event recording.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::catalog::{TourId, TourStepId};

/// Events emitted over a tour's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    #[serde(rename = "tour_started")]
    Started { tour_id: TourId },
    #[serde(rename = "tour_step_viewed")]
    StepViewed { tour_id: TourId, step_id: TourStepId },
    #[serde(rename = "tour_completed")]
    Completed { tour_id: TourId },
    #[serde(rename = "tour_cancelled")]
    Cancelled {
        tour_id: TourId,
        step_id: Option<TourStepId>,
    },
    #[serde(rename = "tour_dismissed_temporarily")]
    DismissedTemporarily { tour_id: TourId },
    #[serde(rename = "tour_element_timeout")]
    ElementTimeout { selector: String },
}

impl AnalyticsEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "tour_started",
            Self::StepViewed { .. } => "tour_step_viewed",
            Self::Completed { .. } => "tour_completed",
            Self::Cancelled { .. } => "tour_cancelled",
            Self::DismissedTemporarily { .. } => "tour_dismissed_temporarily",
            Self::ElementTimeout { .. } => "tour_element_timeout",
        }
    }

    /// Event properties without the name tag.
    pub fn properties(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.remove("event");
        }
        value
    }
}

/// Analytics backend. Must not block; failures are the sink's problem.
pub trait AnalyticsSink: Send + Sync {
    fn record(&self, event: &AnalyticsEvent);
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AnalyticsSink for TracingSink {
    fn record(&self, event: &AnalyticsEvent) {
        tracing::info!(
            event = event.name(),
            properties = %event.properties(),
            "Tour analytics"
        );
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of recorded events with the given wire name.
    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name() == name).count()
    }
}

impl AnalyticsSink for MemorySink {
    fn record(&self, event: &AnalyticsEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Forwards events to a channel drained by the host (e.g. an HTTP uploader).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AnalyticsEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AnalyticsEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AnalyticsSink for ChannelSink {
    fn record(&self, event: &AnalyticsEvent) {
        // Ok if the receiver is gone
        let _ = self.tx.send(event.clone());
    }
}

/// Handle the engine emits through.
#[derive(Clone)]
pub struct AnalyticsEmitter {
    sink: Arc<dyn AnalyticsSink>,
}

impl AnalyticsEmitter {
    pub fn new(sink: Arc<dyn AnalyticsSink>) -> Self {
        Self { sink }
    }

    pub fn emit(&self, event: AnalyticsEvent) {
        tracing::debug!(event = event.name(), "Emitting analytics event");
        self.sink.record(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RenterStep;

    #[test]
    fn serializes_with_wire_names() {
        let event = AnalyticsEvent::StepViewed {
            tour_id: TourId::Renter,
            step_id: RenterStep::Map.into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "tour_step_viewed");
        assert_eq!(json["tour_id"], "renter");
        assert_eq!(json["step_id"], "renter-map");
        assert_eq!(event.name(), "tour_step_viewed");
    }

    #[test]
    fn properties_drop_the_tag() {
        let event = AnalyticsEvent::ElementTimeout {
            selector: "#never".into(),
        };
        assert_eq!(event.properties(), serde_json::json!({ "selector": "#never" }));
    }

    #[test]
    fn every_variant_name_matches_serde_tag() {
        let events = [
            AnalyticsEvent::Started { tour_id: TourId::Owner },
            AnalyticsEvent::Completed { tour_id: TourId::Owner },
            AnalyticsEvent::Cancelled {
                tour_id: TourId::Owner,
                step_id: None,
            },
            AnalyticsEvent::DismissedTemporarily { tour_id: TourId::Owner },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.name());
        }
    }

    #[test]
    fn memory_sink_counts_by_name() {
        let sink = Arc::new(MemorySink::new());
        let emitter = AnalyticsEmitter::new(sink.clone());
        emitter.emit(AnalyticsEvent::Completed { tour_id: TourId::Renter });
        emitter.emit(AnalyticsEvent::Completed { tour_id: TourId::Owner });
        assert_eq!(sink.count("tour_completed"), 2);
        assert_eq!(sink.count("tour_cancelled"), 0);
    }

    #[tokio::test]
    async fn channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new();
        sink.record(&AnalyticsEvent::Started { tour_id: TourId::Welcome });
        assert_eq!(
            rx.recv().await.unwrap(),
            AnalyticsEvent::Started { tour_id: TourId::Welcome }
        );
    }
}
