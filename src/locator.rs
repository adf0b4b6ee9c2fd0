//! Element locator — waits for a step's anchor to appear in the UI tree.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::analytics::{AnalyticsEmitter, AnalyticsEvent};

/// Answers whether a selector currently matches something in the UI.
#[async_trait]
pub trait ElementProbe: Send + Sync {
    async fn is_present(&self, selector: &str) -> bool;
}

/// How a wait settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Found,
    TimedOut,
}

impl WaitOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found)
    }
}

/// Polls an [`ElementProbe`] until the selector appears or time runs out.
#[derive(Clone)]
pub struct ElementLocator {
    probe: Arc<dyn ElementProbe>,
    analytics: AnalyticsEmitter,
}

impl ElementLocator {
    pub fn new(probe: Arc<dyn ElementProbe>, analytics: AnalyticsEmitter) -> Self {
        Self { probe, analytics }
    }

    /// Wait for `selector`. Never fails: a timeout is reported as
    /// [`WaitOutcome::TimedOut`] after emitting `tour_element_timeout`.
    ///
    /// Settles no later than `timeout` after the call (plus one probe).
    pub async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> WaitOutcome {
        let started = Instant::now();
        let deadline = started + timeout;
        let poll_interval = poll_interval.max(Duration::from_millis(1));

        loop {
            if self.probe.is_present(selector).await {
                debug!(selector, elapsed_ms = started.elapsed().as_millis() as u64, "Anchor found");
                return WaitOutcome::Found;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(selector, timeout_ms = timeout.as_millis() as u64, "Anchor never appeared");
                self.analytics.emit(AnalyticsEvent::ElementTimeout {
                    selector: selector.to_string(),
                });
                return WaitOutcome::TimedOut;
            }

            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }
}
