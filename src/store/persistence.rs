//! Per-tour completion and cooldown records.
//!
//! Key layout under the configured prefix:
//!
//! | key                         | value      |
//! |-----------------------------|------------|
//! | `<tour>`                    | `completed` |
//! | `<tour>:dismissed-until`    | epoch ms   |
//! | `<tour>:dismissed`          | `true`     |
//!
//! Every operation degrades silently: without a backend, or when the
//! backend errors, writes are dropped and every tour is eligible.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::TourId;
use crate::clock::Clock;

use super::traits::KeyValueStore;

const COMPLETED: &str = "completed";
const DISMISSED_UNTIL: &str = "dismissed-until";
const DISMISSED: &str = "dismissed";

/// What storage says about a tour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PersistedTourRecord {
    NotStarted,
    Completed,
    /// Soft-dismissed; `until_ms` is absent once the cooldown was cleared.
    Deferred { until_ms: Option<i64> },
}

/// Persistence of tour outcomes on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct PersistenceStore {
    backend: Option<Arc<dyn KeyValueStore>>,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl PersistenceStore {
    pub fn new(
        backend: Option<Arc<dyn KeyValueStore>>,
        prefix: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let prefix = prefix.into();
        if backend.is_none() {
            warn!("No persistent storage available; tours will always be offered");
        }
        Self {
            backend,
            prefix,
            clock,
        }
    }

    /// Whether a backend is attached.
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn key(&self, tour_id: TourId) -> String {
        format!("{}{}", self.prefix, tour_id)
    }

    fn sub_key(&self, tour_id: TourId, suffix: &str) -> String {
        format!("{}{}:{}", self.prefix, tour_id, suffix)
    }

    async fn read(&self, key: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Tour storage read failed");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &str) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if let Err(e) = backend.set(key, value).await {
            warn!(key, error = %e, "Tour storage write dropped");
        }
    }

    async fn delete(&self, key: &str) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if let Err(e) = backend.remove(key).await {
            warn!(key, error = %e, "Tour storage remove dropped");
        }
    }

    /// Whether a tour may be offered now.
    ///
    /// An expired cooldown record is removed as a side effect.
    pub async fn is_eligible(&self, tour_id: TourId) -> bool {
        if self.backend.is_none() {
            return true;
        }

        if self.read(&self.key(tour_id)).await.as_deref() == Some(COMPLETED) {
            return false;
        }

        let until_key = self.sub_key(tour_id, DISMISSED_UNTIL);
        let Some(raw) = self.read(&until_key).await else {
            return true;
        };

        match raw.trim().parse::<i64>() {
            Ok(until_ms) if self.clock.now_ms() < until_ms => false,
            Ok(_) => {
                debug!(tour = %tour_id, "Cooldown expired, clearing");
                self.delete(&until_key).await;
                true
            }
            Err(_) => {
                warn!(tour = %tour_id, value = %raw, "Discarding malformed cooldown record");
                self.delete(&until_key).await;
                true
            }
        }
    }

    /// Record a finished tour.
    pub async fn mark_completed(&self, tour_id: TourId) {
        self.write(&self.key(tour_id), COMPLETED).await;
        self.delete(&self.sub_key(tour_id, DISMISSED_UNTIL)).await;
        self.delete(&self.sub_key(tour_id, DISMISSED)).await;
    }

    /// Hide a tour for `cooldown`.
    pub async fn mark_dismissed(&self, tour_id: TourId, cooldown: Duration) {
        let cooldown_ms = i64::try_from(cooldown.as_millis()).unwrap_or(i64::MAX);
        let until_ms = self.clock.now_ms().saturating_add(cooldown_ms);
        self.write(&self.sub_key(tour_id, DISMISSED_UNTIL), &until_ms.to_string())
            .await;
        self.write(&self.sub_key(tour_id, DISMISSED), "true").await;
    }

    /// Forget everything about a tour.
    pub async fn clear(&self, tour_id: TourId) {
        self.delete(&self.key(tour_id)).await;
        self.delete(&self.sub_key(tour_id, DISMISSED_UNTIL)).await;
        self.delete(&self.sub_key(tour_id, DISMISSED)).await;
    }

    /// Read the stored record. `completed` takes precedence over any
    /// leftover dismissal keys.
    pub async fn record(&self, tour_id: TourId) -> PersistedTourRecord {
        if self.read(&self.key(tour_id)).await.as_deref() == Some(COMPLETED) {
            return PersistedTourRecord::Completed;
        }
        let until_ms = self
            .read(&self.sub_key(tour_id, DISMISSED_UNTIL))
            .await
            .and_then(|raw| raw.trim().parse::<i64>().ok());
        let dismissed = self.read(&self.sub_key(tour_id, DISMISSED)).await.as_deref() == Some("true");

        if until_ms.is_some() || dismissed {
            PersistedTourRecord::Deferred { until_ms }
        } else {
            PersistedTourRecord::NotStarted
        }
    }
}
