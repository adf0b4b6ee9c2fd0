//! Tour catalog — lookup of tour definitions by id.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::TourError;

use super::builtin;
use super::model::{TourDefinition, TourId, TourStep, TourStepId, TourSummary};

/// Registry of tour definitions, built once at startup and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct TourCatalog {
    definitions: BTreeMap<TourId, Arc<TourDefinition>>,
}

impl TourCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding every built-in tour.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for definition in builtin::definitions() {
            catalog.register(definition);
        }
        catalog
    }

    /// Add or replace a definition.
    pub fn register(&mut self, definition: TourDefinition) {
        tracing::debug!(tour = %definition.id, steps = definition.steps.len(), "Registered tour");
        self.definitions.insert(definition.id, Arc::new(definition));
    }

    /// Remove a definition. Returns whether it was present.
    pub fn unregister(&mut self, tour_id: TourId) -> bool {
        self.definitions.remove(&tour_id).is_some()
    }

    pub fn contains(&self, tour_id: TourId) -> bool {
        self.definitions.contains_key(&tour_id)
    }

    /// Look up a tour definition.
    pub fn get_definition(&self, tour_id: TourId) -> Result<Arc<TourDefinition>, TourError> {
        self.definitions
            .get(&tour_id)
            .cloned()
            .ok_or_else(|| TourError::TourNotFound {
                id: tour_id.to_string(),
            })
    }

    /// Look up a single step of a tour.
    pub fn get_step(&self, step_id: TourStepId) -> Result<&TourStep, TourError> {
        let tour = step_id.tour();
        let definition = self
            .definitions
            .get(&tour)
            .ok_or_else(|| TourError::TourNotFound {
                id: tour.to_string(),
            })?;
        definition
            .steps
            .iter()
            .find(|s| s.id == step_id)
            .ok_or_else(|| TourError::StepNotFound {
                tour: tour.to_string(),
                step: step_id.to_string(),
            })
    }

    /// Summaries of every registered tour, in `TourId` order.
    pub fn list_available(&self) -> Vec<TourSummary> {
        self.definitions.values().map(|d| d.summary()).collect()
    }

    /// Tours that open on their own after a navigation to `url`, in
    /// `TourId` order.
    pub fn auto_starting_on(&self, url: &str) -> Vec<Arc<TourDefinition>> {
        self.definitions
            .values()
            .filter(|d| d.auto_starts_on(url))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::model::{RenterStep, StepAnchor, StepPosition, WelcomeStep};

    #[test]
    fn builtin_lists_all_tours_in_order() {
        let catalog = TourCatalog::builtin();
        let ids: Vec<TourId> = catalog.list_available().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, TourId::ALL.to_vec());
    }

    #[test]
    fn unknown_tour_is_not_found() {
        let mut catalog = TourCatalog::builtin();
        assert!(catalog.unregister(TourId::Owner));
        assert!(!catalog.unregister(TourId::Owner));

        let err = catalog.get_definition(TourId::Owner).unwrap_err();
        assert!(matches!(err, TourError::TourNotFound { ref id } if id == "owner"));
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn register_replaces_definition() {
        let mut catalog = TourCatalog::builtin();
        catalog.register(TourDefinition::new(
            TourId::Renter,
            "Short renter tour",
            "One step",
            vec![TourStep::new(
                RenterStep::Search,
                "Search",
                "Find a car",
                StepPosition::Bottom,
                StepAnchor::selector("#search"),
            )],
        ));

        let def = catalog.get_definition(TourId::Renter).unwrap();
        assert_eq!(def.name, "Short renter tour");
        assert_eq!(def.steps.len(), 1);
    }

    #[test]
    fn only_welcome_auto_starts() {
        let catalog = TourCatalog::builtin();
        let ids: Vec<TourId> = catalog.auto_starting_on("/cars").iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![TourId::Welcome]);
        assert!(catalog.auto_starting_on("/bookings/b-1").is_empty());
    }

    #[test]
    fn step_lookup() {
        let mut catalog = TourCatalog::builtin();
        let step = catalog.get_step(WelcomeStep::Nav.into()).unwrap();
        assert_eq!(step.title, "Main navigation");

        catalog.register(TourDefinition::new(TourId::Renter, "Empty", "", vec![]));
        let err = catalog.get_step(RenterStep::Map.into()).unwrap_err();
        assert!(matches!(err, TourError::StepNotFound { .. }));
    }
}
