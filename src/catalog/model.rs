//! Tour and step definitions.
//!
//! Tours are identified by [`TourId`]; every tour has its own step-id enum
//! joined under [`TourStepId`], so wiring a step to an anchor is checked at
//! compile time instead of by string comparison.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::TourError;

use super::guard::TourGuard;

/// Identifier of a registered tour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TourId {
    Welcome,
    GuidedBooking,
    Renter,
    Owner,
    CarDetail,
}

impl TourId {
    pub const ALL: [TourId; 5] = [
        TourId::Welcome,
        TourId::GuidedBooking,
        TourId::Renter,
        TourId::Owner,
        TourId::CarDetail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::GuidedBooking => "guided-booking",
            Self::Renter => "renter",
            Self::Owner => "owner",
            Self::CarDetail => "car-detail",
        }
    }
}

impl fmt::Display for TourId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TourId {
    type Err = TourError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s.trim())
            .ok_or_else(|| TourError::UnknownTour(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WelcomeStep {
    Hero,
    Nav,
    Help,
}

impl WelcomeStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hero => "welcome-hero",
            Self::Nav => "welcome-nav",
            Self::Help => "welcome-help",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuidedBookingStep {
    Search,
    SelectCar,
    Map,
    CarDetail,
    Dates,
    Price,
    BookButton,
    BookingDetail,
    Chat,
    Payment,
}

impl GuidedBookingStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "guided-search",
            Self::SelectCar => "guided-select-car",
            Self::Map => "guided-map",
            Self::CarDetail => "guided-car-detail",
            Self::Dates => "guided-dates",
            Self::Price => "guided-price",
            Self::BookButton => "guided-book-button",
            Self::BookingDetail => "guided-booking-detail",
            Self::Chat => "guided-chat",
            Self::Payment => "guided-payment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenterStep {
    Search,
    Filters,
    Map,
    Card,
}

impl RenterStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "renter-search",
            Self::Filters => "renter-filters",
            Self::Map => "renter-map",
            Self::Card => "renter-card",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerStep {
    Publish,
    Photos,
    Pricing,
    Insurance,
    Calendar,
    PublishButton,
}

impl OwnerStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "owner-publish",
            Self::Photos => "owner-photos",
            Self::Pricing => "owner-pricing",
            Self::Insurance => "owner-insurance",
            Self::Calendar => "owner-calendar",
            Self::PublishButton => "owner-publish-btn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarDetailStep {
    Gallery,
    Reviews,
    Insurance,
    Book,
}

impl CarDetailStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gallery => "detail-gallery",
            Self::Reviews => "detail-reviews",
            Self::Insurance => "detail-insurance",
            Self::Book => "detail-book",
        }
    }
}

/// Step identifier across all tours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TourStepId {
    Welcome(WelcomeStep),
    GuidedBooking(GuidedBookingStep),
    Renter(RenterStep),
    Owner(OwnerStep),
    CarDetail(CarDetailStep),
}

impl TourStepId {
    /// The tour this step belongs to.
    pub fn tour(&self) -> TourId {
        match self {
            Self::Welcome(_) => TourId::Welcome,
            Self::GuidedBooking(_) => TourId::GuidedBooking,
            Self::Renter(_) => TourId::Renter,
            Self::Owner(_) => TourId::Owner,
            Self::CarDetail(_) => TourId::CarDetail,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome(s) => s.as_str(),
            Self::GuidedBooking(s) => s.as_str(),
            Self::Renter(s) => s.as_str(),
            Self::Owner(s) => s.as_str(),
            Self::CarDetail(s) => s.as_str(),
        }
    }
}

impl fmt::Display for TourStepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TourStepId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl From<WelcomeStep> for TourStepId {
    fn from(step: WelcomeStep) -> Self {
        Self::Welcome(step)
    }
}

impl From<GuidedBookingStep> for TourStepId {
    fn from(step: GuidedBookingStep) -> Self {
        Self::GuidedBooking(step)
    }
}

impl From<RenterStep> for TourStepId {
    fn from(step: RenterStep) -> Self {
        Self::Renter(step)
    }
}

impl From<OwnerStep> for TourStepId {
    fn from(step: OwnerStep) -> Self {
        Self::Owner(step)
    }
}

impl From<CarDetailStep> for TourStepId {
    fn from(step: CarDetailStep) -> Self {
        Self::CarDetail(step)
    }
}

/// Preferred bubble placement relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPosition {
    Top,
    #[default]
    Bottom,
    Left,
    Right,
}

impl fmt::Display for StepPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Left => "left",
            Self::Right => "right",
        };
        f.write_str(s)
    }
}

impl FromStr for StepPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(format!("unknown position: {other}")),
        }
    }
}

/// What a step is visually attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAnchor {
    /// A raw selector, used as-is.
    Selector(String),
    /// A named marker, resolved to `[data-tour-step="<name>"]`.
    Marker(String),
}

impl StepAnchor {
    pub fn selector(selector: impl Into<String>) -> Self {
        Self::Selector(selector.into())
    }

    pub fn marker(name: impl Into<String>) -> Self {
        Self::Marker(name.into())
    }

    /// Resolve to the selector the locator probes for.
    pub fn resolve(&self) -> String {
        match self {
            Self::Selector(s) => s.clone(),
            Self::Marker(name) => format!("[data-tour-step=\"{name}\"]"),
        }
    }
}

impl From<TourStepId> for StepAnchor {
    fn from(step: TourStepId) -> Self {
        Self::Marker(step.as_str().to_string())
    }
}

/// Replacement fields applied on narrow viewports.
#[derive(Debug, Clone, Default)]
pub struct ResponsiveOverride {
    pub position: Option<StepPosition>,
    pub text: Option<String>,
    pub anchor: Option<StepAnchor>,
}

/// One highlighted moment of a tour.
#[derive(Debug, Clone)]
pub struct TourStep {
    pub id: TourStepId,
    pub title: String,
    pub text: String,
    pub position: StepPosition,
    pub anchor: StepAnchor,
    /// Route to navigate to before this step is shown.
    pub route: Option<String>,
    pub mobile: Option<ResponsiveOverride>,
    /// Skip the step instead of drawing it unanchored when its anchor
    /// never appears.
    pub required: bool,
}

impl TourStep {
    pub fn new(
        id: impl Into<TourStepId>,
        title: &str,
        text: &str,
        position: StepPosition,
        anchor: StepAnchor,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.to_string(),
            text: text.to_string(),
            position,
            anchor,
            route: None,
            mobile: None,
            required: false,
        }
    }

    pub fn with_route(mut self, route: &str) -> Self {
        self.route = Some(route.to_string());
        self
    }

    pub fn with_mobile(mut self, mobile: ResponsiveOverride) -> Self {
        self.mobile = Some(mobile);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Apply the mobile override when `narrow` is set.
    pub fn resolved(&self, narrow: bool) -> (StepPosition, &str, &StepAnchor) {
        match (&self.mobile, narrow) {
            (Some(m), true) => (
                m.position.unwrap_or(self.position),
                m.text.as_deref().unwrap_or(&self.text),
                m.anchor.as_ref().unwrap_or(&self.anchor),
            ),
            _ => (self.position, &self.text, &self.anchor),
        }
    }
}

/// Maps a completed-navigation URL pattern to a step revealed out of band.
#[derive(Debug, Clone)]
pub struct RouteTrigger {
    pub pattern: Regex,
    pub step: TourStepId,
}

impl RouteTrigger {
    pub fn new(pattern: &str, step: impl Into<TourStepId>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            step: step.into(),
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }
}

/// An ordered sequence of steps plus metadata.
#[derive(Clone)]
pub struct TourDefinition {
    pub id: TourId,
    pub name: String,
    pub description: String,
    pub steps: Vec<TourStep>,
    /// Label of the primary button on the last step.
    pub terminal_label: String,
    /// Overrides the configured dismissal cooldown.
    pub cooldown: Option<Duration>,
    pub route_triggers: Vec<RouteTrigger>,
    /// All must pass before the tour starts.
    pub guards: Vec<Arc<dyn TourGuard>>,
    /// Navigations that start the tour on their own when nothing is running.
    pub auto_start_routes: Vec<Regex>,
}

impl fmt::Debug for TourDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guards: Vec<&str> = self.guards.iter().map(|g| g.name()).collect();
        f.debug_struct("TourDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("terminal_label", &self.terminal_label)
            .field("cooldown", &self.cooldown)
            .field("route_triggers", &self.route_triggers)
            .field("guards", &guards)
            .field("auto_start_routes", &self.auto_start_routes)
            .finish_non_exhaustive()
    }
}

impl TourDefinition {
    pub fn new(id: TourId, name: &str, description: &str, steps: Vec<TourStep>) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: description.to_string(),
            steps,
            terminal_label: "Got it!".to_string(),
            cooldown: None,
            route_triggers: Vec::new(),
            guards: Vec::new(),
            auto_start_routes: Vec::new(),
        }
    }

    pub fn with_terminal_label(mut self, label: &str) -> Self {
        self.terminal_label = label.to_string();
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn with_trigger(mut self, trigger: RouteTrigger) -> Self {
        self.route_triggers.push(trigger);
        self
    }

    pub fn with_triggers(mut self, triggers: impl IntoIterator<Item = RouteTrigger>) -> Self {
        self.route_triggers.extend(triggers);
        self
    }

    pub fn with_guard(mut self, guard: impl TourGuard + 'static) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    pub fn with_guards<G: TourGuard + 'static>(
        mut self,
        guards: impl IntoIterator<Item = G>,
    ) -> Self {
        for guard in guards {
            self.guards.push(Arc::new(guard));
        }
        self
    }

    pub fn with_auto_start(mut self, routes: impl IntoIterator<Item = Regex>) -> Self {
        self.auto_start_routes.extend(routes);
        self
    }

    /// Whether a navigation to `url` should start this tour on its own.
    pub fn auto_starts_on(&self, url: &str) -> bool {
        self.auto_start_routes.iter().any(|r| r.is_match(url))
    }

    pub fn step(&self, index: usize) -> Option<&TourStep> {
        self.steps.get(index)
    }

    pub fn index_of(&self, step: TourStepId) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step)
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 >= self.steps.len()
    }

    pub fn summary(&self) -> TourSummary {
        TourSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// Picker entry for a tour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TourSummary {
    pub id: TourId,
    pub name: String,
    pub description: String,
}
