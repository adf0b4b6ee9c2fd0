//! Tour catalog — static registry of tours and their steps.

pub mod builtin;
pub mod guard;
pub mod model;
pub mod registry;

pub use model::{
    CarDetailStep, GuidedBookingStep, OwnerStep, RenterStep, ResponsiveOverride, RouteTrigger,
    StepAnchor, StepPosition, TourDefinition, TourId, TourStep, TourStepId, TourSummary,
    WelcomeStep,
};
pub use guard::{ElementGuard, GuardContext, RouteGuard, TourGuard};
pub use registry::TourCatalog;
