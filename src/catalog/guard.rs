//! Tour guards — async preconditions checked before a tour starts.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::GuardError;
use crate::locator::ElementProbe;

use super::model::StepAnchor;

/// What a guard may look at.
pub struct GuardContext<'a> {
    /// URL of the last completed navigation, when the runtime follows the
    /// router.
    pub location: Option<&'a str>,
    pub probe: &'a dyn ElementProbe,
}

/// A precondition for starting a tour.
#[async_trait]
pub trait TourGuard: Send + Sync {
    /// Short name for logs (e.g. "has-inventory").
    fn name(&self) -> &str;

    /// `Ok(false)` and `Err(_)` both keep the tour from starting.
    async fn check(&self, ctx: &GuardContext<'_>) -> Result<bool, GuardError>;
}

/// Passes while the current location matches a pattern.
///
/// An unknown location passes: hosts that never report navigation cannot
/// be gated by route.
pub struct RouteGuard {
    name: String,
    pattern: Regex,
}

impl RouteGuard {
    pub fn new(name: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            pattern: Regex::new(pattern)?,
        })
    }
}

#[async_trait]
impl TourGuard for RouteGuard {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &GuardContext<'_>) -> Result<bool, GuardError> {
        Ok(ctx.location.is_none_or(|url| self.pattern.is_match(url)))
    }
}

/// Passes while an anchor is present in the UI right now.
pub struct ElementGuard {
    name: String,
    anchor: StepAnchor,
}

impl ElementGuard {
    pub fn new(name: &str, anchor: StepAnchor) -> Self {
        Self {
            name: name.to_string(),
            anchor,
        }
    }
}

#[async_trait]
impl TourGuard for ElementGuard {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &GuardContext<'_>) -> Result<bool, GuardError> {
        Ok(ctx.probe.is_present(&self.anchor.resolve()).await)
    }
}

/// Run guards in order, stopping at the first one that does not pass.
pub async fn evaluate(guards: &[Arc<dyn TourGuard>], ctx: &GuardContext<'_>) -> bool {
    for guard in guards {
        match guard.check(ctx).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(guard = guard.name(), "Tour guard declined");
                return false;
            }
            Err(e) => {
                warn!(guard = guard.name(), error = %e, "Tour guard failed");
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Present(&'static [&'static str]);

    #[async_trait]
    impl ElementProbe for Present {
        async fn is_present(&self, selector: &str) -> bool {
            self.0.iter().any(|present| *present == selector)
        }
    }

    struct Failing;

    #[async_trait]
    impl TourGuard for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn check(&self, _ctx: &GuardContext<'_>) -> Result<bool, GuardError> {
            Err(GuardError::Failed {
                name: "failing".into(),
                message: "inventory service down".into(),
            })
        }
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl TourGuard for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn check(&self, _ctx: &GuardContext<'_>) -> Result<bool, GuardError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn route_guard_checks_location() {
        let guard = RouteGuard::new("on-cars", r"^/cars").unwrap();
        let probe = Present(&[]);

        let on = GuardContext { location: Some("/cars/12"), probe: &probe };
        assert!(guard.check(&on).await.unwrap());
        let off = GuardContext { location: Some("/profile"), probe: &probe };
        assert!(!guard.check(&off).await.unwrap());
        let unknown = GuardContext { location: None, probe: &probe };
        assert!(guard.check(&unknown).await.unwrap());
    }

    #[tokio::test]
    async fn element_guard_asks_the_probe() {
        let guard = ElementGuard::new("has-inventory", StepAnchor::marker("guided-select-car"));

        let stocked = Present(&["[data-tour-step=\"guided-select-car\"]"]);
        let ctx = GuardContext { location: None, probe: &stocked };
        assert!(guard.check(&ctx).await.unwrap());

        let empty = Present(&[]);
        let ctx = GuardContext { location: None, probe: &empty };
        assert!(!guard.check(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn erroring_guard_blocks_and_short_circuits() {
        let probe = Present(&[]);
        let ctx = GuardContext { location: None, probe: &probe };
        let after = Arc::new(Counting::default());
        let guards: Vec<Arc<dyn TourGuard>> = vec![Arc::new(Failing), after.clone()];

        assert!(!evaluate(&guards, &ctx).await);
        assert_eq!(after.0.load(Ordering::SeqCst), 0);

        let guards: Vec<Arc<dyn TourGuard>> = vec![after.clone()];
        assert!(evaluate(&guards, &ctx).await);
        assert!(evaluate(&[], &ctx).await);
    }
}
