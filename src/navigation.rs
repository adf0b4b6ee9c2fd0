//! Navigation coupling — the router's completed-navigation stream and the
//! watcher that turns matching URLs into out-of-band step reveals.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{RouteTrigger, TourId, TourStepId};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// A navigation that finished, with the URL after redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub url: String,
}

impl NavigationEvent {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Source of completed-navigation events.
pub trait NavigationSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<NavigationEvent>;
}

/// Asks the host router to go somewhere.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, route: &str);
}

/// Broadcast-backed event source the host router publishes into.
pub struct BroadcastNavigation {
    tx: broadcast::Sender<NavigationEvent>,
}

impl BroadcastNavigation {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self { tx })
    }

    /// Publish a completed navigation. Returns the number of listeners.
    pub fn publish(&self, url: impl Into<String>) -> usize {
        // Ok if nobody is listening
        self.tx.send(NavigationEvent::new(url)).unwrap_or(0)
    }
}

impl NavigationSource for BroadcastNavigation {
    fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Navigator for BroadcastNavigation {
    async fn navigate(&self, route: &str) {
        self.publish(route);
    }
}

/// A URL matched one of the active run's triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub run_id: Uuid,
    pub tour_id: TourId,
    pub step: TourStepId,
    pub url: String,
}

/// Receives route matches one at a time, in navigation order.
///
/// The watcher awaits each call before reading the next event, so state
/// changes made here apply in the order the navigations happened. Long
/// work (anchor waits, drawing) belongs in a spawned task.
#[async_trait]
pub trait RouteMatchHandler: Send + Sync {
    async fn on_route_match(&self, route_match: RouteMatch);
}

/// Observes navigation for one tour run at a time.
pub struct NavigationWatcher {
    source: Option<Arc<dyn NavigationSource>>,
    task: Option<JoinHandle<()>>,
}

impl NavigationWatcher {
    pub fn new(source: Option<Arc<dyn NavigationSource>>) -> Self {
        Self { source, task: None }
    }

    pub fn is_attached(&self) -> bool {
        self.task.is_some()
    }

    /// Start observing for `run_id`. Any previous attachment is dropped.
    ///
    /// Subscribes before returning, so navigations published after this
    /// call are never missed.
    pub fn attach(
        &mut self,
        run_id: Uuid,
        tour_id: TourId,
        triggers: Vec<RouteTrigger>,
        on_match: Arc<dyn RouteMatchHandler>,
    ) {
        self.detach();

        let Some(source) = self.source.as_ref() else {
            debug!(tour = %tour_id, "No navigation source; route-triggered steps disabled");
            return;
        };
        if triggers.is_empty() {
            return;
        }

        let mut events = BroadcastStream::new(source.subscribe());
        info!(tour = %tour_id, triggers = triggers.len(), "Navigation watcher attached");

        self.task = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(tour = %tour_id, skipped, "Navigation watcher lagged");
                        continue;
                    }
                };
                if let Some(trigger) = triggers.iter().find(|t| t.matches(&event.url)) {
                    debug!(tour = %tour_id, url = %event.url, step = %trigger.step, "Route matched");
                    on_match
                        .on_route_match(RouteMatch {
                            run_id,
                            tour_id,
                            step: trigger.step,
                            url: event.url,
                        })
                        .await;
                }
            }
        }));
    }

    /// Stop observing. Safe to call repeatedly.
    pub fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Navigation watcher detached");
        }
    }
}

impl Drop for NavigationWatcher {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin::{BOOKING_DETAIL_ROUTE, CAR_DETAIL_ROUTE};
    use crate::catalog::GuidedBookingStep;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records matches; optionally takes its time over each one.
    #[derive(Default)]
    struct Collector {
        seen: Mutex<Vec<RouteMatch>>,
        delay: Option<Duration>,
    }

    impl Collector {
        fn seen(&self) -> Vec<RouteMatch> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RouteMatchHandler for Collector {
        async fn on_route_match(&self, route_match: RouteMatch) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.seen.lock().unwrap().push(route_match);
        }
    }

    fn collecting_handler() -> (Arc<dyn RouteMatchHandler>, Arc<Collector>) {
        let collector = Arc::new(Collector::default());
        (collector.clone(), collector)
    }

    fn car_trigger() -> Vec<RouteTrigger> {
        vec![RouteTrigger::new(CAR_DETAIL_ROUTE, GuidedBookingStep::CarDetail).unwrap()]
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_matching_urls() {
        let nav = BroadcastNavigation::new();
        let mut watcher = NavigationWatcher::new(Some(nav.clone()));
        let (handler, seen) = collecting_handler();
        let run = Uuid::new_v4();

        watcher.attach(run, TourId::GuidedBooking, car_trigger(), handler);
        assert!(watcher.is_attached());

        nav.publish("/cars");
        nav.publish("/cars/123");
        nav.publish("/profile");
        settle().await;

        let seen = seen.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].run_id, run);
        assert_eq!(seen[0].step, TourStepId::from(GuidedBookingStep::CarDetail));
        assert_eq!(seen[0].url, "/cars/123");
    }

    #[tokio::test(start_paused = true)]
    async fn detach_is_idempotent_and_stops_delivery() {
        let nav = BroadcastNavigation::new();
        let mut watcher = NavigationWatcher::new(Some(nav.clone()));
        let (handler, seen) = collecting_handler();

        watcher.attach(Uuid::new_v4(), TourId::GuidedBooking, car_trigger(), handler);
        watcher.detach();
        watcher.detach();
        assert!(!watcher.is_attached());

        nav.publish("/cars/123");
        settle().await;
        assert!(seen.seen().is_empty());
    }

    #[tokio::test]
    async fn no_source_or_triggers_means_not_attached() {
        let (handler, _) = collecting_handler();
        let mut watcher = NavigationWatcher::new(None);
        watcher.attach(Uuid::new_v4(), TourId::GuidedBooking, car_trigger(), handler.clone());
        assert!(!watcher.is_attached());

        let mut watcher = NavigationWatcher::new(Some(BroadcastNavigation::new()));
        watcher.attach(Uuid::new_v4(), TourId::Renter, Vec::new(), handler);
        assert!(!watcher.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn reattach_replaces_previous_run() {
        let nav = BroadcastNavigation::new();
        let mut watcher = NavigationWatcher::new(Some(nav.clone()));
        let (handler, seen) = collecting_handler();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        watcher.attach(first, TourId::GuidedBooking, car_trigger(), handler.clone());
        watcher.attach(second, TourId::GuidedBooking, car_trigger(), handler);
        nav.publish("/cars/9");
        settle().await;

        let seen = seen.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].run_id, second);
    }

    #[tokio::test(start_paused = true)]
    async fn matches_are_handled_one_at_a_time_in_order() {
        let nav = BroadcastNavigation::new();
        let mut watcher = NavigationWatcher::new(Some(nav.clone()));
        let collector = Arc::new(Collector {
            delay: Some(Duration::from_millis(100)),
            ..Collector::default()
        });
        let triggers = vec![
            RouteTrigger::new(CAR_DETAIL_ROUTE, GuidedBookingStep::CarDetail).unwrap(),
            RouteTrigger::new(BOOKING_DETAIL_ROUTE, GuidedBookingStep::BookingDetail).unwrap(),
        ];

        watcher.attach(Uuid::new_v4(), TourId::GuidedBooking, triggers, collector.clone());
        nav.publish("/cars/1");
        nav.publish("/bookings/b-1");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(collector.seen().len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let steps: Vec<TourStepId> = collector.seen().iter().map(|m| m.step).collect();
        assert_eq!(
            steps,
            vec![
                GuidedBookingStep::CarDetail.into(),
                GuidedBookingStep::BookingDetail.into(),
            ]
        );
    }
}
