//! TourRuntime — the single authoritative tour orchestrator.
//!
//! Owns the live run, sequences steps on user actions and route matches,
//! waits for anchors before drawing, and writes outcomes on terminal
//! transitions. Playback never returns errors; only catalog lookups at
//! `start`/`restart` time do.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analytics::{AnalyticsEmitter, AnalyticsEvent, AnalyticsSink};
use crate::catalog::guard::{self, GuardContext};
use crate::catalog::{StepAnchor, StepPosition, TourCatalog, TourDefinition, TourId, TourSummary};
use crate::clock::Clock;
use crate::config::TourConfig;
use crate::error::TourError;
use crate::locator::{ElementLocator, ElementProbe};
use crate::navigation::{
    NavigationSource, NavigationWatcher, Navigator, RouteMatch, RouteMatchHandler,
};
use crate::render::{
    ButtonAction, Presentation, RenderedStep, RenderedTip, StepButton, TipId, TourRenderer,
};
use crate::store::{KeyValueStore, PersistenceStore};

use super::state::{RuntimeSnapshot, StepTicket, TourRuntimeState, TourStatus};

const NEXT_LABEL: &str = "Next";
const BACK_LABEL: &str = "Back";
const LATER_LABEL: &str = "Later";
const TIP_LABEL: &str = "Got it";

/// Collaborators of the runtime.
///
/// Bundles the external ports to reduce argument count.
pub struct TourDeps {
    pub catalog: Arc<TourCatalog>,
    /// `None` when no persistent storage exists; tours are then always offered.
    pub store: Option<Arc<dyn KeyValueStore>>,
    pub probe: Arc<dyn ElementProbe>,
    pub renderer: Arc<dyn TourRenderer>,
    pub navigation: Option<Arc<dyn NavigationSource>>,
    pub navigator: Option<Arc<dyn Navigator>>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub clock: Arc<dyn Clock>,
}

/// Result of a `start` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    /// The same tour is already running.
    AlreadyActive,
    /// Another tour is running; it is never preempted.
    Busy { active: TourId },
    /// Completed before, or inside a dismissal cooldown.
    Ineligible,
    /// One of the tour's guards declined or failed.
    Blocked,
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }
}

/// Why a step is being revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RevealOrigin {
    Start,
    Forward,
    Back,
    Route,
}

impl RevealOrigin {
    /// Only forward progress follows a step's navigation target.
    fn navigates(&self) -> bool {
        matches!(self, Self::Start | Self::Forward)
    }
}

/// How a run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Completed,
    /// Closed through the completion path with the dismissed flag set.
    Deferred,
    Dismissed,
    Cancelled,
}

struct RuntimeInner {
    state: TourRuntimeState,
    watcher: NavigationWatcher,
}

/// The tour orchestrator. Construct once and share the `Arc`.
pub struct TourRuntime {
    config: TourConfig,
    catalog: Arc<TourCatalog>,
    persistence: PersistenceStore,
    probe: Arc<dyn ElementProbe>,
    locator: ElementLocator,
    renderer: Arc<dyn TourRenderer>,
    navigation: Option<Arc<dyn NavigationSource>>,
    navigator: Option<Arc<dyn Navigator>>,
    analytics: AnalyticsEmitter,
    inner: Mutex<RuntimeInner>,
    tips: Mutex<HashSet<TipId>>,
    /// Last completed navigation seen by `watch_navigation`.
    location: Mutex<Option<String>>,
    navigation_task: Mutex<Option<JoinHandle<()>>>,
    this: Weak<TourRuntime>,
}

impl TourRuntime {
    /// Create the runtime.
    pub fn new(config: TourConfig, deps: TourDeps) -> Arc<Self> {
        let analytics = AnalyticsEmitter::new(deps.analytics);
        let persistence =
            PersistenceStore::new(deps.store, config.storage_prefix.clone(), deps.clock);
        let locator = ElementLocator::new(deps.probe.clone(), analytics.clone());

        Arc::new_cyclic(|this| Self {
            config,
            catalog: deps.catalog,
            persistence,
            probe: deps.probe,
            locator,
            renderer: deps.renderer,
            navigation: deps.navigation.clone(),
            navigator: deps.navigator,
            analytics,
            inner: Mutex::new(RuntimeInner {
                state: TourRuntimeState::default(),
                watcher: NavigationWatcher::new(deps.navigation),
            }),
            tips: Mutex::new(HashSet::new()),
            location: Mutex::new(None),
            navigation_task: Mutex::new(None),
            this: this.clone(),
        })
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn config(&self) -> &TourConfig {
        &self.config
    }

    pub fn catalog(&self) -> &TourCatalog {
        &self.catalog
    }

    pub fn persistence(&self) -> &PersistenceStore {
        &self.persistence
    }

    /// Every registered tour, for a picker.
    pub fn list_available(&self) -> Vec<TourSummary> {
        self.catalog.list_available()
    }

    /// Tours `start` would currently accept on eligibility grounds.
    pub async fn eligible_tours(&self) -> Vec<TourSummary> {
        let mut eligible = Vec::new();
        for summary in self.catalog.list_available() {
            if self.persistence.is_eligible(summary.id).await {
                eligible.push(summary);
            }
        }
        eligible
    }

    pub async fn snapshot(&self) -> RuntimeSnapshot {
        self.inner.lock().await.state.snapshot()
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.state.status.is_active()
    }

    /// URL of the last navigation seen while following the router.
    pub async fn location(&self) -> Option<String> {
        self.location.lock().await.clone()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start a tour and reveal its first step.
    ///
    /// Rejected without side effects when a guard declines, the tour is
    /// ineligible, or any tour is already running.
    pub async fn start(&self, tour_id: TourId) -> Result<StartOutcome, TourError> {
        let definition = self.runnable(tour_id)?;

        if !self.guards_pass(&definition).await {
            info!(tour = %tour_id, "Start blocked by tour guard");
            return Ok(StartOutcome::Blocked);
        }

        let (outcome, ticket) = {
            let mut inner = self.inner.lock().await;
            self.begin(&mut inner, &definition).await
        };

        if let Some(ticket) = ticket {
            self.reveal(ticket, definition, RevealOrigin::Start).await;
        }
        Ok(outcome)
    }

    /// Forget a tour's persisted outcome, then start it.
    ///
    /// A running instance of the same tour is cancelled first; a different
    /// running tour makes this a no-op. Guards are not consulted: a restart
    /// is always an explicit request. Clearing and starting happen under
    /// one lock, so no other start can slip in between.
    pub async fn restart(&self, tour_id: TourId) -> Result<StartOutcome, TourError> {
        let definition = self.runnable(tour_id)?;

        let (outcome, ticket) = {
            let mut inner = self.inner.lock().await;
            match inner.state.active_tour_id {
                Some(active) if active == tour_id => {
                    self.finish(&mut inner, Exit::Cancelled).await;
                }
                Some(active) => {
                    info!(tour = %tour_id, active = %active, "Restart rejected: another tour is running");
                    return Ok(StartOutcome::Busy { active });
                }
                None => {}
            }
            self.persistence.clear(tour_id).await;
            info!(tour = %tour_id, "Tour state cleared for restart");
            self.begin(&mut inner, &definition).await
        };

        if let Some(ticket) = ticket {
            self.reveal(ticket, definition, RevealOrigin::Start).await;
        }
        Ok(outcome)
    }

    fn runnable(&self, tour_id: TourId) -> Result<Arc<TourDefinition>, TourError> {
        let definition = self.catalog.get_definition(tour_id)?;
        if definition.steps.is_empty() {
            return Err(TourError::EmptyTour {
                id: tour_id.to_string(),
            });
        }
        Ok(definition)
    }

    async fn guards_pass(&self, definition: &TourDefinition) -> bool {
        if definition.guards.is_empty() {
            return true;
        }
        let location = self.location.lock().await.clone();
        let ctx = GuardContext {
            location: location.as_deref(),
            probe: self.probe.as_ref(),
        };
        guard::evaluate(&definition.guards, &ctx).await
    }

    /// Open a run of `definition` and issue the first step's ticket.
    async fn begin(
        &self,
        inner: &mut RuntimeInner,
        definition: &Arc<TourDefinition>,
    ) -> (StartOutcome, Option<StepTicket>) {
        let tour_id = definition.id;

        if let Some(active) = inner.state.active_tour_id {
            if active == tour_id {
                debug!(tour = %tour_id, "Tour already running");
                return (StartOutcome::AlreadyActive, None);
            }
            info!(tour = %tour_id, active = %active, "Start rejected: another tour is running");
            return (StartOutcome::Busy { active }, None);
        }

        if !self.persistence.is_eligible(tour_id).await {
            debug!(tour = %tour_id, "Tour completed or cooling down, skipping");
            return (StartOutcome::Ineligible, None);
        }

        let run_id = match inner.state.begin_run(Arc::clone(definition)) {
            Ok(run_id) => run_id,
            Err(reason) => {
                warn!(tour = %tour_id, %reason, "Failed to begin tour run");
                return (StartOutcome::AlreadyActive, None);
            }
        };

        info!(tour = %tour_id, %run_id, steps = definition.steps.len(), "Tour started");
        self.analytics.emit(AnalyticsEvent::Started { tour_id });

        if !definition.route_triggers.is_empty() {
            inner.watcher.attach(
                run_id,
                tour_id,
                definition.route_triggers.clone(),
                Arc::new(RouteStepHandler {
                    runtime: self.this.clone(),
                }),
            );
        }

        (
            StartOutcome::Started,
            issue_ticket(&mut inner.state, definition, 0),
        )
    }

    /// Cancel whatever tour is running. Returns whether one was.
    pub async fn cancel_active(&self) -> bool {
        self.cancel().await
    }

    /// Dispatch a rendered button's action.
    pub async fn handle_action(&self, action: ButtonAction) {
        debug!(?action, "Button action");
        match action {
            ButtonAction::Next => self.next().await,
            ButtonAction::Back => self.back().await,
            ButtonAction::Complete => {
                self.complete(false).await;
            }
            ButtonAction::Dismiss => {
                self.dismiss().await;
            }
            ButtonAction::Cancel => {
                self.cancel().await;
            }
        }
    }

    /// Advance one step, completing the tour from the last step.
    pub async fn next(&self) {
        let (ticket, definition) = {
            let mut inner = self.inner.lock().await;
            if !inner.state.status.is_active() {
                debug!("next() without an active tour");
                return;
            }
            let Some(definition) = inner.state.definition().cloned() else {
                return;
            };
            let index = inner.state.current_step_index;
            if definition.is_last(index) {
                self.finish(&mut inner, Exit::Completed).await;
                return;
            }
            (
                issue_ticket(&mut inner.state, &definition, index + 1),
                definition,
            )
        };

        if let Some(ticket) = ticket {
            self.reveal(ticket, definition, RevealOrigin::Forward).await;
        }
    }

    /// Go back one step (staying on the first step).
    pub async fn back(&self) {
        let (ticket, definition) = {
            let mut inner = self.inner.lock().await;
            if !inner.state.status.is_active() {
                debug!("back() without an active tour");
                return;
            }
            let Some(definition) = inner.state.definition().cloned() else {
                return;
            };
            let index = inner.state.current_step_index.saturating_sub(1);
            (issue_ticket(&mut inner.state, &definition, index), definition)
        };

        if let Some(ticket) = ticket {
            self.reveal(ticket, definition, RevealOrigin::Back).await;
        }
    }

    /// Finish the running tour.
    ///
    /// With `dismissed` set the tour is deferred for its cooldown instead of
    /// being marked completed, and the exit is reported as a cancellation.
    pub async fn complete(&self, dismissed: bool) -> bool {
        let exit = if dismissed {
            Exit::Deferred
        } else {
            Exit::Completed
        };
        let mut inner = self.inner.lock().await;
        self.finish(&mut inner, exit).await
    }

    /// Close the running tour and hide it for its cooldown ("see later").
    pub async fn dismiss(&self) -> bool {
        let mut inner = self.inner.lock().await;
        self.finish(&mut inner, Exit::Dismissed).await
    }

    /// Close the running tour without touching persisted state.
    pub async fn cancel(&self) -> bool {
        let mut inner = self.inner.lock().await;
        self.finish(&mut inner, Exit::Cancelled).await
    }

    async fn finish(&self, inner: &mut RuntimeInner, exit: Exit) -> bool {
        let definition = inner.state.definition().cloned();
        let outcome = match exit {
            Exit::Completed => TourStatus::Completed,
            Exit::Deferred | Exit::Dismissed | Exit::Cancelled => TourStatus::Cancelled,
        };

        let finished = match inner.state.finish_run(outcome) {
            Ok(finished) => finished,
            Err(reason) => {
                debug!(?exit, %reason, "Ignoring terminal transition");
                return false;
            }
        };
        inner.watcher.detach();

        let tour_id = finished.tour_id;
        let cooldown = definition
            .and_then(|d| d.cooldown)
            .unwrap_or(self.config.dismiss_cooldown);

        match exit {
            Exit::Completed => {
                self.persistence.mark_completed(tour_id).await;
                self.analytics.emit(AnalyticsEvent::Completed { tour_id });
            }
            Exit::Deferred => {
                self.persistence.mark_dismissed(tour_id, cooldown).await;
                self.analytics.emit(AnalyticsEvent::Cancelled {
                    tour_id,
                    step_id: finished.step_id,
                });
            }
            Exit::Dismissed => {
                self.persistence.mark_dismissed(tour_id, cooldown).await;
                self.analytics
                    .emit(AnalyticsEvent::DismissedTemporarily { tour_id });
            }
            Exit::Cancelled => {
                self.analytics.emit(AnalyticsEvent::Cancelled {
                    tour_id,
                    step_id: finished.step_id,
                });
            }
        }

        if let Err(e) = self.renderer.hide().await {
            warn!(tour = %tour_id, error = %e, "Failed to hide tour overlay");
        }
        info!(tour = %tour_id, ?exit, "Tour finished");
        true
    }

    // ── Following navigation ────────────────────────────────────────

    /// Follow the host router: remember the current location for guards
    /// and open auto-start tours while nothing is running.
    ///
    /// Returns `false` without a navigation source. Calling it again keeps
    /// the existing subscription.
    pub async fn watch_navigation(&self) -> bool {
        let Some(source) = self.navigation.as_ref() else {
            debug!("No navigation source; auto-start disabled");
            return false;
        };
        let mut task = self.navigation_task.lock().await;
        if task.is_some() {
            return true;
        }

        let mut events = BroadcastStream::new(source.subscribe());
        let this = self.this.clone();
        *task = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "Navigation follower lagged");
                        continue;
                    }
                };
                let Some(runtime) = this.upgrade() else {
                    break;
                };
                *runtime.location.lock().await = Some(event.url.clone());
                runtime.auto_start(&event.url).await;
            }
        }));
        info!("Following navigation for auto-start tours");
        true
    }

    /// Open the first auto-start tour for `url` that is eligible and whose
    /// guards pass. Does nothing while a tour is running.
    ///
    /// The first step is revealed in the background.
    pub async fn auto_start(&self, url: &str) -> Option<TourId> {
        if self.is_active().await {
            return None;
        }

        for definition in self.catalog.auto_starting_on(url) {
            if !self.guards_pass(&definition).await {
                debug!(tour = %definition.id, url, "Auto-start blocked by tour guard");
                continue;
            }
            let (outcome, ticket) = {
                let mut inner = self.inner.lock().await;
                self.begin(&mut inner, &definition).await
            };
            match outcome {
                StartOutcome::Started => {
                    let tour_id = definition.id;
                    info!(tour = %tour_id, url, "Tour auto-started");
                    if let (Some(ticket), Some(runtime)) = (ticket, self.this.upgrade()) {
                        tokio::spawn(async move {
                            runtime.reveal(ticket, definition, RevealOrigin::Start).await;
                        });
                    }
                    return Some(tour_id);
                }
                StartOutcome::AlreadyActive | StartOutcome::Busy { .. } => return None,
                StartOutcome::Ineligible | StartOutcome::Blocked => {}
            }
        }
        None
    }

    // ── Step reveal ─────────────────────────────────────────────────

    /// Make a route-triggered step current, at most once per run.
    ///
    /// Runs inside the watcher loop, so matches are claimed in navigation
    /// order.
    async fn claim_route_step(
        &self,
        route_match: &RouteMatch,
    ) -> Option<(StepTicket, Arc<TourDefinition>)> {
        let mut inner = self.inner.lock().await;
        if !inner.state.status.is_active() || inner.state.run_id != Some(route_match.run_id) {
            debug!(url = %route_match.url, "Route match for a finished run, ignoring");
            return None;
        }
        let definition = inner.state.definition().cloned()?;
        let Some(index) = definition.index_of(route_match.step) else {
            warn!(step = %route_match.step, "Route trigger points at an unknown step");
            return None;
        };
        if !inner.state.mark_route_step_shown(route_match.step) {
            debug!(step = %route_match.step, url = %route_match.url, "Route step already shown this run");
            return None;
        }
        let ticket = inner.state.issue_ticket(index)?;
        Some((ticket, definition))
    }

    /// Reveal a ticket's step, following on to the next step whenever a
    /// required anchor never shows up.
    async fn reveal(&self, ticket: StepTicket, definition: Arc<TourDefinition>, origin: RevealOrigin) {
        let mut pending = Some((ticket, origin));
        while let Some((ticket, origin)) = pending.take() {
            pending = self.reveal_step(ticket, &definition, origin).await;
        }
    }

    /// Wait for the ticket's anchor, then draw the step if the ticket is
    /// still current. Returns the follow-up ticket when a required step is
    /// skipped.
    async fn reveal_step(
        &self,
        ticket: StepTicket,
        definition: &Arc<TourDefinition>,
        origin: RevealOrigin,
    ) -> Option<(StepTicket, RevealOrigin)> {
        let step = definition.step(ticket.index)?;
        let narrow = self.is_narrow();
        let (position, text, anchor) = step.resolved(narrow);

        if origin.navigates() {
            if let (Some(route), Some(navigator)) = (step.route.as_deref(), self.navigator.as_ref()) {
                debug!(step = %step.id, route, "Navigating for step");
                navigator.navigate(route).await;
            }
        }

        let selector = anchor.resolve();
        let outcome = self
            .locator
            .wait_for(
                &selector,
                self.config.element_wait_timeout,
                self.config.poll_interval,
            )
            .await;

        let mut inner = self.inner.lock().await;
        if !inner.state.is_current(&ticket) {
            debug!(step = %ticket.step_id, ?origin, "Discarding stale step reveal");
            return None;
        }

        if step.required && !outcome.is_found() {
            info!(step = %step.id, "Required anchor missing, skipping step");
            if definition.is_last(ticket.index) {
                self.finish(&mut inner, Exit::Completed).await;
                return None;
            }
            return issue_ticket(&mut inner.state, definition, ticket.index + 1)
                .map(|next| (next, RevealOrigin::Forward));
        }

        let rendered = RenderedStep {
            tour_id: definition.id,
            step_id: step.id,
            index: ticket.index,
            total: definition.steps.len(),
            title: step.title.clone(),
            text: text.to_string(),
            position,
            anchor: outcome.is_found().then_some(selector),
            presentation: if narrow {
                Presentation::Modal
            } else {
                Presentation::Highlight
            },
            buttons: buttons_for(definition, ticket.index),
            cancellable: true,
        };

        if let Err(e) = self.renderer.show_step(rendered).await {
            warn!(step = %step.id, error = %e, "Failed to render step");
        }
        self.analytics.emit(AnalyticsEvent::StepViewed {
            tour_id: definition.id,
            step_id: step.id,
        });
        None
    }

    fn is_narrow(&self) -> bool {
        self.renderer
            .viewport_width()
            .is_some_and(|width| width < self.config.mobile_breakpoint_px)
    }

    // ── Quick tips ──────────────────────────────────────────────────

    /// Show a single, unpersisted tip that hides itself after the
    /// configured duration.
    pub async fn show_quick_tip(
        &self,
        anchor: StepAnchor,
        message: &str,
        position: StepPosition,
    ) -> TipId {
        let tip = RenderedTip {
            id: Uuid::new_v4(),
            anchor: anchor.resolve(),
            message: message.to_string(),
            position,
            button_label: TIP_LABEL.to_string(),
        };
        let tip_id = tip.id;

        self.tips.lock().await.insert(tip_id);
        if let Err(e) = self.renderer.show_tip(tip).await {
            warn!(%tip_id, error = %e, "Failed to render quick tip");
        }

        let this = self.this.clone();
        let duration = self.config.quick_tip_duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(runtime) = this.upgrade() {
                if runtime.dismiss_quick_tip(tip_id).await {
                    debug!(%tip_id, "Quick tip expired");
                }
            }
        });

        tip_id
    }

    /// Hide a tip. Returns `false` if it was already gone.
    pub async fn dismiss_quick_tip(&self, tip_id: TipId) -> bool {
        if !self.tips.lock().await.remove(&tip_id) {
            return false;
        }
        if let Err(e) = self.renderer.hide_tip(tip_id).await {
            warn!(%tip_id, error = %e, "Failed to hide quick tip");
        }
        true
    }
}

impl Drop for TourRuntime {
    fn drop(&mut self) {
        if let Some(task) = self.navigation_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Claims route-triggered steps in navigation order; only the anchor wait
/// and the draw run detached.
struct RouteStepHandler {
    runtime: Weak<TourRuntime>,
}

#[async_trait]
impl RouteMatchHandler for RouteStepHandler {
    async fn on_route_match(&self, route_match: RouteMatch) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        let Some((ticket, definition)) = runtime.claim_route_step(&route_match).await else {
            return;
        };
        info!(
            tour = %route_match.tour_id,
            step = %route_match.step,
            url = %route_match.url,
            "Revealing route-triggered step"
        );
        tokio::spawn(async move {
            runtime.reveal(ticket, definition, RevealOrigin::Route).await;
        });
    }
}

/// Make `index` current, marking it shown if a route trigger targets it so
/// a later navigation does not reveal it a second time.
fn issue_ticket(
    state: &mut TourRuntimeState,
    definition: &TourDefinition,
    index: usize,
) -> Option<StepTicket> {
    let ticket = state.issue_ticket(index)?;
    if definition
        .route_triggers
        .iter()
        .any(|t| t.step == ticket.step_id)
    {
        state.mark_route_step_shown(ticket.step_id);
    }
    Some(ticket)
}

/// "Later" on the first step, "Back" after it; "Next" until the last step,
/// which carries the tour's terminal label.
fn buttons_for(definition: &TourDefinition, index: usize) -> Vec<StepButton> {
    let mut buttons = Vec::with_capacity(2);
    if index == 0 {
        buttons.push(StepButton::secondary(LATER_LABEL, ButtonAction::Dismiss));
    } else {
        buttons.push(StepButton::secondary(BACK_LABEL, ButtonAction::Back));
    }
    if definition.is_last(index) {
        buttons.push(StepButton::primary(
            &definition.terminal_label,
            ButtonAction::Complete,
        ));
    } else {
        buttons.push(StepButton::primary(NEXT_LABEL, ButtonAction::Next));
    }
    buttons
}
