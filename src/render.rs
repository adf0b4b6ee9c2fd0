//! Rendering port — the external tour UI draws what the engine describes
//! and reports button presses back as [`ButtonAction`]s.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::{StepPosition, TourId, TourStepId};
use crate::error::RenderError;

/// Identifier of a displayed quick tip.
pub type TipId = Uuid;

/// What a button does when pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Back,
    Next,
    Complete,
    /// Defer the tour ("see later").
    Dismiss,
    /// Close without deferring.
    Cancel,
}

/// Visual weight of a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonKind {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepButton {
    pub label: String,
    pub action: ButtonAction,
    pub kind: ButtonKind,
}

impl StepButton {
    pub fn primary(label: &str, action: ButtonAction) -> Self {
        Self {
            label: label.to_string(),
            action,
            kind: ButtonKind::Primary,
        }
    }

    pub fn secondary(label: &str, action: ButtonAction) -> Self {
        Self {
            label: label.to_string(),
            action,
            kind: ButtonKind::Secondary,
        }
    }
}

/// How the step is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    /// Full-screen overlay, used on narrow viewports.
    Modal,
    /// Inline highlight of the anchor.
    Highlight,
}

/// A step ready to draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedStep {
    pub tour_id: TourId,
    pub step_id: TourStepId,
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub text: String,
    pub position: StepPosition,
    /// `None` when the anchor never appeared; draw un-anchored.
    pub anchor: Option<String>,
    pub presentation: Presentation,
    pub buttons: Vec<StepButton>,
    /// Whether a close control is shown (wired to [`ButtonAction::Cancel`]).
    pub cancellable: bool,
}

impl RenderedStep {
    pub fn primary_button(&self) -> Option<&StepButton> {
        self.buttons.iter().find(|b| b.kind == ButtonKind::Primary)
    }

    pub fn has_action(&self, action: ButtonAction) -> bool {
        self.buttons.iter().any(|b| b.action == action)
    }
}

/// A single free-standing tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedTip {
    pub id: TipId,
    pub anchor: String,
    pub message: String,
    pub position: StepPosition,
    pub button_label: String,
}

/// Adapter over the tour UI library.
#[async_trait]
pub trait TourRenderer: Send + Sync {
    /// Current viewport width in px, if known.
    fn viewport_width(&self) -> Option<u32> {
        None
    }

    /// Draw a step, replacing whatever step is on screen.
    ///
    /// Called while the runtime holds its state lock. Report button presses
    /// from the UI's own event path; calling back into
    /// `TourRuntime::handle_action` from inside this method deadlocks.
    async fn show_step(&self, step: RenderedStep) -> Result<(), RenderError>;

    /// Remove the tour overlay.
    async fn hide(&self) -> Result<(), RenderError>;

    async fn show_tip(&self, tip: RenderedTip) -> Result<(), RenderError>;

    async fn hide_tip(&self, tip_id: TipId) -> Result<(), RenderError>;
}
