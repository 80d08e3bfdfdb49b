//! Maps planner actions onto the input actor.

use crate::action::{Action, ActionPlan};
use crate::errors::AutomationError;
use crate::input::InputActor;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Pause after every device action so the target application can process
/// the event before the next one fires.
const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Hold time between the down and up halves of a click.
const CLICK_HOLD: Duration = Duration::from_millis(100);

/// Control-flow outcome of a consumed plan. `finish`, `resubmit` and the
/// end of the action list are signals for the orchestrator, not device
/// operations.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanSignal {
    /// Proceed to validation (plan ran to completion or hit `finish`).
    Validate,
    /// Re-plan with this goal, skipping validation.
    Resubmit(String),
}

/// Executes one plan's actions strictly in order against the input actor.
pub struct Interpreter {
    input: InputActor,
    settle: Duration,
    click_hold: Duration,
}

impl Interpreter {
    pub fn new(input: InputActor) -> Self {
        Self {
            input,
            settle: SETTLE_DELAY,
            click_hold: CLICK_HOLD,
        }
    }

    /// Override the settle and click-hold pauses.
    pub fn with_timings(mut self, settle: Duration, click_hold: Duration) -> Self {
        self.settle = settle;
        self.click_hold = click_hold;
        self
    }

    /// Run a plan to completion or to its first signal.
    ///
    /// Whatever happens, every pressed key and button is released before
    /// this returns: no dangling input state survives a plan boundary.
    pub async fn run_plan(&self, plan: &ActionPlan) -> Result<PlanSignal, AutomationError> {
        let result = self.execute(plan).await;
        self.input.release_all().await;
        result
    }

    async fn execute(&self, plan: &ActionPlan) -> Result<PlanSignal, AutomationError> {
        for (index, action) in plan.actions.iter().enumerate() {
            debug!(index, total = plan.actions.len(), ?action, "executing action");
            match action {
                Action::MoveMouse { x, y, duration } => {
                    let (px, py) = self.to_pixels(*x, *y).await?;
                    self.input.smooth_move(px, py, *duration).await;
                }
                Action::MouseDown { button } => self.input.mouse_down(*button).await,
                Action::MouseUp { button } => self.input.mouse_up(*button).await,
                Action::Click { button } => {
                    self.input.mouse_down(*button).await;
                    sleep(self.click_hold).await;
                    self.input.mouse_up(*button).await;
                }
                Action::KeyPress { key } => self.input.key_press(*key).await,
                Action::KeyRelease { key } => self.input.key_release(*key).await,
                Action::PasteText { text } => self.input.paste_text(text).await,
                Action::Delay { duration } => self.input.delay(*duration).await,
                Action::Scroll { dx, dy } => self.input.scroll(*dx, *dy).await,
                Action::AllRelease => self.input.release_all().await,
                // Signals short-circuit: nothing queued after them runs.
                Action::Resubmit { prompt } => return Ok(PlanSignal::Resubmit(prompt.clone())),
                Action::Finish => return Ok(PlanSignal::Validate),
                Action::Fail => {
                    return Err(AutomationError::Execution(
                        "planner reported the goal unreachable from the current screen".into(),
                    ))
                }
            }
            sleep(self.settle).await;
        }
        Ok(PlanSignal::Validate)
    }

    /// Map normalized top-left-origin coordinates onto the primary
    /// display's pixel space.
    async fn to_pixels(&self, x: f64, y: f64) -> Result<(i32, i32), AutomationError> {
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return Err(AutomationError::Planning(format!(
                "coordinate ({x}, {y}) outside the normalized [0, 1] range"
            )));
        }
        let (width, height) = self.input.display_size().await;
        Ok((
            (x * f64::from(width)).round() as i32,
            (y * f64::from(height)).round() as i32,
        ))
    }
}
