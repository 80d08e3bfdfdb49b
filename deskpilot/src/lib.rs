//! Goal-driven desktop GUI automation.
//!
//! Given a natural-language goal, the engine repeatedly captures the
//! screen, asks a vision-language planner for a sequence of low-level
//! input actions, executes them against the real mouse and keyboard, and
//! asks a validator whether the goal was reached, finishing, retrying
//! with a corrected goal, or failing under a bounded iteration budget.
//!
//! The [`InputActor`] is the exclusive owner of synthetic input state and
//! guarantees nothing is ever left half pressed; the [`Orchestrator`]
//! drives the plan-execute-validate loop over pluggable [`Planner`],
//! [`Validator`] and [`ScreenSource`] collaborators.

pub mod action;
pub mod capture;
pub mod errors;
pub mod input;
pub mod interpreter;
pub mod orchestrator;
#[cfg(test)]
mod tests;
pub mod vlm;

pub use action::{Action, ActionPlan, Key, MouseButton, ValidationOutcome};
pub use capture::{PrimaryScreen, ScreenSource};
pub use errors::AutomationError;
pub use input::{BackendError, EnigoBackend, InputActor, InputBackend, InputSnapshot};
pub use interpreter::{Interpreter, PlanSignal};
pub use orchestrator::{
    Orchestrator, Planner, RunSummary, StatusEvent, Validator, DEFAULT_MAX_ITERATIONS,
};
pub use vlm::{VlmClient, VlmConfig};
