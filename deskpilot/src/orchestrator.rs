//! The plan-execute-validate state machine.

use crate::action::{ActionPlan, ValidationOutcome};
use crate::capture::ScreenSource;
use crate::errors::AutomationError;
use crate::input::InputActor;
use crate::interpreter::{Interpreter, PlanSignal};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Cap on plan-execute-validate iterations per run. Keeps a planner that
/// cannot converge from burning time and tokens forever.
pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Produces an action plan for a goal given the current screen.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, goal: &str, screenshot: &[u8]) -> Result<ActionPlan, AutomationError>;
}

/// Judges whether a goal has been reached given the current screen.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(
        &self,
        goal: &str,
        screenshot: &[u8],
    ) -> Result<ValidationOutcome, AutomationError>;
}

/// Intermediate progress surfaced for UI consumption. Observational only;
/// dropping or missing events never affects control flow.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    IterationStarted { iteration: u32, goal: String },
    Thought(String),
    Executing { actions: usize },
    Resubmitted { prompt: String },
    Validated { success: bool, summary: String },
    Finished { success: bool, detail: String },
}

/// Terminal outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The validator's description of what was achieved.
    pub summary: String,
    /// How many plan-execute-validate iterations the run took.
    pub iterations: u32,
}

/// Drives the planner, interpreter and validator toward a goal under a
/// bounded retry budget.
///
/// At most one run may be active at a time; starting a second is rejected
/// with [`AutomationError::AlreadyRunning`] rather than queued. Every
/// terminal path, error paths included, releases all pressed input before
/// the outcome becomes observable.
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    validator: Arc<dyn Validator>,
    screen: Arc<dyn ScreenSource>,
    input: InputActor,
    interpreter: Interpreter,
    max_iterations: u32,
    active: AtomicBool,
    events: broadcast::Sender<StatusEvent>,
}

impl Orchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        validator: Arc<dyn Validator>,
        screen: Arc<dyn ScreenSource>,
        input: InputActor,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            planner,
            validator,
            screen,
            interpreter: Interpreter::new(input.clone()),
            input,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            active: AtomicBool::new(false),
            events,
        }
    }

    /// Override the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Replace the interpreter, e.g. to adjust its timings.
    pub fn with_interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Subscribe to this orchestrator's status events.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Run toward a goal with a fresh (never-cancelled) token.
    pub async fn run(&self, goal: impl Into<String>) -> Result<RunSummary, AutomationError> {
        self.run_with_cancel(goal, CancellationToken::new()).await
    }

    /// Run toward a goal. Cancellation is cooperative: the token is
    /// checked between state transitions, not mid-action-sequence.
    #[instrument(skip(self, goal, cancel))]
    pub async fn run_with_cancel(
        &self,
        goal: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, AutomationError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(AutomationError::AlreadyRunning);
        }
        // Drop guard, so the slot frees even if this future is dropped at
        // an await point instead of running to completion.
        let _active = ActiveGuard(&self.active);

        let result = self.drive(goal.into(), &cancel).await;

        // Terminal guarantee: nothing stays pressed past a run boundary.
        self.input.release_all().await;

        match &result {
            Ok(summary) => {
                info!(iterations = summary.iterations, "run completed");
                self.emit(StatusEvent::Finished {
                    success: true,
                    detail: summary.summary.clone(),
                });
            }
            Err(e) => {
                warn!(error = %e, "run failed");
                self.emit(StatusEvent::Finished {
                    success: false,
                    detail: e.to_string(),
                });
            }
        }
        result
    }

    async fn drive(
        &self,
        goal: String,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, AutomationError> {
        let original_goal = goal.clone();
        let mut current_goal = goal;

        // Logical reset at run start, whatever a previous run left behind.
        self.input.release_all().await;

        for iteration in 1..=self.max_iterations {
            self.check_cancelled(cancel)?;
            self.emit(StatusEvent::IterationStarted {
                iteration,
                goal: current_goal.clone(),
            });

            let screenshot = self.screen.capture().await?;
            self.check_cancelled(cancel)?;

            let plan = self.planner.plan(&current_goal, &screenshot).await?;
            // A cancel that lands during the (slow, network-bound) planner
            // call must stop the plan before any of it touches the device.
            self.check_cancelled(cancel)?;
            debug!(
                thought = %plan.thought,
                actions = plan.actions.len(),
                "plan received"
            );
            self.emit(StatusEvent::Thought(plan.thought.clone()));
            self.emit(StatusEvent::Executing {
                actions: plan.actions.len(),
            });

            let signal = self.interpreter.run_plan(&plan).await?;
            self.check_cancelled(cancel)?;

            if let PlanSignal::Resubmit(prompt) = signal {
                // The planner explicitly asked for another pass; validating
                // a half-done goal would be meaningless.
                info!(%prompt, "planner requested resubmission");
                self.emit(StatusEvent::Resubmitted {
                    prompt: prompt.clone(),
                });
                current_goal = prompt;
                continue;
            }

            // A `finish` action is a hint, not a verdict: the validator
            // always has the last word, judged against the original goal.
            let screenshot = self.screen.capture().await?;
            let verdict = self.validator.validate(&original_goal, &screenshot).await?;
            self.emit(StatusEvent::Validated {
                success: verdict.success,
                summary: verdict.summary.clone(),
            });

            if verdict.success {
                return Ok(RunSummary {
                    summary: verdict.summary,
                    iterations: iteration,
                });
            }

            match verdict.next_prompt {
                Some(prompt) => {
                    info!(%prompt, summary = %verdict.summary, "validation failed, retrying");
                    current_goal = prompt;
                }
                None => {
                    return Err(AutomationError::Validation(format!(
                        "goal not reached and no corrective prompt given: {}",
                        verdict.summary
                    )))
                }
            }
        }

        Err(AutomationError::BudgetExceeded(self.max_iterations))
    }

    fn check_cancelled(&self, cancel: &CancellationToken) -> Result<(), AutomationError> {
        if cancel.is_cancelled() {
            warn!("cancellation requested, aborting run");
            return Err(AutomationError::Cancelled);
        }
        Ok(())
    }

    fn emit(&self, event: StatusEvent) {
        let _ = self.events.send(event);
    }
}

/// Clears the single-active-run flag when dropped.
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
