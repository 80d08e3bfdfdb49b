use thiserror::Error;

/// Terminal failures of an automation run.
///
/// Every variant ends the current run; retrying means starting a new one.
/// The input actor is guaranteed to have released all pressed keys and
/// buttons before any of these is observable by the caller.
#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("planning failed: {0}")]
    Planning(String),

    #[error("execution aborted: {0}")]
    Execution(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("resource unavailable: {0}")]
    Resource(String),

    #[error("iteration budget of {0} exhausted without reaching the goal")]
    BudgetExceeded(u32),

    #[error("run cancelled")]
    Cancelled,

    #[error("a run is already active")]
    AlreadyRunning,
}

impl AutomationError {
    /// Shorthand used by the decode paths: any malformed or unknown action
    /// coming back from the planner is a planning failure, never silently
    /// dropped.
    pub(crate) fn bad_plan(err: impl std::fmt::Display, raw: &str) -> Self {
        let snippet: String = raw.chars().take(200).collect();
        AutomationError::Planning(format!("unparsable plan: {err} (content: {snippet:?})"))
    }
}
