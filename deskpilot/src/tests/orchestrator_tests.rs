use super::mock::{
    dead_end, plan, retry, success, BrokenScreen, EventLog, MockBackend, ScriptedPlanner,
    ScriptedValidator, StaticScreen,
};
use crate::action::{Action, MouseButton};
use crate::capture::ScreenSource;
use crate::errors::AutomationError;
use crate::input::InputActor;
use crate::interpreter::Interpreter;
use crate::orchestrator::{Orchestrator, Planner, StatusEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn harness(
    planner: Arc<ScriptedPlanner>,
    validator: Arc<ScriptedValidator>,
    screen: Arc<dyn ScreenSource>,
) -> (Orchestrator, InputActor, EventLog) {
    let (backend, log) = MockBackend::new();
    let actor = InputActor::spawn(Box::new(backend));
    let interpreter =
        Interpreter::new(actor.clone()).with_timings(Duration::ZERO, Duration::ZERO);
    let orchestrator = Orchestrator::new(planner, validator, screen, actor.clone())
        .with_interpreter(interpreter);
    (orchestrator, actor, log)
}

#[tokio::test]
async fn scenario_click_center_completes() {
    super::init_tracing();
    let planner = Arc::new(ScriptedPlanner::new(vec![plan(vec![
        Action::MoveMouse {
            x: 0.5,
            y: 0.5,
            duration: 0,
        },
        Action::Click {
            button: MouseButton::Left,
        },
        Action::Finish,
    ])]));
    let validator = Arc::new(ScriptedValidator::new(vec![success("clicked the center")]));
    let (orchestrator, actor, _log) =
        harness(planner.clone(), validator.clone(), Arc::new(StaticScreen));

    let summary = orchestrator.run("click center of screen").await.unwrap();
    assert_eq!(summary.summary, "clicked the center");
    assert_eq!(summary.iterations, 1);

    // The validator judges against the original goal.
    assert_eq!(validator.seen_goals(), vec!["click center of screen"]);

    // No dangling input state after a terminal state.
    let snapshot = actor.snapshot().await;
    assert!(snapshot.pressed_keys.is_empty() && snapshot.pressed_buttons.is_empty());
}

#[tokio::test]
async fn budget_is_enforced_exactly() {
    let planner = Arc::new(ScriptedPlanner::repeating(plan(vec![Action::Finish])));
    let validator = Arc::new(ScriptedValidator::repeating(retry(
        "not there yet",
        "try again",
    )));
    let (orchestrator, _actor, _log) =
        harness(planner.clone(), validator.clone(), Arc::new(StaticScreen));
    let orchestrator = orchestrator.with_max_iterations(5);

    let err = orchestrator.run("unreachable goal").await.unwrap_err();
    assert!(matches!(err, AutomationError::BudgetExceeded(5)));
    assert_eq!(planner.call_count(), 5, "exactly budget-many iterations");
    assert_eq!(validator.call_count(), 5);
}

#[tokio::test]
async fn resubmit_bypasses_validation_and_forwards_prompt() {
    let planner = Arc::new(ScriptedPlanner::new(vec![
        plan(vec![Action::Resubmit {
            prompt: "X".to_string(),
        }]),
        plan(vec![Action::Finish]),
    ]));
    let validator = Arc::new(ScriptedValidator::new(vec![success("done")]));
    let (orchestrator, _actor, _log) =
        harness(planner.clone(), validator.clone(), Arc::new(StaticScreen));

    orchestrator.run("original goal").await.unwrap();

    assert_eq!(
        validator.call_count(),
        1,
        "the resubmit iteration must not be validated"
    );
    assert_eq!(planner.seen_goals(), vec!["original goal", "X"]);
}

#[tokio::test]
async fn missing_corrective_prompt_is_fatal() {
    let planner = Arc::new(ScriptedPlanner::repeating(plan(vec![Action::Finish])));
    let validator = Arc::new(ScriptedValidator::new(vec![dead_end("wrong screen")]));
    let (orchestrator, _actor, _log) =
        harness(planner.clone(), validator.clone(), Arc::new(StaticScreen));

    let err = orchestrator.run("goal").await.unwrap_err();
    assert!(matches!(err, AutomationError::Validation(_)));
    assert_eq!(planner.call_count(), 1, "no retry without a corrective prompt");
}

#[tokio::test]
async fn fail_action_aborts_with_no_device_events() {
    let planner = Arc::new(ScriptedPlanner::new(vec![plan(vec![Action::Fail])]));
    let validator = Arc::new(ScriptedValidator::new(vec![]));
    let (orchestrator, actor, log) =
        harness(planner.clone(), validator.clone(), Arc::new(StaticScreen));

    let err = orchestrator.run("impossible goal").await.unwrap_err();
    assert!(matches!(err, AutomationError::Execution(_)));
    assert_eq!(validator.call_count(), 0);
    assert!(
        log.events().is_empty(),
        "nothing was pressed, so cleanup posts nothing"
    );

    let snapshot = actor.snapshot().await;
    assert!(snapshot.pressed_keys.is_empty() && snapshot.pressed_buttons.is_empty());
}

#[tokio::test]
async fn planner_failure_ends_the_run() {
    let planner = Arc::new(ScriptedPlanner::failing());
    let validator = Arc::new(ScriptedValidator::new(vec![]));
    let (orchestrator, _actor, _log) = harness(planner, validator, Arc::new(StaticScreen));

    let err = orchestrator.run("goal").await.unwrap_err();
    assert!(matches!(err, AutomationError::Planning(_)));
}

#[tokio::test]
async fn capture_failure_ends_the_run_before_planning() {
    let planner = Arc::new(ScriptedPlanner::repeating(plan(vec![Action::Finish])));
    let validator = Arc::new(ScriptedValidator::new(vec![]));
    let (orchestrator, _actor, _log) =
        harness(planner.clone(), validator, Arc::new(BrokenScreen));

    let err = orchestrator.run("goal").await.unwrap_err();
    assert!(matches!(err, AutomationError::Resource(_)));
    assert_eq!(planner.call_count(), 0);
}

#[tokio::test]
async fn cancellation_is_checked_before_planning() {
    let planner = Arc::new(ScriptedPlanner::repeating(plan(vec![Action::Finish])));
    let validator = Arc::new(ScriptedValidator::new(vec![]));
    let (orchestrator, _actor, _log) =
        harness(planner.clone(), validator, Arc::new(StaticScreen));

    let token = CancellationToken::new();
    token.cancel();

    let err = orchestrator.run_with_cancel("goal", token).await.unwrap_err();
    assert!(matches!(err, AutomationError::Cancelled));
    assert_eq!(planner.call_count(), 0);
}

/// Planner that cancels the run mid-call, as a user interrupt landing
/// while the network request is in flight would.
struct CancellingPlanner {
    token: CancellationToken,
}

#[async_trait]
impl Planner for CancellingPlanner {
    async fn plan(
        &self,
        _goal: &str,
        _screenshot: &[u8],
    ) -> Result<crate::action::ActionPlan, AutomationError> {
        self.token.cancel();
        Ok(plan(vec![Action::Click {
            button: MouseButton::Left,
        }]))
    }
}

#[tokio::test]
async fn cancel_during_planning_stops_the_plan_before_execution() {
    let token = CancellationToken::new();
    let planner = Arc::new(CancellingPlanner {
        token: token.clone(),
    });
    let validator = Arc::new(ScriptedValidator::new(vec![]));

    let (backend, log) = MockBackend::new();
    let actor = InputActor::spawn(Box::new(backend));
    let interpreter =
        Interpreter::new(actor.clone()).with_timings(Duration::ZERO, Duration::ZERO);
    let orchestrator = Orchestrator::new(planner, validator, Arc::new(StaticScreen), actor)
        .with_interpreter(interpreter);

    let err = orchestrator.run_with_cancel("goal", token).await.unwrap_err();
    assert!(matches!(err, AutomationError::Cancelled));
    assert!(
        log.events().is_empty(),
        "a plan received after cancellation must not reach the device"
    );
}

/// Planner that parks until the test opens its gate.
struct GatedPlanner {
    gate: Arc<tokio::sync::Semaphore>,
}

#[async_trait]
impl Planner for GatedPlanner {
    async fn plan(
        &self,
        _goal: &str,
        _screenshot: &[u8],
    ) -> Result<crate::action::ActionPlan, AutomationError> {
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        Ok(plan(vec![Action::Finish]))
    }
}

#[tokio::test]
async fn second_run_while_active_is_rejected() {
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let planner = Arc::new(GatedPlanner { gate: gate.clone() });
    let validator = Arc::new(ScriptedValidator::new(vec![success("done")]));

    let (backend, _log) = MockBackend::new();
    let actor = InputActor::spawn(Box::new(backend));
    let interpreter =
        Interpreter::new(actor.clone()).with_timings(Duration::ZERO, Duration::ZERO);
    let orchestrator = Arc::new(
        Orchestrator::new(planner, validator, Arc::new(StaticScreen), actor)
            .with_interpreter(interpreter),
    );

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run("first goal").await })
    };

    // Let the first run reach the (parked) planner call.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = orchestrator.run("second goal").await.unwrap_err();
    assert!(matches!(err, AutomationError::AlreadyRunning));

    gate.add_permits(1);
    let summary = first.await.unwrap().unwrap();
    assert_eq!(summary.summary, "done");
}

#[tokio::test]
async fn dropped_run_future_frees_the_active_slot() {
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let planner = Arc::new(GatedPlanner { gate: gate.clone() });
    let validator = Arc::new(ScriptedValidator::new(vec![success("done")]));

    let (backend, _log) = MockBackend::new();
    let actor = InputActor::spawn(Box::new(backend));
    let interpreter =
        Interpreter::new(actor.clone()).with_timings(Duration::ZERO, Duration::ZERO);
    let orchestrator = Orchestrator::new(planner, validator, Arc::new(StaticScreen), actor)
        .with_interpreter(interpreter);

    // The first run parks inside the planner call and is dropped at that
    // await point, the way a caller's select! would drop it.
    let dropped =
        tokio::time::timeout(Duration::from_millis(50), orchestrator.run("first goal")).await;
    assert!(dropped.is_err(), "first run should still be parked");

    // The slot must be free again for a fresh run.
    gate.add_permits(1);
    let summary = orchestrator.run("second goal").await.unwrap();
    assert_eq!(summary.summary, "done");
}

#[tokio::test]
async fn status_events_surface_progress() {
    let planner = Arc::new(ScriptedPlanner::new(vec![plan(vec![Action::Finish])]));
    let validator = Arc::new(ScriptedValidator::new(vec![success("done")]));
    let (orchestrator, _actor, _log) = harness(planner, validator, Arc::new(StaticScreen));

    let mut events = orchestrator.subscribe();
    orchestrator.run("goal").await.unwrap();

    let mut saw_iteration = false;
    let mut saw_thought = false;
    let mut finished_ok = false;
    while let Ok(event) = events.try_recv() {
        match event {
            StatusEvent::IterationStarted { iteration: 1, .. } => saw_iteration = true,
            StatusEvent::Thought(_) => saw_thought = true,
            StatusEvent::Finished { success, .. } => finished_ok = success,
            _ => {}
        }
    }
    assert!(saw_iteration && saw_thought && finished_ok);
}
