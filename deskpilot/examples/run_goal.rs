//! Example: drive the desktop toward a natural-language goal.
//!
//! Prerequisites:
//! - `SILICONFLOW_API_KEY` set in the environment
//! - Accessibility (input injection) and screen-recording permission
//!   granted to the terminal running this
//!
//! Run this example:
//! ```bash
//! export SILICONFLOW_API_KEY="sk-..."
//! cargo run --example run_goal -- "open the browser and search for rust"
//! ```

use deskpilot::{InputActor, Orchestrator, PrimaryScreen, StatusEvent, VlmClient, VlmConfig};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let goal = env::args().skip(1).collect::<Vec<_>>().join(" ");
    if goal.is_empty() {
        eprintln!("usage: run_goal <goal>");
        std::process::exit(2);
    }

    let client = Arc::new(VlmClient::new(VlmConfig::from_env())?);
    let input = InputActor::native()?;
    let orchestrator = Arc::new(Orchestrator::new(
        client.clone(),
        client,
        Arc::new(PrimaryScreen),
        input,
    ));

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                StatusEvent::IterationStarted { iteration, goal } => {
                    println!("--- iteration {iteration}: {goal}");
                }
                StatusEvent::Thought(thought) => println!("thought: {thought}"),
                StatusEvent::Executing { actions } => println!("executing {actions} actions"),
                StatusEvent::Resubmitted { prompt } => println!("resubmitting: {prompt}"),
                StatusEvent::Validated { success, summary } => {
                    println!("validated (success={success}): {summary}");
                }
                StatusEvent::Finished { .. } => break,
            }
        }
    });

    let result = orchestrator.run(goal).await;
    let _ = printer.await;

    match result {
        Ok(summary) => {
            println!("completed in {} iteration(s): {}", summary.iterations, summary.summary);
            Ok(())
        }
        Err(e) => {
            eprintln!("run failed: {e}");
            std::process::exit(1);
        }
    }
}
