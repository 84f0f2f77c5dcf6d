//! Demo subcommands: wire the orchestrator to the in-memory reference
//! `BrowsingContext`/`ChatModel` pair (spec.md §6, SPEC_FULL.md §4.10)
//! and run it to completion, printing the event stream and final
//! answer. Grounded in the teacher's per-subcommand `cli/start.rs`
//! (`cmd_start` builds its collaborators, then drives them to
//! completion) but collapsed to one file since this orchestrator has
//! three demo entry points rather than the teacher's two dozen
//! kernel subsystems.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde_json::Value;

use browser_agent_core::browser::mock::{FakeBrowsingContext, ScriptedPage};
use browser_agent_core::registry::actions::default_registry;
use browser_agent_core::{
    AgentEvent, ChatModel, EventState, ExecutionContext, ScriptedChatModel, TaskManager, TaskState,
};
use browseragent_core_types::TaskId;

use crate::config::AppConfig;
use crate::errors::{CliError, CliResult};

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Natural-language task description.
    pub goal: String,

    /// Path to a JSON file containing an array of canned model
    /// responses, replayed in order by the demo ChatModel. Defaults to
    /// a built-in two-step "navigate then finish" script.
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Override the configured step budget for this run.
    #[arg(long)]
    pub max_steps: Option<u32>,
}

#[derive(Args, Clone, Debug)]
pub struct CancelArgs {
    /// Natural-language task description for the demo task.
    #[arg(default_value = "loiter until cancelled")]
    pub goal: String,

    /// Cancel after this many milliseconds.
    #[arg(long, default_value_t = 50)]
    pub after_ms: u64,
}

#[derive(Args, Clone, Debug)]
pub struct ResumeArgs {
    /// Natural-language task description for the demo task.
    #[arg(default_value = "pause then resume")]
    pub goal: String,

    /// Pause for this many milliseconds before resuming.
    #[arg(long, default_value_t = 50)]
    pub pause_ms: u64,
}

fn default_script() -> Vec<Value> {
    vec![
        serde_json::json!({
            "observation": "starting page", "challenges": "", "done": false,
            "next_steps": "navigate then report done", "reasoning": ""
        }),
        serde_json::json!({
            "current_state": {
                "evaluation_previous_goal": "",
                "memory": "",
                "next_goal": "navigate to example.com and finish"
            },
            "action": [
                {"go_to_url": {"url": "https://example.com"}},
                {"done": {"text": "Navigated to example.com"}}
            ]
        }),
    ]
}

fn load_script(path: Option<&PathBuf>) -> CliResult<Vec<Value>> {
    match path {
        None => Ok(default_script()),
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|source| CliError::ScriptRead {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&content)
                .map_err(|err| CliError::Other(anyhow::anyhow!("invalid script JSON: {err}")))
        }
    }
}

fn demo_browser() -> FakeBrowsingContext {
    FakeBrowsingContext::new(ScriptedPage::new("https://start.example", "Start Page"))
}

fn print_event(event: &AgentEvent) {
    let line = format!(
        "[{:?}/{:?}] step {}/{} — {}",
        event.actor, event.state, event.data.step, event.data.max_steps, event.data.details
    );
    match event.state {
        EventState::StepFail | EventState::TaskFail => tracing::warn!("{line}"),
        _ => tracing::info!("{line}"),
    }
}

pub async fn cmd_run(args: RunArgs, app_config: &AppConfig) -> CliResult<()> {
    let script = load_script(args.script.as_ref())?;
    let chat = ScriptedChatModel::new(script);
    let browser = demo_browser();
    let registry = Arc::new(default_registry());
    let events = browser_agent_core::events::new_event_bus();

    let mut options = app_config.task_options();
    if let Some(max_steps) = args.max_steps {
        options = options.with_max_steps(max_steps);
    }

    let mut rx = {
        use browseragent_event_bus::EventBus;
        events.subscribe()
    };

    let mut manager = TaskManager::new(registry, app_config.validate_output);
    let records = manager
        .run_task(&args.goal, &browser, &chat, &options, &events)
        .await;

    while let Ok(event) = rx.try_recv() {
        print_event(&event);
    }

    let last = records.last().ok_or_else(|| CliError::TaskFailed("no task ran".into()))?;
    match last.state {
        TaskState::Completed => {
            if let Some(result) = &last.result {
                println!("done: {}", result.answer.clone().unwrap_or_default());
            }
            Ok(())
        }
        TaskState::Failed => {
            let reason = last
                .result
                .as_ref()
                .map(|r| format!("{:?}", r.status))
                .unwrap_or_default();
            Err(CliError::TaskFailed(reason))
        }
        TaskState::Cancelled => Err(CliError::TaskFailed("cancelled".into())),
        TaskState::Pending | TaskState::Running => Err(CliError::OutOfSteps),
    }
}

pub async fn cmd_cancel(args: CancelArgs) -> CliResult<()> {
    let chat = ScriptedChatModel::new(vec![serde_json::json!({
        "current_state": {"evaluation_previous_goal": "", "memory": "", "next_goal": "wait"},
        "action": [{"wait": {"seconds": 0.05}}]
    })]);
    let browser = demo_browser();
    let registry = Arc::new(default_registry());
    let events = browser_agent_core::events::new_event_bus();
    let mut options = app_config_demo_options();
    options.replan_every_n_steps = 1000;

    let exec_ctx = ExecutionContext::new(TaskId::new());
    let canceller = exec_ctx.clone();
    let after_ms = args.after_ms;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(after_ms)).await;
        canceller.stop();
    });

    let pipeline = browser_agent_core::ExecutionPipeline::new(registry, false);
    let result = pipeline
        .run(&args.goal, &browser, &chat as &dyn ChatModel, &options, &events, exec_ctx)
        .await;

    println!("cancel demo finished with status: {:?}", result.status);
    Ok(())
}

pub async fn cmd_resume(args: ResumeArgs) -> CliResult<()> {
    let chat = ScriptedChatModel::new(vec![serde_json::json!({
        "current_state": {"evaluation_previous_goal": "", "memory": "", "next_goal": "finish"},
        "action": [{"done": {"text": "resumed and finished"}}]
    })]);
    let browser = demo_browser();
    let registry = Arc::new(default_registry());
    let events = browser_agent_core::events::new_event_bus();
    let mut options = app_config_demo_options();
    options.replan_every_n_steps = 1000;

    let exec_ctx = ExecutionContext::new(TaskId::new());
    exec_ctx.pause();
    let resumer = exec_ctx.clone();
    let pause_ms = args.pause_ms;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(pause_ms)).await;
        resumer.resume();
    });

    let pipeline = browser_agent_core::ExecutionPipeline::new(registry, false);
    let result = pipeline
        .run(&args.goal, &browser, &chat as &dyn ChatModel, &options, &events, exec_ctx)
        .await;

    println!("resume demo finished with status: {:?}", result.status);
    Ok(())
}

fn app_config_demo_options() -> browser_agent_core::TaskOptions {
    browser_agent_core::TaskOptions::fast()
}
