//! The Execution Pipeline: the main Planner/Navigator/Validator loop
//! (spec §4.5), grounded in the teacher's
//! `agent_loop::controller::AgentLoopController::run` callback-driven
//! loop (same termination-condition ordering: error budget, done+validate,
//! done, step budget).

use std::sync::Arc;

use crate::agents::{Navigator, Planner, Validator};
use crate::browser::BrowsingContext;
use crate::chat_model::ChatModel;
use crate::context::{ExecutionContext, TaskOptions};
use crate::errors::Severity;
use crate::events::{Actor, AgentEvent, EventBusHandle, EventData, EventState};
use crate::ledger::MessageLedger;
use crate::prompt::format_system_prompt;
use crate::registry::ActionRegistry;

use browseragent_core_types::TaskId;
use browseragent_event_bus::EventBus;

/// Why a run terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    Completed,
    Failed { reason: String },
    Cancelled,
    OutOfSteps,
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub status: PipelineStatus,
    pub answer: Option<String>,
    /// The source URL the final answer was extracted from, carried
    /// forward from the navigator's last non-error result when present.
    pub source_url: Option<String>,
    pub steps_taken: u32,
}

/// Runs one task from start to termination. Owns the `ExecutionContext`
/// for the task's lifetime; agents receive it by reference only.
pub struct ExecutionPipeline {
    registry: Arc<ActionRegistry>,
    validate_output: bool,
}

impl ExecutionPipeline {
    pub fn new(registry: Arc<ActionRegistry>, validate_output: bool) -> Self {
        Self {
            registry,
            validate_output,
        }
    }

    pub async fn run(
        &self,
        task: &str,
        browser: &dyn BrowsingContext,
        chat: &dyn ChatModel,
        options: &TaskOptions,
        events: &EventBusHandle,
        exec_ctx: ExecutionContext,
    ) -> PipelineResult {
        let navigator = Navigator::new(self.registry.clone());
        let planner = Planner::new();
        let validator = Validator::new();

        let mut ledger = MessageLedger::new();
        ledger.init_task_messages(&format_system_prompt(options.enable_vision), task);

        let now = || chrono::Utc::now();
        self.emit(events, Actor::System, EventState::TaskStart, &exec_ctx, options.max_steps, task.to_string(), now())
            .await;

        let max_validator_failures = options.max_consecutive_failures;
        let mut consecutive_validator_failures = 0u32;

        loop {
            if exec_ctx.is_stopped() {
                self.emit(events, Actor::System, EventState::TaskCancel, &exec_ctx, options.max_steps, "cancelled".into(), now())
                    .await;
                return PipelineResult {
                    status: PipelineStatus::Cancelled,
                    answer: None,
                    source_url: None,
                    steps_taken: exec_ctx.current_step(),
                };
            }
            if exec_ctx.current_step() >= options.max_steps {
                break;
            }

            while exec_ctx.is_paused() && !exec_ctx.is_stopped() {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            if exec_ctx.is_stopped() {
                continue;
            }

            if exec_ctx.current_step() % options.replan_every_n_steps == 0 {
                if let Err(err) = planner.run(&mut ledger, chat, options, &exec_ctx, events, now()).await {
                    if err.severity() == Severity::Fatal {
                        return self.fail(events, &exec_ctx, options, err.details()).await;
                    }
                    // A planning failure is not fatal to the task; the
                    // navigator proceeds without a fresh plan.
                }
            }

            let step_result = navigator
                .run_step(&mut ledger, browser, chat, options, &exec_ctx, events, now())
                .await;

            let step_result = match step_result {
                Ok(r) => r,
                Err(err) if err.severity() == Severity::Cancelled => {
                    self.emit(events, Actor::System, EventState::TaskCancel, &exec_ctx, options.max_steps, "cancelled".into(), now())
                        .await;
                    return PipelineResult {
                        status: PipelineStatus::Cancelled,
                        answer: None,
                        source_url: None,
                        steps_taken: exec_ctx.current_step(),
                    };
                }
                Err(err) if err.severity() == Severity::Fatal => {
                    return self.fail(events, &exec_ctx, options, err.details()).await;
                }
                Err(err) => {
                    let failures = exec_ctx.record_step_failure();
                    if failures > options.max_consecutive_failures {
                        return self
                            .fail(events, &exec_ctx, options, "too many consecutive failures".to_string())
                            .await;
                    }
                    exec_ctx.advance_step();
                    let _ = err;
                    continue;
                }
            };

            if step_result.cancelled {
                self.emit(events, Actor::System, EventState::TaskCancel, &exec_ctx, options.max_steps, "cancelled".into(), now())
                    .await;
                return PipelineResult {
                    status: PipelineStatus::Cancelled,
                    answer: None,
                    source_url: None,
                    steps_taken: exec_ctx.current_step(),
                };
            }

            exec_ctx.reset_failures();

            if step_result.done && self.validate_output {
                let (data, source_url) = step_result
                    .last_non_error_extracted_content()
                    .map(|(content, source)| (content.to_string(), source.map(str::to_string)))
                    .unwrap_or_default();
                match validator.run(&ledger, chat, &data, &exec_ctx, events, now()).await {
                    Ok(v) if v.is_valid => {
                        self.emit(events, Actor::System, EventState::TaskOk, &exec_ctx, options.max_steps, v.answer.clone(), now())
                            .await;
                        return PipelineResult {
                            status: PipelineStatus::Completed,
                            answer: Some(v.answer),
                            source_url,
                            steps_taken: exec_ctx.current_step(),
                        };
                    }
                    Ok(v) => {
                        consecutive_validator_failures += 1;
                        if consecutive_validator_failures > max_validator_failures {
                            return self
                                .fail(events, &exec_ctx, options, "too many consecutive validator failures".to_string())
                                .await;
                        }
                        ledger.add(crate::ledger::Message::user(format!(
                            "Validator rejected the last answer: {}",
                            v.reason
                        )));
                        exec_ctx.advance_step();
                        continue;
                    }
                    Err(err) => {
                        return self.fail(events, &exec_ctx, options, err.details()).await;
                    }
                }
            }

            if step_result.done {
                let (answer, source_url) = match step_result.last_non_error_extracted_content() {
                    Some((content, source)) => (Some(content.to_string()), source.map(str::to_string)),
                    None => (None, None),
                };
                self.emit(
                    events,
                    Actor::System,
                    EventState::TaskOk,
                    &exec_ctx,
                    options.max_steps,
                    answer.clone().unwrap_or_default(),
                    now(),
                )
                .await;
                return PipelineResult {
                    status: PipelineStatus::Completed,
                    answer,
                    source_url,
                    steps_taken: exec_ctx.current_step(),
                };
            }

            exec_ctx.advance_step();
        }

        self.emit(events, Actor::System, EventState::TaskFail, &exec_ctx, options.max_steps, "out of steps".into(), now())
            .await;
        PipelineResult {
            status: PipelineStatus::OutOfSteps,
            answer: None,
            source_url: None,
            steps_taken: exec_ctx.current_step(),
        }
    }

    async fn fail(
        &self,
        events: &EventBusHandle,
        exec_ctx: &ExecutionContext,
        options: &TaskOptions,
        reason: String,
    ) -> PipelineResult {
        self.emit(events, Actor::System, EventState::TaskFail, exec_ctx, options.max_steps, reason.clone(), chrono::Utc::now())
            .await;
        PipelineResult {
            status: PipelineStatus::Failed { reason },
            answer: None,
            source_url: None,
            steps_taken: exec_ctx.current_step(),
        }
    }

    async fn emit(
        &self,
        events: &EventBusHandle,
        actor: Actor,
        state: EventState,
        exec_ctx: &ExecutionContext,
        max_steps: u32,
        details: String,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        let _ = events
            .publish(AgentEvent::new(
                actor,
                state,
                EventData {
                    task_id: exec_ctx.task_id.clone(),
                    step: exec_ctx.current_step(),
                    max_steps,
                    details,
                    details_object: None,
                },
                now,
            ))
            .await;
    }
}

pub fn new_execution_context(task_id: TaskId) -> ExecutionContext {
    ExecutionContext::new(task_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{FakeBrowsingContext, ScriptedPage};
    use crate::chat_model::ScriptedChatModel;
    use crate::events::new_event_bus;
    use crate::registry::actions::default_registry;

    #[tokio::test]
    async fn trivial_completion_without_validation() {
        let browser = FakeBrowsingContext::new(ScriptedPage::new("https://start", "start"));
        let chat = ScriptedChatModel::new(vec![
            serde_json::json!({
                "observation": "on start page", "challenges": "", "done": false,
                "next_steps": "open example.com", "reasoning": ""
            }),
            serde_json::json!({
                "current_state": {"evaluation_previous_goal": "", "memory": "", "next_goal": "finish"},
                "action": [
                    {"go_to_url": {"url": "https://example.com"}},
                    {"done": {"text": "done"}}
                ]
            }),
        ]);
        let registry = Arc::new(default_registry());
        let pipeline = ExecutionPipeline::new(registry, false);
        let options = TaskOptions::minimal();
        let events = new_event_bus();
        let exec_ctx = new_execution_context(TaskId::new());

        let result = pipeline
            .run("open example.com and stop", &browser, &chat, &options, &events, exec_ctx)
            .await;

        assert_eq!(result.status, PipelineStatus::Completed);
        assert_eq!(result.answer.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn out_of_steps_when_navigator_never_completes() {
        let browser = FakeBrowsingContext::new(ScriptedPage::new("https://start", "start"));
        let chat = ScriptedChatModel::new(vec![serde_json::json!({
            "current_state": {"evaluation_previous_goal": "", "memory": "", "next_goal": "wait"},
            "action": [{"wait": {"seconds": 0.01}}]
        })]);
        let registry = Arc::new(default_registry());
        let pipeline = ExecutionPipeline::new(registry, false);
        let mut options = TaskOptions::minimal();
        options.max_steps = 2;
        options.replan_every_n_steps = 1000;
        let events = new_event_bus();
        let exec_ctx = new_execution_context(TaskId::new());

        let result = pipeline.run("loiter forever", &browser, &chat, &options, &events, exec_ctx).await;
        assert_eq!(result.status, PipelineStatus::OutOfSteps);
    }

    #[tokio::test]
    async fn pre_cancelled_context_yields_cancelled_status() {
        let browser = FakeBrowsingContext::new(ScriptedPage::new("https://start", "start"));
        let chat = ScriptedChatModel::done("ignored");
        let registry = Arc::new(default_registry());
        let pipeline = ExecutionPipeline::new(registry, false);
        let options = TaskOptions::minimal();
        let events = new_event_bus();
        let exec_ctx = new_execution_context(TaskId::new());
        exec_ctx.stop();

        let result = pipeline.run("anything", &browser, &chat, &options, &events, exec_ctx).await;
        assert_eq!(result.status, PipelineStatus::Cancelled);
    }
}
