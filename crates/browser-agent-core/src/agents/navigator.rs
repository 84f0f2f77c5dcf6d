//! The Navigator Agent: per-step observation, model invocation, and
//! mid-batch-safe action execution (spec §4.2).
//!
//! Grounded in the teacher's `agent_loop::controller::execute_step`
//! (observe/decide/act ordering, done-action short-circuit) and
//! `action-flow::executor`'s retry-with-timeout idiom for the model-call
//! retry ladder.

use std::time::Duration;

use serde_json::Value;

use crate::browser::{BranchPathHashSet, BrowsingContext};
use crate::chat_model::{ChatInvocation, ChatModel};
use crate::context::{ExecutionContext, TaskOptions};
use crate::errors::{AgentError, Severity};
use crate::events::{Actor, AgentEvent, EventBusHandle, EventData, EventState};
use crate::ledger::{Message, MessageLedger};
use crate::prompt::{format_state_update, format_system_prompt};
use crate::registry::{ActionRegistry, ActionResult};

use browseragent_event_bus::EventBus;

/// Free-text introspection the navigator reports each turn.
#[derive(Debug, Clone, Default)]
pub struct AgentBrain {
    pub evaluation_previous_goal: String,
    pub memory: String,
    pub next_goal: String,
}

/// One parsed navigator turn: the introspection record plus the ordered
/// list of `(action_name, input)` calls to execute.
#[derive(Debug, Clone)]
pub struct NavigatorOutput {
    pub current_state: AgentBrain,
    pub action: Vec<(String, Value)>,
}

/// Parses a raw model reply against the registry's schema shape: a record
/// with `current_state` and an `action` array whose elements are partial
/// records with exactly one non-null key (spec §9).
pub fn parse_navigator_output(raw: &Value) -> Result<NavigatorOutput, AgentError> {
    let state = raw
        .get("current_state")
        .ok_or_else(|| AgentError::ModelFormat("missing 'current_state'".into()))?;
    let current_state = AgentBrain {
        evaluation_previous_goal: state
            .get("evaluation_previous_goal")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        memory: state.get("memory").and_then(Value::as_str).unwrap_or_default().to_string(),
        next_goal: state.get("next_goal").and_then(Value::as_str).unwrap_or_default().to_string(),
    };

    let raw_actions = raw
        .get("action")
        .and_then(Value::as_array)
        .ok_or_else(|| AgentError::ModelFormat("missing 'action' array".into()))?;

    let mut action = Vec::with_capacity(raw_actions.len());
    for entry in raw_actions {
        let obj = match entry.as_object() {
            Some(obj) => obj,
            // Null entries are skipped per spec §3 invariants.
            None => continue,
        };
        let mut inhabited: Vec<(&String, &Value)> = obj.iter().filter(|(_, v)| !v.is_null()).collect();
        if inhabited.len() != 1 {
            return Err(AgentError::ModelFormat(format!(
                "each action entry must have exactly one non-null key, got {}",
                inhabited.len()
            )));
        }
        let (name, input) = inhabited.remove(0);
        action.push((name.clone(), input.clone()));
    }

    Ok(NavigatorOutput { current_state, action })
}

/// Outcome of one navigator turn.
#[derive(Debug, Clone)]
pub struct NavigatorStepOutcome {
    pub brain: AgentBrain,
    pub results: Vec<ActionResult>,
    pub done: bool,
    pub cancelled: bool,
}

impl NavigatorStepOutcome {
    pub fn last_non_error_extracted_content(&self) -> Option<(&str, Option<&str>)> {
        self.results
            .iter()
            .rev()
            .find(|r| !r.is_error() && r.extracted_content.is_some())
            .map(|r| (r.extracted_content.as_deref().unwrap(), r.source_url.as_deref()))
    }
}

const MAX_MODEL_RETRIES: u32 = 3;
const RETRY_BACKOFF_CAP_MS: u64 = 5_000;
const BATCH_ERROR_BUDGET: u32 = 3;

pub struct Navigator {
    registry: std::sync::Arc<ActionRegistry>,
}

impl Navigator {
    pub fn new(registry: std::sync::Arc<ActionRegistry>) -> Self {
        Self { registry }
    }

    /// Runs one full navigator turn: observe, invoke the model, execute
    /// the returned action batch with mid-batch safety.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_step(
        &self,
        ledger: &mut MessageLedger,
        browser: &dyn BrowsingContext,
        chat: &dyn ChatModel,
        options: &TaskOptions,
        exec_ctx: &ExecutionContext,
        events: &EventBusHandle,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<NavigatorStepOutcome, AgentError> {
        if exec_ctx.is_stopped() {
            return Ok(NavigatorStepOutcome {
                brain: AgentBrain::default(),
                results: vec![],
                done: false,
                cancelled: true,
            });
        }

        let snapshot = browser.get_state(options.enable_vision).await?;
        let mut memory_hints: Vec<ActionResult> = Vec::new();
        if snapshot.interactive_count() == 0 && !snapshot.url.starts_with("about:") {
            memory_hints.push(ActionResult::memory_note(
                "No interactive elements were found on this page; consider navigating or waiting.",
            ));
        }

        self.emit(
            events,
            Actor::Navigator,
            EventState::StepStart,
            exec_ctx,
            options.max_steps,
            "observing page".into(),
            now,
        )
        .await;

        let state_text = format_state_update(&snapshot, &memory_hints, options.max_elements, 100);
        let mut state_message = Message::user(state_text);
        if options.enable_vision {
            if let Some(shot) = &snapshot.screenshot_base64 {
                state_message = state_message.with_image(shot.clone());
            }
        }
        ledger.add_state_message(state_message);

        let schema = self.registry.build_model_output_schema();
        let outcome = self
            .invoke_with_retry(ledger, chat, &schema, exec_ctx)
            .await;

        ledger.remove_last_state_message();

        let raw = match outcome {
            Ok(value) => value,
            Err(AgentError::RequestCancelled) => {
                self.emit(events, Actor::Navigator, EventState::StepFail, exec_ctx, options.max_steps, "cancelled".into(), now)
                    .await;
                return Ok(NavigatorStepOutcome {
                    brain: AgentBrain::default(),
                    results: vec![],
                    done: false,
                    cancelled: true,
                });
            }
            Err(err) => {
                self.emit(events, Actor::Navigator, EventState::StepFail, exec_ctx, options.max_steps, err.details(), now)
                    .await;
                return Err(err);
            }
        };

        ledger.add_model_output(format_system_prompt(options.enable_vision), raw.clone());

        let parsed = match parse_navigator_output(&raw) {
            Ok(p) => p,
            Err(err) => {
                self.emit(events, Actor::Navigator, EventState::StepFail, exec_ctx, options.max_steps, err.details(), now)
                    .await;
                return Err(err);
            }
        };

        let capped: Vec<_> = parsed
            .action
            .into_iter()
            .take(options.max_actions_per_step as usize)
            .collect();

        let (mut results, cancelled) = self
            .do_multi_action(browser, &capped, exec_ctx, options)
            .await;
        results.splice(0..0, memory_hints);

        let done = results.iter().any(|r| r.is_done);

        self.emit(
            events,
            Actor::Navigator,
            if cancelled {
                EventState::StepFail
            } else {
                EventState::StepOk
            },
            exec_ctx,
            options.max_steps,
            parsed.current_state.next_goal.clone(),
            now,
        )
        .await;

        Ok(NavigatorStepOutcome {
            brain: parsed.current_state,
            results,
            done,
            cancelled,
        })
    }

    async fn invoke_with_retry(
        &self,
        ledger: &MessageLedger,
        chat: &dyn ChatModel,
        schema: &Value,
        exec_ctx: &ExecutionContext,
    ) -> Result<Value, AgentError> {
        let mut attempt = 0;
        let mut backoff_ms = 500u64;
        loop {
            if exec_ctx.is_stopped() {
                return Err(AgentError::RequestCancelled);
            }
            let invocation = ChatInvocation {
                messages: ledger.get_all(),
                tool_name: "navigator_action",
                schema,
                cancellation: exec_ctx.cancellation_token(),
            };
            match chat.invoke(invocation).await {
                Ok(outcome) => return Ok(outcome.into_value()),
                // Fatal/Cancelled kinds (auth, forbidden, cancellation) short-circuit
                // immediately; only MODEL_FORMAT climbs the retry ladder.
                Err(err) if err.severity() != Severity::StepFailure => return Err(err),
                Err(err @ AgentError::ModelFormat(_)) => {
                    attempt += 1;
                    if attempt >= MAX_MODEL_RETRIES {
                        return Err(AgentError::ModelFormat(format!(
                            "model invocation failed after {MAX_MODEL_RETRIES} attempts: {err}"
                        )));
                    }
                    tokio::time::sleep(Duration::from_millis(backoff_ms.min(RETRY_BACKOFF_CAP_MS))).await;
                    backoff_ms *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Executes an action batch with mid-batch change detection (spec
    /// §4.2's `doMultiAction`). Returns the collected results and whether
    /// execution was cut short by cancellation.
    async fn do_multi_action(
        &self,
        browser: &dyn BrowsingContext,
        actions: &[(String, Value)],
        exec_ctx: &ExecutionContext,
        options: &TaskOptions,
    ) -> (Vec<ActionResult>, bool) {
        let mut results = Vec::with_capacity(actions.len());
        let mut error_count = 0u32;

        let initial_hashes: BranchPathHashSet = match browser.get_state(false).await {
            Ok(s) => s.branch_path_hashes(),
            Err(_) => BranchPathHashSet::default(),
        };
        let _ = browser.remove_highlight().await;

        for (i, (name, input)) in actions.iter().enumerate() {
            if exec_ctx.is_stopped() {
                return (results, true);
            }

            if i > 0 {
                if self.registry.index_of(name, input).is_some() {
                    match browser.get_state(false).await {
                        Ok(snapshot) => {
                            let current_hashes = snapshot.branch_path_hashes();
                            if !current_hashes.is_subset_of(&initial_hashes) {
                                results.push(ActionResult::memory_note(format!(
                                    "Something new appeared after action {i} / {}",
                                    actions.len()
                                )));
                                break;
                            }
                        }
                        Err(err) => {
                            results.push(ActionResult::error(err.to_string()));
                            error_count += 1;
                            if error_count > BATCH_ERROR_BUDGET {
                                break;
                            }
                            continue;
                        }
                    }
                }
            }

            match self.registry.dispatch(name, input, browser).await {
                Ok(result) => {
                    let is_err = result.is_error();
                    results.push(result);
                    if is_err {
                        error_count += 1;
                        if error_count > BATCH_ERROR_BUDGET {
                            break;
                        }
                    }
                }
                Err(err) => {
                    results.push(ActionResult::error(err.to_string()));
                    error_count += 1;
                    if error_count > BATCH_ERROR_BUDGET {
                        break;
                    }
                }
            }

            if results.last().map(|r| r.is_done).unwrap_or(false) {
                break;
            }

            if exec_ctx.is_stopped() {
                return (results, true);
            }

            tokio::time::sleep(Duration::from_millis(options.settle_delay_ms)).await;
        }

        (results, false)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{FakeBrowsingContext, ScriptedPage};
    use crate::browser::ElementNode;
    use crate::chat_model::ScriptedChatModel;
    use crate::context::ExecutionContext;
    use crate::events::new_event_bus;
    use crate::registry::actions::default_registry;
    use browseragent_core_types::TaskId;

    fn navigator() -> Navigator {
        Navigator::new(std::sync::Arc::new(default_registry()))
    }

    #[test]
    fn last_non_error_result_carries_its_source_url() {
        let outcome = NavigatorStepOutcome {
            brain: AgentBrain::default(),
            results: vec![
                ActionResult::error("stale element"),
                ActionResult {
                    source_url: Some("https://example.com/page".to_string()),
                    ..ActionResult::ok("Opened new tab")
                },
            ],
            done: false,
            cancelled: false,
        };
        let (content, source) = outcome.last_non_error_extracted_content().unwrap();
        assert_eq!(content, "Opened new tab");
        assert_eq!(source, Some("https://example.com/page"));
    }

    #[test]
    fn parses_one_key_per_action_entry() {
        let raw = serde_json::json!({
            "current_state": {"evaluation_previous_goal": "", "memory": "", "next_goal": "go"},
            "action": [{"go_to_url": {"url": "https://x"}}]
        });
        let parsed = parse_navigator_output(&raw).unwrap();
        assert_eq!(parsed.action.len(), 1);
        assert_eq!(parsed.action[0].0, "go_to_url");
    }

    #[test]
    fn rejects_multi_key_action_entry() {
        let raw = serde_json::json!({
            "current_state": {"evaluation_previous_goal": "", "memory": "", "next_goal": ""},
            "action": [{"go_to_url": {"url": "https://x"}, "wait": {"seconds": 1}}]
        });
        assert!(parse_navigator_output(&raw).is_err());
    }

    #[tokio::test]
    async fn mid_batch_change_aborts_second_indexed_action() {
        let page = ScriptedPage::new("https://x", "x")
            .with_element(ElementNode::new("a", "/html/body/a[0]"))
            .with_element(ElementNode::new("button", "/html/body/button[1]"));
        let browser = FakeBrowsingContext::new(page);
        let mutated = ScriptedPage::new("https://x", "x")
            .with_element(ElementNode::new("a", "/html/body/a[0]"))
            .with_element(ElementNode::new("button", "/html/body/button[1]"))
            .with_element(ElementNode::new("div", "/html/body/div.modal[2]"));
        browser.mutate_page_after_next_click(mutated);

        let nav = navigator();
        let exec_ctx = ExecutionContext::new(TaskId::new());
        let options = TaskOptions::minimal();
        let actions = vec![
            ("click_element".to_string(), serde_json::json!({"index": 0})),
            ("click_element".to_string(), serde_json::json!({"index": 1})),
        ];
        let (results, cancelled) = nav.do_multi_action(&browser, &actions, &exec_ctx, &options).await;
        assert!(!cancelled);
        assert_eq!(results.len(), 2);
        assert!(results[1].extracted_content.clone().unwrap().contains("Something new appeared"));
    }

    #[tokio::test]
    async fn batch_aborts_after_error_budget_exceeded() {
        let browser = FakeBrowsingContext::new(ScriptedPage::new("https://x", "x"));
        let nav = navigator();
        let exec_ctx = ExecutionContext::new(TaskId::new());
        let options = TaskOptions::minimal();
        // Every click targets a non-existent index, producing an error result each time.
        let actions: Vec<_> = (0..6)
            .map(|_| ("click_element".to_string(), serde_json::json!({"index": 9})))
            .collect();
        let (results, _cancelled) = nav.do_multi_action(&browser, &actions, &exec_ctx, &options).await;
        assert!(results.len() < 6);
        assert!(results.iter().filter(|r| r.is_error()).count() <= BATCH_ERROR_BUDGET + 1);
    }

    #[tokio::test]
    async fn cancellation_before_invocation_short_circuits_step() {
        let browser = FakeBrowsingContext::new(ScriptedPage::new("https://x", "x"));
        let chat = ScriptedChatModel::done("ignored");
        let nav = navigator();
        let exec_ctx = ExecutionContext::new(TaskId::new());
        exec_ctx.stop();
        let options = TaskOptions::minimal();
        let events = new_event_bus();
        let mut ledger = MessageLedger::new();
        ledger.init_task_messages("sys", "task");

        let outcome = nav
            .run_step(&mut ledger, &browser, &chat, &options, &exec_ctx, &events, chrono::Utc::now())
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn full_step_executes_model_chosen_actions() {
        let browser = FakeBrowsingContext::new(ScriptedPage::new("https://start", "start"));
        let chat = ScriptedChatModel::new(vec![serde_json::json!({
            "current_state": {"evaluation_previous_goal": "", "memory": "", "next_goal": "navigate"},
            "action": [{"go_to_url": {"url": "https://example.com"}}]
        })]);
        let nav = navigator();
        let exec_ctx = ExecutionContext::new(TaskId::new());
        let options = TaskOptions::minimal();
        let events = new_event_bus();
        let mut ledger = MessageLedger::new();
        ledger.init_task_messages("sys", "open example.com");

        let outcome = nav
            .run_step(&mut ledger, &browser, &chat, &options, &exec_ctx, &events, chrono::Utc::now())
            .await
            .unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(outcome.results.len(), 1);
        assert!(!ledger.has_pinned_state_message());
    }

    /// Always fails with a fixed error, counting how many times it was called.
    struct FailingChatModel {
        error: fn() -> AgentError,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChatModel for FailingChatModel {
        async fn invoke(
            &self,
            _invocation: crate::chat_model::ChatInvocation<'_>,
        ) -> Result<crate::chat_model::ChatOutcome, AgentError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err((self.error)())
        }
    }

    #[tokio::test]
    async fn fatal_model_error_short_circuits_without_retry() {
        let browser = FakeBrowsingContext::new(ScriptedPage::new("https://x", "x"));
        let chat = FailingChatModel {
            error: || AgentError::ModelAuth("bad key".to_string()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let nav = navigator();
        let exec_ctx = ExecutionContext::new(TaskId::new());
        let options = TaskOptions::minimal();
        let events = new_event_bus();
        let mut ledger = MessageLedger::new();
        ledger.init_task_messages("sys", "task");

        let err = nav
            .run_step(&mut ledger, &browser, &chat, &options, &exec_ctx, &events, chrono::Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(chat.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn model_format_error_retries_up_to_the_ladder_cap() {
        let browser = FakeBrowsingContext::new(ScriptedPage::new("https://x", "x"));
        let chat = FailingChatModel {
            error: || AgentError::ModelFormat("bad json".to_string()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let nav = navigator();
        let exec_ctx = ExecutionContext::new(TaskId::new());
        let options = TaskOptions::minimal();
        let events = new_event_bus();
        let mut ledger = MessageLedger::new();
        ledger.init_task_messages("sys", "task");

        let err = nav
            .run_step(&mut ledger, &browser, &chat, &options, &exec_ctx, &events, chrono::Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.severity(), Severity::StepFailure);
        assert_eq!(
            chat.calls.load(std::sync::atomic::Ordering::SeqCst),
            MAX_MODEL_RETRIES as usize
        );
    }
}
