//! The Planner Agent (spec §4.3): produces a periodic plan record and
//! writes it into the ledger as a `<plan>...</plan>` block.
//!
//! Grounded in the teacher's `agent-core::planner` module (`AgentPlanner`
//! trait, `PlannerConfig` with `max_steps`/`auto_navigate` tunables),
//! reshaped to the narrower `PlannerOutput` record this system's pipeline
//! actually consumes.

use serde_json::Value;

use crate::chat_model::{ChatInvocation, ChatModel};
use crate::context::{ExecutionContext, TaskOptions};
use crate::errors::AgentError;
use crate::events::{Actor, AgentEvent, EventBusHandle, EventData, EventState};
use crate::ledger::{strip_vision_from_last, MessageLedger};

use browseragent_event_bus::EventBus;

/// Structured plan produced every `planning_interval` steps.
#[derive(Debug, Clone, Default)]
pub struct PlannerOutput {
    pub observation: String,
    pub challenges: String,
    pub done: bool,
    pub next_steps: String,
    pub reasoning: String,
    pub page_element_hints: Vec<u32>,
    pub data_sources: Vec<String>,
}

fn parse_planner_output(raw: &Value) -> Result<PlannerOutput, AgentError> {
    let get_str = |field: &str| raw.get(field).and_then(Value::as_str).unwrap_or_default().to_string();
    Ok(PlannerOutput {
        observation: get_str("observation"),
        challenges: get_str("challenges"),
        done: raw.get("done").and_then(Value::as_bool).unwrap_or(false),
        next_steps: get_str("next_steps"),
        reasoning: get_str("reasoning"),
        page_element_hints: raw
            .get("page_element_hints")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_u64().map(|n| n as u32)).collect())
            .unwrap_or_default(),
        data_sources: raw
            .get("data_sources")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default(),
    })
}

/// Renders a [`PlannerOutput`] back to the text stored in the `<plan>`
/// ledger block, so the navigator's plain-text read of the plan stays
/// human-readable.
fn render_plan(plan: &PlannerOutput) -> String {
    format!(
        "observation: {}\nchallenges: {}\ndone: {}\nnext_steps: {}\nreasoning: {}",
        plan.observation, plan.challenges, plan.done, plan.next_steps, plan.reasoning
    )
}

const PLANNER_SCHEMA_TOOL_NAME: &str = "planner_output";

fn planner_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["observation", "challenges", "done", "next_steps", "reasoning"],
        "properties": {
            "observation": {"type": "string"},
            "challenges": {"type": "string"},
            "done": {"type": "boolean"},
            "next_steps": {"type": "string"},
            "reasoning": {"type": "string"},
            "page_element_hints": {"type": "array", "items": {"type": "integer"}},
            "data_sources": {"type": "array", "items": {"type": "string"}}
        }
    })
}

pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Runs one planning turn and appends the plan to the ledger. When
    /// `options.enable_vision` is true but `options.use_vision_for_planner`
    /// is false, the image attachment on the last ledger message is
    /// stripped before invocation; the ledger itself is left untouched so
    /// the navigator still sees it on its own turn.
    pub async fn run(
        &self,
        ledger: &mut MessageLedger,
        chat: &dyn ChatModel,
        options: &TaskOptions,
        exec_ctx: &ExecutionContext,
        events: &EventBusHandle,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<PlannerOutput, AgentError> {
        let _ = events
            .publish(AgentEvent::new(
                Actor::Planner,
                EventState::StepStart,
                EventData {
                    task_id: exec_ctx.task_id.clone(),
                    step: exec_ctx.current_step(),
                    max_steps: 0,
                    details: "planning".into(),
                    details_object: None,
                },
                now,
            ))
            .await;

        let schema = planner_schema();
        let stripped;
        let messages = if options.enable_vision && !options.use_vision_for_planner {
            stripped = strip_vision_from_last(ledger.get_all());
            stripped.as_slice()
        } else {
            ledger.get_all()
        };
        let invocation = ChatInvocation {
            messages,
            tool_name: PLANNER_SCHEMA_TOOL_NAME,
            schema: &schema,
            cancellation: exec_ctx.cancellation_token(),
        };
        let raw = chat.invoke(invocation).await?.into_value();
        let plan = parse_planner_output(&raw)?;

        ledger.add_plan(&render_plan(&plan));

        let _ = events
            .publish(AgentEvent::new(
                Actor::Planner,
                EventState::StepOk,
                EventData {
                    task_id: exec_ctx.task_id.clone(),
                    step: exec_ctx.current_step(),
                    max_steps: 0,
                    details: plan.next_steps.clone(),
                    details_object: Some(raw),
                },
                now,
            ))
            .await;

        Ok(plan)
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}
