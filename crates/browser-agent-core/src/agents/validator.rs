//! The Validator Agent (spec §4.4): checks whether the navigator's
//! extracted content satisfies the task before the pipeline terminates.

use serde_json::Value;

use crate::chat_model::{ChatInvocation, ChatModel};
use crate::context::ExecutionContext;
use crate::errors::AgentError;
use crate::events::{Actor, AgentEvent, EventBusHandle, EventData, EventState};
use crate::ledger::MessageLedger;

use browseragent_event_bus::EventBus;

#[derive(Debug, Clone)]
pub struct ValidatorOutput {
    pub is_valid: bool,
    pub reason: String,
    pub answer: String,
}

fn validator_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": ["is_valid", "reason", "answer"],
        "properties": {
            "is_valid": {"type": "boolean"},
            "reason": {"type": "string"},
            "answer": {"type": "string"}
        }
    })
}

fn parse_validator_output(raw: &Value) -> Result<ValidatorOutput, AgentError> {
    Ok(ValidatorOutput {
        is_valid: raw
            .get("is_valid")
            .and_then(Value::as_bool)
            .ok_or_else(|| AgentError::ModelFormat("missing 'is_valid'".into()))?,
        reason: raw.get("reason").and_then(Value::as_str).unwrap_or_default().to_string(),
        answer: raw.get("answer").and_then(Value::as_str).unwrap_or_default().to_string(),
    })
}

pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Validates the given extracted content (the most recent non-error
    /// `extractedContent` from the navigator's action results) against
    /// the task recorded in the ledger.
    pub async fn run(
        &self,
        ledger: &MessageLedger,
        chat: &dyn ChatModel,
        data_to_validate: &str,
        exec_ctx: &ExecutionContext,
        events: &EventBusHandle,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<ValidatorOutput, AgentError> {
        let _ = events
            .publish(AgentEvent::new(
                Actor::Validator,
                EventState::StepStart,
                EventData {
                    task_id: exec_ctx.task_id.clone(),
                    step: exec_ctx.current_step(),
                    max_steps: 0,
                    details: "validating".into(),
                    details_object: None,
                },
                now,
            ))
            .await;

        let mut messages = ledger.get_all().to_vec();
        messages.push(crate::ledger::Message::user(format!(
            "Data to validate: \"{data_to_validate}\""
        )));

        let schema = validator_schema();
        let invocation = ChatInvocation {
            messages: &messages,
            tool_name: "validator_output",
            schema: &schema,
            cancellation: exec_ctx.cancellation_token(),
        };
        let raw = chat.invoke(invocation).await?.into_value();
        let validated = parse_validator_output(&raw)?;

        let _ = events
            .publish(AgentEvent::new(
                Actor::Validator,
                if validated.is_valid {
                    EventState::StepOk
                } else {
                    EventState::StepFail
                },
                EventData {
                    task_id: exec_ctx.task_id.clone(),
                    step: exec_ctx.current_step(),
                    max_steps: 0,
                    details: validated.reason.clone(),
                    details_object: Some(raw),
                },
                now,
            ))
            .await;

        Ok(validated)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
