//! The `ChatModel` capability: the one LLM-invocation seam the three
//! agents share. Grounded in the teacher's `agent-core::llm_provider`
//! (`LlmProvider` trait + `MockLlmProvider`), reshaped around a single
//! structured-output-or-tool-call invocation rather than a plan/replan
//! split, since all three agents here go through the same call shape.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::AgentError;
use crate::ledger::Message;

/// One request to the model: the full message history, the name of the
/// tool/function the model is expected to call, the JSON schema that
/// call's arguments must satisfy, and a cancellation token observed for
/// the duration of the call.
pub struct ChatInvocation<'a> {
    pub messages: &'a [Message],
    pub tool_name: &'a str,
    pub schema: &'a Value,
    pub cancellation: CancellationToken,
}

/// Result of a model invocation once the structured-output/tool-call
/// fallback ladder (spec §4.2 step 6) has run.
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    /// The model's structured output parsed cleanly against `schema`.
    Structured(Value),
    /// Structured output failed but the raw reply carried a tool call
    /// matching `tool_name`; its arguments are adopted as the outcome.
    ToolCallFallback(Value),
}

impl ChatOutcome {
    /// The parsed arguments, regardless of which path produced them.
    pub fn into_value(self) -> Value {
        match self {
            ChatOutcome::Structured(v) => v,
            ChatOutcome::ToolCallFallback(v) => v,
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, invocation: ChatInvocation<'_>) -> Result<ChatOutcome, AgentError>;
}

/// Deterministic mock used by tests and the CLI's demo mode. Mirrors the
/// teacher's `MockLlmProvider`: it never calls out to a real endpoint and
/// its behaviour is a pure function of how many history turns have
/// accumulated, so tests can assert exact step counts.
pub struct ScriptedChatModel {
    /// Canned outcomes returned in order, one per call. The last entry is
    /// reused once the script is exhausted.
    script: Vec<Value>,
    /// Advances on every `invoke`, independent of which agent is calling
    /// or how the ledger was mutated in between.
    calls_made: std::sync::atomic::AtomicUsize,
}

impl ScriptedChatModel {
    pub fn new(script: Vec<Value>) -> Self {
        assert!(!script.is_empty(), "scripted chat model needs at least one response");
        Self {
            script,
            calls_made: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// A model that immediately reports the task done with `result`.
    pub fn done(result: impl Into<String>) -> Self {
        Self::new(vec![serde_json::json!({
            "done": true,
            "result": result.into(),
        })])
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn invoke(&self, invocation: ChatInvocation<'_>) -> Result<ChatOutcome, AgentError> {
        if invocation.cancellation.is_cancelled() {
            return Err(AgentError::RequestCancelled);
        }
        let call_index = self
            .calls_made
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            .min(self.script.len() - 1);
        Ok(ChatOutcome::Structured(self.script[call_index].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MessageLedger;

    #[tokio::test]
    async fn scripted_model_replays_in_order() {
        let model = ScriptedChatModel::new(vec![
            serde_json::json!({"step": 1}),
            serde_json::json!({"step": 2}),
        ]);
        let mut ledger = MessageLedger::new();
        ledger.init_task_messages("sys", "task");

        let outcome = model
            .invoke(ChatInvocation {
                messages: ledger.get_all(),
                tool_name: "act",
                schema: &serde_json::json!({}),
                cancellation: CancellationToken::new(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.into_value(), serde_json::json!({"step": 1}));

        ledger.add(Message::assistant("turn"));
        let outcome = model
            .invoke(ChatInvocation {
                messages: ledger.get_all(),
                tool_name: "act",
                schema: &serde_json::json!({}),
                cancellation: CancellationToken::new(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.into_value(), serde_json::json!({"step": 2}));
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_invoking() {
        let model = ScriptedChatModel::done("result");
        let token = CancellationToken::new();
        token.cancel();
        let err = model
            .invoke(ChatInvocation {
                messages: &[],
                tool_name: "done",
                schema: &serde_json::json!({}),
                cancellation: token,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::RequestCancelled));
    }
}
