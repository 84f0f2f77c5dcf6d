//! The Action Schema Registry: a static catalog of action definitions
//! together with the model-facing schema synthesized from it.
//!
//! Grounded in the teacher's `action-flow::executor` dispatch-by-name
//! pattern, reshaped per spec §4.1/§9: `ActionDefinition` is a variant
//! record keyed by name, dispatch is a lookup, and the union schema is
//! assembled at construction rather than hand-written per action.

pub mod actions;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::BrowsingContext;
use crate::errors::AgentError;

/// Outcome of dispatching one action. Handlers never panic and never
/// return an unhandled error: capability failures are folded into
/// `error` so the pipeline can feed them back to the model as memory.
#[derive(Debug, Clone, Default)]
pub struct ActionResult {
    pub is_done: bool,
    pub extracted_content: Option<String>,
    pub error: Option<String>,
    pub include_in_memory: bool,
    pub source_url: Option<String>,
}

impl ActionResult {
    pub fn ok(extracted_content: impl Into<String>) -> Self {
        Self {
            extracted_content: Some(extracted_content.into()),
            ..Default::default()
        }
    }

    pub fn memory_note(note: impl Into<String>) -> Self {
        Self {
            extracted_content: Some(note.into()),
            include_in_memory: true,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            include_in_memory: true,
            ..Default::default()
        }
    }

    pub fn done(text: impl Into<String>) -> Self {
        Self {
            is_done: true,
            extracted_content: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One action's behaviour. Implemented once per registered action; kept
/// separate from `ActionDefinition` so the definition itself stays a
/// plain data record (name, description, schema) as spec §9 asks.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(&self, browser: &dyn BrowsingContext, input: &Value) -> Result<ActionResult, AgentError>;
}

/// A registered action: name, human description, input schema, whether
/// its input carries an element `index`, and its handler.
pub struct ActionDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub has_index: bool,
    handler: Arc<dyn ActionHandler>,
}

impl ActionDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        has_index: bool,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            has_index,
            handler,
        }
    }

    fn required_fields(&self) -> Vec<String> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    /// Light structural validation: every required field from the schema
    /// must be present in `raw_input`. Full JSON-Schema validation is not
    /// needed here — the model's tool-call arguments are already
    /// constrained by the schema handed back to it; this is a defence
    /// against a malformed or hand-authored call.
    fn validate(&self, raw_input: &Value) -> Result<(), AgentError> {
        if self.input_schema.get("properties").is_none() {
            return Ok(());
        }
        let obj = raw_input.as_object().ok_or_else(|| {
            AgentError::invalid_input(format!("'{}' expects an object input", self.name))
        })?;
        for field in self.required_fields() {
            if !obj.contains_key(&field) {
                return Err(AgentError::invalid_input(format!(
                    "'{}' missing required field '{field}'",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Pulls the `index` field out of a raw call if this action is
    /// index-bearing.
    pub fn index_of(&self, raw_input: &Value) -> Option<u32> {
        if !self.has_index {
            return None;
        }
        raw_input.get("index").and_then(Value::as_u64).map(|v| v as u32)
    }
}

/// Holds every registered action and answers the registry contract from
/// spec §4.1: register/get/build-schema/dispatch/index-of.
#[derive(Default)]
pub struct ActionRegistry {
    defs: HashMap<String, ActionDefinition>,
    /// Preserves registration order so the synthesized schema and any
    /// listing stays stable across runs.
    order: Vec<String>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition. A later call with the same name overwrites
    /// the earlier one, per spec: "name must be unique; later
    /// registrations overwrite."
    pub fn register(&mut self, def: ActionDefinition) {
        if !self.defs.contains_key(&def.name) {
            self.order.push(def.name.clone());
        }
        self.defs.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&ActionDefinition> {
        self.defs.get(name)
    }

    /// Produces `{current_state, action: [OneOf(actions)*]}`: the
    /// `action` array's elements are partial records, each with exactly
    /// one non-null key naming the chosen action.
    pub fn build_model_output_schema(&self) -> Value {
        let action_variants: Vec<Value> = self
            .order
            .iter()
            .filter_map(|name| self.defs.get(name))
            .map(|def| {
                serde_json::json!({
                    "type": "object",
                    "properties": { def.name.clone(): def.input_schema.clone() },
                    "additionalProperties": false
                })
            })
            .collect();

        serde_json::json!({
            "type": "object",
            "required": ["current_state", "action"],
            "properties": {
                "current_state": {
                    "type": "object",
                    "required": ["evaluation_previous_goal", "memory", "next_goal"],
                    "properties": {
                        "evaluation_previous_goal": { "type": "string" },
                        "memory": { "type": "string" },
                        "next_goal": { "type": "string" }
                    }
                },
                "action": {
                    "type": "array",
                    "items": { "oneOf": action_variants }
                }
            }
        })
    }

    /// Dispatches a call by name. Validates input (empty schema short-
    /// circuits straight to the handler with an empty object) then
    /// invokes the registered handler.
    pub async fn dispatch(
        &self,
        name: &str,
        raw_input: &Value,
        browser: &dyn BrowsingContext,
    ) -> Result<ActionResult, AgentError> {
        let def = self
            .get(name)
            .ok_or_else(|| AgentError::UnknownAction(name.to_string()))?;

        if def.input_schema.get("properties").is_none() {
            return def.handler.call(browser, &serde_json::json!({})).await;
        }

        def.validate(raw_input)?;
        def.handler.call(browser, raw_input).await
    }

    pub fn index_of(&self, name: &str, raw_input: &Value) -> Option<u32> {
        self.get(name).and_then(|def| def.index_of(raw_input))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}
