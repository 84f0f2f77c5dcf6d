//! Typed events the execution pipeline publishes over the event bus so a
//! UI, logger, or test harness can observe task progress without polling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use browseragent_core_types::TaskId;
use browseragent_event_bus::InMemoryBus;

/// Which of the three agents (or the pipeline itself) produced an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Actor {
    Planner,
    Navigator,
    Validator,
    System,
}

/// Coarse lifecycle state an event reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventState {
    TaskStart,
    StepStart,
    StepOk,
    StepFail,
    TaskOk,
    TaskFail,
    TaskCancel,
    TaskPause,
    TaskResume,
}

/// Structured payload carried by an [`AgentEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub task_id: TaskId,
    pub step: u32,
    pub max_steps: u32,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_object: Option<Value>,
}

/// One published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub actor: Actor,
    pub state: EventState,
    pub data: EventData,
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(actor: Actor, state: EventState, data: EventData, now: DateTime<Utc>) -> Self {
        Self {
            actor,
            state,
            data,
            timestamp: now,
        }
    }
}

/// The bus type the execution pipeline publishes [`AgentEvent`]s on.
pub type EventBusHandle = Arc<InMemoryBus<AgentEvent>>;

pub fn new_event_bus() -> EventBusHandle {
    InMemoryBus::new(256)
}
