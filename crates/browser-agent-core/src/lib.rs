//! Orchestration core for a browser automation agent: a
//! Planner -> Navigator -> Validator loop over a typed action registry,
//! a message ledger, and an injected browser/model capability pair.

pub mod agents;
pub mod browser;
pub mod chat_model;
pub mod context;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod task_manager;

pub use agents::{Navigator, Planner, Validator};
pub use browser::{BranchPathHash, BranchPathHashSet, BrowsingContext, ElementNode, PageSnapshot};
pub use chat_model::{ChatInvocation, ChatModel, ChatOutcome, ScriptedChatModel};
pub use context::{ExecutionContext, TaskOptions};
pub use errors::{AgentError, Severity};
pub use events::{Actor, AgentEvent, EventBusHandle, EventData, EventState};
pub use ledger::{Message, MessageLedger, Role};
pub use pipeline::{ExecutionPipeline, PipelineResult, PipelineStatus};
pub use registry::{actions::default_registry, ActionDefinition, ActionHandler, ActionRegistry, ActionResult};
pub use task_manager::{TaskManager, TaskManagerStats, TaskRecord, TaskState};
