//! Task Manager (spec §4.7): wraps the pipeline with a lifecycle and a
//! single-task-at-a-time follow-up queue.
//!
//! Grounded in the teacher's task-lifecycle conventions used throughout
//! `agent-core` (`pending`/`running`/terminal states) and the
//! `AgentLoopController`'s status enum shape.

use std::collections::VecDeque;
use std::sync::Arc;

use browseragent_core_types::TaskId;

use crate::browser::BrowsingContext;
use crate::chat_model::ChatModel;
use crate::context::{ExecutionContext, TaskOptions};
use crate::events::EventBusHandle;
use crate::pipeline::{ExecutionPipeline, PipelineResult, PipelineStatus};
use crate::registry::ActionRegistry;

/// Lifecycle state of one queued or running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub goal: String,
    pub state: TaskState,
    pub result: Option<PipelineResult>,
}

/// Aggregate counts by state, exposed for observability.
#[derive(Debug, Clone, Default)]
pub struct TaskManagerStats {
    pub pending: u32,
    pub running: u32,
    pub completed: u32,
    pub failed: u32,
    pub cancelled: u32,
}

/// Runs exactly one task at a time, queueing any `add_follow_up` calls
/// made while a task is in flight.
pub struct TaskManager {
    registry: Arc<ActionRegistry>,
    validate_output: bool,
    queue: VecDeque<(TaskId, String)>,
    history: Vec<TaskRecord>,
    current_exec_ctx: Option<ExecutionContext>,
}

impl TaskManager {
    pub fn new(registry: Arc<ActionRegistry>, validate_output: bool) -> Self {
        Self {
            registry,
            validate_output,
            queue: VecDeque::new(),
            history: Vec::new(),
            current_exec_ctx: None,
        }
    }

    /// Queues a follow-up task. Returns its assigned id. The placeholder
    /// history entry created here is the *same* record `run_one` later
    /// updates in place, so a queued follow-up never double-counts in
    /// `stats()`.
    pub fn add_follow_up(&mut self, goal: impl Into<String>) -> TaskId {
        let goal = goal.into();
        let id = self.push_pending(goal.clone());
        self.queue.push_back((id.clone(), goal));
        id
    }

    /// Records a `Pending` placeholder in history and returns its id.
    fn push_pending(&mut self, goal: String) -> TaskId {
        let id = TaskId::new();
        self.history.push(TaskRecord {
            id: id.clone(),
            goal,
            state: TaskState::Pending,
            result: None,
        });
        id
    }

    /// Requests cancellation of the currently running task, if any.
    /// Idempotent.
    pub fn cancel_current(&self) {
        if let Some(ctx) = &self.current_exec_ctx {
            ctx.stop();
        }
    }

    pub fn pause_current(&self) {
        if let Some(ctx) = &self.current_exec_ctx {
            ctx.pause();
        }
    }

    pub fn resume_current(&self) {
        if let Some(ctx) = &self.current_exec_ctx {
            ctx.resume();
        }
    }

    pub fn stats(&self) -> TaskManagerStats {
        let mut stats = TaskManagerStats::default();
        for record in &self.history {
            match record.state {
                TaskState::Pending => stats.pending += 1,
                TaskState::Running => stats.running += 1,
                TaskState::Completed => stats.completed += 1,
                TaskState::Failed => stats.failed += 1,
                TaskState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub fn history(&self) -> &[TaskRecord] {
        &self.history
    }

    /// Runs a single task to completion (or cancellation/failure), then
    /// drains any follow-ups queued via `add_follow_up` in the same way.
    pub async fn run_task(
        &mut self,
        goal: &str,
        browser: &dyn BrowsingContext,
        chat: &dyn ChatModel,
        options: &TaskOptions,
        events: &EventBusHandle,
    ) -> Vec<TaskRecord> {
        let primary_id = self.push_pending(goal.to_string());
        let mut completed = Vec::new();
        completed.push(
            self.run_one(primary_id, goal, browser, chat, options, events)
                .await,
        );

        while let Some((id, follow_up_goal)) = self.queue.pop_front() {
            completed.push(
                self.run_one(id, &follow_up_goal, browser, chat, options, events)
                    .await,
            );
        }

        completed
    }

    /// Runs the task already recorded as `Pending` under `task_id`,
    /// updating that same history record in place rather than appending
    /// a new one.
    async fn run_one(
        &mut self,
        task_id: TaskId,
        goal: &str,
        browser: &dyn BrowsingContext,
        chat: &dyn ChatModel,
        options: &TaskOptions,
        events: &EventBusHandle,
    ) -> TaskRecord {
        let exec_ctx = ExecutionContext::new(task_id.clone());
        self.current_exec_ctx = Some(exec_ctx.clone());

        if let Some(entry) = self.history.iter_mut().find(|r| r.id == task_id) {
            entry.state = TaskState::Running;
        }

        let pipeline = ExecutionPipeline::new(self.registry.clone(), self.validate_output);
        let result = pipeline.run(goal, browser, chat, options, events, exec_ctx).await;

        let state = match &result.status {
            PipelineStatus::Completed => TaskState::Completed,
            PipelineStatus::Failed { .. } => TaskState::Failed,
            PipelineStatus::Cancelled => TaskState::Cancelled,
            PipelineStatus::OutOfSteps => TaskState::Failed,
        };

        let entry = self
            .history
            .iter_mut()
            .find(|r| r.id == task_id)
            .expect("run_one is always called with an id pushed by push_pending");
        entry.state = state;
        entry.result = Some(result);

        self.current_exec_ctx = None;
        entry.clone()
    }
}
