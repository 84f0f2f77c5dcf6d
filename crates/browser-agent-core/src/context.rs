//! Per-task tunables and mutable execution state shared by the pipeline
//! and all three agents.
//!
//! `TaskOptions` mirrors the teacher's `AgentLoopConfig` (same tunables,
//! same builder-method shape, same `fast`/`minimal` presets); `ExecutionContext`
//! mirrors the cancellation/suspension-point plumbing in the teacher's
//! `action-flow::executor::build_exec_ctx`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use browseragent_core_types::TaskId;

/// Tunables for one task run. Grounded in `AgentLoopConfig`: the same
/// knobs (max steps, actions-per-step, failure budget, vision toggle,
/// timeouts) reappear here under the same defaults.
#[derive(Debug, Clone)]
pub struct TaskOptions {
    pub max_steps: u32,
    pub max_actions_per_step: u32,
    pub max_consecutive_failures: u32,
    pub enable_vision: bool,
    /// When `enable_vision` is true but this is false, the screenshot
    /// attached to the last ledger message is stripped before it reaches
    /// the planner; the navigator still sees it.
    pub use_vision_for_planner: bool,
    pub max_elements: usize,
    pub action_timeout_ms: u64,
    pub model_timeout_ms: u64,
    pub step_timeout_ms: u64,
    pub replan_every_n_steps: u32,
    pub settle_delay_ms: u64,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_actions_per_step: 3,
            max_consecutive_failures: 3,
            enable_vision: true,
            use_vision_for_planner: true,
            max_elements: 500,
            action_timeout_ms: 30_000,
            model_timeout_ms: 60_000,
            step_timeout_ms: 180_000,
            replan_every_n_steps: 5,
            settle_delay_ms: 1_000,
        }
    }
}

impl TaskOptions {
    /// Smaller budgets, vision off: favours throughput over thoroughness.
    pub fn fast() -> Self {
        Self {
            max_steps: 30,
            max_actions_per_step: 5,
            enable_vision: false,
            ..Self::default()
        }
    }

    /// Smallest possible budgets, used by unit tests that just need the
    /// pipeline to terminate quickly.
    pub fn minimal() -> Self {
        Self {
            max_steps: 5,
            max_actions_per_step: 1,
            max_consecutive_failures: 1,
            enable_vision: false,
            ..Self::default()
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_vision(mut self, enable: bool) -> Self {
        self.enable_vision = enable;
        self
    }

    pub fn with_vision_for_planner(mut self, enable: bool) -> Self {
        self.use_vision_for_planner = enable;
        self
    }
}

/// Mutable state shared across a task's lifetime: step counter, pause and
/// stop flags, the cancellation signal observed at suspension points, and
/// the running count of consecutive step failures.
///
/// Cloning an `ExecutionContext` is cheap and shares the same underlying
/// state (everything is `Arc`-backed), matching how the teacher threads
/// one `CancellationToken` through every `execute_action` call in a batch.
#[derive(Clone)]
pub struct ExecutionContext {
    pub task_id: TaskId,
    step: Arc<AtomicU32>,
    consecutive_failures: Arc<AtomicU32>,
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    cancellation: CancellationToken,
    started_at: Instant,
}

impl ExecutionContext {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            step: Arc::new(AtomicU32::new(0)),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            paused: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            cancellation: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    pub fn current_step(&self) -> u32 {
        self.step.load(Ordering::SeqCst)
    }

    pub fn advance_step(&self) -> u32 {
        self.step.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn record_step_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reset_failures(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Requests cancellation. Idempotent: a second call is a no-op.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancellation.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.cancellation.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}
