//! Process-wide configuration, loaded once at CLI startup.
//!
//! Grounded in the teacher's `cli/runtime.rs::load_config` (file-then-
//! defaults loading) and `config.rs` (a typed settings struct), reshaped
//! around the `config` crate + `serde_yaml` rather than `soulbase-config`
//! (see DESIGN.md for that substitution).

use serde::{Deserialize, Serialize};

use browser_agent_core::TaskOptions;

/// Defaults applied to every task's [`TaskOptions`] unless overridden on
/// the command line, plus a handful of process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub max_steps: u32,
    pub max_actions_per_step: u32,
    pub max_consecutive_failures: u32,
    pub enable_vision: bool,
    pub use_vision_for_planner: bool,
    pub max_elements: usize,
    pub replan_every_n_steps: u32,
    pub settle_delay_ms: u64,
    pub validate_output: bool,
    pub model_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let defaults = TaskOptions::default();
        Self {
            log_level: "info".to_string(),
            max_steps: defaults.max_steps,
            max_actions_per_step: defaults.max_actions_per_step,
            max_consecutive_failures: defaults.max_consecutive_failures,
            enable_vision: defaults.enable_vision,
            use_vision_for_planner: defaults.use_vision_for_planner,
            max_elements: defaults.max_elements,
            replan_every_n_steps: defaults.replan_every_n_steps,
            settle_delay_ms: defaults.settle_delay_ms,
            validate_output: true,
            model_name: "scripted-demo".to_string(),
        }
    }
}

impl AppConfig {
    /// Builds the in-memory [`TaskOptions`] a task should start from,
    /// before any per-invocation CLI overrides are applied.
    pub fn task_options(&self) -> TaskOptions {
        let mut opts = TaskOptions::default()
            .with_max_steps(self.max_steps)
            .with_vision(self.enable_vision)
            .with_vision_for_planner(self.use_vision_for_planner);
        opts.max_actions_per_step = self.max_actions_per_step;
        opts.max_consecutive_failures = self.max_consecutive_failures;
        opts.max_elements = self.max_elements;
        opts.replan_every_n_steps = self.replan_every_n_steps;
        opts.settle_delay_ms = self.settle_delay_ms;
        opts
    }
}
