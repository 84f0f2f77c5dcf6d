use thiserror::Error;

/// How the pipeline should react to an [`AgentError`].
///
/// This is orthogonal to the error *kind*: the same kind can be fatal in
/// one context (an auth failure during navigation) and a step failure in
/// another (a model format error that still has retries left).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Stops the whole task immediately; short-circuits to the task manager.
    Fatal,
    /// Counts against a per-task failure budget; the loop may continue.
    StepFailure,
    /// Not a failure. A suspension point observed cancellation.
    Cancelled,
}

/// Error taxonomy for the orchestration core.
///
/// Each variant corresponds to one of the kinds enumerated in the error
/// handling design: in-batch errors are collected into `ActionResult`s and
/// fed back into the model as memory, while fatal kinds short-circuit to
/// the task manager.
#[derive(Debug, Error, Clone)]
pub enum AgentError {
    /// Action input failed schema validation.
    #[error("invalid action input: {0}")]
    InvalidInput(String),

    /// Requested element index is no longer present in the current snapshot.
    #[error("element at index {index} is stale: {reason}")]
    ElementStale { index: u32, reason: String },

    /// Navigation target is blocked by policy.
    #[error("navigation to {url} is disallowed: {reason}")]
    UrlDisallowed { url: String, reason: String },

    /// Model endpoint rejected the request as unauthenticated.
    #[error("model authentication failed: {0}")]
    ModelAuth(String),

    /// Model endpoint rejected the request as unauthorized.
    #[error("model request forbidden: {0}")]
    ModelForbidden(String),

    /// A suspension point observed a cancellation signal.
    #[error("request cancelled")]
    RequestCancelled,

    /// The model could not produce a parsable structured output and no
    /// tool-call fallback was present, even after the retry ladder.
    #[error("model could not produce a structured output: {0}")]
    ModelFormat(String),

    /// More than the per-batch error budget was exceeded while executing
    /// one navigator turn's action batch.
    #[error("action batch aborted after {errors} errors")]
    BatchAborted { errors: u32 },

    /// An action name was dispatched that was never registered.
    #[error("action '{0}' is not registered")]
    UnknownAction(String),

    /// Catch-all for capability failures (browser driver, I/O) that don't
    /// fit a more specific kind.
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    pub fn severity(&self) -> Severity {
        match self {
            AgentError::RequestCancelled => Severity::Cancelled,
            AgentError::UrlDisallowed { .. }
            | AgentError::ModelAuth(_)
            | AgentError::ModelForbidden(_) => Severity::Fatal,
            _ => Severity::StepFailure,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Short, status-line-suitable description of the failure.
    pub fn details(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_disallowed_is_fatal() {
        let err = AgentError::UrlDisallowed {
            url: "file:///etc/passwd".into(),
            reason: "local file access blocked".into(),
        };
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn invalid_input_is_step_failure() {
        let err = AgentError::invalid_input("missing field 'url'");
        assert_eq!(err.severity(), Severity::StepFailure);
    }

    #[test]
    fn cancelled_has_its_own_severity() {
        assert_eq!(AgentError::RequestCancelled.severity(), Severity::Cancelled);
    }
}
