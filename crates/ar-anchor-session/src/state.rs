use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one mounted viewer.
///
/// The camera stream and the render loop are both active in `Running` and
/// inactive in every other state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Initializing,
    Running,
    /// Initialization failed; the message is shown to the user as-is.
    Error(String),
    Stopped,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            SessionState::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Initializing => f.write_str("initializing"),
            SessionState::Running => f.write_str("running"),
            SessionState::Error(msg) => write!(f, "in error ({msg})"),
            SessionState::Stopped => f.write_str("stopped"),
        }
    }
}

/// What a teardown pass actually released.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    pub stream_released: bool,
    pub loop_stopped: bool,
    pub estimator_released: bool,
    pub nodes_released: usize,
    /// Release failures, in teardown order. None of them stopped the pass.
    pub failures: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
