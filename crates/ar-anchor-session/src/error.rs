use crate::config::ConfigError;
use crate::state::SessionState;

/// Camera could not be acquired.
///
/// The `Display` text is what the UI shows verbatim in the error state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("camera access denied")]
    Denied,
    #[error("no camera")]
    Unavailable,
}

/// Pose estimator (or its marker descriptor asset) failed to initialize.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("tracking init failed: {reason}")]
pub struct InitError {
    pub reason: String,
}

impl InitError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A resource refused to shut down cleanly. Logged, never propagated out of
/// teardown.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to release {resource}: {reason}")]
pub struct ReleaseError {
    pub resource: &'static str,
    pub reason: String,
}

impl ReleaseError {
    pub fn new(resource: &'static str, reason: impl Into<String>) -> Self {
        Self {
            resource,
            reason: reason.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("failed to spawn render loop thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors returned by the session controller API.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("cannot {op} a session that is {state}")]
    InvalidTransition {
        op: &'static str,
        state: SessionState,
    },
    /// Camera or estimator is still held by another initialization attempt.
    #[error("session {0} is not available")]
    Unavailable(&'static str),
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    Init(#[from] InitError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Message shown to the user while the session sits in the error state.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Init(_) => "tracking init failed".to_owned(),
            SessionError::Scheduler(_) => "render loop failed".to_owned(),
            other => other.to_string(),
        }
    }
}
