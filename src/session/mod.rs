//! Session lifecycle: the coordinator state machine and the facade the
//! presentation layer talks to.

use std::fmt;

use serde::Serialize;

pub mod coordinator;
pub mod facade;

pub use coordinator::Coordinator;
pub use facade::{ImageView, ResultView, Session, SessionOptions};

/// Where a session is in its lifecycle. Exactly one value is current at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "detail", rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    /// Carries the latest progress label; only a hint for display.
    Loading(String),
    Ready,
    Running,
    /// Loading failed. Terminal for the session.
    Failed(String),
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Uninitialized => "uninitialized",
            SessionPhase::Loading(_) => "loading",
            SessionPhase::Ready => "ready",
            SessionPhase::Running => "running",
            SessionPhase::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Failed(_))
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Loading(label) => write!(f, "loading ({label})"),
            SessionPhase::Failed(message) => write!(f, "failed: {message}"),
            other => f.write_str(other.name()),
        }
    }
}
