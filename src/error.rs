//! Error types for the session manager.

use thiserror::Error;

/// Failures talking to a live engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Source text raised inside the interpreter. The engine itself is fine.
    #[error("{message}")]
    Raised { message: String },

    /// The engine answered with an error that was not raised by user code.
    #[error("engine error ({kind}): {message}")]
    Remote { kind: String, message: String },

    /// The engine process is gone or its pipe was closed.
    #[error("engine process is not running")]
    Closed,

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A reply did not match the wire protocol.
    #[error("engine protocol error: {0}")]
    Protocol(String),

    #[error("engine serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Terminal bring-up failure. The session never gets an engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("failed to start interpreter: {0}")]
    Spawn(String),

    #[error("interpreter handshake failed: {0}")]
    Handshake(String),

    #[error("failed to load package `{package}`: {message}")]
    Package { package: String, message: String },

    #[error("failed to configure graphics output: {0}")]
    Graphics(String),

    #[error("engine loader stopped unexpectedly: {0}")]
    Aborted(String),
}

/// Recoverable failure of one run. Output written before the failure is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
    pub partial_stdout: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, partial_stdout: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            partial_stdout: partial_stdout.into(),
        }
    }
}

/// Why a submission was not admitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("session has not been started")]
    NotStarted,

    #[error("engine is still loading")]
    Loading,

    #[error("a run is already in progress")]
    Busy,

    #[error("session failed to load: {0}")]
    Failed(String),

    /// The runtime dropped the run task before it reported back.
    #[error("run was interrupted: {0}")]
    Interrupted(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("session was already started")]
    AlreadyStarted,

    #[error(transparent)]
    Load(#[from] LoadError),
}
