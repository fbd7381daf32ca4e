//! Execution requests, results and the output capture around one run.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::RuntimeError;

pub mod capture;

pub use capture::{capture_run, OutputScope};

/// Source text frozen at the moment a run was triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    source: String,
}

impl ExecutionRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// One rendered figure. `index` is its position in figure creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    pub index: usize,
    pub png: Vec<u8>,
}

impl ImageArtifact {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub images: Vec<ImageArtifact>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// 1-based position of the run within its session.
    pub sequence: u64,
    pub elapsed: Duration,
    pub outcome: Result<CapturedOutput, RuntimeError>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Text written by the run, including what was written before a failure.
    pub fn stdout(&self) -> &str {
        match &self.outcome {
            Ok(out) => &out.stdout,
            Err(err) => &err.partial_stdout,
        }
    }

    pub fn images(&self) -> &[ImageArtifact] {
        match &self.outcome {
            Ok(out) => &out.images,
            Err(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&RuntimeError> {
        self.outcome.as_ref().err()
    }
}
