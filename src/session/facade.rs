//! Session facade: the narrow surface the presentation layer uses.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use super::{Coordinator, SessionPhase};
use crate::error::{StartError, SubmitError};
use crate::execution::ExecutionResult;
use crate::process::{EngineLoader, LoaderOptions, PythonLoader, RenderOptions};

pub const DEFAULT_PLACEHOLDER: &str = "(no output)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub loader: LoaderOptions,
    pub render: RenderOptions,
    /// Shown instead of an empty text output.
    pub empty_placeholder: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            loader: LoaderOptions::default(),
            render: RenderOptions::default(),
            empty_placeholder: DEFAULT_PLACEHOLDER.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    pub index: usize,
    pub png_base64: String,
}

/// A result as the presentation layer shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultView {
    #[serde(rename_all = "camelCase")]
    Success {
        sequence: u64,
        stdout_text: String,
        images: Vec<ImageView>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        sequence: u64,
        error_message: String,
        stdout_text: String,
    },
}

impl ResultView {
    fn from_result(result: &ExecutionResult, placeholder: &str) -> Self {
        match &result.outcome {
            Ok(out) => ResultView::Success {
                sequence: result.sequence,
                stdout_text: if out.stdout.is_empty() {
                    placeholder.to_string()
                } else {
                    out.stdout.clone()
                },
                images: out
                    .images
                    .iter()
                    .map(|img| ImageView {
                        index: img.index,
                        png_base64: img.to_base64(),
                    })
                    .collect(),
            },
            Err(err) => ResultView::Error {
                sequence: result.sequence,
                error_message: err.message.clone(),
                stdout_text: err.partial_stdout.clone(),
            },
        }
    }

    pub fn sequence(&self) -> u64 {
        match self {
            ResultView::Success { sequence, .. } | ResultView::Error { sequence, .. } => *sequence,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResultView::Error { .. })
    }
}

#[derive(Clone)]
pub struct Session {
    coordinator: Coordinator,
    placeholder: String,
}

impl Session {
    pub fn new(loader: Arc<dyn EngineLoader>, render: RenderOptions, placeholder: impl Into<String>) -> Self {
        Self {
            coordinator: Coordinator::new(loader, render),
            placeholder: placeholder.into(),
        }
    }

    /// Session backed by a Python child process.
    pub fn python(opts: SessionOptions) -> Self {
        Self::new(
            Arc::new(PythonLoader::new(opts.loader)),
            opts.render,
            opts.empty_placeholder,
        )
    }

    pub async fn start(&self) -> Result<(), StartError> {
        self.coordinator.start().await
    }

    pub fn current_phase(&self) -> SessionPhase {
        self.coordinator.phase()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.coordinator.subscribe()
    }

    pub fn last_result(&self) -> Option<ResultView> {
        self.coordinator
            .last_result()
            .map(|r| ResultView::from_result(&r, &self.placeholder))
    }

    /// The raw result behind `last_result`, for sinks that need image bytes.
    pub fn last_execution(&self) -> Option<Arc<ExecutionResult>> {
        self.coordinator.last_result()
    }

    pub async fn submit(&self, source: impl Into<String>) -> Result<ResultView, SubmitError> {
        let result = self.coordinator.submit(source).await?;
        Ok(ResultView::from_result(&result, &self.placeholder))
    }
}
