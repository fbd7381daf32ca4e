//! One-time engine bring-up.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Engine, PythonEngine};
use crate::error::{EngineError, LoadError};

pub const PHASE_STARTING: &str = "starting interpreter";
pub const PHASE_PACKAGES: &str = "loading packages";
pub const PHASE_CONFIGURING: &str = "configuring output";

/// Receives human-readable progress labels while loading. Advisory only.
pub type ProgressFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Produces the live engine for a session. Called once; never retries.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self, progress: ProgressFn) -> Result<Box<dyn Engine>, LoadError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    pub python_path: String,
    /// Modules imported before the engine is handed out.
    pub packages: Vec<String>,
    /// Non-interactive raster backend for the plotting library.
    pub backend: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            python_path: "python3".into(),
            packages: vec!["numpy".into(), "matplotlib".into()],
            backend: "Agg".into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PythonLoader {
    opts: LoaderOptions,
}

impl PythonLoader {
    pub fn new(opts: LoaderOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.opts
    }
}

#[async_trait]
impl EngineLoader for PythonLoader {
    async fn load(&self, progress: ProgressFn) -> Result<Box<dyn Engine>, LoadError> {
        let opts = self.opts.clone();
        tokio::task::spawn_blocking(move || bring_up(&opts, progress.as_ref()))
            .await
            .map_err(|e| LoadError::Aborted(e.to_string()))?
    }
}

fn bring_up(
    opts: &LoaderOptions,
    progress: &(dyn Fn(&str) + Send + Sync),
) -> Result<Box<dyn Engine>, LoadError> {
    progress(PHASE_STARTING);
    let mut engine = PythonEngine::spawn(&opts.python_path, &opts.backend)?;

    progress(PHASE_PACKAGES);
    for package in &opts.packages {
        tracing::debug!(%package, "importing package");
        engine
            .import_package(package)
            .map_err(|e| LoadError::Package {
                package: package.clone(),
                message: engine.with_stderr(reason(e)),
            })?;
    }

    progress(PHASE_CONFIGURING);
    let configured = engine
        .configure_graphics(&opts.backend)
        .map_err(|e| LoadError::Graphics(engine.with_stderr(reason(e))))?;
    if configured {
        tracing::debug!(backend = %opts.backend, "graphics configured");
    } else {
        tracing::warn!("no plotting library available; figures will not be captured");
    }

    Ok(Box::new(engine))
}

fn reason(err: EngineError) -> String {
    match err {
        EngineError::Raised { message } | EngineError::Remote { message, .. } => message,
        other => other.to_string(),
    }
}
