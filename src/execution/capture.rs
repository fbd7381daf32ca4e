//! Output capture around a single engine run.
//!
//! A run redirects the engine's text channel into a fresh buffer, executes the
//! source, reads the buffer back, then drains every open figure into PNG images.
//! The redirection and the open figures are released on every exit path so the
//! next run starts clean.

use super::{CapturedOutput, ImageArtifact};
use crate::error::{EngineError, RuntimeError};
use crate::process::{Engine, RenderOptions};

/// Scoped redirection of the engine's text output.
///
/// `release` reads the captured text and restores the channel. Dropping the
/// scope without releasing it still restores the channel.
pub struct OutputScope<'a, E: Engine + ?Sized> {
    engine: &'a mut E,
    active: bool,
}

impl<'a, E: Engine + ?Sized> OutputScope<'a, E> {
    pub fn enter(engine: &'a mut E) -> Result<Self, EngineError> {
        engine.begin_capture()?;
        Ok(Self {
            engine,
            active: true,
        })
    }

    pub fn engine(&mut self) -> &mut E {
        self.engine
    }

    pub fn release(mut self) -> Result<String, EngineError> {
        self.active = false;
        self.engine.end_capture()
    }
}

impl<E: Engine + ?Sized> Drop for OutputScope<'_, E> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        match self.engine.end_capture() {
            Ok(_) => tracing::warn!("output scope dropped without release; redirection restored"),
            Err(e) => tracing::warn!(error = %e, "failed to restore output redirection"),
        }
    }
}

/// Run `source` with output captured. User errors and engine faults both come
/// back as `RuntimeError`, carrying whatever text was written before the failure.
pub fn capture_run<E: Engine + ?Sized>(
    engine: &mut E,
    source: &str,
    opts: &RenderOptions,
) -> Result<CapturedOutput, RuntimeError> {
    let mut scope = OutputScope::enter(engine)
        .map_err(|e| RuntimeError::new(format!("could not redirect output: {e}"), ""))?;
    let executed = scope.engine().execute(source);
    let released = scope.release();

    let render = executed.is_ok() && released.is_ok();
    let drained = drain_figures(engine, opts, render);

    let stdout = match released {
        Ok(text) => text,
        Err(e) => {
            return Err(RuntimeError::new(
                format!("could not read captured output: {e}"),
                "",
            ))
        }
    };
    if let Err(e) = executed {
        tracing::debug!(error = %e, "run raised");
        return Err(RuntimeError::new(e.to_string(), stdout));
    }
    match drained {
        Ok(images) => Ok(CapturedOutput { stdout, images }),
        Err(e) => Err(RuntimeError::new(
            format!("failed to render figure: {e}"),
            stdout,
        )),
    }
}

/// Close every open figure, rendering each first when `render` is set.
/// Closing continues past a failed render; the first failure is returned.
fn drain_figures<E: Engine + ?Sized>(
    engine: &mut E,
    opts: &RenderOptions,
    render: bool,
) -> Result<Vec<ImageArtifact>, EngineError> {
    let figures = engine.open_figures()?;
    let mut images = Vec::with_capacity(if render { figures.len() } else { 0 });
    let mut first_err = None;

    for figure in figures {
        if render && first_err.is_none() {
            match engine.render_figure(figure, opts) {
                Ok(png) => images.push(ImageArtifact {
                    index: images.len(),
                    png,
                }),
                Err(e) => first_err = Some(e),
            }
        }
        if let Err(e) = engine.close_figure(figure) {
            tracing::warn!(figure, error = %e, "failed to close figure");
            first_err.get_or_insert(e);
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(images),
    }
}
