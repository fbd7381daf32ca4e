//! Interpreter engine seam: the operations a live engine must provide, plus the
//! Python child-process implementation and its loader.

use crate::error::EngineError;

pub mod loader;
pub mod protocol;
pub mod python;

pub use loader::{EngineLoader, LoaderOptions, ProgressFn, PythonLoader};
pub use python::PythonEngine;

/// Engine-assigned figure number. Numbers increase in creation order.
pub type FigureId = u64;

/// Raster settings applied to every rendered figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub dpi: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { dpi: 100 }
    }
}

/// A live interpreter. Calls block until the engine answers; callers run them off
/// the async executor. Implementations are not reentrant.
pub trait Engine: Send {
    /// Point the textual output channel at a fresh, empty buffer.
    fn begin_capture(&mut self) -> Result<(), EngineError>;

    /// Return everything written since `begin_capture` and restore the channel.
    fn end_capture(&mut self) -> Result<String, EngineError>;

    /// Run source text. User-level exceptions come back as `EngineError::Raised`.
    fn execute(&mut self, source: &str) -> Result<(), EngineError>;

    /// Currently open figures, oldest first.
    fn open_figures(&mut self) -> Result<Vec<FigureId>, EngineError>;

    /// Render one open figure to PNG bytes.
    fn render_figure(&mut self, figure: FigureId, opts: &RenderOptions)
        -> Result<Vec<u8>, EngineError>;

    fn close_figure(&mut self, figure: FigureId) -> Result<(), EngineError>;

    /// Whether the engine can still take requests.
    fn is_alive(&mut self) -> bool {
        true
    }
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn begin_capture(&mut self) -> Result<(), EngineError> {
        (**self).begin_capture()
    }

    fn end_capture(&mut self) -> Result<String, EngineError> {
        (**self).end_capture()
    }

    fn execute(&mut self, source: &str) -> Result<(), EngineError> {
        (**self).execute(source)
    }

    fn open_figures(&mut self) -> Result<Vec<FigureId>, EngineError> {
        (**self).open_figures()
    }

    fn render_figure(
        &mut self,
        figure: FigureId,
        opts: &RenderOptions,
    ) -> Result<Vec<u8>, EngineError> {
        (**self).render_figure(figure, opts)
    }

    fn close_figure(&mut self, figure: FigureId) -> Result<(), EngineError> {
        (**self).close_figure(figure)
    }

    fn is_alive(&mut self) -> bool {
        (**self).is_alive()
    }
}
