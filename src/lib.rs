//! Run Python source in a long-lived interpreter session, capturing printed text
//! and rendered figures per run.

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod handlers;
pub mod printer;
pub mod process;
pub mod session;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use error::{EngineError, LoadError, RuntimeError, StartError, SubmitError};
pub use execution::{CapturedOutput, ExecutionResult, ImageArtifact};
pub use process::{Engine, EngineLoader, LoaderOptions, PythonLoader, RenderOptions};
pub use session::{ImageView, ResultView, Session, SessionOptions, SessionPhase};
