//! One-shot handler: load the engine, run a single source text, report.

use anyhow::{Context, Result};

use super::{start_with_progress, Output};
use crate::session::{Session, SessionOptions};

/// Returns `false` when the run produced an error result.
pub async fn run(source: String, opts: SessionOptions, output: &Output) -> Result<bool> {
    let session = Session::python(opts);
    start_with_progress(&session, output.show_progress)
        .await
        .context("engine failed to load")?;

    let view = session.submit(source).await?;
    output.emit(&session, &view, "")?;
    Ok(!view.is_error())
}
