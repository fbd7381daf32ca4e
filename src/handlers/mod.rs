//! Front-end handlers: one-shot runs and the interactive session.

use std::path::PathBuf;

use anyhow::Result;

use crate::error::StartError;
use crate::printer::{print_phase, ResultPrinter};
use crate::session::{ResultView, Session, SessionPhase};
use crate::utils::write_images;

pub mod repl;
pub mod run;

/// Where and how results are shown.
pub struct Output {
    pub printer: ResultPrinter,
    pub image_dir: Option<PathBuf>,
    pub show_progress: bool,
}

impl Output {
    /// Save figures of the latest run (if configured), then print the view.
    pub fn emit(&self, session: &Session, view: &ResultView, prefix: &str) -> Result<()> {
        let saved = match (&self.image_dir, session.last_execution()) {
            (Some(dir), Some(result)) => write_images(dir, prefix, result.images())?,
            _ => Vec::new(),
        };
        self.printer.print(view, &saved);
        Ok(())
    }
}

/// Start the session, echoing loading progress to stderr when asked.
pub async fn start_with_progress(session: &Session, show: bool) -> Result<(), StartError> {
    let watcher = show.then(|| {
        let mut rx = session.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let phase = rx.borrow_and_update().clone();
                if matches!(phase, SessionPhase::Loading(_)) {
                    print_phase(&phase);
                }
            }
        })
    });

    let started = session.start().await;
    if let Some(task) = watcher {
        task.abort();
    }
    if show || started.is_err() {
        print_phase(&session.current_phase());
    }
    started
}
