//! Interactive session over stdin.
//!
//! Each line is one run. A line containing only `"""` toggles multi-line mode;
//! the block is submitted when the closing `"""` arrives. Lines starting with
//! `:` are session commands.

use std::io::Write;

use anyhow::Result;
use owo_colors::OwoColorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{start_with_progress, Output};
use crate::error::SubmitError;
use crate::session::{Session, SessionOptions, SessionPhase};

const HELP: &str = "Enter code to run it. \"\"\" starts/ends a multi-line block.\n\
:phase  show the session phase\n\
:last   show the last result again\n\
:reload restart the interpreter (fresh session)\n\
:help   show this help\n\
:quit   leave (also exit())";

/// Input mode for the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    MultiLine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Phase,
    Last,
    Reload,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Submit(String),
    Command(Command),
    /// Line consumed, nothing to do yet.
    Continue,
    Unknown(String),
    Quit,
}

/// Line editor state between prompts.
#[derive(Debug)]
pub struct LineInput {
    pub mode: InputMode,
    buffer: Vec<String>,
}

impl Default for LineInput {
    fn default() -> Self {
        Self {
            mode: InputMode::Normal,
            buffer: Vec::new(),
        }
    }
}

impl LineInput {
    pub fn prompt(&self) -> &'static str {
        match self.mode {
            InputMode::Normal => ">>> ",
            InputMode::MultiLine => "... ",
        }
    }

    pub fn feed(&mut self, line: &str) -> Action {
        if line.trim() == "\"\"\"" {
            return match self.mode {
                InputMode::Normal => {
                    self.mode = InputMode::MultiLine;
                    Action::Continue
                }
                InputMode::MultiLine => {
                    self.mode = InputMode::Normal;
                    let block = std::mem::take(&mut self.buffer).join("\n");
                    if block.trim().is_empty() {
                        Action::Continue
                    } else {
                        Action::Submit(block)
                    }
                }
            };
        }

        if self.mode == InputMode::MultiLine {
            self.buffer.push(line.to_string());
            return Action::Continue;
        }

        let trimmed = line.trim();
        match trimmed {
            "" => Action::Continue,
            "exit()" | ":quit" | ":q" => Action::Quit,
            ":phase" => Action::Command(Command::Phase),
            ":last" => Action::Command(Command::Last),
            ":reload" => Action::Command(Command::Reload),
            ":help" => Action::Command(Command::Help),
            cmd if cmd.starts_with(':') => Action::Unknown(cmd.to_string()),
            _ => Action::Submit(line.to_string()),
        }
    }
}

/// Run the interactive session until EOF or `:quit`.
pub async fn run(opts: SessionOptions, output: &Output) -> Result<()> {
    let mut session = Session::python(opts.clone());
    // A failed load keeps the session in its terminal phase; `:reload` can replace it.
    let _ = start_with_progress(&session, output.show_progress).await;

    let mut input = LineInput::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{}", input.prompt());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match input.feed(&line) {
            Action::Continue => {}
            Action::Quit => break,
            Action::Unknown(cmd) => eprintln!("{}", format!("unknown command {cmd}; try :help").yellow()),
            Action::Command(Command::Help) => println!("{HELP}"),
            Action::Command(Command::Phase) => println!("{}", session.current_phase()),
            Action::Command(Command::Last) => match session.last_result() {
                Some(view) => output.printer.print(&view, &[]),
                None => println!("{}", "no runs yet".dimmed()),
            },
            Action::Command(Command::Reload) => {
                tracing::info!("reloading session");
                session = Session::python(opts.clone());
                let _ = start_with_progress(&session, true).await;
            }
            Action::Submit(source) => match session.submit(source).await {
                Ok(view) => {
                    let prefix = format!("run-{}-", view.sequence());
                    if let Err(e) = output.emit(&session, &view, &prefix) {
                        eprintln!("{}", format!("{e:#}").red());
                    }
                }
                Err(SubmitError::Failed(message)) => {
                    eprintln!("{}", format!("engine unavailable: {message}").red());
                    eprintln!("{}", "use :reload to start a fresh session".dimmed());
                }
                Err(e) => eprintln!("{}", e.to_string().red()),
            },
        }
    }

    if matches!(session.current_phase(), SessionPhase::Running) {
        tracing::warn!("leaving while a run is still in progress");
    }
    Ok(())
}
