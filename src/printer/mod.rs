//! Printers: plain text, colored status lines, and JSON result views.

use std::path::PathBuf;

use owo_colors::OwoColorize;

use crate::session::{ResultView, SessionPhase};

pub struct TextPrinter {
    pub color: Option<&'static str>,
}

impl TextPrinter {
    pub fn from_name(name: &str) -> Self {
        let color = match name.to_ascii_lowercase().as_str() {
            "green" => Some("green"),
            "cyan" => Some("cyan"),
            "magenta" => Some("magenta"),
            "yellow" => Some("yellow"),
            _ => None,
        };
        Self { color }
    }

    pub fn print(&self, text: &str) {
        if let Some(c) = self.color {
            match c {
                "green" => println!("{}", text.green()),
                "cyan" => println!("{}", text.cyan()),
                "magenta" => println!("{}", text.magenta()),
                "yellow" => println!("{}", text.yellow()),
                _ => println!("{}", text),
            }
        } else {
            println!("{}", text);
        }
    }
}

pub struct ResultPrinter {
    pub text: TextPrinter,
    pub json: bool,
}

impl ResultPrinter {
    pub fn print(&self, view: &ResultView, saved: &[PathBuf]) {
        if self.json {
            match serde_json::to_string_pretty(view) {
                Ok(s) => println!("{s}"),
                Err(e) => eprintln!("{}", format!("failed to encode result: {e}").red()),
            }
            return;
        }
        match view {
            ResultView::Success { stdout_text, .. } => {
                self.text.print(stdout_text.trim_end_matches('\n'));
            }
            ResultView::Error {
                stdout_text,
                error_message,
                ..
            } => {
                if !stdout_text.is_empty() {
                    self.text.print(stdout_text.trim_end_matches('\n'));
                }
                eprintln!("{}", error_message.red());
            }
        }
        for line in figure_lines(view, saved) {
            println!("{}", line.dimmed());
        }
    }
}

/// One line per figure: the file it was saved to, or its encoded size.
pub fn figure_lines(view: &ResultView, saved: &[PathBuf]) -> Vec<String> {
    let ResultView::Success { images, .. } = view else {
        return Vec::new();
    };
    images
        .iter()
        .map(|img| match saved.get(img.index) {
            Some(path) => format!("[figure {}] {}", img.index + 1, path.display()),
            None => format!(
                "[figure {}] {} bytes of base64 PNG",
                img.index + 1,
                img.png_base64.len()
            ),
        })
        .collect()
}

/// Status line for a phase change, written to stderr.
pub fn print_phase(phase: &SessionPhase) {
    match phase {
        SessionPhase::Loading(label) => eprintln!("{}", format!("… {label}").dimmed()),
        SessionPhase::Ready => eprintln!("{}", "ready".green()),
        SessionPhase::Failed(message) => eprintln!("{}", format!("failed: {message}").red()),
        other => eprintln!("{}", other.name().dimmed()),
    }
}
