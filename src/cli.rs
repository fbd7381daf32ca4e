use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "pysession", about = "Run Python in a long-lived session and capture its text and figures", version)]
#[command(group(ArgGroup::new("input").args(["code", "file", "repl"]).multiple(false)))]
pub struct Cli {
    /// Source text to run once.
    #[arg(value_name = "CODE")]
    pub code: Option<String>,

    /// Run the contents of a script file once.
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Start an interactive session; each submitted block is one run.
    #[arg(long)]
    pub repl: bool,

    /// Print results as JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Write rendered figures as numbered PNG files into this directory.
    #[arg(short = 'o', long = "out-dir", value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Write figures into IMAGE_OUTPUT_PATH from the configuration.
    #[arg(long = "save-figures", conflicts_with = "out_dir")]
    pub save_figures: bool,

    /// Python interpreter to launch.
    #[arg(long)]
    pub python: Option<String>,

    /// Comma-separated packages to import before the first run.
    #[arg(long, value_name = "LIST")]
    pub packages: Option<String>,

    /// Resolution of rendered figures.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub dpi: Option<u32>,

    /// Non-interactive plotting backend.
    #[arg(long)]
    pub backend: Option<String>,

    /// Log verbosity (error, warn, info, debug, trace).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Configuration keys set by flags, for overlaying on the loaded config.
    pub fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(p) = &self.python {
            out.push(("PYTHON_PATH", p.clone()));
        }
        if let Some(p) = &self.packages {
            out.push(("PRELOAD_PACKAGES", p.clone()));
        }
        if let Some(d) = self.dpi {
            out.push(("FIGURE_DPI", d.to_string()));
        }
        if let Some(b) = &self.backend {
            out.push(("GRAPHICS_BACKEND", b.clone()));
        }
        if let Some(l) = &self.log_level {
            out.push(("LOG_LEVEL", l.clone()));
        }
        out
    }
}
