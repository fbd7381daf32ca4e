use std::io::{self, Read};

use anyhow::{bail, Result};
use is_terminal::IsTerminal;

use pysession::cli::Cli;
use pysession::config::Config;
use pysession::handlers::{self, Output};
use pysession::printer::{ResultPrinter, TextPrinter};
use pysession::utils;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Load config, then let flags win over file and env
    let mut cfg = Config::load();
    for (key, value) in args.overrides() {
        cfg.set(key, value);
    }

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(cfg.log_level())
        .init();
    tracing::debug!(config = %cfg.config_path.display(), "configuration loaded");

    // stdin handling (pipe support with __pysession__eof__ delimiter)
    let stdin_is_tty = io::stdin().is_terminal();
    let mut source_from_stdin = String::new();
    if !stdin_is_tty && !args.repl {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        source_from_stdin = utils::source_from_stdin(&buf).to_string();
    }

    let image_dir = if let Some(dir) = &args.out_dir {
        Some(dir.clone())
    } else if args.save_figures {
        Some(cfg.image_output_path())
    } else {
        None
    };
    let output = Output {
        printer: ResultPrinter {
            text: TextPrinter::from_name(&cfg.get("DEFAULT_COLOR").unwrap_or_default()),
            json: args.json,
        },
        image_dir,
        show_progress: io::stderr().is_terminal() && !args.json,
    };
    let opts = cfg.session_options();

    // Resolve source: positional code, script file, or piped stdin
    let source = if let Some(code) = &args.code {
        Some(code.clone())
    } else if let Some(path) = &args.file {
        Some(utils::read_source_file(path)?)
    } else if !source_from_stdin.trim().is_empty() {
        Some(source_from_stdin)
    } else {
        None
    };

    match source {
        _ if args.repl => handlers::repl::run(opts, &output).await,
        Some(source) => {
            let ok = handlers::run::run(source, opts, &output).await?;
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        None if stdin_is_tty => handlers::repl::run(opts, &output).await,
        None => bail!("no source given; pass CODE, --file, or pipe a script on stdin"),
    }
}
