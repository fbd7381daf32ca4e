//! Python interpreter child process and the blocking protocol client around it.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};

use super::protocol::{CaptureText, FigureList, Ready, RenderedFigure, Request, Response};
use super::{Engine, FigureId, RenderOptions};
use crate::error::{EngineError, LoadError};

/// Script the child runs with `-c`.
pub const BOOTSTRAP: &str = include_str!("bootstrap.py");

const STDERR_TAIL_LINES: usize = 40;
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Last lines the child wrote to stderr, kept for error reports.
#[derive(Debug, Clone, Default)]
pub struct StderrTail(Arc<Mutex<VecDeque<String>>>);

impl StderrTail {
    fn push(&self, line: String) {
        if let Ok(mut lines) = self.0.lock() {
            if lines.len() == STDERR_TAIL_LINES {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    pub fn snapshot(&self) -> String {
        self.0
            .lock()
            .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }
}

pub struct PythonEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr_tail: StderrTail,
    next_id: u64,
    version: String,
}

impl PythonEngine {
    /// Start the child and wait for its `ready` notification.
    pub fn spawn(python_path: &str, backend: &str) -> Result<Self, LoadError> {
        let mut child = start_python(python_path, backend, BOOTSTRAP)
            .map_err(|e| LoadError::Spawn(format!("{python_path}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LoadError::Spawn("no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LoadError::Spawn("no stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LoadError::Spawn("no stderr".into()))?;

        let stderr_tail = StderrTail::default();
        let tail = stderr_tail.clone();
        thread::Builder::new()
            .name("python-stderr".into())
            .spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    let Ok(line) = line else { break };
                    tracing::debug!(target: "pysession::engine", "{line}");
                    tail.push(line);
                }
            })
            .map_err(|e| LoadError::Spawn(format!("stderr reader: {e}")))?;

        let mut engine = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr_tail,
            next_id: 1,
            version: String::new(),
        };

        match engine.wait_for_ready() {
            Ok(version) => {
                tracing::info!(python = %python_path, %version, "interpreter ready");
                engine.version = version;
                Ok(engine)
            }
            Err(message) => {
                let _ = engine.child.kill();
                let _ = engine.child.wait();
                Err(LoadError::Handshake(engine.with_stderr(message)))
            }
        }
    }

    fn wait_for_ready(&mut self) -> Result<String, String> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| format!("failed to read ready message: {e}"))?;
        if read == 0 {
            // Give the stderr thread a moment to collect the exit reason.
            let _ = self.child.wait();
            thread::sleep(Duration::from_millis(50));
            return Err("interpreter exited before it was ready".into());
        }
        let ready: Ready = serde_json::from_str(&line)
            .map_err(|e| format!("invalid ready message: {e}; payload={}", line.trim()))?;
        if ready.method != "ready" {
            return Err(format!("expected ready message, got: {}", line.trim()));
        }
        Ok(ready.params.version)
    }

    /// Append the stderr tail to a message, when there is one.
    pub fn with_stderr(&self, message: String) -> String {
        let tail = self.stderr_tail.snapshot();
        if tail.trim().is_empty() {
            message
        } else {
            format!("{message}; stderr: {}", tail.trim())
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn call(&mut self, method: &str, params: Value) -> Result<Value, EngineError> {
        let id = self.next_id;
        self.next_id += 1;

        let line = serde_json::to_string(&Request::new(id, method, params))?;
        writeln!(self.stdin, "{line}").map_err(closed_on_pipe)?;
        self.stdin.flush().map_err(closed_on_pipe)?;

        loop {
            let mut reply = String::new();
            if self.stdout.read_line(&mut reply)? == 0 {
                return Err(EngineError::Closed);
            }
            let response: Response = serde_json::from_str(&reply).map_err(|e| {
                EngineError::Protocol(format!("{e}; payload={}", reply.trim()))
            })?;
            if response.id.is_none() && response.error.is_none() {
                tracing::trace!(payload = %reply.trim(), "ignoring engine notification");
                continue;
            }
            return response.into_result(id);
        }
    }

    pub fn import_package(&mut self, package: &str) -> Result<(), EngineError> {
        self.call("import_package", json!({ "package": package }))
            .map(|_| ())
    }

    /// Select the graphics backend. Returns `false` when no plotting library is installed.
    pub fn configure_graphics(&mut self, backend: &str) -> Result<bool, EngineError> {
        let reply = self.call("configure_graphics", json!({ "backend": backend }))?;
        Ok(reply
            .get("configured")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Ask the child to exit, then make sure it has. Never waits on a reply, so a
    /// wedged interpreter cannot hang the caller.
    pub fn shutdown(&mut self) {
        if self.is_alive() {
            let id = self.next_id;
            self.next_id += 1;
            if let Ok(line) = serde_json::to_string(&Request::new(id, "shutdown", Value::Null)) {
                let _ = writeln!(self.stdin, "{line}");
                let _ = self.stdin.flush();
            }
            for _ in 0..20 {
                if !self.is_alive() {
                    break;
                }
                thread::sleep(SHUTDOWN_POLL);
            }
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Engine for PythonEngine {
    fn begin_capture(&mut self) -> Result<(), EngineError> {
        self.call("begin_capture", Value::Null).map(|_| ())
    }

    fn end_capture(&mut self) -> Result<String, EngineError> {
        let reply: CaptureText = serde_json::from_value(self.call("end_capture", Value::Null)?)?;
        Ok(reply.text)
    }

    fn execute(&mut self, source: &str) -> Result<(), EngineError> {
        self.call("execute", json!({ "source": source })).map(|_| ())
    }

    fn open_figures(&mut self) -> Result<Vec<FigureId>, EngineError> {
        let reply: FigureList = serde_json::from_value(self.call("list_figures", Value::Null)?)?;
        Ok(reply.figures)
    }

    fn render_figure(
        &mut self,
        figure: FigureId,
        opts: &RenderOptions,
    ) -> Result<Vec<u8>, EngineError> {
        let reply: RenderedFigure = serde_json::from_value(self.call(
            "render_figure",
            json!({ "figure": figure, "dpi": opts.dpi }),
        )?)?;
        STANDARD
            .decode(reply.png.as_bytes())
            .map_err(|e| EngineError::Protocol(format!("figure {figure} is not valid base64: {e}")))
    }

    fn close_figure(&mut self, figure: FigureId) -> Result<(), EngineError> {
        self.call("close_figure", json!({ "figure": figure }))
            .map(|_| ())
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for PythonEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn closed_on_pipe(err: io::Error) -> EngineError {
    if err.kind() == io::ErrorKind::BrokenPipe {
        EngineError::Closed
    } else {
        EngineError::Io(err)
    }
}

fn start_python(python_path: &str, backend: &str, bootstrap: &str) -> io::Result<Child> {
    let mut cmd = Command::new(python_path);
    cmd.arg("-u") // unbuffered
        .arg("-c")
        .arg(bootstrap)
        .env("MPLBACKEND", backend)
        .env("PYTHONIOENCODING", "utf-8")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd.spawn()
}
