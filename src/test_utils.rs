//! In-process engine doubles for unit tests.
//!
//! `ScriptedEngine` understands a tiny line language instead of Python:
//! `print <text>`, `set <name>=<value>`, `get <name>`, `figure <label>`,
//! `badfigure <label>` (cannot be rendered), `raise <message>`, `crash`
//! (engine dies), `panic <message>` (the engine thread panics) and `block`
//! (waits until the engine's gate is opened).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{EngineError, LoadError};
use crate::process::{Engine, EngineLoader, FigureId, ProgressFn, RenderOptions};

#[derive(Debug, Clone, Default)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn open(&self) {
        let (lock, cvar) = &*self.0;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.0;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
    }
}

#[derive(Debug)]
struct Figure {
    id: FigureId,
    label: String,
    renderable: bool,
}

#[derive(Debug)]
struct ScriptState {
    alive: bool,
    capturing: bool,
    buffer: String,
    uncaptured: String,
    figures: Vec<Figure>,
    next_figure: FigureId,
    vars: HashMap<String, String>,
    calls: Vec<String>,
    executions: usize,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            alive: true,
            capturing: false,
            buffer: String::new(),
            uncaptured: String::new(),
            figures: Vec::new(),
            next_figure: 1,
            vars: HashMap::new(),
            calls: Vec::new(),
            executions: 0,
        }
    }
}

impl ScriptState {
    fn write(&mut self, text: &str) {
        if self.capturing {
            self.buffer.push_str(text);
        } else {
            self.uncaptured.push_str(text);
        }
    }

    fn open_figure(&mut self, label: &str, renderable: bool) {
        let id = self.next_figure;
        self.next_figure += 1;
        self.figures.push(Figure {
            id,
            label: label.to_string(),
            renderable,
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    state: Arc<Mutex<ScriptState>>,
    gate: Gate,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(gate: Gate) -> Self {
        Self {
            gate,
            ..Self::default()
        }
    }

    /// Read-only view of the engine's state that survives moving the engine.
    pub fn probe(&self) -> Probe {
        Probe(self.state.clone())
    }

    fn enter(&self, call: &str) -> Result<std::sync::MutexGuard<'_, ScriptState>, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_string());
        if !state.alive {
            return Err(EngineError::Closed);
        }
        Ok(state)
    }
}

impl Engine for ScriptedEngine {
    fn begin_capture(&mut self) -> Result<(), EngineError> {
        let mut state = self.enter("begin_capture")?;
        state.capturing = true;
        state.buffer.clear();
        Ok(())
    }

    fn end_capture(&mut self) -> Result<String, EngineError> {
        let mut state = self.enter("end_capture")?;
        state.capturing = false;
        Ok(std::mem::take(&mut state.buffer))
    }

    fn execute(&mut self, source: &str) -> Result<(), EngineError> {
        self.enter("execute")?.executions += 1;
        for line in source.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
            if cmd == "block" {
                self.gate.wait();
                continue;
            }
            if cmd == "panic" {
                panic!("scripted panic: {arg}");
            }
            let mut state = self.state.lock().unwrap();
            match cmd {
                "print" => state.write(&format!("{arg}\n")),
                "set" => {
                    let (name, value) = arg.split_once('=').unwrap_or((arg, ""));
                    state.vars.insert(name.to_string(), value.to_string());
                }
                "get" => match state.vars.get(arg).cloned() {
                    Some(value) => state.write(&format!("{value}\n")),
                    None => {
                        return Err(EngineError::Raised {
                            message: format!("NameError: name '{arg}' is not defined"),
                        })
                    }
                },
                "figure" => state.open_figure(arg, true),
                "badfigure" => state.open_figure(arg, false),
                "raise" => {
                    return Err(EngineError::Raised {
                        message: format!("ScriptError: {arg}"),
                    })
                }
                "crash" => {
                    state.alive = false;
                    return Err(EngineError::Closed);
                }
                other => {
                    return Err(EngineError::Raised {
                        message: format!("SyntaxError: unknown command `{other}`"),
                    })
                }
            }
        }
        Ok(())
    }

    fn open_figures(&mut self) -> Result<Vec<FigureId>, EngineError> {
        let state = self.enter("open_figures")?;
        Ok(state.figures.iter().map(|f| f.id).collect())
    }

    fn render_figure(
        &mut self,
        figure: FigureId,
        opts: &RenderOptions,
    ) -> Result<Vec<u8>, EngineError> {
        let state = self.enter("render_figure")?;
        let fig = state
            .figures
            .iter()
            .find(|f| f.id == figure)
            .ok_or_else(|| EngineError::Remote {
                kind: "no_such_figure".into(),
                message: format!("figure {figure} is not open"),
            })?;
        if !fig.renderable {
            return Err(EngineError::Remote {
                kind: "internal".into(),
                message: format!("cannot render {} at {} dpi", fig.label, opts.dpi),
            });
        }
        Ok(format!("PNG:{}", fig.label).into_bytes())
    }

    fn close_figure(&mut self, figure: FigureId) -> Result<(), EngineError> {
        let mut state = self.enter("close_figure")?;
        state.figures.retain(|f| f.id != figure);
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.state.lock().unwrap().alive
    }
}

#[derive(Debug, Clone)]
pub struct Probe(Arc<Mutex<ScriptState>>);

impl Probe {
    pub fn capturing(&self) -> bool {
        self.0.lock().unwrap().capturing
    }

    pub fn open_figures(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .figures
            .iter()
            .map(|f| f.label.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn executions(&self) -> usize {
        self.0.lock().unwrap().executions
    }

    pub fn uncaptured(&self) -> String {
        self.0.lock().unwrap().uncaptured.clone()
    }
}

/// Loader that hands out a prepared engine, or fails with a prepared error.
pub struct ScriptedLoader {
    outcome: Mutex<Option<Result<ScriptedEngine, LoadError>>>,
    loads: AtomicUsize,
    hold: Option<Arc<Notify>>,
}

impl ScriptedLoader {
    pub const LABELS: [&'static str; 3] = ["fetching runtime", "loading packages", "configuring output"];

    pub fn ok(engine: ScriptedEngine) -> Self {
        Self::with_outcome(Ok(engine))
    }

    pub fn failing(err: LoadError) -> Self {
        Self::with_outcome(Err(err))
    }

    fn with_outcome(outcome: Result<ScriptedEngine, LoadError>) -> Self {
        Self {
            outcome: Mutex::new(Some(outcome)),
            loads: AtomicUsize::new(0),
            hold: None,
        }
    }

    /// Pause loading after the progress labels until `hold` is notified.
    pub fn held(mut self, hold: Arc<Notify>) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for ScriptedLoader {
    async fn load(&self, progress: ProgressFn) -> Result<Box<dyn Engine>, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        for label in Self::LABELS {
            progress(label);
        }
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        let outcome = self.outcome.lock().unwrap().take();
        match outcome {
            Some(Ok(engine)) => Ok(Box::new(engine)),
            Some(Err(err)) => Err(err),
            None => Err(LoadError::Aborted("scripted loader used twice".into())),
        }
    }
}

pub fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static ENV_LOCK: std::sync::OnceLock<Mutex<()>> = std::sync::OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Sets an environment variable and restores the previous value on drop.
pub struct EnvVarGuard {
    key: String,
    original: Option<String>,
}

impl EnvVarGuard {
    pub fn set(key: &str, value: String) -> Self {
        let original = std::env::var(key).ok();
        std::env::set_var(key, value);
        Self {
            key: key.to_string(),
            original,
        }
    }

    /// Removes the variable; the previous value comes back on drop.
    pub fn unset(key: &str) -> Self {
        let original = std::env::var(key).ok();
        std::env::remove_var(key);
        Self {
            key: key.to_string(),
            original,
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        if let Some(value) = &self.original {
            std::env::set_var(&self.key, value);
        } else {
            std::env::remove_var(&self.key);
        }
    }
}
