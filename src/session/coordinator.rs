//! Execution coordinator: owns the engine and admits one run at a time.
//!
//! `Uninitialized → Loading → Ready ⇄ Running`, plus `Loading → Failed`.
//! The `Ready → Running` transition is the admission point; while a run is in
//! flight the engine is moved out of the state entirely, so nothing else can
//! reach it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::watch;

use super::SessionPhase;
use crate::error::{EngineError, LoadError, RuntimeError, StartError, SubmitError};
use crate::execution::{capture_run, ExecutionRequest, ExecutionResult};
use crate::process::{Engine, EngineLoader, FigureId, ProgressFn, RenderOptions};

const INITIAL_LOADING_LABEL: &str = "initializing";

struct State {
    phase: SessionPhase,
    engine: Option<Box<dyn Engine>>,
    last_result: Option<Arc<ExecutionResult>>,
    submitted: u64,
}

struct Inner {
    loader: Arc<dyn EngineLoader>,
    render: RenderOptions,
    state: Mutex<State>,
    phase_tx: watch::Sender<SessionPhase>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, state: &mut State, phase: SessionPhase) {
        tracing::debug!(from = state.phase.name(), to = phase.name(), "session phase");
        state.phase = phase.clone();
        self.phase_tx.send_replace(phase);
    }

    fn report_progress(&self, label: &str) {
        let mut state = self.lock();
        if matches!(state.phase, SessionPhase::Loading(_)) {
            tracing::info!(%label, "loading engine");
            self.set_phase(&mut state, SessionPhase::Loading(label.to_string()));
        }
    }

    async fn load(self: Arc<Self>) -> Result<(), StartError> {
        let inner = self.clone();
        let progress: ProgressFn = Arc::new(move |label: &str| inner.report_progress(label));
        let loaded = self.loader.load(progress).await;

        let mut state = self.lock();
        match loaded {
            Ok(engine) => {
                state.engine = Some(engine);
                self.set_phase(&mut state, SessionPhase::Ready);
                tracing::info!("session ready");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "engine failed to load");
                self.set_phase(&mut state, SessionPhase::Failed(err.to_string()));
                Err(err.into())
            }
        }
    }

    async fn run(
        self: Arc<Self>,
        mut engine: Box<dyn Engine>,
        request: ExecutionRequest,
        sequence: u64,
    ) -> Arc<ExecutionResult> {
        let render = self.render;
        let started = Instant::now();
        let joined = tokio::task::spawn_blocking(move || {
            let outcome = capture_run(&mut engine, request.source(), &render);
            (engine, outcome)
        })
        .await;

        let (engine, outcome) = match joined {
            Ok((engine, outcome)) => (Some(engine), outcome),
            Err(e) => {
                tracing::error!(error = %e, "engine run did not complete");
                (None, Err(RuntimeError::new(format!("engine run aborted: {e}"), "")))
            }
        };
        let result = Arc::new(ExecutionResult {
            sequence,
            elapsed: started.elapsed(),
            outcome,
        });

        match &result.outcome {
            Ok(out) => tracing::info!(
                sequence,
                elapsed_ms = result.elapsed.as_millis() as u64,
                stdout_bytes = out.stdout.len(),
                images = out.images.len(),
                "run finished"
            ),
            Err(e) => tracing::info!(
                sequence,
                elapsed_ms = result.elapsed.as_millis() as u64,
                error = %e.message,
                "run failed"
            ),
        }

        let mut engine: Box<dyn Engine> = match engine {
            Some(engine) => engine,
            None => Box::new(LostEngine),
        };
        if !engine.is_alive() {
            tracing::warn!("engine is no longer running; later runs will fail");
        }

        let mut state = self.lock();
        state.last_result = Some(result.clone());
        state.engine = Some(engine);
        self.set_phase(&mut state, SessionPhase::Ready);
        result
    }
}

/// Stands in for an engine that did not come back from a run. Every call
/// reports a closed engine.
struct LostEngine;

impl Engine for LostEngine {
    fn begin_capture(&mut self) -> Result<(), EngineError> {
        Err(EngineError::Closed)
    }

    fn end_capture(&mut self) -> Result<String, EngineError> {
        Err(EngineError::Closed)
    }

    fn execute(&mut self, _source: &str) -> Result<(), EngineError> {
        Err(EngineError::Closed)
    }

    fn open_figures(&mut self) -> Result<Vec<FigureId>, EngineError> {
        Err(EngineError::Closed)
    }

    fn render_figure(&mut self, _figure: FigureId, _opts: &RenderOptions) -> Result<Vec<u8>, EngineError> {
        Err(EngineError::Closed)
    }

    fn close_figure(&mut self, _figure: FigureId) -> Result<(), EngineError> {
        Err(EngineError::Closed)
    }

    fn is_alive(&mut self) -> bool {
        false
    }
}

/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(loader: Arc<dyn EngineLoader>, render: RenderOptions) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                loader,
                render,
                state: Mutex::new(State {
                    phase: SessionPhase::Uninitialized,
                    engine: None,
                    last_result: None,
                    submitted: 0,
                }),
                phase_tx,
            }),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().phase.clone()
    }

    /// Phase updates, starting from the current phase.
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase_tx.subscribe()
    }

    /// Result of the most recently completed run.
    pub fn last_result(&self) -> Option<Arc<ExecutionResult>> {
        self.inner.lock().last_result.clone()
    }

    /// Bring the engine up. Only valid once, from `Uninitialized`.
    ///
    /// Loading finishes and the phase settles even if the returned future is
    /// dropped early.
    pub async fn start(&self) -> Result<(), StartError> {
        {
            let mut state = self.inner.lock();
            if state.phase != SessionPhase::Uninitialized {
                return Err(StartError::AlreadyStarted);
            }
            self.inner.set_phase(
                &mut state,
                SessionPhase::Loading(INITIAL_LOADING_LABEL.into()),
            );
        }

        let task = tokio::spawn(self.inner.clone().load());
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = LoadError::Aborted(e.to_string());
                tracing::error!(error = %err, "engine loader task did not complete");
                let mut state = self.inner.lock();
                self.inner
                    .set_phase(&mut state, SessionPhase::Failed(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Run source text. Rejected unless the session is `Ready`; never queued.
    ///
    /// The run completes and its result is recorded even if the returned
    /// future is dropped early.
    pub async fn submit(
        &self,
        source: impl Into<String>,
    ) -> Result<Arc<ExecutionResult>, SubmitError> {
        let request = ExecutionRequest::new(source);
        let (engine, sequence) = {
            let mut state = self.inner.lock();
            match &state.phase {
                SessionPhase::Ready => {}
                SessionPhase::Running => {
                    tracing::debug!("submit rejected: a run is in progress");
                    return Err(SubmitError::Busy);
                }
                SessionPhase::Uninitialized => return Err(SubmitError::NotStarted),
                SessionPhase::Loading(_) => return Err(SubmitError::Loading),
                SessionPhase::Failed(message) => return Err(SubmitError::Failed(message.clone())),
            }
            let Some(engine) = state.engine.take() else {
                return Err(SubmitError::NotStarted);
            };
            state.submitted += 1;
            let sequence = state.submitted;
            self.inner.set_phase(&mut state, SessionPhase::Running);
            (engine, sequence)
        };

        tracing::debug!(sequence, bytes = request.source().len(), "run admitted");
        let task = tokio::spawn(self.inner.clone().run(engine, request, sequence));
        task.await
            .map_err(|e| SubmitError::Interrupted(e.to_string()))
    }
}
