//! Stream lifecycle control.
//!
//! A [`StreamController`] owns the result sequence of exactly one submission.
//! It drives the sequence, feeds the accumulator and reconciles the four ways
//! a run can end (exhaustion, an in-band stream error, an out-of-band error
//! event, user interruption) plus an engine rejection before any stream
//! exists. All of them go through [`StreamController::finish`], which lets
//! exactly one of them take effect.

use crate::core::{ResultRecord, RunState, Submission};
use crate::execution::accumulator::ResultAccumulator;
use crate::execution::timer::ElapsedTimer;
use crate::querying::sequence::{LazySequence, SequenceControl, StreamError};
use oxigraph::model::Variable;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::AbortHandle;

/// Observable state of a session's most recent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// Run the state belongs to. `0` before the first submission.
    pub run_id: u64,
    pub run_state: RunState,
    pub columns: Vec<Variable>,
    pub last_submitted: Option<Submission>,
    pub possibly_incomplete: bool,
    pub error_message: Option<String>,
}

impl SessionStatus {
    /// State before anything was submitted.
    pub fn initial() -> Self {
        Self {
            run_id: 0,
            run_state: RunState::Idle,
            columns: Vec::new(),
            last_submitted: None,
            possibly_incomplete: false,
            error_message: None,
        }
    }

    /// Fresh state for a submission whose engine dispatch is pending.
    pub fn submitted(run_id: u64, submission: Submission) -> Self {
        Self {
            run_id,
            last_submitted: Some(submission),
            ..Self::initial()
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::initial()
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Callbacks fired when a run starts streaming and when it reaches a
/// terminal state.
#[derive(Clone, Default)]
pub struct SessionHooks {
    pub on_start: Option<Hook>,
    pub on_stop: Option<Hook>,
}

impl SessionHooks {
    pub fn on_start(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(hook));
        self
    }

    pub fn on_stop(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The sequence reported end-of-stream.
    Exhausted,
    /// The sequence failed while streaming.
    Failed(String),
    /// The user stopped the run.
    Interrupted,
    /// The engine rejected the submission before a stream existed.
    Rejected(String),
}

#[derive(Debug, Default)]
struct Gate {
    finished: bool,
    control: Option<SequenceControl>,
    tasks: Vec<AbortHandle>,
}

/// Drives the result stream of one submission.
#[derive(Debug)]
pub struct StreamController {
    run_id: u64,
    status: Arc<watch::Sender<SessionStatus>>,
    accumulator: ResultAccumulator,
    timer: ElapsedTimer,
    hooks: SessionHooks,
    gate: Mutex<Gate>,
}

impl StreamController {
    pub fn new(
        run_id: u64,
        status: Arc<watch::Sender<SessionStatus>>,
        accumulator: ResultAccumulator,
        timer: ElapsedTimer,
        hooks: SessionHooks,
    ) -> Self {
        Self {
            run_id,
            status,
            accumulator,
            timer,
            hooks,
            gate: Mutex::new(Gate::default()),
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn is_finished(&self) -> bool {
        self.lock_gate().finished
    }

    pub fn accumulator(&self) -> &ResultAccumulator {
        &self.accumulator
    }

    /// Takes ownership of the run's result sequence and starts consuming it.
    ///
    /// Publishes `Running` with `columns`, starts the timer and fires the
    /// on-start hook. Returns `false` and destroys the sequence if the run
    /// already finished, e.g. because it was stopped while the engine was
    /// still dispatching.
    pub fn attach(
        self: &Arc<Self>,
        columns: Vec<Variable>,
        mut sequence: LazySequence<ResultRecord>,
    ) -> bool {
        let error_events = sequence.take_error_events();
        {
            let mut gate = self.lock_gate();
            if gate.finished {
                drop(gate);
                sequence.destroy();
                tracing::debug!(
                    run_id = self.run_id,
                    "Discarding result stream of a finished run"
                );
                return false;
            }
            gate.control = Some(sequence.control());
            self.update_status(|status| {
                status.run_state = RunState::Running;
                status.columns = columns;
            });
            self.timer.start();
        }

        tracing::info!(run_id = self.run_id, "Result stream attached");
        if let Some(hook) = &self.hooks.on_start {
            hook();
        }

        let consumer = tokio::spawn(Arc::clone(self).consume(sequence));
        let mut tasks = vec![consumer.abort_handle()];
        if let Some(mut events) = error_events {
            let controller = Arc::clone(self);
            let listener = tokio::spawn(async move {
                if let Some(error) = events.recv().await {
                    controller.finish(Termination::Failed(error.message().to_string()));
                }
            });
            tasks.push(listener.abort_handle());
        }

        let mut gate = self.lock_gate();
        if gate.finished {
            tasks.iter().for_each(AbortHandle::abort);
        } else {
            gate.tasks.extend(tasks);
        }
        true
    }

    async fn consume(self: Arc<Self>, mut sequence: LazySequence<ResultRecord>) {
        loop {
            match sequence.next().await {
                Some(Ok(record)) => {
                    if !self.accumulator.push(record) {
                        return;
                    }
                }
                Some(Err(error)) => {
                    self.finish(Termination::Failed(error.message().to_string()));
                    return;
                }
                None => {
                    self.finish(Termination::Exhausted);
                    return;
                }
            }
        }
    }

    /// Interrupts the run. Idempotent.
    pub fn stop(&self) -> bool {
        self.finish(Termination::Interrupted)
    }

    /// Moves the run into its terminal state.
    ///
    /// Only the first call has any effect; it destroys the sequence, seals the
    /// accumulator, publishes the terminal status, stops the timer, fires the
    /// on-stop hook and aborts the helper tasks. Returns whether this call was
    /// the one that finished the run.
    pub fn finish(&self, termination: Termination) -> bool {
        let tasks = {
            let mut gate = self.lock_gate();
            if gate.finished {
                return false;
            }
            gate.finished = true;
            let control = gate.control.take();

            // `done` must be read before destroy() sets it.
            let possibly_incomplete = match &termination {
                Termination::Exhausted => false,
                Termination::Failed(_) | Termination::Rejected(_) => true,
                Termination::Interrupted => {
                    !control.as_ref().is_some_and(SequenceControl::is_done)
                }
            };
            if let Some(control) = &control {
                control.destroy();
            }
            self.accumulator.seal();

            let (run_state, error_message) = match termination {
                Termination::Exhausted => (RunState::StoppedComplete, None),
                Termination::Interrupted => (RunState::StoppedInterrupted, None),
                Termination::Failed(message) | Termination::Rejected(message) => {
                    let message = StreamError::new(message).message().to_string();
                    (RunState::Errored, Some(message))
                }
            };
            tracing::info!(
                run_id = self.run_id,
                state = ?run_state,
                results = self.accumulator.len(),
                possibly_incomplete,
                "Run finished"
            );
            if let Some(message) = &error_message {
                tracing::warn!(run_id = self.run_id, error = %message, "Run failed");
            }

            self.update_status(|status| {
                status.run_state = run_state;
                status.possibly_incomplete = possibly_incomplete;
                status.error_message = error_message;
            });
            self.timer.stop();
            std::mem::take(&mut gate.tasks)
        };

        if let Some(hook) = &self.hooks.on_stop {
            hook();
        }
        tasks.iter().for_each(AbortHandle::abort);
        true
    }

    fn update_status(&self, modify: impl FnOnce(&mut SessionStatus)) {
        let run_id = self.run_id;
        self.status.send_if_modified(|status| {
            if status.run_id != run_id {
                return false;
            }
            modify(status);
            true
        });
    }

    fn lock_gate(&self) -> std::sync::MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
