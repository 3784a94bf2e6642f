use crate::config::SessionConfig;
use crate::core::{ResultRecord, Source, Submission};
use crate::execution::accumulator::{PublishPolicy, ResultAccumulator};
use crate::execution::lifecycle::{StreamController, Termination};
use crate::execution::result_converter::normalize;
use crate::execution::timer::ElapsedTimer;
use crate::export::csv::{to_csv_string, ExportError};
use crate::querying::query_processing::{QueryContext, QueryEngine};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

pub use crate::execution::accumulator::ResultSnapshot;
pub use crate::execution::lifecycle::{SessionHooks, SessionStatus};

/// Caller-contract violations reported by [`QuerySession::run_query`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("No query provided. Enter a SPARQL query to run.")]
    MissingQuery,
    #[error("No sources provided. At least one source must be selected to run a query.")]
    NoSources,
}

/// Everything a UI needs to render a query panel, read at one point in time.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub status: SessionStatus,
    pub results: Arc<[ResultRecord]>,
    pub elapsed: Duration,
}

impl SessionView {
    pub fn ms_elapsed(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    pub fn seconds_string(&self) -> String {
        format!("{:.2}s", self.elapsed.as_secs_f64())
    }
}

struct SessionInner {
    engine: Arc<dyn QueryEngine>,
    config: SessionConfig,
    hooks: SessionHooks,
    status: Arc<watch::Sender<SessionStatus>>,
    results: Arc<watch::Sender<ResultSnapshot>>,
    timer: ElapsedTimer,
    next_run_id: AtomicU64,
    active: Mutex<Option<Arc<StreamController>>>,
}

impl SessionInner {
    fn take_active(&self) -> Option<Arc<StreamController>> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let active = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(controller) = active.take() {
            controller.stop();
        }
    }
}

/// One query panel: submits queries and exposes the state of the latest run.
///
/// Cloning yields another handle to the same session. When the last handle is
/// dropped, the active run is stopped.
///
/// # Example
///
/// ```ignore
/// let session = QuerySession::new(SparqlEndpointEngine::new());
/// let mut status = session.subscribe_status();
///
/// session.run_query("SELECT * WHERE { ?s ?p ?o } LIMIT 10", &[source]).await?;
/// while status.changed().await.is_ok() {
///     println!("{:?}: {} results", status.borrow().run_state, session.results().len());
/// }
/// ```
#[derive(Clone)]
pub struct QuerySession {
    inner: Arc<SessionInner>,
}

impl QuerySession {
    pub fn new(engine: impl QueryEngine) -> Self {
        Self::with_config(engine, SessionConfig::default())
    }

    pub fn with_config(engine: impl QueryEngine, config: SessionConfig) -> Self {
        Self::with_hooks(Arc::new(engine), config, SessionHooks::default())
    }

    /// Creates a session around a shared engine with start/stop callbacks.
    pub fn with_hooks(
        engine: Arc<dyn QueryEngine>,
        config: SessionConfig,
        hooks: SessionHooks,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::initial());
        let (results, _) = watch::channel(ResultSnapshot::empty(0));
        Self {
            inner: Arc::new(SessionInner {
                engine,
                config,
                hooks,
                status: Arc::new(status),
                results: Arc::new(results),
                timer: ElapsedTimer::new(config.timer_tick()),
                next_run_id: AtomicU64::new(1),
                active: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Submits `query` against `sources`.
    ///
    /// Any run still in progress is interrupted first. Returns once the engine
    /// answered and its result stream is being consumed, or once the engine's
    /// rejection has been recorded as an `Errored` state. Completion of the
    /// stream itself is observed through [`status`](Self::status) or the watch
    /// channels.
    ///
    /// Dropping the returned future before it resolves leaves the run pending;
    /// callers that cannot await it should spawn it.
    ///
    /// # Errors
    ///
    /// [`SessionError::MissingQuery`] for blank query text and
    /// [`SessionError::NoSources`] for an empty source list. Nothing is
    /// submitted and the session state is left untouched in both cases.
    pub async fn run_query(&self, query: &str, sources: &[Source]) -> Result<(), SessionError> {
        Self::check_submission(query, sources)?;

        let inner = &self.inner;
        if let Some(previous) = inner.take_active() {
            tracing::debug!(run_id = previous.run_id(), "Interrupting previous run");
            previous.stop();
        }

        let run_id = inner.next_run_id.fetch_add(1, Ordering::SeqCst);
        let submission = Submission::new(query, sources.to_vec());
        inner.status.send_if_modified(|status| {
            if status.run_id > run_id {
                return false;
            }
            *status = SessionStatus::submitted(run_id, submission);
            true
        });
        inner.results.send_if_modified(|results| {
            if results.run_id > run_id {
                return false;
            }
            *results = ResultSnapshot::empty(run_id);
            true
        });

        let accumulator = ResultAccumulator::new(
            run_id,
            PublishPolicy::from(&inner.config),
            Arc::clone(&inner.results),
        );
        let controller = Arc::new(StreamController::new(
            run_id,
            Arc::clone(&inner.status),
            accumulator,
            inner.timer.clone(),
            inner.hooks.clone(),
        ));
        let replaced = inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&controller));
        if let Some(replaced) = replaced {
            replaced.stop();
        }

        let context = QueryContext::for_sources(sources);
        tracing::info!(run_id, sources = ?context.sources, "Submitting query");

        match inner.engine.execute(query, &context).await {
            Ok(result) => {
                let (columns, sequence) = normalize(result);
                controller.attach(columns, sequence);
            }
            Err(e) => {
                tracing::warn!(run_id, error = %e, "Engine rejected query");
                controller.finish(Termination::Rejected(e.to_string()));
            }
        }
        Ok(())
    }

    /// The caller-contract checks `run_query` performs before submitting.
    pub fn check_submission(query: &str, sources: &[Source]) -> Result<(), SessionError> {
        if query.trim().is_empty() {
            return Err(SessionError::MissingQuery);
        }
        if sources.is_empty() {
            return Err(SessionError::NoSources);
        }
        Ok(())
    }

    /// Interrupts the current run. Does nothing when no run is in progress.
    pub fn stop_query(&self) -> bool {
        let active = self
            .inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match active {
            Some(controller) => controller.stop(),
            None => false,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.status.borrow().is_running()
    }

    /// Latest published results of the current run.
    pub fn results(&self) -> Arc<[ResultRecord]> {
        Arc::clone(&self.inner.results.borrow().records)
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.timer.elapsed()
    }

    pub fn ms_elapsed(&self) -> u64 {
        self.inner.timer.ms_elapsed()
    }

    pub fn seconds_string(&self) -> String {
        self.inner.timer.seconds_string()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            status: self.status(),
            results: self.results(),
            elapsed: self.elapsed(),
        }
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    pub fn subscribe_results(&self) -> watch::Receiver<ResultSnapshot> {
        self.inner.results.subscribe()
    }

    pub fn subscribe_elapsed(&self) -> watch::Receiver<Duration> {
        self.inner.timer.subscribe()
    }

    /// Waits until no submission is pending or streaming and returns the
    /// resulting status. Resolves immediately when nothing was submitted.
    pub async fn wait_until_stopped(&self) -> SessionStatus {
        let mut rx = self.subscribe_status();
        let status = rx
            .wait_for(|status| status.run_id == 0 || status.run_state.is_terminal())
            .await
            .map(|status| status.clone());
        // The sender lives as long as `self`, so the channel cannot close here.
        status.unwrap_or_else(|_| self.status())
    }

    /// Whether `query` and `sources` differ from the last submission. Always
    /// true before the first submission.
    pub fn is_stale(&self, query: &str, sources: &[Source]) -> bool {
        self.inner
            .status
            .borrow()
            .last_submitted
            .as_ref()
            .map_or(true, |submission| submission.is_stale(query, sources))
    }

    /// Current results as SPARQL CSV, or `None` when there are none.
    pub fn export_csv(&self) -> Result<Option<String>, ExportError> {
        let results = self.results();
        if results.is_empty() {
            return Ok(None);
        }
        let columns = self.inner.status.borrow().columns.clone();
        to_csv_string(&columns, &results).map(Some)
    }
}

impl std::fmt::Debug for QuerySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySession")
            .field("config", &self.inner.config)
            .field("status", &*self.inner.status.borrow())
            .finish_non_exhaustive()
    }
}
