//! Ordered result buffer with coalesced publication.
//!
//! Small result sets should appear row by row, large ones must not flood
//! observers. The accumulator therefore publishes the first
//! `immediate_limit` arrivals synchronously and after that at most once per
//! `interval`, with one trailing publish scheduled for arrivals that fall
//! inside the window. [`ResultAccumulator::seal`] always publishes the full
//! buffer, so the tail of a stream is never lost.
//!
//! Each publish copies the whole buffer under the state lock. Observers thus
//! only ever see prefixes of the arrival order, growing monotonically.

use crate::config::SessionConfig;
use crate::core::ResultRecord;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Published view of a run's results.
#[derive(Debug, Clone)]
pub struct ResultSnapshot {
    /// Run the records belong to.
    pub run_id: u64,
    pub records: Arc<[ResultRecord]>,
}

impl ResultSnapshot {
    pub fn empty(run_id: u64) -> Self {
        Self {
            run_id,
            records: Arc::from(Vec::new()),
        }
    }
}

/// When the accumulator publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPolicy {
    pub immediate_limit: usize,
    pub interval: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for PublishPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            immediate_limit: config.immediate_publish_limit,
            interval: config.publish_interval(),
        }
    }
}

#[derive(Debug, Default)]
struct AccumulatorState {
    buffer: Vec<ResultRecord>,
    published_len: usize,
    last_published: Option<Instant>,
    trailing: Option<JoinHandle<()>>,
    /// Bumped whenever a trailing publish is scheduled or cancelled.
    trailing_generation: u64,
    sealed: bool,
}

#[derive(Debug)]
struct AccumulatorInner {
    run_id: u64,
    policy: PublishPolicy,
    publisher: Arc<watch::Sender<ResultSnapshot>>,
    state: Mutex<AccumulatorState>,
}

impl AccumulatorInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, AccumulatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes the current buffer. Caller holds the state lock.
    fn publish(&self, state: &mut AccumulatorState) {
        let records: Arc<[ResultRecord]> = Arc::from(state.buffer.as_slice());
        state.published_len = state.buffer.len();
        state.last_published = Some(Instant::now());

        let run_id = self.run_id;
        self.publisher.send_if_modified(|current| {
            if current.run_id != run_id {
                return false;
            }
            current.records = records;
            true
        });
    }

    fn cancel_trailing(state: &mut AccumulatorState) {
        state.trailing_generation += 1;
        if let Some(trailing) = state.trailing.take() {
            trailing.abort();
        }
    }

    /// Runs the trailing publish scheduled as `generation`. A task that was
    /// cancelled or replaced while waiting for the lock does nothing.
    fn flush_trailing(&self, generation: u64) {
        let mut state = self.lock();
        if state.trailing_generation != generation {
            return;
        }
        state.trailing = None;
        if !state.sealed && state.buffer.len() > state.published_len {
            self.publish(&mut state);
        }
    }
}

/// Buffers the records of one run and publishes them on a watch channel.
///
/// Snapshots are only written while the channel holds this accumulator's
/// run id, so a superseded run cannot overwrite a newer run's results.
#[derive(Debug, Clone)]
pub struct ResultAccumulator {
    inner: Arc<AccumulatorInner>,
}

impl ResultAccumulator {
    pub fn new(
        run_id: u64,
        policy: PublishPolicy,
        publisher: Arc<watch::Sender<ResultSnapshot>>,
    ) -> Self {
        Self {
            inner: Arc::new(AccumulatorInner {
                run_id,
                policy,
                publisher,
                state: Mutex::new(AccumulatorState::default()),
            }),
        }
    }

    /// Appends a record and publishes according to the policy.
    ///
    /// Returns `false` without buffering once the accumulator is sealed.
    pub fn push(&self, record: ResultRecord) -> bool {
        let mut state = self.inner.lock();
        if state.sealed {
            return false;
        }
        state.buffer.push(record);

        if state.buffer.len() <= self.inner.policy.immediate_limit {
            self.inner.publish(&mut state);
            return true;
        }

        let now = Instant::now();
        let interval = self.inner.policy.interval;
        let due = state.last_published.map_or(now, |last| last + interval);
        if now >= due {
            AccumulatorInner::cancel_trailing(&mut state);
            self.inner.publish(&mut state);
        } else if state.trailing.is_none() {
            state.trailing_generation += 1;
            let generation = state.trailing_generation;
            let inner = Arc::clone(&self.inner);
            state.trailing = Some(tokio::spawn(async move {
                tokio::time::sleep_until(due).await;
                inner.flush_trailing(generation);
            }));
        }
        true
    }

    /// Final publish. Cancels a pending trailing publish, publishes the full
    /// buffer and rejects further pushes. Idempotent.
    pub fn seal(&self) {
        let mut state = self.inner.lock();
        if state.sealed {
            return;
        }
        state.sealed = true;
        AccumulatorInner::cancel_trailing(&mut state);
        self.inner.publish(&mut state);
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.lock().sealed
    }

    /// Copy of everything buffered so far, published or not.
    pub fn snapshot(&self) -> Arc<[ResultRecord]> {
        Arc::from(self.inner.lock().buffer.as_slice())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records covered by the latest publish.
    pub fn published_len(&self) -> usize {
        self.inner.lock().published_len
    }

    pub fn run_id(&self) -> u64 {
        self.inner.run_id
    }
}
