//! Elapsed-time tracking for a running query.
//!
//! While active, a tick task publishes the elapsed time on a watch channel at
//! a fixed period so observers can render a live counter. Stopping freezes the
//! value at the exact stop instant.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Default)]
struct TimerState {
    origin: Option<Instant>,
    ticker: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct TimerInner {
    tick: Duration,
    elapsed: Arc<watch::Sender<Duration>>,
    state: Mutex<TimerState>,
}

impl TimerInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TimerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
    }
}

/// Measures wall-clock time between `start` and `stop`.
///
/// Cloning yields another handle to the same timer.
#[derive(Debug, Clone)]
pub struct ElapsedTimer {
    inner: Arc<TimerInner>,
}

impl ElapsedTimer {
    /// Creates an inactive timer that publishes every `tick` while running.
    pub fn new(tick: Duration) -> Self {
        let (elapsed, _) = watch::channel(Duration::ZERO);
        Self {
            inner: Arc::new(TimerInner {
                tick: tick.max(Duration::from_millis(1)),
                elapsed: Arc::new(elapsed),
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// Starts measuring from now. Restarting an active timer resets its origin.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut state = self.inner.lock();
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }

        let origin = Instant::now();
        state.origin = Some(origin);
        self.inner.elapsed.send_replace(Duration::ZERO);

        let elapsed = Arc::clone(&self.inner.elapsed);
        let tick = self.inner.tick;
        state.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(origin + tick, tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                elapsed.send_replace(origin.elapsed());
            }
        }));
    }

    /// Stops the timer and freezes the elapsed value.
    ///
    /// Returns `false` if the timer was not running.
    pub fn stop(&self) -> bool {
        let mut state = self.inner.lock();
        let Some(origin) = state.origin.take() else {
            return false;
        };
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        self.inner.elapsed.send_replace(origin.elapsed());
        true
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().origin.is_some()
    }

    /// Time elapsed since `start`, or the frozen value once stopped.
    pub fn elapsed(&self) -> Duration {
        let state = self.inner.lock();
        match state.origin {
            Some(origin) => origin.elapsed(),
            None => *self.inner.elapsed.borrow(),
        }
    }

    pub fn ms_elapsed(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Elapsed seconds with two decimals, e.g. `"1.25s"`.
    pub fn seconds_string(&self) -> String {
        format!("{:.2}s", self.elapsed().as_secs_f64())
    }

    /// Receiver of the ticking elapsed value.
    pub fn subscribe(&self) -> watch::Receiver<Duration> {
        self.inner.elapsed.subscribe()
    }
}
