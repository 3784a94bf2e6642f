//! Lazy, cancellable result sequences.
//!
//! A [`LazySequence`] is what an engine hands back for streaming results. It is
//! pulled asynchronously with [`LazySequence::next`], can be destroyed from any
//! holder of its [`SequenceControl`], and optionally carries a second,
//! out-of-band channel of error events. The pull side and the event side are
//! independent: a consumer must be prepared for either to report termination
//! first.
//!
//! Producers usually create one with [`LazySequence::channel`] and feed it
//! through the returned [`SequenceWriter`]:
//!
//! ```ignore
//! let (writer, sequence) = LazySequence::channel();
//! tokio::spawn(async move {
//!     for record in records {
//!         if !writer.push(record) {
//!             break; // destroyed by the consumer
//!         }
//!     }
//! });
//! ```

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Message used when a stream error carries no description.
pub const UNKNOWN_STREAM_ERROR: &str = "An unknown error occurred while streaming data.";

/// Error raised while a sequence is being consumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.message())]
pub struct StreamError {
    message: Option<String>,
}

impl StreamError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = (!message.trim().is_empty()).then_some(message);
        Self { message }
    }

    /// An error without a description.
    pub fn unknown() -> Self {
        Self { message: None }
    }

    /// Human-readable message, falling back to a generic one.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or(UNKNOWN_STREAM_ERROR)
    }
}

#[derive(Debug)]
struct ControlState {
    done: AtomicBool,
    destroyed: watch::Sender<bool>,
}

/// Shared handle to a sequence's `done` flag and destroy signal.
#[derive(Debug, Clone)]
pub struct SequenceControl {
    state: Arc<ControlState>,
}

impl SequenceControl {
    fn new() -> Self {
        let (destroyed, _) = watch::channel(false);
        Self {
            state: Arc::new(ControlState {
                done: AtomicBool::new(false),
                destroyed,
            }),
        }
    }

    /// Whether the sequence ended, either exhausted or destroyed.
    pub fn is_done(&self) -> bool {
        self.state.done.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        *self.state.destroyed.borrow()
    }

    /// Releases the sequence. Pending and future pulls resolve to end-of-stream.
    /// Idempotent.
    pub fn destroy(&self) {
        self.state.done.store(true, Ordering::SeqCst);
        self.state.destroyed.send_replace(true);
    }

    /// Resolves once the sequence has been destroyed.
    pub async fn destroyed(&self) {
        let mut rx = self.state.destroyed.subscribe();
        let _ = rx.wait_for(|destroyed| *destroyed).await;
    }

    fn mark_done(&self) {
        self.state.done.store(true, Ordering::SeqCst);
    }
}

/// An asynchronously pulled, non-restartable sequence of items.
pub struct LazySequence<T> {
    items: BoxStream<'static, Result<T, StreamError>>,
    control: SequenceControl,
    error_events: Option<mpsc::UnboundedReceiver<StreamError>>,
}

impl<T> fmt::Debug for LazySequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySequence")
            .field("done", &self.control.is_done())
            .field("destroyed", &self.control.is_destroyed())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> LazySequence<T> {
    /// Creates a writer/sequence pair backed by unbounded channels.
    pub fn channel() -> (SequenceWriter<T>, Self) {
        let (item_tx, item_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let control = SequenceControl::new();
        let items = stream::unfold(item_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        let writer = SequenceWriter {
            items: item_tx,
            errors: error_tx,
            control: control.clone(),
        };
        let sequence = Self {
            items,
            control,
            error_events: Some(error_rx),
        };
        (writer, sequence)
    }

    /// Wraps an existing stream. The result has no out-of-band error channel.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, StreamError>> + Send + 'static,
    {
        Self {
            items: stream.boxed(),
            control: SequenceControl::new(),
            error_events: None,
        }
    }

    /// A sequence over already materialised items.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(stream::iter(items.into_iter().map(Ok)))
    }

    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    /// Transforms every item, keeping the control handle and error events.
    pub fn map<U, F>(self, mut f: F) -> LazySequence<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        LazySequence {
            items: self.items.map(move |item| item.map(&mut f)).boxed(),
            control: self.control,
            error_events: self.error_events,
        }
    }

    /// Pulls the next item.
    ///
    /// Returns `None` once the producer finished or the sequence was destroyed;
    /// a destroy issued while this call is pending wakes it immediately.
    pub async fn next(&mut self) -> Option<Result<T, StreamError>> {
        if self.control.is_destroyed() {
            return None;
        }
        let control = self.control.clone();
        let item = tokio::select! {
            biased;
            () = control.destroyed() => None,
            item = self.items.next() => item,
        };
        if item.is_none() {
            self.control.mark_done();
        }
        item
    }
}

impl<T> LazySequence<T> {
    pub fn control(&self) -> SequenceControl {
        self.control.clone()
    }

    pub fn is_done(&self) -> bool {
        self.control.is_done()
    }

    pub fn destroy(&self) {
        self.control.destroy();
    }

    /// Takes the receiver of out-of-band error events, if this sequence has one.
    pub fn take_error_events(&mut self) -> Option<mpsc::UnboundedReceiver<StreamError>> {
        self.error_events.take()
    }
}

/// Producer side of a channel-backed [`LazySequence`].
///
/// Dropping the writer ends the sequence.
#[derive(Debug)]
pub struct SequenceWriter<T> {
    items: mpsc::UnboundedSender<Result<T, StreamError>>,
    errors: mpsc::UnboundedSender<StreamError>,
    control: SequenceControl,
}

impl<T> SequenceWriter<T> {
    /// Emits an item. Returns `false` when the consumer is gone or destroyed
    /// the sequence, in which case the producer should stop.
    pub fn push(&self, item: T) -> bool {
        !self.control.is_destroyed() && self.items.send(Ok(item)).is_ok()
    }

    /// Raises an error through the pull side.
    pub fn fail(&self, error: StreamError) -> bool {
        !self.control.is_destroyed() && self.items.send(Err(error)).is_ok()
    }

    /// Raises an error through the out-of-band event channel only.
    pub fn emit_error(&self, error: StreamError) -> bool {
        !self.control.is_destroyed() && self.errors.send(error).is_ok()
    }

    pub fn is_destroyed(&self) -> bool {
        self.control.is_destroyed()
    }

    /// Resolves once the consumer destroyed the sequence.
    pub async fn destroyed(&self) {
        self.control.destroyed().await;
    }
}
