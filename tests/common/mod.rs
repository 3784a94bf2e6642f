//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use oxigraph::model::{Literal, Term, Variable};
use quarry::core::{ResultRecord, Source};
use quarry::querying::{
    EngineError, EngineResult, LazySequence, QueryContext, QueryEngine, StreamError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a [`ScriptedEngine`] answers with.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// `n` rows available immediately.
    Rows(usize),
    /// `count` rows, one every `interval`.
    SlowRows { count: usize, interval: Duration },
    /// Answers with `rows` rows after waiting `delay`.
    Delayed { delay: Duration, rows: usize },
    /// Rejects the submission.
    Reject(String),
    /// Emits `after` rows, then fails through `channel`.
    FailAfter {
        after: usize,
        message: Option<String>,
        channel: ErrorChannel,
    },
    Boolean(bool),
}

/// Where a [`Behaviour::FailAfter`] producer raises its error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorChannel {
    /// Through the pull side of the sequence.
    InBand,
    /// Through the error event channel only.
    OutOfBand,
    /// Through both, one right after the other.
    Both,
}

/// Engine double that records every call and answers from a script.
#[derive(Clone)]
pub struct ScriptedEngine {
    behaviour: Arc<Mutex<Behaviour>>,
    pub calls: Arc<Mutex<Vec<(String, QueryContext)>>>,
    /// Set once a producer observes that its sequence was destroyed.
    pub destroyed: Arc<AtomicBool>,
}

impl ScriptedEngine {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour: Arc::new(Mutex::new(behaviour)),
            calls: Arc::new(Mutex::new(Vec::new())),
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_behaviour(&self, behaviour: Behaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub fn last_context(&self) -> QueryContext {
        let calls = self.calls.lock().unwrap();
        calls.last().expect("engine was not called").1.clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn was_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

pub fn n_column() -> Vec<Variable> {
    vec![Variable::new_unchecked("n")]
}

pub fn numbered(i: usize) -> ResultRecord {
    let value = Some(Term::from(Literal::from(i as i64)));
    ResultRecord::new(n_column().into(), vec![value])
}

/// The integer bound to `n`.
pub fn number_of(record: &ResultRecord) -> usize {
    match record.get("n") {
        Some(Term::Literal(literal)) => literal.value().parse().unwrap(),
        other => panic!("expected a numeric literal, got {:?}", other),
    }
}

fn bindings(solutions: LazySequence<ResultRecord>) -> EngineResult {
    EngineResult::Bindings {
        variables: n_column(),
        solutions,
    }
}

#[async_trait]
impl QueryEngine for ScriptedEngine {
    async fn execute(
        &self,
        query: &str,
        context: &QueryContext,
    ) -> Result<EngineResult, EngineError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), context.clone()));
        let behaviour = self.behaviour.lock().unwrap().clone();
        let destroyed = Arc::clone(&self.destroyed);

        match behaviour {
            Behaviour::Rows(n) => {
                let rows: Vec<_> = (0..n).map(numbered).collect();
                Ok(bindings(LazySequence::from_items(rows)))
            }
            Behaviour::Delayed { delay, rows } => {
                tokio::time::sleep(delay).await;
                let (writer, sequence) = LazySequence::channel();
                tokio::spawn(async move {
                    if writer.is_destroyed() {
                        destroyed.store(true, Ordering::SeqCst);
                        return;
                    }
                    for i in 0..rows {
                        writer.push(numbered(i));
                    }
                });
                Ok(bindings(sequence))
            }
            Behaviour::SlowRows { count, interval } => {
                let (writer, sequence) = LazySequence::channel();
                tokio::spawn(async move {
                    for i in 0..count {
                        tokio::select! {
                            () = tokio::time::sleep(interval) => {}
                            () = writer.destroyed() => break,
                        }
                        if !writer.push(numbered(i)) {
                            break;
                        }
                    }
                    if writer.is_destroyed() {
                        destroyed.store(true, Ordering::SeqCst);
                    }
                });
                Ok(bindings(sequence))
            }
            Behaviour::Reject(message) => Err(EngineError::Evaluation(message)),
            Behaviour::FailAfter {
                after,
                message,
                channel,
            } => {
                let (writer, sequence) = LazySequence::channel();
                tokio::spawn(async move {
                    for i in 0..after {
                        writer.push(numbered(i));
                    }
                    let error = message.map_or_else(StreamError::unknown, StreamError::new);
                    match channel {
                        ErrorChannel::InBand => {
                            writer.fail(error);
                        }
                        ErrorChannel::OutOfBand => {
                            writer.emit_error(error);
                        }
                        ErrorChannel::Both => {
                            writer.fail(error.clone());
                            writer.emit_error(error);
                        }
                    }
                    writer.destroyed().await;
                    destroyed.store(true, Ordering::SeqCst);
                });
                Ok(bindings(sequence))
            }
            Behaviour::Boolean(value) => Ok(EngineResult::Boolean(value)),
        }
    }
}

pub fn sparql_source(slug: &str) -> Source {
    Source::sparql(slug, slug, &format!("https://example.org/{slug}/sparql"))
}

pub fn compound_source(slug: &str) -> Source {
    Source::compound(
        slug,
        slug,
        &format!("https://frink.apps.renci.org/{slug}/sparql"),
        &format!("https://frink.apps.renci.org/ldf/{slug}"),
    )
}
