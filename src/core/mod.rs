//! Core data structures and types for Quarry query sessions

use serde::Serialize;
use std::collections::BTreeSet;

pub mod record;
pub mod source;

pub use record::ResultRecord;
pub use source::{Source, SourceAccess, SourceCategory};

/// Lifecycle state of the most recent submission.
///
/// `Idle` is the initial state and the state a fresh submission is reset to
/// while its engine dispatch is pending. Each submission enters `Running` at
/// most once and ends in exactly one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    StoppedComplete,
    StoppedInterrupted,
    Errored,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::StoppedComplete | RunState::StoppedInterrupted | RunState::Errored
        )
    }
}

/// The query text and sources that produced the in-flight or most recently
/// completed result stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub query: String,
    pub sources: Vec<Source>,
}

impl Submission {
    pub fn new(query: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            query: query.into(),
            sources,
        }
    }

    /// Whether the given inputs differ from this submission.
    ///
    /// Sources are compared by shortname, ignoring order.
    pub fn is_stale(&self, query: &str, sources: &[Source]) -> bool {
        if self.query != query {
            return true;
        }
        let submitted: BTreeSet<&str> = self
            .sources
            .iter()
            .map(|s| s.shortname.as_str())
            .collect();
        let current: BTreeSet<&str> = sources.iter().map(|s| s.shortname.as_str()).collect();
        submitted != current
    }
}
