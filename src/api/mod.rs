//! Session-level API
//!
//! [`QuerySession`](query_session::QuerySession) is the entry point for UI
//! layers: it validates submissions, dispatches them to the engine and exposes
//! status, results and elapsed time as watch channels.

pub mod query_session;

pub use query_session::{
    QuerySession, ResultSnapshot, SessionError, SessionHooks, SessionStatus, SessionView,
};
