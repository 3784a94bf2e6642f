//! Query Execution Module
//!
//! This module turns an engine's result stream into observable session state.
//!
//! # Components
//!
//! - **ElapsedTimer** - Live elapsed-time counter that freezes when a run ends
//! - **ResultAccumulator** - Ordered result buffer with immediate, rate-limited
//!   and final publication
//! - **StreamController** - Drives one result stream and applies exactly one
//!   terminal transition
//! - **result_converter** - Normalises bindings, quads and booleans into one record stream
//!
//! # Architecture
//!
//! ```text
//! EngineResult ──normalize──▶ LazySequence<ResultRecord> ──▶ StreamController
//!                                                              │ push
//!                                                              ▼
//!                                                      ResultAccumulator ──▶ watch<ResultSnapshot>
//! ```

pub mod accumulator;
pub mod lifecycle;
pub mod result_converter;
pub mod timer;

// Re-export main types for convenience
pub use accumulator::{PublishPolicy, ResultAccumulator, ResultSnapshot};
pub use lifecycle::{SessionHooks, SessionStatus, StreamController, Termination};
pub use result_converter::normalize;
pub use timer::ElapsedTimer;
