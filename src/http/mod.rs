//! HTTP API module for Quarry
//!
//! Provides REST and WebSocket endpoints for:
//! - Query submission, interruption and state inspection
//! - Live state streaming
//! - Source listing and CSV export

pub mod server;

pub use server::{
    create_server, start_server, term_to_json, view_to_json, AppState, ErrorResponse,
    ListSourcesResponse, RunQueryRequest, StaleResponse, SuccessResponse,
};
