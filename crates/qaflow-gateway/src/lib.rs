//! HTTP and WebSocket surface of the QA dashboard.
//!
//! Exposes run control, snapshots, task prompt generation and supervision
//! over a JSON API, and streams run events to dashboard clients on `/ws`.

pub mod connection;
pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, GatewayServer};
