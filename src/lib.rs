//! Document-sharing core of a school-group dashboard.
//!
//! [`store::DocumentStore`] keeps the documents and comments of the current
//! view, applies user actions optimistically, and reconciles them against a
//! [`gateway::Gateway`]. The `schooldocsd` binary exposes it over a JSON-lines
//! protocol on stdin/stdout with a SQLite-backed gateway.

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod ipc;
pub mod model;
pub mod optimistic;
pub mod realtime;
pub mod store;

pub use error::StoreError;
pub use gateway::{Gateway, GatewayError, GatewayRef, GatewayResult};
pub use optimistic::Pending;
pub use store::{DocumentStore, StoreSettings, StoreState};
