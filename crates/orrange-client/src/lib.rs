//! Typed client for the Orrange REST API, plus the optimistic-update helper
//! the UI layer builds on.

pub mod client;
pub mod optimistic;
pub mod state;

pub use client::{ApiClient, ClientError};
pub use optimistic::Optimistic;
pub use state::PostState;
