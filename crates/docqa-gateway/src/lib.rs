//! HTTP API: document upload, question answering, and a health endpoint.

mod error;
mod handlers;
mod router;
mod server;

pub use error::{ApiError, GatewayError};
pub use server::{AppState, GatewayServer};
