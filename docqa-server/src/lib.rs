//! `docqa-server` exposes the document Q&A pipeline over HTTP.
//! Documents are uploaded as UTF-8 text files and questions are answered
//! from their content only, with citations.

pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{AppState, app_router, build_embedder, build_orchestrator, run_server};
