//! HTTP server for the tilelog transparency log engine
//!
//! Exposes the write API (`POST /add`) and the read API (`GET /checkpoint`,
//! `GET /tile/...`) over axum, wiring the engine's appender and reader to a
//! filesystem-backed log. Binary entry point in `main.rs`.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use routes::build_router;
pub use state::AppState;
