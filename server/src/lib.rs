//! # Cliniq Server
//!
//! The deployable clinic queue service: HTTP + WebSocket transport over
//! the engine in `cliniq-core`, with `PostgreSQL` storage and Web Push
//! dispatch.

pub mod api;
pub mod config;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::Config;
pub use routes::build_router;
pub use state::AppState;
