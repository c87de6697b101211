//! HTTP request handlers.
//!
//! This module contains the transport-level handlers shared by any Cliniq
//! deployment: health probes and the topic-subscription WebSocket.

pub mod health;
pub mod ws;

pub use health::{health_check, readiness_check};
pub use ws::WsMessage;
