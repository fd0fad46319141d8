//! HTTP route handlers.
//!
//! The relay surface is small: [`health`] for probes (unauthenticated),
//! [`sessions`] for session management (Bearer auth), and the WebSocket
//! terminal upgrade in [`crate::ws`]. Everything else that flows through
//! this server is raw bytes, not HTTP.

pub mod health;
pub mod sessions;
