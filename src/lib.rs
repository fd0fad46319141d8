#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_async)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! shellgate library — exposes the relay core for use by downstream crates
//! that bring their own protocol clients.
//!
//! The core never speaks SSH or SOCKS5. It defines two capability traits —
//! [`upstream::ShellConnector`] for opening interactive shell channels and
//! [`upstream::ProxyConnector`] for proxied egress — and runs everything
//! around them:
//!
//! - `terminal` — WebSocket terminal sessions and their registry
//! - `gateway` — HTTP CONNECT tunnel gateway
//! - `relay` — bidirectional byte relay primitive
//! - `egress` — direct-vs-proxied egress selection
//! - `auth` — API key authentication middleware
//! - `config` — configuration loading
//! - `routes` — REST API route handlers
//! - `ws` — WebSocket upgrade and frame pump
//! - `server` — router assembly and the run loop
//!
//! A downstream crate embeds the server by implementing the capability
//! traits and calling [`server::run_server`] with its own
//! [`server::Capabilities`]; the bundled binary runs with the local shell
//! capability and direct egress.

pub mod auth;
pub mod config;
pub mod egress;
pub mod error;
pub mod gateway;
pub mod relay;
pub mod routes;
pub mod server;
pub mod state;
pub mod terminal;
pub mod upstream;
pub mod ws;

// Re-export key types at crate root for convenience.
pub use auth::ApiKey;
pub use config::Config;
pub use error::RelayError;
pub use server::{run_server, Capabilities, ServerError};
pub use state::AppState;
