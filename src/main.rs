#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # shellgate
//!
//! Stream relay for browser terminals and CONNECT tunnels.
//!
//! shellgate bridges two kinds of byte streams: WebSocket terminal sessions
//! (browser keystrokes in, shell output out) and raw HTTP CONNECT tunnels
//! (client bytes relayed verbatim to a destination, optionally through an
//! upstream proxy). Both are protected by a pre-shared API key where HTTP
//! is involved; tunnel payloads are never inspected.
//!
//! ## API surface
//!
//! | Method | Path                 | Auth | Description                        |
//! |--------|----------------------|------|------------------------------------|
//! | GET    | `/api/health`        | No   | Liveness probe                     |
//! | GET    | `/api/sessions`      | Yes  | List live terminal sessions        |
//! | DELETE | `/api/sessions/{id}` | Yes  | Tear down a terminal session       |
//! | GET    | `/api/terminal`      | Yes* | WebSocket for interactive terminal |
//!
//! *WebSocket auth is via `?token=<key>` query param (no `Authorization`
//! header available during the upgrade handshake).
//!
//! The CONNECT gateway is a separate raw TCP listener (`[gateway]` in the
//! config), not an HTTP route.
//!
//! ## Architecture
//!
//! ```text
//! main.rs          — entry point, clap args, local capabilities
//! server.rs        — router setup, gateway spawn, graceful shutdown
//! auth.rs          — Bearer token middleware, constant-time comparison
//! config.rs        — TOML + env-var configuration
//! egress.rs        — direct vs proxied egress selection
//! relay.rs         — bidirectional byte relay primitive
//! error.rs         — relay error taxonomy
//! routes/
//!   health.rs      — GET /api/health
//!   sessions.rs    — GET/DELETE /api/sessions
//! terminal/
//!   mod.rs         — SessionRegistry (admission, teardown signals)
//!   session.rs     — session state machine and message relay
//! gateway/
//!   mod.rs         — CONNECT accept loop and tunnel state machine
//!   connect.rs     — request-head reader and CONNECT parser
//! upstream/
//!   mod.rs         — capability traits, DirectConnector
//!   local.rs       — local shell process capability
//! ws.rs            — WebSocket upgrade and frame pump
//! ```

use clap::Parser;

use shellgate::server::{run_server, Capabilities};
use shellgate::Config;

/// Stream relay for browser terminals and CONNECT tunnels.
#[derive(Parser)]
#[command(name = "shellgate", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let capabilities = Capabilities::local(&config);
    if let Err(e) = run_server(config, capabilities).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
