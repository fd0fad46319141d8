//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::terminal::{SessionRegistry, UpstreamTarget};
use crate::upstream::ShellConnector;

/// Shared application state for the shellgate server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Live terminal sessions and the concurrent-session cap.
    pub registry: Arc<SessionRegistry>,
    /// Capability that opens shell channels for terminal sessions.
    pub shell_connector: Arc<dyn ShellConnector>,
    /// Where terminal sessions connect, resolved from config at startup.
    pub target: UpstreamTarget,
    /// Selected egress mode (`direct`/`proxied`), surfaced in `/api/health`.
    pub egress_mode: &'static str,
}
