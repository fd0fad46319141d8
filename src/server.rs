//! Server assembly: capability wiring, router construction, and the
//! graceful-shutdown run loop.
//!
//! The binary calls [`run_server`] with [`Capabilities::local`]; downstream
//! crates that embed shellgate call it with their own providers (a real SSH
//! client behind [`ShellConnector`], a SOCKS5 client behind
//! [`ProxyConnector`]). Startup failures come back as [`ServerError`] — the
//! embedder decides whether that exits the process.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{delete, get},
    Extension, Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{self, ApiKey};
use crate::config::Config;
use crate::egress::{EgressConfigurator, EgressError};
use crate::gateway::TunnelGateway;
use crate::routes;
use crate::state::AppState;
use crate::terminal::{SessionRegistry, UpstreamTarget};
use crate::upstream::local::LocalShellConnector;
use crate::upstream::{ProxyConnector, ShellConnector};
use crate::ws;

/// Connectivity providers injected at startup. The core never speaks SSH or
/// SOCKS5 itself; these traits are where real protocol clients plug in.
pub struct Capabilities {
    /// Opens shell channels for terminal sessions.
    pub shell: Arc<dyn ShellConnector>,
    /// Optional proxy egress; required when `[proxy]` is configured.
    pub proxy: Option<Arc<dyn ProxyConnector>>,
}

impl Capabilities {
    /// The providers the standalone binary ships with: a local shell process
    /// capability and no proxy.
    pub fn local(config: &Config) -> Self {
        Self {
            shell: Arc::new(LocalShellConnector::new(
                &config.terminal.shell,
                &config.terminal.working_dir,
            )),
            proxy: None,
        }
    }
}

/// Why the server could not start or stopped serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Egress(#[from] EgressError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run the HTTP/WS server (and the CONNECT gateway when configured) until
/// SIGINT/SIGTERM.
pub async fn run_server(config: Config, capabilities: Capabilities) -> Result<(), ServerError> {
    info!("shellgate v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);

    if config.auth.api_key == "change-me" {
        warn!("Using default API key — set SHELLGATE_API_KEY or update config");
    }

    let egress = EgressConfigurator::from_config(&config, capabilities.proxy)?;
    let egress_mode = egress.mode().as_str();

    let state = AppState {
        registry: SessionRegistry::new(config.server.max_sessions),
        shell_connector: capabilities.shell,
        target: UpstreamTarget::from_config(&config),
        egress_mode,
        config: Arc::new(config),
        start_time: Instant::now(),
    };

    // Build router
    let public_routes = Router::new().route("/api/health", get(routes::health::health));

    let authed_routes = Router::new()
        .route("/api/sessions", get(routes::sessions::list_sessions))
        .route(
            "/api/sessions/{id}",
            delete(routes::sessions::close_session),
        )
        .layer(middleware::from_fn(auth::require_api_key));

    let ws_route = Router::new().route("/api/terminal", get(ws::terminal_upgrade));

    let app = Router::new()
        .merge(public_routes)
        .merge(authed_routes)
        .merge(ws_route)
        .layer(Extension(ApiKey(state.config.auth.api_key.clone())))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    // CONNECT gateway: spawn its accept loop if configured
    let gateway_task = if let Some(ref gw) = state.config.gateway {
        let listener = TcpListener::bind(&gw.listen)
            .await
            .map_err(|e| ServerError::Bind {
                addr: gw.listen.clone(),
                source: e,
            })?;
        info!(listen = %gw.listen, egress = egress_mode, "Tunnel gateway enabled");
        let gateway = TunnelGateway::new(egress.connector(), gw.prefer_ipv6, gw.max_header_bytes);
        Some(tokio::spawn(gateway.serve(listener)))
    } else {
        None
    };

    let listener = TcpListener::bind(&state.config.server.listen)
        .await
        .map_err(|e| ServerError::Bind {
            addr: state.config.server.listen.clone(),
            source: e,
        })?;

    info!("Server ready");

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)?;

    // Cleanup
    info!("Shutting down...");
    if let Some(task) = gateway_task {
        task.abort();
    }
    state.registry.close_all().await;
    info!("Goodbye");
    Ok(())
}
