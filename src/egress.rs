//! Egress selection for outbound tunnel connections.
//!
//! Built once at startup from config, the configurator decides whether the
//! gateway (and any future upgrade-style outbound connection) egresses
//! directly or through the registered proxy capability. Connection handlers
//! never consult config; they take the connector the configurator hands out.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::upstream::{BoxedDuplex, DirectConnector, ProxyConnector, UpstreamError};

/// How outbound connections leave this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EgressMode {
    /// Plain TCP straight to the destination.
    Direct,
    /// Through the upstream proxy at `address`.
    Proxied { address: String },
}

impl EgressMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EgressMode::Direct => "direct",
            EgressMode::Proxied { .. } => "proxied",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EgressError {
    /// `[proxy]` was configured but no capability can speak to it. Refusing
    /// to start beats silently egressing directly.
    #[error("proxy {address} is configured but no proxy capability is registered")]
    MissingProxyCapability { address: String },
}

/// Resolves config into a single egress connector at startup.
pub struct EgressConfigurator {
    mode: EgressMode,
    connector: Arc<dyn ProxyConnector>,
}

impl std::fmt::Debug for EgressConfigurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EgressConfigurator")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl EgressConfigurator {
    /// Select the egress path: `[proxy]` present pairs with the registered
    /// proxy capability; absent means direct TCP.
    pub fn from_config(
        config: &Config,
        proxy_capability: Option<Arc<dyn ProxyConnector>>,
    ) -> Result<Self, EgressError> {
        match (&config.proxy, proxy_capability) {
            (Some(proxy), Some(connector)) => {
                info!(address = %proxy.address, "Egress through upstream proxy");
                Ok(Self {
                    mode: EgressMode::Proxied {
                        address: proxy.address.clone(),
                    },
                    connector,
                })
            }
            (Some(proxy), None) => Err(EgressError::MissingProxyCapability {
                address: proxy.address.clone(),
            }),
            (None, _) => Ok(Self::direct()),
        }
    }

    /// Direct TCP egress, the "no proxy configured" mode.
    pub fn direct() -> Self {
        Self {
            mode: EgressMode::Direct,
            connector: Arc::new(DirectConnector),
        }
    }

    pub fn mode(&self) -> &EgressMode {
        &self.mode
    }

    /// The connector outbound handlers should use.
    pub fn connector(&self) -> Arc<dyn ProxyConnector> {
        self.connector.clone()
    }

    /// Open one outbound stream via the selected egress path.
    pub async fn connect(
        &self,
        dest_host: &str,
        dest_port: u16,
    ) -> Result<BoxedDuplex, UpstreamError> {
        self.connector.connect(dest_host, dest_port).await
    }
}
