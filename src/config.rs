//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `SHELLGATE_API_KEY`, `SHELLGATE_LISTEN`,
//!    `SHELLGATE_SSH_HOST`, `SHELLGATE_SSH_PASSWORD`
//! 2. **Config file** — path via `--config <path>`, or `shellgate.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! max_sessions = 20
//!
//! [auth]
//! api_key = "your-secret-key"
//!
//! [terminal]
//! shell = "/bin/sh"
//! working_dir = "/"
//! term = "xterm"
//!
//! [ssh]
//! host = "localhost"
//! port = 22
//! username = "root"
//! password = "secret"        # omit to let the shell capability decide
//!
//! # Optional — omit entirely to disable the CONNECT tunnel gateway
//! [gateway]
//! listen = "127.0.0.1:3128"
//! prefer_ipv6 = false
//! max_header_bytes = 8192
//!
//! # Optional — omit to egress directly; requires a proxy capability
//! [proxy]
//! address = "proxy.example.com:1080"
//! username = "user"
//! password = "secret"
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Optional CONNECT tunnel gateway; omit the section to disable it.
    pub gateway: Option<GatewayConfig>,
    /// Optional upstream proxy for gateway egress; omit to connect directly.
    pub proxy: Option<ProxyConfig>,
}

/// HTTP server and resource-limit settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum concurrent terminal sessions (default 20).
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Pre-shared Bearer token. Override with `SHELLGATE_API_KEY` env var.
    /// Defaults to `"change-me"` which triggers a startup warning.
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

/// Terminal session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalConfig {
    /// Shell binary used by the local shell capability (default `/bin/sh`).
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Working directory for local shells (default `/`).
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Terminal type requested when opening shells (default `xterm`).
    #[serde(default = "default_term")]
    pub term: String,
}

/// Where the shell capability connects. The bundled local capability ignores
/// host and credentials; a remote-shell capability uses all of them.
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    /// Host to connect terminal sessions to (default `localhost`).
    /// Override with `SHELLGATE_SSH_HOST`.
    #[serde(default = "default_ssh_host")]
    pub host: String,
    /// Port (default 22).
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Username (default `root`).
    #[serde(default = "default_ssh_username")]
    pub username: String,
    /// Password; omit to let the capability use its own auth.
    /// Override with `SHELLGATE_SSH_PASSWORD`.
    pub password: Option<String>,
}

/// CONNECT tunnel gateway settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Socket address the gateway listens on (default `127.0.0.1:3128`).
    #[serde(default = "default_gateway_listen")]
    pub listen: String,
    /// Prefer IPv6 addresses when resolving CONNECT targets (default false).
    #[serde(default)]
    pub prefer_ipv6: bool,
    /// Maximum accepted request-head size in bytes (default 8192).
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
}

/// Upstream proxy the gateway egresses through. Interpreting these fields is
/// the proxy capability's job; presence of the section merely selects
/// proxied egress over direct.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Proxy endpoint as `host:port`.
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_max_sessions() -> usize {
    20
}
fn default_api_key() -> String {
    "change-me".to_string()
}
fn default_shell() -> String {
    "/bin/sh".to_string()
}
fn default_working_dir() -> String {
    "/".to_string()
}
fn default_term() -> String {
    "xterm".to_string()
}
fn default_ssh_host() -> String {
    "localhost".to_string()
}
fn default_ssh_port() -> u16 {
    22
}
fn default_ssh_username() -> String {
    "root".to_string()
}
fn default_gateway_listen() -> String {
    "127.0.0.1:3128".to_string()
}
fn default_max_header_bytes() -> usize {
    8192
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            working_dir: default_working_dir(),
            term: default_term(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: default_ssh_host(),
            port: default_ssh_port(),
            username: default_ssh_username(),
            password: None,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_gateway_listen(),
            prefer_ipv6: false,
            max_header_bytes: default_max_header_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise looks
    /// for `shellgate.toml` in the current directory, falling back to compiled
    /// defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("shellgate.toml").exists() {
            let content =
                std::fs::read_to_string("shellgate.toml").expect("Failed to read shellgate.toml");
            toml::from_str(&content).expect("Failed to parse shellgate.toml")
        } else {
            Config {
                server: ServerConfig::default(),
                auth: AuthConfig::default(),
                terminal: TerminalConfig::default(),
                ssh: SshConfig::default(),
                logging: LoggingConfig::default(),
                gateway: None,
                proxy: None,
            }
        };

        // Env var overrides
        if let Ok(key) = std::env::var("SHELLGATE_API_KEY") {
            config.auth.api_key = key;
        }
        if let Ok(listen) = std::env::var("SHELLGATE_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(host) = std::env::var("SHELLGATE_SSH_HOST") {
            config.ssh.host = host;
        }
        if let Ok(password) = std::env::var("SHELLGATE_SSH_PASSWORD") {
            config.ssh.password = Some(password);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.server.max_sessions, 20);
        assert_eq!(config.terminal.term, "xterm");
        assert_eq!(config.ssh.host, "localhost");
        assert_eq!(config.ssh.port, 22);
        assert!(config.gateway.is_none());
        assert!(config.proxy.is_none());
    }

    #[test]
    fn gateway_section_enables_gateway_with_defaults() {
        let config: Config = toml::from_str("[gateway]\n").unwrap();
        let gw = config.gateway.unwrap();
        assert_eq!(gw.listen, "127.0.0.1:3128");
        assert!(!gw.prefer_ipv6);
        assert_eq!(gw.max_header_bytes, 8192);
    }

    #[test]
    fn sections_override_defaults() {
        let toml = r#"
            [server]
            listen = "127.0.0.1:9000"
            max_sessions = 3

            [ssh]
            host = "bastion.internal"
            password = "hunter2"

            [proxy]
            address = "10.0.0.1:1080"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.server.max_sessions, 3);
        assert_eq!(config.ssh.host, "bastion.internal");
        assert_eq!(config.ssh.password.as_deref(), Some("hunter2"));
        assert_eq!(config.proxy.unwrap().address, "10.0.0.1:1080");
    }
}
