//! Interactive terminal sessions and their registry.
//!
//! The registry is a non-owning index: each session task owns its own shell
//! channel and message endpoints, and the registry holds only an id and a
//! teardown signal per session. Admission control lives here too — the
//! concurrent-session cap is enforced under the registry write lock so two
//! racing accepts cannot both slip under the limit.

pub mod session;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::upstream::SshCredentials;

pub use session::SessionState;

/// Where terminal sessions connect and what terminal type they request.
/// Built once from config; the shell capability decides what the fields
/// mean (the local provider ignores host and credentials).
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    pub host: String,
    pub port: u16,
    pub credentials: SshCredentials,
    pub term: String,
}

impl UpstreamTarget {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.ssh.host.clone(),
            port: config.ssh.port,
            credentials: SshCredentials {
                username: config.ssh.username.clone(),
                password: config.ssh.password.clone(),
            },
            term: config.terminal.term.clone(),
        }
    }
}

/// One row in the live-session listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub age_secs: u64,
}

/// Registry entry: enough to find and tear down a session, nothing more.
struct SessionHandle {
    close_tx: watch::Sender<bool>,
    created_at: Instant,
}

/// Tracks live terminal sessions and enforces the session cap.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        })
    }

    /// Admit a new session. Returns its id and the teardown signal the
    /// session task must watch, or `None` when the cap is reached.
    pub async fn accept(&self) -> Option<(String, watch::Receiver<bool>)> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            warn!(
                limit = self.max_sessions,
                "Session limit reached, rejecting new terminal session"
            );
            return None;
        }
        let id = Uuid::new_v4().to_string();
        let (close_tx, close_rx) = watch::channel(false);
        sessions.insert(
            id.clone(),
            SessionHandle {
                close_tx,
                created_at: Instant::now(),
            },
        );
        info!(session_id = %id, active = sessions.len(), "Terminal session admitted");
        Some((id, close_rx))
    }

    /// Signal a session to tear down. Safe to call for ids that already
    /// finished; a second call for the same id is a no-op.
    pub async fn close(&self, id: &str) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(id) {
            Some(handle) => {
                let _ = handle.close_tx.send(true);
                true
            }
            None => false,
        }
    }

    /// Drop a finished session from the index. Called by the owner after its
    /// session task returns.
    pub async fn remove(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.remove(id) {
            debug!(
                session_id = %id,
                lifetime_secs = handle.created_at.elapsed().as_secs(),
                active = sessions.len(),
                "Terminal session removed"
            );
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Snapshot of live sessions for the REST surface.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut out: Vec<SessionInfo> = sessions
            .iter()
            .map(|(id, handle)| SessionInfo {
                id: id.clone(),
                age_secs: handle.created_at.elapsed().as_secs(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Signal every live session to tear down (shutdown path).
    pub async fn close_all(&self) {
        let sessions = self.sessions.read().await;
        if sessions.is_empty() {
            return;
        }
        info!(count = sessions.len(), "Closing all terminal sessions");
        for handle in sessions.values() {
            let _ = handle.close_tx.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accept_enforces_session_cap() {
        let registry = SessionRegistry::new(2);

        let (id1, _rx1) = registry.accept().await.unwrap();
        let (_id2, _rx2) = registry.accept().await.unwrap();
        assert!(registry.accept().await.is_none());
        assert_eq!(registry.session_count().await, 2);

        // Removing one frees a slot.
        registry.remove(&id1).await;
        assert!(registry.accept().await.is_some());
    }

    #[tokio::test]
    async fn close_signals_the_session_and_is_idempotent() {
        let registry = SessionRegistry::new(4);
        let (id, mut rx) = registry.accept().await.unwrap();

        assert!(registry.close(&id).await);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());

        // Second close on a live id is still fine; unknown ids report false.
        assert!(registry.close(&id).await);
        assert!(!registry.close("no-such-session").await);
    }

    #[tokio::test]
    async fn close_all_signals_every_session() {
        let registry = SessionRegistry::new(4);
        let (_a, mut rx_a) = registry.accept().await.unwrap();
        let (_b, mut rx_b) = registry.accept().await.unwrap();

        registry.close_all().await;
        rx_a.changed().await.unwrap();
        rx_b.changed().await.unwrap();
    }

    #[tokio::test]
    async fn remove_unknown_id_is_a_noop() {
        let registry = SessionRegistry::new(4);
        registry.remove("ghost").await;
        assert_eq!(registry.session_count().await, 0);
    }
}
