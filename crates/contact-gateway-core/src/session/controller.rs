//! Session lifecycle driven by collaborator events.
//!
//! The controller is the only writer of the shared [`Session`]. Each
//! lifecycle event maps to one transition method; failures discard the
//! credential store and restart the connection right away, with no backoff.
//!
//! [`Session`]: super::Session

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::connection::{ConnectionEvent, ContactConnection};

use super::challenge::render_challenge;
use super::credentials::CredentialStore;
use super::store::SharedSession;

/// Owner of the session state machine
pub struct SessionController {
    session: SharedSession,
    store: CredentialStore,
    connection: Arc<dyn ContactConnection>,
    /// Where the operator finds the status page
    status_url: String,
}

impl SessionController {
    pub fn new(
        session: SharedSession,
        store: CredentialStore,
        connection: Arc<dyn ContactConnection>,
        status_url: String,
    ) -> Self {
        Self {
            session,
            store,
            connection,
            status_url,
        }
    }

    /// Shared session handle for readers
    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    /// Subscribe to connection events and apply them on a background task
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.connection.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        self.handle(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Session controller lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Connection event channel closed");
                        break;
                    }
                }
            }
        })
    }

    /// Apply one lifecycle event.
    ///
    /// Returns the re-initialization task when the event triggered one.
    pub fn handle(&self, event: ConnectionEvent) -> Option<JoinHandle<()>> {
        match event {
            ConnectionEvent::ChallengeIssued { token } => {
                self.on_challenge_issued(&token);
                None
            }
            ConnectionEvent::Authenticated => {
                self.on_authenticated();
                None
            }
            ConnectionEvent::AuthenticationFailed { reason } => {
                Some(self.on_authentication_failed(&reason))
            }
            ConnectionEvent::Disconnected { reason } => Some(self.on_disconnected(&reason)),
        }
    }

    /// A fresh challenge was issued by the connection
    pub fn on_challenge_issued(&self, token: &str) {
        tracing::info!("Challenge received, waiting for scan");
        match render_challenge(token) {
            Ok(challenge) => {
                self.session.write().set_challenge(challenge);
                tracing::info!("Open {} in a browser to scan the QR code", self.status_url);
            }
            Err(e) => {
                // Without a renderable challenge the session stays out of
                // AwaitingChallenge until the next one arrives.
                self.session.write().revoke_ready();
                tracing::error!("Failed to render challenge: {:#}", e);
            }
        }
    }

    /// The connection is authenticated and usable
    pub fn on_authenticated(&self) {
        let waited = {
            let mut session = self.session.write();
            let since = session.updated_at();
            session.set_ready();
            session.updated_at() - since
        };
        tracing::info!(
            "Client ready, lookups enabled ({}s after the previous state change)",
            waited.num_seconds()
        );
    }

    /// A restored credential was rejected.
    ///
    /// Deletes the whole credential store so the next start issues a fresh
    /// challenge, then restarts the connection once. Both steps run on the
    /// returned task; the removal itself runs on the blocking pool.
    pub fn on_authentication_failed(&self, reason: &str) -> JoinHandle<()> {
        let failures = self.session.write().set_failed(reason);
        tracing::error!(
            "Authentication failed ({} consecutive): {}",
            failures,
            reason
        );

        let store = self.store.clone();
        let connection = self.connection.clone();
        tokio::spawn(async move {
            let root = store.root().display().to_string();
            match tokio::task::spawn_blocking(move || store.purge()).await {
                Ok(Ok(true)) => tracing::info!("Removed stale session store {}", root),
                Ok(Ok(false)) => {}
                Ok(Err(e)) => tracing::error!("{:#}", e),
                Err(e) => tracing::error!("Session store removal panicked: {}", e),
            }

            tracing::info!("Re-initializing client for a new challenge");
            reinitialize(connection).await;
        })
    }

    /// An established connection dropped
    pub fn on_disconnected(&self, reason: &str) -> JoinHandle<()> {
        let failures = self.session.write().set_failed(reason);
        tracing::warn!(
            "Client disconnected ({} consecutive): {}",
            failures,
            reason
        );
        tracing::info!("Reconnecting");
        self.request_reinitialize()
    }

    /// Start the connection for the first time
    pub fn initialize_connection(&self) -> JoinHandle<()> {
        tracing::info!("Initializing client");
        self.request_reinitialize()
    }

    /// Fire-and-forget (re)initialization of the connection
    fn request_reinitialize(&self) -> JoinHandle<()> {
        tokio::spawn(reinitialize(self.connection.clone()))
    }
}

async fn reinitialize(connection: Arc<dyn ContactConnection>) {
    if let Err(e) = connection.initialize().await {
        tracing::error!("Client initialization failed: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockConnection;
    use crate::session::{Session, SessionStatus};
    use std::time::Duration;

    struct Harness {
        controller: Arc<SessionController>,
        connection: Arc<MockConnection>,
        store: CredentialStore,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(".wwebjs_auth"), "test-session");
        let connection = Arc::new(MockConnection::new());
        let controller = Arc::new(SessionController::new(
            Session::shared(store.root().to_path_buf()),
            store.clone(),
            connection.clone(),
            "http://localhost:3000".to_string(),
        ));
        Harness {
            controller,
            connection,
            store,
            _dir: dir,
        }
    }

    fn status(h: &Harness) -> SessionStatus {
        h.controller.session().read().status().clone()
    }

    /// Challenge present exactly while awaiting a scan
    fn assert_invariant(h: &Harness) {
        let session = h.controller.session();
        let session = session.read();
        let awaiting = matches!(session.status(), SessionStatus::AwaitingChallenge { .. });
        assert_eq!(session.pending_challenge().is_some(), awaiting);
    }

    #[tokio::test]
    async fn test_challenge_then_authenticated() {
        let h = harness();
        h.controller.on_challenge_issued("2@XYZ");
        assert_eq!(status(&h).name(), "awaiting_challenge");
        assert!(h
            .controller
            .session()
            .read()
            .pending_challenge()
            .unwrap()
            .data_url()
            .starts_with("data:image/png;base64,"));

        h.controller.on_authenticated();
        assert_eq!(status(&h), SessionStatus::Ready);
        assert!(h.controller.session().read().pending_challenge().is_none());
    }

    #[tokio::test]
    async fn test_render_failure_leaves_no_challenge() {
        let h = harness();
        h.controller.on_challenge_issued(&"x".repeat(5000));
        assert_eq!(status(&h), SessionStatus::Initializing);
        assert_invariant(&h);
    }

    #[tokio::test]
    async fn test_render_failure_revokes_readiness() {
        let h = harness();
        h.controller.on_authenticated();
        h.controller.on_challenge_issued(&"x".repeat(5000));
        assert_eq!(status(&h), SessionStatus::Initializing);
    }

    #[tokio::test]
    async fn test_auth_failure_purges_store_and_reinitializes_once() {
        let h = harness();
        std::fs::create_dir_all(h.store.session_dir()).unwrap();
        std::fs::write(h.store.session_dir().join("state"), b"corrupt").unwrap();
        h.controller.on_challenge_issued("2@XYZ");

        let task = h.controller.on_authentication_failed("restore rejected");
        assert_eq!(status(&h), SessionStatus::Failed);
        assert_invariant(&h);

        task.await.unwrap();
        assert!(!h.store.root().exists());
        assert_eq!(h.connection.initialize_calls(), 1);
        assert_eq!(
            h.controller.session().read().last_failure(),
            Some("restore rejected")
        );
    }

    #[tokio::test]
    async fn test_auth_failure_without_store_still_reinitializes() {
        let h = harness();
        h.controller
            .on_authentication_failed("restore rejected")
            .await
            .unwrap();
        assert_eq!(h.connection.initialize_calls(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_revokes_readiness_and_reconnects() {
        let h = harness();
        h.controller.on_authenticated();

        let task = h.controller.on_disconnected("NAVIGATION");
        assert_eq!(status(&h), SessionStatus::Failed);
        task.await.unwrap();
        assert_eq!(h.connection.initialize_calls(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_store() {
        let h = harness();
        std::fs::create_dir_all(h.store.session_dir()).unwrap();
        h.controller.on_disconnected("LOGOUT").await.unwrap();
        assert!(h.store.exists());
    }

    #[tokio::test]
    async fn test_invariant_over_event_sequences() {
        let h = harness();
        let events = [
            ConnectionEvent::ChallengeIssued {
                token: "2@a".to_string(),
            },
            ConnectionEvent::ChallengeIssued {
                token: "x".repeat(5000),
            },
            ConnectionEvent::Authenticated,
            ConnectionEvent::Disconnected {
                reason: "drop".to_string(),
            },
            ConnectionEvent::ChallengeIssued {
                token: "2@b".to_string(),
            },
            ConnectionEvent::AuthenticationFailed {
                reason: "bad".to_string(),
            },
            ConnectionEvent::Authenticated,
            ConnectionEvent::ChallengeIssued {
                token: "x".repeat(5000),
            },
        ];

        for event in events {
            if let Some(task) = h.controller.handle(event) {
                task.await.unwrap();
            }
            assert_invariant(&h);
        }
        assert_eq!(h.connection.initialize_calls(), 2);
    }

    #[tokio::test]
    async fn test_start_applies_emitted_events() {
        let h = harness();
        let _loop = h.controller.clone().start();

        h.connection.emit(ConnectionEvent::Authenticated);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !h.controller.session().read().is_ready() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session never became ready");
    }

    #[tokio::test]
    async fn test_start_survives_lagged_receiver() {
        let h = harness();
        let _loop = h.controller.clone().start();

        // Overflow the channel before the loop gets a chance to drain it
        for i in 0..100 {
            h.connection.emit(ConnectionEvent::Disconnected {
                reason: format!("drop {}", i),
            });
        }
        h.connection.emit(ConnectionEvent::Authenticated);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !h.controller.session().read().is_ready() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("event loop stopped after lagging");
        assert_eq!(h.controller.session().read().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_initialize_connection_calls_initialize() {
        let h = harness();
        h.controller.initialize_connection().await.unwrap();
        assert_eq!(h.connection.initialize_calls(), 1);
    }
}
