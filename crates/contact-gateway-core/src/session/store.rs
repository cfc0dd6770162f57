use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::challenge::Challenge;

/// Shared session type alias
pub type SharedSession = Arc<RwLock<Session>>;

/// Authentication state of the collaborator connection.
///
/// The pending challenge lives inside `AwaitingChallenge`, so a challenge
/// exists exactly when the session is waiting for a scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// Startup, before any lifecycle event
    #[default]
    Initializing,
    /// A QR challenge was issued and not yet approved
    AwaitingChallenge { challenge: Challenge },
    /// Authenticated; lookups may proceed
    Ready,
    /// Authentication rejected or connection lost; re-initializing
    Failed,
}

impl SessionStatus {
    /// Name for logging and display
    pub fn name(&self) -> &'static str {
        match self {
            SessionStatus::Initializing => "initializing",
            SessionStatus::AwaitingChallenge { .. } => "awaiting_challenge",
            SessionStatus::Ready => "ready",
            SessionStatus::Failed => "failed",
        }
    }
}

/// Process-wide session state
#[derive(Debug)]
pub struct Session {
    status: SessionStatus,
    /// Where the collaborator persists credential material
    credential_store_path: PathBuf,
    /// Time of the last status change
    updated_at: DateTime<Utc>,
    /// Reason of the most recent failure
    last_failure: Option<String>,
    /// Failed transitions since the last successful authentication
    consecutive_failures: u32,
}

impl Session {
    /// Create a session in `Initializing`
    pub fn new(credential_store_path: PathBuf) -> Self {
        Self {
            status: SessionStatus::Initializing,
            credential_store_path,
            updated_at: Utc::now(),
            last_failure: None,
            consecutive_failures: 0,
        }
    }

    /// Create a shared session
    pub fn shared(credential_store_path: PathBuf) -> SharedSession {
        Arc::new(RwLock::new(Self::new(credential_store_path)))
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == SessionStatus::Ready
    }

    /// Challenge waiting to be scanned, if any
    pub fn pending_challenge(&self) -> Option<&Challenge> {
        match &self.status {
            SessionStatus::AwaitingChallenge { challenge } => Some(challenge),
            _ => None,
        }
    }

    pub fn credential_store_path(&self) -> &Path {
        &self.credential_store_path
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// A fresh challenge was rendered
    pub(crate) fn set_challenge(&mut self, challenge: Challenge) {
        self.transition(SessionStatus::AwaitingChallenge { challenge });
    }

    /// The connection authenticated
    pub(crate) fn set_ready(&mut self) {
        self.consecutive_failures = 0;
        self.last_failure = None;
        self.transition(SessionStatus::Ready);
    }

    /// The connection failed; returns the updated failure count
    pub(crate) fn set_failed(&mut self, reason: &str) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(reason.to_string());
        self.transition(SessionStatus::Failed);
        self.consecutive_failures
    }

    /// Drop readiness without recording a failure
    pub(crate) fn revoke_ready(&mut self) {
        if self.is_ready() {
            self.transition(SessionStatus::Initializing);
        }
    }

    fn transition(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
