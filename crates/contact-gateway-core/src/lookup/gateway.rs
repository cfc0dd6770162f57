//! Request admission: what to show for the current session, and whether a
//! search may reach the collaborator.

use std::sync::Arc;

use crate::connection::ContactConnection;
use crate::session::{SessionStatus, SharedSession};

use super::types::{LookupError, LookupRequest, LookupResult, SearchOutcome, RECOVERED_NOTE};

/// Reload interval of the QR page
const CHALLENGE_REFRESH_SECS: u64 = 15;

/// Reload interval of the waiting page
const WAITING_REFRESH_SECS: u64 = 5;

/// Status page variant for the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusView {
    /// Authenticated
    Ready,
    /// A QR challenge is waiting to be scanned
    AwaitingChallenge { image: String },
    /// Initializing, or failed without a challenge yet
    Waiting {
        last_failure: Option<String>,
        consecutive_failures: u32,
    },
}

impl StatusView {
    /// Seconds until the page should reload itself
    pub fn refresh_secs(&self) -> Option<u64> {
        match self {
            StatusView::Ready => None,
            StatusView::AwaitingChallenge { .. } => Some(CHALLENGE_REFRESH_SECS),
            StatusView::Waiting { .. } => Some(WAITING_REFRESH_SECS),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, StatusView::Ready)
    }
}

/// Admission layer between HTTP handlers and the collaborator
pub struct RequestGateway {
    session: SharedSession,
    connection: Arc<dyn ContactConnection>,
    default_country: String,
}

impl RequestGateway {
    pub fn new(
        session: SharedSession,
        connection: Arc<dyn ContactConnection>,
        default_country: String,
    ) -> Self {
        Self {
            session,
            connection,
            default_country,
        }
    }

    /// Select the status page for the current session
    pub fn status_view(&self) -> StatusView {
        let session = self.session.read();
        match session.status() {
            SessionStatus::Ready => StatusView::Ready,
            SessionStatus::AwaitingChallenge { challenge } => StatusView::AwaitingChallenge {
                image: challenge.data_url().to_string(),
            },
            SessionStatus::Initializing | SessionStatus::Failed => StatusView::Waiting {
                last_failure: session.last_failure().map(str::to_string),
                consecutive_failures: session.consecutive_failures(),
            },
        }
    }

    /// Search for `raw_number`.
    ///
    /// Input is validated before readiness, so a missing number is always a
    /// `MissingNumber` error. The collaborator is only called when ready.
    pub async fn search(
        &self,
        raw_number: Option<&str>,
        country: Option<&str>,
    ) -> Result<SearchOutcome, LookupError> {
        let raw_number = raw_number
            .filter(|n| !n.is_empty())
            .ok_or(LookupError::MissingNumber)?;

        if !self.session.read().is_ready() {
            return Err(LookupError::NotReady);
        }

        let request = LookupRequest::new(raw_number, country, &self.default_country);
        if request.sanitized_number.is_empty() {
            return Err(LookupError::MissingNumber);
        }

        tracing::info!(
            "Searching number {} in {}",
            request.sanitized_number,
            request.country_code
        );

        match self
            .connection
            .search_number(&request.country_code, &request.sanitized_number)
            .await
        {
            Ok(profile) => Ok(SearchOutcome::Found(LookupResult::from(profile))),
            Err(err) => {
                tracing::error!("Lookup failed: {}", err.message);
                match err.partial {
                    Some(profile) => {
                        tracing::info!("Profile was fetched before the error, returning it");
                        Ok(SearchOutcome::Recovered {
                            result: LookupResult::from(profile),
                            note: RECOVERED_NOTE,
                        })
                    }
                    None => Err(LookupError::from_collaborator(&err.message)),
                }
            }
        }
    }
}
