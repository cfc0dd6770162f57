//! In-memory connection for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{ConnectionEvent, ContactConnection, Profile, SearchError};

/// Connection double that records calls and replays scripted results
pub struct MockConnection {
    events: broadcast::Sender<ConnectionEvent>,
    initialize_calls: AtomicUsize,
    searches: Mutex<Vec<(String, String)>>,
    results: Mutex<VecDeque<Result<Profile, SearchError>>>,
}

impl MockConnection {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            initialize_calls: AtomicUsize::new(0),
            searches: Mutex::new(Vec::new()),
            results: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue the result of the next `search_number` call
    pub fn push_result(&self, result: Result<Profile, SearchError>) {
        self.results.lock().push_back(result);
    }

    /// Emit a lifecycle event to subscribers
    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    /// Number of `initialize` calls so far
    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    /// `(country_code, number)` of every `search_number` call so far
    pub fn searches(&self) -> Vec<(String, String)> {
        self.searches.lock().clone()
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a profile with the three projected fields
pub fn profile(name: &str, phone_number: &str, provider: &str) -> Profile {
    Profile {
        name: Some(name.to_string()),
        phone_number: Some(phone_number.to_string()),
        provider: Some(provider.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl ContactConnection for MockConnection {
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn search_number(
        &self,
        country_code: &str,
        number: &str,
    ) -> Result<Profile, SearchError> {
        self.searches
            .lock()
            .push((country_code.to_string(), number.to_string()));
        self.results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SearchError::new("no scripted result")))
    }
}
