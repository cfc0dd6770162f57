//! Collaborator connection backed by a child process.
//!
//! The bridge is an external program (by default a Node script driving the
//! provider's web client) that speaks the ndjson protocol in [`protocol`]
//! over its stdin/stdout. Responses are correlated to requests by id through
//! oneshot channels; events are re-broadcast as [`ConnectionEvent`]s.

pub mod protocol;

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::config::BridgeSettings;
use crate::session::CredentialStore;

use self::protocol::{decode, encode, BridgeMessage, InitializeParams, Request, Response};
use super::{ConnectionEvent, ContactConnection, Profile, SearchError};

/// Capacity of the lifecycle event channel
const EVENT_CAPACITY: usize = 64;

/// Pending requests keyed by id
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// Bridge stdin, shared so writes happen outside the process lock
type SharedStdin = Arc<tokio::sync::Mutex<ChildStdin>>;

/// A running bridge process
struct BridgeProcess {
    child: Child,
    stdin: SharedStdin,
    reader: JoinHandle<()>,
}

impl BridgeProcess {
    /// Stop the process and its reader task.
    ///
    /// Killing the child closes the pipe, which fails any write still
    /// blocked on its stdin.
    async fn shutdown(mut self) {
        self.reader.abort();
        if let Err(e) = self.child.kill().await {
            tracing::debug!("Bridge process already gone: {}", e);
        }
    }
}

/// Write one request line to the bridge
async fn send(stdin: &SharedStdin, request: &Request) -> Result<()> {
    let bytes = encode(request)?;
    let mut stdin = stdin.lock().await;
    stdin
        .write_all(&bytes)
        .await
        .context("Failed to write to bridge stdin")?;
    stdin
        .flush()
        .await
        .context("Failed to flush bridge stdin")?;
    Ok(())
}

/// [`ContactConnection`] that drives the collaborator through a child process
pub struct BridgeConnection {
    settings: BridgeSettings,
    params: InitializeParams,
    events: broadcast::Sender<ConnectionEvent>,
    process: tokio::sync::Mutex<Option<BridgeProcess>>,
    pending: PendingMap,
    last_id: AtomicU64,
    /// Bumped on every (re)initialize; readers of older processes stay quiet
    generation: Arc<AtomicU64>,
}

impl BridgeConnection {
    /// Create a connection; no process is spawned until `initialize`
    pub fn new(settings: &BridgeSettings, store: &CredentialStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            settings: settings.clone(),
            params: InitializeParams {
                client_id: store.client_id().to_string(),
                data_path: store.root().display().to_string(),
                headless: settings.headless,
                browser_args: settings.browser_args.clone(),
            },
            events,
            process: tokio::sync::Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            last_id: AtomicU64::new(0),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Register a pending request and return its response receiver
    fn register(&self, id: u64) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        rx
    }

    /// Spawn the bridge program and its stdout reader
    fn spawn_process(&self, generation: u64) -> Result<BridgeProcess> {
        let mut child = Command::new(&self.settings.program)
            .args(&self.settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn bridge: {}", self.settings.program))?;

        let stdin = child.stdin.take().context("Bridge stdin was not captured")?;
        let stdout = child
            .stdout
            .take()
            .context("Bridge stdout was not captured")?;

        let reader = tokio::spawn(read_loop(
            stdout,
            self.pending.clone(),
            self.events.clone(),
            self.generation.clone(),
            generation,
        ));

        tracing::debug!(
            "Bridge process started: program={}, pid={:?}",
            self.settings.program,
            child.id()
        );

        Ok(BridgeProcess {
            child,
            stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
            reader,
        })
    }
}

/// Read bridge output until EOF, dispatching responses and events
async fn read_loop(
    stdout: ChildStdout,
    pending: PendingMap,
    events: broadcast::Sender<ConnectionEvent>,
    current: Arc<AtomicU64>,
    generation: u64,
) {
    let mut lines = BufReader::new(stdout).lines();

    let reason = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match decode::<BridgeMessage>(line.as_bytes()) {
                    Ok(BridgeMessage::Response(response)) => {
                        let waiter = pending.lock().remove(&response.id);
                        match waiter {
                            // Receiver may have been dropped
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => {
                                tracing::debug!("Unmatched bridge response: id={}", response.id)
                            }
                        }
                    }
                    Ok(BridgeMessage::Event(event)) => {
                        let event = ConnectionEvent::from(event);
                        tracing::debug!("Bridge event: {}", event.kind());
                        let _ = events.send(event);
                    }
                    Err(e) => tracing::debug!("Skipping unparseable bridge line: {}", e),
                }
            }
            Ok(None) => break "bridge process exited".to_string(),
            Err(e) => break format!("bridge read error: {}", e),
        }
    };

    if current.load(Ordering::SeqCst) != generation {
        return;
    }

    // Dropping the senders fails every request still waiting on this process
    pending.lock().clear();
    tracing::debug!("Bridge reader finished: {}", reason);
    let _ = events.send(ConnectionEvent::Disconnected { reason });
}

/// Turn a bridge response into a profile or a search error
fn into_profile(response: Response) -> Result<Profile, SearchError> {
    if let Some(error) = response.error {
        return Err(SearchError {
            message: error.message,
            partial: error.partial,
        });
    }

    match response.result {
        None | Some(Value::Null) => Err(SearchError::new("bridge returned no profile")),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| SearchError::new(format!("invalid profile from bridge: {}", e))),
    }
}

#[async_trait]
impl ContactConnection for BridgeConnection {
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    async fn initialize(&self) -> Result<()> {
        let id = self.next_id();
        let rx = {
            let mut process = self.process.lock().await;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

            if let Some(old) = process.take() {
                tracing::debug!("Stopping previous bridge process");
                old.shutdown().await;
            }
            self.pending.lock().clear();

            let request = Request::initialize(id, &self.params)?;
            let fresh = process.insert(self.spawn_process(generation)?);
            let rx = self.register(id);
            if let Err(e) = send(&fresh.stdin, &request).await {
                self.pending.lock().remove(&id);
                return Err(e);
            }
            rx
        };

        let response = rx
            .await
            .context("Bridge connection closed during initialize")?;
        if let Some(error) = response.error {
            anyhow::bail!("Bridge initialize failed: {}", error.message);
        }
        Ok(())
    }

    async fn search_number(
        &self,
        country_code: &str,
        number: &str,
    ) -> Result<Profile, SearchError> {
        let id = self.next_id();
        let (stdin, rx) = {
            let process = self.process.lock().await;
            let Some(running) = process.as_ref() else {
                return Err(SearchError::new("bridge is not running"));
            };
            (running.stdin.clone(), self.register(id))
        };

        let request = Request::search_number(id, country_code, number);
        if let Err(e) = send(&stdin, &request).await {
            self.pending.lock().remove(&id);
            return Err(SearchError::new(format!("{:#}", e)));
        }

        let response = rx
            .await
            .map_err(|_| SearchError::new("bridge connection closed"))?;
        into_profile(response)
    }
}
