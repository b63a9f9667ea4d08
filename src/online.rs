use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::storage::KeyValueStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How the initial namespace fetch went. A failed load still yields a
/// usable (empty) store; this only makes the difference observable.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    /// The remote namespace was fetched and mirrored.
    Loaded,
    /// The fetch failed; the store started empty.
    Failed { reason: String },
}

/// Persistence state of one key relative to the remote namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    /// The last write for this key reached the remote (or none was made).
    Clean,
    /// A write is queued but not yet acknowledged.
    Pending,
    /// The last write was dropped by the remote; the mirror kept it.
    Failed { reason: String },
}

enum WriteOp {
    Put { key: String, value: String },
    Delete { key: String },
    Clear,
    Flush(Sender<()>),
}

/// A remote key/value namespace that behaves like local storage
///
/// The whole namespace is fetched once, synchronously, at construction;
/// reads only ever touch the in-memory mirror. Mutations update the
/// mirror immediately and queue a remote write that a background worker
/// delivers best-effort. Transport failures are logged and recorded per
/// key, never surfaced as errors, and never revert the mirror - so the
/// mirror can drift from the remote under persistent failure, and two
/// concurrent clients resolve conflicting writes as last-write-wins.
/// Both gaps are part of the contract.
pub struct RemoteBackedStore {
    mirror: BTreeMap<String, String>,
    queue: Sender<WriteOp>,
    sync: Arc<Mutex<HashMap<String, SyncState>>>,
    namespace_error: Arc<Mutex<Option<String>>>,
    load_state: LoadState,
}

impl RemoteBackedStore {
    /// Connect to the namespace at `base_url` (for example
    /// `http://localhost:3000`). Construction never fails: any problem
    /// fetching the namespace leaves an empty mirror and a `Failed`
    /// load state.
    pub fn connect(base_url: &str) -> RemoteBackedStore {
        let base = base_url.trim().trim_end_matches('/').to_string();
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();

        let (mirror, load_state) = match fetch_namespace(&agent, &base) {
            Ok(mirror) => (mirror, LoadState::Loaded),
            Err(reason) => {
                log::warn!("client-storage initial load failed: {}", reason);
                (BTreeMap::new(), LoadState::Failed { reason })
            }
        };

        let sync = Arc::new(Mutex::new(HashMap::new()));
        let namespace_error = Arc::new(Mutex::new(None));
        let (tx, rx) = mpsc::channel();
        spawn_writer(agent, base, rx, Arc::clone(&sync), Arc::clone(&namespace_error));

        RemoteBackedStore {
            mirror,
            queue: tx,
            sync,
            namespace_error,
            load_state,
        }
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    /// Persistence state of `key`. Keys with no queued or failed write
    /// read as clean.
    pub fn sync_state(&self, key: &str) -> SyncState {
        self.sync
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or(SyncState::Clean)
    }

    /// The last namespace-wide failure (a dropped bulk delete), if any.
    pub fn namespace_error(&self) -> Option<String> {
        self.namespace_error.lock().unwrap().clone()
    }

    /// Block until every queued write has been attempted, or the timeout
    /// elapses. Returns whether the queue drained in time.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.queue.send(WriteOp::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    fn enqueue(&self, op: WriteOp) {
        // a dead worker only costs remote persistence, never local reads
        if self.queue.send(op).is_err() {
            log::warn!("client-storage writer is gone; keeping local mirror only");
        }
    }
}

impl KeyValueStore for RemoteBackedStore {
    fn get(&self, key: &str) -> Option<String> {
        self.mirror.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        if key.is_empty() {
            return;
        }
        self.mirror.insert(key.to_string(), value.to_string());
        self.sync
            .lock()
            .unwrap()
            .insert(key.to_string(), SyncState::Pending);
        self.enqueue(WriteOp::Put {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    fn remove(&mut self, key: &str) {
        if key.is_empty() || !self.mirror.contains_key(key) {
            return;
        }
        self.mirror.remove(key);
        self.sync
            .lock()
            .unwrap()
            .insert(key.to_string(), SyncState::Pending);
        self.enqueue(WriteOp::Delete {
            key: key.to_string(),
        });
    }

    fn clear(&mut self) {
        self.mirror.clear();
        self.sync.lock().unwrap().clear();
        self.enqueue(WriteOp::Clear);
    }

    fn len(&self) -> usize {
        self.mirror.len()
    }

    fn key(&self, index: usize) -> Option<String> {
        self.mirror.keys().nth(index).cloned()
    }
}

/// Fetch the whole namespace as a flat string map. Non-object payloads,
/// blank keys and non-string values are cleaned up the same way on every
/// client.
fn fetch_namespace(agent: &ureq::Agent, base: &str) -> Result<BTreeMap<String, String>, String> {
    let response = agent
        .get(&format!("{}/api/client-storage", base))
        .call()
        .map_err(|e| e.to_string())?;
    let body: Value = response.into_json().map_err(|e| e.to_string())?;
    Ok(parse_namespace(body.get("data").unwrap_or(&Value::Null)))
}

fn parse_namespace(data: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = data {
        for (key, value) in map {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            out.insert(key.to_string(), value);
        }
    }
    out
}

fn spawn_writer(
    agent: ureq::Agent,
    base: String,
    rx: Receiver<WriteOp>,
    sync: Arc<Mutex<HashMap<String, SyncState>>>,
    namespace_error: Arc<Mutex<Option<String>>>,
) {
    thread::spawn(move || {
        for op in rx {
            match op {
                WriteOp::Put { key, value } => {
                    let result = agent
                        .put(&format!("{}/api/client-storage/item", base))
                        .send_json(serde_json::json!({ "key": key, "value": value }))
                        .map(|_| ())
                        .map_err(|e| e.to_string());
                    record(&sync, &key, result);
                }
                WriteOp::Delete { key } => {
                    let result = agent
                        .delete(&format!(
                            "{}/api/client-storage/item/{}",
                            base,
                            urlencoding::encode(&key)
                        ))
                        .call()
                        .map(|_| ())
                        .map_err(|e| e.to_string());
                    record(&sync, &key, result);
                }
                WriteOp::Clear => {
                    match agent.delete(&format!("{}/api/client-storage", base)).call() {
                        Ok(_) => *namespace_error.lock().unwrap() = None,
                        Err(e) => {
                            let reason = e.to_string();
                            log::warn!("client-storage clear failed: {}", reason);
                            *namespace_error.lock().unwrap() = Some(reason);
                        }
                    }
                }
                WriteOp::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
    });
}

fn record(
    sync: &Arc<Mutex<HashMap<String, SyncState>>>,
    key: &str,
    result: Result<(), String>,
) {
    let mut states = sync.lock().unwrap();
    match result {
        Ok(()) => {
            states.remove(key);
        }
        Err(reason) => {
            log::warn!("client-storage sync failed for {}: {}", key, reason);
            // a key cleared from the namespace no longer tracks outcomes
            if let Some(state) = states.get_mut(key) {
                *state = SyncState::Failed { reason };
            }
        }
    }
}
