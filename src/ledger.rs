use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::storage::KeyValueStore;

/// Outcome of reading a ledger blob from storage
///
/// Distinguishes "nothing stored yet" from "stored but unreadable", which
/// callers that only want data can collapse with [`ReadState::into_loaded`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReadState<T> {
    /// No blob stored under the namespace.
    Missing,
    /// Blob parsed cleanly.
    Loaded(T),
    /// Blob present but not valid JSON for the payload shape.
    Corrupt,
}

impl<T> ReadState<T> {
    pub fn into_loaded(self) -> Option<T> {
        match self {
            ReadState::Loaded(value) => Some(value),
            _ => None,
        }
    }
}

/// Keyed collection of per-entity records layered over externally-owned data
///
/// One ledger per override family (project updates, program of works,
/// variation orders, compiled-document flags, ...). The whole family
/// persists as a single JSON object blob under `namespace`, with entity
/// keys normalized by the caller. Unreadable blobs degrade to an empty
/// family on every mutating path so a corrupt entry can always be
/// overwritten.
pub struct OverrideLedger<T> {
    namespace: &'static str,
    _payload: PhantomData<T>,
}

impl<T> OverrideLedger<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(namespace: &'static str) -> Self {
        OverrideLedger {
            namespace,
            _payload: PhantomData,
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Read the whole family, reporting whether the blob was missing,
    /// loaded, or corrupt.
    pub fn read(&self, store: &dyn KeyValueStore) -> ReadState<BTreeMap<String, T>> {
        let raw = match store.get(self.namespace) {
            Some(raw) => raw,
            None => return ReadState::Missing,
        };
        match serde_json::from_str(&raw) {
            Ok(map) => ReadState::Loaded(map),
            Err(_) => ReadState::Corrupt,
        }
    }

    /// Read the whole family, degrading missing or corrupt blobs to empty.
    pub fn entries(&self, store: &dyn KeyValueStore) -> BTreeMap<String, T> {
        self.read(store).into_loaded().unwrap_or_default()
    }

    pub fn get(&self, store: &dyn KeyValueStore, id: &str) -> Option<T> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        let mut entries = self.entries(store);
        entries.remove(id)
    }

    /// Replace the record for `id` with `payload`. Empty ids are rejected
    /// silently.
    pub fn set(&self, store: &mut dyn KeyValueStore, id: &str, payload: T) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        let mut entries = self.entries(store);
        entries.insert(id.to_string(), payload);
        self.persist(store, &entries);
    }

    /// Read-modify-write for field-level patch merges.
    pub fn update(&self, store: &mut dyn KeyValueStore, id: &str, f: impl FnOnce(Option<T>) -> T) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        let mut entries = self.entries(store);
        let next = f(entries.remove(id));
        entries.insert(id.to_string(), next);
        self.persist(store, &entries);
    }

    /// Delete the record for `id` if present; no-op otherwise.
    pub fn remove(&self, store: &mut dyn KeyValueStore, id: &str) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        let mut entries = self.entries(store);
        if entries.remove(id).is_some() {
            self.persist(store, &entries);
        }
    }

    fn persist(&self, store: &mut dyn KeyValueStore, entries: &BTreeMap<String, T>) {
        if let Ok(json) = serde_json::to_string(entries) {
            store.set(self.namespace, &json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
    struct Marker {
        by: String,
    }

    fn ledger() -> OverrideLedger<Marker> {
        OverrideLedger::new("testLedger")
    }

    #[test]
    fn set_get_remove_cycle() {
        let mut store = MemoryStore::new();
        let ledger = ledger();

        assert_eq!(ledger.get(&store, "A-1"), None);
        ledger.set(&mut store, "A-1", Marker { by: "x".into() });
        assert_eq!(ledger.get(&store, "A-1"), Some(Marker { by: "x".into() }));

        ledger.remove(&mut store, "A-1");
        assert_eq!(ledger.get(&store, "A-1"), None);
        // removing again is a no-op
        ledger.remove(&mut store, "A-1");
    }

    #[test]
    fn empty_ids_are_rejected() {
        let mut store = MemoryStore::new();
        let ledger = ledger();
        ledger.set(&mut store, "   ", Marker { by: "x".into() });
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn corrupt_blob_degrades_but_is_observable() {
        let mut store = MemoryStore::new();
        store.set("testLedger", "not json");
        let ledger = ledger();

        assert_eq!(ledger.read(&store), ReadState::Corrupt);
        assert!(ledger.entries(&store).is_empty());
        assert_eq!(ledger.get(&store, "A-1"), None);

        // a write replaces the corrupt blob with a clean family
        ledger.set(&mut store, "A-1", Marker { by: "y".into() });
        assert!(matches!(ledger.read(&store), ReadState::Loaded(_)));
        assert_eq!(ledger.get(&store, "A-1"), Some(Marker { by: "y".into() }));
    }

    #[test]
    fn update_merges_over_existing() {
        let mut store = MemoryStore::new();
        let ledger = ledger();
        ledger.set(&mut store, "A-1", Marker { by: "old".into() });
        ledger.update(&mut store, "A-1", |existing| {
            let mut next = existing.unwrap_or_default();
            next.by = format!("{}+new", next.by);
            next
        });
        assert_eq!(
            ledger.get(&store, "A-1"),
            Some(Marker { by: "old+new".into() })
        );
    }

    #[test]
    fn families_do_not_collide() {
        let mut store = MemoryStore::new();
        let a: OverrideLedger<Marker> = OverrideLedger::new("familyA");
        let b: OverrideLedger<Marker> = OverrideLedger::new("familyB");
        a.set(&mut store, "K", Marker { by: "a".into() });
        b.set(&mut store, "K", Marker { by: "b".into() });
        assert_eq!(a.get(&store, "K"), Some(Marker { by: "a".into() }));
        assert_eq!(b.get(&store, "K"), Some(Marker { by: "b".into() }));
    }
}
