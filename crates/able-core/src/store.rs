//! Persistence of known peripheral identifiers
//!
//! Identifiers are stored as a flat list of UUID strings under one well-known
//! key. The list is rewritten every time membership of the known set changes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::attempt::lock;
use crate::errors::Result;

// ----------------------------------------------------------------------------
// Store Trait
// ----------------------------------------------------------------------------

/// Key-value store of string lists
pub trait KnownPeripheralStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Vec<String>>;

    fn save(&self, key: &str, identifiers: &[String]) -> Result<()>;
}

/// In-process store; clones share the same contents
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KnownPeripheralStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Vec<String>> {
        Ok(lock(&self.entries).get(key).cloned().unwrap_or_default())
    }

    fn save(&self, key: &str, identifiers: &[String]) -> Result<()> {
        lock(&self.entries).insert(key.to_string(), identifiers.to_vec());
        Ok(())
    }
}

/// JSON file store: one object mapping keys to identifier arrays
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<BTreeMap<String, Vec<String>>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }
}

impl KnownPeripheralStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.read_all()?.remove(key).unwrap_or_default())
    }

    fn save(&self, key: &str, identifiers: &[String]) -> Result<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), identifiers.to_vec());

        let staging = self.path.with_extension("tmp");
        fs::write(&staging, serde_json::to_vec_pretty(&entries)?)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Known Identifier Set
// ----------------------------------------------------------------------------

/// The persisted `known` set, written through on every membership change
pub struct KnownIdentifiers {
    store: Arc<dyn KnownPeripheralStore>,
    key: String,
    identifiers: BTreeSet<Uuid>,
}

impl KnownIdentifiers {
    /// Load the set stored under `key`
    ///
    /// Unreadable stores yield an empty set and unparseable entries are
    /// skipped; both are logged.
    pub fn load(store: Arc<dyn KnownPeripheralStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let raw = store.load(&key).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "failed to read known peripherals");
            Vec::new()
        });
        let identifiers = raw
            .iter()
            .filter_map(|entry| match Uuid::parse_str(entry) {
                Ok(uuid) => Some(uuid),
                Err(e) => {
                    warn!(entry = %entry, error = %e, "skipping malformed known peripheral");
                    None
                }
            })
            .collect::<BTreeSet<_>>();
        debug!(key = %key, count = identifiers.len(), "loaded known peripherals");
        Self {
            store,
            key,
            identifiers,
        }
    }

    /// Insert and persist; returns whether membership changed
    pub fn insert(&mut self, identifier: Uuid) -> bool {
        let inserted = self.identifiers.insert(identifier);
        if inserted {
            self.persist();
        }
        inserted
    }

    /// Remove and persist; returns whether membership changed
    pub fn remove(&mut self, identifier: &Uuid) -> bool {
        let removed = self.identifiers.remove(identifier);
        if removed {
            self.persist();
        }
        removed
    }

    #[cfg(test)]
    fn contains(&self, identifier: &Uuid) -> bool {
        self.identifiers.contains(identifier)
    }

    pub fn to_vec(&self) -> Vec<Uuid> {
        self.identifiers.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    fn persist(&self) {
        let entries: Vec<String> = self.identifiers.iter().map(Uuid::to_string).collect();
        if let Err(e) = self.store.save(&self.key, &entries) {
            warn!(key = %self.key, error = %e, "failed to persist known peripherals");
        }
    }
}

impl fmt::Debug for KnownIdentifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnownIdentifiers")
            .field("key", &self.key)
            .field("identifiers", &self.identifiers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AbleError;

    const KEY: &str = "it.able.centralmanager.knownPeripheralKey";

    struct FailingStore;

    impl KnownPeripheralStore for FailingStore {
        fn load(&self, _key: &str) -> Result<Vec<String>> {
            Err(AbleError::store("disk unavailable"))
        }

        fn save(&self, _key: &str, _identifiers: &[String]) -> Result<()> {
            Err(AbleError::store("disk unavailable"))
        }
    }

    #[test]
    fn test_known_identifiers_write_through() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        let mut known = KnownIdentifiers::load(Arc::new(store.clone()), KEY);
        assert!(known.is_empty());
        assert!(known.insert(id));
        assert!(!known.insert(id));
        assert_eq!(store.load(KEY).unwrap(), vec![id.to_string()]);

        let reloaded = KnownIdentifiers::load(Arc::new(store.clone()), KEY);
        assert!(reloaded.contains(&id));

        assert!(known.remove(&id));
        assert!(store.load(KEY).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store
            .save(KEY, &[id.to_string(), "not-a-uuid".to_string()])
            .unwrap();

        let known = KnownIdentifiers::load(Arc::new(store), KEY);
        assert_eq!(known.to_vec(), vec![id]);
    }

    #[test]
    fn test_failing_store_degrades_to_memory() {
        let mut known = KnownIdentifiers::load(Arc::new(FailingStore), KEY);
        let id = Uuid::new_v4();
        assert!(known.insert(id));
        assert!(known.contains(&id));
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("known.json"));
        assert!(store.load(KEY).unwrap().is_empty());

        let ids = vec![Uuid::new_v4().to_string(), Uuid::new_v4().to_string()];
        store.save(KEY, &ids).unwrap();
        store.save("other", &["x".to_string()]).unwrap();

        assert_eq!(store.load(KEY).unwrap(), ids);
        assert_eq!(store.load("other").unwrap(), vec!["x".to_string()]);
    }
}
