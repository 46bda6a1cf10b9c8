use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::storage::Format;

pub type DatasetId = u64;

/// One uploaded table, with a file location per format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub id: DatasetId,
    pub locations: HashMap<Format, PathBuf>,
}

impl Dataset {
    pub fn new(id: DatasetId, locations: HashMap<Format, PathBuf>) -> Self {
        Self { id, locations }
    }

    pub fn location(&self, format: Format) -> Option<&PathBuf> {
        self.locations.get(&format)
    }
}

#[derive(Default)]
struct Registry {
    last_id: DatasetId,
    datasets: BTreeMap<DatasetId, Arc<Dataset>>,
}

/// Registry of uploaded datasets shared by ingestion and aggregation.
///
/// All operations take the same lock. Registering a dataset wakes every
/// caller blocked in [`DatasetStore::wait_for_datasets`].
#[derive(Default)]
pub struct DatasetStore {
    registry: Mutex<Registry>,
    available: Condvar,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Critical sections never panic, a poisoned registry is still consistent
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves the next id. Ids are never handed out twice, even if the
    /// dataset they were reserved for is never registered.
    pub fn allocate_id(&self) -> DatasetId {
        let mut registry = self.lock();
        registry.last_id += 1;
        registry.last_id
    }

    /// Makes a fully written dataset visible to readers.
    pub fn register(&self, dataset: Dataset) {
        let mut registry = self.lock();
        registry.datasets.insert(dataset.id, Arc::new(dataset));
        self.available.notify_all();
    }

    /// Registered datasets in id order. Later registrations do not show up
    /// in a snapshot already taken.
    pub fn snapshot(&self) -> Vec<Arc<Dataset>> {
        self.lock().datasets.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().datasets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().datasets.len()
    }

    /// Blocks until at least one dataset is registered, then returns a snapshot.
    pub fn wait_for_datasets(&self) -> Vec<Arc<Dataset>> {
        let mut registry = self.lock();
        while registry.datasets.is_empty() {
            registry = self.available.wait(registry).unwrap_or_else(PoisonError::into_inner);
        }
        registry.datasets.values().cloned().collect()
    }

    /// Like [`DatasetStore::wait_for_datasets`], giving up after `timeout`.
    pub fn wait_for_datasets_timeout(&self, timeout: Duration) -> Option<Vec<Arc<Dataset>>> {
        let registry = self.lock();
        let (registry, _) = self
            .available
            .wait_timeout_while(registry, timeout, |r| r.datasets.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        if registry.datasets.is_empty() {
            None
        } else {
            Some(registry.datasets.values().cloned().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::thread;

    fn dataset(id: DatasetId) -> Dataset {
        let locations = Format::ALL
            .iter()
            .map(|f| (*f, PathBuf::from(format!("/tmp/file_{}.{}", id, f.extension()))))
            .collect();
        Dataset::new(id, locations)
    }

    #[test]
    fn allocates_sequential_ids() {
        let store = DatasetStore::new();
        assert_eq!(store.allocate_id(), 1);
        assert_eq!(store.allocate_id(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn unregistered_id_is_not_reused() {
        let store = DatasetStore::new();
        let failed = store.allocate_id();
        let id = store.allocate_id();
        store.register(dataset(id));
        assert_eq!(store.allocate_id(), 3);
        assert_eq!(store.snapshot().iter().map(|d| d.id).collect::<Vec<_>>(), vec![id]);
        assert_ne!(failed, id);
    }

    #[test]
    fn snapshot_does_not_change_after_register() {
        let store = DatasetStore::new();
        store.register(dataset(store.allocate_id()));
        let snapshot = store.snapshot();
        store.register(dataset(store.allocate_id()));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn snapshot_is_in_id_order() {
        let store = DatasetStore::new();
        let ids: Vec<_> = (0..5).map(|_| store.allocate_id()).collect();
        for id in ids.iter().rev() {
            store.register(dataset(*id));
        }
        assert_eq!(store.snapshot().iter().map(|d| d.id).collect::<Vec<_>>(), ids);
    }

    #[test]
    fn register_wakes_all_waiters() {
        let store = Arc::new(DatasetStore::new());
        let (tx, rx) = channel();
        let waiters = (0..4)
            .map(|_| {
                let store = store.clone();
                let tx = tx.clone();
                thread::spawn(move || tx.send(store.wait_for_datasets().len()).unwrap())
            })
            .collect::<Vec<_>>();

        thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());

        store.register(dataset(store.allocate_id()));
        for w in waiters {
            w.join().unwrap();
        }
        assert_eq!(rx.iter().take(4).collect::<Vec<_>>(), vec![1; 4]);
    }

    #[test]
    fn wait_returns_immediately_when_not_empty() {
        let store = DatasetStore::new();
        store.register(dataset(store.allocate_id()));
        assert_eq!(store.wait_for_datasets().len(), 1);
    }

    #[test]
    fn wait_timeout_on_empty_store() {
        let store = DatasetStore::new();
        assert!(store.wait_for_datasets_timeout(Duration::from_millis(20)).is_none());
        store.register(dataset(store.allocate_id()));
        assert_eq!(store.wait_for_datasets_timeout(Duration::from_millis(20)).map(|s| s.len()), Some(1));
    }
}
