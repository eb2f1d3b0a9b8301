use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A persisted counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CounterValue {
    /// Trigger occurrences.
    Count(i64),
    /// Impression timestamps in epoch seconds, oldest first.
    Timestamps(Vec<i64>),
    /// Display counts of a campaign.
    DisplayCounts(DisplayCounts),
}

/// Per-campaign display counts kept by [`crate::InAppFCManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayCounts {
    /// Displays on `day`.
    pub today: i64,
    /// Displays since the counters were created for the current user.
    pub lifetime: i64,
    /// Local date of the last write.
    pub day: NaiveDate,
}

/// Storage collaborator holding every counter of the engine.
///
/// Keys are opaque strings. A write must be visible to the next read of the same key.
pub trait CounterStore: Send + Sync {
    /// Current value of `key`.
    fn read(&self, key: &str) -> Option<CounterValue>;

    /// Replace the value of `key`.
    fn write(&self, key: &str, value: CounterValue);

    /// Drop `key`. Removing a missing key is a no-op.
    fn remove(&self, key: &str);

    /// Read-modify-write `key` atomically with respect to other updates, returning the new value.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<CounterValue>) -> CounterValue,
    ) -> CounterValue;
}

/// `InMemoryCounterStore` keeps counters for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<String, CounterValue>>,
}

impl InMemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> InMemoryCounterStore {
        InMemoryCounterStore::default()
    }

    fn snapshot(&self) -> HashMap<String, CounterValue> {
        self.counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn read(&self, key: &str) -> Option<CounterValue> {
        // A poisoned lock still holds consistent data: every mutation is a single insert/remove.
        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        counters.get(key).cloned()
    }

    fn write(&self, key: &str, value: CounterValue) {
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        counters.insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        counters.remove(key);
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<CounterValue>) -> CounterValue,
    ) -> CounterValue {
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        let value = f(counters.remove(key));
        counters.insert(key.to_owned(), value.clone());
        value
    }
}

/// `JsonFileCounterStore` keeps counters in memory and snapshots them to a JSON file after every
/// mutation.
///
/// Write failures are logged and otherwise ignored: the in-memory state stays authoritative for
/// the running process.
#[derive(Debug)]
pub struct JsonFileCounterStore {
    path: PathBuf,
    counters: InMemoryCounterStore,
    file: Mutex<()>,
}

impl JsonFileCounterStore {
    /// Open the store at `path`, loading existing counters. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<JsonFileCounterStore> {
        let path = path.into();
        let counters = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        log::debug!(target: "inapp", path:? = path, counters = counters.len(); "opened counter file");

        Ok(JsonFileCounterStore {
            path,
            counters: InMemoryCounterStore {
                counters: RwLock::new(counters),
            },
            file: Mutex::new(()),
        })
    }

    /// Location of the counter file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current counters to disk.
    pub fn flush(&self) -> Result<()> {
        let _file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let json = serde_json::to_vec(&self.counters.snapshot())?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn persist(&self) {
        if let Err(err) = self.flush() {
            log::warn!(target: "inapp", path:? = self.path; "failed to persist counters: {err}");
        }
    }
}

impl CounterStore for JsonFileCounterStore {
    fn read(&self, key: &str) -> Option<CounterValue> {
        self.counters.read(key)
    }

    fn write(&self, key: &str, value: CounterValue) {
        self.counters.write(key, value);
        self.persist();
    }

    fn remove(&self, key: &str) {
        self.counters.remove(key);
        self.persist();
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<CounterValue>) -> CounterValue,
    ) -> CounterValue {
        let value = self.counters.update(key, f);
        self.persist();
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CounterKind {
    Impressions,
    Triggers,
    DisplayCounts,
}

impl CounterKind {
    fn as_str(self) -> &'static str {
        match self {
            CounterKind::Impressions => "impressions",
            CounterKind::Triggers => "triggers",
            CounterKind::DisplayCounts => "display_counts",
        }
    }
}

/// View over a [`CounterStore`] scoped to the current account and device.
pub(crate) struct ScopedCounters {
    store: Arc<dyn CounterStore>,
    account_id: String,
    device_id: RwLock<String>,
}

impl ScopedCounters {
    pub fn new(
        store: Arc<dyn CounterStore>,
        account_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> ScopedCounters {
        ScopedCounters {
            store,
            account_id: account_id.into(),
            device_id: RwLock::new(device_id.into()),
        }
    }

    pub fn device_id(&self) -> String {
        self.device_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Point every subsequent read and write to the namespace of `device_id`.
    pub fn set_device_id(&self, device_id: impl Into<String>) {
        *self.device_id.write().unwrap_or_else(|e| e.into_inner()) = device_id.into();
    }

    fn key(&self, kind: CounterKind, campaign_id: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.account_id,
            self.device_id(),
            kind.as_str(),
            campaign_id
        )
    }

    pub fn read(&self, kind: CounterKind, campaign_id: &str) -> Option<CounterValue> {
        self.store.read(&self.key(kind, campaign_id))
    }

    pub fn update(
        &self,
        kind: CounterKind,
        campaign_id: &str,
        mut f: impl FnMut(Option<CounterValue>) -> CounterValue,
    ) -> CounterValue {
        self.store.update(&self.key(kind, campaign_id), &mut f)
    }

    pub fn remove(&self, kind: CounterKind, campaign_id: &str) {
        self.store.remove(&self.key(kind, campaign_id));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::{
        CounterKind, CounterStore, CounterValue, DisplayCounts, InMemoryCounterStore,
        JsonFileCounterStore, ScopedCounters,
    };

    #[test]
    fn update_sees_previous_value() {
        let store = InMemoryCounterStore::new();
        let mut bump = |value: Option<CounterValue>| match value {
            Some(CounterValue::Count(n)) => CounterValue::Count(n + 1),
            _ => CounterValue::Count(1),
        };
        assert_eq!(store.update("k", &mut bump), CounterValue::Count(1));
        assert_eq!(store.update("k", &mut bump), CounterValue::Count(2));
        store.remove("k");
        assert_eq!(store.read("k"), None);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = Arc::new(InMemoryCounterStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.update("k", &mut |value| match value {
                            Some(CounterValue::Count(n)) => CounterValue::Count(n + 1),
                            _ => CounterValue::Count(1),
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.read("k"), Some(CounterValue::Count(800)));
    }

    #[test]
    fn scoped_keys_follow_device() {
        let store = Arc::new(InMemoryCounterStore::new());
        let counters = ScopedCounters::new(store.clone(), "acct", "device-1");
        counters.update(CounterKind::Triggers, "c1", |_| CounterValue::Count(3));
        assert_eq!(
            store.read("acct:device-1:triggers:c1"),
            Some(CounterValue::Count(3))
        );

        counters.set_device_id("device-2");
        assert_eq!(counters.read(CounterKind::Triggers, "c1"), None);
        assert_eq!(counters.device_id(), "device-2");
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        {
            let store = JsonFileCounterStore::open(&path).unwrap();
            store.write("a", CounterValue::Count(4));
            store.write("b", CounterValue::Timestamps(vec![1, 2, 3]));
            store.write(
                "c",
                CounterValue::DisplayCounts(DisplayCounts {
                    today: 1,
                    lifetime: 5,
                    day,
                }),
            );
            store.remove("a");
        }

        let store = JsonFileCounterStore::open(&path).unwrap();
        assert_eq!(store.read("a"), None);
        assert_eq!(store.read("b"), Some(CounterValue::Timestamps(vec![1, 2, 3])));
        assert_eq!(
            store.read("c"),
            Some(CounterValue::DisplayCounts(DisplayCounts {
                today: 1,
                lifetime: 5,
                day
            }))
        );
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            JsonFileCounterStore::open(&path),
            Err(crate::Error::Serialization(_))
        ));
    }
}
