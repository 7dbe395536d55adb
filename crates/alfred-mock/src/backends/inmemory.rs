use crate::store::KeyValueStore;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory implementation of KeyValueStore
///
/// Reads share the lock; writes and bulk loads serialize on it. The data lives for
/// the lifetime of the process.
#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.data.write().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        self.data.write().remove(key);
    }

    fn get_many(&self, keys: &[&str]) -> Vec<Option<String>> {
        let data = self.data.read();
        keys.iter().map(|k| data.get(*k).cloned()).collect()
    }

    fn load_batch(&self, entries: Vec<(String, String)>) -> usize {
        let count = entries.len();
        let mut data = self.data.write();
        data.reserve(count);
        data.extend(entries);
        count
    }

    fn apply(&self, writes: Vec<(String, Option<String>)>) {
        let mut data = self.data.write();
        for (key, value) in writes {
            match value {
                Some(value) => {
                    data.insert(key, value);
                }
                None => {
                    data.remove(&key);
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }

    fn clear(&self) -> usize {
        let mut data = self.data.write();
        let count = data.len();
        data.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use std::sync::Arc;

    #[test]
    fn test_inmemory_get_set() {
        let store = InMemoryStore::new();

        store.set("key1", "value1".to_string());
        assert_eq!(store.get("key1"), Some("value1".to_string()));
    }

    #[test]
    fn test_inmemory_get_absent() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("nothing"), None);
    }

    #[test]
    fn test_inmemory_delete() {
        let store = InMemoryStore::new();

        store.set("key1", "value1".to_string());
        store.delete("key1");
        assert_eq!(store.get("key1"), None);

        // Deleting again is fine
        store.delete("key1");
        assert!(store.is_empty());
    }

    #[test]
    fn test_inmemory_overwrite() {
        let store = InMemoryStore::new();

        store.set("k", "a".to_string());
        store.set("k", "b".to_string());
        assert_eq!(store.get("k"), Some("b".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_inmemory_load_batch_and_clear() {
        let store = InMemoryStore::new();

        let loaded = store.load_batch(vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        assert_eq!(loaded, 2);
        assert_eq!(
            store.get_many(&["a", "b", "c"]),
            vec![Some("1".to_string()), Some("2".to_string()), None]
        );

        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_inmemory_apply_sets_and_deletes() {
        let store = InMemoryStore::new();
        store.set("gone", "1".to_string());
        store.set("kept", "2".to_string());

        store.apply(vec![
            ("gone".to_string(), None),
            ("new".to_string(), Some("3".to_string())),
            ("missing".to_string(), None),
        ]);

        assert_eq!(store.get("gone"), None);
        assert_eq!(store.get("kept"), Some("2".to_string()));
        assert_eq!(store.get("new"), Some("3".to_string()));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_inmemory_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"key3": "value3", "key4": "value4"}}"#).unwrap();

        let store = InMemoryStore::new();
        let count = store.load_file(file.path()).unwrap();

        assert_eq!(count, 2);
        assert_eq!(store.get("key3"), Some("value3".to_string()));
        assert_eq!(store.get("key4"), Some("value4".to_string()));
    }

    #[test]
    fn test_inmemory_load_file_failure_leaves_store_untouched() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"key3": "value3", "#).unwrap();

        let store = InMemoryStore::new();
        store.set("existing", "yes".to_string());

        assert!(store.load_file(file.path()).is_err());
        assert!(store.load_file(Path::new("/missing/file.json")).is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("key3"), None);
    }

    #[test]
    fn test_concurrent_set_get_own_keys() {
        use std::thread;

        let store = Arc::new(InMemoryStore::new());
        let num_threads = 10;
        let iterations_per_thread = 100;

        let handles: Vec<_> = (0..num_threads)
            .map(|thread_id| {
                let store_clone = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..iterations_per_thread {
                        let key = format!("key_{thread_id}");
                        let value = format!("thread_{thread_id}_value_{i}");

                        store_clone.set(&key, value.clone());

                        // We should always see our own write
                        assert_eq!(
                            store_clone.get(&key),
                            Some(value),
                            "Thread {thread_id} iteration {i}: Failed to read back own write"
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), num_threads);
    }

    #[test]
    fn test_bulk_load_is_all_or_nothing_for_readers() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let store = Arc::new(InMemoryStore::new());
        let keys: Vec<String> = (0..200).map(|i| format!("bulk_{i}")).collect();
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let store = Arc::clone(&store);
            let keys = keys.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
                while !done.load(Ordering::Acquire) {
                    let sample = store.get_many(&key_refs);
                    let present = sample.iter().filter(|v| v.is_some()).count();
                    assert!(
                        present == 0 || present == key_refs.len(),
                        "Reader observed a partial batch: {present} of {}",
                        key_refs.len()
                    );
                }
            })
        };

        for round in 0..50 {
            let batch = keys
                .iter()
                .map(|k| (k.clone(), format!("round_{round}")))
                .collect();
            store.load_batch(batch);
            store.clear();
        }

        done.store(true, Ordering::Release);
        reader.join().unwrap();
    }
}
