//! Content-addressed memo of fitted models, one live entry per data source.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

use crate::error::EngineResult;
use crate::table::{Cell, Table};

/// Identity of one dataset snapshot: where it came from plus a SHA-256 of its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    source_id: String,
    rows: usize,
    digest: String,
}

impl DatasetKey {
    pub fn of(table: &Table) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(table.source_id().as_bytes());
        hasher.update((table.n_rows() as u64).to_le_bytes());
        for column in table.columns() {
            hasher.update(column.as_bytes());
            hasher.update([0x1f]);
        }
        for row in table.rows() {
            for cell in row {
                match cell {
                    Cell::Missing => hasher.update([0]),
                    Cell::Num(v) => {
                        hasher.update([1]);
                        hasher.update(v.to_bits().to_le_bytes());
                    }
                    Cell::Text(s) => {
                        hasher.update([2]);
                        hasher.update((s.len() as u64).to_le_bytes());
                        hasher.update(s.as_bytes());
                    }
                }
            }
            hasher.update([0x1e]);
        }
        Self {
            source_id: table.source_id().to_string(),
            rows: table.n_rows(),
            digest: format!("{:x}", hasher.finalize()),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.digest.get(..12).unwrap_or(&self.digest);
        write!(f, "{}#{}@{}", self.source_id, self.rows, short)
    }
}

/// Fitted models are shared as `Arc` and never mutated after insertion. A new key for a
/// known source replaces the old entry.
pub struct ModelCache<M> {
    entries: Mutex<HashMap<String, (DatasetKey, Arc<M>)>>,
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<M> ModelCache<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &DatasetKey) -> Option<Arc<M>> {
        let guard = self.entries.lock().expect("model cache lock poisoned");
        guard
            .get(key.source_id())
            .filter(|(cached, _)| cached == key)
            .map(|(_, model)| Arc::clone(model))
    }

    /// Returns the cached model for `key`, or runs `train` and stores its result. A failed
    /// training run leaves the cache without an entry for that source.
    pub fn get_or_train(
        &self,
        key: &DatasetKey,
        train: impl FnOnce() -> EngineResult<M>,
    ) -> EngineResult<Arc<M>> {
        {
            let mut guard = self.entries.lock().expect("model cache lock poisoned");
            match guard.get(key.source_id()) {
                Some((cached, model)) if cached == key => {
                    log::debug!("model cache hit for {key}");
                    return Ok(Arc::clone(model));
                }
                Some((cached, _)) => {
                    log::info!("dataset changed ({cached} -> {key}), dropping cached model");
                    guard.remove(key.source_id());
                }
                None => {}
            }
        }

        // Train outside the lock; the first finished result for a key wins.
        let model = Arc::new(train()?);
        let mut guard = self.entries.lock().expect("model cache lock poisoned");
        let entry = guard
            .entry(key.source_id().to_string())
            .or_insert_with(|| (key.clone(), Arc::clone(&model)));
        if entry.0 != *key {
            *entry = (key.clone(), Arc::clone(&model));
        }
        Ok(Arc::clone(&entry.1))
    }

    pub fn invalidate(&self, source_id: &str) -> bool {
        let mut guard = self.entries.lock().expect("model cache lock poisoned");
        guard.remove(source_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("model cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell as Counter;
    use std::sync::Arc;

    use super::{DatasetKey, ModelCache};
    use crate::error::EngineError;
    use crate::table::{Cell, Table};

    fn table(source: &str, xg: f64) -> Table {
        let mut t = Table::new(source, vec!["formation".to_string(), "xg".to_string()]);
        t.push_row(vec![Cell::Text("4-4-2".to_string()), Cell::Num(xg)])
            .unwrap();
        t
    }

    #[test]
    fn key_depends_on_content_and_source() {
        let a = DatasetKey::of(&table("a.csv", 1.2));
        assert_eq!(a, DatasetKey::of(&table("a.csv", 1.2)));
        assert_ne!(a, DatasetKey::of(&table("a.csv", 1.3)));
        assert_ne!(a, DatasetKey::of(&table("b.csv", 1.2)));
        assert_eq!(a.digest().len(), 64);
        assert!(a.to_string().starts_with("a.csv#1@"));
    }

    #[test]
    fn memoizes_per_key_and_invalidates_on_change() {
        let cache: ModelCache<String> = ModelCache::new();
        let runs = Counter::new(0);
        let train = |label: &str| {
            runs.set(runs.get() + 1);
            Ok(label.to_string())
        };

        let k1 = DatasetKey::of(&table("a.csv", 1.0));
        let first = cache.get_or_train(&k1, || train("v1")).unwrap();
        let again = cache.get_or_train(&k1, || train("ignored")).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(runs.get(), 1);

        let k2 = DatasetKey::of(&table("a.csv", 2.0));
        let second = cache.get_or_train(&k2, || train("v2")).unwrap();
        assert_eq!(second.as_str(), "v2");
        assert_eq!(runs.get(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&k1).is_none());
    }

    #[test]
    fn failed_training_is_not_cached() {
        let cache: ModelCache<String> = ModelCache::new();
        let key = DatasetKey::of(&table("a.csv", 1.0));
        let err = cache
            .get_or_train(&key, || Err(EngineError::Cancelled))
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert!(cache.is_empty());
        assert!(!cache.invalidate("a.csv"));
    }
}
