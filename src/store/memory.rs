use super::table::{RowFilter, StoreResult, Table, TableKey, TableValue};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use tokio::sync::RwLock;

/// Ordered in-memory table. Also the cache underneath [`super::JsonFileTable`].
#[derive(Debug)]
pub struct MemoryTable<K, V> {
    name: String,
    rows: RwLock<BTreeMap<K, V>>,
}

impl<K: TableKey, V: TableValue> MemoryTable<K, V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rows(name, BTreeMap::new())
    }

    pub(crate) fn with_rows(name: impl Into<String>, rows: BTreeMap<K, V>) -> Self {
        Self {
            name: name.into(),
            rows: RwLock::new(rows),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Applies `changes` under the write lock, then hands the rows to `flush`
    /// before the lock is released, so snapshots observe writes in order. When
    /// the flush fails, only the touched keys are restored.
    ///
    /// Returns how many deleted keys existed.
    pub(crate) async fn apply_with<F, Fut>(&self, changes: Vec<Change<K, V>>, flush: F) -> StoreResult<usize>
    where
        F: FnOnce(&BTreeMap<K, V>) -> StoreResult<Fut>,
        Fut: Future<Output = StoreResult<()>>,
    {
        let mut rows = self.rows.write().await;
        let mut undo = Vec::with_capacity(changes.len());
        let mut removed = 0;
        for change in changes {
            match change {
                Change::Upsert(key, value) => {
                    let previous = rows.insert(key.clone(), value);
                    undo.push((key, previous));
                }
                Change::Delete(key) => {
                    if let Some(previous) = rows.remove(&key) {
                        removed += 1;
                        undo.push((key, Some(previous)));
                    }
                }
            }
        }

        let flushed = match flush(&rows) {
            Ok(write) => write.await,
            Err(err) => Err(err),
        };
        if let Err(err) = flushed {
            for (key, previous) in undo.into_iter().rev() {
                match previous {
                    Some(value) => rows.insert(key, value),
                    None => rows.remove(&key),
                };
            }
            return Err(err);
        }
        Ok(removed)
    }
}

/// One row mutation of a batched write.
#[derive(Debug, Clone)]
pub(crate) enum Change<K, V> {
    Upsert(K, V),
    Delete(K),
}

impl<K: TableKey, V: TableValue> Table<K, V> for MemoryTable<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn upsert<'a>(&'a self, key: K, value: V) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.rows.write().await.insert(key, value);
            Ok(())
        })
    }

    fn upsert_many<'a>(&'a self, rows: Vec<(K, V)>) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.rows.write().await.extend(rows);
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<Option<V>>> {
        Box::pin(async move { Ok(self.rows.read().await.get(key).cloned()) })
    }

    fn has<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move { Ok(self.rows.read().await.contains_key(key)) })
    }

    fn delete<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move { Ok(self.rows.write().await.remove(key).is_some()) })
    }

    fn delete_many<'a>(&'a self, keys: &'a [K]) -> BoxFuture<'a, StoreResult<usize>> {
        Box::pin(async move {
            let mut rows = self.rows.write().await;
            Ok(keys.iter().filter(|key| rows.remove(*key).is_some()).count())
        })
    }

    fn query<'a>(&'a self, filter: RowFilter<'a, K, V>) -> BoxFuture<'a, StoreResult<Vec<(K, V)>>> {
        Box::pin(async move {
            let rows = self.rows.read().await;
            Ok(rows
                .iter()
                .filter(|(key, value)| filter(key, value))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect())
        })
    }

    fn keys(&self) -> BoxFuture<'_, StoreResult<Vec<K>>> {
        Box::pin(async move { Ok(self.rows.read().await.keys().cloned().collect()) })
    }
}
