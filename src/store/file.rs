use super::memory::{Change, MemoryTable};
use super::table::{RowFilter, StoreResult, Table, TableKey, TableValue};
use crate::error::StoreError;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Table persisted as a JSON array of `[key, value]` pairs.
///
/// Reads are served from memory. Every write call, single row or bulk,
/// rewrites the snapshot once through a temporary file followed by a rename,
/// so a crash leaves either the old or the new snapshot on disk. A failed
/// write rolls the touched rows back.
#[derive(Debug)]
pub struct JsonFileTable<K, V> {
    path: PathBuf,
    rows: MemoryTable<K, V>,
}

impl<K: TableKey, V: TableValue> JsonFileTable<K, V> {
    /// Opens (or creates) the table stored at `path`.
    pub async fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> StoreResult<Self> {
        let name = name.into();
        let path = path.into();

        let rows = match fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => {
                let pairs: Vec<(K, V)> = serde_json::from_slice(&bytes)?;
                pairs.into_iter().collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        tracing::debug!(table = %name, path = %path.display(), rows = rows.len(), "opened table");

        Ok(Self {
            path,
            rows: MemoryTable::with_rows(name, rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn apply(&self, changes: Vec<Change<K, V>>) -> StoreResult<usize> {
        let path = self.path.clone();
        let table = self.rows.name().to_owned();
        self.rows
            .apply_with(changes, move |rows| {
                let pairs: Vec<(&K, &V)> = rows.iter().collect();
                let bytes = serde_json::to_vec(&pairs)?;
                Ok(write_snapshot(table, path, bytes))
            })
            .await
    }
}

async fn write_snapshot(table: String, path: PathBuf, bytes: Vec<u8>) -> StoreResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &bytes).await?;
    fs::rename(&tmp, &path).await.map_err(|err| StoreError::Unavailable {
        table,
        reason: format!("failed to replace {}: {err}", path.display()),
    })
}

impl<K: TableKey, V: TableValue> Table<K, V> for JsonFileTable<K, V> {
    fn name(&self) -> &str {
        self.rows.name()
    }

    fn upsert<'a>(&'a self, key: K, value: V) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.apply(vec![Change::Upsert(key, value)]).await?;
            Ok(())
        })
    }

    fn upsert_many<'a>(&'a self, rows: Vec<(K, V)>) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            if rows.is_empty() {
                return Ok(());
            }
            let changes = rows
                .into_iter()
                .map(|(key, value)| Change::Upsert(key, value))
                .collect();
            self.apply(changes).await?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<Option<V>>> {
        self.rows.get(key)
    }

    fn has<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<bool>> {
        self.rows.has(key)
    }

    fn delete<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            if !self.rows.has(key).await? {
                return Ok(false);
            }
            Ok(self.apply(vec![Change::Delete(key.clone())]).await? > 0)
        })
    }

    fn delete_many<'a>(&'a self, keys: &'a [K]) -> BoxFuture<'a, StoreResult<usize>> {
        Box::pin(async move {
            let mut present = Vec::new();
            for key in keys {
                if self.rows.has(key).await? {
                    present.push(Change::Delete(key.clone()));
                }
            }
            if present.is_empty() {
                return Ok(0);
            }
            self.apply(present).await
        })
    }

    fn query<'a>(&'a self, filter: RowFilter<'a, K, V>) -> BoxFuture<'a, StoreResult<Vec<(K, V)>>> {
        self.rows.query(filter)
    }

    fn keys(&self) -> BoxFuture<'_, StoreResult<Vec<K>>> {
        self.rows.keys()
    }
}
