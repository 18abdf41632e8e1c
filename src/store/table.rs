use crate::error::StoreError;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub type StoreResult<T> = Result<T, StoreError>;

/// Row predicate passed to [`Table::query`].
pub type RowFilter<'a, K, V> = &'a (dyn Fn(&K, &V) -> bool + Send + Sync);

/// Bounds every table key satisfies. Keys iterate in their `Ord` order.
pub trait TableKey:
    Ord + Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> TableKey for T where
    T: Ord + Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Bounds every table value satisfies.
pub trait TableValue: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> TableValue for T where T: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{}

/// Keyed store with upsert semantics.
///
/// Implementations must serialize writes internally; callers may write
/// disjoint keys from concurrent tasks.
pub trait Table<K: TableKey, V: TableValue>: Send + Sync {
    /// Human readable name used in logs and errors.
    fn name(&self) -> &str;

    fn upsert<'a>(&'a self, key: K, value: V) -> BoxFuture<'a, StoreResult<()>>;

    /// Writes every row as one unit. Persistent backends flush once per call.
    fn upsert_many<'a>(&'a self, rows: Vec<(K, V)>) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            for (key, value) in rows {
                self.upsert(key, value).await?;
            }
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<Option<V>>>;

    fn has<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<bool>>;

    /// Removes a row. Returns whether the row existed.
    fn delete<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<bool>>;

    /// Removes every listed row. Returns how many existed.
    fn delete_many<'a>(&'a self, keys: &'a [K]) -> BoxFuture<'a, StoreResult<usize>> {
        Box::pin(async move {
            let mut removed = 0;
            for key in keys {
                if self.delete(key).await? {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }

    /// Returns matching rows in key order.
    fn query<'a>(&'a self, filter: RowFilter<'a, K, V>) -> BoxFuture<'a, StoreResult<Vec<(K, V)>>>;

    /// Returns every key in key order.
    fn keys(&self) -> BoxFuture<'_, StoreResult<Vec<K>>>;
}
