//! Cache contract and the in-memory implementation.

mod memory;

pub use memory::{CacheStats, MemoryCache};

use async_trait::async_trait;

use crate::error::Error;

/// A string-keyed cache of domain models.
///
/// Implementations must tolerate concurrent calls from several watchers and
/// request handlers. `set` overwrites; `delete` of an absent key succeeds.
#[async_trait]
pub trait Cache<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Look up a value.
    async fn get(&self, key: &str) -> Result<Option<T>, Error>;

    /// Store a value, replacing any previous one.
    async fn set(&self, key: &str, value: T) -> Result<(), Error>;

    /// Remove a value.
    async fn delete(&self, key: &str) -> Result<(), Error>;
}
