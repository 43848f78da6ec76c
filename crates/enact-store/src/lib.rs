//! `enact-store` — the tactical store: durable station records keyed by
//! their upstream identifier.

pub mod db;
mod error;
mod store;

use async_trait::async_trait;
use enact_core::Station;

pub use error::{Result, StoreError};
pub use store::SqliteTacticalStore;

/// Durable keyed station storage.
///
/// `connect` must succeed before `upsert` is useful; while disconnected every
/// write fails with [`StoreError::Unavailable`] instead of being dropped.
#[async_trait]
pub trait TacticalStore: Send + Sync {
    /// Establish the shared connection. A second call while connected is a no-op.
    async fn connect(&self) -> Result<()>;

    /// Insert or replace the record keyed by `station.id`.
    /// Repeating the same upsert leaves the store unchanged.
    async fn upsert(&self, station: &Station) -> Result<()>;

    /// Release the connection. A no-op if never connected.
    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;
}
