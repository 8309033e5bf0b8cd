pub mod connection;
pub mod memory;
pub mod models;
pub mod repositories;

pub use connection::*;
pub use memory::*;
pub use models::*;
pub use repositories::*;

use crate::error::StoreError;
use async_trait::async_trait;
use uuid::Uuid;

/// Durable key-value persistence for poll documents.
///
/// Every write replaces the whole document. Callers doing a read followed by
/// a `set` get no atomicity across the pair.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn create(&self, poll: &Poll) -> Result<(), StoreError>;

    async fn get(&self, poll_id: Uuid) -> Result<Option<Poll>, StoreError>;

    /// All polls, oldest first.
    async fn list(&self) -> Result<Vec<Poll>, StoreError>;

    /// Replaces an existing document. Fails with [`StoreError::Missing`] if the
    /// poll is gone.
    async fn set(&self, poll: &Poll) -> Result<(), StoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, poll_id: Uuid) -> Result<bool, StoreError>;
}
