pub mod memory;
pub mod sqlite;

use error_stack::Report;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::StorageError;
use crate::model::{ChatMessage, Feedback};

/// Per-symbol chat history.
///
/// Messages of one symbol are kept in append order.
pub trait ChatStore: Send + Sync {
    fn append(&self, message: &ChatMessage) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// The most recent `limit` messages for `symbol`, oldest first.
    fn messages(
        &self,
        symbol: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<ChatMessage>, Report<StorageError>>>;

    /// Delete the history of `symbol`, returning how many messages were removed.
    fn clear(&self, symbol: &str) -> BoxFuture<'_, Result<u64, Report<StorageError>>>;

    /// Record feedback on a message; `false` if no message has that id.
    fn set_feedback(
        &self,
        id: Uuid,
        feedback: Feedback,
    ) -> BoxFuture<'_, Result<bool, Report<StorageError>>>;
}
