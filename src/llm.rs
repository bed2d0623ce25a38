pub mod gemini;

use error_stack::Report;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// One piece of an incrementally delivered reply.
///
/// A stream is terminated by exactly one `End` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum ChatChunk {
    Text(String),
    End,
    Error(String),
}

/// Text-in, text-out language model.
///
/// Uses `BoxFuture` to keep the trait object-safe (`dyn LlmProvider`).
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Full reply for `prompt`.
    fn complete(&self, prompt: &str) -> BoxFuture<'_, Result<String, Report<LlmError>>>;

    /// Send reply text to `tx` as it arrives and return the concatenated reply.
    ///
    /// Only `ChatChunk::Text` is sent here; the caller owns the terminator.
    /// Stops early when `cancel` fires or the receiver is dropped, returning
    /// the text delivered so far.
    fn stream(
        &self,
        prompt: &str,
        tx: mpsc::Sender<ChatChunk>,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<String, Report<LlmError>>>;
}
