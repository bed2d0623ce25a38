use std::collections::HashMap;
use std::sync::Mutex;

use error_stack::Report;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::StorageError;
use crate::history::ChatStore;
use crate::model::{ChatMessage, Feedback};

/// Process-local history, lost on exit.
#[derive(Default)]
pub struct MemoryChatStore {
    messages: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_messages<T>(
        &self,
        context: StorageError,
        f: impl FnOnce(&mut HashMap<String, Vec<ChatMessage>>) -> T,
    ) -> Result<T, Report<StorageError>> {
        let mut guard = self
            .messages
            .lock()
            .map_err(|_| Report::new(context).attach("chat history lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl ChatStore for MemoryChatStore {
    fn append(&self, message: &ChatMessage) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let message = message.clone();
        Box::pin(async move {
            self.with_messages(StorageError::Insert, |all| {
                all.entry(message.symbol.clone()).or_default().push(message);
            })
        })
    }

    fn messages(
        &self,
        symbol: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<ChatMessage>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            self.with_messages(StorageError::Query, |all| {
                let history = all.get(&symbol).map(Vec::as_slice).unwrap_or_default();
                history[history.len().saturating_sub(limit)..].to_vec()
            })
        })
    }

    fn clear(&self, symbol: &str) -> BoxFuture<'_, Result<u64, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            self.with_messages(StorageError::Query, |all| {
                all.remove(&symbol).map_or(0, |removed| removed.len() as u64)
            })
        })
    }

    fn set_feedback(
        &self,
        id: Uuid,
        feedback: Feedback,
    ) -> BoxFuture<'_, Result<bool, Report<StorageError>>> {
        Box::pin(async move {
            self.with_messages(StorageError::Insert, |all| {
                match all.values_mut().flatten().find(|m| m.id == id) {
                    Some(message) => {
                        message.feedback = Some(feedback);
                        true
                    }
                    None => false,
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    #[tokio::test]
    async fn keeps_append_order_and_limits_from_the_end() {
        let store = MemoryChatStore::new();
        for i in 0..4 {
            store
                .append(&ChatMessage::new("TCS.NS", Role::User, format!("q{i}")))
                .await
                .unwrap();
        }
        let messages = store.messages("TCS.NS", 3).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "q2", "q3"]);
        assert!(store.messages("INFY.NS", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn feedback_and_clear() {
        let store = MemoryChatStore::new();
        let reply = ChatMessage::new("TCS.NS", Role::Assistant, "ok");
        store.append(&reply).await.unwrap();

        assert!(store.set_feedback(reply.id, Feedback::Down).await.unwrap());
        assert_eq!(
            store.messages("TCS.NS", 1).await.unwrap()[0].feedback,
            Some(Feedback::Down)
        );
        assert_eq!(store.clear("TCS.NS").await.unwrap(), 1);
        assert_eq!(store.clear("TCS.NS").await.unwrap(), 0);
    }
}
