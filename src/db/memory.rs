use crate::db::PollStore;
use crate::db::models::Poll;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process poll documents, used when no database is configured.
#[derive(Default)]
pub struct MemoryPollStore {
    polls: RwLock<HashMap<Uuid, Poll>>,
}

impl MemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn create(&self, poll: &Poll) -> Result<(), StoreError> {
        self.polls.write().await.insert(poll.id, poll.clone());
        Ok(())
    }

    async fn get(&self, poll_id: Uuid) -> Result<Option<Poll>, StoreError> {
        Ok(self.polls.read().await.get(&poll_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Poll>, StoreError> {
        let mut polls: Vec<Poll> = self.polls.read().await.values().cloned().collect();
        polls.sort_by_key(|p| p.created_at);
        Ok(polls)
    }

    async fn set(&self, poll: &Poll) -> Result<(), StoreError> {
        let mut polls = self.polls.write().await;
        match polls.get_mut(&poll.id) {
            Some(existing) => {
                *existing = poll.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(poll.id)),
        }
    }

    async fn delete(&self, poll_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.polls.write().await.remove(&poll_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll(question: &str) -> Poll {
        Poll::new(question.to_string(), vec!["yes".into(), "no".into()])
    }

    #[tokio::test]
    async fn set_replaces_whole_document() {
        let store = MemoryPollStore::new();
        let mut p = poll("lunch?");
        store.create(&p).await.unwrap();

        p.votes.insert("yes".into(), 3);
        store.set(&p).await.unwrap();

        let stored = store.get(p.id).await.unwrap().unwrap();
        assert_eq!(stored.votes["yes"], 3);
        assert_eq!(stored.votes["no"], 0);
    }

    #[tokio::test]
    async fn set_on_deleted_poll_reports_missing() {
        let store = MemoryPollStore::new();
        let p = poll("gone");
        store.create(&p).await.unwrap();
        assert!(store.delete(p.id).await.unwrap());
        assert!(!store.delete(p.id).await.unwrap());

        let err = store.set(&p).await.unwrap_err();
        assert!(matches!(err, StoreError::Missing(id) if id == p.id));
    }

    #[tokio::test]
    async fn list_is_oldest_first() {
        let store = MemoryPollStore::new();
        let first = poll("first");
        let mut second = poll("second");
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.create(&second).await.unwrap();
        store.create(&first).await.unwrap();

        let listed: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.question)
            .collect();
        assert_eq!(listed, vec!["first", "second"]);
    }
}
