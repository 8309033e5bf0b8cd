use crate::db::{Poll, PollResults, PollStore, zero_tally};
use crate::error::{PollError, StoreError};
use crate::ws::ResultsSender;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Poll operations on top of a [`PollStore`], plus the vote path that feeds
/// the live results channel.
#[derive(Clone)]
pub struct PollService {
    store: Arc<dyn PollStore>,
    results: ResultsSender,
    store_timeout: Duration,
    vote_locks: Option<Arc<VoteLocks>>,
}

/// One async mutex per poll, taken around every read-modify-write of that
/// poll (votes and updates).
#[derive(Default)]
struct VoteLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl VoteLocks {
    async fn acquire(&self, poll_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .await
            .entry(poll_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    async fn forget(&self, poll_id: Uuid) {
        self.locks.lock().await.remove(&poll_id);
    }
}

impl PollService {
    /// `serialize_votes` adds a per-poll lock around each vote and update. Without it,
    /// two concurrent votes on the same poll can both read the old tally and
    /// one increment is lost.
    pub fn new(
        store: Arc<dyn PollStore>,
        results: ResultsSender,
        store_timeout: Duration,
        serialize_votes: bool,
    ) -> Self {
        PollService {
            store,
            results,
            store_timeout,
            vote_locks: serialize_votes.then(|| Arc::new(VoteLocks::default())),
        }
    }

    /// Holds the poll's lock when writes are serialized.
    async fn serialize(&self, poll_id: Uuid) -> Option<OwnedMutexGuard<()>> {
        match &self.vote_locks {
            Some(locks) => Some(locks.acquire(poll_id).await),
            None => None,
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.store_timeout))?
    }

    pub async fn create_poll(
        &self,
        question: String,
        options: Vec<String>,
    ) -> Result<Poll, PollError> {
        let (question, options) = validate(question, options)?;
        let poll = Poll::new(question, options);

        self.bounded(self.store.create(&poll)).await?;
        info!(poll_id = %poll.id, "poll created");

        Ok(poll)
    }

    pub async fn get_poll(&self, poll_id: Uuid) -> Result<Poll, PollError> {
        self.bounded(self.store.get(poll_id))
            .await?
            .ok_or(PollError::NotFound)
    }

    pub async fn list_polls(&self) -> Result<Vec<Poll>, PollError> {
        Ok(self.bounded(self.store.list()).await?)
    }

    /// Replaces question and options. The tally restarts from zero.
    pub async fn update_poll(
        &self,
        poll_id: Uuid,
        question: String,
        options: Vec<String>,
    ) -> Result<Poll, PollError> {
        let (question, options) = validate(question, options)?;
        let _serialized = self.serialize(poll_id).await;
        let mut poll = self.get_poll(poll_id).await?;

        poll.votes = zero_tally(&options);
        poll.question = question;
        poll.options = options;

        self.bounded(self.store.set(&poll))
            .await
            .map_err(missing_as_not_found)?;
        info!(poll_id = %poll.id, "poll updated");

        Ok(poll)
    }

    pub async fn delete_poll(&self, poll_id: Uuid) -> Result<(), PollError> {
        if !self.bounded(self.store.delete(poll_id)).await? {
            return Err(PollError::NotFound);
        }
        if let Some(locks) = &self.vote_locks {
            locks.forget(poll_id).await;
        }
        info!(poll_id = %poll_id, "poll deleted");

        Ok(())
    }

    /// Records one vote and publishes the resulting snapshot.
    ///
    /// Exactly one snapshot goes to the results channel per successful vote;
    /// none on any failure. Publishing never waits on the broadcaster.
    pub async fn vote(&self, poll_id: Uuid, option: &str) -> Result<PollResults, PollError> {
        let _serialized = self.serialize(poll_id).await;

        let mut poll = self.get_poll(poll_id).await?;
        if !poll.has_option(option) {
            return Err(PollError::InvalidOption(option.to_string()));
        }

        *poll.votes.entry(option.to_string()).or_insert(0) += 1;

        self.bounded(self.store.set(&poll))
            .await
            .map_err(missing_as_not_found)?;

        let results = PollResults::from(&poll);
        self.results.publish(results.clone());
        debug!(poll_id = %poll_id, option, "vote recorded");

        Ok(results)
    }
}

fn missing_as_not_found(e: StoreError) -> PollError {
    match e {
        StoreError::Missing(_) => PollError::NotFound,
        other => PollError::Store(other),
    }
}

fn validate(question: String, options: Vec<String>) -> Result<(String, Vec<String>), PollError> {
    let question = question.trim().to_string();
    if question.is_empty() {
        return Err(PollError::InvalidRequest("question must not be empty".into()));
    }

    let options: Vec<String> = options.into_iter().map(|o| o.trim().to_string()).collect();
    if options.len() < 2 {
        return Err(PollError::InvalidRequest(
            "a poll needs at least two options".into(),
        ));
    }
    if options.iter().any(|o| o.is_empty()) {
        return Err(PollError::InvalidRequest("options must not be empty".into()));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = options.iter().find(|o| !seen.insert(o.as_str())) {
        return Err(PollError::InvalidRequest(format!("duplicate option {dup:?}")));
    }

    Ok((question, options))
}
