//! Process-wide session registry with per-participant locking.
//!
//! The registry map is guarded by a [`RwLock`] held only long enough to
//! clone the per-record handle; each record sits behind its own [`Mutex`].
//! Mutators for the same participant are serialized, mutators for different
//! participants run fully in parallel, and nothing ever holds a lock over
//! the whole registry while doing work.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::models::record::SessionRecord;
use crate::{AppError, Result};

/// Registry mapping participant IDs to their session records.
#[derive(Debug, Default)]
pub struct SessionStore {
    records: RwLock<HashMap<String, Arc<Mutex<SessionRecord>>>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateParticipant` if the ID is already
    /// present. IDs are generated, so this indicates a caller bug.
    pub async fn create(&self, participant: &str, record: SessionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(participant) {
            return Err(AppError::DuplicateParticipant(participant.to_owned()));
        }
        records.insert(participant.to_owned(), Arc::new(Mutex::new(record)));
        Ok(())
    }

    /// Whether a participant is registered.
    pub async fn contains(&self, participant: &str) -> bool {
        self.records.read().await.contains_key(participant)
    }

    /// Read-only copy of a participant's record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownParticipant` if the ID is absent.
    pub async fn snapshot(&self, participant: &str) -> Result<SessionRecord> {
        let handle = self.handle(participant).await?;
        let record = handle.lock().await;
        Ok(record.clone())
    }

    /// Run `mutator` with exclusive access to one participant's record.
    ///
    /// This is the only sanctioned way to read-modify-write a record. The
    /// mutator must not block: anything slow (the agent call in particular)
    /// happens between two `with_record` invocations, never inside one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownParticipant` if the ID is absent.
    pub async fn with_record<F, T>(&self, participant: &str, mutator: F) -> Result<T>
    where
        F: FnOnce(&mut SessionRecord) -> T,
    {
        let handle = self.handle(participant).await?;
        let mut record = handle.lock().await;
        Ok(mutator(&mut record))
    }

    async fn handle(&self, participant: &str) -> Result<Arc<Mutex<SessionRecord>>> {
        self.records
            .read()
            .await
            .get(participant)
            .cloned()
            .ok_or_else(|| AppError::UnknownParticipant(participant.to_owned()))
    }
}
