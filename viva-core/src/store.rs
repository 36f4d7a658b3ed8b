//! Session storage — key/value + TTL abstraction over a shared mapping store.
//!
//! Key schema (Redis-style, one logical record per session):
//! - `session:<identity>`  — the serialized [`SessionRecord`]
//! - `resume:<identity>`   — resume text staged by the upload collaborator
//! - `feedback:<identity>` — bounded list of per-answer feedback entries
//!
//! All operations return `StoreError::Unavailable` when the backing store
//! cannot be reached; callers fail closed rather than losing state.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{SessionPatch, SessionRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    #[error("stored record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Abstraction over the session mapping store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create (or replace) the session record under `session:<identity>`.
    async fn create(
        &self,
        identity: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn get(&self, identity: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Shallow field overwrite: only `Some` fields of the patch are
    /// written; everything else is preserved. The TTL is extended or
    /// preserved, never shortened. A vanished record makes this a no-op
    /// (the next `get` reports the session as gone).
    async fn merge(
        &self,
        identity: &str,
        patch: &SessionPatch,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn delete(&self, identity: &str) -> Result<(), StoreError>;

    async fn touch(&self, identity: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Stage resume text for an identity ahead of `start`.
    async fn stage_resume(
        &self,
        identity: &str,
        resume_text: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn resume(&self, identity: &str) -> Result<Option<String>, StoreError>;

    /// Append to the per-identity feedback list, trimming to the most
    /// recent `max_len` entries. Each push refreshes the list's own TTL.
    async fn push_feedback(
        &self,
        identity: &str,
        entry: &str,
        max_len: usize,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn feedbacks(&self, identity: &str) -> Result<Vec<String>, StoreError>;

    async fn clear_feedback(&self, identity: &str) -> Result<(), StoreError>;
}

fn session_key(identity: &str) -> String {
    format!("session:{identity}")
}

fn resume_key(identity: &str) -> String {
    format!("resume:{identity}")
}

fn feedback_key(identity: &str) -> String {
    format!("feedback:{identity}")
}

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-process implementation of the mapping store: string values plus
/// string lists, each entry carrying its own expiry. Expired entries are
/// dropped lazily on access.
#[derive(Default)]
pub struct MemoryStore {
    kv: RwLock<HashMap<String, Expiring<String>>>,
    lists: RwLock<HashMap<String, Expiring<VecDeque<String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn put_kv(&self, key: String, value: String, ttl: Duration) {
        let mut kv = self.kv.write().await;
        kv.insert(
            key,
            Expiring {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn get_kv(&self, key: &str) -> Option<String> {
        {
            let kv = self.kv.read().await;
            match kv.get(key) {
                Some(entry) if entry.live() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Entry exists but expired — purge it.
        let mut kv = self.kv.write().await;
        if let Some(entry) = kv.get(key) {
            if entry.live() {
                return Some(entry.value.clone());
            }
            kv.remove(key);
        }
        None
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(
        &self,
        identity: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(record)?;
        self.put_kv(session_key(identity), serialized, ttl).await;
        Ok(())
    }

    async fn get(&self, identity: &str) -> Result<Option<SessionRecord>, StoreError> {
        match self.get_kv(&session_key(identity)).await {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn merge(
        &self,
        identity: &str,
        patch: &SessionPatch,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let key = session_key(identity);
        let mut kv = self.kv.write().await;
        match kv.get(&key) {
            Some(entry) if entry.live() => {}
            Some(_) => {
                kv.remove(&key);
                return Ok(());
            }
            None => return Ok(()),
        }

        if let Some(entry) = kv.get_mut(&key) {
            let mut record: SessionRecord = serde_json::from_str(&entry.value)?;
            patch.apply(&mut record);
            entry.value = serde_json::to_string(&record)?;
            entry.expires_at = entry.expires_at.max(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<(), StoreError> {
        self.kv.write().await.remove(&session_key(identity));
        Ok(())
    }

    async fn touch(&self, identity: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut kv = self.kv.write().await;
        if let Some(entry) = kv.get_mut(&session_key(identity)) {
            if entry.live() {
                entry.expires_at = entry.expires_at.max(Instant::now() + ttl);
            }
        }
        Ok(())
    }

    async fn stage_resume(
        &self,
        identity: &str,
        resume_text: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.put_kv(resume_key(identity), resume_text.to_string(), ttl)
            .await;
        Ok(())
    }

    async fn resume(&self, identity: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_kv(&resume_key(identity)).await)
    }

    async fn push_feedback(
        &self,
        identity: &str,
        entry: &str,
        max_len: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let key = feedback_key(identity);
        let mut lists = self.lists.write().await;
        let now = Instant::now();

        let list = lists.entry(key).or_insert_with(|| Expiring {
            value: VecDeque::new(),
            expires_at: now + ttl,
        });
        if !list.live() {
            list.value.clear();
        }
        list.value.push_back(entry.to_string());
        while list.value.len() > max_len {
            list.value.pop_front();
        }
        list.expires_at = now + ttl;
        Ok(())
    }

    async fn feedbacks(&self, identity: &str) -> Result<Vec<String>, StoreError> {
        let key = feedback_key(identity);
        {
            let lists = self.lists.read().await;
            match lists.get(&key) {
                Some(entry) if entry.live() => {
                    return Ok(entry.value.iter().cloned().collect());
                }
                Some(_) => {}
                None => return Ok(Vec::new()),
            }
        }
        self.lists.write().await.remove(&key);
        Ok(Vec::new())
    }

    async fn clear_feedback(&self, identity: &str) -> Result<(), StoreError> {
        self.lists.write().await.remove(&feedback_key(identity));
        Ok(())
    }
}
