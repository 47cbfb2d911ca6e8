use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use super::retry::TransientError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlobError {
    /// Throttling, 5xx or network trouble; the write may succeed if replayed.
    #[error("transient storage failure: {0}")]
    Transient(String),
    #[error("storage failure: {0}")]
    Permanent(String),
}

impl TransientError for BlobError {
    fn is_transient(&self) -> bool {
        matches!(self, BlobError::Transient(_))
    }
}

#[derive(Debug, Clone)]
pub struct PutOptions {
    pub content_type: String,
    pub content_disposition: String,
}

/// What the provider reports back for a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredBlob {
    pub url: String,
    pub pathname: String,
    pub content_type: String,
    pub content_disposition: String,
}

/// Stored objects are publicly readable at the returned `url`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<StoredBlob, BlobError>;
}

struct MemoryObject {
    data: Bytes,
    content_type: String,
}

/// Process-local store for development and tests. Can be told to fail the next
/// few writes transiently to exercise the retry path.
pub struct MemoryBlobStore {
    base_url: String,
    objects: Mutex<HashMap<String, MemoryObject>>,
    attempts: AtomicUsize,
    failures_pending: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
            attempts: AtomicUsize::new(0),
            failures_pending: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Every call to `put`, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<(Bytes, String)> {
        let objects = self.objects.lock().ok()?;
        objects
            .get(key)
            .map(|object| (object.data.clone(), object.content_type.clone()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<StoredBlob, BlobError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(BlobError::Transient("injected failure".to_string()));
        }

        let mut objects = self
            .objects
            .lock()
            .map_err(|_| BlobError::Permanent("memory store poisoned".to_string()))?;
        objects.insert(
            key.to_string(),
            MemoryObject {
                data,
                content_type: options.content_type.clone(),
            },
        );

        Ok(StoredBlob {
            url: format!("{}/{}", self.base_url, key),
            pathname: key.to_string(),
            content_type: options.content_type.clone(),
            content_disposition: options.content_disposition.clone(),
        })
    }
}
