use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::RwLock;
use thiserror::Error;

use super::types::ErrorPattern;

#[derive(Debug, Error, miette::Diagnostic)]
pub enum ErrorStoreError {
    #[error("error store backend failure: {message}")]
    #[diagnostic(code(ipgre::error_store::backend))]
    Backend { message: String },
}

pub type Result<T> = std::result::Result<T, ErrorStoreError>;

/// Pluggable persistence for [`ErrorPattern`]s, mirroring the teacher's
/// `Checkpointer` trait: an in-memory default and an optional durable
/// SQLite backend gated behind the `sqlite` feature.
#[async_trait]
pub trait ErrorStoreBackend: Send + Sync {
    async fn upsert(&self, pattern: ErrorPattern) -> Result<()>;
    async fn get(&self, fingerprint: &str) -> Result<Option<ErrorPattern>>;
    async fn list_all(&self) -> Result<Vec<ErrorPattern>>;
    async fn remove(&self, fingerprint: &str) -> Result<()>;
    async fn clear_all(&self) -> Result<()>;
}

/// Volatile process-local store. Sufficient for a single session; the
/// `sqlite` feature is what makes cross-session learning durable (§4.C).
#[derive(Default)]
pub struct InMemoryErrorStoreBackend {
    inner: RwLock<FxHashMap<String, ErrorPattern>>,
}

impl InMemoryErrorStoreBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ErrorStoreBackend for InMemoryErrorStoreBackend {
    async fn upsert(&self, pattern: ErrorPattern) -> Result<()> {
        let mut map = self.inner.write().map_err(|e| ErrorStoreError::Backend {
            message: format!("lock poisoned: {e}"),
        })?;
        map.insert(pattern.fingerprint.clone(), pattern);
        Ok(())
    }

    async fn get(&self, fingerprint: &str) -> Result<Option<ErrorPattern>> {
        let map = self.inner.read().map_err(|e| ErrorStoreError::Backend {
            message: format!("lock poisoned: {e}"),
        })?;
        Ok(map.get(fingerprint).cloned())
    }

    async fn list_all(&self) -> Result<Vec<ErrorPattern>> {
        let map = self.inner.read().map_err(|e| ErrorStoreError::Backend {
            message: format!("lock poisoned: {e}"),
        })?;
        Ok(map.values().cloned().collect())
    }

    async fn remove(&self, fingerprint: &str) -> Result<()> {
        let mut map = self.inner.write().map_err(|e| ErrorStoreError::Backend {
            message: format!("lock poisoned: {e}"),
        })?;
        map.remove(fingerprint);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut map = self.inner.write().map_err(|e| ErrorStoreError::Backend {
            message: format!("lock poisoned: {e}"),
        })?;
        map.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn sample(fingerprint: &str) -> ErrorPattern {
        ErrorPattern {
            id: fingerprint.to_string(),
            fingerprint: fingerprint.to_string(),
            category: "tic".to_string(),
            text: "found himself".to_string(),
            problem: "overused AI tic".to_string(),
            severity: crate::scorer::IssueSeverity::Medium,
            estimated_impact: 2.0,
            frequency: 1,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            dismissed: false,
            projects: BTreeSet::new(),
            sessions_seen: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_roundtrips() {
        let backend = InMemoryErrorStoreBackend::new();
        backend.upsert(sample("fp1")).await.unwrap();
        let got = backend.get("fp1").await.unwrap();
        assert_eq!(got.unwrap().fingerprint, "fp1");
    }

    #[tokio::test]
    async fn clear_all_empties_store() {
        let backend = InMemoryErrorStoreBackend::new();
        backend.upsert(sample("fp1")).await.unwrap();
        backend.clear_all().await.unwrap();
        assert!(backend.list_all().await.unwrap().is_empty());
    }
}
