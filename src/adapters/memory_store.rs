use crate::domain::model::{normalize_name, Civility, ReferenceEntry};
use crate::domain::ports::{ReferenceNameStore, ReferenceSink};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 以正規化名字為鍵的記憶體參考表
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceStore {
    entries: Arc<RwLock<HashMap<String, Civility>>>,
}

impl InMemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Civility)>,
    {
        let map = entries
            .into_iter()
            .map(|(name, civility)| (normalize_name(name), civility))
            .collect();
        Self {
            entries: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ReferenceNameStore for InMemoryReferenceStore {
    async fn civility_for(&self, normalized_first_name: &str) -> Result<Option<Civility>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&normalize_name(normalized_first_name)).cloned())
    }

    async fn exists(&self, normalized_first_name: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries.contains_key(&normalize_name(normalized_first_name)))
    }
}

#[async_trait]
impl ReferenceSink for InMemoryReferenceStore {
    async fn upsert_batch(&self, batch: Vec<ReferenceEntry>) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let count = batch.len();
        for entry in batch {
            // 同名字以最後一筆為準
            entries.insert(normalize_name(&entry.normalized_first_name), entry.civility);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_trims_and_case_folds() {
        let store = InMemoryReferenceStore::from_entries([("Hélène", Civility::Madame)]);

        assert_eq!(store.civility_for("  HÉLÈNE ").await.unwrap(), Some(Civility::Madame));
        assert!(store.exists("hélène").await.unwrap());
        // 重音不做折疊
        assert!(!store.exists("helene").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_existing_key() {
        let store = InMemoryReferenceStore::new();
        store
            .upsert_batch(vec![ReferenceEntry::new("Camille", Civility::Madame)])
            .await
            .unwrap();
        let written = store
            .upsert_batch(vec![
                ReferenceEntry::new("CAMILLE", Civility::Monsieur),
                ReferenceEntry::new("Louis", Civility::Monsieur),
            ])
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(store.len().await, 2);
        assert_eq!(store.civility_for("camille").await.unwrap(), Some(Civility::Monsieur));
    }
}
