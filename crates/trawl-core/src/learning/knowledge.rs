//! Knowledge store.
//!
//! Items are keyed by `{model_id}_{knowledge_type}`, so re-running an
//! extraction on the same asset overwrites the previous answers instead of
//! piling up duplicates. Persisted on demand to `extracted_knowledge.json`.

use crate::atomic::{atomic_read_json, atomic_write_json};
use crate::error::Result;
use crate::learning::types::KnowledgeItem;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

pub struct KnowledgeStore {
    items: RwLock<BTreeMap<String, KnowledgeItem>>,
    path: PathBuf,
}

impl KnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            path: path.into(),
        }
    }

    /// Load previously saved items; an unreadable file starts the store empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self::new(path);
        match atomic_read_json::<BTreeMap<String, KnowledgeItem>>(&store.path) {
            Ok(Some(items)) => {
                debug!("Loaded {} knowledge items", items.len());
                *store.items.write().unwrap_or_else(PoisonError::into_inner) = items;
            }
            Ok(None) => {}
            Err(e) => warn!(
                "Ignoring unreadable knowledge file {}: {}",
                store.path.display(),
                e
            ),
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert items, replacing any with the same key.
    pub fn insert_all(&self, new_items: impl IntoIterator<Item = KnowledgeItem>) -> usize {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let mut count = 0;
        for item in new_items {
            items.insert(item.key(), item);
            count += 1;
        }
        count
    }

    /// All items extracted from one asset, ordered by knowledge type.
    pub fn for_model(&self, model_id: &str) -> Vec<KnowledgeItem> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|item| item.model_id == model_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save(&self) -> Result<()> {
        let snapshot = self
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        atomic_write_json(&self.path, &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::types::KnowledgeContent;
    use chrono::Utc;
    use tempfile::TempDir;

    fn item(model_id: &str, kind: &str, response: &str) -> KnowledgeItem {
        KnowledgeItem {
            model_id: model_id.to_string(),
            knowledge_type: kind.to_string(),
            content: KnowledgeContent {
                query: "q".to_string(),
                response: response.to_string(),
            },
            confidence: 0.7,
            extracted_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_same_key_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = KnowledgeStore::new(temp_dir.path().join("k.json"));
        store.insert_all([item("aa", "knowledge_0", "old")]);
        store.insert_all([item("aa", "knowledge_0", "new"), item("bb", "knowledge_0", "x")]);

        assert_eq!(store.len(), 2);
        let for_aa = store.for_model("aa");
        assert_eq!(for_aa.len(), 1);
        assert_eq!(for_aa[0].content.response, "new");
        assert!(store.for_model("cc").is_empty());
    }

    #[test]
    fn test_save_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("learning").join("extracted_knowledge.json");
        let store = KnowledgeStore::new(&path);
        store.insert_all([item("aa", "knowledge_0", "a"), item("aa", "knowledge_3", "b")]);
        store.save().unwrap();

        let reopened = KnowledgeStore::open(&path);
        assert_eq!(reopened.for_model("aa"), store.for_model("aa"));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get("aa_knowledge_3").is_some());
    }
}
