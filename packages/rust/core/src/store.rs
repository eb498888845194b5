//! Where generated sections and finished runs are persisted.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use sitegen_shared::Result;
use sitegen_storage::Storage;

/// Sink for pipeline output.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert or replace one section.
    async fn upsert_section(&self, project_id: &str, section_id: &str, content: &Value)
    -> Result<()>;

    /// Persist a run snapshot.
    async fn save_run(
        &self,
        _project_id: &str,
        _run_id: &str,
        _status: &str,
        _snapshot: &Value,
    ) -> Result<()> {
        Ok(())
    }
}

/// In-process store, used by tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sections: Mutex<BTreeMap<(String, String), Value>>,
    runs: Mutex<BTreeMap<String, (String, Value)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self, project_id: &str, section_id: &str) -> Option<Value> {
        self.sections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(project_id.to_string(), section_id.to_string()))
            .cloned()
    }

    /// Section ids stored for a project, sorted.
    pub fn section_ids(&self, project_id: &str) -> Vec<String> {
        self.sections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(project, _)| project == project_id)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Saved status of a run.
    pub fn run_status(&self, run_id: &str) -> Option<String> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .map(|(status, _)| status.clone())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn upsert_section(
        &self,
        project_id: &str,
        section_id: &str,
        content: &Value,
    ) -> Result<()> {
        self.sections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (project_id.to_string(), section_id.to_string()),
                content.clone(),
            );
        Ok(())
    }

    async fn save_run(
        &self,
        _project_id: &str,
        run_id: &str,
        status: &str,
        snapshot: &Value,
    ) -> Result<()> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id.to_string(), (status.to_string(), snapshot.clone()));
        Ok(())
    }
}

#[async_trait]
impl ContentStore for Storage {
    async fn upsert_section(
        &self,
        project_id: &str,
        section_id: &str,
        content: &Value,
    ) -> Result<()> {
        let written = Storage::upsert_section(self, project_id, section_id, content).await?;
        if !written {
            tracing::debug!(project_id, section_id, "unchanged section not rewritten");
        }
        Ok(())
    }

    async fn save_run(
        &self,
        project_id: &str,
        run_id: &str,
        status: &str,
        snapshot: &Value,
    ) -> Result<()> {
        Storage::save_run(self, run_id, project_id, status, snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_upserts() {
        let store = MemoryStore::new();
        store
            .upsert_section("cafe-x", "home-section-0", &json!({"v": 1}))
            .await
            .unwrap();
        store
            .upsert_section("cafe-x", "home-section-0", &json!({"v": 2}))
            .await
            .unwrap();
        store
            .upsert_section("other", "home-section-0", &json!({}))
            .await
            .unwrap();

        assert_eq!(store.section("cafe-x", "home-section-0"), Some(json!({"v": 2})));
        assert_eq!(store.section_ids("cafe-x"), vec!["home-section-0"]);
    }

    #[tokio::test]
    async fn libsql_store_behind_the_trait() {
        let path = std::env::temp_dir().join(format!("sitegen_core_{}.db", uuid::Uuid::now_v7()));
        let storage = Storage::open(&path).await.unwrap();
        let store: &dyn ContentStore = &storage;

        store
            .upsert_section("cafe-x", "menu-section-0", &json!({"heading": "Menu"}))
            .await
            .unwrap();
        store
            .save_run("cafe-x", "run-1", "complete", &json!({"status": "complete"}))
            .await
            .unwrap();

        assert_eq!(storage.list_sections("cafe-x").await.unwrap().len(), 1);
        assert_eq!(
            storage.get_run("run-1").await.unwrap().map(|r| r.status),
            Some("complete".into())
        );
    }
}
