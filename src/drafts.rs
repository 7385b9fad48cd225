// Per-project cache of the last submitted time log values

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ClientError, Result};
use crate::models::TimeLogEntry;
use crate::storage::{keys, KeyValueStore};

/// Last submitted time log entry per project, kept under one storage key
pub struct LogDrafts {
    store: Arc<dyn KeyValueStore>,
}

impl LogDrafts {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Last entry submitted for `project`, if any
    pub async fn last_for(&self, project: u64) -> Result<Option<TimeLogEntry>> {
        Ok(self.load().await?.remove(&project.to_string()))
    }

    /// Remember `entry` as the latest values for its project
    pub async fn remember(&self, entry: &TimeLogEntry) -> Result<()> {
        let mut drafts = self.load().await?;
        drafts.insert(entry.project.to_string(), entry.clone());

        let serialized = serde_json::to_string(&drafts)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        self.store.set(keys::LAST_LOG_DATA, &serialized).await
    }

    async fn load(&self) -> Result<BTreeMap<String, TimeLogEntry>> {
        let Some(raw) = self.store.get(keys::LAST_LOG_DATA).await? else {
            return Ok(BTreeMap::new());
        };

        match serde_json::from_str(&raw) {
            Ok(drafts) => Ok(drafts),
            Err(e) => {
                tracing::warn!("Discarding malformed log drafts: {}", e);
                Ok(BTreeMap::new())
            }
        }
    }
}
