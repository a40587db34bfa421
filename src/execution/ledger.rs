use std::collections::HashMap;

use tokio::sync::RwLock;

use super::types::ExecutionRecord;

/// Addressable store of completed (or failed) executions, keyed by execution
/// id. Single writer per key, many readers. Grows without bound for the
/// process lifetime — callers that need eviction must layer it on top.
#[derive(Default)]
pub struct ExecutionLedger {
    records: RwLock<HashMap<String, ExecutionRecord>>,
}

impl ExecutionLedger {
    pub async fn put(&self, record: ExecutionRecord) {
        self.records
            .write()
            .await
            .insert(record.execution_id.clone(), record);
    }

    pub async fn get(&self, execution_id: &str) -> Option<ExecutionRecord> {
        self.records.read().await.get(execution_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
