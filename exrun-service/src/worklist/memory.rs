// Memory Queue
// In-process worklist storage shared between cloned connections

use crate::error::{ServiceError, ServiceResult};
use crate::worklist::backend::QueueBackend;
use crate::worklist::model::{WorkItem, WorkState};

use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<WorkItem>,
    next_id: i64,
}

/// Worklist kept in memory.
///
/// Clones share the same table and behave like separate connections to one
/// database, which is how concurrent pollers are simulated.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    table: Arc<Mutex<Table>>,
    connected: bool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> ServiceResult<MutexGuard<'_, Table>> {
        if !self.connected {
            return Err(ServiceError::QueueTransient("not connected".to_string()));
        }
        Ok(self.table.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait::async_trait]
impl QueueBackend for MemoryQueue {
    async fn connect(&mut self) -> ServiceResult<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    async fn ensure_schema(&mut self) -> ServiceResult<()> {
        self.table().map(|_| ())
    }

    async fn add(&mut self, workgroup: &str, config_file: &str) -> ServiceResult<i64> {
        let mut table = self.table()?;
        table.next_id += 1;
        let id = table.next_id;
        table.rows.push(WorkItem {
            id,
            workgroup: workgroup.to_string(),
            config_file: config_file.to_string(),
            state: WorkState::Open,
            acquired_at: None,
        });
        Ok(id)
    }

    async fn acquire(&mut self, workgroup: &str) -> ServiceResult<Option<WorkItem>> {
        let mut table = self.table()?;
        let row = table
            .rows
            .iter_mut()
            .find(|row| row.workgroup == workgroup && row.state == WorkState::Open);

        Ok(row.map(|row| {
            row.state = WorkState::Processing;
            row.acquired_at = Some(Utc::now());
            row.clone()
        }))
    }

    async fn set_state(&mut self, id: i64, state: WorkState) -> ServiceResult<()> {
        let mut table = self.table()?;
        match table.rows.iter_mut().find(|row| row.id == id) {
            Some(row) => {
                row.state = state;
                Ok(())
            }
            None => Err(ServiceError::QueueStorage(format!("no work item with id {}", id))),
        }
    }

    async fn reset_by_file(&mut self, workgroup: &str, config_file: &str) -> ServiceResult<u64> {
        let mut table = self.table()?;
        let mut count = 0;
        for row in table
            .rows
            .iter_mut()
            .filter(|row| row.workgroup == workgroup && row.config_file == config_file)
        {
            row.state = WorkState::Open;
            row.acquired_at = None;
            count += 1;
        }
        Ok(count)
    }

    async fn list(&mut self, workgroup: &str) -> ServiceResult<Vec<WorkItem>> {
        let table = self.table()?;
        Ok(table
            .rows
            .iter()
            .filter(|row| row.workgroup == workgroup)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requires_connection() {
        let mut queue = MemoryQueue::new();
        let err = queue.add("g1", "/a.json").await.unwrap_err();
        assert!(err.is_transient());

        queue.connect().await.unwrap();
        assert_eq!(queue.add("g1", "/a.json").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_acquire_in_id_order_per_workgroup() {
        let mut queue = MemoryQueue::new();
        queue.connect().await.unwrap();
        queue.add("g2", "/other.json").await.unwrap();
        queue.add("g1", "/a.json").await.unwrap();
        queue.add("g1", "/b.json").await.unwrap();

        let first = queue.acquire("g1").await.unwrap().unwrap();
        assert_eq!(first.config_file, "/a.json");
        assert_eq!(first.state, WorkState::Processing);
        assert!(first.acquired_at.is_some());

        let second = queue.acquire("g1").await.unwrap().unwrap();
        assert_eq!(second.config_file, "/b.json");
        assert!(queue.acquire("g1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_rows() {
        let mut writer = MemoryQueue::new();
        let mut reader = writer.clone();
        writer.connect().await.unwrap();
        reader.connect().await.unwrap();

        writer.add("g1", "/a.json").await.unwrap();
        assert_eq!(reader.list("g1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_by_file() {
        let mut queue = MemoryQueue::new();
        queue.connect().await.unwrap();
        let id = queue.add("g1", "/a.json").await.unwrap();
        queue.add("g2", "/a.json").await.unwrap();

        queue.acquire("g1").await.unwrap();
        queue.set_state(id, WorkState::Error).await.unwrap();

        assert_eq!(queue.reset_by_file("g1", "/a.json").await.unwrap(), 1);
        let items = queue.list("g1").await.unwrap();
        assert_eq!(items[0].state, WorkState::Open);
        assert_eq!(items[0].acquired_at, None);
        assert!(queue.set_state(99, WorkState::Done).await.is_err());
    }
}
