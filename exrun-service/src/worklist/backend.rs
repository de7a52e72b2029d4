// Queue Backend
// Storage contract behind the work queue service

use crate::error::ServiceResult;
use crate::worklist::model::{WorkItem, WorkState};

/// One connection to the shared worklist table.
///
/// Every method is a single committed transaction. Connection-level
/// failures are reported as `ServiceError::QueueTransient` so the service
/// can reconnect and retry.
#[async_trait::async_trait]
pub trait QueueBackend: Send {
    async fn connect(&mut self) -> ServiceResult<()>;

    /// Drop the connection, ignoring errors
    async fn disconnect(&mut self);

    /// Create the worklist table if it does not exist
    async fn ensure_schema(&mut self) -> ServiceResult<()>;

    /// Insert an `open` item, returning its id
    async fn add(&mut self, workgroup: &str, config_file: &str) -> ServiceResult<i64>;

    /// Claim the oldest `open` item of a workgroup and move it to `processing`.
    ///
    /// Selecting the row and updating it must happen in one transaction so
    /// concurrent acquirers never receive the same item.
    async fn acquire(&mut self, workgroup: &str) -> ServiceResult<Option<WorkItem>>;

    async fn set_state(&mut self, id: i64, state: WorkState) -> ServiceResult<()>;

    /// Force every item of the workgroup with this file back to `open`
    async fn reset_by_file(&mut self, workgroup: &str, config_file: &str) -> ServiceResult<u64>;

    /// Items of a workgroup ordered by id
    async fn list(&mut self, workgroup: &str) -> ServiceResult<Vec<WorkItem>>;
}
