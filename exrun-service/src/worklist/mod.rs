// Worklist Module
// Durable work queue and the pollers that drain it

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod service;

pub use backend::QueueBackend;
pub use config::{QueueConfig, ServerConfig, TEMPLATE};
pub use dispatcher::{
    reset_target, DispatchReport, DispatcherOptions, PollerState, WorklistDispatcher, MAX_ERRORS,
};
pub use memory::MemoryQueue;
pub use model::{WorkItem, WorkState};
pub use postgres::PostgresQueue;
pub use service::{RetryPolicy, WorkQueueService};
