// Experiment Run Service Library
// Template expansion, pipeline execution and work distribution for parameter sweeps

pub mod cluster;
pub mod document;
pub mod error;
pub mod expression;
pub mod grpc;
pub mod local;
pub mod pipeline;
pub mod template;
pub mod units;
pub mod worklist;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};

pub use document::{load_document, merge_config, Document};

pub use expression::{ExpressionEngine, ExpressionEvaluator};

pub use template::TemplateEngine;

pub use pipeline::{
    bootstrap, bootstrap_file, InlineDispatch, Pipeline, PipelineState, RunContext, RunDispatch,
    Unit, UnitRegistry,
};

pub use cluster::{ClusterDispatcher, WorkerHandle};
pub use grpc::GrpcWorker;
pub use local::LocalPool;

pub use worklist::{
    DispatchReport, DispatcherOptions, MemoryQueue, PostgresQueue, QueueBackend, QueueConfig,
    WorkItem, WorkQueueService, WorkState, WorklistDispatcher,
};
