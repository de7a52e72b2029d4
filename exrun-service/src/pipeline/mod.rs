// Pipeline Module
// Unit descriptors, the unit registry and the runner that executes them in order

pub mod context;
pub mod descriptor;
pub mod dispatch;
pub mod registry;
pub mod runner;

pub use context::{PipelineState, RunContext};
pub use descriptor::{UnitDescriptor, UnitParams};
pub use dispatch::{InlineDispatch, RunDispatch};
pub use registry::{UnitFactory, UnitRegistry};
pub use runner::{bootstrap, bootstrap_file, ErrorHandler, Failure, FailureScope, Pipeline, Unit};
