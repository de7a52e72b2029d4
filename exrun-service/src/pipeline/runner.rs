// Pipeline Runner
// Runs an ordered list of units against one shared document

use crate::document::{load_document, names, validate_root, Document};
use crate::error::{ServiceError, ServiceResult};
use crate::pipeline::context::{PipelineState, RunContext};
use crate::pipeline::descriptor::UnitDescriptor;
use crate::pipeline::registry::UnitRegistry;

use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

/// One step of a pipeline
#[async_trait::async_trait]
pub trait Unit: Send + Sync {
    fn name(&self) -> &str;

    /// Run against the shared document. Owned sub-units are run from here.
    async fn run(&self, state: &mut PipelineState) -> ServiceResult<()>;

    /// Units that also handle failures of other units return themselves
    fn handler(&self) -> Option<&dyn ErrorHandler> {
        None
    }
}

/// How far a failure has propagated when it is offered to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// A single unit failed; handling it lets the next unit run
    Unit,
    /// No handler took the unit failure; handling it ends the pipeline as recovered
    Pipeline,
}

/// A failure offered to the handler chain
#[derive(Debug)]
pub struct Failure<'a> {
    pub unit: &'a str,
    pub error: &'a ServiceError,
    pub scope: FailureScope,
}

/// Exception handler registered by a unit
pub trait ErrorHandler: Send + Sync {
    /// Returns true when the failure is handled
    fn handle(&self, failure: &Failure<'_>, state: &mut PipelineState) -> bool;
}

/// An ordered list of units
#[derive(Default)]
pub struct Pipeline {
    units: Vec<Box<dyn Unit>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the pipeline described by a document's `tools` list
    pub fn from_document(document: &Document, registry: &UnitRegistry) -> ServiceResult<Self> {
        let mut pipeline = Self::new();

        match document.get(names::TOOLS) {
            None | Some(Value::Null) => {}
            Some(Value::Array(entries)) => {
                for entry in entries {
                    let descriptor = UnitDescriptor::from_document(entry)?;
                    debug!(unit = %descriptor, "loading unit");
                    pipeline.push(registry.create(&descriptor)?);
                }
            }
            Some(other) => {
                return Err(ServiceError::ConfigShape(format!(
                    "'{}' must be a sequence, found {}",
                    names::TOOLS,
                    other
                )))
            }
        }

        Ok(pipeline)
    }

    pub fn push(&mut self, unit: Box<dyn Unit>) {
        self.units.push(unit);
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Run every unit in order.
    ///
    /// A failing unit is offered to the handlers in registration order; if
    /// one takes it the next unit runs. Otherwise the failure is offered
    /// again as a pipeline failure, and only propagates if that is refused too.
    pub async fn execute(&self, state: &mut PipelineState) -> ServiceResult<()> {
        for unit in &self.units {
            debug!(unit = unit.name(), "running unit");

            let Err(error) = unit.run(state).await else {
                continue;
            };

            let failure = Failure {
                unit: unit.name(),
                error: &error,
                scope: FailureScope::Unit,
            };
            if self.offer(&failure, state) {
                warn!(unit = unit.name(), error = %error, "unit failure handled, continuing");
                continue;
            }

            let failure = Failure {
                scope: FailureScope::Pipeline,
                ..failure
            };
            if self.offer(&failure, state) {
                warn!(unit = unit.name(), error = %error, "pipeline failure recovered");
                return Ok(());
            }

            return Err(error);
        }

        Ok(())
    }

    fn offer(&self, failure: &Failure<'_>, state: &mut PipelineState) -> bool {
        self.units
            .iter()
            .filter_map(|unit| unit.handler())
            .any(|handler| handler.handle(failure, state))
    }
}

/// Build the pipeline a document describes and run it, returning the final document
pub async fn bootstrap(document: Document, context: &RunContext) -> ServiceResult<Document> {
    let pipeline = Pipeline::from_document(&document, context.registry())?;
    let mut state = PipelineState::new(document, context.clone());
    pipeline.execute(&mut state).await?;
    Ok(state.document)
}

/// Load a root document and run it.
///
/// The file's directory becomes a search path and the base for linked files,
/// and is injected into the document as `EXRUN_CONF_DIR`.
pub async fn bootstrap_file(path: &Path, context: &RunContext) -> ServiceResult<Document> {
    let path = path.canonicalize().map_err(|_| ServiceError::NotFound(path.to_path_buf()))?;
    let mut document = load_document(&path)?;
    validate_root(&document)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("/")).to_path_buf();
    if let Value::Object(root) = &mut document {
        root.insert(
            names::CONF_DIR_VAR.to_string(),
            Value::String(dir.to_string_lossy().to_string()),
        );
    }

    info!(file = %path.display(), "running configuration");
    let context = context.clone().with_search_path(dir.clone()).with_base_dir(dir);
    bootstrap(document, &context).await
}
