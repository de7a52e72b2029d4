// Run Context
// Scoped settings threaded through every pipeline run, and the per-run mutable state

use crate::document::Document;
use crate::error::ServiceResult;
use crate::expression::{ExpressionEngine, ExpressionEvaluator};
use crate::pipeline::dispatch::RunDispatch;
use crate::pipeline::registry::UnitRegistry;
use crate::template::TemplateEngine;

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a run needs besides its document.
///
/// Replaces process-wide include lists and working directories: each run
/// gets its own copy, and nested runs derive theirs from it.
#[derive(Clone)]
pub struct RunContext {
    registry: Arc<UnitRegistry>,
    search_paths: Vec<PathBuf>,
    base_dir: Option<PathBuf>,
    working_dir: PathBuf,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    dispatcher: Option<Arc<dyn RunDispatch>>,
    processor: Option<usize>,
}

impl RunContext {
    pub fn new(registry: Arc<UnitRegistry>) -> Self {
        Self {
            registry,
            search_paths: Vec::new(),
            base_dir: None,
            working_dir: PathBuf::from("."),
            evaluator: None,
            dispatcher: None,
            processor: None,
        }
    }

    /// Add a directory to search for linked files, ignoring duplicates
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
        self
    }

    pub fn with_search_paths(self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        paths.into_iter().fold(self, |context, path| context.with_search_path(path))
    }

    /// Directory of the file the running document was loaded from
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Install the built-in expression language, or remove any evaluator
    pub fn with_expressions(mut self, enabled: bool) -> Self {
        self.evaluator = if enabled {
            Some(Arc::new(ExpressionEngine::new()))
        } else {
            None
        };
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Where expanded configurations are sent; `None` runs them in place
    pub fn with_dispatcher(mut self, dispatcher: Option<Arc<dyn RunDispatch>>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Processor the run is pinned to
    pub fn with_processor(mut self, processor: Option<usize>) -> Self {
        self.processor = processor;
        self
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn evaluator(&self) -> Option<&dyn ExpressionEvaluator> {
        self.evaluator.as_deref()
    }

    pub fn expressions_enabled(&self) -> bool {
        self.evaluator.is_some()
    }

    pub fn dispatcher(&self) -> Option<&Arc<dyn RunDispatch>> {
        self.dispatcher.as_ref()
    }

    pub fn processor(&self) -> Option<usize> {
        self.processor
    }

    /// Context for runs started from inside a run; they execute in place
    pub fn nested(&self) -> Self {
        self.clone().with_dispatcher(None)
    }

    /// Template engine scoped to this context
    pub fn template_engine(&self) -> TemplateEngine {
        let engine = TemplateEngine::new(self.search_paths.clone()).with_evaluator(self.evaluator.clone());
        match &self.base_dir {
            Some(dir) => engine.with_base_dir(dir.clone()),
            None => engine,
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(Arc::new(UnitRegistry::with_builtins()))
    }
}

/// The document a pipeline mutates, plus where it is running
pub struct PipelineState {
    pub document: Document,
    pub working_dir: PathBuf,
    context: RunContext,
}

impl PipelineState {
    pub fn new(document: Document, context: RunContext) -> Self {
        Self {
            document,
            working_dir: context.working_dir().to_path_buf(),
            context,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Resolve a path relative to the run's working directory
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.working_dir.join(path)
    }

    /// Substitute `${/pointer}` and `%{expr}` against the current document
    pub fn substitute(&self, text: &str) -> ServiceResult<String> {
        self.context.template_engine().substitute(text, &self.document)
    }
}
