// Template Engine Module
// Turns one template document into the concrete configurations it describes

pub mod explode;
pub mod link;
pub mod substitute;

pub use explode::explode;
pub use link::resolve_links;
pub use substitute::{evaluate, evaluate_expression, substitute_text, MAX_SUBSTITUTIONS};

use crate::document::Document;
use crate::error::ServiceResult;
use crate::expression::ExpressionEvaluator;

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Template engine holding the scope of one expansion
#[derive(Clone, Default)]
pub struct TemplateEngine {
    search_paths: Vec<PathBuf>,
    base_dir: Option<PathBuf>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
}

impl TemplateEngine {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            base_dir: None,
            evaluator: None,
        }
    }

    /// Directory relative `%linkFile` names are looked up in first
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Enable `%eval` and `%{...}`
    pub fn with_evaluator(mut self, evaluator: Option<Arc<dyn ExpressionEvaluator>>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    pub fn evaluator(&self) -> Option<&dyn ExpressionEvaluator> {
        self.evaluator.as_deref()
    }

    pub fn explode(&self, template: &Document) -> ServiceResult<Vec<Document>> {
        explode(template)
    }

    pub fn resolve_links(&self, document: &Document) -> ServiceResult<Document> {
        resolve_links(document, self.base_dir(), &self.search_paths)
    }

    pub fn evaluate(&self, document: &Document) -> ServiceResult<Document> {
        evaluate(document, self.evaluator())
    }

    pub fn substitute(&self, text: &str, document: &Document) -> ServiceResult<String> {
        substitute_text(text, document, self.evaluator())
    }

    /// Explode a template, then resolve links and evaluate each variant.
    ///
    /// Links are resolved per variant so they see the chosen values; files
    /// pulled in by `%linkFile` may add further axes, which are exploded too.
    pub fn expand(&self, template: &Document) -> ServiceResult<Vec<Document>> {
        let mut documents = Vec::new();
        for variant in self.explode(template)? {
            let linked = self.resolve_links(&variant)?;
            for concrete in self.explode(&linked)? {
                documents.push(self.evaluate(&concrete)?);
            }
        }
        Ok(documents)
    }
}
