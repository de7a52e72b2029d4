// Failure Recording
// Exception handler that snapshots a failure into the document

use crate::document::{access_or_create, Document};
use crate::error::ServiceResult;
use crate::pipeline::{ErrorHandler, Failure, FailureScope, PipelineState, Unit, UnitParams};

use serde_json::json;
use tracing::warn;

/// `RecordFailure(pointer="/%failure", suppressUnitErrors=False)`.
///
/// Recovers whole-pipeline failures by recording them at `pointer`. With
/// `suppressUnitErrors` it also records single unit failures and lets the
/// pipeline continue.
pub struct RecordFailure {
    pointer: String,
    suppress_unit_errors: bool,
}

impl RecordFailure {
    pub const DEFAULT_POINTER: &'static str = "/%failure";

    pub fn new(pointer: impl Into<String>, suppress_unit_errors: bool) -> Self {
        Self {
            pointer: pointer.into(),
            suppress_unit_errors,
        }
    }

    pub fn from_params(params: &UnitParams) -> ServiceResult<Self> {
        params.check("RecordFailure", &["pointer", "suppressUnitErrors"])?;
        Ok(Self::new(
            params
                .string("RecordFailure", 0, "pointer")?
                .unwrap_or_else(|| Self::DEFAULT_POINTER.to_string()),
            params.bool("RecordFailure", 1, "suppressUnitErrors", false)?,
        ))
    }

    fn record(&self, failure: &Failure<'_>, document: &mut Document) -> bool {
        let scope = match failure.scope {
            FailureScope::Unit => "unit",
            FailureScope::Pipeline => "pipeline",
        };
        let entry = json!({
            "unit": failure.unit,
            "error": failure.error.to_string(),
            "scope": scope,
        });

        match access_or_create(document, &self.pointer) {
            Ok(slot) => {
                match slot {
                    Document::Array(entries) => entries.push(entry),
                    other => *other = entry,
                }
                true
            }
            Err(e) => {
                warn!(pointer = %self.pointer, error = %e, "cannot record failure");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl Unit for RecordFailure {
    fn name(&self) -> &str {
        "RecordFailure"
    }

    async fn run(&self, _state: &mut PipelineState) -> ServiceResult<()> {
        Ok(())
    }

    fn handler(&self) -> Option<&dyn ErrorHandler> {
        Some(self)
    }
}

impl ErrorHandler for RecordFailure {
    fn handle(&self, failure: &Failure<'_>, state: &mut PipelineState) -> bool {
        if failure.scope == FailureScope::Unit && !self.suppress_unit_errors {
            return false;
        }
        self.record(failure, &mut state.document)
    }
}

#[cfg(test)]
mod tests {
    use crate::pipeline::{bootstrap, RunContext};
    use serde_json::json;

    #[tokio::test]
    async fn test_pipeline_failure_is_recorded() {
        let doc = json!({
            "tools": ["RecordFailure", "RunShell('exit 4', None, '/%limits', None, True)", "PrintCurrentJson"]
        });

        let result = bootstrap(doc, &RunContext::default()).await.unwrap();
        assert_eq!(result["%failure"]["unit"], json!("RunShell"));
        assert_eq!(result["%failure"]["scope"], json!("pipeline"));
        assert!(result["%failure"]["error"].as_str().unwrap().contains("status 4"));
    }

    #[tokio::test]
    async fn test_unit_failures_suppressed_into_list() {
        let doc = json!({
            "failures": [],
            "tools": [
                "RecordFailure{'pointer': '/failures', 'suppressUnitErrors': True}",
                "ReplaceConfigFromFile('/nonexistent/a.json')",
                "ReplaceConfigFromFile('/nonexistent/b.json')"
            ]
        });

        let result = bootstrap(doc, &RunContext::default()).await.unwrap();
        let failures = result["failures"].as_array().unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0]["scope"], json!("unit"));
    }

    #[tokio::test]
    async fn test_without_handler_error_propagates() {
        let doc = json!({"tools": ["ReplaceConfigFromFile('/nonexistent/a.json')"]});
        assert!(bootstrap(doc, &RunContext::default()).await.is_err());
    }
}
