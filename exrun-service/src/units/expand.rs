// Explode And Run
// Expands every configuration of a root document and runs the results

use crate::document::{merge_config, names, Document};
use crate::error::{ServiceError, ServiceResult};
use crate::pipeline::{InlineDispatch, PipelineState, RunDispatch, Unit, UnitParams};

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// `ExplodeAndRun`: for each entry of `configurations`, merge it over
/// `default_configuration`, expand it and run every concrete document.
/// Final documents are collected under `runResults`.
pub struct ExplodeAndRun;

impl ExplodeAndRun {
    pub fn from_params(params: &UnitParams) -> ServiceResult<Self> {
        params.check("ExplodeAndRun", &[])?;
        Ok(Self)
    }
}

#[async_trait::async_trait]
impl Unit for ExplodeAndRun {
    fn name(&self) -> &str {
        "ExplodeAndRun"
    }

    async fn run(&self, state: &mut PipelineState) -> ServiceResult<()> {
        let configurations = match state.document.get(names::CONFIGURATIONS) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(configurations)) => configurations.clone(),
            Some(_) => {
                return Err(ServiceError::ConfigShape(format!(
                    "'{}' must be a sequence",
                    names::CONFIGURATIONS
                )))
            }
        };
        let default = state.document.get(names::DEFAULT_CONFIGURATION).cloned();
        let conf_dir = state.document.get(names::CONF_DIR_VAR).cloned();

        let context = state.context().clone();
        let engine = context.template_engine();
        let dispatcher: Arc<dyn RunDispatch> = match context.dispatcher() {
            Some(dispatcher) => dispatcher.clone(),
            None => Arc::new(InlineDispatch::new(context.clone())),
        };

        let dispatched: ServiceResult<()> = async {
            for (index, configuration) in configurations.iter().enumerate() {
                let merged = merge_config(default.as_ref(), configuration);
                let runs = engine.expand(&merged)?;
                info!(configuration = index, runs = runs.len(), "expanded configuration");

                for run in runs {
                    dispatcher
                        .dispatch(with_conf_dir(run, conf_dir.as_ref()), state.working_dir.clone())
                        .await?;
                }
            }
            Ok(())
        }
        .await;

        // runs already handed over must not leak into the next batch
        if let Err(e) = dispatched {
            if let Err(discarded) = dispatcher.collect().await {
                warn!(error = %discarded, "run of an aborted expansion failed");
            }
            return Err(e);
        }

        let results = dispatcher.collect().await?;
        if let Value::Object(root) = &mut state.document {
            root.insert(names::RUN_RESULTS.to_string(), Value::Array(results));
        }
        Ok(())
    }
}

/// Carry the root's configuration directory into a run that does not set its own
fn with_conf_dir(mut run: Document, conf_dir: Option<&Document>) -> Document {
    if let (Value::Object(map), Some(dir)) = (&mut run, conf_dir) {
        map.entry(names::CONF_DIR_VAR.to_string())
            .or_insert_with(|| dir.clone());
    }
    run
}

#[cfg(test)]
mod tests {
    use crate::error::ServiceError;
    use crate::local::LocalPool;
    use crate::pipeline::{bootstrap, RunContext, RunDispatch};
    use std::sync::Arc;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_explode_and_run_collects_results() {
        let doc = json!({
            "default_configuration": {
                "tools": ["WriteConfigToFile('ignored.json')"],
                "mode": "fast"
            },
            "configurations": [
                {"solver": {"%explode": ["z3", "cvc5"]}, "tools": ["RecordFailure"]},
                {"solver": "yices", "mode": "slow"}
            ],
            "tools": ["ExplodeAndRun"]
        });

        let dir = TempDir::new().unwrap();
        let context = RunContext::default().with_working_dir(dir.path());
        let result = bootstrap(doc, &context).await.unwrap();

        let runs = result["runResults"].as_array().unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0]["solver"], json!("z3"));
        assert_eq!(runs[1]["solver"], json!("cvc5"));
        assert_eq!(runs[2]["mode"], json!("slow"));
        // sequences extend the default instead of replacing it
        assert_eq!(
            runs[0]["tools"],
            json!(["WriteConfigToFile('ignored.json')", "RecordFailure"])
        );
        assert!(dir.path().join("ignored.json").exists());
    }

    #[tokio::test]
    async fn test_runs_inherit_conf_dir() {
        let doc = json!({
            "EXRUN_CONF_DIR": "/data/problems",
            "configurations": [{"x": 1}, {"x": 2, "EXRUN_CONF_DIR": "/elsewhere"}],
            "tools": ["ExplodeAndRun"]
        });

        let result = bootstrap(doc, &RunContext::default()).await.unwrap();
        assert_eq!(result["runResults"][0]["EXRUN_CONF_DIR"], json!("/data/problems"));
        assert_eq!(result["runResults"][1]["EXRUN_CONF_DIR"], json!("/elsewhere"));
    }

    #[tokio::test]
    async fn test_failed_expansion_discards_dispatched_runs() {
        let base = RunContext::default();
        let pool = Arc::new(LocalPool::start(&[0], &base).unwrap());
        let context = base.with_dispatcher(Some(pool.clone() as Arc<dyn RunDispatch>));

        let broken = json!({
            "configurations": [{"x": 1}, {"y": {"%link": "/missing"}}],
            "tools": ["ExplodeAndRun"]
        });
        assert!(matches!(
            bootstrap(broken, &context).await,
            Err(ServiceError::LinkMissing { .. })
        ));

        let doc = json!({"configurations": [{"z": 1}], "tools": ["ExplodeAndRun"]});
        let result = bootstrap(doc, &context).await.unwrap();
        assert_eq!(result["runResults"], json!([{"z": 1}]));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_configurations_must_be_sequence() {
        let doc = json!({"configurations": {"x": 1}, "tools": ["ExplodeAndRun"]});
        assert!(bootstrap(doc, &RunContext::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_expression_without_evaluator_aborts() {
        let doc = json!({
            "configurations": [{"x": {"%eval": "1 + 1"}}],
            "tools": ["ExplodeAndRun"]
        });

        assert!(bootstrap(doc.clone(), &RunContext::default()).await.is_err());

        let context = RunContext::default().with_expressions(true);
        let result = bootstrap(doc, &context).await.unwrap();
        assert_eq!(result["runResults"][0]["x"], json!(2));
    }
}
