// Print Units
// Dump the current document or its explosion to stdout

use crate::error::ServiceResult;
use crate::pipeline::{PipelineState, Unit, UnitParams};
use crate::template::explode;

use serde_json::Value;

/// `PrintCurrentJson`
pub struct PrintCurrentJson;

impl PrintCurrentJson {
    pub fn from_params(params: &UnitParams) -> ServiceResult<Self> {
        params.check("PrintCurrentJson", &[])?;
        Ok(Self)
    }
}

#[async_trait::async_trait]
impl Unit for PrintCurrentJson {
    fn name(&self) -> &str {
        "PrintCurrentJson"
    }

    async fn run(&self, state: &mut PipelineState) -> ServiceResult<()> {
        println!("{}", serde_json::to_string_pretty(&state.document)?);
        Ok(())
    }
}

/// `PrintExplodedJsons`: print every variant the current document explodes into
pub struct PrintExplodedJsons;

impl PrintExplodedJsons {
    pub fn from_params(params: &UnitParams) -> ServiceResult<Self> {
        params.check("PrintExplodedJsons", &[])?;
        Ok(Self)
    }
}

#[async_trait::async_trait]
impl Unit for PrintExplodedJsons {
    fn name(&self) -> &str {
        "PrintExplodedJsons"
    }

    async fn run(&self, state: &mut PipelineState) -> ServiceResult<()> {
        let variants = explode(&state.document)?;
        println!("{}", serde_json::to_string_pretty(&Value::Array(variants))?);
        Ok(())
    }
}
