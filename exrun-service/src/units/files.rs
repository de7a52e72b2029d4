// File Units
// Document file round trips and per-run working directories

use crate::document::load_document;
use crate::error::{ServiceError, ServiceResult};
use crate::pipeline::{PipelineState, Unit, UnitParams};

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};

/// Attempts at finding an unused random directory name
const TEMP_DIR_ATTEMPTS: usize = 16;
const RANDOM_PART_LEN: usize = 8;

/// `WriteConfigToFile(filename)`: write the current document as JSON
pub struct WriteConfigToFile {
    filename: String,
}

impl WriteConfigToFile {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }

    pub fn from_params(params: &UnitParams) -> ServiceResult<Self> {
        params.check("WriteConfigToFile", &["filename"])?;
        Ok(Self::new(params.required_string("WriteConfigToFile", 0, "filename")?))
    }
}

#[async_trait::async_trait]
impl Unit for WriteConfigToFile {
    fn name(&self) -> &str {
        "WriteConfigToFile"
    }

    async fn run(&self, state: &mut PipelineState) -> ServiceResult<()> {
        let path = state.resolve_path(&self.filename);
        let text = serde_json::to_string_pretty(&state.document)?;
        tokio::fs::write(&path, text).await?;
        debug!(file = %path.display(), "wrote document");
        Ok(())
    }
}

/// `ReplaceConfigFromFile(filename)`: replace the current document with a file's contents
pub struct ReplaceConfigFromFile {
    filename: String,
}

impl ReplaceConfigFromFile {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }

    pub fn from_params(params: &UnitParams) -> ServiceResult<Self> {
        params.check("ReplaceConfigFromFile", &["filename"])?;
        Ok(Self::new(params.required_string("ReplaceConfigFromFile", 0, "filename")?))
    }
}

#[async_trait::async_trait]
impl Unit for ReplaceConfigFromFile {
    fn name(&self) -> &str {
        "ReplaceConfigFromFile"
    }

    async fn run(&self, state: &mut PipelineState) -> ServiceResult<()> {
        let path = state.resolve_path(&self.filename);
        state.document = load_document(&path)?;
        debug!(file = %path.display(), "replaced document");
        Ok(())
    }
}

/// `MakeAndCdTempDir(prefix="", hasRandomPart=True)`: create a directory under
/// the working directory and continue the run inside it
pub struct MakeAndCdTempDir {
    prefix: String,
    random: bool,
}

impl MakeAndCdTempDir {
    pub fn new(prefix: impl Into<String>, random: bool) -> Self {
        Self {
            prefix: prefix.into(),
            random,
        }
    }

    pub fn from_params(params: &UnitParams) -> ServiceResult<Self> {
        params.check("MakeAndCdTempDir", &["prefix", "hasRandomPart"])?;
        Ok(Self::new(
            params.string("MakeAndCdTempDir", 0, "prefix")?.unwrap_or_default(),
            params.bool("MakeAndCdTempDir", 1, "hasRandomPart", true)?,
        ))
    }

    async fn create_random(&self, state: &PipelineState) -> ServiceResult<PathBuf> {
        for _ in 0..TEMP_DIR_ATTEMPTS {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(RANDOM_PART_LEN)
                .map(char::from)
                .collect();
            let path = state.resolve_path(format!("{}{}", self.prefix, suffix));

            match tokio::fs::create_dir(&path).await {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::unit_run(
            self.name(),
            format!("no unused directory name with prefix '{}'", self.prefix),
        ))
    }
}

#[async_trait::async_trait]
impl Unit for MakeAndCdTempDir {
    fn name(&self) -> &str {
        "MakeAndCdTempDir"
    }

    async fn run(&self, state: &mut PipelineState) -> ServiceResult<()> {
        let path = if self.random {
            self.create_random(state).await?
        } else {
            let path = state.resolve_path(&self.prefix);
            tokio::fs::create_dir_all(&path).await?;
            path
        };

        info!(dir = %path.display(), "changed directory");
        state.working_dir = path;
        Ok(())
    }
}
