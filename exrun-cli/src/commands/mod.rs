pub mod cluster;
pub mod queue;
pub mod run;
pub mod worker;

use std::path::{Path, PathBuf};

use clap::Args;
use color_eyre::Result;

use exrun_service::pipeline::RunContext;

/// Options shared by every command that runs configurations
#[derive(Args, Debug, Default)]
pub struct RunOptions {
    /// Directory to search for linked files (can be repeated)
    #[arg(long, short = 'I', value_name = "DIR")]
    pub include: Vec<PathBuf>,

    /// Enable %eval and %{...} expressions
    #[arg(long)]
    pub expressions: bool,

    /// Working directory for the runs
    #[arg(long, short = 'w', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,
}

impl RunOptions {
    pub fn context(&self) -> Result<RunContext> {
        let includes = self
            .include
            .iter()
            .map(|dir| absolute(dir))
            .collect::<Result<Vec<_>>>()?;

        let working_dir = match &self.working_dir {
            Some(dir) => absolute(dir)?,
            None => std::env::current_dir()?,
        };

        Ok(RunContext::default()
            .with_search_paths(includes)
            .with_working_dir(working_dir)
            .with_expressions(self.expressions))
    }
}

/// Resolve a path against the current directory without requiring it to exist
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_from_options() {
        let options = RunOptions {
            include: vec![PathBuf::from("lib"), PathBuf::from("/opt/shared")],
            expressions: true,
            working_dir: Some(PathBuf::from("/tmp")),
        };

        let context = options.context().unwrap();
        assert!(context.search_paths()[0].is_absolute());
        assert_eq!(context.search_paths()[1], PathBuf::from("/opt/shared"));
        assert_eq!(context.working_dir(), Path::new("/tmp"));
        assert!(context.expressions_enabled());
    }
}
