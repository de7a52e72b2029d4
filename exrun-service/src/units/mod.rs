// Built-in Units
// Shell execution, file round trips, printing, failure recording and expansion

pub mod expand;
pub mod failure;
pub mod files;
pub mod print;
pub mod shell;

pub use expand::ExplodeAndRun;
pub use failure::RecordFailure;
pub use files::{MakeAndCdTempDir, ReplaceConfigFromFile, WriteConfigToFile};
pub use print::{PrintCurrentJson, PrintExplodedJsons};
pub use shell::{run_command, ResourceLimits, RunShell, ShellOutcome};

use crate::pipeline::{Unit, UnitRegistry};

/// Namespace every built-in unit is registered under
pub const NAMESPACE: &str = "exrun.units";

macro_rules! register {
    ($registry:expr, $($unit:ident),+ $(,)?) => {
        $(
            $registry.register(
                &format!("{}.{}", NAMESPACE, stringify!($unit)),
                |params| Ok(Box::new($unit::from_params(params)?) as Box<dyn Unit>),
            );
        )+
    };
}

pub fn register_builtins(registry: &mut UnitRegistry) {
    register!(
        registry,
        ExplodeAndRun,
        RunShell,
        WriteConfigToFile,
        ReplaceConfigFromFile,
        MakeAndCdTempDir,
        PrintCurrentJson,
        PrintExplodedJsons,
        RecordFailure,
    );
}
