// Shell Unit
// Runs a command through bash under resource limits and records its timing

use crate::document::{access_or_create, names, normalize_pointer, Document};
use crate::error::{ServiceError, ServiceResult};
use crate::expression::number;
use crate::pipeline::{PipelineState, Unit, UnitParams};
use crate::units::files::{ReplaceConfigFromFile, WriteConfigToFile};

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// `RLIMIT_*` names and the `ulimit` flag and unit divisor for each
const ULIMIT_FLAGS: [(&str, &str, i64); 10] = [
    ("RLIMIT_CPU", "-t", 1),
    ("RLIMIT_FSIZE", "-f", 1024),
    ("RLIMIT_DATA", "-d", 1024),
    ("RLIMIT_STACK", "-s", 1024),
    ("RLIMIT_CORE", "-c", 1024),
    ("RLIMIT_RSS", "-m", 1024),
    ("RLIMIT_NPROC", "-u", 1),
    ("RLIMIT_NOFILE", "-n", 1),
    ("RLIMIT_MEMLOCK", "-l", 1024),
    ("RLIMIT_AS", "-v", 1024),
];

/// Exit status used when the limits themselves cannot be applied
const LIMITS_FAILED: i32 = 125;

/// Limits read from the limits sub-document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceLimits {
    /// `(flag, soft, hard)` in `ulimit` units, `None` meaning unlimited
    pub entries: Vec<(&'static str, Option<i64>, Option<i64>)>,
    pub timeout: Option<Duration>,
}

impl ResourceLimits {
    /// Read `RLIMIT_*` entries (`[soft, hard]` or a single value, in bytes or
    /// counts, negative for unlimited) and `timeout` in seconds
    pub fn from_document(limits: Option<&Document>) -> ServiceResult<Self> {
        let Some(Value::Object(map)) = limits else {
            return Ok(Self::default());
        };

        let mut result = Self::default();
        for (key, value) in map {
            if key == names::LIMITS_TIMEOUT {
                let seconds = value.as_f64().filter(|s| *s >= 0.0).ok_or_else(|| {
                    ServiceError::ConfigShape(format!("limit '{}' must be a non-negative number", key))
                })?;
                result.timeout = Some(Duration::from_secs_f64(seconds));
                continue;
            }
            if !key.starts_with("RLIMIT_") {
                continue;
            }

            let Some((_, flag, divisor)) = ULIMIT_FLAGS.iter().find(|(name, _, _)| *name == key.as_str()) else {
                warn!(limit = %key, "invalid resource limit will be ignored");
                continue;
            };

            let (soft, hard) = match value {
                Value::Array(pair) if pair.len() == 2 => (limit_value(key, &pair[0])?, limit_value(key, &pair[1])?),
                single => {
                    let v = limit_value(key, single)?;
                    (v, v)
                }
            };
            let scale = |v: Option<i64>| v.map(|v| v / divisor);
            result.entries.push((*flag, scale(soft), scale(hard)));
        }

        Ok(result)
    }

    /// Shell prelude applying the limits; the soft limit is set first
    pub fn prelude(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }

        let render = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_else(|| "unlimited".to_string());
        let commands: Vec<String> = self
            .entries
            .iter()
            .flat_map(|(flag, soft, hard)| {
                [
                    format!("ulimit -S {} {}", flag, render(*soft)),
                    format!("ulimit -H {} {}", flag, render(*hard)),
                ]
            })
            .collect();

        Some(format!("{} || exit {}", commands.join(" && "), LIMITS_FAILED))
    }
}

fn limit_value(key: &str, value: &Value) -> ServiceResult<Option<i64>> {
    match value.as_i64() {
        Some(v) if v < 0 => Ok(None),
        Some(v) => Ok(Some(v)),
        None => Err(ServiceError::ConfigShape(format!(
            "limit '{}' must be an integer or [soft, hard] pair, got {}",
            key, value
        ))),
    }
}

/// Outcome of one command
#[derive(Debug, Clone)]
pub struct ShellOutcome {
    pub exit_code: Option<i32>,
    pub wall_clock: Duration,
    pub timed_out: bool,
}

/// `RunShell(command, timesTo=None, limitsConfig="/%limits", externalUsedConfig=None, requireSuccess=False)`
pub struct RunShell {
    command: String,
    times_to: Option<String>,
    limits_pointer: String,
    require_success: bool,
    before: Vec<Box<dyn Unit>>,
    after: Vec<Box<dyn Unit>>,
}

impl RunShell {
    const PARAMS: [&'static str; 5] = [
        "command",
        "timesTo",
        "limitsConfig",
        "externalUsedConfig",
        "requireSuccess",
    ];

    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            times_to: None,
            limits_pointer: names::LIMITS_POINTER.to_string(),
            require_success: false,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn from_params(params: &UnitParams) -> ServiceResult<Self> {
        params.check("RunShell", &Self::PARAMS)?;

        let mut unit = Self::new(params.required_string("RunShell", 0, "command")?);
        unit.times_to = params.string("RunShell", 1, "timesTo")?;
        if let Some(pointer) = params.string("RunShell", 2, "limitsConfig")? {
            unit.limits_pointer = pointer;
        }
        if let Some(file) = params.string("RunShell", 3, "externalUsedConfig")? {
            unit = unit.with_external_config(file);
        }
        unit.require_success = params.bool("RunShell", 4, "requireSuccess", false)?;
        Ok(unit)
    }

    /// Write the document to `file` before the command and reload it afterwards
    pub fn with_external_config(mut self, file: impl Into<String>) -> Self {
        let file = file.into();
        self.before.push(Box::new(WriteConfigToFile::new(file.clone())));
        self.after.push(Box::new(ReplaceConfigFromFile::new(file)));
        self
    }

    pub fn with_times_to(mut self, pointer: impl Into<String>) -> Self {
        self.times_to = Some(pointer.into());
        self
    }

    pub fn with_require_success(mut self, require: bool) -> Self {
        self.require_success = require;
        self
    }

    fn record(&self, state: &mut PipelineState, outcome: &ShellOutcome) -> ServiceResult<()> {
        let Some(pointer) = &self.times_to else {
            return Ok(());
        };

        let slot = access_or_create(&mut state.document, pointer)?;
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(times) = slot {
            times.insert("wallClockTime".to_string(), number(outcome.wall_clock.as_secs_f64()));
            times.insert(
                "exitCode".to_string(),
                outcome.exit_code.map(Value::from).unwrap_or(Value::Null),
            );
            if outcome.timed_out {
                times.insert("timedOut".to_string(), Value::Bool(true));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Unit for RunShell {
    fn name(&self) -> &str {
        "RunShell"
    }

    async fn run(&self, state: &mut PipelineState) -> ServiceResult<()> {
        for unit in &self.before {
            unit.run(state).await?;
        }

        let limits_pointer = normalize_pointer(&self.limits_pointer);
        let limits = ResourceLimits::from_document(state.document.pointer(&limits_pointer))?;
        let command = state.substitute(&self.command)?;

        let outcome = run_command(
            &command,
            &limits,
            &state.working_dir,
            state.context().processor(),
        )
        .await?;

        for unit in &self.after {
            unit.run(state).await?;
        }
        self.record(state, &outcome)?;

        if self.require_success && outcome.exit_code != Some(0) {
            return Err(ServiceError::NonZeroExit {
                command,
                code: outcome.exit_code.unwrap_or(-1),
            });
        }
        Ok(())
    }
}

/// Run a command with `bash -c` in `working_dir`, pinned to `processor` when
/// `taskset` is available
pub async fn run_command(
    command: &str,
    limits: &ResourceLimits,
    working_dir: &Path,
    processor: Option<usize>,
) -> ServiceResult<ShellOutcome> {
    let script = match limits.prelude() {
        Some(prelude) => format!("{}\n{}", prelude, command),
        None => command.to_string(),
    };

    let bash = which::which("bash").unwrap_or_else(|_| PathBuf::from("/bin/bash"));
    let mut cmd = match processor.and_then(|p| which::which("taskset").ok().map(|t| (p, t))) {
        Some((processor, taskset)) => {
            let mut cmd = Command::new(taskset);
            cmd.arg("-c").arg(processor.to_string()).arg(&bash);
            cmd
        }
        None => Command::new(&bash),
    };
    cmd.arg("-c").arg(&script);
    cmd.current_dir(working_dir);
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);

    info!(command = %command, dir = %working_dir.display(), "running command");
    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| ServiceError::unit_run("RunShell", format!("failed to spawn bash: {}", e)))?;

    let (status, timed_out) = match limits.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => (status?, false),
            Err(_) => {
                warn!(command = %command, ?timeout, "command timed out, killing it");
                child.kill().await?;
                (child.wait().await?, true)
            }
        },
        None => (child.wait().await?, false),
    };

    let outcome = ShellOutcome {
        exit_code: if timed_out { None } else { status.code() },
        wall_clock: started.elapsed(),
        timed_out,
    };
    debug!(?outcome, "command finished");
    Ok(outcome)
}
