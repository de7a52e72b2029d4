// Worklist Model
// Durable queue rows and their lifecycle states

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a queued configuration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkState {
    Open,
    Processing,
    Done,
    Error,
}

impl WorkState {
    pub const ALL: [WorkState; 4] = [
        WorkState::Open,
        WorkState::Processing,
        WorkState::Done,
        WorkState::Error,
    ];

    /// Value stored in the `state` column
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkState::Open => "open",
            WorkState::Processing => "processing",
            WorkState::Done => "done",
            WorkState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkState::Done | WorkState::Error)
    }
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown work state '{}'", s))
    }
}

/// One row of `<prefix>worklist`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: i64,
    pub workgroup: String,
    pub config_file: String,
    pub state: WorkState,
    pub acquired_at: Option<DateTime<Utc>>,
}
