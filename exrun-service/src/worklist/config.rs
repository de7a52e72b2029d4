// Queue Configuration
// Credentials file for the shared worklist database

use crate::document::load_document;
use crate::error::{ServiceError, ServiceResult};

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::path::Path;

/// Commented starting point for a queue credentials file
pub const TEMPLATE: &str = r#"{
    // items are only handed to pollers of the same workgroup
    "workgroup": "",
    // prepended to the table name, e.g. "sweep_" gives sweep_worklist
    "prefix": "",
    "server": {
        "host": "localhost",
        "port": 5432,
        "user": "",
        "password": "",
        "db": "",
    },
}
"#;

const DEFAULT_PORT: u16 = 5432;

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub db: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub workgroup: String,
    #[serde(default)]
    pub prefix: String,
    pub server: ServerConfig,
}

impl QueueConfig {
    /// Read a credentials file (JSON with comments, or YAML)
    pub fn load(path: &Path) -> ServiceResult<Self> {
        let document = load_document(path)?;
        serde_json::from_value(document)
            .map_err(|e| ServiceError::ConfigShape(format!("{}: {}", path.display(), e)))
    }

    /// Name of the worklist table, rejecting prefixes that are not plain identifiers
    pub fn table_name(&self) -> ServiceResult<String> {
        table_name(&self.prefix)
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.server.host)
            .port(self.server.port)
            .username(&self.server.user)
            .password(&self.server.password)
            .database(&self.server.db)
    }
}

/// `<prefix>worklist`, rejecting prefixes that are not plain identifiers
pub fn table_name(prefix: &str) -> ServiceResult<String> {
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ServiceError::ConfigShape(format!(
            "table prefix '{}' may only contain letters, digits and '_'",
            prefix
        )));
    }
    Ok(format!("{}worklist", prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_template_is_loadable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        fs::write(&path, TEMPLATE).unwrap();

        let config = QueueConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 5432);
        assert_eq!(config.table_name().unwrap(), "worklist");
    }

    #[test]
    fn test_defaults_and_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.yaml");
        fs::write(
            &path,
            "workgroup: g1\nprefix: sweep_\nserver:\n  host: db\n  user: u\n  db: runs\n",
        )
        .unwrap();

        let config = QueueConfig::load(&path).unwrap();
        assert_eq!(config.workgroup, "g1");
        assert_eq!(config.server.port, 5432);
        assert_eq!(config.server.password, "");
        assert_eq!(config.table_name().unwrap(), "sweep_worklist");
    }

    #[test]
    fn test_rejects_bad_prefix_and_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");
        fs::write(&path, r#"{"workgroup": "g", "prefix": "x; DROP", "server": {"host": "h", "user": "u", "db": "d"}}"#).unwrap();
        assert!(QueueConfig::load(&path).unwrap().table_name().is_err());

        fs::write(&path, r#"{"workgroup": "g"}"#).unwrap();
        assert!(matches!(QueueConfig::load(&path), Err(ServiceError::ConfigShape(_))));
    }
}
