// PostgreSQL Queue
// Worklist table in a shared PostgreSQL database

use crate::error::{ServiceError, ServiceResult};
use crate::worklist::backend::QueueBackend;
use crate::worklist::config::{table_name, QueueConfig};
use crate::worklist::model::{WorkItem, WorkState};

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Connection, Row};
use tracing::debug;

/// A single connection to the worklist table `<prefix>worklist`
pub struct PostgresQueue {
    options: PgConnectOptions,
    table: String,
    connection: Option<PgConnection>,
}

impl PostgresQueue {
    pub fn new(config: &QueueConfig) -> ServiceResult<Self> {
        Self::with_options(config.connect_options(), &config.prefix)
    }

    /// Queue on explicit connection options, such as ones parsed from a `postgres://` URL
    pub fn with_options(options: PgConnectOptions, prefix: &str) -> ServiceResult<Self> {
        Ok(Self {
            options,
            table: table_name(prefix)?,
            connection: None,
        })
    }

    fn connection(&mut self) -> ServiceResult<&mut PgConnection> {
        self.connection
            .as_mut()
            .ok_or_else(|| ServiceError::QueueTransient("not connected".to_string()))
    }

    fn item(row: &PgRow) -> ServiceResult<WorkItem> {
        let state: String = row.try_get("state")?;
        Ok(WorkItem {
            id: row.try_get("id")?,
            workgroup: row.try_get("workgroup")?,
            config_file: row.try_get("config_file")?,
            state: state.parse().map_err(ServiceError::QueueStorage)?,
            acquired_at: row.try_get("acquired")?,
        })
    }
}

#[async_trait::async_trait]
impl QueueBackend for PostgresQueue {
    async fn connect(&mut self) -> ServiceResult<()> {
        let connection = PgConnection::connect_with(&self.options).await?;
        self.connection = Some(connection);
        debug!(table = %self.table, "connected to queue");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                debug!(error = %e, "error while closing queue connection");
            }
        }
    }

    async fn ensure_schema(&mut self) -> ServiceResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                workgroup TEXT NOT NULL,
                config_file TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'open'
                    CHECK (state IN ('open', 'processing', 'done', 'error')),
                acquired TIMESTAMPTZ
            )",
            self.table
        );
        let connection = self.connection()?;
        sqlx::query(&sql).execute(&mut *connection).await?;
        Ok(())
    }

    async fn add(&mut self, workgroup: &str, config_file: &str) -> ServiceResult<i64> {
        let sql = format!(
            "INSERT INTO {} (workgroup, config_file, state) VALUES ($1, $2, 'open') RETURNING id",
            self.table
        );
        let connection = self.connection()?;
        let id: i64 = sqlx::query_scalar(&sql)
            .bind(workgroup)
            .bind(config_file)
            .fetch_one(&mut *connection)
            .await?;
        Ok(id)
    }

    async fn acquire(&mut self, workgroup: &str) -> ServiceResult<Option<WorkItem>> {
        // SKIP LOCKED: a concurrent acquirer moves on to the next open row
        // instead of blocking on ours and then finding it no longer open.
        let select = format!(
            "SELECT id, workgroup, config_file FROM {}
             WHERE workgroup = $1 AND state = 'open'
             ORDER BY id LIMIT 1
             FOR UPDATE SKIP LOCKED",
            self.table
        );
        let update = format!(
            "UPDATE {} SET state = 'processing', acquired = now() WHERE id = $1 RETURNING acquired",
            self.table
        );

        let connection = self.connection()?;
        let mut tx = connection.begin().await?;

        let Some(row) = sqlx::query(&select)
            .bind(workgroup)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.commit().await?;
            return Ok(None);
        };

        let id: i64 = row.try_get("id")?;
        let acquired: DateTime<Utc> = sqlx::query_scalar(&update)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(WorkItem {
            id,
            workgroup: row.try_get("workgroup")?,
            config_file: row.try_get("config_file")?,
            state: WorkState::Processing,
            acquired_at: Some(acquired),
        }))
    }

    async fn set_state(&mut self, id: i64, state: WorkState) -> ServiceResult<()> {
        let sql = format!("UPDATE {} SET state = $1 WHERE id = $2", self.table);
        let connection = self.connection()?;
        let result = sqlx::query(&sql)
            .bind(state.as_str())
            .bind(id)
            .execute(&mut *connection)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::QueueStorage(format!("no work item with id {}", id)));
        }
        Ok(())
    }

    async fn reset_by_file(&mut self, workgroup: &str, config_file: &str) -> ServiceResult<u64> {
        let sql = format!(
            "UPDATE {} SET state = 'open', acquired = NULL WHERE workgroup = $1 AND config_file = $2",
            self.table
        );
        let connection = self.connection()?;
        let result = sqlx::query(&sql)
            .bind(workgroup)
            .bind(config_file)
            .execute(&mut *connection)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list(&mut self, workgroup: &str) -> ServiceResult<Vec<WorkItem>> {
        let sql = format!(
            "SELECT id, workgroup, config_file, state, acquired FROM {} WHERE workgroup = $1 ORDER BY id",
            self.table
        );
        let connection = self.connection()?;
        let rows = sqlx::query(&sql)
            .bind(workgroup)
            .fetch_all(&mut *connection)
            .await?;
        rows.iter().map(Self::item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worklist::config::ServerConfig;

    fn config(prefix: &str) -> QueueConfig {
        QueueConfig {
            workgroup: "g1".to_string(),
            prefix: prefix.to_string(),
            server: ServerConfig {
                host: "localhost".to_string(),
                port: 5432,
                user: "exrun".to_string(),
                password: String::new(),
                db: "exrun".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_operations_need_connection() {
        let mut queue = PostgresQueue::new(&config("t_")).unwrap();
        assert_eq!(queue.table, "t_worklist");

        let err = queue.acquire("g1").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_invalid_prefix() {
        assert!(PostgresQueue::new(&config("a-b")).is_err());
    }

    #[test]
    fn test_queue_from_url() {
        let options: PgConnectOptions = "postgres://exrun@db.example:6543/sweeps".parse().unwrap();
        let queue = PostgresQueue::with_options(options, "nightly_").unwrap();
        assert_eq!(queue.table, "nightly_worklist");
        assert_eq!(queue.options.get_port(), 6543);
        assert!(PostgresQueue::with_options(PgConnectOptions::new(), "x;drop").is_err());
    }
}
