//! The local statement store: a SQLite database accessed through `sqlx`.
//!
//! Everything above this module talks to the store through the `Store` trait, with SQL text and
//! positional parameters. Rows come back as maps of column name to JSON value.

mod migrations;
pub(crate) mod statements;

use crate::query::{Param, QueryResult, Row, Store};
use crate::Result;
use anyhow::{bail, Context};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, SqlitePool, TypeInfo, ValueRef};
use std::path::Path;
use tracing::trace;

#[derive(Debug, Clone)]
pub(crate) struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Opens the SQLite file at `path`, which must exist, and migrates its schema if it is behind.
    pub(crate) async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The statement store is missing '{}'", path.display());
        }
        let pool = connect(path, false).await?;
        let version = schema_version(&pool).await?;
        if version > migrations::CURRENT_VERSION {
            bail!(
                "The statement store is at schema version {version}, which is newer than this \
                program supports ({})",
                migrations::CURRENT_VERSION
            );
        }
        migrations::run(&pool, version, migrations::CURRENT_VERSION).await?;
        Ok(Self { pool })
    }

    /// Creates a new SQLite file at `path`, which must not exist yet, and builds the schema.
    pub(crate) async fn init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A statement store already exists at '{}'", path.display());
        }
        let pool = connect(path, true).await?;
        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .context("Unable to create the schema_version table")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&pool)
            .await
            .context("Unable to record the initial schema version")?;
        migrations::run(&pool, 0, migrations::CURRENT_VERSION).await?;
        Ok(Self { pool })
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Unable to open the statement store '{}'", path.display()))
}

async fn schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Unable to read the schema version")?;
    Ok(row.0.unwrap_or_default())
}

/// Whether `sql` produces rows, as opposed to only changing them.
fn returns_rows(sql: &str) -> bool {
    let head = sql.trim_start();
    ["SELECT", "WITH", "PRAGMA"]
        .iter()
        .any(|keyword| {
            head.get(..keyword.len())
                .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
        })
}

fn decode_row(row: &SqliteRow) -> Result<Row> {
    row.columns()
        .iter()
        .map(|column| -> Result<(String, Value)> {
            let index = column.ordinal();
            let raw = row
                .try_get_raw(index)
                .with_context(|| format!("Unable to read column '{}'", column.name()))?;
            let value = if raw.is_null() {
                Value::Null
            } else {
                match raw.type_info().name() {
                    "INTEGER" => json!(row.try_get::<i64, _>(index)?),
                    "REAL" => json!(row.try_get::<f64, _>(index)?),
                    "TEXT" => Value::String(row.try_get::<String, _>(index)?),
                    other => {
                        trace!("Skipping column '{}' of type {other}", column.name());
                        Value::Null
                    }
                }
            };
            Ok((column.name().to_string(), value))
        })
        .collect()
}

#[async_trait::async_trait]
impl Store for Db {
    async fn execute(&self, sql: &str, params: &[Param]) -> Result<QueryResult> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = match param {
                Param::Null => query.bind(None::<i64>),
                Param::Int(value) => query.bind(*value),
                Param::Real(value) => query.bind(*value),
                Param::Text(value) => query.bind(value.clone()),
            };
        }

        if returns_rows(sql) {
            let rows = query
                .fetch_all(&self.pool)
                .await
                .with_context(|| format!("Query failed: {sql}"))?;
            let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
            Ok(QueryResult {
                rows,
                rows_affected: 0,
            })
        } else {
            let done = query
                .execute(&self.pool)
                .await
                .with_context(|| format!("Statement failed: {sql}"))?;
            Ok(QueryResult {
                rows: Vec::new(),
                rows_affected: done.rows_affected(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("statsync.sqlite");
        let db = Db::init(&path).await.unwrap();
        assert!(path.is_file());
        assert_eq!(schema_version(&db.pool).await.unwrap(), 1);
        drop(db);

        // A second init must not clobber the file.
        assert!(Db::init(&path).await.is_err());
        let db = Db::load(&path).await.unwrap();
        assert_eq!(schema_version(&db.pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(Db::load(dir.path().join("nope.sqlite")).await.is_err());
    }

    #[tokio::test]
    async fn test_execute_binds_and_decodes() {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("statsync.sqlite")).await.unwrap();
        let insert = "INSERT INTO statements (date, type, detail, item, amount, amount_converted) \
                      VALUES (?, ?, ?, ?, ?, ?)";
        let done = db
            .execute(
                insert,
                &[
                    Param::from("2024-01-05 10:00:00"),
                    Param::Int(1),
                    Param::from(""),
                    Param::Null,
                    Param::Real(12.5),
                    Param::Real(12.5),
                ],
            )
            .await
            .unwrap();
        assert_eq!(done.rows_affected, 1);

        let result = db
            .execute(
                "SELECT date, type, item, SUM(amount) AS total FROM statements WHERE type = ?",
                &[Param::Int(1)],
            )
            .await
            .unwrap();
        let row = result.first().unwrap();
        assert_eq!(row.str("date"), Some("2024-01-05 10:00:00"));
        assert_eq!(row.i64("type"), Some(1));
        assert_eq!(row.get("item"), Some(&Value::Null));
        assert_eq!(row.f64("total"), Some(12.5));
    }

    #[tokio::test]
    async fn test_execute_reports_sql_errors() {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("statsync.sqlite")).await.unwrap();
        let err = db.execute("SELECT * FROM nowhere", &[]).await.unwrap_err();
        assert!(format!("{err:#}").contains("nowhere"));
    }

    #[test]
    fn test_returns_rows() {
        assert!(returns_rows("  select 1"));
        assert!(returns_rows("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!returns_rows("UPDATE statements SET amount_converted = amount"));
        assert!(!returns_rows("SEL"));
    }
}
