//! # Database collaborator
//!
//! The pipeline talks to the database through the [`Database`] trait: fetch a
//! schema description, run one statement and get the rows back as text. The text
//! form is one parenthesized tuple per row:
//!
//! ```text
//! (1, 'Cardiology', NULL)
//! (2, "O'Brien Wing", 12.50)
//! ```
//!
//! [`MySqlDatabase`] is the production implementation on top of an `sqlx` MySQL
//! pool. Its lifecycle is explicit: [`MySqlDatabase::connect`] opens the pool and
//! [`MySqlDatabase::disconnect`] closes it. The pipeline never does either.
//!
//! Every statement is bounded by `query_timeout_secs`.

use crate::{config::DrQueryConfig, error::DatabaseError, parser::escape_field};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{
    Column, Row, TypeInfo,
    mysql::{MySqlPool, MySqlPoolOptions, MySqlRow},
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Live database access used by the pipeline.
#[async_trait]
pub trait Database: Send + Sync {
    /// Human-readable description of every table, fetched fresh on each call.
    async fn schema(&self) -> Result<String, DatabaseError>;

    /// Run one statement and render its rows, one tuple per line.
    async fn run(&self, sql: &str) -> Result<String, DatabaseError>;
}

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Exact decimal, kept as its canonical text.
    Decimal(String),
    Text(String),
}

impl SqlValue {
    /// Render as a tuple element: numbers bare, text quoted, `NULL` for nulls.
    ///
    /// Text containing a single quote (and no double quote) is wrapped in double quotes.
    /// Line breaks and backslashes are escaped with [`escape_field`] so a value never
    /// spills onto the next row's line.
    pub fn render(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::UInt(v) => v.to_string(),
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Decimal(v) => v.clone(),
            SqlValue::Text(v) => {
                let v = escape_field(v);
                if v.contains('\'') && !v.contains('"') {
                    format!("\"{v}\"")
                } else {
                    format!("'{v}'")
                }
            }
        }
    }
}

/// Render one row as `(v1, v2, ...)`.
pub fn render_row(values: &[SqlValue]) -> String {
    let fields: Vec<String> = values.iter().map(SqlValue::render).collect();
    format!("({})", fields.join(", "))
}

/// Render rows one per line. No rows renders as the empty string.
pub fn render_rows(rows: &[Vec<SqlValue>]) -> String {
    rows.iter()
        .map(|row| render_row(row))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One table's entry in the schema description: its DDL followed by example rows.
pub fn render_table_info(
    table: &str,
    create_statement: &str,
    columns: &[String],
    sample_rows: &[Vec<SqlValue>],
) -> String {
    let mut info = create_statement.trim_end().to_string();
    info.push_str(&format!(
        "\n\n/*\n{} rows from {} table:\n{}",
        sample_rows.len(),
        table,
        columns.join("\t")
    ));
    for row in sample_rows {
        let cells: Vec<String> = row
            .iter()
            .map(|value| match value {
                SqlValue::Text(text) => text.clone(),
                other => other.render(),
            })
            .collect();
        info.push('\n');
        info.push_str(&cells.join("\t"));
    }
    info.push_str("\n*/");
    info
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Decode column `index` of `row`, trying the common MySQL types in turn.
fn decode_value(row: &MySqlRow, index: usize) -> Result<SqlValue, DatabaseError> {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Text));
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Int));
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::UInt));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Float));
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |f| SqlValue::Float(f64::from(f))));
    }
    if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |d| SqlValue::Decimal(d.to_string())));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |dt| SqlValue::Text(dt.to_string())));
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |dt| SqlValue::Text(dt.naive_utc().to_string())));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |d| SqlValue::Text(d.to_string())));
    }
    if let Ok(v) = row.try_get::<Option<NaiveTime>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |t| SqlValue::Text(t.to_string())));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |b| SqlValue::Int(i64::from(b))));
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, |bytes| {
            SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        }));
    }

    let column = row.columns().get(index);
    Err(DatabaseError::Decode {
        column: column.map(|c| c.name().to_string()).unwrap_or_else(|| index.to_string()),
        message: format!(
            "unsupported type {}",
            column.map(|c| c.type_info().name()).unwrap_or("unknown")
        ),
    })
}

fn decode_row(row: &MySqlRow) -> Result<Vec<SqlValue>, DatabaseError> {
    (0..row.columns().len())
        .map(|index| decode_value(row, index))
        .collect()
}

/// MySQL access over an `sqlx` pool.
pub struct MySqlDatabase {
    url: String,
    pool: Option<MySqlPool>,
    query_timeout_secs: u64,
    schema_sample_rows: u32,
}

impl MySqlDatabase {
    /// A disconnected handle. Call [`MySqlDatabase::connect`] before use.
    pub fn new(config: &DrQueryConfig) -> Self {
        Self {
            url: config.database_url.clone(),
            pool: None,
            query_timeout_secs: config.query_timeout_secs,
            schema_sample_rows: config.schema_sample_rows,
        }
    }

    /// Open the pool and verify it with `SELECT 1`.
    ///
    /// # Errors
    /// [`DatabaseError::Connect`] if the server is unreachable or rejects the credentials.
    pub async fn connect(&mut self) -> Result<(), DatabaseError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(self.query_timeout_secs))
            .connect(&self.url)
            .await
            .map_err(|e| DatabaseError::Connect(e.to_string()))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| DatabaseError::Connect(e.to_string()))?;

        info!("Connected to MySQL");
        self.pool = Some(pool);
        Ok(())
    }

    /// Close the pool. A no-op when not connected.
    pub async fn disconnect(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            info!("Disconnected from MySQL");
        }
    }

    fn pool(&self) -> Result<&MySqlPool, DatabaseError> {
        self.pool.as_ref().ok_or(DatabaseError::NotConnected)
    }

    async fn fetch_all(&self, sql: &str) -> Result<Vec<MySqlRow>, DatabaseError> {
        let pool = self.pool()?;
        tokio::time::timeout(
            Duration::from_secs(self.query_timeout_secs),
            sqlx::query(sql).fetch_all(pool),
        )
        .await
        .map_err(|_| DatabaseError::Timeout(self.query_timeout_secs))?
        .map_err(|e| DatabaseError::Query(e.to_string()))
    }

    /// Names of the tables in the connected database.
    pub async fn table_names(&self) -> Result<Vec<String>, DatabaseError> {
        self.fetch_all("SHOW TABLES")
            .await?
            .iter()
            .map(|row| {
                row.try_get::<String, _>(0).map_err(|e| DatabaseError::Decode {
                    column: "table_name".to_string(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    async fn table_info(&self, table: &str) -> Result<String, DatabaseError> {
        let quoted = quote_identifier(table);

        let create_rows = self.fetch_all(&format!("SHOW CREATE TABLE {quoted}")).await?;
        let create_statement = create_rows
            .first()
            .and_then(|row| row.try_get::<String, _>(1).ok())
            .unwrap_or_default();

        let mut columns = Vec::new();
        let mut samples = Vec::new();
        if self.schema_sample_rows > 0 {
            let rows = self
                .fetch_all(&format!(
                    "SELECT * FROM {quoted} LIMIT {}",
                    self.schema_sample_rows
                ))
                .await?;
            if let Some(first) = rows.first() {
                columns = first.columns().iter().map(|c| c.name().to_string()).collect();
            }
            for row in &rows {
                match decode_row(row) {
                    Ok(values) => samples.push(values),
                    Err(err) => warn!("Skipping sample row of {}: {}", table, err),
                }
            }
        }

        Ok(render_table_info(table, &create_statement, &columns, &samples))
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn schema(&self) -> Result<String, DatabaseError> {
        let tables = self.table_names().await?;
        debug!("Describing {} tables", tables.len());

        let mut descriptions = Vec::with_capacity(tables.len());
        for table in &tables {
            descriptions.push(self.table_info(table).await?);
        }
        Ok(descriptions.join("\n\n"))
    }

    async fn run(&self, sql: &str) -> Result<String, DatabaseError> {
        let rows = self.fetch_all(sql).await?;
        let decoded = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Statement returned {} rows", decoded.len());
        Ok(render_rows(&decoded))
    }
}
