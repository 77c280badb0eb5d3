//! Relational data sources
//!
//! A [`DataSource`] turns a query string into a polars frame. The SQL source
//! talks to anything `sqlx`'s `Any` driver understands; the CSV source reads
//! a local snapshot and exists for offline runs.

use async_trait::async_trait;
use polars::prelude::*;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column as _, Row, TypeInfo as _};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ChurnflowError, Result};
use crate::utils::DataLoader;

/// Substitute the comma-joined column list into the `{columns}` placeholder
pub fn build_query(base_query: &str, columns: &[String]) -> String {
    base_query.replace("{columns}", &columns.join(", "))
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<DataFrame>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// Pooled SQL connection
pub struct SqlDataSource {
    pool: AnyPool,
    url: String,
}

impl SqlDataSource {
    /// Connect to a database URL (`mysql://`, `sqlite://`)
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(30))
            .connect(url)
            .await?;
        info!(source = %redact(url), "Connected to data source");
        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    /// Build the pool without connecting; the first query opens a connection
    pub fn connect_lazy(url: &str, max_connections: u32) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(30))
            .connect_lazy(url)?;
        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    pub fn from_pool(pool: AnyPool, url: impl Into<String>) -> Self {
        Self {
            pool,
            url: url.into(),
        }
    }
}

/// Drop credentials from a connection URL
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

/// Decode a cell by trying integer, float, text and boolean in turn
///
/// A value none of those can hold (blobs, say) is a query error rather than
/// a null, so it never reaches validation disguised as a missing value.
fn read_cell(row: &AnyRow, idx: usize) -> Result<Cell> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return Ok(v.map_or(Cell::Null, Cell::Int));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return Ok(v.map_or(Cell::Null, Cell::Float));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return Ok(v.map_or(Cell::Null, Cell::Text));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return Ok(v.map_or(Cell::Null, Cell::Bool));
    }
    let column = &row.columns()[idx];
    Err(ChurnflowError::QueryError(format!(
        "Column '{}' has SQL type {} which cannot be decoded as a number, text or boolean",
        column.name(),
        column.type_info().name()
    )))
}

/// Build a typed column from decoded cells
///
/// The first non-null cell picks the dtype. Integer columns widen to float
/// when a float shows up; text columns stringify anything else. An all-null
/// column becomes float.
fn cells_to_column(name: &str, cells: Vec<Cell>) -> Result<Column> {
    let first = cells.iter().find(|c| **c != Cell::Null).cloned();
    let has_float = cells.iter().any(|c| matches!(c, Cell::Float(_)));
    let name: PlSmallStr = name.into();

    let column = match first {
        Some(Cell::Text(_)) => {
            let values: Vec<Option<String>> = cells
                .into_iter()
                .map(|c| match c {
                    Cell::Null => None,
                    Cell::Text(s) => Some(s),
                    Cell::Int(v) => Some(v.to_string()),
                    Cell::Float(v) => Some(v.to_string()),
                    Cell::Bool(v) => Some(v.to_string()),
                })
                .collect();
            Column::new(name, values)
        }
        Some(Cell::Bool(_)) => {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Bool(v) => Ok(Some(*v)),
                    Cell::Null => Ok(None),
                    other => Err(mixed(&name, other)),
                })
                .collect::<Result<_>>()?;
            Column::new(name, values)
        }
        Some(Cell::Int(_)) if !has_float => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Int(v) => Ok(Some(*v)),
                    Cell::Null => Ok(None),
                    other => Err(mixed(&name, other)),
                })
                .collect::<Result<_>>()?;
            Column::new(name, values)
        }
        _ => {
            let values: Vec<Option<f64>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Int(v) => Ok(Some(*v as f64)),
                    Cell::Float(v) => Ok(Some(*v)),
                    Cell::Null => Ok(None),
                    other => Err(mixed(&name, other)),
                })
                .collect::<Result<_>>()?;
            Column::new(name, values)
        }
    };
    Ok(column)
}

fn mixed(name: &str, cell: &Cell) -> ChurnflowError {
    ChurnflowError::DataError(format!(
        "Column '{}' mixes incompatible value types ({:?})",
        name, cell
    ))
}

fn rows_to_frame(rows: &[AnyRow]) -> Result<DataFrame> {
    let Some(first) = rows.first() else {
        return Ok(DataFrame::empty());
    };
    let names: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();

    let columns = names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let cells = rows
                .iter()
                .map(|row| read_cell(row, idx))
                .collect::<Result<Vec<_>>>()?;
            cells_to_column(name, cells)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DataFrame::new(columns)?)
}

#[async_trait]
impl DataSource for SqlDataSource {
    async fn fetch(&self, query: &str) -> Result<DataFrame> {
        debug!(query, "Running ingestion query");
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        rows_to_frame(&rows)
    }

    fn describe(&self) -> String {
        redact(&self.url)
    }
}

/// Local CSV snapshot; the query text is ignored
pub struct CsvDataSource {
    path: PathBuf,
}

impl CsvDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataSource for CsvDataSource {
    async fn fetch(&self, _query: &str) -> Result<DataFrame> {
        if !self.path.exists() {
            return Err(ChurnflowError::SourceUnavailable(format!(
                "CSV snapshot not found: {}",
                self.path.display()
            )));
        }
        DataLoader::new().load_csv(&self.path)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query() {
        let columns = vec!["A".to_string(), "B".to_string()];
        assert_eq!(
            build_query("SELECT {columns} FROM churners", &columns),
            "SELECT A, B FROM churners"
        );
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("mysql://user:secret@db:3306/churn"),
            "mysql://***@db:3306/churn"
        );
        assert_eq!(redact("sqlite://churn.db"), "sqlite://churn.db");
    }

    #[test]
    fn test_cells_to_column_types() {
        let ints = cells_to_column("a", vec![Cell::Null, Cell::Int(1), Cell::Int(2)]).unwrap();
        assert_eq!(ints.dtype(), &DataType::Int64);
        assert_eq!(ints.null_count(), 1);

        let widened = cells_to_column("b", vec![Cell::Int(1), Cell::Float(2.5)]).unwrap();
        assert_eq!(widened.dtype(), &DataType::Float64);

        let text = cells_to_column("c", vec![Cell::Text("x".into()), Cell::Int(3)]).unwrap();
        assert_eq!(text.dtype(), &DataType::String);

        let empty = cells_to_column("d", vec![Cell::Null, Cell::Null]).unwrap();
        assert_eq!(empty.dtype(), &DataType::Float64);

        assert!(cells_to_column("e", vec![Cell::Bool(true), Cell::Text("x".into())]).is_err());
    }

    #[tokio::test]
    async fn test_sqlite_source() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("churn.db").display());
        let source = SqlDataSource::connect(&url, 1).await.unwrap();

        sqlx::query("CREATE TABLE churners (A INTEGER, B REAL, flag TEXT)")
            .execute(&source.pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO churners VALUES (1, 0.5, 'x'), (2, 1.5, 'y')")
            .execute(&source.pool)
            .await
            .unwrap();

        let df = source
            .fetch("SELECT A, B, flag FROM churners ORDER BY A")
            .await
            .unwrap();
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("A").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("B").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("flag").unwrap().dtype(), &DataType::String);
    }

    #[tokio::test]
    async fn test_undecodable_column_is_a_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("churn.db").display());
        let source = SqlDataSource::connect(&url, 1).await.unwrap();

        sqlx::query("CREATE TABLE churners (A INTEGER, payload BLOB)")
            .execute(&source.pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO churners VALUES (1, x'00ff'), (2, x'beef')")
            .execute(&source.pool)
            .await
            .unwrap();

        let err = source
            .fetch("SELECT A, payload FROM churners ORDER BY A")
            .await
            .unwrap_err();
        assert!(matches!(err, ChurnflowError::QueryError(_)));
        assert!(err.to_string().contains("payload"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_csv_is_unavailable() {
        let source = CsvDataSource::new("/nonexistent/churners.csv");
        let err = source.fetch("").await.unwrap_err();
        assert!(err.is_transient());
    }
}
