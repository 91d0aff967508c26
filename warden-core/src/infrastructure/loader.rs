// warden-core/src/infrastructure/loader.rs
//
// Tabular loader on embedded DuckDB: CSV, Parquet and JSON land in a
// scratch in-memory table, get widened to the gate's column types and are
// pulled out as an in-memory `Table`. Files over the sampling threshold
// are read through a uniform bernoulli sample.

use std::path::Path;

use chrono::NaiveDateTime;
use duckdb::Connection;
use tracing::{debug, instrument};

use crate::domain::table::{Column, ColumnType, Table, Value};
use crate::infrastructure::error::InfrastructureError;

const SCRATCH_TABLE: &str = "loaded_file";

pub struct TabularLoader {
    sampling_threshold_mb: f64,
    sample_rate: f64,
}

impl Default for TabularLoader {
    fn default() -> Self {
        Self {
            sampling_threshold_mb: 500.0,
            sample_rate: 0.1,
        }
    }
}

impl TabularLoader {
    pub fn new(sampling_threshold_mb: f64, sample_rate: f64) -> Self {
        Self {
            sampling_threshold_mb,
            sample_rate,
        }
    }

    /// Load a data file, sampling when `size_bytes` exceeds the threshold
    /// (strictly greater: a file exactly at the threshold loads fully).
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn load(&self, path: &Path, size_bytes: u64) -> Result<Table, InfrastructureError> {
        let read_expr = Self::reader_expression(path)?;
        let threshold_bytes = (self.sampling_threshold_mb * 1024.0 * 1024.0) as u64;
        let sampled = size_bytes > threshold_bytes;

        let source = if sampled {
            format!(
                "SELECT * FROM {read_expr} USING SAMPLE {} PERCENT (bernoulli)",
                self.sample_rate * 100.0
            )
        } else {
            format!("SELECT * FROM {read_expr}")
        };

        let conn = Connection::open_in_memory().map_err(|e| load_error(path, e))?;
        conn.execute(
            &format!("CREATE OR REPLACE TABLE {SCRATCH_TABLE} AS {source}"),
            [],
        )
        .map_err(|e| load_error(path, e))?;

        let schema = Self::describe(&conn, path)?;
        let table = Self::fetch(&conn, path, &schema, sampled, self.sample_rate)?;
        debug!(
            rows = table.rows_loaded,
            columns = table.columns.len(),
            sampled,
            "Loaded data file"
        );
        Ok(table)
    }

    fn reader_expression(path: &Path) -> Result<String, InfrastructureError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let raw = path.to_string_lossy().replace('\'', "''");
        let reader = match ext.as_str() {
            "csv" => "read_csv_auto",
            "parquet" => "read_parquet",
            "json" | "jsonl" | "ndjson" => "read_json_auto",
            other => {
                return Err(InfrastructureError::LoadError {
                    path: path.display().to_string(),
                    detail: format!("Unsupported file type: .{other}"),
                });
            }
        };
        Ok(format!("{reader}('{raw}')"))
    }

    fn describe(
        conn: &Connection,
        path: &Path,
    ) -> Result<Vec<(String, ColumnType)>, InfrastructureError> {
        let mut stmt = conn
            .prepare(&format!("DESCRIBE {SCRATCH_TABLE}"))
            .map_err(|e| load_error(path, e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| load_error(path, e))?;

        let mut schema = Vec::new();
        for row in rows {
            let (name, raw_type) = row.map_err(|e| load_error(path, e))?;
            schema.push((name, Self::widen(&raw_type)));
        }
        Ok(schema)
    }

    /// DuckDB's type zoo collapsed onto the gate's widened column types.
    /// Anything exotic is read as text.
    fn widen(raw: &str) -> ColumnType {
        let base = raw.split('(').next().unwrap_or(raw).trim().to_uppercase();
        match base.as_str() {
            "TINYINT" | "SMALLINT" | "INTEGER" | "BIGINT" | "HUGEINT" | "UTINYINT"
            | "USMALLINT" | "UINTEGER" | "UBIGINT" => ColumnType::Integer,
            "FLOAT" | "DOUBLE" | "REAL" | "DECIMAL" => ColumnType::Float,
            "BOOLEAN" => ColumnType::Boolean,
            "TIMESTAMP" | "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" | "DATE" | "DATETIME" => {
                ColumnType::Timestamp
            }
            _ => ColumnType::Text,
        }
    }

    fn fetch(
        conn: &Connection,
        path: &Path,
        schema: &[(String, ColumnType)],
        sampled: bool,
        sample_rate: f64,
    ) -> Result<Table, InfrastructureError> {
        // Select with explicit casts so extraction only ever sees the five
        // widened types. Timestamps come back as text and are parsed.
        let select_list: Vec<String> = schema
            .iter()
            .map(|(name, dtype)| {
                let quoted = format!("\"{}\"", name.replace('"', "\"\""));
                match dtype {
                    ColumnType::Integer => format!("CAST({quoted} AS BIGINT)"),
                    ColumnType::Float => format!("CAST({quoted} AS DOUBLE)"),
                    ColumnType::Boolean => format!("CAST({quoted} AS BOOLEAN)"),
                    ColumnType::Timestamp => format!("CAST({quoted} AS VARCHAR)"),
                    ColumnType::Text => format!("CAST({quoted} AS VARCHAR)"),
                }
            })
            .collect();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM {SCRATCH_TABLE}",
                select_list.join(", ")
            ))
            .map_err(|e| load_error(path, e))?;
        let mut rows = stmt.query([]).map_err(|e| load_error(path, e))?;

        let mut columns: Vec<Column> = schema
            .iter()
            .map(|(name, dtype)| Column {
                name: name.clone(),
                dtype: *dtype,
                values: Vec::new(),
            })
            .collect();
        let mut row_count = 0usize;

        while let Some(row) = rows.next().map_err(|e| load_error(path, e))? {
            for (i, (_, dtype)) in schema.iter().enumerate() {
                let value = match dtype {
                    ColumnType::Integer => row
                        .get::<_, Option<i64>>(i)
                        .map_err(|e| load_error(path, e))?
                        .map_or(Value::Null, Value::Int),
                    ColumnType::Float => row
                        .get::<_, Option<f64>>(i)
                        .map_err(|e| load_error(path, e))?
                        .map_or(Value::Null, Value::Float),
                    ColumnType::Boolean => row
                        .get::<_, Option<bool>>(i)
                        .map_err(|e| load_error(path, e))?
                        .map_or(Value::Null, Value::Bool),
                    ColumnType::Timestamp => row
                        .get::<_, Option<String>>(i)
                        .map_err(|e| load_error(path, e))?
                        .map_or(Value::Null, |s| Self::parse_timestamp(&s)),
                    ColumnType::Text => row
                        .get::<_, Option<String>>(i)
                        .map_err(|e| load_error(path, e))?
                        .map_or(Value::Null, Value::Text),
                };
                columns[i].values.push(value);
            }
            row_count += 1;
        }

        Ok(Table {
            columns,
            rows_loaded: row_count,
            sampled,
            sample_rate: if sampled { sample_rate } else { 1.0 },
        })
    }

    fn parse_timestamp(raw: &str) -> Value {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
            .or_else(|_| {
                chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
            })
            .map(Value::Timestamp)
            // Unparseable temporal text survives as text rather than data loss
            .unwrap_or_else(|_| Value::Text(raw.to_string()))
    }
}

fn load_error(path: &Path, e: duckdb::Error) -> InfrastructureError {
    InfrastructureError::LoadError {
        path: path.display().to_string(),
        detail: e.to_string(),
    }
}
