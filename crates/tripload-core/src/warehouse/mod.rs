//! Warehouse collaborators: load targets, load requests and the backend trait.

mod bigquery;

pub use bigquery::BigQueryWarehouse;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dataset::{self, DatasetKind, FileFormat};
use crate::error::{InfraError, InputError, LoadError};

/// Column type as understood by the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Int64,
    Numeric,
    Timestamp,
}

impl FieldType {
    pub fn as_api(&self) -> &'static str {
        match self {
            FieldType::String => "STRING",
            FieldType::Int64 => "INT64",
            FieldType::Numeric => "NUMERIC",
            FieldType::Timestamp => "TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub description: String,
}

impl SchemaField {
    pub fn new(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            description: description.to_string(),
        }
    }
}

/// How a load interacts with rows already in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteDisposition {
    #[default]
    Append,
    /// Replace table contents. Note that every per-file load replaces the
    /// previous one, so only the last file survives a multi-file run.
    Truncate,
    /// Fail unless the table is empty.
    Empty,
}

impl WriteDisposition {
    pub fn as_api(&self) -> &'static str {
        match self {
            WriteDisposition::Append => "WRITE_APPEND",
            WriteDisposition::Truncate => "WRITE_TRUNCATE",
            WriteDisposition::Empty => "WRITE_EMPTY",
        }
    }
}

impl fmt::Display for WriteDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteDisposition::Append => f.write_str("append"),
            WriteDisposition::Truncate => f.write_str("truncate"),
            WriteDisposition::Empty => f.write_str("empty"),
        }
    }
}

impl FromStr for WriteDisposition {
    type Err = InputError;

    /// Accepts the short names and the API names (`WRITE_APPEND`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.strip_prefix("write_").unwrap_or(&lower) {
            "append" => Ok(WriteDisposition::Append),
            "truncate" => Ok(WriteDisposition::Truncate),
            "empty" => Ok(WriteDisposition::Empty),
            _ => Err(InputError::UnknownDisposition(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Parquet,
}

impl SourceFormat {
    pub fn as_api(&self) -> &'static str {
        match self {
            SourceFormat::Csv => "CSV",
            SourceFormat::Parquet => "PARQUET",
        }
    }
}

impl From<FileFormat> for SourceFormat {
    fn from(f: FileFormat) -> Self {
        match f {
            FileFormat::CsvGz => SourceFormat::Csv,
            FileFormat::Parquet => SourceFormat::Parquet,
        }
    }
}

/// Destination of every load in a run. Resolved once from the dataset kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTarget {
    pub project: String,
    pub dataset: String,
    pub table: String,
    pub partition_field: String,
    pub schema: Vec<SchemaField>,
    pub source_format: SourceFormat,
    pub write_disposition: WriteDisposition,
}

impl LoadTarget {
    pub fn for_kind(
        kind: DatasetKind,
        format: FileFormat,
        project: &str,
        dataset: &str,
        write_disposition: WriteDisposition,
    ) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: dataset::table_name(kind),
            partition_field: dataset::partition_field(kind).to_string(),
            schema: dataset::schema_for(kind),
            source_format: format.into(),
            write_disposition,
        }
    }

    /// `project.dataset.table`
    pub fn table_ref(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// One load job: a staged object into the target table.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    pub source_uri: &'a str,
    pub target: &'a LoadTarget,
    /// Malformed rows tolerated before the job fails.
    pub max_bad_records: u32,
    /// How long to wait for the job to reach a terminal state.
    pub deadline: Duration,
}

/// Outcome of a finished load job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub source_uri: String,
    pub table: String,
    pub job_id: String,
    /// Rows written by this job, when reported.
    pub output_rows: Option<u64>,
    /// Table row count after the job, when readable.
    pub table_rows: Option<u64>,
}

/// Capabilities the pipeline needs from a warehouse.
pub trait Warehouse: Send + Sync {
    /// Make sure `project.dataset` exists in `location`, creating it if missing.
    fn ensure_dataset(&self, project: &str, dataset: &str, location: &str) -> Result<(), InfraError>;

    /// Run one load job and block until it finishes or the deadline passes.
    fn load(&self, request: &LoadRequest<'_>) -> Result<LoadReport, LoadError>;
}
