//! Dataset identity: kinds, monthly periods and the work items built from them.
//!
//! A `WorkItem` is one monthly trip-record file. Its local file name and its
//! object key are both derived from it, so every item owns exactly one local
//! path and one remote key.

mod periods;
mod schema;

pub use periods::parse_periods;
pub use schema::{partition_field, schema_for, table_name};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Trip record dataset published by the TLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Yellow,
    Green,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Yellow => "yellow",
            DatasetKind::Green => "green",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yellow" => Ok(DatasetKind::Yellow),
            "green" => Ok(DatasetKind::Green),
            _ => Err(InputError::UnknownKind(s.to_string())),
        }
    }
}

/// Calendar month in [1, 12]. Displays as a two-digit token ("01".."12").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(u8);

impl Period {
    pub fn new(month: u8) -> Result<Self, InputError> {
        if (1..=12).contains(&month) {
            Ok(Period(month))
        } else {
            Err(InputError::InvalidPeriod(month.to_string()))
        }
    }

    pub fn month(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// On-disk format of the published files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Gzip-compressed CSV with a header row.
    CsvGz,
    Parquet,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::CsvGz => "csv.gz",
            FileFormat::Parquet => "parquet",
        }
    }
}

/// One retrievable file: dataset kind, year and month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub kind: DatasetKind,
    pub year: u16,
    pub period: Period,
}

impl WorkItem {
    pub fn new(kind: DatasetKind, year: u16, period: Period) -> Self {
        Self { kind, year, period }
    }

    /// Expand a month expression ("1-6", "01,02") into items, in expression order.
    pub fn expand(kind: DatasetKind, year: u16, months: &str) -> Result<Vec<WorkItem>, InputError> {
        Ok(parse_periods(months)?
            .into_iter()
            .map(|period| WorkItem::new(kind, year, period))
            .collect())
    }

    /// File name shared by the origin, the local download and the object key,
    /// e.g. `yellow_tripdata_2021-03.csv.gz`.
    pub fn file_name(&self, format: FileFormat) -> String {
        format!(
            "{}_tripdata_{}-{}.{}",
            self.kind,
            self.year,
            self.period,
            format.extension()
        )
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{}", self.kind, self.year, self.period)
    }
}
