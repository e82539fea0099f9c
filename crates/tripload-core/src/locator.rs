//! Origin URL construction.
//!
//! Maps (kind, year, month) to the download URL of a mirror. Two mirrors are
//! known: the DataTalksClub GitHub releases (gzip CSV) and the TLC CloudFront
//! bucket (Parquet). The host root can be overridden, the path layout cannot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetKind, FileFormat, Period, WorkItem};
use crate::error::InputError;

/// Known dataset mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginLayout {
    /// `https://github.com/DataTalksClub/nyc-tlc-data/releases/download/{kind}/{kind}_tripdata_{year}-{MM}.csv.gz`
    #[default]
    DataTalksClub,
    /// `https://d37ci6vzurychx.cloudfront.net/trip-data/{kind}_tripdata_{year}-{MM}.parquet`
    Tlc,
}

impl OriginLayout {
    pub fn default_root(&self) -> &'static str {
        match self {
            OriginLayout::DataTalksClub => "https://github.com/DataTalksClub/nyc-tlc-data/releases/download",
            OriginLayout::Tlc => "https://d37ci6vzurychx.cloudfront.net",
        }
    }

    pub fn format(&self) -> FileFormat {
        match self {
            OriginLayout::DataTalksClub => FileFormat::CsvGz,
            OriginLayout::Tlc => FileFormat::Parquet,
        }
    }
}

impl fmt::Display for OriginLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginLayout::DataTalksClub => f.write_str("datatalksclub"),
            OriginLayout::Tlc => f.write_str("tlc"),
        }
    }
}

impl FromStr for OriginLayout {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "datatalksclub" => Ok(OriginLayout::DataTalksClub),
            "tlc" => Ok(OriginLayout::Tlc),
            _ => Err(InputError::UnknownOrigin(s.to_string())),
        }
    }
}

/// Builds deterministic origin URLs for one mirror.
#[derive(Debug, Clone)]
pub struct Locator {
    layout: OriginLayout,
    root: String,
}

impl Locator {
    pub fn new(layout: OriginLayout) -> Self {
        Self {
            layout,
            root: layout.default_root().to_string(),
        }
    }

    /// Same layout served from another host root (e.g. a local test server).
    pub fn with_root(layout: OriginLayout, root: &str) -> Result<Self, InputError> {
        let parsed = url::Url::parse(root).map_err(|e| InputError::InvalidBaseUrl(format!("{root}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(InputError::InvalidBaseUrl(format!("{root}: not an http(s) URL")));
        }
        Ok(Self {
            layout,
            root: root.trim_end_matches('/').to_string(),
        })
    }

    pub fn format(&self) -> FileFormat {
        self.layout.format()
    }

    /// URL prefix shared by all months of a year; the month token and
    /// extension complete it.
    pub fn base_url(&self, kind: DatasetKind, year: u16) -> String {
        match self.layout {
            OriginLayout::DataTalksClub => {
                format!("{}/{kind}/{kind}_tripdata_{year}-", self.root)
            }
            OriginLayout::Tlc => format!("{}/trip-data/{kind}_tripdata_{year}-", self.root),
        }
    }

    /// `{base_url}{MM}.{ext}`
    pub fn locate(&self, kind: DatasetKind, year: u16, period: Period) -> String {
        format!(
            "{}{}.{}",
            self.base_url(kind, year),
            period,
            self.format().extension()
        )
    }

    pub fn url_for(&self, item: &WorkItem) -> String {
        self.locate(item.kind, item.year, item.period)
    }
}
