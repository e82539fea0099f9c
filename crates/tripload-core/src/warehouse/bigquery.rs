//! BigQuery backend (REST v2 over curl).
//!
//! A load is `jobs.insert` with a load configuration, then `jobs.get` polling
//! until the job is DONE or the request deadline passes, then `tables.get`
//! for the row count.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};

use super::{LoadReport, LoadRequest, Warehouse};
use crate::error::{InfraError, LoadError};
use crate::http::{encode_segment, ApiClient, HttpResponse};

const BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com";

#[derive(Debug, Clone)]
pub struct BigQueryWarehouse {
    client: ApiClient,
    endpoint: String,
    location: Option<String>,
    poll_interval: Duration,
}

impl BigQueryWarehouse {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            endpoint: BIGQUERY_ENDPOINT.to_string(),
            location: None,
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Location jobs run in (must match the dataset location).
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn project_url(&self, project: &str) -> String {
        format!("{}/bigquery/v2/projects/{}", self.endpoint, encode_segment(project))
    }

    fn job_url(&self, project: &str, job: &JobReference) -> String {
        let mut url = format!("{}/jobs/{}", self.project_url(project), encode_segment(&job.job_id));
        if let Some(loc) = job.location.as_deref().or(self.location.as_deref()) {
            url.push_str("?location=");
            url.push_str(&encode_segment(loc));
        }
        url
    }

    fn wait_for_job(&self, project: &str, mut job: JobResource, deadline: Duration) -> Result<JobResource, LoadError> {
        let started = Instant::now();
        loop {
            if job.is_done() {
                return Ok(job);
            }
            if started.elapsed() >= deadline {
                return Err(LoadError::DeadlineExceeded {
                    job_id: job.job_reference.job_id,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            std::thread::sleep(self.poll_interval.min(deadline.saturating_sub(started.elapsed())));
            let resp = self.client.get(&self.job_url(project, &job.job_reference))?;
            job = parse_job(&resp)?;
        }
    }

    fn table_rows(&self, request: &LoadRequest<'_>) -> Option<u64> {
        let t = request.target;
        let url = format!(
            "{}/datasets/{}/tables/{}?fields=numRows",
            self.project_url(&t.project),
            encode_segment(&t.dataset),
            encode_segment(&t.table)
        );
        match self.client.get(&url) {
            Ok(resp) if resp.is_success() => resp
                .json::<TableResource>()
                .ok()
                .and_then(|t| t.num_rows)
                .and_then(|n| n.parse().ok()),
            Ok(resp) => {
                tracing::warn!(status = resp.status, table = %t.table_ref(), "could not read table row count");
                None
            }
            Err(e) => {
                tracing::warn!(table = %t.table_ref(), "could not read table row count: {}", e);
                None
            }
        }
    }
}

/// Load job configuration body for `jobs.insert`.
pub(crate) fn load_job_body(request: &LoadRequest<'_>, location: Option<&str>) -> Value {
    let t = request.target;
    let fields: Vec<Value> = t
        .schema
        .iter()
        .map(|f| {
            json!({
                "name": f.name,
                "type": f.field_type.as_api(),
                "description": f.description,
            })
        })
        .collect();

    let mut load = json!({
        "sourceUris": [request.source_uri],
        "destinationTable": {
            "projectId": t.project,
            "datasetId": t.dataset,
            "tableId": t.table,
        },
        "schema": { "fields": fields },
        "sourceFormat": t.source_format.as_api(),
        "autodetect": false,
        "writeDisposition": t.write_disposition.as_api(),
        "timePartitioning": { "type": "DAY", "field": t.partition_field },
        "ignoreUnknownValues": true,
        "maxBadRecords": request.max_bad_records,
    });
    if t.source_format == super::SourceFormat::Csv {
        load["skipLeadingRows"] = json!(1);
        load["fieldDelimiter"] = json!(",");
        load["allowQuotedNewlines"] = json!(true);
    }

    let mut job_reference = json!({ "projectId": t.project });
    if let Some(loc) = location {
        job_reference["location"] = json!(loc);
    }
    json!({
        "jobReference": job_reference,
        "configuration": { "load": load },
    })
}

impl Warehouse for BigQueryWarehouse {
    fn ensure_dataset(&self, project: &str, dataset: &str, location: &str) -> Result<(), InfraError> {
        let resource = format!("dataset {project}.{dataset}");
        let transport = |source| InfraError::Transport {
            resource: resource.clone(),
            source,
        };
        let datasets_url = format!("{}/datasets", self.project_url(project));

        let resp = self
            .client
            .get(&format!("{}/{}", datasets_url, encode_segment(dataset)))
            .map_err(transport)?;
        match resp.status {
            200 => {
                tracing::info!(project, dataset, "dataset exists");
                return Ok(());
            }
            403 => return Err(InfraError::Forbidden { resource }),
            404 => {}
            status => {
                return Err(InfraError::Status {
                    resource,
                    status,
                    message: resp.error_text(),
                })
            }
        }

        let body = json!({
            "datasetReference": { "projectId": project, "datasetId": dataset },
            "location": location,
        });
        let resp = self.client.post_json(&datasets_url, &body).map_err(transport)?;
        match resp.status {
            200 => {
                tracing::info!(project, dataset, location, "created dataset");
                Ok(())
            }
            // Created concurrently by someone else.
            409 => Ok(()),
            403 => Err(InfraError::Forbidden { resource }),
            status => Err(InfraError::Status {
                resource,
                status,
                message: resp.error_text(),
            }),
        }
    }

    fn load(&self, request: &LoadRequest<'_>) -> Result<LoadReport, LoadError> {
        let project = &request.target.project;
        let body = load_job_body(request, self.location.as_deref());
        let resp = self
            .client
            .post_json(&format!("{}/jobs", self.project_url(project)), &body)?;
        let job = parse_job(&resp)?;
        tracing::debug!(job_id = %job.job_reference.job_id, uri = request.source_uri, "load job submitted");

        let job = self.wait_for_job(project, job, request.deadline)?;
        if let Some(reason) = job.failure() {
            return Err(LoadError::JobFailed {
                job_id: job.job_reference.job_id,
                reason,
            });
        }

        Ok(LoadReport {
            source_uri: request.source_uri.to_string(),
            table: request.target.table_ref(),
            output_rows: job.output_rows(),
            table_rows: self.table_rows(request),
            job_id: job.job_reference.job_id,
        })
    }
}

fn parse_job(resp: &HttpResponse) -> Result<JobResource, LoadError> {
    if !resp.is_success() {
        return Err(LoadError::Status {
            status: resp.status,
            message: resp.error_text(),
        });
    }
    resp.json::<JobResource>()
        .map_err(|e| LoadError::Protocol(format!("job resource: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

impl JobResource {
    fn is_done(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "DONE")
    }

    /// Error summary of a finished job, if it failed.
    fn failure(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        let err = status.error_result.as_ref()?;
        let mut reason = err.describe();
        if let Some(errors) = &status.errors {
            let details: Vec<String> = errors.iter().take(5).map(ErrorProto::describe).collect();
            if !details.is_empty() {
                reason = format!("{reason} [{}]", details.join("; "));
            }
        }
        Some(reason)
    }

    fn output_rows(&self) -> Option<u64> {
        self.statistics
            .as_ref()?
            .load
            .as_ref()?
            .output_rows
            .as_deref()?
            .parse()
            .ok()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
    #[serde(default)]
    errors: Option<Vec<ErrorProto>>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorProto {
    fn describe(&self) -> String {
        match (self.reason.as_deref(), self.message.as_deref()) {
            (Some(r), Some(m)) => format!("{r}: {m}"),
            (Some(r), None) => r.to_string(),
            (None, Some(m)) => m.to_string(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    #[serde(default)]
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    #[serde(default)]
    output_rows: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    #[serde(default)]
    num_rows: Option<String>,
}
