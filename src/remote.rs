use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::response::{ApiResponse, link_href, paginated};
use crate::results::Results;
use crate::session::{Reply, Session};
use crate::util::{backoff, initial_sleep, parse_datetime, retry_after, urljoin};

/// Lifecycle of a server-side job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Accepted,
    Running,
    Successful,
    Failed,
    Rejected,
    Dismissed,
    Deleted,
}

impl JobStatus {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "accepted" => JobStatus::Accepted,
            "running" => JobStatus::Running,
            "successful" => JobStatus::Successful,
            "failed" => JobStatus::Failed,
            "rejected" => JobStatus::Rejected,
            "dismissed" => JobStatus::Dismissed,
            "deleted" => JobStatus::Deleted,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Accepted => "accepted",
            JobStatus::Running => "running",
            JobStatus::Successful => "successful",
            JobStatus::Failed => "failed",
            JobStatus::Rejected => "rejected",
            JobStatus::Dismissed => "dismissed",
            JobStatus::Deleted => "deleted",
        }
    }

    /// True once the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Accepted | JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of the user's jobs.
#[derive(Debug, Clone)]
pub struct Jobs {
    response: ApiResponse,
}

paginated!(Jobs);

impl Jobs {
    pub(crate) fn get(session: Arc<Session>, query: &[(&str, String)]) -> Result<Self> {
        let url = session.endpoint("retrieve/v1/jobs");
        Ok(Self {
            response: ApiResponse::get(session, &url, query)?,
        })
    }

    pub fn request_uids(&self) -> Vec<String> {
        self.response.ids("jobs", "jobID")
    }
}

/// Handle to an asynchronous job created by a submission.
///
/// Only the identity is stored; every status query goes back to the server.
#[derive(Debug)]
pub struct Remote {
    request_uid: String,
    url: String,
    collection_id: Option<String>,
    request: Option<Value>,
    deleted: AtomicBool,
    session: Arc<Session>,
}

impl Remote {
    /// Wraps a job document (submission reply or `GET jobs/{id}`).
    pub(crate) fn from_job(
        session: Arc<Session>,
        source_url: &str,
        job: Value,
        request: Option<Value>,
    ) -> Result<Self> {
        let request_uid = job
            .get("jobID")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::invalid(source_url, "missing jobID in job document"))?
            .to_string();

        let url = link_href(&job, "monitor")
            .map(|href| urljoin(source_url, &href))
            .unwrap_or_else(|| session.resource("retrieve/v1/jobs", &request_uid));
        let collection_id = job
            .get("processID")
            .and_then(Value::as_str)
            .map(str::to_string);
        let request = request.or_else(|| job.pointer("/metadata/request/ids").cloned());

        Ok(Self {
            request_uid,
            url,
            collection_id,
            request,
            deleted: AtomicBool::new(false),
            session,
        })
    }

    pub(crate) fn get(session: Arc<Session>, request_uid: &str) -> Result<Self> {
        let url = session.resource("retrieve/v1/jobs", request_uid);
        let reply = session.get(&url, &[("request", "true".to_string())])?;
        Self::from_job(session, &url, reply.json, None)
    }

    pub fn request_uid(&self) -> &str {
        &self.request_uid
    }

    /// Job URL used for monitoring.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn collection_id(&self) -> Option<&str> {
        self.collection_id.as_deref()
    }

    /// Request payload as submitted, when known.
    pub fn request(&self) -> Option<&Value> {
        self.request.as_ref()
    }

    fn fetch(&self) -> Result<Reply> {
        self.session.get(
            &self.url,
            &[("log", "true".to_string()), ("request", "true".to_string())],
        )
    }

    /// Fresh job document from the server.
    pub fn json(&self) -> Result<Value> {
        Ok(self.fetch()?.json)
    }

    pub fn status(&self) -> Result<JobStatus> {
        let reply = self.fetch()?;
        self.parse_status(&reply)
    }

    pub fn results_ready(&self) -> Result<bool> {
        Ok(self.status()? == JobStatus::Successful)
    }

    pub fn creation_datetime(&self) -> Result<Option<DateTime<Utc>>> {
        self.datetime("created")
    }

    pub fn start_datetime(&self) -> Result<Option<DateTime<Utc>>> {
        self.datetime("started")
    }

    pub fn end_datetime(&self) -> Result<Option<DateTime<Utc>>> {
        self.datetime("finished")
    }

    fn datetime(&self, field: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .json()?
            .get(field)
            .and_then(Value::as_str)
            .and_then(parse_datetime))
    }

    fn parse_status(&self, reply: &Reply) -> Result<JobStatus> {
        let raw = reply
            .json
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid(&reply.url, "missing job status"))?;
        JobStatus::parse(raw)
            .ok_or_else(|| Error::invalid(&reply.url, format!("unknown job status [{}]", raw)))
    }

    /// Dismisses the job on the server and returns its reply.
    pub fn delete(&self) -> Result<Value> {
        let reply = self.session.request(Method::DELETE, &self.url, &[], None)?;
        self.deleted.store(true, Ordering::Relaxed);
        Ok(reply.json)
    }

    /// Results of a job that already succeeded; does not wait.
    pub fn results(&self) -> Result<Results> {
        let reply = self.fetch()?;
        match self.parse_status(&reply)? {
            JobStatus::Successful => self.fetch_results(&reply.json),
            status => Err(Error::ResultsNotReady {
                request_uid: self.request_uid.clone(),
                status,
            }),
        }
    }

    /// Downloads the results of a job that already succeeded.
    pub fn download(&self, target: Option<&Path>) -> Result<PathBuf> {
        self.results()?.download(target)
    }

    /// Polls until the job is terminal.
    ///
    /// Sleeps `min(Retry-After or backoff, sleep_max)` between polls and gives up with
    /// [`Error::Timeout`] after `maximum_tries` status fetches.
    pub fn wait_on_results(&self) -> Result<Results> {
        let settings = self.session.settings;
        let max = settings.tries();
        let mut sleep = initial_sleep(settings.sleep_max);
        let mut last_status: Option<JobStatus> = None;
        let mut logged = 0usize;

        for attempt in 1..=max {
            let reply = self.fetch()?;
            logged = log_job_messages(&reply.json, logged);
            let status = self.parse_status(&reply)?;

            if last_status != Some(status) {
                info!("status has been updated to {}", status);
                last_status = Some(status);
            }

            match status {
                JobStatus::Successful => return self.fetch_results(&reply.json),
                JobStatus::Failed => return Err(self.failure(&reply.json)),
                JobStatus::Rejected | JobStatus::Dismissed | JobStatus::Deleted => {
                    return Err(Error::ProcessingFailed(format!(
                        "job {} is {}",
                        self.request_uid, status
                    )));
                }
                JobStatus::Accepted | JobStatus::Running => {
                    if attempt == max {
                        break;
                    }
                    let wait = retry_after(&reply.headers)
                        .unwrap_or(sleep)
                        .min(settings.sleep_max);
                    debug!("results not ready, waiting for {:?}", wait);
                    thread::sleep(wait);
                    sleep = backoff(sleep, settings.sleep_max);
                }
            }
        }

        Err(Error::Timeout {
            what: format!("job {} did not complete", self.request_uid),
            tries: max,
        })
    }

    fn results_url(&self, job: &Value) -> String {
        link_href(job, "results")
            .unwrap_or_else(|| format!("{}/results", self.url.trim_end_matches('/')))
    }

    fn fetch_results(&self, job: &Value) -> Result<Results> {
        Results::get(self.session.clone(), &self.results_url(job))
    }

    /// The results endpoint of a failed job carries the error title and traceback.
    fn failure(&self, job: &Value) -> Error {
        match self.session.get(&self.results_url(job), &[]) {
            Err(Error::Http { message, .. }) | Err(Error::NotFound { message, .. }) => {
                Error::ProcessingFailed(message)
            }
            Err(other) => other,
            Ok(_) => Error::ProcessingFailed("processing failed".to_string()),
        }
    }
}

impl Drop for Remote {
    fn drop(&mut self) {
        if self.session.settings.cleanup && !self.deleted.load(Ordering::Relaxed) {
            if let Err(e) = self.delete() {
                warn!("cleanup of job {} failed: {}", self.request_uid, e);
            }
        }
    }
}

/// Forwards server log lines past `already_logged`; returns the new count.
fn log_job_messages(job: &Value, already_logged: usize) -> usize {
    let Some(entries) = job.pointer("/metadata/log").and_then(Value::as_array) else {
        return already_logged;
    };
    for entry in entries.iter().skip(already_logged) {
        let text = match entry {
            Value::Array(pair) => pair.get(1).and_then(Value::as_str).unwrap_or_default(),
            Value::String(s) => s.as_str(),
            _ => continue,
        };
        if let Some(msg) = text.strip_prefix("WARNING: ") {
            warn!("{}", msg);
        } else if let Some(msg) = text.strip_prefix("ERROR: ") {
            error!("{}", msg);
        } else {
            info!("{}", text);
        }
    }
    entries.len().max(already_logged)
}
