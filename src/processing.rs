use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::remote::Remote;
use crate::response::{ApiResponse, paginated};
use crate::session::Session;

/// One page of the processes exposed by the retrieve API.
#[derive(Debug, Clone)]
pub struct Processes {
    response: ApiResponse,
}

paginated!(Processes);

impl Processes {
    pub(crate) fn get(session: Arc<Session>, query: &[(&str, String)]) -> Result<Self> {
        let url = session.endpoint("retrieve/v1/processes");
        Ok(Self {
            response: ApiResponse::get(session, &url, query)?,
        })
    }

    pub fn process_ids(&self) -> Vec<String> {
        self.response.ids("processes", "id")
    }
}

/// An executable operation with a constraint schema for valid requests.
#[derive(Debug, Clone)]
pub struct Process {
    response: ApiResponse,
}

impl Process {
    pub(crate) fn get(session: Arc<Session>, process_id: &str) -> Result<Self> {
        let url = process_url(&session, process_id);
        Self::get_url(session, &url)
    }

    pub(crate) fn get_url(session: Arc<Session>, url: &str) -> Result<Self> {
        let response = ApiResponse::get(session, url, &[])?;
        log_process_messages(&response.json);
        Ok(Self { response })
    }

    pub fn id(&self) -> &str {
        self.response
            .json
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        &self.response.url
    }

    pub fn json(&self) -> &Value {
        &self.response.json
    }

    /// Narrows `request` to the values still valid given the constraints.
    pub fn apply_constraints<R: Serialize + ?Sized>(&self, request: &R) -> Result<Value> {
        post_inputs(&self.response.session, &format!("{}/constraints", self.url()), request)
    }

    /// Asks the server what `request` would cost against the user's quotas.
    pub fn estimate_costs<R: Serialize + ?Sized>(&self, request: &R) -> Result<Value> {
        post_inputs(&self.response.session, &format!("{}/costing", self.url()), request)
    }

    /// Submits `request` for execution; the returned [`Remote`] tracks the job.
    pub fn submit<R: Serialize + ?Sized>(&self, request: &R) -> Result<Remote> {
        execute(self.response.session.clone(), self.url(), request)
    }
}

pub(crate) fn process_url(session: &Session, process_id: &str) -> String {
    session.resource("retrieve/v1/processes", process_id)
}

pub(crate) fn to_inputs<R: Serialize + ?Sized>(url: &str, request: &R) -> Result<Value> {
    serde_json::to_value(request).map_err(|source| Error::Json {
        url: url.to_string(),
        source,
    })
}

pub(crate) fn post_inputs<R: Serialize + ?Sized>(
    session: &Session,
    url: &str,
    request: &R,
) -> Result<Value> {
    let inputs = to_inputs(url, request)?;
    Ok(session.post(url, &json!({ "inputs": inputs }))?.json)
}

/// POST `{process_url}/execution` and wrap the created job.
pub(crate) fn execute<R: Serialize + ?Sized>(
    session: Arc<Session>,
    process_url: &str,
    request: &R,
) -> Result<Remote> {
    let url = format!("{}/execution", process_url.trim_end_matches('/'));
    let inputs = to_inputs(&url, request)?;
    let reply = session.post(&url, &json!({ "inputs": inputs.clone() }))?;
    let remote = Remote::from_job(session, &url, reply.json, Some(inputs))?;
    info!("Request ID is {}", remote.request_uid());
    Ok(remote)
}

fn log_process_messages(json: &Value) {
    if let Some(msg) = json.get("message").and_then(Value::as_str) {
        warn!("{}", msg.trim_start_matches("WARNING: "));
    }

    let messages = json
        .pointer("/metadata/datasetMetadata/messages")
        .and_then(Value::as_array);
    for m in messages.into_iter().flatten() {
        let content = m.get("content").and_then(Value::as_str).unwrap_or_default();
        let date = m.get("date").and_then(Value::as_str).unwrap_or_default();
        match m.get("severity").and_then(Value::as_str).unwrap_or("info") {
            "warning" => warn!("[{}] {}", date, content),
            "error" | "critical" => error!("[{}] {}", date, content),
            _ => info!("[{}] {}", date, content),
        }
    }
}
