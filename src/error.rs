use reqwest::StatusCode;
use thiserror::Error;

use crate::remote::JobStatus;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(String),

    #[error("API request failed: HTTP {status} for url ({url})\n{message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },

    #[error("resource not found (HTTP 404) for url ({url})\n{message}")]
    NotFound { url: String, message: String },

    #[error("gave up after {tries} tries: {what}")]
    Timeout { what: String, tries: usize },

    #[error("{0}")]
    ProcessingFailed(String),

    #[error("results not ready, job {request_uid} is {status}")]
    ResultsNotReady {
        request_uid: String,
        status: JobStatus,
    },

    #[error("download failed: downloaded {downloaded} byte(s) out of {expected}")]
    Download { downloaded: u64, expected: u64 },

    #[error("unexpected API response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("failed to parse API JSON (url={url})")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP transport error")]
    Transport(#[from] reqwest::Error),
}

impl Error {
    /// HTTP status code behind this error, if it came from a server reply.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::NotFound { .. } => Some(404),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn invalid(url: &str, reason: impl Into<String>) -> Self {
        Error::InvalidResponse {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Problem-details body returned by CADS on 4xx/5xx replies.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct CdsErrorResponse {
    #[serde(default, rename = "type")]
    pub(crate) kind: Option<String>,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<u16>,
    #[serde(default)]
    pub(crate) detail: Option<String>,
    #[serde(default)]
    pub(crate) instance: Option<String>,
    #[serde(default)]
    pub(crate) trace_id: Option<String>,
    #[serde(default)]
    pub(crate) traceback: Option<String>,
    // Some endpoints respond with {"message":...,"detail":...}
    #[serde(default)]
    pub(crate) message: Option<String>,
}

/// Maps a non-success reply to an [`Error`], keeping the raw body when it is not
/// a CADS problem-details document.
pub(crate) fn error_from_reply(status: StatusCode, url: &str, body: &str) -> Error {
    let message = match serde_json::from_str::<CdsErrorResponse>(body) {
        Ok(e) => describe_cds_error(status, &e),
        Err(_) => body.to_string(),
    };

    if status == StatusCode::NOT_FOUND {
        return Error::NotFound {
            url: url.to_string(),
            message,
        };
    }

    Error::Http {
        status: status.as_u16(),
        url: url.to_string(),
        message,
    }
}

fn describe_cds_error(status: StatusCode, e: &CdsErrorResponse) -> String {
    let title = e.title.as_deref().or(e.message.as_deref()).unwrap_or("");
    let detail = e.detail.as_deref().unwrap_or("");
    let trace = e.trace_id.as_deref().unwrap_or("(none)");
    let instance = e.instance.as_deref().unwrap_or("");
    let kind = e.kind.as_deref().unwrap_or("");
    let status_in_body = e.status.unwrap_or(status.as_u16());

    // Licence not accepted is extremely common; provide explicit remediation.
    let looks_like_licence = status == StatusCode::FORBIDDEN
        && (title.to_lowercase().contains("required licences")
            || detail.to_lowercase().contains("required licence")
            || detail.to_lowercase().contains("manage-licences"));
    if looks_like_licence {
        let link = detail
            .find("https://")
            .and_then(|idx| detail[idx..].split_whitespace().next())
            .unwrap_or("https://cds.climate.copernicus.eu/how-to-api");

        return format!(
            "required dataset licence(s) have not been accepted.\n\nHow to fix:\n1) Open and sign in: {}\n2) Accept the required licence(s), or call ApiClient::accept_licence\n3) Re-run this program\n\nServer message: {}\ntrace_id: {}",
            link, title, trace
        );
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return format!(
            "authentication/authorization failed (HTTP {}).\n- Check that CADS_API_KEY or the `key:` entry in .cadsapirc is a valid Personal Access Token\n- Ensure the token is not expired\n\nServer message: {}\n{}\nkind: {}\ninstance: {}\ntrace_id: {}",
            status_in_body, title, detail, kind, instance, trace
        );
    }

    if status == StatusCode::NOT_FOUND {
        return format!(
            "{}\n{}\n- If every request returns 404, check the configured base URL (e.g. https://cds.climate.copernicus.eu/api)",
            title, detail
        );
    }

    let mut out = title.to_string();
    if !detail.is_empty() {
        out.push('\n');
        out.push_str(detail);
    }
    if let Some(tb) = e.traceback.as_deref() {
        out.push('\n');
        out.push_str(tb);
    }
    out
}
