use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, RANGE, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result, error_from_reply};
use crate::util::{push_segment, retriable_status, retry_after};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    /// Per-request timeout.
    pub(crate) timeout: Duration,
    /// Attempts for transient HTTP failures, and status fetches while polling.
    pub(crate) maximum_tries: usize,
    /// Upper bound of any single sleep.
    pub(crate) sleep_max: Duration,
    /// Wait between transient retries when the server sends no `Retry-After`.
    pub(crate) retry_after: Duration,
    pub(crate) progress: bool,
    pub(crate) cleanup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            maximum_tries: 500,
            sleep_max: Duration::from_secs(120),
            retry_after: Duration::from_secs(120),
            progress: true,
            cleanup: false,
        }
    }
}

impl Settings {
    pub(crate) fn tries(&self) -> usize {
        self.maximum_tries.max(1)
    }

    pub(crate) fn retry_sleep(&self, hint: Option<Duration>) -> Duration {
        hint.unwrap_or(self.retry_after).min(self.sleep_max)
    }
}

/// A decoded JSON reply.
#[derive(Debug, Clone)]
pub(crate) struct Reply {
    pub(crate) url: String,
    pub(crate) headers: HeaderMap,
    pub(crate) json: Value,
}

/// Authenticated connection to one API deployment, shared by every resource handle.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    base_url: String,
    key: String,
    http: HttpClient,
    pub(crate) settings: Settings,
}

impl Session {
    pub(crate) fn new(cfg: ClientConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cads-api-client-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("cads-api-client-rs")),
        );

        let mut builder = HttpClient::builder().default_headers(default_headers);
        if !cfg.verify {
            warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;

        Ok(Self {
            base_url: cfg.url.trim_end_matches('/').to_string(),
            key: cfg.key,
            http,
            settings: Settings::default(),
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of an API path such as `retrieve/v1/jobs`.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// URL of one resource under an API path, e.g. `retrieve/v1/jobs` + job id.
    pub(crate) fn resource(&self, path: &str, id: &str) -> String {
        push_segment(&self.endpoint(path), id)
    }

    pub(crate) fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Reply> {
        self.request(Method::GET, url, query, None)
    }

    pub(crate) fn post(&self, url: &str, body: &Value) -> Result<Reply> {
        self.request(Method::POST, url, &[], Some(body))
    }

    pub(crate) fn request(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Reply> {
        match body {
            Some(b) => debug!("{} {} {}", method, url, b),
            None => debug!("{} {}", method, url),
        }

        let resp = self.robust_request(|| {
            let mut req = self.authed(self.http.request(method.clone(), url));
            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(b) = body {
                req = req.json(b);
            }
            req.send()
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let final_url = resp.url().to_string();
        let text = resp.text()?;
        debug!("REPLY {}", text);

        if !status.is_success() {
            return Err(error_from_reply(status, &final_url, &text));
        }

        let json = if text.trim().is_empty() || status == StatusCode::NO_CONTENT {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|source| Error::Json {
                url: final_url.clone(),
                source,
            })?
        };

        Ok(Reply {
            url: final_url,
            headers,
            json,
        })
    }

    /// Starts a download, optionally resuming at byte `from`.
    pub(crate) fn get_stream(&self, url: &str, from: Option<u64>) -> Result<Response> {
        let resp = self.robust_request(|| {
            let mut req = self.authed(self.http.get(url));
            if let Some(from) = from {
                req = req.header(RANGE, format!("bytes={}-", from));
            }
            req.send()
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(error_from_reply(status, url, &text));
        }
        Ok(resp)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("PRIVATE-TOKEN", self.key.trim())
            .timeout(self.settings.timeout)
    }

    fn robust_request<F>(&self, mut f: F) -> Result<Response>
    where
        F: FnMut() -> std::result::Result<Response, reqwest::Error>,
    {
        let max = self.settings.tries();
        let mut tries = 0usize;
        loop {
            tries += 1;
            match f() {
                Ok(resp) => {
                    if retriable_status(resp.status().as_u16()) && tries < max {
                        let sleep = self.settings.retry_sleep(retry_after(resp.headers()));
                        warn!(
                            "HTTP {} from {}, retrying in {:?} ({}/{})",
                            resp.status(),
                            resp.url(),
                            sleep,
                            tries,
                            max
                        );
                        thread::sleep(sleep);
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if tries >= max {
                        return Err(Error::Transport(err));
                    }
                    // timeouts / transient connection errors
                    let sleep = self.settings.retry_sleep(None);
                    warn!("{}, retrying in {:?} ({}/{})", err, sleep, tries, max);
                    thread::sleep(sleep);
                }
            }
        }
    }
}
