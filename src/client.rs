use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::catalogue::{Collection, Collections};
use crate::config::{ClientConfig, load_config};
use crate::error::Result;
use crate::multi::{self, Concurrency};
use crate::processing::{Process, Processes, execute, post_inputs, process_url};
use crate::profile::{self, Licence, LicenceScope};
use crate::remote::{JobStatus, Jobs, Remote};
use crate::results::Results;
use crate::session::Session;

/// Filters and paging options for the listing endpoints.
///
/// Fields a given endpoint does not understand are still sent; the server ignores them.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub sortby: Option<String>,
    /// Full-text search (collections).
    pub q: Option<String>,
    /// Keyword filters (collections).
    pub keywords: Vec<String>,
    /// Status filter (jobs).
    pub status: Vec<JobStatus>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sortby(mut self, sortby: impl Into<String>) -> Self {
        self.sortby = Some(sortby.into());
        self
    }

    pub fn q(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status.push(status);
        self
    }

    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(limit) = self.limit {
            out.push(("limit", limit.to_string()));
        }
        if let Some(sortby) = &self.sortby {
            out.push(("sortby", sortby.clone()));
        }
        if let Some(q) = &self.q {
            out.push(("q", q.clone()));
        }
        for kw in &self.keywords {
            out.push(("kw", kw.clone()));
        }
        for status in &self.status {
            out.push(("status", status.as_str().to_string()));
        }
        out
    }
}

/// Entry point to the catalogue, retrieve and profiles APIs.
///
/// Cloning is cheap; clones share the HTTP connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    session: Arc<Session>,
}

impl ApiClient {
    /// Creates a client from `CADS_API_*` environment variables and/or `.cadsapirc`.
    ///
    /// This is equivalent to `ApiClient::new(None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `url`/`key`/`verify` arguments
    /// - environment variables `CADS_API_URL` / `CADS_API_KEY` / `CADS_API_VERIFY`
    /// - config file from `CADS_API_RC` or `.cadsapirc`
    pub fn new(url: Option<String>, key: Option<String>, verify: Option<bool>) -> Result<Self> {
        Self::with_config(load_config(url, key, verify)?)
    }

    pub fn with_config(cfg: ClientConfig) -> Result<Self> {
        Ok(Self {
            session: Arc::new(Session::new(cfg)?),
        })
    }

    pub fn url(&self) -> &str {
        self.session.base_url()
    }

    /// Per-request timeout (default 60s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        Arc::make_mut(&mut self.session).settings.timeout = timeout;
        self
    }

    /// Attempts for transient failures and status polls (default 500).
    pub fn with_maximum_tries(mut self, maximum_tries: usize) -> Self {
        Arc::make_mut(&mut self.session).settings.maximum_tries = maximum_tries;
        self
    }

    /// Cap for any single sleep (default 120s).
    pub fn with_sleep_max(mut self, sleep_max: Duration) -> Self {
        Arc::make_mut(&mut self.session).settings.sleep_max = sleep_max;
        self
    }

    /// Wait between transient retries without a `Retry-After` header (default 120s).
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        Arc::make_mut(&mut self.session).settings.retry_after = retry_after;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        Arc::make_mut(&mut self.session).settings.progress = progress;
        self
    }

    /// Delete jobs on the server when their [`Remote`] is dropped.
    ///
    /// [`retrieve`](Self::retrieve) and [`download_results`](Self::download_results) keep
    /// the job until the file is written; [`Results`] returned by the other helpers may
    /// point at an already deleted job.
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        Arc::make_mut(&mut self.session).settings.cleanup = cleanup;
        self
    }

    pub fn get_collections(&self, query: &ListQuery) -> Result<Collections> {
        Collections::get(self.session.clone(), &query.pairs())
    }

    pub fn get_collection(&self, collection_id: &str) -> Result<Collection> {
        Collection::get(self.session.clone(), collection_id)
    }

    pub fn get_processes(&self, query: &ListQuery) -> Result<Processes> {
        Processes::get(self.session.clone(), &query.pairs())
    }

    pub fn get_process(&self, process_id: &str) -> Result<Process> {
        Process::get(self.session.clone(), process_id)
    }

    pub fn get_jobs(&self, query: &ListQuery) -> Result<Jobs> {
        Jobs::get(self.session.clone(), &query.pairs())
    }

    pub fn get_remote(&self, request_uid: &str) -> Result<Remote> {
        Remote::get(self.session.clone(), request_uid)
    }

    /// Waits for the job to finish and returns its results.
    pub fn get_results(&self, request_uid: &str) -> Result<Results> {
        self.get_remote(request_uid)?.wait_on_results()
    }

    /// Submits `request` to the process of `collection_id`.
    pub fn submit<R: Serialize + ?Sized>(&self, collection_id: &str, request: &R) -> Result<Remote> {
        let url = process_url(&self.session, collection_id);
        execute(self.session.clone(), &url, request)
    }

    pub fn submit_and_wait_on_results<R: Serialize + ?Sized>(
        &self,
        collection_id: &str,
        request: &R,
    ) -> Result<Results> {
        self.submit(collection_id, request)?.wait_on_results()
    }

    /// Submits, waits and downloads; returns the written path.
    pub fn retrieve<R: Serialize + ?Sized>(
        &self,
        collection_id: &str,
        request: &R,
        target: Option<&Path>,
    ) -> Result<PathBuf> {
        let remote = self.submit(collection_id, request)?;
        remote.wait_on_results()?.download(target)
    }

    /// Retrieves several requests for one collection into `target_dir`.
    ///
    /// Jobs are submitted and polled by `max_updates` workers; finished ones are
    /// downloaded by `max_downloads` workers. A failing request does not stop the
    /// others: the outcome of each request is returned in input order.
    pub fn retrieve_many<R: Serialize + Sync>(
        &self,
        collection_id: &str,
        requests: &[R],
        target_dir: Option<&Path>,
        concurrency: Concurrency,
    ) -> Vec<Result<PathBuf>> {
        multi::retrieve_many(self, collection_id, requests, target_dir, concurrency)
    }

    /// Waits for an existing job and downloads its output.
    pub fn download_results(&self, request_uid: &str, target: Option<&Path>) -> Result<PathBuf> {
        let remote = self.get_remote(request_uid)?;
        remote.wait_on_results()?.download(target)
    }

    pub fn estimate_costs<R: Serialize + ?Sized>(
        &self,
        collection_id: &str,
        request: &R,
    ) -> Result<Value> {
        let url = format!("{}/costing", process_url(&self.session, collection_id));
        post_inputs(&self.session, &url, request)
    }

    pub fn apply_constraints<R: Serialize + ?Sized>(
        &self,
        collection_id: &str,
        request: &R,
    ) -> Result<Value> {
        let url = format!("{}/constraints", process_url(&self.session, collection_id));
        post_inputs(&self.session, &url, request)
    }

    pub fn get_licences(&self, scope: Option<LicenceScope>) -> Result<Vec<Licence>> {
        profile::licences(&self.session, scope)
    }

    pub fn get_accepted_licences(&self, scope: Option<LicenceScope>) -> Result<Vec<Licence>> {
        profile::accepted_licences(&self.session, scope)
    }

    pub fn accept_licence(&self, licence_id: &str, revision: u32) -> Result<Value> {
        profile::accept_licence(&self.session, licence_id, revision)
    }

    /// Verifies the key; an invalid one fails with HTTP 401.
    pub fn check_authentication(&self) -> Result<Value> {
        profile::check_authentication(&self.session)
    }

    pub fn get_profile(&self) -> Result<Value> {
        profile::account(&self.session)
    }
}
