use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::processing::Process;
use crate::remote::Remote;
use crate::response::{ApiResponse, paginated};
use crate::session::Session;
use crate::util::{parse_datetime, urljoin};

/// One page of the dataset catalogue.
#[derive(Debug, Clone)]
pub struct Collections {
    response: ApiResponse,
}

paginated!(Collections);

impl Collections {
    pub(crate) fn get(session: Arc<Session>, query: &[(&str, String)]) -> Result<Self> {
        let url = session.endpoint("catalogue/v1/datasets");
        Ok(Self {
            response: ApiResponse::get(session, &url, query)?,
        })
    }

    /// Ids of the collections on this page, in server order.
    pub fn collection_ids(&self) -> Vec<String> {
        self.response.ids("collections", "id")
    }
}

/// A catalogue entry: dataset metadata and the process that serves it.
#[derive(Debug, Clone)]
pub struct Collection {
    collection_id: String,
    response: ApiResponse,
}

impl Collection {
    pub(crate) fn get(session: Arc<Session>, collection_id: &str) -> Result<Self> {
        let url = session.resource("catalogue/v1/collections", collection_id);
        Ok(Self {
            collection_id: collection_id.to_string(),
            response: ApiResponse::get(session, &url, &[])?,
        })
    }

    /// Id from the metadata, or the id the collection was fetched with.
    pub fn id(&self) -> &str {
        self.response
            .json
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or(self.collection_id.as_str())
    }

    pub fn url(&self) -> &str {
        &self.response.url
    }

    pub fn json(&self) -> &Value {
        &self.response.json
    }

    /// Start of the temporal extent, if the dataset declares one.
    pub fn begin_datetime(&self) -> Option<DateTime<Utc>> {
        self.temporal_bound(0)
    }

    /// End of the temporal extent; `None` for open-ended datasets.
    pub fn end_datetime(&self) -> Option<DateTime<Utc>> {
        self.temporal_bound(1)
    }

    fn temporal_bound(&self, idx: usize) -> Option<DateTime<Utc>> {
        let raw = self
            .response
            .json
            .pointer("/extent/temporal/interval/0")?
            .get(idx)?
            .as_str()?;
        parse_datetime(raw)
    }

    /// URL of the retrieve process backing this collection.
    fn process_url(&self) -> String {
        match self.response.link_href("retrieve") {
            Some(href) => urljoin(&self.response.url, &href),
            None => self
                .response
                .session
                .resource("retrieve/v1/processes", self.id()),
        }
    }

    /// Fetches the process used to submit requests for this dataset.
    pub fn process(&self) -> Result<Process> {
        Process::get_url(self.response.session.clone(), &self.process_url())
    }

    /// Submits `request` to this collection's process.
    pub fn submit<R: Serialize + ?Sized>(&self, request: &R) -> Result<Remote> {
        self.process()?.submit(request)
    }
}
