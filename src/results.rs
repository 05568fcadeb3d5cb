use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::download::download;
use crate::error::{Error, Result};
use crate::response::ApiResponse;
use crate::session::Session;
use crate::util::{guess_filename_from_url, urljoin};

/// Output of a successful job.
#[derive(Debug, Clone)]
pub struct Results {
    response: ApiResponse,
    location: String,
}

impl Results {
    pub(crate) fn get(session: Arc<Session>, url: &str) -> Result<Self> {
        let response = ApiResponse::get(session, url, &[])?;
        let href = response
            .json
            .pointer("/asset/value/href")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::invalid(&response.url, "missing results asset href"))?;
        let location = urljoin(&response.url, href);
        Ok(Self { response, location })
    }

    pub fn url(&self) -> &str {
        &self.response.url
    }

    pub fn json(&self) -> &Value {
        &self.response.json
    }

    /// Asset descriptor: `href`, `type`, `file:size` and friends.
    pub fn asset(&self) -> &Value {
        &self.response.json["asset"]["value"]
    }

    /// Absolute download URL of the asset.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn content_length(&self) -> Option<u64> {
        self.asset().get("file:size").and_then(Value::as_u64)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.asset().get("type").and_then(Value::as_str)
    }

    /// Downloads the asset and returns the written path.
    ///
    /// `None` writes into the current directory under the asset's file name; an
    /// existing directory receives that file name; anything else is the file path.
    pub fn download(&self, target: Option<&Path>) -> Result<PathBuf> {
        let name = guess_filename_from_url(&self.location).unwrap_or_else(|| "download".into());
        let path = match target {
            None => PathBuf::from(name),
            Some(t) if t.as_os_str().is_empty() => PathBuf::from(name),
            Some(t) if t.is_dir() => t.join(name),
            Some(t) => t.to_path_buf(),
        };
        download(&self.response.session, &self.location, self.content_length(), path)
    }
}
