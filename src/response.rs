use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::session::Session;

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct Link {
    #[serde(default)]
    pub(crate) rel: Option<String>,
    pub(crate) href: String,
}

pub(crate) fn links(json: &Value) -> Vec<Link> {
    json.get("links")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

pub(crate) fn link_href(json: &Value, rel: &str) -> Option<String> {
    links(json)
        .into_iter()
        .find(|l| l.rel.as_deref() == Some(rel))
        .map(|l| l.href)
}

/// A fetched JSON document together with the URL it came from.
#[derive(Debug, Clone)]
pub(crate) struct ApiResponse {
    pub(crate) url: String,
    pub(crate) json: Value,
    pub(crate) session: Arc<Session>,
}

impl ApiResponse {
    pub(crate) fn get(session: Arc<Session>, url: &str, query: &[(&str, String)]) -> Result<Self> {
        let reply = session.get(url, query)?;
        Ok(Self {
            url: reply.url,
            json: reply.json,
            session,
        })
    }

    pub(crate) fn link_href(&self, rel: &str) -> Option<String> {
        link_href(&self.json, rel)
    }

    /// Fetches the document behind the `rel` link, if there is one.
    pub(crate) fn follow(&self, rel: &str) -> Result<Option<Self>> {
        match self.link_href(rel) {
            Some(href) => {
                let url = crate::util::urljoin(&self.url, &href);
                Self::get(self.session.clone(), &url, &[]).map(Some)
            }
            None => Ok(None),
        }
    }

    /// `id` field of every entry of the `key` array.
    pub(crate) fn ids(&self, key: &str, id_field: &str) -> Vec<String> {
        self.json
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get(id_field).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Cursor navigation shared by the listing types.
macro_rules! paginated {
    ($name:ident) => {
        impl $name {
            /// Next page, or `None` on the last one.
            pub fn next(&self) -> $crate::error::Result<Option<Self>> {
                Ok(self.response.follow("next")?.map(|response| Self { response }))
            }

            /// Previous page, or `None` on the first one.
            pub fn prev(&self) -> $crate::error::Result<Option<Self>> {
                Ok(self.response.follow("prev")?.map(|response| Self { response }))
            }

            /// URL this page was fetched from.
            pub fn url(&self) -> &str {
                &self.response.url
            }

            /// Raw JSON of this page.
            pub fn json(&self) -> &serde_json::Value {
                &self.response.json
            }
        }
    };
}

pub(crate) use paginated;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_link_by_rel() {
        let doc = json!({
            "links": [
                {"rel": "self", "href": "http://x/jobs"},
                {"rel": "next", "href": "http://x/jobs?cursor=abc&back=false"},
                {"href": "http://x/no-rel"}
            ]
        });
        assert_eq!(
            link_href(&doc, "next").as_deref(),
            Some("http://x/jobs?cursor=abc&back=false")
        );
        assert_eq!(link_href(&doc, "prev"), None);
    }

    #[test]
    fn missing_links_are_empty() {
        assert!(links(&json!({"id": "x"})).is_empty());
        assert!(links(&json!({"links": "garbage"})).is_empty());
    }
}
