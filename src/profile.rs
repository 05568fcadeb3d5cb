use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::session::Session;

/// Which licences a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenceScope {
    All,
    Dataset,
    Portal,
}

impl LicenceScope {
    pub fn as_str(self) -> &'static str {
        match self {
            LicenceScope::All => "all",
            LicenceScope::Dataset => "dataset",
            LicenceScope::Portal => "portal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Licence {
    pub id: String,
    pub revision: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn scope_query(scope: Option<LicenceScope>) -> Vec<(&'static str, String)> {
    scope
        .map(|s| vec![("scope", s.as_str().to_string())])
        .unwrap_or_default()
}

fn licences_from(url: &str, json: Value) -> Result<Vec<Licence>> {
    let list = json.get("licences").cloned().unwrap_or(Value::Array(Vec::new()));
    serde_json::from_value(list).map_err(|source| Error::Json {
        url: url.to_string(),
        source,
    })
}

pub(crate) fn licences(session: &Session, scope: Option<LicenceScope>) -> Result<Vec<Licence>> {
    let url = session.endpoint("catalogue/v1/vocabularies/licences");
    let reply = session.get(&url, &scope_query(scope))?;
    licences_from(&reply.url, reply.json)
}

pub(crate) fn accepted_licences(
    session: &Session,
    scope: Option<LicenceScope>,
) -> Result<Vec<Licence>> {
    let url = session.endpoint("profiles/v1/account/licences");
    let reply = session.get(&url, &scope_query(scope))?;
    licences_from(&reply.url, reply.json)
}

pub(crate) fn accept_licence(session: &Session, licence_id: &str, revision: u32) -> Result<Value> {
    let url = session.resource("profiles/v1/account/licences", licence_id);
    let body = json!({ "revision": revision });
    Ok(session
        .request(Method::PUT, &url, &[], Some(&body))?
        .json)
}

pub(crate) fn check_authentication(session: &Session) -> Result<Value> {
    let url = session.endpoint("profiles/v1/account/verification/pat");
    Ok(session.request(Method::POST, &url, &[], None)?.json)
}

pub(crate) fn account(session: &Session) -> Result<Value> {
    let url = session.endpoint("profiles/v1/account");
    Ok(session.get(&url, &[])?.json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_licence_listing() {
        let json = json!({"licences": [
            {"id": "licence-to-use-copernicus-products", "revision": 12, "label": "Copernicus", "scope": "dataset"},
            {"id": "cc-by", "revision": 1}
        ]});
        let list = licences_from("http://x", json).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].revision, 12);
        assert_eq!(list[1].label, None);
    }

    #[test]
    fn empty_listing_has_no_licences() {
        assert!(licences_from("http://x", json!({})).unwrap().is_empty());
    }
}
