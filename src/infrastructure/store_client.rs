//! Blocking HTTP client for one remote database.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde_json::Value;

use crate::domain::{AppError, Result, StoreHandle};

/// Client bound to a single database URL.
#[derive(Debug)]
pub struct StoreClient {
    client: Client,
    db_url: Url,
}

impl StoreClient {
    /// Build a client for `handle`, honoring its proxy flag.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the client cannot be built.
    pub fn open(handle: &StoreHandle) -> Result<Self> {
        let db_url = Url::parse(&handle.url)
            .map_err(|e| AppError::config(format!("Invalid database URL {}: {e}", handle.url)))?;

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("couchapp-push/", env!("CARGO_PKG_VERSION")));
        if !handle.use_proxy {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| AppError::http("Failed to build HTTP client", e))?;

        Ok(Self { client, db_url })
    }

    /// URL of a document (or one of its attachments) in this database.
    #[must_use]
    pub fn doc_url(&self, docid: &str, attachment: Option<&str>) -> Url {
        let mut url = self.db_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            match docid.split_once('/') {
                Some((prefix @ ("_design" | "_local"), name)) => {
                    segments.push(prefix).push(name);
                }
                _ => {
                    segments.push(docid);
                }
            }
            if let Some(name) = attachment {
                segments.extend(name.split('/'));
            }
        }
        url
    }

    /// Current revision of `docid`, or `None` if it does not exist yet.
    ///
    /// # Errors
    /// Returns error on network failure or an unexpected status.
    pub fn current_rev(&self, docid: &str) -> Result<Option<String>> {
        let url = self.doc_url(docid, None);
        let response = self
            .client
            .head(url.clone())
            .send()
            .map_err(|e| AppError::http(format!("HEAD {url} failed"), e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, "HEAD", &url)?;

        Ok(response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string()))
    }

    /// Save a document, returning its new revision.
    ///
    /// # Errors
    /// Returns error on network failure or a non-success status.
    pub fn put_doc(&self, docid: &str, doc: &Value) -> Result<String> {
        let url = self.doc_url(docid, None);
        let response = self
            .client
            .put(url.clone())
            .json(doc)
            .send()
            .map_err(|e| AppError::http(format!("PUT {url} failed"), e))?;

        let body = read_body(check_status(response, "PUT", &url)?, &url)?;
        tracing::debug!(url = %url, "Saved document");
        Ok(body
            .get("rev")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Upload one attachment, returning the document's new revision.
    ///
    /// # Errors
    /// Returns error on network failure or a non-success status.
    pub fn put_attachment(
        &self,
        docid: &str,
        rev: &str,
        name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<String> {
        let mut url = self.doc_url(docid, Some(name));
        url.query_pairs_mut().append_pair("rev", rev);

        let response = self
            .client
            .put(url.clone())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .map_err(|e| AppError::http(format!("PUT {url} failed"), e))?;

        let body = read_body(check_status(response, "PUT", &url)?, &url)?;
        tracing::debug!(url = %url, "Uploaded attachment");
        Ok(body
            .get("rev")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Save several documents in one `_bulk_docs` request.
    ///
    /// # Errors
    /// Returns error on network failure or a non-success status.
    pub fn bulk_docs(&self, docs: &[Value], all_or_nothing: bool) -> Result<Value> {
        let mut url = self.db_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("_bulk_docs");
        }

        let payload = serde_json::json!({
            "docs": docs,
            "all_or_nothing": all_or_nothing,
        });

        let response = self
            .client
            .post(url.clone())
            .json(&payload)
            .send()
            .map_err(|e| AppError::http(format!("POST {url} failed"), e))?;

        let body = read_body(check_status(response, "POST", &url)?, &url)?;
        tracing::info!(url = %url, count = docs.len(), "Saved documents in bulk");
        Ok(body)
    }
}

fn check_status(response: Response, method: &str, url: &Url) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(AppError::Http {
        message: format!("{method} {url} returned {status}: {}", body.trim()),
        source: None,
    })
}

fn read_body(response: Response, url: &Url) -> Result<Value> {
    response
        .json::<Value>()
        .map_err(|e| AppError::http(format!("Invalid response from {url}"), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> StoreClient {
        StoreClient::open(&StoreHandle::new(url, false)).unwrap()
    }

    #[test]
    fn test_design_doc_url_keeps_prefix() {
        let c = client("http://127.0.0.1:5984/blog");
        assert_eq!(
            c.doc_url("_design/blog", None).as_str(),
            "http://127.0.0.1:5984/blog/_design/blog"
        );
    }

    #[test]
    fn test_plain_doc_id_is_escaped() {
        let c = client("http://127.0.0.1:5984/blog/");
        assert_eq!(
            c.doc_url("a/b c", None).as_str(),
            "http://127.0.0.1:5984/blog/a%2Fb%20c"
        );
    }

    #[test]
    fn test_attachment_url() {
        let c = client("http://host/db");
        assert_eq!(
            c.doc_url("_design/app", Some("js/main.js")).as_str(),
            "http://host/db/_design/app/js/main.js"
        );
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let err = StoreClient::open(&StoreHandle::new("not a url", false)).unwrap_err();
        assert!(err.is_config());
    }
}
