//! Purpose: HTTP client for the relay's `/api/records` and `/health` surface.
//! Exports: `RelayClient`.
//! Role: Backend of the console; also usable directly by tests and tools.
//! Invariants: Base URL is http(s) with no path; routes are appended as segments.
//! Invariants: Relay error envelopes map to `Error` with the HTTP status and `error.message`.
#![allow(clippy::result_large_err)]

use super::upstream::read_json_response;
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::paging::ListQuery;
use crate::core::record::{DeleteAck, FieldPatch, NewRecord, Record, RecordPage};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<RelayClientInner>,
}

struct RelayClientInner {
    base_url: Url,
    agent: ureq::Agent,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Ok(Self {
            inner: Arc::new(RelayClientInner { base_url, agent }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn health(&self) -> ApiResult<Value> {
        let url = build_url(&self.inner.base_url, &["health"])?;
        self.request_json("GET", &url, None)
    }

    pub fn list(&self, query: &ListQuery) -> ApiResult<RecordPage> {
        let mut url = build_url(&self.inner.base_url, &["api", "records"])?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("pageSize", &query.page_size.get().to_string());
            if let Some(search) = &query.search {
                pairs.append_pair("search", search);
            }
            if let Some(offset) = &query.offset {
                pairs.append_pair("offset", offset);
            }
        }
        self.request_json("GET", &url, None)
    }

    pub fn create(&self, record: &NewRecord) -> ApiResult<Record> {
        let url = build_url(&self.inner.base_url, &["api", "records"])?;
        self.request_json("POST", &url, Some(&record.to_request_json()))
    }

    pub fn update(&self, id: &str, patch: &FieldPatch) -> ApiResult<Record> {
        let url = build_url(&self.inner.base_url, &["api", "records", id])?;
        self.request_json("PATCH", &url, Some(&patch.to_request_json()))
    }

    pub fn delete(&self, id: &str) -> ApiResult<DeleteAck> {
        let url = build_url(&self.inner.base_url, &["api", "records", id])?;
        self.request_json("DELETE", &url, None)
    }

    fn request_json<R>(&self, method: &str, url: &Url, body: Option<&Value>) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        let request = self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json");
        let response = match body {
            Some(body) => request
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
            None => request.call(),
        };
        let value = match response {
            Ok(resp) => read_json_response(resp)?,
            Err(ureq::Error::Status(code, resp)) => return Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => {
                return Err(Error::new(ErrorKind::Io)
                    .with_message("relay request failed")
                    .with_hint("Check that `rowrelay serve` is running at the given address.")
                    .with_source(err));
            }
        };
        serde_json::from_value(value).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("unexpected response shape")
                .with_source(err)
        })
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid relay url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(
            Error::new(ErrorKind::Usage).with_message("relay url must use http or https scheme")
        );
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("relay url must not include a path"));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| Error::new(ErrorKind::Usage).with_message("relay url cannot be a base"))?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let err = Error::new(ErrorKind::from_status(status)).with_status(status);
    let Ok(payload) = serde_json::from_str::<Value>(&body) else {
        return err.with_message(format!("relay error status {status}"));
    };
    let message = payload
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("relay error status {status}"));
    err.with_message(message).with_detail(payload)
}
