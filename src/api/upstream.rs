//! Purpose: HTTP client for the hosted tabular-data API (one base, one table).
//! Exports: `UpstreamClient`, `UpstreamConfig`, `DEFAULT_API_URL`, `DEFAULT_TIMEOUT`.
//! Role: The production `RecordStore`; attaches the bearer credential to every call.
//! Invariants: Table URL is `{api_url}/{base_id}/{table}` with each part one path segment.
//! Invariants: Upstream HTTP failures keep their status and JSON payload on the error.
//! Invariants: Calls are never retried; each one is bounded by the agent timeout.
#![allow(clippy::result_large_err)]

use super::store::RecordStore;
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::formula::search_formula;
use crate::core::paging::ListQuery;
use crate::core::record::{FIELD_NAME, FieldPatch, NewRecord};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);

#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    pub api_url: String,
    pub token: String,
    pub base_id: String,
    pub table: String,
    pub timeout: Duration,
}

impl UpstreamConfig {
    pub fn new(
        token: impl Into<String>,
        base_id: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
            base_id: base_id.into(),
            table: table.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    inner: Arc<UpstreamClientInner>,
}

struct UpstreamClientInner {
    table_url: Url,
    table: String,
    token: String,
    agent: ureq::Agent,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> ApiResult<Self> {
        if config.token.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("upstream token is empty"));
        }
        if config.base_id.is_empty() || config.table.is_empty() {
            return Err(
                Error::new(ErrorKind::Usage).with_message("upstream base id and table are required")
            );
        }
        let api_url = parse_api_url(&config.api_url)?;
        let table_url = build_url(&api_url, &[&config.base_id, &config.table])?;
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            inner: Arc::new(UpstreamClientInner {
                table_url,
                table: config.table,
                token: config.token,
                agent,
            }),
        })
    }

    pub fn table_url(&self) -> &Url {
        &self.inner.table_url
    }

    fn record_url(&self, id: &str) -> ApiResult<Url> {
        if id.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("record id is empty"));
        }
        let mut url = self.inner.table_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::new(ErrorKind::Usage).with_message("api url cannot be a base"))?
            .push(id);
        Ok(url)
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        self.inner
            .agent
            .request(method, url.as_str())
            .set("Authorization", &format!("Bearer {}", self.inner.token))
            .set("Accept", "application/json")
    }

    fn send(&self, request: ureq::Request, body: Option<&Value>) -> ApiResult<Value> {
        let response = match body {
            Some(body) => request
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
            None => request.call(),
        };
        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("upstream request failed")
                .with_source(err)),
        }
    }
}

impl RecordStore for UpstreamClient {
    fn table(&self) -> &str {
        &self.inner.table
    }

    fn list(&self, query: &ListQuery) -> ApiResult<Value> {
        let mut request = self
            .request("GET", &self.inner.table_url)
            .query("pageSize", &query.page_size.get().to_string())
            .query("sort[0][field]", FIELD_NAME)
            .query("sort[0][direction]", "asc");
        if let Some(formula) = query.search.as_deref().and_then(search_formula) {
            request = request.query("filterByFormula", &formula);
        }
        if let Some(offset) = &query.offset {
            request = request.query("offset", offset);
        }
        self.send(request, None)
    }

    fn create(&self, record: &NewRecord) -> ApiResult<Value> {
        let request = self.request("POST", &self.inner.table_url);
        self.send(request, Some(&record.to_fields_envelope()))
    }

    fn update(&self, id: &str, patch: &FieldPatch) -> ApiResult<Value> {
        let url = self.record_url(id)?;
        let request = self.request("PATCH", &url);
        self.send(request, Some(&patch.to_fields_envelope()))
    }

    fn delete(&self, id: &str) -> ApiResult<Value> {
        let url = self.record_url(id)?;
        let request = self.request("DELETE", &url);
        self.send(request, None)
    }
}

pub(crate) fn parse_api_url(raw: &str) -> ApiResult<Url> {
    let url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid api url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage).with_message("api url must use http or https"));
    }
    Ok(url)
}

/// Appends `segments` to the base path, dropping a trailing empty segment first.
fn build_url(base: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| Error::new(ErrorKind::Usage).with_message("api url cannot be a base"))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

pub(crate) fn read_json_response(response: ureq::Response) -> ApiResult<Value> {
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let err = Error::new(ErrorKind::from_status(status)).with_status(status);
    match serde_json::from_str::<Value>(&body) {
        Ok(payload) => {
            let message = upstream_error_message(&payload)
                .unwrap_or_else(|| format!("upstream error status {status}"));
            err.with_message(message).with_detail(payload)
        }
        Err(_) => err.with_message(format!("upstream error status {status}")),
    }
}

/// Reads `error.message`, or `error` itself when the upstream sends a bare code.
fn upstream_error_message(payload: &Value) -> Option<String> {
    match payload.get("error")? {
        Value::String(code) => Some(code.clone()),
        Value::Object(error) => error
            .get("message")
            .or_else(|| error.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
