//! In-memory transport for exercising the API stack without a network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;

use super::error::TransportError;
use super::transport::{HttpRequest, RawResponse, RequestBody, Transport};

/// What the fake saw for one request.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub json: Option<Value>,
    pub multipart_fields: Vec<(String, String)>,
    pub multipart_files: Vec<String>,
}

impl RecordedRequest {
    /// URL path without the leading slash.
    pub fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.path().trim_start_matches('/').to_string())
            .unwrap_or_default()
    }
}

/// Replays scripted responses in order, then answers `200 {"success":true}`.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    seen: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Result<RawResponse, TransportError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, status: u16, body: &str) {
        self.push(Ok(RawResponse::new(status, body)));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().iter().map(RecordedRequest::path).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let header = |name: HeaderName| {
            request
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        let (json, multipart_fields, multipart_files) = match &request.body {
            Some(RequestBody::Json(v)) => (Some(v.clone()), Vec::new(), Vec::new()),
            Some(RequestBody::Multipart(form)) => (
                None,
                form.fields.clone(),
                form.files.iter().map(|f| f.field.clone()).collect(),
            ),
            None => (None, Vec::new(), Vec::new()),
        };
        self.seen.lock().unwrap().push(RecordedRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            authorization: header(AUTHORIZATION),
            content_type: header(CONTENT_TYPE),
            json,
            multipart_fields,
            multipart_files,
        });

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RawResponse::new(200, r#"{"success":true}"#)))
    }
}
