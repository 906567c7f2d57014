//! Low-level request executor
//!
//! Wraps reqwest::Client with a fixed timeout and bounded retries on
//! connection failures and timeouts. HTTP error statuses are returned as-is;
//! deciding what a 401 or 500 means is the caller's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{TransportError, TransportErrorKind};

/// Timeout and retry knobs for `HttpTransport`.
#[derive(Debug, Clone, Copy)]
pub struct TransportSettings {
    pub timeout: Duration,
    /// Extra attempts after the first one, per logical call.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// One file in a multipart upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Clonable description of a multipart body.
///
/// `reqwest::multipart::Form` is consumed on send, so the form is rebuilt
/// from this description on every attempt.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    fn to_form(&self) -> Result<Form, TransportError> {
        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in &self.files {
            let part = Part::bytes(file.bytes.clone())
                .file_name(file.file_name.clone())
                .mime_str(&file.mime)
                .map_err(|e| {
                    TransportError::new(
                        TransportErrorKind::Unexpected,
                        format!("invalid mime type '{}': {}", file.mime, e),
                    )
                })?;
            form = form.part(file.field.clone(), part);
        }
        Ok(form)
    }
}

/// Request body variants understood by the transport.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Multipart(MultipartForm),
}

/// A fully-resolved request: absolute URL, final headers, optional body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, Some(RequestBody::Multipart(_)))
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the body is empty or whitespace only.
    pub fn is_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    #[cfg(test)]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes requests on the wire. Implementations never panic or leak
/// errors other than `TransportError`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport with timeout and transient-failure retries.
pub struct HttpTransport {
    http: reqwest::Client,
    settings: TransportSettings,
}

impl HttpTransport {
    pub fn new(settings: TransportSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { http, settings })
    }

    async fn send_once(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .http
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());

        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Multipart(form)) => builder.multipart(form.to_form()?),
            None => builder,
        };

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        Ok(RawResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let mut retries = 0;

        loop {
            tracing::debug!("{} {}", request.method, request.url);
            match self.send_once(request).await {
                Ok(resp) => return Ok(resp),
                Err(err) if err.is_transient() && retries < self.settings.max_retries => {
                    retries += 1;
                    tracing::warn!(
                        url = %request.url,
                        retry = retries,
                        max_retries = self.settings.max_retries,
                        "{}, retrying",
                        err
                    );
                    tokio::time::sleep(self.settings.backoff).await;
                }
                Err(err) => {
                    tracing::warn!(url = %request.url, "{} failed: {}", request.method, err);
                    return Err(err);
                }
            }
        }
    }
}
