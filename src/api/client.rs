//! Authenticated HTTP client for the time-tracking backend
//!
//! Wraps a `Transport` with bearer-token injection and a single
//! refresh-and-retry on 401.

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use super::error::ApiError;
use super::transport::{
    HttpRequest, HttpTransport, MultipartForm, RawResponse, RequestBody, Transport,
};
use crate::auth::{self, AuthTokenManager, TokenStore};
use crate::config::Config;

/// Successful outcome of an API call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// 2xx with a JSON body.
    Data(Value),
    /// 2xx with an empty body.
    NoContent,
}

impl ApiResponse {
    pub fn is_no_content(&self) -> bool {
        matches!(self, ApiResponse::NoContent)
    }

    /// The JSON body, or `ApiError::NoContent` if there was none.
    #[allow(dead_code)]
    pub fn into_data(self) -> Result<Value, ApiError> {
        match self {
            ApiResponse::Data(v) => Ok(v),
            ApiResponse::NoContent => Err(ApiError::NoContent),
        }
    }
}

/// Authenticated request facade over `AuthTokenManager` and a `Transport`.
pub struct ApiClient {
    base_url: Url,
    auth: Arc<AuthTokenManager>,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        auth: Arc<AuthTokenManager>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API base URL '{}'", base_url))?;
        // Url::join drops the last path segment unless it ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            auth,
            transport,
        })
    }

    /// Build the production stack from config: reqwest transport, credentials
    /// seeded from `store`, and the refresh-token exchange registered.
    pub fn from_config(config: &Config, store: Arc<dyn TokenStore>) -> Result<Self> {
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(config.api.transport_settings())?);
        let auth = Arc::new(AuthTokenManager::with_store(store));
        let client = Self::new(&config.api.base_url, auth, transport)?;
        client
            .auth
            .set_refresh_callback(auth::refresh_callback(
                Arc::clone(&client.transport),
                client.base_url.clone(),
            ));
        Ok(client)
    }

    pub fn auth(&self) -> &Arc<AuthTokenManager> {
        &self.auth
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path (e.g. `timer/start`) against the base URL.
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        join_endpoint(&self.base_url, endpoint)
    }

    #[allow(dead_code)]
    pub async fn get(&self, endpoint: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::GET, endpoint, None).await
    }

    pub async fn post(&self, endpoint: &str, body: Option<Value>) -> Result<ApiResponse, ApiError> {
        self.request(Method::POST, endpoint, body.map(RequestBody::Json))
            .await
    }

    #[allow(dead_code)]
    pub async fn put(&self, endpoint: &str, body: Option<Value>) -> Result<ApiResponse, ApiError> {
        self.request(Method::PUT, endpoint, body.map(RequestBody::Json))
            .await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, endpoint: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::DELETE, endpoint, None).await
    }

    /// POST a multipart form (file upload).
    pub async fn upload(
        &self,
        endpoint: &str,
        form: MultipartForm,
    ) -> Result<ApiResponse, ApiError> {
        self.request(Method::POST, endpoint, Some(RequestBody::Multipart(form)))
            .await
    }

    /// Issue a request, refreshing the token and retrying once on 401.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<RequestBody>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.endpoint_url(endpoint)?;
        let mut request = HttpRequest {
            method,
            url: url.to_string(),
            headers: HeaderMap::new(),
            body,
        };
        let exclude_content_type = request.is_multipart();

        for token_refresh_attempt in [false, true] {
            request.headers = self.auth.build_auth_headers(exclude_content_type).await;
            let response = self.transport.execute(&request).await?;

            if response.status != 401 {
                return interpret(endpoint, response);
            }
            if token_refresh_attempt {
                tracing::warn!(endpoint, "Still unauthorized after token refresh");
                break;
            }

            tracing::info!(endpoint, "401 Unauthorized, attempting token refresh");
            if !self
                .auth
                .refresh_after_rejection(bearer_token(&request.headers))
                .await
            {
                break;
            }
        }

        Err(ApiError::Unauthorized)
    }
}

/// Resolve `endpoint` relative to `base` (which must end in '/').
pub(crate) fn join_endpoint(base: &Url, endpoint: &str) -> Result<Url, ApiError> {
    base.join(endpoint.trim_start_matches('/'))
        .map_err(|e| ApiError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn interpret(endpoint: &str, response: RawResponse) -> Result<ApiResponse, ApiError> {
    if !response.is_success() {
        tracing::warn!(endpoint, status = response.status, "Request failed");
        return Err(ApiError::from_status(response.status, &response.body));
    }
    if response.is_empty() {
        return Ok(ApiResponse::NoContent);
    }
    response
        .json()
        .map(ApiResponse::Data)
        .map_err(|e| ApiError::InvalidBody(e.to_string()))
}
