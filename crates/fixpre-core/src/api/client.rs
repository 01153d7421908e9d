//! API client for communicating with the fixpre REST API.
//!
//! This module provides the `ApiClient` struct for making requests against
//! the API host and the feedback (upload/results) host. Every request reads
//! the current token from the shared `Session`, so a login or logout is seen
//! by all components holding a clone of the client.

use std::time::Duration;

use reqwest::{header, multipart, Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::auth::Session;
use crate::config::Config;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Content type the user endpoints expect for JSON bodies
const LINKED_DATA_JSON: &str = "application/ld+json";

const PLAIN_JSON: &str = "application/json";

const PRESENTATION_FEEDBACK_PATH: &str = "/presentations/feedback";

/// Which server a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    /// Account, history and dashboard endpoints
    Api,
    /// Upload and job result endpoints
    Feedback,
}

/// Body encoding for JSON POSTs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonBody {
    /// `application/ld+json`, used by the `/users` endpoints
    LinkedData,
    /// `application/json`
    Plain,
}

impl JsonBody {
    fn content_type(self) -> &'static str {
        match self {
            JsonBody::LinkedData => LINKED_DATA_JSON,
            JsonBody::Plain => PLAIN_JSON,
        }
    }
}

/// A fully read HTTP response. Callers decide what a non-success status means,
/// since several endpoints treat particular statuses specially.
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: StatusCode,
    body: String,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Parse the body as JSON, returning `None` when it isn't.
    pub fn json_value(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response body: {}", e))
        })
    }

    /// Error for this response using the server's detail text or `fallback`.
    pub fn error_with_detail(&self, fields: &[&str], fallback: &str) -> ApiError {
        ApiError::with_detail(self.status, &self.body, fields, fallback)
    }

    /// Return self on success, otherwise an error carrying the raw body.
    pub fn check(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.body))
        }
    }
}

/// API client for the fixpre service.
/// Clone is cheap - reqwest::Client and Session are both reference counted.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    api_base_url: String,
    feedback_base_url: String,
    session: Session,
}

impl ApiClient {
    /// Create a new API client for the hosts named in `config`
    pub fn new(config: &Config, session: Session) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base_url: normalize_base(&config.api_base_url),
            feedback_base_url: normalize_base(config.feedback_base_url()),
            session,
        })
    }

    /// The session this client reads its bearer token from
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn url(&self, host: Host, path: &str) -> String {
        let base = match host {
            Host::Api => &self.api_base_url,
            Host::Feedback => &self.feedback_base_url,
        };
        format!("{}{}", base, path)
    }

    /// Attach the bearer token if one is stored
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> Result<RawResponse, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(%status, bytes = body.len(), "Response received");
        Ok(RawResponse { status, body })
    }

    /// POST a JSON body to the API host. No token is attached; the
    /// endpoints using this are the unauthenticated account endpoints.
    pub async fn post_json<B: Serialize>(
        &self,
        path: &str,
        encoding: JsonBody,
        body: &B,
    ) -> Result<RawResponse, ApiError> {
        let url = self.url(Host::Api, path);
        debug!(url = %url, "POST");
        let request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, encoding.content_type())
            .body(serde_json::to_vec(body)?);
        Self::send(request).await
    }

    /// GET with the bearer token attached when present.
    pub async fn get(
        &self,
        host: Host,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<RawResponse, ApiError> {
        let url = self.url(host, path);
        debug!(url = %url, "GET");
        let mut request = self.client.get(&url);
        if !query.is_empty() {
            request = request.query(query);
        }
        Self::send(self.authorize(request)).await
    }

    /// POST a multipart form to the feedback host, bearer token attached when present.
    pub async fn post_multipart(
        &self,
        path: &str,
        form: multipart::Form,
    ) -> Result<RawResponse, ApiError> {
        let url = self.url(Host::Feedback, path);
        debug!(url = %url, "POST multipart");
        let request = self.client.post(&url).multipart(form);
        Self::send(self.authorize(request)).await
    }

    /// Look up feedback for a presentation by its public URL
    pub async fn presentation_feedback(&self, presentation_url: &str) -> Result<Value, ApiError> {
        self.get(
            Host::Api,
            PRESENTATION_FEEDBACK_PATH,
            &[("url", presentation_url)],
        )
        .await?
        .check()?
        .json()
    }
}

fn normalize_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}
