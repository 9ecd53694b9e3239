//! HTTP transport with cookie credentials and CSRF mirroring.
//!
//! ARCHITECTURE
//! ============
//! A single `reqwest` client owns the cookie jar for the API origin. The
//! identity service sets every credential through `Set-Cookie`; this module
//! only reads the jar, to copy the CSRF cookie into the `X-CSRFToken` header.
//!
//! `dispatch` is one raw attempt. `execute` (and the verb helpers) run the
//! attempt and then hand the outcome to the response interceptor wired in at
//! construction time.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::interceptor::{Attempt, ResponseInterceptor};

pub const CSRF_COOKIE_NAME: &str = "csrftoken";
pub const CSRF_HEADER_NAME: &str = "x-csrftoken";

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

/// Everything needed to send (and replay) one call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path relative to the API URL, e.g. `/users/me/`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl Request {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: HeaderMap::new(), body: None }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self { body, ..Self::new(Method::POST, path) }
    }

    #[must_use]
    pub fn patch(path: impl Into<String>, body: Option<Value>) -> Self {
        Self { body, ..Self::new(Method::PATCH, path) }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A successful response with its body decoded as JSON.
///
/// Empty bodies decode to `Value::Null`; non-JSON bodies to `Value::String`.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub body: Value,
}

impl Response {
    /// Decode the body into a typed value.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Decode` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_value(self.body.clone()).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Configured HTTP client for the identity service. Cheap to clone; clones
/// share the connection pool, cookie jar and interceptor.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    jar: Arc<Jar>,
    api_url: String,
    origin: Url,
    interceptor: Option<Arc<dyn ResponseInterceptor>>,
}

impl Transport {
    /// Build a transport. When `interceptor` is set, every response from
    /// `execute` and the verb helpers passes through it.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL is invalid or the client fails to build.
    pub fn new(config: &ClientConfig, interceptor: Option<Arc<dyn ResponseInterceptor>>) -> Result<Self, TransportError> {
        let origin = Url::parse(&config.api_url).map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", config.api_url)))?;
        if origin.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(config.api_url.clone()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_provider(Arc::clone(&jar))
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| TransportError::HttpClientBuild(e.to_string()))?;

        Ok(Self { http, jar, api_url: config.api_url.clone(), origin, interceptor })
    }

    /// `GET path`, intercepted.
    ///
    /// # Errors
    ///
    /// Returns the (possibly recovered) transport error.
    pub async fn get(&self, path: &str) -> Result<Response, TransportError> {
        self.execute(Request::get(path)).await
    }

    /// `POST path` with an optional JSON body, intercepted.
    ///
    /// # Errors
    ///
    /// Returns the (possibly recovered) transport error.
    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Response, TransportError> {
        self.execute(Request::post(path, body)).await
    }

    /// `PATCH path` with an optional JSON body, intercepted.
    ///
    /// # Errors
    ///
    /// Returns the (possibly recovered) transport error.
    pub async fn patch(&self, path: &str, body: Option<Value>) -> Result<Response, TransportError> {
        self.execute(Request::patch(path, body)).await
    }

    /// Send a fresh (unmarked) attempt and run the interceptor on its outcome.
    ///
    /// # Errors
    ///
    /// Returns the (possibly recovered) transport error.
    pub async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        let attempt = Attempt::new(request);
        let outcome = self.dispatch(attempt.request()).await;
        match &self.interceptor {
            Some(interceptor) => interceptor.intercept(self, attempt, outcome).await,
            None => outcome,
        }
    }

    /// Send exactly one attempt, without interception.
    ///
    /// # Errors
    ///
    /// Returns `Network` when no response arrives, or the status-derived error
    /// for a non-success status.
    pub async fn dispatch(&self, request: &Request) -> Result<Response, TransportError> {
        let url = self.url_for(&request.path)?;
        let mut builder = self.http.request(request.method.clone(), url).headers(request.headers.clone());
        if let Some(token) = self.csrf_header_value() {
            builder = builder.header(HeaderName::from_static(CSRF_HEADER_NAME), token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, path = %request.path, "sending request");
        let response = builder.send().await.map_err(|e| TransportError::network(&e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| TransportError::network(&e))?;
        let body = decode_body(&bytes);

        if status.is_success() {
            Ok(Response { status, body })
        } else {
            tracing::debug!(method = %request.method, path = %request.path, status = status.as_u16(), "request failed");
            Err(TransportError::from_status(status.as_u16(), body))
        }
    }

    /// Current jar value of a cookie for the API origin.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.jar.cookies(&self.origin)?;
        let raw = header.to_str().ok()?;
        raw.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_owned())
        })
    }

    fn csrf_header_value(&self) -> Option<HeaderValue> {
        let token = self.cookie(CSRF_COOKIE_NAME).filter(|t| !t.is_empty())?;
        match HeaderValue::from_str(&token) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "csrf cookie is not a valid header value; omitting header");
                None
            }
        }
    }

    pub(crate) fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        let joined = format!("{}/{}", self.api_url, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| TransportError::InvalidUrl(format!("{joined}: {e}")))
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
