//! In-process mock of the identity service for tests.
//!
//! The default behavior follows the Django views: `/csrf/` seeds the CSRF
//! cookie, `/token/` checks the CSRF header and credentials and sets the JWT
//! cookies, `/users/me/` and friends require a live access cookie,
//! `/token/refresh/` rotates the access cookie, `/logout/` deletes both.
//! Replies can be scripted per route to force failures, delays or hangs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::session::UserProfile;

pub const API_PREFIX: &str = "/api";
pub const EMAIL: &str = "a@b.com";
pub const PASSWORD: &str = "p";
/// Caller-supplied header the mock records, to check headers survive a replay.
pub const TRACE_HEADER: &str = "x-trace";

/// Profile served for the mock's single account.
#[must_use]
pub fn account() -> UserProfile {
    UserProfile { id: 1, email: EMAIL.to_owned(), name: "Ada".to_owned() }
}

/// One request as seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub csrf_header: Option<String>,
    pub trace_header: Option<String>,
    pub cookies: HashMap<String, String>,
    pub body: Value,
}

impl RecordedCall {
    /// `"METHOD /path/"`, the key used for scripting and assertions.
    #[must_use]
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Scripted reply for the next call to a route.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with this status and JSON body.
    Json(u16, Value),
    /// Never answer.
    Hang,
    /// Wait, then behave normally.
    Delay(Duration),
    /// Behave normally (placeholder to script a later call).
    Default,
}

#[derive(Default)]
struct MockInner {
    calls: Vec<RecordedCall>,
    scripts: HashMap<String, VecDeque<MockReply>>,
    user: Option<UserProfile>,
    access: HashSet<String>,
    refresh: HashSet<String>,
    issued: u64,
}

#[derive(Clone, Default)]
struct MockState {
    inner: Arc<Mutex<MockInner>>,
}

/// Running mock server; aborted on drop.
pub struct MockIdentity {
    pub api_url: String,
    state: MockState,
    server: JoinHandle<()>,
}

impl MockIdentity {
    pub async fn start() -> Self {
        let state = MockState::default();
        state.inner.lock().unwrap().user = Some(account());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("mock bind should succeed");
        let addr = listener.local_addr().expect("mock listener should have an address");
        let app = Router::new().fallback(handle).with_state(state.clone());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock identity server failed");
        });

        Self { api_url: format!("http://{addr}{API_PREFIX}"), state, server }
    }

    #[must_use]
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.api_url.clone())
    }

    /// Queue a reply for the next unscripted call to `route` (`"GET /users/me/"`).
    pub fn script(&self, route: &str, reply: MockReply) {
        let mut inner = self.state.inner.lock().unwrap();
        inner.scripts.entry(route.to_owned()).or_default().push_back(reply);
    }

    /// Invalidate every issued access cookie (refresh cookies stay valid).
    pub fn expire_access(&self) {
        self.state.inner.lock().unwrap().access.clear();
    }

    /// Invalidate every issued access and refresh cookie.
    pub fn expire_all(&self) {
        let mut inner = self.state.inner.lock().unwrap();
        inner.access.clear();
        inner.refresh.clear();
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.inner.lock().unwrap().calls.clone()
    }

    #[must_use]
    pub fn routes(&self) -> Vec<String> {
        self.calls().iter().map(RecordedCall::route).collect()
    }

    #[must_use]
    pub fn count(&self, route: &str) -> usize {
        self.routes().iter().filter(|r| *r == route).count()
    }

    pub fn clear_calls(&self) {
        self.state.inner.lock().unwrap().calls.clear();
    }
}

impl Drop for MockIdentity {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Address on which nothing listens.
pub async fn unreachable_api_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind should succeed");
    let addr = listener.local_addr().expect("listener should have an address");
    drop(listener);
    format!("http://{addr}{API_PREFIX}")
}

// =============================================================================
// HANDLER
// =============================================================================

async fn handle(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    let path = uri.path().strip_prefix(API_PREFIX).unwrap_or(uri.path()).to_owned();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let call = RecordedCall {
        method: method.as_str().to_owned(),
        path,
        csrf_header: header_value(&headers, "x-csrftoken"),
        trace_header: header_value(&headers, TRACE_HEADER),
        cookies: jar.iter().map(|c| (c.name().to_owned(), c.value().to_owned())).collect(),
        body,
    };
    let route = call.route();

    let scripted = {
        let mut inner = state.inner.lock().unwrap();
        inner.calls.push(call.clone());
        inner.scripts.get_mut(&route).and_then(VecDeque::pop_front)
    };

    match scripted {
        Some(MockReply::Json(status, body)) => {
            let status = StatusCode::from_u16(status).expect("scripted status should be valid");
            return (status, Json(body)).into_response();
        }
        Some(MockReply::Hang) => return std::future::pending::<Response>().await,
        Some(MockReply::Delay(delay)) => tokio::time::sleep(delay).await,
        Some(MockReply::Default) | None => {}
    }

    default_reply(&state, &call, jar)
}

fn default_reply(state: &MockState, call: &RecordedCall, jar: CookieJar) -> Response {
    let mut inner = state.inner.lock().unwrap();
    let has_access = call.cookies.get("access_token").is_some_and(|t| inner.access.contains(t));

    match (call.method.as_str(), call.path.as_str()) {
        ("GET", "/csrf/") => {
            let token = call.cookies.get("csrftoken").cloned().unwrap_or_else(|| "csrf-secret-1".to_owned());
            let jar = jar.add(cookie("csrftoken", token));
            (jar, Json(json!({ "detail": "CSRF cookie set" }))).into_response()
        }
        ("POST", "/token/") => {
            let csrf_ok = matches!(
                (call.cookies.get("csrftoken"), call.csrf_header.as_ref()),
                (Some(cookie), Some(header)) if cookie == header
            );
            if !csrf_ok {
                return error(StatusCode::FORBIDDEN, "CSRF Failed: CSRF token missing or incorrect.");
            }
            let email = call.body.get("email").and_then(Value::as_str);
            let password = call.body.get("password").and_then(Value::as_str);
            if email != Some(EMAIL) || password != Some(PASSWORD) {
                return error(StatusCode::UNAUTHORIZED, "No active account found with the given credentials");
            }
            inner.issued += 1;
            let access = format!("access-{}", inner.issued);
            let refresh = format!("refresh-{}", inner.issued);
            inner.access.insert(access.clone());
            inner.refresh.insert(refresh.clone());
            let jar = jar.add(cookie("access_token", access)).add(cookie("refresh_token", refresh));
            (jar, Json(json!({ "detail": "Login successful" }))).into_response()
        }
        ("POST", "/token/refresh/") => {
            let valid = call.cookies.get("refresh_token").is_some_and(|t| inner.refresh.contains(t));
            if !valid {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" })),
                )
                    .into_response();
            }
            inner.issued += 1;
            let access = format!("access-{}", inner.issued);
            inner.access.insert(access.clone());
            let jar = jar.add(cookie("access_token", access));
            (jar, Json(json!({ "detail": "Token refreshed" }))).into_response()
        }
        ("POST", "/token/verify/") if has_access => Json(json!({})).into_response(),
        ("GET", "/users/me/") if has_access => Json(json!(inner.user)).into_response(),
        ("PATCH", path) if has_access && path.starts_with("/users/") => {
            let Some(user) = inner.user.as_mut() else {
                return error(StatusCode::NOT_FOUND, "Not found.");
            };
            if path != format!("/users/{}/", user.id) {
                return error(StatusCode::NOT_FOUND, "Not found.");
            }
            if let Some(name) = call.body.get("name").and_then(Value::as_str) {
                user.name = name.to_owned();
            }
            Json(json!(user)).into_response()
        }
        ("POST", "/token/verify/") | ("GET", "/users/me/") | ("PATCH", _) => {
            error(StatusCode::UNAUTHORIZED, "Authentication credentials were not provided.")
        }
        ("POST", "/logout/") => {
            let jar = jar.remove(cookie("access_token", String::new())).remove(cookie("refresh_token", String::new()));
            (jar, Json(json!({ "detail": "Logged out" }))).into_response()
        }
        _ => error(StatusCode::NOT_FOUND, "Not found."),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

fn cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value)).path("/").build()
}

fn error(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}
