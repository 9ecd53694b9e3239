//! Response interception: credential refresh and single replay on 401.
//!
//! DESIGN
//! ======
//! Every intercepted call starts as an unmarked `Attempt`. On a 401 the
//! interceptor marks it, refreshes the access cookie, and replays the marked
//! attempt once. The replay's outcome is returned as-is: a marked attempt is
//! never refreshed again, so an invalid refreshed credential cannot loop.
//!
//! TRADE-OFFS
//! ==========
//! `RefreshPolicy::PerRequest` issues one refresh per failing request, which
//! is the identity service's expected client behavior. `Coalesced` shares one
//! in-flight refresh between concurrent failures; every waiter then replays
//! its own request.

use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::json;

use crate::config::RefreshPolicy;
use crate::endpoints;
use crate::error::TransportError;
use crate::session::Session;
use crate::store::SessionStore;
use crate::transport::{Request, Response, Transport};

// =============================================================================
// ATTEMPT
// =============================================================================

/// A request plus its retry marker. Marking produces a new value; the request
/// it wraps is never shared with another attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    request: Request,
    retried: bool,
}

impl Attempt {
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self { request, retried: false }
    }

    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[must_use]
    pub fn retried(&self) -> bool {
        self.retried
    }

    /// The same request, marked as already replayed after a refresh.
    #[must_use]
    pub fn into_retry(self) -> Self {
        Self { request: self.request, retried: true }
    }
}

// =============================================================================
// INTERCEPTOR TRAIT
// =============================================================================

/// Hook run on the outcome of every `Transport::execute`.
#[async_trait::async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(
        &self,
        transport: &Transport,
        attempt: Attempt,
        outcome: Result<Response, TransportError>,
    ) -> Result<Response, TransportError>;
}

// =============================================================================
// REFRESH INTERCEPTOR
// =============================================================================

type RefreshFuture = Shared<BoxFuture<'static, Result<(), TransportError>>>;

/// Refreshes credentials on 401 and replays the failed request once.
pub struct RefreshInterceptor {
    store: SessionStore,
    policy: RefreshPolicy,
    in_flight: Mutex<Option<RefreshFuture>>,
}

impl RefreshInterceptor {
    #[must_use]
    pub fn new(store: SessionStore, policy: RefreshPolicy) -> Self {
        Self { store, policy, in_flight: Mutex::new(None) }
    }

    /// Whether a 401 on this attempt may be recovered by a refresh.
    fn should_refresh(attempt: &Attempt) -> bool {
        let path = attempt.request().path.as_str();
        // A 401 from the refresh call is terminal; from the credential
        // exchange it means wrong credentials.
        !attempt.retried() && path != endpoints::TOKEN_REFRESH && path != endpoints::TOKEN
    }

    async fn refresh(&self, transport: &Transport) -> Result<(), TransportError> {
        match self.policy {
            RefreshPolicy::PerRequest => send_refresh(transport.clone()).await,
            RefreshPolicy::Coalesced => {
                let shared = {
                    let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                    match slot.as_ref() {
                        Some(pending) => {
                            tracing::debug!("joining in-flight credential refresh");
                            pending.clone()
                        }
                        None => {
                            let pending = send_refresh(transport.clone()).boxed().shared();
                            *slot = Some(pending.clone());
                            pending
                        }
                    }
                };

                let outcome = shared.clone().await;

                let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.as_ref().is_some_and(|pending| pending.ptr_eq(&shared)) {
                    *slot = None;
                }
                outcome
            }
        }
    }
}

async fn send_refresh(transport: Transport) -> Result<(), TransportError> {
    let request = Request::post(endpoints::TOKEN_REFRESH, Some(json!({})));
    transport.dispatch(&request).await.map(|_| ())
}

#[async_trait::async_trait]
impl ResponseInterceptor for RefreshInterceptor {
    async fn intercept(
        &self,
        transport: &Transport,
        attempt: Attempt,
        outcome: Result<Response, TransportError>,
    ) -> Result<Response, TransportError> {
        let err = match outcome {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        if !err.is_unauthorized() || !Self::should_refresh(&attempt) {
            return Err(err);
        }

        let retry = attempt.into_retry();
        let request = retry.request();
        tracing::debug!(method = %request.method, path = %request.path, "access rejected; refreshing credentials");

        match self.refresh(transport).await {
            Ok(()) => {
                tracing::debug!(method = %request.method, path = %request.path, "credentials refreshed; replaying request");
                transport.dispatch(request).await
            }
            Err(refresh_err) => {
                tracing::warn!(error = %refresh_err, path = %request.path, "credential refresh failed; signing out");
                self.store.update(Session::without_user);
                Err(refresh_err)
            }
        }
    }
}

#[cfg(test)]
#[path = "interceptor_test.rs"]
mod tests;
