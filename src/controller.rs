//! Session controller: startup restore, sign-in and sign-out against the identity service.
//!
//! SYSTEM CONTEXT
//! ==============
//! The controller is the only component that knows the identity protocol and
//! the writer of every session transition. It is constructed once per
//! application and handed to presentation code, which reads the store and
//! calls the operations below.
//!
//! ERROR HANDLING
//! ==============
//! `bootstrap` and `logout` run unattended and never fail: errors are logged
//! and the session ends anonymous. `login` surfaces the triggering error
//! unchanged so the form can show the server's message.

use std::sync::Arc;

use serde_json::json;

use crate::config::ClientConfig;
use crate::endpoints;
use crate::error::{SessionError, TransportError};
use crate::interceptor::{RefreshInterceptor, ResponseInterceptor};
use crate::session::{Session, UserProfile};
use crate::store::SessionStore;
use crate::transport::Transport;

/// Orchestrates the session operations over one transport and one store.
pub struct SessionController {
    transport: Transport,
    store: SessionStore,
}

impl SessionController {
    /// Build the store, wire the refresh interceptor into a new transport.
    /// The session starts in the loading phase until `bootstrap` runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let store = SessionStore::new();
        let interceptor: Arc<dyn ResponseInterceptor> = Arc::new(RefreshInterceptor::new(store.clone(), config.refresh_policy));
        let transport = Transport::new(config, Some(interceptor))?;
        Ok(Self { transport, store })
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.store.get()
    }

    /// Resolve the startup session from the identity cookie, if any.
    pub async fn bootstrap(&self) {
        let guard = LoadingGuard::begin(&self.store, |_| Session::anonymous());
        match self.fetch_profile().await {
            Ok(profile) => {
                tracing::info!(user_id = profile.id, "session restored");
                guard.finish(Session::authenticated(profile));
            }
            Err(e) => {
                tracing::debug!(error = %e, "no session to restore");
                guard.finish(Session::anonymous());
            }
        }
    }

    /// Sign in: seed the CSRF cookie, exchange credentials, fetch the profile.
    ///
    /// # Errors
    ///
    /// Returns the error of the first step that failed; the session is then
    /// anonymous.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, TransportError> {
        let guard = LoadingGuard::begin(&self.store, |_| Session::anonymous());
        match self.sign_in(email, password).await {
            Ok(profile) => {
                tracing::info!(user_id = profile.id, "signed in");
                guard.finish(Session::authenticated(profile.clone()));
                Ok(profile)
            }
            Err(e) => {
                tracing::warn!(error = %e, code = e.error_code(), "sign-in failed");
                guard.finish(Session::anonymous());
                Err(e)
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, TransportError> {
        self.transport.get(endpoints::CSRF).await?;
        let credentials = json!({ "email": email, "password": password });
        self.transport.post(endpoints::TOKEN, Some(credentials)).await?;
        self.fetch_profile().await
    }

    /// Sign out. The local session is dropped even if the service call fails.
    pub async fn logout(&self) {
        let guard = LoadingGuard::begin(&self.store, |_| Session::anonymous());
        if let Err(e) = self.transport.post(endpoints::LOGOUT, Some(json!({}))).await {
            tracing::warn!(error = %e, "logout call failed; dropping local session anyway");
        }
        tracing::info!("signed out");
        guard.finish(Session::anonymous());
    }

    /// Ask the service whether the access cookie is still accepted.
    /// A rejected cookie goes through the usual refresh-and-replay first.
    pub async fn verify(&self) -> bool {
        match self.transport.post(endpoints::TOKEN_VERIFY, Some(json!({}))).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "token verification failed");
                false
            }
        }
    }

    /// Rename the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without a user, or the transport error. On
    /// failure the previous user is kept unless a failed refresh signed the
    /// session out in the meantime.
    pub async fn update_name(&self, name: &str) -> Result<UserProfile, SessionError> {
        let current = self.store.get();
        let Some(user_id) = current.user().map(|u| u.id) else {
            return Err(SessionError::NotAuthenticated);
        };

        let guard = LoadingGuard::begin(&self.store, Session::settled);
        let outcome = self
            .transport
            .patch(&endpoints::user_detail(user_id), Some(json!({ "name": name })))
            .await
            .and_then(|response| response.json::<UserProfile>());

        match outcome {
            Ok(profile) => {
                guard.finish(Session::authenticated(profile.clone()));
                Ok(profile)
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id, "profile update failed");
                guard.finish_with(Session::settled);
                Err(e.into())
            }
        }
    }

    async fn fetch_profile(&self) -> Result<UserProfile, TransportError> {
        self.transport.get(endpoints::USERS_ME).await?.json()
    }
}

// =============================================================================
// LOADING GUARD
// =============================================================================

type Transition = fn(&Session) -> Session;

/// Publishes the loading phase on creation and guarantees it is cleared: by
/// `finish`, or by applying `fallback` to the current session if the
/// operation future is dropped first.
struct LoadingGuard<'a> {
    store: &'a SessionStore,
    fallback: Option<Transition>,
}

impl<'a> LoadingGuard<'a> {
    fn begin(store: &'a SessionStore, fallback: Transition) -> Self {
        store.update(Session::begin_loading);
        Self { store, fallback: Some(fallback) }
    }

    fn finish(mut self, session: Session) {
        self.fallback = None;
        self.store.set(session);
    }

    fn finish_with(mut self, next: Transition) {
        self.fallback = None;
        self.store.update(next);
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if let Some(fallback) = self.fallback.take() {
            tracing::debug!("session operation abandoned; settling session");
            self.store.update(fallback);
        }
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
