//! Session value for the current user.
//!
//! SYSTEM CONTEXT
//! ==============
//! Presentation code reads this to decide between a spinner, the signed-in
//! views and the login form. Values are immutable: every transition builds a
//! whole new `Session` and swaps it into the store.

use serde::{Deserialize, Serialize};

/// Profile returned by `GET /users/me/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// The three observable session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Loading,
    Authenticated,
    Anonymous,
}

/// Who is signed in, and whether a session operation is in flight.
///
/// `loading` takes precedence when deriving the phase, so a re-login while
/// signed in reads as `Loading` until the new profile lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: Option<UserProfile>,
    loading: bool,
}

impl Session {
    /// Startup value: nothing known yet.
    #[must_use]
    pub fn loading() -> Self {
        Self { user: None, loading: true }
    }

    #[must_use]
    pub fn authenticated(user: UserProfile) -> Self {
        Self { user: Some(user), loading: false }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self { user: None, loading: false }
    }

    /// Same user, operation in flight.
    #[must_use]
    pub fn begin_loading(&self) -> Self {
        Self { user: self.user.clone(), loading: true }
    }

    /// Same loading flag, user dropped.
    #[must_use]
    pub fn without_user(&self) -> Self {
        Self { user: None, loading: self.loading }
    }

    /// Same user, no operation in flight.
    #[must_use]
    pub fn settled(&self) -> Self {
        Self { user: self.user.clone(), loading: false }
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.loading {
            SessionPhase::Loading
        } else if self.user.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Anonymous
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::loading()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
