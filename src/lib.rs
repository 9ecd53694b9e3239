//! Cookie-based session management for a Django REST + SimpleJWT identity
//! service.
//!
//! A [`SessionController`] owns a [`SessionStore`] and a [`Transport`]. The
//! transport keeps the JWT cookies in its jar, mirrors the CSRF cookie into
//! the `X-CSRFToken` header, and hands every response to a
//! [`RefreshInterceptor`] that refreshes expired credentials and replays the
//! failed request once.

pub mod config;
pub mod controller;
pub mod endpoints;
pub mod error;
pub mod interceptor;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use config::{ClientConfig, ConfigError, RefreshPolicy, Timeouts};
pub use controller::SessionController;
pub use error::{SessionError, TransportError};
pub use interceptor::{Attempt, RefreshInterceptor, ResponseInterceptor};
pub use session::{Session, SessionPhase, UserProfile};
pub use store::{SessionStore, Subscription};
pub use transport::{Request, Response, Transport};
