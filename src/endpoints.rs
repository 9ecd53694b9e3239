//! Identity service routes, relative to the configured API URL.

/// `GET`: seeds the `csrftoken` cookie.
pub const CSRF: &str = "/csrf/";
/// `POST {email, password}`: credential exchange; sets the JWT cookies.
pub const TOKEN: &str = "/token/";
/// `POST`: rotates the access cookie from the refresh cookie.
pub const TOKEN_REFRESH: &str = "/token/refresh/";
/// `POST`: checks the access cookie.
pub const TOKEN_VERIFY: &str = "/token/verify/";
/// `POST`: deletes the JWT cookies.
pub const LOGOUT: &str = "/logout/";
/// `GET`: profile of the signed-in user.
pub const USERS_ME: &str = "/users/me/";

/// `PATCH` target for a single user record.
#[must_use]
pub fn user_detail(user_id: i64) -> String {
    format!("/users/{user_id}/")
}

#[cfg(test)]
#[path = "endpoints_test.rs"]
mod tests;
