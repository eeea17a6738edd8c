//! Defines functions for handling user authentication with cookies.

use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use time::{Duration, OffsetDateTime};

pub(crate) const COOKIE_TOKEN: &str = "jwt";
/// The default duration for which auth cookies and the tokens they carry are valid.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::hours(24);

/// Add the auth cookie holding `token` to the cookie jar.
///
/// The front end is served from another origin, so the cookie is sent cross-site
/// (`SameSite=None`), which browsers only allow for secure cookies.
pub(crate) fn set_auth_cookie(jar: CookieJar, token: String, duration: Duration) -> CookieJar {
    jar.add(
        Cookie::build((COOKIE_TOKEN, token))
            .path("/")
            .max_age(duration)
            .http_only(true)
            .same_site(SameSite::None)
            .secure(true),
    )
}

/// Set the auth cookie to an empty value and set its max age to zero, which should delete the
/// cookie on the client side.
pub(crate) fn invalidate_auth_cookie(jar: CookieJar) -> CookieJar {
    jar.add(
        Cookie::build((COOKIE_TOKEN, ""))
            .path("/")
            .expires(OffsetDateTime::UNIX_EPOCH)
            .max_age(Duration::ZERO)
            .http_only(true)
            .same_site(SameSite::None)
            .secure(true),
    )
}

/// Get the raw token from the auth cookie, if there is a non-empty one.
pub(crate) fn get_token_from_cookies(jar: &CookieJar) -> Option<&str> {
    jar.get(COOKIE_TOKEN)
        .map(|cookie| cookie.value())
        .filter(|token| !token.is_empty())
}
