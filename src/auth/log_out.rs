//! Log-out route handler.

use axum::{http::StatusCode, response::Response};
use axum_extra::extract::CookieJar;

use crate::{Error, auth::cookie::invalidate_auth_cookie, response::success};

/// Invalidate the auth cookie.
///
/// This route does not sit behind the auth guard so that it succeeds even when the cookie has
/// already expired.
pub async fn post_log_out(jar: CookieJar) -> Result<(CookieJar, Response), Error> {
    let jar = invalidate_auth_cookie(jar);

    Ok((
        jar,
        success(StatusCode::OK, "User logged out")?,
    ))
}

#[cfg(test)]
mod log_out_tests {
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    use crate::{
        auth::cookie::COOKIE_TOKEN,
        endpoints,
        test_utils::{get_test_app_config, get_test_server, register_test_user},
    };

    #[tokio::test]
    async fn log_out_invalidates_auth_cookie() {
        let server = get_test_server(get_test_app_config());
        let cookie = register_test_user(&server, "foo@bar.baz", "averysafeandsecurepassword").await;

        let response = server.post(endpoints::LOG_OUT).add_cookie(cookie).await;

        response.assert_status_ok();
        response.assert_json(&json!({
            "status": "success",
            "data": "User logged out"
        }));
        let cookie = response.cookie(COOKIE_TOKEN);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.expires_datetime(), Some(OffsetDateTime::UNIX_EPOCH));
    }

    #[tokio::test]
    async fn log_out_succeeds_without_cookie() {
        let server = get_test_server(get_test_app_config());

        server.post(endpoints::LOG_OUT).await.assert_status_ok();
    }
}
