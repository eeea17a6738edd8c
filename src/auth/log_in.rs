//! This file defines the route for handling log-in requests.
//! The auth module handles the lower level authentication and cookie auth logic.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::Response,
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::EncodingKey;
use rusqlite::Connection;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::{
    AppState, Error,
    auth::{
        UserID, cookie::set_auth_cookie, token::encode_jwt, user::get_user_by_email,
    },
    extract::{JsonBody, missing_fields, non_blank},
    response::success,
    user::get_user_profile,
};

/// The state needed to perform a login.
#[derive(Clone)]
pub struct LoginState {
    /// Signs the token placed in the auth cookie.
    pub encoding_key: EncodingKey,
    /// The duration for which the auth token and cookie are valid.
    pub session_duration: Duration,
    /// The database connection for looking up users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for LoginState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            encoding_key: state.jwt_keys.encoding_key.clone(),
            session_duration: state.session_duration,
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The raw data entered by the user in the log-in form.
#[derive(Debug, Deserialize)]
pub struct LogInData {
    /// Email entered during log-in.
    #[serde(default, deserialize_with = "non_blank")]
    pub email: Option<String>,
    /// Password entered during log-in.
    #[serde(default)]
    pub password: Option<String>,
}

/// Issue a token for `user_id` and add the auth cookie carrying it to `jar`.
///
/// # Errors
///
/// Returns an [Error::TokenError] if the token could not be signed.
pub(crate) fn start_session(
    jar: CookieJar,
    user_id: UserID,
    encoding_key: &EncodingKey,
    duration: Duration,
) -> Result<CookieJar, Error> {
    let token = encode_jwt(user_id, OffsetDateTime::now_utc(), duration, encoding_key)?;

    Ok(set_auth_cookie(jar, token, duration))
}

/// Handler for log-in requests.
///
/// On success the response carries the user's profile and the auth cookie.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if the email or password is missing,
/// - [Error::InvalidCredentials] if the email is not registered or the password is wrong,
/// - or an internal error if the password could not be checked.
pub async fn post_log_in(
    State(state): State<LoginState>,
    jar: CookieJar,
    JsonBody(user_data): JsonBody<LogInData>,
) -> Result<(CookieJar, Response), Error> {
    let (Some(email), Some(password)) = (
        &user_data.email,
        user_data.password.as_deref().filter(|password| !password.is_empty()),
    ) else {
        return Err(missing_fields([
            ("email", user_data.email.is_none()),
            (
                "password",
                user_data.password.as_deref().is_none_or(str::is_empty),
            ),
        ]));
    };

    let user = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_user_by_email(email, &connection).map_err(|error| match error {
            Error::NotFound(_) => Error::InvalidCredentials,
            error => error,
        })?
    };

    let is_password_valid = user.password_hash.verify(password).map_err(|error| {
        tracing::error!("Error verifying password: {error}");
        Error::HashingError(error.to_string())
    })?;

    if !is_password_valid {
        return Err(Error::InvalidCredentials);
    }

    let profile = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        get_user_profile(&user, &connection)?
    };

    let jar = start_session(
        jar,
        user.id,
        &state.encoding_key,
        state.session_duration,
    )?;

    Ok((jar, success(StatusCode::OK, profile)?))
}

#[cfg(test)]
mod log_in_tests {
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::{
        auth::cookie::COOKIE_TOKEN,
        endpoints,
        test_utils::{get_test_app_config, get_test_server, register_test_user},
    };

    async fn server_with_user() -> TestServer {
        let server = get_test_server(get_test_app_config());
        register_test_user(&server, "foo@bar.baz", "averysafeandsecurepassword").await;

        server
    }

    #[tokio::test]
    async fn log_in_succeeds_with_valid_credentials() {
        let state = get_test_app_config();
        let session_duration = state.session_duration;
        let server = get_test_server(state);
        register_test_user(&server, "foo@bar.baz", "averysafeandsecurepassword").await;

        let response = server
            .post(endpoints::LOG_IN)
            .json(&json!({
                "email": "Foo@Bar.baz",
                "password": "averysafeandsecurepassword",
            }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["email"], "foo@bar.baz");

        let cookie = response.cookie(COOKIE_TOKEN);
        assert_eq!(cookie.max_age(), Some(session_duration));
        assert_eq!(cookie.secure(), Some(true));
    }

    #[tokio::test]
    async fn log_in_fails_with_missing_credentials() {
        let server = server_with_user().await;

        let response = server.post(endpoints::LOG_IN).json(&json!({})).await;

        response.assert_status_bad_request();
        response.assert_json(&json!({
            "status": "fail",
            "data": {
                "message": "Missing required fields: email, password",
                "fields": ["email", "password"],
            }
        }));
    }

    #[tokio::test]
    async fn log_in_error_does_not_reveal_registered_emails() {
        let server = server_with_user().await;

        let wrong_password = server
            .post(endpoints::LOG_IN)
            .json(&json!({ "email": "foo@bar.baz", "password": "wrongpassword" }))
            .await;
        let unknown_email = server
            .post(endpoints::LOG_IN)
            .json(&json!({ "email": "nobody@bar.baz", "password": "wrongpassword" }))
            .await;

        wrong_password.assert_status_unauthorized();
        unknown_email.assert_status_unauthorized();
        assert_eq!(wrong_password.text(), unknown_email.text());
        wrong_password.assert_json(&json!({
            "status": "fail",
            "data": { "message": "Incorrect credentials. Try again." }
        }));
    }
}
