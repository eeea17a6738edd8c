//! The endpoint for registering a new user.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::Response,
};
use axum_extra::extract::CookieJar;
use email_address::EmailAddress;
use jsonwebtoken::EncodingKey;
use rusqlite::Connection;
use serde::Deserialize;
use time::Duration;

use crate::{
    AppState, Error,
    auth::{
        PasswordHash,
        log_in::start_session,
        user::{DEFAULT_CURRENCY, NewUser, create_user},
    },
    extract::{JsonBody, missing_fields, non_blank},
    response::success,
    user::get_user_profile,
};

/// The state needed for creating a new user.
#[derive(Clone)]
pub struct RegistrationState {
    /// Signs the token placed in the auth cookie.
    pub encoding_key: EncodingKey,
    /// The duration for which the auth token and cookie are valid.
    pub session_duration: Duration,
    /// The bcrypt cost for hashing the new password.
    pub password_hash_cost: u32,
    /// The database connection for storing the user.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for RegistrationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            encoding_key: state.jwt_keys.encoding_key.clone(),
            session_duration: state.session_duration,
            password_hash_cost: state.password_hash_cost,
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The data for registering a new user.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default, deserialize_with = "non_blank")]
    name: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    currency: Option<String>,
}

/// A route handler for registering a new user.
///
/// Responds with the new user's profile and logs them in by setting the auth cookie.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if the name, email or password is missing,
/// - [Error::InvalidInput] if the email is not a valid email address,
/// - [Error::DuplicateEmail] if the email is already registered,
/// - or an internal error if the password could not be hashed or the user could not be stored.
pub async fn register_user(
    State(state): State<RegistrationState>,
    jar: CookieJar,
    JsonBody(form): JsonBody<RegisterForm>,
) -> Result<(CookieJar, Response), Error> {
    let (Some(name), Some(email), Some(password)) = (
        &form.name,
        &form.email,
        form.password.as_deref().filter(|password| !password.is_empty()),
    ) else {
        return Err(missing_fields([
            ("name", form.name.is_none()),
            ("email", form.email.is_none()),
            (
                "password",
                form.password.as_deref().is_none_or(str::is_empty),
            ),
        ]));
    };

    if !EmailAddress::is_valid(email) {
        return Err(Error::InvalidInput(format!(
            "{email} is not a valid email address"
        )));
    }

    let password_hash = PasswordHash::new(password, state.password_hash_cost)?;

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let user = create_user(
        NewUser {
            name: name.to_owned(),
            email: email.to_owned(),
            password_hash,
            currency: form
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned()),
        },
        &connection,
    )?;
    let profile = get_user_profile(&user, &connection)?;
    drop(connection);

    tracing::info!("Registered user {}", user.id);

    let jar = start_session(
        jar,
        user.id,
        &state.encoding_key,
        state.session_duration,
    )?;

    Ok((jar, success(StatusCode::CREATED, profile)?))
}

#[cfg(test)]
mod register_user_tests {
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::{
        auth::cookie::COOKIE_TOKEN,
        endpoints,
        test_utils::{get_test_app_config, get_test_server},
    };

    fn server() -> TestServer {
        get_test_server(get_test_app_config())
    }

    #[tokio::test]
    async fn register_user_succeeds() {
        let server = server();

        let response = server
            .post(endpoints::REGISTER)
            .json(&json!({
                "name": "Alice",
                "email": " Alice@Example.com ",
                "password": "averysafeandsecurepassword",
            }))
            .await;

        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["name"], "Alice");
        assert_eq!(body["data"]["email"], "alice@example.com");
        assert_eq!(body["data"]["currency"], "USD");
        assert_eq!(body["data"]["totalBudgets"], 0);
        assert!(body["data"].get("password").is_none());

        let cookie = response.cookie(COOKIE_TOKEN);
        assert!(!cookie.value().is_empty());
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[tokio::test]
    async fn register_user_lists_missing_fields() {
        let server = server();

        let response = server
            .post(endpoints::REGISTER)
            .json(&json!({ "email": "alice@example.com", "password": "" }))
            .await;

        response.assert_status_bad_request();
        response.assert_json(&json!({
            "status": "fail",
            "data": {
                "message": "Missing required fields: name, password",
                "fields": ["name", "password"],
            }
        }));
    }

    #[tokio::test]
    async fn register_user_rejects_invalid_email() {
        let server = server();

        server
            .post(endpoints::REGISTER)
            .json(&json!({
                "name": "Alice",
                "email": "not an email",
                "password": "averysafeandsecurepassword",
            }))
            .await
            .assert_status_bad_request();
    }

    #[tokio::test]
    async fn register_user_fails_with_duplicate_email() {
        let server = server();
        let form = json!({
            "name": "Alice",
            "email": "alice@example.com",
            "password": "averysafeandsecurepassword",
        });
        server
            .post(endpoints::REGISTER)
            .json(&form)
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let response = server
            .post(endpoints::REGISTER)
            .json(&json!({
                "name": "Mallory",
                "email": "ALICE@example.com",
                "password": "anotherpassword",
            }))
            .await;

        response.assert_status(axum::http::StatusCode::CONFLICT);
        response.assert_json(&json!({
            "status": "fail",
            "data": { "message": "Email already in use. Please log in." }
        }));

        // The original account still logs in with the original password.
        server
            .post(endpoints::LOG_IN)
            .json(&json!({
                "email": "alice@example.com",
                "password": "averysafeandsecurepassword",
            }))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn register_user_rejects_malformed_json() {
        let server = server();

        let response = server
            .post(endpoints::REGISTER)
            .content_type("application/json")
            .text("{ not json")
            .await;

        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["status"], "fail");
    }
}
