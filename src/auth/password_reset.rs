//! Password reset by emailed link.
//!
//! A reset token is 32 random bytes, hex-encoded. Only the SHA-256 digest of a token is stored,
//! together with the email it was issued for and an expiry time. Tokens are single use: the
//! stored row is deleted by the request that redeems it, before the new password is hashed.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::Response,
};
use rand::{RngCore, rngs::OsRng};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::{
    AppState, Error,
    auth::{
        PasswordHash,
        user::{get_user_by_email, normalize_email, update_password},
    },
    extract::{JsonBody, PathParam, missing_fields, non_blank},
    mail::{Mail, Mailer},
    response::success,
};

/// How long a reset link stays valid.
pub const RESET_TOKEN_DURATION: Duration = Duration::minutes(15);

const RESET_TOKEN_BYTES: usize = 32;

const FORGOT_PASSWORD_MESSAGE: &str =
    "If that email is registered, a password reset link has been sent to it.";

/// Create the table for pending password reset tokens.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_password_reset_token_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS password_reset_token (
                token_hash TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                expires_at INTEGER NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn hash_token(raw_token: &str) -> String {
    Sha256::digest(raw_token.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn generate_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);

    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Issue a reset token for `email` that expires [RESET_TOKEN_DURATION] after `now`.
///
/// Tokens that expired before `now` are deleted first. Returns the raw token, which is never
/// stored.
///
/// # Errors
///
/// Returns an [Error::SqlError] if the token could not be stored.
pub fn create_reset_token(
    email: &str,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<String, Error> {
    connection.execute(
        "DELETE FROM password_reset_token WHERE expires_at < ?1",
        (now.unix_timestamp(),),
    )?;

    let raw_token = generate_token();
    connection.execute(
        "INSERT INTO password_reset_token (token_hash, email, expires_at) VALUES (?1, ?2, ?3)",
        (
            hash_token(&raw_token),
            normalize_email(email),
            (now + RESET_TOKEN_DURATION).unix_timestamp(),
        ),
    )?;

    Ok(raw_token)
}

/// Use up `raw_token` and get the email it was issued for, if the token is still valid at `now`.
///
/// The token is deleted in the same statement that reads it, so it can only be used once even
/// when several requests present it at the same time. An expired token is deleted too.
///
/// # Errors
///
/// Returns a:
/// - [Error::InvalidResetToken] if the token is unknown, already used or expired,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn consume_reset_token(
    raw_token: &str,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<String, Error> {
    let email: Option<String> = connection
        .query_row(
            "DELETE FROM password_reset_token
             WHERE token_hash = ?1 AND expires_at >= ?2
             RETURNING email",
            (hash_token(raw_token), now.unix_timestamp()),
            |row| row.get(0),
        )
        .optional()?;

    match email {
        Some(email) => Ok(email),
        None => {
            delete_reset_token(raw_token, connection)?;
            Err(Error::InvalidResetToken)
        }
    }
}

/// Delete `raw_token` so that it cannot be used again.
///
/// # Errors
///
/// Returns an [Error::SqlError] if the token could not be deleted.
pub fn delete_reset_token(raw_token: &str, connection: &Connection) -> Result<(), Error> {
    connection.execute(
        "DELETE FROM password_reset_token WHERE token_hash = ?1",
        (hash_token(raw_token),),
    )?;

    Ok(())
}

/// The state needed for the password reset routes.
#[derive(Debug, Clone)]
pub struct PasswordResetState {
    /// The database connection for looking up users and storing tokens.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Delivers the reset link.
    pub mailer: Arc<dyn Mailer>,
    /// The origin of the front end, the base of the reset link.
    pub frontend_url: String,
    /// The bcrypt cost for hashing the new password.
    pub password_hash_cost: u32,
}

impl FromRef<AppState> for PasswordResetState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            mailer: state.mailer.clone(),
            frontend_url: state.frontend_url.clone(),
            password_hash_cost: state.password_hash_cost,
        }
    }
}

/// The body of a forgot-password request.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    #[serde(default, deserialize_with = "non_blank")]
    email: Option<String>,
}

/// Email a password reset link to a registered user.
///
/// The response is the same whether or not the email is registered, so this route cannot be
/// used to find out who has an account.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if the email is missing,
/// - [Error::MailError] if the email could not be sent,
/// - or an internal error if the token could not be stored.
pub async fn forgot_password(
    State(state): State<PasswordResetState>,
    JsonBody(form): JsonBody<ForgotPasswordForm>,
) -> Result<Response, Error> {
    let Some(email) = form.email else {
        return Err(missing_fields([("email", true)]));
    };

    let reset_token = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        match get_user_by_email(&email, &connection) {
            Ok(user) => Some((
                user.email,
                create_reset_token(&email, OffsetDateTime::now_utc(), &connection)?,
            )),
            Err(Error::NotFound(_)) => None,
            Err(error) => return Err(error),
        }
    };

    match reset_token {
        Some((email, raw_token)) => {
            let reset_url = format!("{}/reset-password/{raw_token}", state.frontend_url);
            state.mailer.send(Mail {
                to: email,
                subject: "Password Reset Request".to_owned(),
                body: format!(
                    "You requested a password reset. Open {reset_url} to choose a new password. \
                     This link is valid for 15 minutes."
                ),
            })?;
        }
        None => tracing::debug!("Password reset requested for unregistered email"),
    }

    success(StatusCode::OK, FORGOT_PASSWORD_MESSAGE)
}

/// The body of a reset-password request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordForm {
    #[serde(default)]
    new_password: Option<String>,
}

/// Set a new password using the token from a reset link.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if the new password is missing,
/// - [Error::InvalidResetToken] if the token is unknown, already used or expired,
/// - or an internal error if the password could not be hashed or stored.
pub async fn reset_password(
    State(state): State<PasswordResetState>,
    PathParam(raw_token): PathParam<String>,
    JsonBody(form): JsonBody<ResetPasswordForm>,
) -> Result<Response, Error> {
    let Some(new_password) = form.new_password.filter(|password| !password.is_empty()) else {
        return Err(missing_fields([("newPassword", true)]));
    };

    let email = {
        let connection = state
            .db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        consume_reset_token(&raw_token, OffsetDateTime::now_utc(), &connection)?
    };

    let password_hash = PasswordHash::new(&new_password, state.password_hash_cost)?;

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let user = get_user_by_email(&email, &connection)?;
    update_password(user.id, &password_hash, &connection)?;

    tracing::info!("Password reset for user {}", user.id);

    success(StatusCode::OK, "Password has been reset successfully.")
}

#[cfg(test)]
mod password_reset_store_tests {
    use rusqlite::Connection;
    use time::{Duration, OffsetDateTime};

    use crate::{Error, db::initialize};

    use super::{
        RESET_TOKEN_DURATION, consume_reset_token, create_reset_token, delete_reset_token,
        hash_token,
    };

    fn get_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    fn count_tokens(connection: &Connection) -> i64 {
        connection
            .query_row("SELECT COUNT(*) FROM password_reset_token", [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    #[test]
    fn token_is_hex_encoded_and_stored_hashed() {
        let connection = get_connection();

        let raw_token =
            create_reset_token("foo@bar.baz", OffsetDateTime::now_utc(), &connection).unwrap();

        assert_eq!(raw_token.len(), 64);
        assert!(raw_token.chars().all(|c| c.is_ascii_hexdigit()));
        let stored_hash: String = connection
            .query_row("SELECT token_hash FROM password_reset_token", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(stored_hash, hash_token(&raw_token));
        assert_ne!(stored_hash, raw_token);
    }

    #[test]
    fn token_is_valid_until_expiry() {
        let connection = get_connection();
        let now = OffsetDateTime::now_utc();
        let raw_token = create_reset_token("Foo@Bar.baz", now, &connection).unwrap();

        let email =
            consume_reset_token(&raw_token, now + RESET_TOKEN_DURATION, &connection).unwrap();

        assert_eq!(email, "foo@bar.baz");
    }

    #[test]
    fn token_is_rejected_after_expiry() {
        let connection = get_connection();
        let now = OffsetDateTime::now_utc();
        let raw_token = create_reset_token("foo@bar.baz", now, &connection).unwrap();

        let result = consume_reset_token(
            &raw_token,
            now + RESET_TOKEN_DURATION + Duration::seconds(1),
            &connection,
        );

        assert_eq!(result, Err(Error::InvalidResetToken));
        assert_eq!(count_tokens(&connection), 0);
    }

    #[test]
    fn token_can_only_be_used_once() {
        let connection = get_connection();
        let now = OffsetDateTime::now_utc();
        let raw_token = create_reset_token("foo@bar.baz", now, &connection).unwrap();

        assert_eq!(
            consume_reset_token(&raw_token, now, &connection),
            Ok("foo@bar.baz".to_owned())
        );
        assert_eq!(
            consume_reset_token(&raw_token, now, &connection),
            Err(Error::InvalidResetToken)
        );
        assert_eq!(count_tokens(&connection), 0);
    }

    #[test]
    fn unknown_token_is_rejected() {
        let connection = get_connection();

        let result = consume_reset_token("deadbeef", OffsetDateTime::now_utc(), &connection);

        assert_eq!(result, Err(Error::InvalidResetToken));
    }

    #[test]
    fn deleted_token_is_rejected() {
        let connection = get_connection();
        let now = OffsetDateTime::now_utc();
        let raw_token = create_reset_token("foo@bar.baz", now, &connection).unwrap();

        delete_reset_token(&raw_token, &connection).unwrap();

        assert_eq!(
            consume_reset_token(&raw_token, now, &connection),
            Err(Error::InvalidResetToken)
        );
    }

    #[test]
    fn creating_token_sweeps_expired_tokens() {
        let connection = get_connection();
        let long_ago = OffsetDateTime::now_utc() - Duration::hours(1);
        create_reset_token("old@bar.baz", long_ago, &connection).unwrap();
        create_reset_token("old@bar.baz", long_ago, &connection).unwrap();

        create_reset_token("new@bar.baz", OffsetDateTime::now_utc(), &connection).unwrap();

        assert_eq!(count_tokens(&connection), 1);
    }
}

#[cfg(test)]
mod password_reset_endpoint_tests {
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    use crate::{
        endpoints::{self, format_endpoint},
        test_utils::{
            RecordingMailer, get_test_app_config, get_test_server, register_test_user,
        },
    };

    use super::{FORGOT_PASSWORD_MESSAGE, create_reset_token};

    const PASSWORD: &str = "averysafeandsecurepassword";

    async fn server_with_user() -> (TestServer, RecordingMailer, crate::AppState) {
        let mut state = get_test_app_config();
        let mailer = RecordingMailer::default();
        state.mailer = std::sync::Arc::new(mailer.clone());
        let server = get_test_server(state.clone());
        register_test_user(&server, "foo@bar.baz", PASSWORD).await;

        (server, mailer, state)
    }

    fn token_from_mail(body: &str) -> String {
        let start = body
            .find("/reset-password/")
            .expect("mail should contain a reset link")
            + "/reset-password/".len();

        body[start..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect()
    }

    #[tokio::test]
    async fn forgot_password_sends_reset_link() {
        let (server, mailer, _) = server_with_user().await;

        let response = server
            .post(endpoints::FORGOT_PASSWORD)
            .json(&json!({ "email": "FOO@bar.baz" }))
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({ "status": "success", "data": FORGOT_PASSWORD_MESSAGE }));
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "foo@bar.baz");
        assert!(
            sent[0]
                .body
                .contains("http://localhost:5173/reset-password/")
        );
        assert_eq!(token_from_mail(&sent[0].body).len(), 64);
    }

    #[tokio::test]
    async fn forgot_password_gives_same_response_for_unknown_email() {
        let (server, mailer, _) = server_with_user().await;

        let response = server
            .post(endpoints::FORGOT_PASSWORD)
            .json(&json!({ "email": "nobody@bar.baz" }))
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({ "status": "success", "data": FORGOT_PASSWORD_MESSAGE }));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn forgot_password_requires_email() {
        let (server, _, _) = server_with_user().await;

        server
            .post(endpoints::FORGOT_PASSWORD)
            .json(&json!({}))
            .await
            .assert_status_bad_request();
    }

    #[tokio::test]
    async fn reset_password_changes_password_once() {
        let (server, mailer, _) = server_with_user().await;
        server
            .post(endpoints::FORGOT_PASSWORD)
            .json(&json!({ "email": "foo@bar.baz" }))
            .await
            .assert_status_ok();
        let token = token_from_mail(&mailer.sent()[0].body);
        let reset_url = format_endpoint(endpoints::RESET_PASSWORD, &token);

        let response = server
            .post(&reset_url)
            .json(&json!({ "newPassword": "anewandbetterpassword" }))
            .await;

        response.assert_status_ok();
        server
            .post(endpoints::LOG_IN)
            .json(&json!({ "email": "foo@bar.baz", "password": "anewandbetterpassword" }))
            .await
            .assert_status_ok();
        server
            .post(endpoints::LOG_IN)
            .json(&json!({ "email": "foo@bar.baz", "password": PASSWORD }))
            .await
            .assert_status_unauthorized();

        let second_attempt = server
            .post(&reset_url)
            .json(&json!({ "newPassword": "yetanotherpassword" }))
            .await;

        second_attempt.assert_status_bad_request();
        second_attempt.assert_json(&json!({
            "status": "fail",
            "data": { "message": "Invalid or expired reset token." }
        }));
    }

    #[tokio::test]
    async fn reset_password_rejects_expired_token() {
        let (server, _, state) = server_with_user().await;
        let token = create_reset_token(
            "foo@bar.baz",
            OffsetDateTime::now_utc() - Duration::minutes(16),
            &state.db_connection.lock().unwrap(),
        )
        .unwrap();

        server
            .post(&format_endpoint(endpoints::RESET_PASSWORD, &token))
            .json(&json!({ "newPassword": "anewandbetterpassword" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reset_password_requires_new_password() {
        let (server, _, state) = server_with_user().await;
        let token = create_reset_token(
            "foo@bar.baz",
            OffsetDateTime::now_utc(),
            &state.db_connection.lock().unwrap(),
        )
        .unwrap();

        let response = server
            .post(&format_endpoint(endpoints::RESET_PASSWORD, &token))
            .json(&json!({}))
            .await;

        response.assert_status_bad_request();
        response.assert_json(&json!({
            "status": "fail",
            "data": {
                "message": "Missing required fields: newPassword",
                "fields": ["newPassword"],
            }
        }));
    }
}
