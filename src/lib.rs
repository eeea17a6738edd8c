//! Fintrack is a personal finance tracker.
//!
//! This library provides a JSON REST API for recording transactions, setting budgets,
//! tracking savings goals and viewing aggregated analytics. Every resource belongs to the
//! user that created it and is only visible to that user.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod analytics;
mod app_state;
mod auth;
mod budget;
mod config;
mod database_id;
mod date_format;
mod db;
mod endpoints;
mod extract;
mod goal;
mod logging;
mod mail;
mod money;
mod notification;
mod ownership;
mod pagination;
mod recurring_transaction;
mod response;
mod routing;
mod text_enum;
mod transaction;
mod user;

#[cfg(test)]
mod test_utils;

pub use app_state::{AppState, JwtKeys};
pub use auth::{PasswordHash, User, UserID};
pub use config::ServerConfig;
pub use db::initialize as initialize_db;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use mail::{LogMailer, Mail, Mailer};
pub use pagination::PaginationConfig;
pub use routing::build_router;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// One or more required fields were missing from the request body or query string.
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// The request could not be parsed, or a field held a value outside its allowed range.
    #[error("{0}")]
    InvalidInput(String),

    /// The request was well formed but would break a rule of the domain, e.g. a contribution
    /// that would take a goal past its target.
    #[error("{0}")]
    BusinessRule(String),

    /// The email and password used to log in do not match a registered user.
    ///
    /// The same error is used for an unknown email and a wrong password so that callers
    /// cannot find out which emails are registered.
    #[error("Incorrect credentials. Try again.")]
    InvalidCredentials,

    /// The request did not carry a valid auth cookie, or the cookie refers to a user that no
    /// longer exists.
    #[error("Please log in to perform this action.")]
    NotAuthenticated,

    /// The current password given when changing password did not match.
    #[error("Incorrect current password.")]
    IncorrectCurrentPassword,

    /// The password reset token is unknown, already used, or expired.
    #[error("Invalid or expired reset token.")]
    InvalidResetToken,

    /// The email is already registered to another user.
    #[error("Email already in use. Please log in.")]
    DuplicateEmail,

    /// The requested resource does not exist or belongs to another user.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// A JSON web token could not be created.
    #[error("could not create token: {0}")]
    TokenError(String),

    /// A message could not be handed to the mail transport.
    #[error("could not send mail: {0}")]
    MailError(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,
}

impl Error {
    /// The HTTP status code sent to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingFields(_)
            | Error::InvalidInput(_)
            | Error::BusinessRule(_)
            | Error::IncorrectCurrentPassword
            | Error::InvalidResetToken => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials | Error::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Error::DuplicateEmail => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::HashingError(_)
            | Error::TokenError(_)
            | Error::MailError(_)
            | Error::SqlError(_)
            | Error::DatabaseLockError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    && desc.ends_with("user.email") =>
            {
                Error::DuplicateEmail
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("Resource"),
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let data = match &self {
            Error::MissingFields(fields) => json!({
                "message": self.to_string(),
                "fields": fields,
            }),
            // Any errors that are not handled above are not intended to be shown to the client.
            _ if status.is_server_error() => {
                tracing::error!("An unexpected error occurred: {}", self);
                json!({ "message": "Something went wrong. Please try again later." })
            }
            _ => json!({ "message": self.to_string() }),
        };

        (status, Json(json!({ "status": "fail", "data": data }))).into_response()
    }
}

#[cfg(test)]
mod error_tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use serde_json::{Value, json};

    use crate::Error;

    async fn response_body(error: Error) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_fields_lists_each_field() {
        let (status, body) = response_body(Error::MissingFields(vec!["name", "email"])).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "status": "fail",
                "data": {
                    "message": "Missing required fields: name, email",
                    "fields": ["name", "email"],
                }
            })
        );
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, body) = response_body(Error::HashingError("bad salt".to_owned())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["data"]["message"],
            "Something went wrong. Please try again later."
        );
    }

    #[tokio::test]
    async fn not_found_names_resource() {
        let (status, body) = response_body(Error::NotFound("Budget")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["data"]["message"], "Budget not found");
    }

    #[test]
    fn duplicate_email_is_conflict() {
        assert_eq!(Error::DuplicateEmail.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn auth_failures_are_unauthorized() {
        assert_eq!(
            Error::NotAuthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
