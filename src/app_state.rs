//! Implements a struct that holds the state of the REST server.

use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
};

use axum::extract::FromRef;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rusqlite::Connection;
use time::Duration;

use crate::{
    Error,
    auth::PASSWORD_HASH_COST,
    db::initialize,
    mail::Mailer,
    pagination::PaginationConfig,
};

/// The keys used to sign and verify JSON web tokens.
#[derive(Clone)]
pub struct JwtKeys {
    /// Signs new tokens.
    pub encoding_key: EncodingKey,
    /// Verifies incoming tokens.
    pub decoding_key: DecodingKey,
}

impl JwtKeys {
    /// Create the key pair for HMAC signing with `secret`.
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

impl Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JwtKeys { .. }")
    }
}

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// The keys for signing and verifying the tokens in auth cookies.
    pub jwt_keys: JwtKeys,

    /// The duration for which auth tokens and the cookies carrying them are valid.
    pub session_duration: Duration,

    /// The bcrypt cost used when hashing new passwords.
    pub password_hash_cost: u32,

    /// The config that controls how to page through lists of records.
    pub pagination_config: PaginationConfig,

    /// Delivers password reset emails.
    pub mailer: Arc<dyn Mailer>,

    /// The origin of the front end, used to build links in emails.
    pub frontend_url: String,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        jwt_secret: &str,
        session_duration: Duration,
        frontend_url: &str,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            db_connection: Arc::new(Mutex::new(db_connection)),
            jwt_keys: JwtKeys::new(jwt_secret),
            session_duration,
            password_hash_cost: PASSWORD_HASH_COST,
            pagination_config: PaginationConfig::default(),
            mailer,
            frontend_url: frontend_url.trim_end_matches('/').to_owned(),
        })
    }
}

impl FromRef<AppState> for Arc<Mutex<Connection>> {
    fn from_ref(state: &AppState) -> Self {
        state.db_connection.clone()
    }
}
