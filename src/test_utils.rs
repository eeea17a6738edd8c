//! Helpers shared by the tests: in-memory databases, test servers and a mailer that records
//! what it sends.

#![allow(missing_docs)]

use std::sync::{Arc, Mutex};

use axum_extra::extract::cookie::Cookie;
use axum_test::TestServer;
use rusqlite::Connection;
use serde_json::json;
use time::Duration;

use crate::{
    AppState, Error, build_router,
    auth::{COOKIE_TOKEN, NewUser, PasswordHash, UserID, create_user},
    db::initialize,
    endpoints,
    mail::{Mail, Mailer},
};

/// The bcrypt cost used in tests, the lowest bcrypt allows.
pub(crate) const TEST_HASH_COST: u32 = 4;

/// An in-memory database with every table created.
pub(crate) fn get_test_connection() -> Connection {
    let connection = Connection::open_in_memory().expect("Could not open database in memory.");
    initialize(&connection).expect("Could not initialize database.");
    connection
}

/// Insert a user with `email` directly into the database.
pub(crate) fn create_test_user(connection: &Connection, email: &str) -> UserID {
    create_user(
        NewUser {
            name: "Test User".to_owned(),
            email: email.to_owned(),
            password_hash: PasswordHash::new_unchecked("hunter2"),
            currency: "USD".to_owned(),
        },
        connection,
    )
    .expect("Could not create test user.")
    .id
}

/// App state backed by an in-memory database that hashes passwords with [TEST_HASH_COST].
pub(crate) fn get_test_app_config() -> AppState {
    let connection = Connection::open_in_memory().expect("Could not open database in memory.");
    let mut state = AppState::new(
        connection,
        "42",
        Duration::hours(1),
        "http://localhost:5173/",
        Arc::new(RecordingMailer::default()),
    )
    .expect("Could not create app state.");
    state.password_hash_cost = TEST_HASH_COST;
    state
}

pub(crate) fn get_test_server(state: AppState) -> TestServer {
    TestServer::try_new(build_router(state)).expect("Could not create test server.")
}

/// Register a user through the API and return their auth cookie.
pub(crate) async fn register_test_user(
    server: &TestServer,
    email: &str,
    password: &str,
) -> Cookie<'static> {
    let response = server
        .post(endpoints::REGISTER)
        .json(&json!({
            "name": "Test User",
            "email": email,
            "password": password,
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    response.cookie(COOKIE_TOKEN)
}

/// A [Mailer] that keeps every message so tests can inspect them.
#[derive(Debug, Default, Clone)]
pub(crate) struct RecordingMailer {
    sent: Arc<Mutex<Vec<Mail>>>,
}

impl RecordingMailer {
    /// The messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<Mail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, mail: Mail) -> Result<(), Error> {
        self.sent
            .lock()
            .map_err(|_| Error::MailError("mailbox lock poisoned".to_owned()))?
            .push(mail);
        Ok(())
    }
}
