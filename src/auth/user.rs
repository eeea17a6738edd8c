//! Code for creating the user table and storing and fetching users.

use std::fmt::Display;

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, auth::PasswordHash};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The currency assigned to new users who do not pick one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// A registered user of the application.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The user's display name.
    pub name: String,
    /// The user's email address, trimmed and lower-cased.
    pub email: String,
    /// The user's password hash.
    pub password_hash: PasswordHash,
    /// The user's preferred currency code, e.g. "USD".
    pub currency: String,
    /// When the user registered.
    pub created_at: OffsetDateTime,
    /// When the user's details last changed.
    pub updated_at: OffsetDateTime,
}

/// The details needed to register a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// The user's display name.
    pub name: String,
    /// The user's email address.
    pub email: String,
    /// The user's password hash.
    pub password_hash: PasswordHash,
    /// The user's preferred currency code.
    pub currency: String,
}

/// Trim and lower-case an email address so that lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password TEXT NOT NULL,
                currency TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

const USER_COLUMNS: &str = "id, name, email, password, currency, created_at, updated_at";

fn map_user_row(row: &Row) -> Result<User, rusqlite::Error> {
    let raw_password_hash: String = row.get(3)?;

    Ok(User {
        id: UserID::new(row.get(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        currency: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Create and insert a new user into the database.
///
/// # Errors
///
/// Returns a:
/// - [Error::DuplicateEmail] if the email is already registered,
/// - or [Error::SqlError] if some other SQL related error occurred.
pub fn create_user(new_user: NewUser, connection: &Connection) -> Result<User, Error> {
    let now = OffsetDateTime::now_utc();

    connection
        .prepare(&format!(
            "INSERT INTO user (name, email, password, currency, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             RETURNING {USER_COLUMNS}"
        ))?
        .query_row(
            (
                new_user.name,
                normalize_email(&new_user.email),
                new_user.password_hash.as_ref(),
                new_user.currency,
                now,
            ),
            map_user_row,
        )
        .map_err(Error::from)
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!("SELECT {USER_COLUMNS} FROM user WHERE id = :id"))?
        .query_row(&[(":id", &user_id.as_i64())], map_user_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("User"),
            error => error.into(),
        })
}

/// Get the user registered with `email`, compared case-insensitively.
///
/// # Errors
///
/// This function will return an error if:
/// - `email` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_email(email: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare(&format!(
            "SELECT {USER_COLUMNS} FROM user WHERE email = :email"
        ))?
        .query_row(&[(":email", &normalize_email(email))], map_user_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("User"),
            error => error.into(),
        })
}

/// The profile fields a user may change directly.
#[derive(Debug, Default, Clone)]
pub struct ProfileChanges {
    /// A new display name.
    pub name: Option<String>,
    /// A new email address.
    pub email: Option<String>,
    /// A new currency code.
    pub currency: Option<String>,
}

/// Apply `changes` to the user `user_id` and return the updated user.
///
/// # Errors
///
/// Returns a:
/// - [Error::NotFound] if the user does not exist,
/// - [Error::DuplicateEmail] if the new email is registered to someone else,
/// - or [Error::SqlError] if some other SQL related error occurred.
pub fn update_profile(
    user_id: UserID,
    changes: ProfileChanges,
    connection: &Connection,
) -> Result<User, Error> {
    let user = get_user_by_id(user_id, connection)?;
    let name = changes.name.unwrap_or(user.name);
    let email = changes
        .email
        .map(|email| normalize_email(&email))
        .unwrap_or(user.email);
    let currency = changes.currency.unwrap_or(user.currency);

    connection
        .prepare(&format!(
            "UPDATE user SET name = ?1, email = ?2, currency = ?3, updated_at = ?4
             WHERE id = ?5
             RETURNING {USER_COLUMNS}"
        ))?
        .query_row(
            (
                name,
                email,
                currency,
                OffsetDateTime::now_utc(),
                user_id.as_i64(),
            ),
            map_user_row,
        )
        .map_err(Error::from)
}

/// Replace the password hash of user `user_id`.
///
/// # Errors
///
/// Returns a:
/// - [Error::NotFound] if the user does not exist,
/// - or [Error::SqlError] if some other SQL related error occurred.
pub fn update_password(
    user_id: UserID,
    password_hash: &PasswordHash,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE user SET password = ?1, updated_at = ?2 WHERE id = ?3",
        (
            password_hash.as_ref(),
            OffsetDateTime::now_utc(),
            user_id.as_i64(),
        ),
    )?;

    match rows_affected {
        0 => Err(Error::NotFound("User")),
        _ => Ok(()),
    }
}

/// Delete the user `user_id`. Rows owned by the user are removed by cascade.
///
/// # Errors
///
/// Returns a:
/// - [Error::NotFound] if the user does not exist,
/// - or [Error::SqlError] if some other SQL related error occurred.
pub fn delete_user(user_id: UserID, connection: &Connection) -> Result<(), Error> {
    match connection.execute("DELETE FROM user WHERE id = ?1", (user_id.as_i64(),))? {
        0 => Err(Error::NotFound("User")),
        _ => Ok(()),
    }
}
