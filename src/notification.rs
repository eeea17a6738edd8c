//! Short messages for a user, e.g. a budget alert, that can be marked read.

use std::sync::{Arc, Mutex};

use axum::{
    Extension,
    extract::{FromRef, State},
    http::StatusCode,
    response::Response,
};
use rusqlite::{Connection, Row, ToSql};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    auth::{User, UserID},
    database_id::NotificationId,
    extract::{JsonBody, PathParam, QueryParams, missing_fields, non_blank},
    ownership::{OwnedResource, OwnerScope, delete_owned, list_owned, update_owned},
    pagination::{Page, PageQuery, PaginationConfig},
    response::{no_content, success},
};

/// A message for a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// The ID of the notification.
    pub id: NotificationId,
    /// The user the notification is for.
    pub user_id: UserID,
    /// A free-form kind, e.g. "budget".
    #[serde(rename = "type")]
    pub kind: String,
    /// The text shown to the user.
    pub message: String,
    /// Whether the user has seen the notification.
    pub is_read: bool,
    /// When the notification was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl OwnedResource for Notification {
    const NAME: &'static str = "Notification";
    const TABLE: &'static str = "notification";
    const COLUMNS: &'static str = "id, user_id, type, message, is_read, created_at";

    fn map_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            user_id: UserID::new(row.get(1)?),
            kind: row.get(2)?,
            message: row.get(3)?,
            is_read: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

/// Create the notification table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_notification_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS notification (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                type TEXT NOT NULL,
                message TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_notification_user ON notification(user_id);",
        (),
    )?;

    Ok(())
}

/// Create an unread notification for `user_id`.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn create_notification(
    user_id: UserID,
    kind: &str,
    message: &str,
    connection: &Connection,
) -> Result<Notification, Error> {
    let notification = connection
        .prepare(&format!(
            "INSERT INTO notification (user_id, type, message, is_read, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)
             RETURNING {}",
            Notification::COLUMNS
        ))?
        .query_row(
            (user_id.as_i64(), kind, message, OffsetDateTime::now_utc()),
            Notification::map_row,
        )?;

    Ok(notification)
}

/// Mark the notification `id` owned by `user_id` as read or unread.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if there is no notification `id` owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn set_notification_read(
    id: NotificationId,
    user_id: UserID,
    is_read: bool,
    connection: &Connection,
) -> Result<Notification, Error> {
    update_owned(id, user_id, &[("is_read", &is_read as &dyn ToSql)], connection)
}

/// The state needed by the notification routes.
#[derive(Debug, Clone)]
pub struct NotificationState {
    /// The database connection for managing notifications.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The config that controls how to page through notifications.
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for NotificationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// The body of a request to create a notification.
#[derive(Debug, Deserialize)]
pub struct NotificationForm {
    #[serde(rename = "type", default, deserialize_with = "non_blank")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    message: Option<String>,
}

/// A route handler for creating a notification for the logged in user.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if the type or message is missing,
/// - or an internal error if the notification could not be stored.
pub async fn create_notification_endpoint(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
    JsonBody(form): JsonBody<NotificationForm>,
) -> Result<Response, Error> {
    let (Some(kind), Some(message)) = (&form.kind, &form.message) else {
        return Err(missing_fields([
            ("type", form.kind.is_none()),
            ("message", form.message.is_none()),
        ]));
    };

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let notification = create_notification(user.id, kind, message, &connection)?;

    success(StatusCode::CREATED, notification)
}

/// A route handler for listing the logged in user's notifications, newest first.
///
/// # Errors
///
/// Returns an internal error if the notifications could not be read.
pub async fn get_notifications_endpoint(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
    QueryParams(query): QueryParams<PageQuery>,
) -> Result<Response, Error> {
    let page = Page::from_query(query, &state.pagination_config);

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    list_owned::<Notification>(
        &OwnerScope::new(user.id),
        "created_at DESC, id DESC",
        page,
        &connection,
    )?
    .into_response("totalNotifications")
}

/// The body of a request to mark a notification as read or unread.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStatusForm {
    is_read: Option<bool>,
}

/// A route handler for marking one of the logged in user's notifications as read or unread.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if `isRead` is missing,
/// - [Error::NotFound] if the notification does not exist or belongs to someone else.
pub async fn update_notification_endpoint(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
    PathParam(notification_id): PathParam<NotificationId>,
    JsonBody(form): JsonBody<NotificationStatusForm>,
) -> Result<Response, Error> {
    let Some(is_read) = form.is_read else {
        return Err(missing_fields([("isRead", true)]));
    };

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let notification = set_notification_read(notification_id, user.id, is_read, &connection)?;

    success(StatusCode::OK, notification)
}

/// A route handler for deleting one of the logged in user's notifications.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the notification does not exist or belongs to someone else.
pub async fn delete_notification_endpoint(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
    PathParam(notification_id): PathParam<NotificationId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    delete_owned::<Notification>(notification_id, user.id, &connection)?;

    Ok(no_content())
}


#[cfg(test)]
mod notification_endpoint_tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::{
        endpoints::{self, format_endpoint},
        test_utils::{get_test_app_config, get_test_server, register_test_user},
    };

    #[tokio::test]
    async fn update_requires_is_read() {
        let server = get_test_server(get_test_app_config());
        let cookie = register_test_user(&server, "foo@bar.baz", "averysafeandsecurepassword").await;
        let response = server
            .post(endpoints::NOTIFICATIONS)
            .add_cookie(cookie.clone())
            .json(&json!({ "type": "budget", "message": "Over budget" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let id = response.json::<Value>()["data"]["id"].as_i64().unwrap();
        let url = format_endpoint(endpoints::NOTIFICATION, id);

        let response = server
            .put(&url)
            .add_cookie(cookie.clone())
            .json(&json!({}))
            .await;
        response.assert_status_bad_request();
        response.assert_json(&json!({
            "status": "fail",
            "data": {
                "message": "Missing required fields: isRead",
                "fields": ["isRead"],
            }
        }));

        let response = server
            .put(&url)
            .add_cookie(cookie.clone())
            .json(&json!({ "isRead": true }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["isRead"], true);

        let list: Value = server
            .get(endpoints::NOTIFICATIONS)
            .add_cookie(cookie)
            .await
            .json();
        assert_eq!(list["totalNotifications"], 1);
        assert_eq!(list["data"][0]["type"], "budget");
    }

    #[tokio::test]
    async fn create_lists_missing_fields() {
        let server = get_test_server(get_test_app_config());
        let cookie = register_test_user(&server, "foo@bar.baz", "averysafeandsecurepassword").await;

        let response = server
            .post(endpoints::NOTIFICATIONS)
            .add_cookie(cookie)
            .json(&json!({ "message": "hello" }))
            .await;

        response.assert_status_bad_request();
        response.assert_json(&json!({
            "status": "fail",
            "data": {
                "message": "Missing required fields: type",
                "fields": ["type"],
            }
        }));
    }
}
