//! The JSON envelopes used for successful responses.
//!
//! Every body has the shape `{"status": "success", "data": ...}`. Paged listings add the
//! total record count under a resource specific key, plus `currentPage`, `totalPages` and
//! `limit`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::{Error, pagination::Page};

/// Wrap `data` in the success envelope and send it with `status`.
///
/// # Errors
///
/// Returns an [Error::InvalidInput] if `data` cannot be serialized, which only happens for
/// non-finite numbers.
pub(crate) fn success<T: Serialize>(status: StatusCode, data: T) -> Result<Response, Error> {
    let data = serde_json::to_value(data).map_err(|error| {
        tracing::error!("Could not serialize response: {error}");
        Error::InvalidInput("the response could not be encoded as JSON".to_owned())
    })?;

    Ok((status, Json(json!({ "status": "success", "data": data }))).into_response())
}

/// An empty response for successful deletes.
pub(crate) fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// One page of records plus the numbers a client needs to page through the rest.
#[derive(Debug)]
pub(crate) struct Paginated<T> {
    /// The records on this page.
    pub items: Vec<T>,
    /// How many records match the query across all pages.
    pub total: u64,
    /// The page that was requested.
    pub page: Page,
}

impl<T: Serialize> Paginated<T> {
    /// Build the paged envelope, reporting the total under `total_key`, e.g. "totalGoals".
    ///
    /// # Errors
    ///
    /// Returns an [Error::InvalidInput] if the records cannot be serialized.
    pub fn into_response(self, total_key: &str) -> Result<Response, Error> {
        let data = serde_json::to_value(&self.items).map_err(|error| {
            tracing::error!("Could not serialize response: {error}");
            Error::InvalidInput("the response could not be encoded as JSON".to_owned())
        })?;

        let mut body = Map::new();
        body.insert("status".to_owned(), Value::from("success"));
        body.insert("data".to_owned(), data);
        body.insert(total_key.to_owned(), Value::from(self.total));
        body.insert("currentPage".to_owned(), Value::from(self.page.number));
        body.insert(
            "totalPages".to_owned(),
            Value::from(self.page.page_count(self.total)),
        );
        body.insert("limit".to_owned(), Value::from(self.page.limit));

        Ok((StatusCode::OK, Json(Value::Object(body))).into_response())
    }
}
