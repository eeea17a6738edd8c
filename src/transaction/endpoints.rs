//! The route handlers for creating, searching, editing and deleting transactions.

use std::sync::{Arc, Mutex};

use axum::{
    Extension,
    extract::{FromRef, State},
    http::StatusCode,
    response::Response,
};
use rusqlite::Connection;
use serde::Deserialize;
use time::{Date, OffsetDateTime};

use crate::{
    AppState, Error,
    auth::User,
    database_id::TransactionId,
    date_format,
    extract::{JsonBody, PathParam, QueryParams, missing_fields, non_blank},
    ownership::{OwnerScope, delete_owned, get_owned, list_owned},
    pagination::{Page, PageQuery, PaginationConfig},
    response::{no_content, success},
    transaction::core::{
        NewTransaction, SortBy, SortOrder, Transaction, TransactionChanges, TransactionFilter,
        TransactionType, create_transaction, order_by, update_transaction,
    },
};

/// The state needed by the transaction routes.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The config that controls how to page through transactions.
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// The body of a request to create a transaction.
#[derive(Debug, Deserialize)]
pub struct TransactionForm {
    #[serde(rename = "type")]
    transaction_type: Option<TransactionType>,
    #[serde(default, deserialize_with = "non_blank")]
    category: Option<String>,
    amount: Option<f64>,
    #[serde(default, with = "date_format::option_date")]
    date: Option<Date>,
    #[serde(default)]
    description: Option<String>,
}

/// A route handler for recording a new transaction for the logged in user.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if the type, category, amount or date is missing,
/// - [Error::InvalidInput] if the amount is not greater than zero,
/// - or an internal error if the transaction could not be stored.
pub async fn create_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user): Extension<User>,
    JsonBody(form): JsonBody<TransactionForm>,
) -> Result<Response, Error> {
    let (Some(transaction_type), Some(category), Some(amount), Some(date)) = (
        form.transaction_type,
        &form.category,
        form.amount,
        form.date,
    ) else {
        return Err(missing_fields([
            ("type", form.transaction_type.is_none()),
            ("category", form.category.is_none()),
            ("amount", form.amount.is_none()),
            ("date", form.date.is_none()),
        ]));
    };

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction = create_transaction(
        user.id,
        NewTransaction {
            transaction_type,
            category: category.to_owned(),
            amount,
            date,
            description: form.description.clone().unwrap_or_default(),
        },
        &connection,
    )?;

    success(StatusCode::CREATED, transaction)
}

/// The query string for searching transactions.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    page: Option<u64>,
    limit: Option<u64>,
    #[serde(rename = "type")]
    transaction_type: Option<TransactionType>,
    #[serde(default, deserialize_with = "non_blank")]
    category: Option<String>,
    min_amount: Option<f64>,
    max_amount: Option<f64>,
    #[serde(default, with = "date_format::option_date")]
    start_date: Option<Date>,
    #[serde(default, with = "date_format::option_date")]
    end_date: Option<Date>,
    #[serde(default, deserialize_with = "non_blank")]
    description: Option<String>,
    #[serde(default, deserialize_with = "date_format::option_timestamp::deserialize")]
    created_after: Option<OffsetDateTime>,
    #[serde(default, deserialize_with = "date_format::option_timestamp::deserialize")]
    created_before: Option<OffsetDateTime>,
    sort_by: Option<SortBy>,
    order: Option<SortOrder>,
}

/// A route handler for listing the logged in user's transactions, one page at a time.
///
/// # Errors
///
/// Returns an internal error if the transactions could not be read.
pub async fn get_transactions_endpoint(
    State(state): State<TransactionState>,
    Extension(user): Extension<User>,
    QueryParams(query): QueryParams<TransactionQuery>,
) -> Result<Response, Error> {
    let page = Page::from_query(
        PageQuery {
            page: query.page,
            limit: query.limit,
        },
        &state.pagination_config,
    );
    let scope = TransactionFilter {
        transaction_type: query.transaction_type,
        category: query.category,
        min_amount: query.min_amount,
        max_amount: query.max_amount,
        start_date: query.start_date,
        end_date: query.end_date,
        description: query.description,
        created_after: query.created_after,
        created_before: query.created_before,
    }
    .apply(OwnerScope::new(user.id));
    let order_by = order_by(
        query.sort_by.unwrap_or_default(),
        query.order.unwrap_or_default(),
    );

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    list_owned::<Transaction>(&scope, order_by, page, &connection)?
        .into_response("totalTransactions")
}

/// A route handler for getting one of the logged in user's transactions.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the transaction does not exist or belongs to someone else.
pub async fn get_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user): Extension<User>,
    PathParam(transaction_id): PathParam<TransactionId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction: Transaction = get_owned(transaction_id, user.id, &connection)?;

    success(StatusCode::OK, transaction)
}

/// A route handler for editing one of the logged in user's transactions.
///
/// # Errors
///
/// Returns a:
/// - [Error::NotFound] if the transaction does not exist or belongs to someone else,
/// - [Error::InvalidInput] if the edited transaction would be invalid,
/// - or an internal error if the transaction could not be stored.
pub async fn update_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user): Extension<User>,
    PathParam(transaction_id): PathParam<TransactionId>,
    JsonBody(changes): JsonBody<TransactionChanges>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction = update_transaction(transaction_id, user.id, changes, &connection)?;

    success(StatusCode::OK, transaction)
}

/// A route handler for deleting one of the logged in user's transactions.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the transaction does not exist or belongs to someone else.
pub async fn delete_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user): Extension<User>,
    PathParam(transaction_id): PathParam<TransactionId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    delete_owned::<Transaction>(transaction_id, user.id, &connection)?;
    tracing::debug!("User {} deleted transaction {transaction_id}", user.id);

    Ok(no_content())
}
