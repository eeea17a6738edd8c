//! Read-only summaries of a user's transactions.

use std::sync::{Arc, Mutex};

use axum::{Extension, extract::State, http::StatusCode, response::Response};
use rusqlite::{Connection, ToSql, params_from_iter};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    auth::{User, UserID},
    date_format,
    extract::{QueryParams, missing_fields},
    money::round_2dp,
    ownership::{OwnedResource, OwnerScope},
    pagination::MAX_PAGE_SIZE,
    response::success,
    transaction::{Transaction, TransactionType},
};

/// The number of transactions returned by the top transactions route by default.
pub const DEFAULT_TOP_TRANSACTIONS: u64 = 5;

/// Income and expense totals across all of a user's transactions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    /// The sum of all income.
    pub total_income: f64,
    /// The sum of all expenses.
    pub total_expense: f64,
    /// `total_income - total_expense`.
    pub net_savings: f64,
}

/// The total spent in one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    /// The expense category.
    pub category: String,
    /// The sum of the expenses in the category.
    pub total_spent: f64,
}

/// The income and expense totals for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTotals {
    /// The day.
    #[serde(with = "date_format::date")]
    pub date: Date,
    /// The sum of the income on `date`.
    pub total_income: f64,
    /// The sum of the expenses on `date`.
    pub total_expense: f64,
}

/// Sum `user_id`'s income and expenses.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn get_overview(user_id: UserID, connection: &Connection) -> Result<Overview, Error> {
    let (total_income, total_expense): (f64, f64) = connection.query_row(
        &format!(
            "SELECT
                COALESCE(SUM(CASE WHEN type = 'income' THEN amount END), 0),
                COALESCE(SUM(CASE WHEN type = 'expense' THEN amount END), 0)
             FROM {} WHERE user_id = ?1",
            Transaction::TABLE
        ),
        (user_id.as_i64(),),
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let total_income = round_2dp(total_income);
    let total_expense = round_2dp(total_expense);

    // Net savings is derived from the rounded totals so that the three values always agree.
    Ok(Overview {
        total_income,
        total_expense,
        net_savings: round_2dp(total_income - total_expense),
    })
}

/// Sum `user_id`'s expenses per category, largest first.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn get_category_totals(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<CategoryTotal>, Error> {
    connection
        .prepare(&format!(
            "SELECT category, SUM(amount) AS total_spent FROM {}
             WHERE user_id = ?1 AND type = 'expense'
             GROUP BY category
             ORDER BY total_spent DESC, category ASC",
            Transaction::TABLE
        ))?
        .query_map((user_id.as_i64(),), |row| {
            Ok(CategoryTotal {
                category: row.get(0)?,
                total_spent: round_2dp(row.get(1)?),
            })
        })?
        .collect::<Result<Vec<_>, rusqlite::Error>>()
        .map_err(Error::from)
}

/// Sum `user_id`'s income and expenses per day from `start_date` to `end_date` inclusive.
///
/// Days without transactions are left out. The result is sorted by date.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if `start_date` is after `end_date`,
/// - or [Error::SqlError] if there is an SQL error.
pub fn get_daily_totals(
    user_id: UserID,
    start_date: Date,
    end_date: Date,
    connection: &Connection,
) -> Result<Vec<DailyTotals>, Error> {
    if start_date > end_date {
        return Err(Error::InvalidInput(
            "startDate must not be after endDate".to_owned(),
        ));
    }

    connection
        .prepare(&format!(
            "SELECT
                date,
                COALESCE(SUM(CASE WHEN type = 'income' THEN amount END), 0),
                COALESCE(SUM(CASE WHEN type = 'expense' THEN amount END), 0)
             FROM {}
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             GROUP BY date
             ORDER BY date ASC",
            Transaction::TABLE
        ))?
        .query_map((user_id.as_i64(), start_date, end_date), |row| {
            Ok(DailyTotals {
                date: row.get(0)?,
                total_income: round_2dp(row.get(1)?),
                total_expense: round_2dp(row.get(2)?),
            })
        })?
        .collect::<Result<Vec<_>, rusqlite::Error>>()
        .map_err(Error::from)
}

/// Get up to `limit` of `user_id`'s largest transactions, optionally only of one type.
///
/// `limit` is capped at [MAX_PAGE_SIZE].
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn get_top_transactions(
    user_id: UserID,
    transaction_type: Option<TransactionType>,
    limit: u64,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let scope = OwnerScope::new(user_id).and_some("type = ?", transaction_type);
    let limit = i64::try_from(limit.min(MAX_PAGE_SIZE)).unwrap_or(i64::MAX);
    let params = scope.params().chain([&limit as &dyn ToSql]);

    connection
        .prepare(&format!(
            "SELECT {} FROM {} WHERE {} ORDER BY amount DESC, id ASC LIMIT ?",
            Transaction::COLUMNS,
            Transaction::TABLE,
            scope.where_clause()
        ))?
        .query_map(params_from_iter(params), Transaction::map_row)?
        .collect::<Result<Vec<_>, rusqlite::Error>>()
        .map_err(Error::from)
}

/// A route handler for the logged in user's income, expense and savings totals.
///
/// # Errors
///
/// Returns an internal error if the transactions could not be read.
pub async fn get_overview_endpoint(
    State(db_connection): State<Arc<Mutex<Connection>>>,
    Extension(user): Extension<User>,
) -> Result<Response, Error> {
    let connection = db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    success(StatusCode::OK, get_overview(user.id, &connection)?)
}

/// A route handler for the logged in user's spending per category.
///
/// # Errors
///
/// Returns an internal error if the transactions could not be read.
pub async fn get_category_endpoint(
    State(db_connection): State<Arc<Mutex<Connection>>>,
    Extension(user): Extension<User>,
) -> Result<Response, Error> {
    let connection = db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    success(StatusCode::OK, get_category_totals(user.id, &connection)?)
}

/// The query string for the trends route.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendsQuery {
    #[serde(default, with = "date_format::option_date")]
    start_date: Option<Date>,
    #[serde(default, with = "date_format::option_date")]
    end_date: Option<Date>,
}

/// A route handler for the logged in user's daily totals over a date range.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if either date is missing,
/// - [Error::InvalidInput] if a date is malformed or the start is after the end,
/// - or an internal error if the transactions could not be read.
pub async fn get_trends_endpoint(
    State(db_connection): State<Arc<Mutex<Connection>>>,
    Extension(user): Extension<User>,
    QueryParams(query): QueryParams<TrendsQuery>,
) -> Result<Response, Error> {
    let (Some(start_date), Some(end_date)) = (query.start_date, query.end_date) else {
        return Err(missing_fields([
            ("startDate", query.start_date.is_none()),
            ("endDate", query.end_date.is_none()),
        ]));
    };

    let connection = db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let trends = get_daily_totals(user.id, start_date, end_date, &connection)?;

    success(StatusCode::OK, trends)
}

/// The query string for the top transactions route.
#[derive(Debug, Deserialize)]
pub struct TopTransactionsQuery {
    #[serde(rename = "type")]
    transaction_type: Option<TransactionType>,
    limit: Option<u64>,
}

/// A route handler for the logged in user's largest transactions.
///
/// # Errors
///
/// Returns a:
/// - [Error::InvalidInput] if the type is unknown or the limit is zero,
/// - or an internal error if the transactions could not be read.
pub async fn get_top_transactions_endpoint(
    State(db_connection): State<Arc<Mutex<Connection>>>,
    Extension(user): Extension<User>,
    QueryParams(query): QueryParams<TopTransactionsQuery>,
) -> Result<Response, Error> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_TRANSACTIONS);

    if limit == 0 {
        return Err(Error::InvalidInput("limit must be at least 1".to_owned()));
    }

    let connection = db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let transactions =
        get_top_transactions(user.id, query.transaction_type, limit, &connection)?;

    success(StatusCode::OK, transactions)
}
