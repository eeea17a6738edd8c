//! Defines the core data models and database queries for transactions.

use rusqlite::{Connection, Row, ToSql};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, UtcOffset};

use crate::{
    Error,
    auth::UserID,
    database_id::TransactionId,
    date_format,
    money::positive_amount,
    ownership::{OwnedResource, OwnerScope, get_owned, update_owned},
    text_enum::text_enum,
};

// ============================================================================
// MODELS
// ============================================================================

text_enum! {
    /// Whether money was earned or spent.
    pub enum TransactionType {
        /// Money earned, e.g. a salary payment.
        Income => "income",
        /// Money spent.
        Expense => "expense",
    }
}

/// An expense or income, i.e. an event where money was either spent or earned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The user that recorded the transaction.
    pub user_id: UserID,
    /// Whether the money was earned or spent.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// A free text category, e.g. "Groceries".
    pub category: String,
    /// The amount of money spent or earned, always positive.
    pub amount: f64,
    /// When the transaction happened.
    #[serde(with = "date_format::date")]
    pub date: Date,
    /// A text description of what the transaction was for.
    pub description: String,
    /// When the transaction was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the transaction was last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The validated details of a transaction to store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Whether the money was earned or spent.
    pub transaction_type: TransactionType,
    /// A free text category, e.g. "Groceries".
    pub category: String,
    /// The amount of money, must be greater than zero.
    pub amount: f64,
    /// When the transaction happened.
    pub date: Date,
    /// A text description of what the transaction was for.
    pub description: String,
}

/// Changes to some of the fields of a transaction. `None` leaves a field as is.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionChanges {
    /// A new transaction type.
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    /// A new category.
    #[serde(default, deserialize_with = "crate::extract::non_blank")]
    pub category: Option<String>,
    /// A new amount.
    pub amount: Option<f64>,
    /// A new date.
    #[serde(default, with = "date_format::option_date")]
    pub date: Option<Date>,
    /// A new description.
    pub description: Option<String>,
}

/// Which column to sort a list of transactions by.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Sort by the transaction date.
    #[default]
    Date,
    /// Sort by the amount.
    Amount,
}

/// The direction of a sort.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest or oldest first.
    Asc,
    /// Largest or newest first.
    #[default]
    Desc,
}

/// The optional search criteria for listing transactions. All given criteria must match.
#[derive(Debug, Default, Clone)]
pub struct TransactionFilter {
    /// Only transactions of this type.
    pub transaction_type: Option<TransactionType>,
    /// Only transactions in exactly this category.
    pub category: Option<String>,
    /// Only transactions of at least this amount.
    pub min_amount: Option<f64>,
    /// Only transactions of at most this amount.
    pub max_amount: Option<f64>,
    /// Only transactions on or after this date.
    pub start_date: Option<Date>,
    /// Only transactions on or before this date.
    pub end_date: Option<Date>,
    /// Only transactions whose description contains this text, ignoring case.
    pub description: Option<String>,
    /// Only transactions recorded at or after this time.
    pub created_after: Option<OffsetDateTime>,
    /// Only transactions recorded at or before this time.
    pub created_before: Option<OffsetDateTime>,
}

impl TransactionFilter {
    /// Narrow `scope` to the transactions matching this filter.
    pub(crate) fn apply(self, scope: OwnerScope) -> OwnerScope {
        scope
            .and_some("type = ?", self.transaction_type)
            .and_some("category = ?", self.category)
            .and_some("amount >= ?", self.min_amount)
            .and_some("amount <= ?", self.max_amount)
            .and_some("date >= ?", self.start_date)
            .and_some("date <= ?", self.end_date)
            // Timestamps are stored in UTC, so they compare correctly as text once in UTC too.
            .and_some("created_at >= ?", self.created_after.map(to_utc))
            .and_some("created_at <= ?", self.created_before.map(to_utc))
            .and_some(
                "description LIKE ? ESCAPE '\\'",
                self.description.map(|text| format!("%{}%", escape_like(&text))),
            )
    }
}

fn to_utc(timestamp: OffsetDateTime) -> OffsetDateTime {
    timestamp.to_offset(UtcOffset::UTC)
}

/// Escape the wildcard characters in `text` for a `LIKE` pattern using '\' as the escape.
pub(crate) fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// The `ORDER BY` clause for sorting by `sort_by` in `order`.
///
/// Ties are broken by ID so that paging is stable.
pub(crate) fn order_by(sort_by: SortBy, order: SortOrder) -> &'static str {
    match (sort_by, order) {
        (SortBy::Date, SortOrder::Asc) => "date ASC, id ASC",
        (SortBy::Date, SortOrder::Desc) => "date DESC, id DESC",
        (SortBy::Amount, SortOrder::Asc) => "amount ASC, id ASC",
        (SortBy::Amount, SortOrder::Desc) => "amount DESC, id DESC",
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

impl OwnedResource for Transaction {
    const NAME: &'static str = "Transaction";
    const TABLE: &'static str = "\"transaction\"";
    const COLUMNS: &'static str =
        "id, user_id, type, category, amount, date, description, created_at, updated_at";

    fn map_row(row: &Row) -> Result<Self, rusqlite::Error> {
        map_transaction_row(row)
    }
}

fn validate(new_transaction: NewTransaction) -> Result<NewTransaction, Error> {
    positive_amount("amount", new_transaction.amount)?;

    if new_transaction.category.trim().is_empty() {
        return Err(Error::InvalidInput("category must not be empty".to_owned()));
    }

    Ok(new_transaction)
}

/// Create a new transaction owned by `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if the amount is not greater than zero or the category is empty,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    user_id: UserID,
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let new_transaction = validate(new_transaction)?;
    let now = OffsetDateTime::now_utc();

    let transaction = connection
        .prepare(&format!(
            "INSERT INTO \"transaction\"
                (user_id, type, category, amount, date, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             RETURNING {}",
            Transaction::COLUMNS
        ))?
        .query_row(
            (
                user_id.as_i64(),
                new_transaction.transaction_type,
                new_transaction.category,
                new_transaction.amount,
                new_transaction.date,
                new_transaction.description,
                now,
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Apply `changes` to the transaction `id` owned by `user_id`.
///
/// The merged transaction is validated the same way as a new one.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if there is no transaction `id` owned by `user_id`,
/// - [Error::InvalidInput] if the merged transaction is invalid,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_transaction(
    id: TransactionId,
    user_id: UserID,
    changes: TransactionChanges,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let current: Transaction = get_owned(id, user_id, connection)?;

    let merged = validate(NewTransaction {
        transaction_type: changes
            .transaction_type
            .unwrap_or(current.transaction_type),
        category: changes.category.unwrap_or(current.category),
        amount: changes.amount.unwrap_or(current.amount),
        date: changes.date.unwrap_or(current.date),
        description: changes.description.unwrap_or(current.description),
    })?;
    let now = OffsetDateTime::now_utc();

    update_owned(
        id,
        user_id,
        &[
            ("type", &merged.transaction_type as &dyn ToSql),
            ("category", &merged.category),
            ("amount", &merged.amount),
            ("date", &merged.date),
            ("description", &merged.description),
            ("updated_at", &now),
        ],
        connection,
    )
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                type TEXT NOT NULL,
                category TEXT NOT NULL,
                amount REAL NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
                )",
        (),
    )?;

    // Listing and analytics always filter by owner, then usually by date.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_date ON \"transaction\"(user_id, date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        transaction_type: row.get(2)?,
        category: row.get(3)?,
        amount: row.get(4)?,
        date: row.get(5)?,
        description: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
