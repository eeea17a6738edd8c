//! Templates for transactions that repeat on a schedule, e.g. rent or a salary.
//!
//! Templates are only stored and edited here. Nothing turns them into transactions yet.

use std::sync::{Arc, Mutex};

use axum::{
    Extension,
    extract::{FromRef, State},
    http::StatusCode,
    response::Response,
};
use rusqlite::{Connection, Row, ToSql};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    AppState, Error,
    auth::{User, UserID},
    database_id::RecurringTransactionId,
    date_format,
    extract::{JsonBody, PathParam, QueryParams, missing_fields, non_blank},
    money::positive_amount,
    ownership::{OwnedResource, OwnerScope, delete_owned, get_owned, list_owned, update_owned},
    pagination::{Page, PageQuery, PaginationConfig},
    response::{no_content, success},
    text_enum::text_enum,
    transaction::TransactionType,
};

text_enum! {
    /// How often a recurring transaction repeats.
    pub enum Frequency {
        /// Every day.
        Daily => "daily",
        /// Every week.
        Weekly => "weekly",
        /// Every month.
        Monthly => "monthly",
        /// Every `customFrequencyDays` days.
        Custom => "custom",
    }
}

/// A template for a transaction that repeats.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTransaction {
    /// The ID of the template.
    pub id: RecurringTransactionId,
    /// The user that owns the template.
    pub user_id: UserID,
    /// Whether the repeated transaction is income or an expense.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// The category of the repeated transaction.
    pub category: String,
    /// The amount of the repeated transaction.
    pub amount: f64,
    /// An optional description.
    pub description: Option<String>,
    /// How often the transaction repeats.
    pub frequency: Frequency,
    /// The number of days between repeats, only set for [Frequency::Custom].
    pub custom_frequency_days: Option<i64>,
    /// The first day the transaction occurs.
    #[serde(with = "date_format::date")]
    pub start_date: Date,
    /// The last day the transaction may occur, if any.
    #[serde(with = "date_format::option_date")]
    pub end_date: Option<Date>,
    /// Whether repeats are on hold.
    pub is_paused: bool,
    /// When the template was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl OwnedResource for RecurringTransaction {
    const NAME: &'static str = "Recurring transaction";
    const TABLE: &'static str = "recurring_transaction";
    const COLUMNS: &'static str = "id, user_id, type, category, amount, description, frequency, \
        custom_frequency_days, start_date, end_date, is_paused, created_at";

    fn map_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            user_id: UserID::new(row.get(1)?),
            transaction_type: row.get(2)?,
            category: row.get(3)?,
            amount: row.get(4)?,
            description: row.get(5)?,
            frequency: row.get(6)?,
            custom_frequency_days: row.get(7)?,
            start_date: row.get(8)?,
            end_date: row.get(9)?,
            is_paused: row.get(10)?,
            created_at: row.get(11)?,
        })
    }
}

/// Create the recurring transaction table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_recurring_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS recurring_transaction (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                type TEXT NOT NULL,
                category TEXT NOT NULL,
                amount REAL NOT NULL,
                description TEXT,
                frequency TEXT NOT NULL,
                custom_frequency_days INTEGER,
                start_date TEXT NOT NULL,
                end_date TEXT,
                is_paused INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_recurring_transaction_user ON recurring_transaction(user_id);",
        (),
    )?;

    Ok(())
}

/// The validated details of a recurring transaction to store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecurringTransaction {
    /// Income or expense.
    pub transaction_type: TransactionType,
    /// The category.
    pub category: String,
    /// The amount, greater than zero.
    pub amount: f64,
    /// An optional description.
    pub description: Option<String>,
    /// How often the transaction repeats.
    pub frequency: Frequency,
    /// Days between repeats, required and positive for [Frequency::Custom].
    pub custom_frequency_days: Option<i64>,
    /// The first day the transaction occurs.
    pub start_date: Date,
    /// The last day the transaction may occur, no earlier than `start_date`.
    pub end_date: Option<Date>,
    /// Whether repeats are on hold.
    pub is_paused: bool,
}

fn validate(template: NewRecurringTransaction) -> Result<NewRecurringTransaction, Error> {
    positive_amount("amount", template.amount)?;

    if template.category.trim().is_empty() {
        return Err(Error::InvalidInput("category must not be empty".to_owned()));
    }

    let custom_frequency_days = match template.frequency {
        Frequency::Custom => match template.custom_frequency_days {
            Some(days) if days > 0 => Some(days),
            _ => {
                return Err(Error::BusinessRule(
                    "Custom frequency requires customFrequencyDays > 0".to_owned(),
                ));
            }
        },
        _ => None,
    };

    if template
        .end_date
        .is_some_and(|end_date| end_date < template.start_date)
    {
        return Err(Error::InvalidInput(
            "endDate must not be before startDate".to_owned(),
        ));
    }

    Ok(NewRecurringTransaction {
        custom_frequency_days,
        ..template
    })
}

/// Create a recurring transaction owned by `user_id`.
///
/// The day count is dropped for frequencies other than [Frequency::Custom].
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if the amount or dates are invalid,
/// - [Error::BusinessRule] if a custom frequency has no positive day count,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_recurring_transaction(
    user_id: UserID,
    template: NewRecurringTransaction,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    let template = validate(template)?;

    let recurring_transaction = connection
        .prepare(&format!(
            "INSERT INTO recurring_transaction (user_id, type, category, amount, description, \
                frequency, custom_frequency_days, start_date, end_date, is_paused, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             RETURNING {}",
            RecurringTransaction::COLUMNS
        ))?
        .query_row(
            (
                user_id.as_i64(),
                template.transaction_type,
                &template.category,
                template.amount,
                &template.description,
                template.frequency,
                template.custom_frequency_days,
                template.start_date,
                template.end_date,
                template.is_paused,
                OffsetDateTime::now_utc(),
            ),
            RecurringTransaction::map_row,
        )?;

    Ok(recurring_transaction)
}

/// Changes to some of the fields of a recurring transaction. `None` leaves a field as is.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTransactionChanges {
    /// A new type.
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    /// A new category.
    #[serde(default, deserialize_with = "non_blank")]
    pub category: Option<String>,
    /// A new amount.
    pub amount: Option<f64>,
    /// A new description.
    pub description: Option<String>,
    /// A new frequency.
    pub frequency: Option<Frequency>,
    /// A new day count for custom frequencies.
    pub custom_frequency_days: Option<i64>,
    /// A new start date.
    #[serde(default, with = "date_format::option_date")]
    pub start_date: Option<Date>,
    /// A new end date.
    #[serde(default, with = "date_format::option_date")]
    pub end_date: Option<Date>,
    /// Pause or resume the template.
    pub is_paused: Option<bool>,
}

/// Apply `changes` to the recurring transaction `id` owned by `user_id`.
///
/// The merged template is validated the same way as a new one.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if there is no recurring transaction `id` owned by `user_id`,
/// - [Error::InvalidInput] or [Error::BusinessRule] if the merged template is invalid,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_recurring_transaction(
    id: RecurringTransactionId,
    user_id: UserID,
    changes: RecurringTransactionChanges,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    let current: RecurringTransaction = get_owned(id, user_id, connection)?;

    let merged = validate(NewRecurringTransaction {
        transaction_type: changes
            .transaction_type
            .unwrap_or(current.transaction_type),
        category: changes.category.unwrap_or(current.category),
        amount: changes.amount.unwrap_or(current.amount),
        description: changes.description.or(current.description),
        frequency: changes.frequency.unwrap_or(current.frequency),
        custom_frequency_days: changes
            .custom_frequency_days
            .or(current.custom_frequency_days),
        start_date: changes.start_date.unwrap_or(current.start_date),
        end_date: changes.end_date.or(current.end_date),
        is_paused: changes.is_paused.unwrap_or(current.is_paused),
    })?;

    update_owned(
        id,
        user_id,
        &[
            ("type", &merged.transaction_type as &dyn ToSql),
            ("category", &merged.category),
            ("amount", &merged.amount),
            ("description", &merged.description),
            ("frequency", &merged.frequency),
            ("custom_frequency_days", &merged.custom_frequency_days),
            ("start_date", &merged.start_date),
            ("end_date", &merged.end_date),
            ("is_paused", &merged.is_paused),
        ],
        connection,
    )
}

/// The state needed by the recurring transaction routes.
#[derive(Debug, Clone)]
pub struct RecurringTransactionState {
    /// The database connection for managing recurring transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The config that controls how to page through recurring transactions.
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for RecurringTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// The body of a request to create a recurring transaction.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTransactionForm {
    #[serde(rename = "type")]
    transaction_type: Option<TransactionType>,
    #[serde(default, deserialize_with = "non_blank")]
    category: Option<String>,
    amount: Option<f64>,
    #[serde(default, deserialize_with = "non_blank")]
    description: Option<String>,
    frequency: Option<Frequency>,
    custom_frequency_days: Option<i64>,
    #[serde(default, with = "date_format::option_date")]
    start_date: Option<Date>,
    #[serde(default, with = "date_format::option_date")]
    end_date: Option<Date>,
    is_paused: Option<bool>,
}

/// A route handler for creating a recurring transaction for the logged in user.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if the type, category, amount or frequency is missing,
/// - [Error::InvalidInput] or [Error::BusinessRule] if the template is invalid,
/// - or an internal error if the template could not be stored.
pub async fn create_recurring_transaction_endpoint(
    State(state): State<RecurringTransactionState>,
    Extension(user): Extension<User>,
    JsonBody(form): JsonBody<RecurringTransactionForm>,
) -> Result<Response, Error> {
    let (Some(transaction_type), Some(category), Some(amount), Some(frequency)) = (
        form.transaction_type,
        &form.category,
        form.amount,
        form.frequency,
    ) else {
        return Err(missing_fields([
            ("type", form.transaction_type.is_none()),
            ("category", form.category.is_none()),
            ("amount", form.amount.is_none()),
            ("frequency", form.frequency.is_none()),
        ]));
    };

    let template = NewRecurringTransaction {
        transaction_type,
        category: category.to_owned(),
        amount,
        description: form.description.clone(),
        frequency,
        custom_frequency_days: form.custom_frequency_days,
        start_date: form
            .start_date
            .unwrap_or_else(|| OffsetDateTime::now_utc().date()),
        end_date: form.end_date,
        is_paused: form.is_paused.unwrap_or(false),
    };

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let recurring_transaction = create_recurring_transaction(user.id, template, &connection)?;

    success(StatusCode::CREATED, recurring_transaction)
}

/// A route handler for listing the logged in user's recurring transactions, newest first.
///
/// # Errors
///
/// Returns an internal error if the templates could not be read.
pub async fn get_recurring_transactions_endpoint(
    State(state): State<RecurringTransactionState>,
    Extension(user): Extension<User>,
    QueryParams(query): QueryParams<PageQuery>,
) -> Result<Response, Error> {
    let page = Page::from_query(query, &state.pagination_config);

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    list_owned::<RecurringTransaction>(
        &OwnerScope::new(user.id),
        "created_at DESC, id DESC",
        page,
        &connection,
    )?
    .into_response("totalRecurringTransactions")
}

/// A route handler for editing one of the logged in user's recurring transactions.
///
/// # Errors
///
/// Returns a:
/// - [Error::NotFound] if the template does not exist or belongs to someone else,
/// - [Error::InvalidInput] or [Error::BusinessRule] if the edited template would be invalid,
/// - or an internal error if the template could not be stored.
pub async fn update_recurring_transaction_endpoint(
    State(state): State<RecurringTransactionState>,
    Extension(user): Extension<User>,
    PathParam(recurring_transaction_id): PathParam<RecurringTransactionId>,
    JsonBody(changes): JsonBody<RecurringTransactionChanges>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let recurring_transaction =
        update_recurring_transaction(recurring_transaction_id, user.id, changes, &connection)?;

    success(StatusCode::OK, recurring_transaction)
}

/// A route handler for deleting one of the logged in user's recurring transactions.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the template does not exist or belongs to someone else.
pub async fn delete_recurring_transaction_endpoint(
    State(state): State<RecurringTransactionState>,
    Extension(user): Extension<User>,
    PathParam(recurring_transaction_id): PathParam<RecurringTransactionId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    delete_owned::<RecurringTransaction>(recurring_transaction_id, user.id, &connection)?;

    Ok(no_content())
}

#[cfg(test)]
mod recurring_transaction_tests {
    use time::macros::date;

    use crate::{
        Error,
        recurring_transaction::{
            Frequency, NewRecurringTransaction, RecurringTransactionChanges,
            create_recurring_transaction, update_recurring_transaction,
        },
        test_utils::{create_test_user, get_test_connection},
        transaction::TransactionType,
    };

    fn rent(frequency: Frequency, custom_frequency_days: Option<i64>) -> NewRecurringTransaction {
        NewRecurringTransaction {
            transaction_type: TransactionType::Expense,
            category: "Housing".to_owned(),
            amount: 1200.0,
            description: Some("Rent".to_owned()),
            frequency,
            custom_frequency_days,
            start_date: date!(2025 - 01 - 01),
            end_date: None,
            is_paused: false,
        }
    }

    #[test]
    fn custom_frequency_requires_positive_days() {
        let conn = get_test_connection();
        let user_id = create_test_user(&conn, "foo@bar.baz");

        for days in [None, Some(0), Some(-3)] {
            let result = create_recurring_transaction(user_id, rent(Frequency::Custom, days), &conn);

            assert_eq!(
                result,
                Err(Error::BusinessRule(
                    "Custom frequency requires customFrequencyDays > 0".to_owned()
                ))
            );
        }

        let template =
            create_recurring_transaction(user_id, rent(Frequency::Custom, Some(14)), &conn)
                .unwrap();
        assert_eq!(template.custom_frequency_days, Some(14));
    }

    #[test]
    fn day_count_dropped_for_fixed_frequencies() {
        let conn = get_test_connection();
        let user_id = create_test_user(&conn, "foo@bar.baz");

        let template =
            create_recurring_transaction(user_id, rent(Frequency::Monthly, Some(14)), &conn)
                .unwrap();

        assert_eq!(template.custom_frequency_days, None);
        assert!(!template.is_paused);
    }

    #[test]
    fn end_date_must_not_precede_start_date() {
        let conn = get_test_connection();
        let user_id = create_test_user(&conn, "foo@bar.baz");

        let result = create_recurring_transaction(
            user_id,
            NewRecurringTransaction {
                end_date: Some(date!(2024 - 12 - 31)),
                ..rent(Frequency::Weekly, None)
            },
            &conn,
        );

        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn switching_to_custom_without_days_is_rejected() {
        let conn = get_test_connection();
        let user_id = create_test_user(&conn, "foo@bar.baz");
        let template =
            create_recurring_transaction(user_id, rent(Frequency::Weekly, None), &conn).unwrap();

        let result = update_recurring_transaction(
            template.id,
            user_id,
            RecurringTransactionChanges {
                frequency: Some(Frequency::Custom),
                ..Default::default()
            },
            &conn,
        );

        assert!(matches!(result, Err(Error::BusinessRule(_))));
    }

    #[test]
    fn update_pauses_template() {
        let conn = get_test_connection();
        let user_id = create_test_user(&conn, "foo@bar.baz");
        let template =
            create_recurring_transaction(user_id, rent(Frequency::Weekly, None), &conn).unwrap();

        let updated = update_recurring_transaction(
            template.id,
            user_id,
            RecurringTransactionChanges {
                is_paused: Some(true),
                amount: Some(1250.0),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();

        assert!(updated.is_paused);
        assert_eq!(updated.amount, 1250.0);
        assert_eq!(updated.category, "Housing");
    }
}
