//! Spending budgets per category.
//!
//! A budget's `spentPercentage` is stored with the budget and recomputed in the same write
//! whenever `currentSpent` or `budgetLimit` changes, so it is never stale.

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
    database_id::BudgetId,
    date_format,
    extract::{JsonBody, PathParam, QueryParams, missing_fields, non_blank},
    money::{non_negative_amount, positive_amount, round_2dp},
    ownership::{OwnedResource, OwnerScope, delete_owned, get_owned, list_owned, update_owned},
    pagination::{Page, PageQuery, PaginationConfig},
    response::{no_content, success},
    text_enum::text_enum,
};

text_enum! {
    /// How often a budget resets.
    pub enum BudgetPeriod {
        /// Every week.
        Weekly => "weekly",
        /// Every month.
        Monthly => "monthly",
    }
}

/// A limit on how much to spend in a category over a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    /// The ID of the budget.
    pub id: BudgetId,
    /// The user that owns the budget.
    pub user_id: UserID,
    /// A display name, defaults to the category.
    pub name: String,
    /// The spending category the budget applies to.
    pub category: String,
    /// The most that should be spent.
    pub budget_limit: f64,
    /// How much has been spent so far.
    pub current_spent: f64,
    /// `current_spent` as a percentage of `budget_limit`, rounded to two decimal places.
    pub spent_percentage: f64,
    /// How often the budget resets.
    pub period: BudgetPeriod,
    /// The first day the budget applies to.
    #[serde(with = "date_format::date")]
    pub start_date: Date,
    /// The last day the budget applies to.
    #[serde(with = "date_format::date")]
    pub end_date: Date,
    /// When the budget was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The percentage of `budget_limit` that `current_spent` makes up, rounded to two decimal places.
pub fn spent_percentage(current_spent: f64, budget_limit: f64) -> f64 {
    if budget_limit > 0.0 {
        round_2dp(current_spent / budget_limit * 100.0)
    } else {
        0.0
    }
}

/// The validated details of a budget to store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBudget {
    /// A display name.
    pub name: String,
    /// The spending category.
    pub category: String,
    /// The most that should be spent, greater than zero.
    pub budget_limit: f64,
    /// How much has been spent so far, zero or more.
    pub current_spent: f64,
    /// How often the budget resets.
    pub period: BudgetPeriod,
    /// The first day the budget applies to.
    pub start_date: Date,
    /// The last day the budget applies to, no earlier than `start_date`.
    pub end_date: Date,
}

fn validate(budget: NewBudget) -> Result<NewBudget, Error> {
    positive_amount("budgetLimit", budget.budget_limit)?;
    non_negative_amount("currentSpent", budget.current_spent)?;

    if budget.category.trim().is_empty() {
        return Err(Error::InvalidInput("category must not be empty".to_owned()));
    }

    if budget.end_date < budget.start_date {
        return Err(Error::InvalidInput(
            "endDate must not be before startDate".to_owned(),
        ));
    }

    Ok(budget)
}

impl OwnedResource for Budget {
    const NAME: &'static str = "Budget";
    const TABLE: &'static str = "budget";
    const COLUMNS: &'static str = "id, user_id, name, category, budget_limit, current_spent, \
        spent_percentage, period, start_date, end_date, created_at";

    fn map_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            user_id: UserID::new(row.get(1)?),
            name: row.get(2)?,
            category: row.get(3)?,
            budget_limit: row.get(4)?,
            current_spent: row.get(5)?,
            spent_percentage: row.get(6)?,
            period: row.get(7)?,
            start_date: row.get(8)?,
            end_date: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

/// Create the budget table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_budget_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS budget (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                budget_limit REAL NOT NULL,
                current_spent REAL NOT NULL,
                spent_percentage REAL NOT NULL,
                period TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_budget_user ON budget(user_id);",
        (),
    )?;

    Ok(())
}

/// Create a budget owned by `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if the budget is invalid,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_budget(
    user_id: UserID,
    budget: NewBudget,
    connection: &Connection,
) -> Result<Budget, Error> {
    let budget = validate(budget)?;

    let budget = connection
        .prepare(&format!(
            "INSERT INTO budget (user_id, name, category, budget_limit, current_spent, \
                spent_percentage, period, start_date, end_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             RETURNING {}",
            Budget::COLUMNS
        ))?
        .query_row(
            (
                user_id.as_i64(),
                &budget.name,
                &budget.category,
                budget.budget_limit,
                budget.current_spent,
                spent_percentage(budget.current_spent, budget.budget_limit),
                budget.period,
                budget.start_date,
                budget.end_date,
                OffsetDateTime::now_utc(),
            ),
            Budget::map_row,
        )?;

    Ok(budget)
}

/// Changes to some of the fields of a budget. `None` leaves a field as is.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetChanges {
    /// A new name.
    #[serde(default, deserialize_with = "non_blank")]
    pub name: Option<String>,
    /// A new category.
    #[serde(default, deserialize_with = "non_blank")]
    pub category: Option<String>,
    /// A new limit.
    pub budget_limit: Option<f64>,
    /// A new spent amount.
    pub current_spent: Option<f64>,
    /// A new period.
    pub period: Option<BudgetPeriod>,
    /// A new start date.
    #[serde(default, with = "date_format::option_date")]
    pub start_date: Option<Date>,
    /// A new end date.
    #[serde(default, with = "date_format::option_date")]
    pub end_date: Option<Date>,
}

/// Apply `changes` to the budget `id` owned by `user_id`, recomputing `spent_percentage`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if there is no budget `id` owned by `user_id`,
/// - [Error::InvalidInput] if the merged budget is invalid,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_budget(
    id: BudgetId,
    user_id: UserID,
    changes: BudgetChanges,
    connection: &Connection,
) -> Result<Budget, Error> {
    let current: Budget = get_owned(id, user_id, connection)?;

    let merged = validate(NewBudget {
        name: changes.name.unwrap_or(current.name),
        category: changes.category.unwrap_or(current.category),
        budget_limit: changes.budget_limit.unwrap_or(current.budget_limit),
        current_spent: changes.current_spent.unwrap_or(current.current_spent),
        period: changes.period.unwrap_or(current.period),
        start_date: changes.start_date.unwrap_or(current.start_date),
        end_date: changes.end_date.unwrap_or(current.end_date),
    })?;
    let spent_percentage = spent_percentage(merged.current_spent, merged.budget_limit);

    update_owned(
        id,
        user_id,
        &[
            ("name", &merged.name as &dyn ToSql),
            ("category", &merged.category),
            ("budget_limit", &merged.budget_limit),
            ("current_spent", &merged.current_spent),
            ("spent_percentage", &spent_percentage),
            ("period", &merged.period),
            ("start_date", &merged.start_date),
            ("end_date", &merged.end_date),
        ],
        connection,
    )
}

/// The state needed by the budget routes.
#[derive(Debug, Clone)]
pub struct BudgetState {
    /// The database connection for managing budgets.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The config that controls how to page through budgets.
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for BudgetState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// The body of a request to create a budget.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetForm {
    #[serde(default, deserialize_with = "non_blank")]
    name: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    category: Option<String>,
    budget_limit: Option<f64>,
    current_spent: Option<f64>,
    period: Option<BudgetPeriod>,
    #[serde(default, with = "date_format::option_date")]
    start_date: Option<Date>,
    #[serde(default, with = "date_format::option_date")]
    end_date: Option<Date>,
}

/// A route handler for creating a budget for the logged in user.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if the category, limit or end date is missing,
/// - [Error::InvalidInput] if the budget is invalid,
/// - or an internal error if the budget could not be stored.
pub async fn create_budget_endpoint(
    State(state): State<BudgetState>,
    Extension(user): Extension<User>,
    JsonBody(form): JsonBody<BudgetForm>,
) -> Result<Response, Error> {
    let (Some(category), Some(budget_limit), Some(end_date)) =
        (&form.category, form.budget_limit, form.end_date)
    else {
        return Err(missing_fields([
            ("category", form.category.is_none()),
            ("budgetLimit", form.budget_limit.is_none()),
            ("endDate", form.end_date.is_none()),
        ]));
    };

    let new_budget = NewBudget {
        name: form.name.clone().unwrap_or_else(|| category.to_owned()),
        category: category.to_owned(),
        budget_limit,
        current_spent: form.current_spent.unwrap_or(0.0),
        period: form.period.unwrap_or(BudgetPeriod::Monthly),
        start_date: form
            .start_date
            .unwrap_or_else(|| OffsetDateTime::now_utc().date()),
        end_date,
    };

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let budget = create_budget(user.id, new_budget, &connection)?;

    success(StatusCode::CREATED, budget)
}

/// A route handler for listing the logged in user's budgets, newest first.
///
/// # Errors
///
/// Returns an internal error if the budgets could not be read.
pub async fn get_budgets_endpoint(
    State(state): State<BudgetState>,
    Extension(user): Extension<User>,
    QueryParams(query): QueryParams<PageQuery>,
) -> Result<Response, Error> {
    let page = Page::from_query(query, &state.pagination_config);

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    list_owned::<Budget>(
        &OwnerScope::new(user.id),
        "created_at DESC, id DESC",
        page,
        &connection,
    )?
    .into_response("totalBudgets")
}

/// A route handler for getting one of the logged in user's budgets.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the budget does not exist or belongs to someone else.
pub async fn get_budget_endpoint(
    State(state): State<BudgetState>,
    Extension(user): Extension<User>,
    PathParam(budget_id): PathParam<BudgetId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let budget: Budget = get_owned(budget_id, user.id, &connection)?;

    success(StatusCode::OK, budget)
}

/// A route handler for editing one of the logged in user's budgets.
///
/// # Errors
///
/// Returns a:
/// - [Error::NotFound] if the budget does not exist or belongs to someone else,
/// - [Error::InvalidInput] if the edited budget would be invalid,
/// - or an internal error if the budget could not be stored.
pub async fn update_budget_endpoint(
    State(state): State<BudgetState>,
    Extension(user): Extension<User>,
    PathParam(budget_id): PathParam<BudgetId>,
    JsonBody(changes): JsonBody<BudgetChanges>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let budget = update_budget(budget_id, user.id, changes, &connection)?;

    success(StatusCode::OK, budget)
}

/// A route handler for deleting one of the logged in user's budgets.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the budget does not exist or belongs to someone else.
pub async fn delete_budget_endpoint(
    State(state): State<BudgetState>,
    Extension(user): Extension<User>,
    PathParam(budget_id): PathParam<BudgetId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    delete_owned::<Budget>(budget_id, user.id, &connection)?;

    Ok(no_content())
}
