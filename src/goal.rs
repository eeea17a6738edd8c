//! Savings goals and contributions towards them.
//!
//! `currentAmount` only ever changes through [contribute_to_goal], which refuses any
//! contribution that would take it past `targetAmount`. `percentageComplete` and `status` are
//! derived from the two amounts and rewritten on every write.

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
    database_id::GoalId,
    date_format,
    extract::{JsonBody, PathParam, QueryParams, missing_fields, non_blank},
    money::{non_negative_amount, positive_amount, round_2dp, whole_cents},
    ownership::{OwnedResource, OwnerScope, delete_owned, get_owned, list_owned, update_owned},
    pagination::{Page, PageQuery, PaginationConfig},
    response::{no_content, success},
    text_enum::text_enum,
    transaction::escape_like,
};

text_enum! {
    /// Whether a goal has been reached.
    pub enum GoalStatus {
        /// Still saving towards the target.
        Active => "active",
        /// The current amount has reached the target.
        Completed => "completed",
    }
}

/// An amount of money to save by a deadline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialGoal {
    /// The ID of the goal.
    pub id: GoalId,
    /// The user that owns the goal.
    pub user_id: UserID,
    /// What the money is for.
    pub name: String,
    /// How much to save.
    pub target_amount: f64,
    /// How much has been saved so far, never more than `target_amount`.
    pub current_amount: f64,
    /// `current_amount` as a percentage of `target_amount`, rounded to two decimal places.
    pub percentage_complete: f64,
    /// Whether the target has been reached.
    pub status: GoalStatus,
    /// When the money should be saved by.
    #[serde(with = "date_format::date")]
    pub deadline: Date,
    /// An optional category for grouping goals.
    pub category: Option<String>,
    /// When the goal was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the goal was last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The fields derived from a goal's amounts.
fn progress(current_amount: f64, target_amount: f64) -> (f64, GoalStatus) {
    let percentage = if target_amount > 0.0 {
        round_2dp(current_amount / target_amount * 100.0)
    } else {
        0.0
    };
    let status = if current_amount >= target_amount {
        GoalStatus::Completed
    } else {
        GoalStatus::Active
    };

    (percentage, status)
}

impl OwnedResource for FinancialGoal {
    const NAME: &'static str = "Goal";
    const TABLE: &'static str = "goal";
    const COLUMNS: &'static str = "id, user_id, name, target_amount, current_amount, \
        percentage_complete, status, deadline, category, created_at, updated_at";

    fn map_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            user_id: UserID::new(row.get(1)?),
            name: row.get(2)?,
            target_amount: row.get(3)?,
            current_amount: row.get(4)?,
            percentage_complete: row.get(5)?,
            status: row.get(6)?,
            deadline: row.get(7)?,
            category: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

/// Create the goal table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_goal_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS goal (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                target_amount REAL NOT NULL,
                current_amount REAL NOT NULL,
                percentage_complete REAL NOT NULL,
                status TEXT NOT NULL,
                deadline TEXT NOT NULL,
                category TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_goal_user ON goal(user_id);",
        (),
    )?;

    Ok(())
}

/// The validated details of a goal to store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGoal {
    /// What the money is for.
    pub name: String,
    /// How much to save, greater than zero.
    pub target_amount: f64,
    /// How much has already been saved, between zero and `target_amount`.
    pub current_amount: f64,
    /// When the money should be saved by.
    pub deadline: Date,
    /// An optional category.
    pub category: Option<String>,
}

/// Create a goal owned by `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if an amount is out of range or has fractions of a cent,
/// - [Error::BusinessRule] if the current amount is more than the target,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_goal(
    user_id: UserID,
    goal: NewGoal,
    connection: &Connection,
) -> Result<FinancialGoal, Error> {
    let target_amount = whole_cents(
        "targetAmount",
        positive_amount("targetAmount", goal.target_amount)?,
    )?;
    let current_amount = whole_cents(
        "currentAmount",
        non_negative_amount("currentAmount", goal.current_amount)?,
    )?;

    if current_amount > target_amount {
        return Err(Error::BusinessRule(
            "currentAmount must not exceed targetAmount".to_owned(),
        ));
    }

    let (percentage_complete, status) = progress(current_amount, target_amount);
    let now = OffsetDateTime::now_utc();

    let goal = connection
        .prepare(&format!(
            "INSERT INTO goal (user_id, name, target_amount, current_amount, percentage_complete, \
                status, deadline, category, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             RETURNING {}",
            FinancialGoal::COLUMNS
        ))?
        .query_row(
            (
                user_id.as_i64(),
                &goal.name,
                target_amount,
                current_amount,
                percentage_complete,
                status,
                goal.deadline,
                &goal.category,
                now,
                now,
            ),
            FinancialGoal::map_row,
        )?;

    Ok(goal)
}

/// Changes to the editable fields of a goal. `None` leaves a field as is.
///
/// There are no fields for the current amount or status, so clients cannot set them here.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalChanges {
    /// A new name.
    #[serde(default, deserialize_with = "non_blank")]
    pub name: Option<String>,
    /// A new target.
    pub target_amount: Option<f64>,
    /// A new deadline.
    #[serde(default, with = "date_format::option_date")]
    pub deadline: Option<Date>,
    /// A new category.
    #[serde(default, deserialize_with = "non_blank")]
    pub category: Option<String>,
}

/// Apply `changes` to the goal `id` owned by `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if there is no goal `id` owned by `user_id`,
/// - [Error::InvalidInput] if the new target is not greater than zero,
/// - [Error::BusinessRule] if the new target is less than the amount already saved,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_goal(
    id: GoalId,
    user_id: UserID,
    changes: GoalChanges,
    connection: &Connection,
) -> Result<FinancialGoal, Error> {
    let current: FinancialGoal = get_owned(id, user_id, connection)?;

    let target_amount = match changes.target_amount {
        Some(target) => whole_cents("targetAmount", positive_amount("targetAmount", target)?)?,
        None => current.target_amount,
    };

    if target_amount < current.current_amount {
        return Err(Error::BusinessRule(
            "targetAmount must not be less than currentAmount".to_owned(),
        ));
    }

    let name = changes.name.unwrap_or(current.name);
    let deadline = changes.deadline.unwrap_or(current.deadline);
    let category = changes.category.or(current.category);
    let (percentage_complete, status) = progress(current.current_amount, target_amount);
    let now = OffsetDateTime::now_utc();

    update_owned(
        id,
        user_id,
        &[
            ("name", &name as &dyn ToSql),
            ("target_amount", &target_amount),
            ("percentage_complete", &percentage_complete),
            ("status", &status),
            ("deadline", &deadline),
            ("category", &category),
            ("updated_at", &now),
        ],
        connection,
    )
}

/// Add `amount` to the goal `id` owned by `user_id`.
///
/// The goal is left as is when the contribution fails.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidInput] if `amount` is not greater than zero or has fractions of a cent,
/// - [Error::NotFound] if there is no goal `id` owned by `user_id`,
/// - [Error::BusinessRule] if the contribution would take the goal past its target,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn contribute_to_goal(
    id: GoalId,
    user_id: UserID,
    amount: f64,
    connection: &Connection,
) -> Result<FinancialGoal, Error> {
    if !(amount.is_finite() && amount > 0.0) {
        return Err(Error::InvalidInput(
            "Invalid contribution amount".to_owned(),
        ));
    }

    let amount = whole_cents("amount", amount)?;

    let goal: FinancialGoal = get_owned(id, user_id, connection)?;
    // Both terms are whole cents, so rounding only removes floating point noise.
    let current_amount = round_2dp(goal.current_amount + amount);

    if current_amount > goal.target_amount {
        return Err(Error::BusinessRule(
            "Contribution exceeds the target amount".to_owned(),
        ));
    }

    let (percentage_complete, status) = progress(current_amount, goal.target_amount);
    let now = OffsetDateTime::now_utc();

    update_owned(
        id,
        user_id,
        &[
            ("current_amount", &current_amount as &dyn ToSql),
            ("percentage_complete", &percentage_complete),
            ("status", &status),
            ("updated_at", &now),
        ],
        connection,
    )
}

/// The state needed by the goal routes.
#[derive(Debug, Clone)]
pub struct GoalState {
    /// The database connection for managing goals.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The config that controls how to page through goals.
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for GoalState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// The body of a request to create a goal.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalForm {
    #[serde(default, deserialize_with = "non_blank")]
    name: Option<String>,
    target_amount: Option<f64>,
    current_amount: Option<f64>,
    #[serde(default, with = "date_format::option_date")]
    deadline: Option<Date>,
    #[serde(default, deserialize_with = "non_blank")]
    category: Option<String>,
}

/// A route handler for creating a goal for the logged in user.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if the name, target or deadline is missing,
/// - [Error::InvalidInput] or [Error::BusinessRule] if the amounts are invalid,
/// - or an internal error if the goal could not be stored.
pub async fn create_goal_endpoint(
    State(state): State<GoalState>,
    Extension(user): Extension<User>,
    JsonBody(form): JsonBody<GoalForm>,
) -> Result<Response, Error> {
    let (Some(name), Some(target_amount), Some(deadline)) =
        (&form.name, form.target_amount, form.deadline)
    else {
        return Err(missing_fields([
            ("name", form.name.is_none()),
            ("targetAmount", form.target_amount.is_none()),
            ("deadline", form.deadline.is_none()),
        ]));
    };

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let goal = create_goal(
        user.id,
        NewGoal {
            name: name.to_owned(),
            target_amount,
            current_amount: form.current_amount.unwrap_or(0.0),
            deadline,
            category: form.category.clone(),
        },
        &connection,
    )?;

    success(StatusCode::CREATED, goal)
}

/// The query string for listing goals.
#[derive(Debug, Default, Deserialize)]
pub struct GoalQuery {
    page: Option<u64>,
    limit: Option<u64>,
    #[serde(default, deserialize_with = "non_blank")]
    name: Option<String>,
    status: Option<GoalStatus>,
}

/// A route handler for listing the logged in user's goals, newest first.
///
/// # Errors
///
/// Returns an internal error if the goals could not be read.
pub async fn get_goals_endpoint(
    State(state): State<GoalState>,
    Extension(user): Extension<User>,
    QueryParams(query): QueryParams<GoalQuery>,
) -> Result<Response, Error> {
    let page = Page::from_query(
        PageQuery {
            page: query.page,
            limit: query.limit,
        },
        &state.pagination_config,
    );
    let scope = OwnerScope::new(user.id)
        .and_some(
            "name LIKE ? ESCAPE '\\'",
            query.name.map(|name| format!("%{}%", escape_like(&name))),
        )
        .and_some("status = ?", query.status);

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    list_owned::<FinancialGoal>(&scope, "created_at DESC, id DESC", page, &connection)?
        .into_response("totalGoals")
}

/// A route handler for getting one of the logged in user's goals.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the goal does not exist or belongs to someone else.
pub async fn get_goal_endpoint(
    State(state): State<GoalState>,
    Extension(user): Extension<User>,
    PathParam(goal_id): PathParam<GoalId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let goal: FinancialGoal = get_owned(goal_id, user.id, &connection)?;

    success(StatusCode::OK, goal)
}

/// A route handler for editing one of the logged in user's goals.
///
/// # Errors
///
/// Returns a:
/// - [Error::NotFound] if the goal does not exist or belongs to someone else,
/// - [Error::InvalidInput] or [Error::BusinessRule] if the new target is invalid,
/// - or an internal error if the goal could not be stored.
pub async fn update_goal_endpoint(
    State(state): State<GoalState>,
    Extension(user): Extension<User>,
    PathParam(goal_id): PathParam<GoalId>,
    JsonBody(changes): JsonBody<GoalChanges>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let goal = update_goal(goal_id, user.id, changes, &connection)?;

    success(StatusCode::OK, goal)
}

/// A route handler for deleting one of the logged in user's goals.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the goal does not exist or belongs to someone else.
pub async fn delete_goal_endpoint(
    State(state): State<GoalState>,
    Extension(user): Extension<User>,
    PathParam(goal_id): PathParam<GoalId>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    delete_owned::<FinancialGoal>(goal_id, user.id, &connection)?;

    Ok(no_content())
}

/// The body of a contribution request.
#[derive(Debug, Deserialize)]
pub struct ContributionForm {
    amount: Option<f64>,
}

/// A route handler for adding money to one of the logged in user's goals.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if the amount is missing,
/// - [Error::InvalidInput] if the amount is not greater than zero,
/// - [Error::NotFound] if the goal does not exist or belongs to someone else,
/// - [Error::BusinessRule] if the contribution would exceed the target.
pub async fn contribute_to_goal_endpoint(
    State(state): State<GoalState>,
    Extension(user): Extension<User>,
    PathParam(goal_id): PathParam<GoalId>,
    JsonBody(form): JsonBody<ContributionForm>,
) -> Result<Response, Error> {
    let Some(amount) = form.amount else {
        return Err(missing_fields([("amount", true)]));
    };

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let goal = contribute_to_goal(goal_id, user.id, amount, &connection)?;

    success(StatusCode::OK, goal)
}

#[cfg(test)]
mod goal_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error,
        auth::UserID,
        goal::{
            GoalChanges, GoalStatus, NewGoal, contribute_to_goal, create_goal, update_goal,
        },
        test_utils::{create_test_user, get_test_connection},
    };

    fn new_goal(target_amount: f64, current_amount: f64) -> NewGoal {
        NewGoal {
            name: "Holiday".to_owned(),
            target_amount,
            current_amount,
            deadline: date!(2026 - 12 - 01),
            category: None,
        }
    }

    fn setup() -> (Connection, UserID) {
        let conn = get_test_connection();
        let user_id = create_test_user(&conn, "foo@bar.baz");

        (conn, user_id)
    }

    #[test]
    fn create_derives_progress() {
        let (conn, user_id) = setup();

        let goal = create_goal(user_id, new_goal(300.0, 100.0), &conn).unwrap();

        assert_eq!(goal.percentage_complete, 33.33);
        assert_eq!(goal.status, GoalStatus::Active);
    }

    #[test]
    fn create_rejects_current_above_target() {
        let (conn, user_id) = setup();

        let result = create_goal(user_id, new_goal(100.0, 150.0), &conn);

        assert!(matches!(result, Err(Error::BusinessRule(_))));
    }

    #[test]
    fn contributing_the_full_target_completes_goal() {
        let (conn, user_id) = setup();
        let goal = create_goal(user_id, new_goal(1000.0, 0.0), &conn).unwrap();

        let goal = contribute_to_goal(goal.id, user_id, 1000.0, &conn).unwrap();
        assert_eq!(goal.current_amount, 1000.0);
        assert_eq!(goal.percentage_complete, 100.0);
        assert_eq!(goal.status, GoalStatus::Completed);

        let result = contribute_to_goal(goal.id, user_id, 1.0, &conn);
        assert_eq!(
            result,
            Err(Error::BusinessRule(
                "Contribution exceeds the target amount".to_owned()
            ))
        );

        let unchanged = crate::ownership::get_owned::<crate::goal::FinancialGoal>(
            goal.id, user_id, &conn,
        )
        .unwrap();
        assert_eq!(unchanged.current_amount, 1000.0);
        assert_eq!(unchanged.status, GoalStatus::Completed);
    }

    #[test]
    fn contributions_accumulate() {
        let (conn, user_id) = setup();
        let goal = create_goal(user_id, new_goal(100.0, 0.0), &conn).unwrap();

        contribute_to_goal(goal.id, user_id, 10.1, &conn).unwrap();
        let goal = contribute_to_goal(goal.id, user_id, 20.2, &conn).unwrap();

        assert_eq!(goal.current_amount, 30.3);
        assert_eq!(goal.percentage_complete, 30.3);
        assert_eq!(goal.status, GoalStatus::Active);
    }

    #[test]
    fn contribute_rejects_non_positive_amounts() {
        let (conn, user_id) = setup();
        let goal = create_goal(user_id, new_goal(100.0, 0.0), &conn).unwrap();

        for amount in [0.0, -5.0, f64::NAN] {
            assert_eq!(
                contribute_to_goal(goal.id, user_id, amount, &conn),
                Err(Error::InvalidInput("Invalid contribution amount".to_owned()))
            );
        }
    }

    #[test]
    fn contribution_just_past_target_is_rejected() {
        let (conn, user_id) = setup();
        let goal = create_goal(user_id, new_goal(100.0, 99.99), &conn).unwrap();

        let result = contribute_to_goal(goal.id, user_id, 0.014, &conn);
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let result = contribute_to_goal(goal.id, user_id, 0.02, &conn);
        assert!(matches!(result, Err(Error::BusinessRule(_))));

        let goal = contribute_to_goal(goal.id, user_id, 0.01, &conn).unwrap();
        assert_eq!(goal.current_amount, 100.0);
        assert_eq!(goal.status, GoalStatus::Completed);
    }

    #[test]
    fn fractions_of_a_cent_are_rejected_without_change() {
        let (conn, user_id) = setup();
        let goal = create_goal(user_id, new_goal(100.0, 0.0), &conn).unwrap();

        let result = contribute_to_goal(goal.id, user_id, 0.004, &conn);
        assert_eq!(
            result,
            Err(Error::InvalidInput(
                "amount must not have more than two decimal places".to_owned()
            ))
        );

        let goal = contribute_to_goal(goal.id, user_id, 0.1, &conn).unwrap();
        let goal = contribute_to_goal(goal.id, user_id, 0.2, &conn).unwrap();
        assert_eq!(goal.current_amount, 0.3);
    }

    #[test]
    fn create_rejects_fractions_of_a_cent() {
        let (conn, user_id) = setup();

        let result = create_goal(user_id, new_goal(100.0, 99.999), &conn);

        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn contribute_to_other_users_goal_is_not_found() {
        let (conn, user_id) = setup();
        let other_user = create_test_user(&conn, "mallory@bar.baz");
        let goal = create_goal(user_id, new_goal(100.0, 0.0), &conn).unwrap();

        let result = contribute_to_goal(goal.id, other_user, 10.0, &conn);

        assert_eq!(result, Err(Error::NotFound("Goal")));
    }

    #[test]
    fn raising_target_reactivates_completed_goal() {
        let (conn, user_id) = setup();
        let goal = create_goal(user_id, new_goal(100.0, 100.0), &conn).unwrap();
        assert_eq!(goal.status, GoalStatus::Completed);

        let goal = update_goal(
            goal.id,
            user_id,
            GoalChanges {
                target_amount: Some(200.0),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();

        assert_eq!(goal.status, GoalStatus::Active);
        assert_eq!(goal.percentage_complete, 50.0);
    }

    #[test]
    fn lowering_target_below_current_is_rejected() {
        let (conn, user_id) = setup();
        let goal = create_goal(user_id, new_goal(100.0, 80.0), &conn).unwrap();

        let result = update_goal(
            goal.id,
            user_id,
            GoalChanges {
                target_amount: Some(50.0),
                ..Default::default()
            },
            &conn,
        );

        assert!(matches!(result, Err(Error::BusinessRule(_))));
    }
}
