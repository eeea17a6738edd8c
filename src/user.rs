//! The logged in user's own account: reading and editing the profile, changing the password and
//! deleting the account.

use std::sync::{Arc, Mutex};

use axum::{
    Extension,
    extract::{FromRef, State},
    http::StatusCode,
    response::Response,
};
use axum_extra::extract::CookieJar;
use email_address::EmailAddress;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    analytics::get_overview,
    auth::{
        PasswordHash, ProfileChanges, User, UserID, delete_user, invalidate_auth_cookie,
        update_password, update_profile,
    },
    budget::Budget,
    extract::{JsonBody, missing_fields, non_blank},
    goal::FinancialGoal,
    ownership::{OwnerScope, count_owned},
    response::{no_content, success},
};

/// What a client sees of a user.
///
/// The totals are computed from the user's records each time the profile is read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// The user's ID.
    pub id: UserID,
    /// The user's display name.
    pub name: String,
    /// The user's email address.
    pub email: String,
    /// The user's preferred currency code.
    pub currency: String,
    /// The sum of the user's income transactions.
    pub total_income: f64,
    /// The sum of the user's expense transactions.
    pub total_expense: f64,
    /// The number of budgets the user has.
    pub total_budgets: u64,
    /// The number of goals the user has.
    pub total_goals: u64,
    /// When the user registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the user's details last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Build the profile for `user`.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub(crate) fn get_user_profile(user: &User, connection: &Connection) -> Result<UserProfile, Error> {
    let overview = get_overview(user.id, connection)?;
    let scope = OwnerScope::new(user.id);

    Ok(UserProfile {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        currency: user.currency.clone(),
        total_income: overview.total_income,
        total_expense: overview.total_expense,
        total_budgets: count_owned::<Budget>(&scope, connection)?,
        total_goals: count_owned::<FinancialGoal>(&scope, connection)?,
        created_at: user.created_at,
        updated_at: user.updated_at,
    })
}

/// The state needed by the account routes.
#[derive(Debug, Clone)]
pub struct UserState {
    /// The database connection for reading and editing the user.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The bcrypt cost for hashing new passwords.
    pub password_hash_cost: u32,
}

impl FromRef<AppState> for UserState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            password_hash_cost: state.password_hash_cost,
        }
    }
}

/// A route handler for the logged in user's profile.
///
/// # Errors
///
/// Returns an internal error if the profile could not be read.
pub async fn get_me_endpoint(
    State(state): State<UserState>,
    Extension(user): Extension<User>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    success(StatusCode::OK, get_user_profile(&user, &connection)?)
}

/// The body of a request to edit the profile.
#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    #[serde(default, deserialize_with = "non_blank")]
    name: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    email: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    currency: Option<String>,
}

/// A route handler for editing the logged in user's name, email or currency.
///
/// # Errors
///
/// Returns a:
/// - [Error::InvalidInput] if the new email is not a valid email address,
/// - [Error::DuplicateEmail] if the new email is registered to someone else,
/// - or an internal error if the user could not be stored.
pub async fn update_me_endpoint(
    State(state): State<UserState>,
    Extension(user): Extension<User>,
    JsonBody(form): JsonBody<ProfileForm>,
) -> Result<Response, Error> {
    if let Some(email) = form
        .email
        .as_deref()
        .filter(|email| !EmailAddress::is_valid(email))
    {
        return Err(Error::InvalidInput(format!(
            "{email} is not a valid email address"
        )));
    }

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    let user = update_profile(
        user.id,
        ProfileChanges {
            name: form.name,
            email: form.email,
            currency: form.currency,
        },
        &connection,
    )?;

    success(StatusCode::OK, get_user_profile(&user, &connection)?)
}

/// The body of a change password request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordForm {
    #[serde(default)]
    current_password: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// A route handler for changing the logged in user's password.
///
/// # Errors
///
/// Returns a:
/// - [Error::MissingFields] if the current or new password is missing,
/// - [Error::IncorrectCurrentPassword] if the current password is wrong,
/// - or an internal error if the password could not be hashed or stored.
pub async fn change_password_endpoint(
    State(state): State<UserState>,
    Extension(user): Extension<User>,
    JsonBody(form): JsonBody<ChangePasswordForm>,
) -> Result<Response, Error> {
    let current_password = form.current_password.as_deref().filter(|p| !p.is_empty());
    let new_password = form.password.as_deref().filter(|p| !p.is_empty());

    let (Some(current_password), Some(new_password)) = (current_password, new_password) else {
        return Err(missing_fields([
            ("currentPassword", current_password.is_none()),
            ("password", new_password.is_none()),
        ]));
    };

    let is_password_valid = user
        .password_hash
        .verify(current_password)
        .map_err(|error| {
            tracing::error!("Error verifying password: {error}");
            Error::HashingError(error.to_string())
        })?;

    if !is_password_valid {
        return Err(Error::IncorrectCurrentPassword);
    }

    let password_hash = PasswordHash::new(new_password, state.password_hash_cost)?;

    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    update_password(user.id, &password_hash, &connection)?;

    tracing::info!("Changed password for user {}", user.id);

    success(StatusCode::OK, "Password changed successfully.")
}

/// A route handler for deleting the logged in user's account and everything they own.
///
/// Clears the auth cookie.
///
/// # Errors
///
/// Returns an internal error if the user could not be deleted.
pub async fn delete_me_endpoint(
    State(state): State<UserState>,
    Extension(user): Extension<User>,
    jar: CookieJar,
) -> Result<(CookieJar, Response), Error> {
    let connection = state
        .db_connection
        .lock()
        .map_err(|_| Error::DatabaseLockError)?;

    delete_user(user.id, &connection)?;

    tracing::info!("Deleted user {}", user.id);

    Ok((invalidate_auth_cookie(jar), no_content()))
}

#[cfg(test)]
mod user_profile_tests {
    use time::macros::date;

    use crate::{
        auth::get_user_by_id,
        budget::{BudgetPeriod, NewBudget, create_budget},
        test_utils::{create_test_user, get_test_connection},
        transaction::{NewTransaction, TransactionType, create_transaction},
        user::get_user_profile,
    };

    #[test]
    fn profile_counts_owned_records() {
        let conn = get_test_connection();
        let user_id = create_test_user(&conn, "foo@bar.baz");
        let other_user = create_test_user(&conn, "other@bar.baz");
        for (owner, transaction_type, amount) in [
            (user_id, TransactionType::Income, 500.0),
            (user_id, TransactionType::Expense, 120.0),
            (other_user, TransactionType::Expense, 80.0),
        ] {
            create_transaction(
                owner,
                NewTransaction {
                    transaction_type,
                    category: "Misc".to_owned(),
                    amount,
                    date: date!(2025 - 05 - 01),
                    description: String::new(),
                },
                &conn,
            )
            .unwrap();
        }
        create_budget(
            user_id,
            NewBudget {
                name: "Food".to_owned(),
                category: "Food".to_owned(),
                budget_limit: 200.0,
                current_spent: 0.0,
                period: BudgetPeriod::Weekly,
                start_date: date!(2025 - 05 - 01),
                end_date: date!(2025 - 05 - 07),
            },
            &conn,
        )
        .unwrap();
        let user = get_user_by_id(user_id, &conn).unwrap();

        let profile = get_user_profile(&user, &conn).unwrap();

        assert_eq!(profile.total_income, 500.0);
        assert_eq!(profile.total_expense, 120.0);
        assert_eq!(profile.total_budgets, 1);
        assert_eq!(profile.total_goals, 0);
    }
}
