//! Database initialisation.

use std::time::Duration;

use rusqlite::{Connection, Transaction as SqlTransaction};

use crate::{
    auth::{create_password_reset_token_table, create_user_table},
    budget::create_budget_table,
    goal::create_goal_table,
    notification::create_notification_table,
    recurring_transaction::create_recurring_transaction_table,
    transaction::create_transaction_table,
};

/// How long a statement waits for a lock held by another connection before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Configure the connection and create the tables for every model.
///
/// Foreign keys are enforced so that deleting a user also deletes the records they own.
///
/// # Errors
/// Returns an error if the connection could not be configured or a table could not be created.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    // Must be set outside of a transaction, where it would be a no-op.
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.busy_timeout(BUSY_TIMEOUT)?;

    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_password_reset_token_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_budget_table(&transaction)?;
    create_goal_table(&transaction)?;
    create_recurring_transaction_table(&transaction)?;
    create_notification_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
