//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;
/// The ID of a transaction.
pub type TransactionId = DatabaseId;
/// The ID of a budget.
pub type BudgetId = DatabaseId;
/// The ID of a financial goal.
pub type GoalId = DatabaseId;
/// The ID of a recurring transaction template.
pub type RecurringTransactionId = DatabaseId;
/// The ID of a notification.
pub type NotificationId = DatabaseId;
