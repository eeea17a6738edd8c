//! Transaction management.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and its database functions
//! - The route handlers for creating, searching, editing and deleting transactions

mod core;
mod endpoints;

pub use self::core::{
    Transaction, TransactionType, create_transaction_table, map_transaction_row,
};
pub(crate) use self::core::escape_like;
pub use endpoints::{
    create_transaction_endpoint, delete_transaction_endpoint, get_transaction_endpoint,
    get_transactions_endpoint, update_transaction_endpoint,
};

#[cfg(test)]
pub(crate) use self::core::{
    NewTransaction, SortBy, SortOrder, TransactionChanges, TransactionFilter, create_transaction,
    order_by, update_transaction,
};
