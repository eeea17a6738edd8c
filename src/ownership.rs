//! The authorization policy shared by every user owned resource.
//!
//! Records are only ever read, updated or deleted through the functions in this module, which
//! always filter on the owning user's ID. A record that exists but belongs to someone else is
//! indistinguishable from one that does not exist: both produce [Error::NotFound].

use rusqlite::{Connection, Row, ToSql, params_from_iter};

use crate::{
    Error,
    auth::UserID,
    database_id::DatabaseId,
    pagination::Page,
    response::Paginated,
};

/// A model stored in a table with an `id` primary key and a `user_id` owner column.
pub(crate) trait OwnedResource: Sized {
    /// The name used in error messages, e.g. "Budget".
    const NAME: &'static str;
    /// The (quoted if needed) table name.
    const TABLE: &'static str;
    /// The columns read by [OwnedResource::map_row], in order.
    const COLUMNS: &'static str;

    /// Convert a row selected with [OwnedResource::COLUMNS] into the model.
    fn map_row(row: &Row) -> Result<Self, rusqlite::Error>;
}

/// A `WHERE` clause that always starts with the owner filter.
///
/// Further conditions are AND-ed on with [OwnerScope::and]. Each condition should use a single
/// positional `?` placeholder for its parameter.
pub(crate) struct OwnerScope {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl OwnerScope {
    /// Scope a query to the records owned by `user_id`.
    pub fn new(user_id: UserID) -> Self {
        Self {
            clauses: vec!["user_id = ?".to_owned()],
            params: vec![Box::new(user_id.as_i64())],
        }
    }

    /// Add a condition, e.g. `scope.and("type = ?", "expense")`.
    pub fn and(mut self, clause: &str, param: impl ToSql + 'static) -> Self {
        self.clauses.push(clause.to_owned());
        self.params.push(Box::new(param));
        self
    }

    /// Add a condition only when `param` is set.
    pub fn and_some<T: ToSql + 'static>(self, clause: &str, param: Option<T>) -> Self {
        match param {
            Some(param) => self.and(clause, param),
            None => self,
        }
    }

    /// The SQL conditions joined with AND, without the `WHERE` keyword.
    pub fn where_clause(&self) -> String {
        self.clauses.join(" AND ")
    }

    /// The parameters for the placeholders in [OwnerScope::where_clause], in order.
    pub fn params(&self) -> impl Iterator<Item = &dyn ToSql> {
        self.params.iter().map(|param| param.as_ref())
    }
}

/// Get the record `id` if it belongs to `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if there is no record `id` owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub(crate) fn get_owned<R: OwnedResource>(
    id: DatabaseId,
    user_id: UserID,
    connection: &Connection,
) -> Result<R, Error> {
    let query = format!(
        "SELECT {} FROM {} WHERE id = ?1 AND user_id = ?2",
        R::COLUMNS,
        R::TABLE
    );

    connection
        .prepare(&query)?
        .query_row((id, user_id.as_i64()), R::map_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound(R::NAME),
            error => error.into(),
        })
}

/// Set the `columns` of record `id` if it belongs to `user_id` and return the updated record.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if there is no record `id` owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub(crate) fn update_owned<R: OwnedResource>(
    id: DatabaseId,
    user_id: UserID,
    columns: &[(&str, &dyn ToSql)],
    connection: &Connection,
) -> Result<R, Error> {
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let id_index = columns.len() + 1;
    let query = format!(
        "UPDATE {} SET {assignments} WHERE id = ?{id_index} AND user_id = ?{} RETURNING {}",
        R::TABLE,
        id_index + 1,
        R::COLUMNS
    );

    let user_id = user_id.as_i64();
    let params = columns
        .iter()
        .map(|(_, value)| *value)
        .chain([&id as &dyn ToSql, &user_id as &dyn ToSql]);

    connection
        .prepare(&query)?
        .query_row(params_from_iter(params), R::map_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound(R::NAME),
            error => error.into(),
        })
}

/// Delete the record `id` if it belongs to `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if there is no record `id` owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub(crate) fn delete_owned<R: OwnedResource>(
    id: DatabaseId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let query = format!("DELETE FROM {} WHERE id = ?1 AND user_id = ?2", R::TABLE);

    match connection.execute(&query, (id, user_id.as_i64()))? {
        0 => Err(Error::NotFound(R::NAME)),
        _ => Ok(()),
    }
}

/// Count the records matching `scope`.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub(crate) fn count_owned<R: OwnedResource>(
    scope: &OwnerScope,
    connection: &Connection,
) -> Result<u64, Error> {
    let query = format!(
        "SELECT COUNT(id) FROM {} WHERE {}",
        R::TABLE,
        scope.where_clause()
    );

    let count: i64 = connection.query_row(&query, params_from_iter(scope.params()), |row| {
        row.get(0)
    })?;

    Ok(count.max(0) as u64)
}

/// Get one page of the records matching `scope`, sorted by `order_by`.
///
/// `order_by` is inserted into the query as is and must not come from user input.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub(crate) fn list_owned<R: OwnedResource>(
    scope: &OwnerScope,
    order_by: &'static str,
    page: Page,
    connection: &Connection,
) -> Result<Paginated<R>, Error> {
    let total = count_owned::<R>(scope, connection)?;
    let query = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {order_by} LIMIT ? OFFSET ?",
        R::COLUMNS,
        R::TABLE,
        scope.where_clause(),
    );
    let limit = page.sql_limit();
    let offset = page.offset();
    let params = scope
        .params()
        .chain([&limit as &dyn ToSql, &offset as &dyn ToSql]);

    let items = connection
        .prepare(&query)?
        .query_map(params_from_iter(params), R::map_row)?
        .collect::<Result<Vec<R>, rusqlite::Error>>()?;

    Ok(Paginated { items, total, page })
}

#[cfg(test)]
mod ownership_tests {
    use rusqlite::{Connection, Row};

    use crate::{
        Error,
        auth::UserID,
        ownership::{
            OwnedResource, OwnerScope, count_owned, delete_owned, get_owned, list_owned,
            update_owned,
        },
        pagination::Page,
    };

    #[derive(Debug, PartialEq)]
    struct Widget {
        id: i64,
        user_id: UserID,
        label: String,
    }

    impl OwnedResource for Widget {
        const NAME: &'static str = "Widget";
        const TABLE: &'static str = "widget";
        const COLUMNS: &'static str = "id, user_id, label";

        fn map_row(row: &Row) -> Result<Self, rusqlite::Error> {
            Ok(Self {
                id: row.get(0)?,
                user_id: UserID::new(row.get(1)?),
                label: row.get(2)?,
            })
        }
    }

    fn get_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute(
                "CREATE TABLE widget (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL, label TEXT NOT NULL)",
                (),
            )
            .unwrap();

        for (user_id, label) in [(1, "a"), (1, "b"), (1, "c"), (2, "d")] {
            connection
                .execute(
                    "INSERT INTO widget (user_id, label) VALUES (?1, ?2)",
                    (user_id, label),
                )
                .unwrap();
        }

        connection
    }

    #[test]
    fn get_owned_hides_other_users_records() {
        let connection = get_connection();

        let result = get_owned::<Widget>(4, UserID::new(1), &connection);

        assert_eq!(result, Err(Error::NotFound("Widget")));
    }

    #[test]
    fn get_owned_returns_own_record() {
        let connection = get_connection();

        let widget = get_owned::<Widget>(1, UserID::new(1), &connection).unwrap();

        assert_eq!(widget.label, "a");
    }

    #[test]
    fn delete_owned_leaves_other_users_records() {
        let connection = get_connection();

        let result = delete_owned::<Widget>(4, UserID::new(1), &connection);

        assert_eq!(result, Err(Error::NotFound("Widget")));
        assert!(get_owned::<Widget>(4, UserID::new(2), &connection).is_ok());
    }

    #[test]
    fn update_owned_sets_columns() {
        let connection = get_connection();

        let widget = update_owned::<Widget>(2, UserID::new(1), &[("label", &"z")], &connection)
            .unwrap();

        assert_eq!(widget.label, "z");
    }

    #[test]
    fn update_owned_rejects_other_owner() {
        let connection = get_connection();

        let result = update_owned::<Widget>(2, UserID::new(2), &[("label", &"z")], &connection);

        assert_eq!(result, Err(Error::NotFound("Widget")));
        assert_eq!(
            get_owned::<Widget>(2, UserID::new(1), &connection)
                .unwrap()
                .label,
            "b"
        );
    }

    #[test]
    fn scope_adds_conditions() {
        let connection = get_connection();
        let scope = OwnerScope::new(UserID::new(1)).and("label <> ?", "b");

        assert_eq!(count_owned::<Widget>(&scope, &connection).unwrap(), 2);
    }

    #[test]
    fn list_owned_pages_records() {
        let connection = get_connection();
        let scope = OwnerScope::new(UserID::new(1));

        let page = list_owned::<Widget>(&scope, "id ASC", Page { number: 2, limit: 2 }, &connection)
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].label, "c");
    }
}
