//! SQL generation seam.
//!
//! [`SqlDialect`] is the one place SQL text is produced. Everything above it
//! (client, table facade) works on [`ExecutableQuery`] values and never
//! concatenates SQL itself.

use crate::condition::Condition;
use crate::error::SqlResult;
use crate::schema::{ColumnSelector, SqlJoin, TableSchema};
use crate::value::{ExecutableQuery, SetMap};

/// Compiles schemas, conditions and statements into parameterized SQL.
pub trait SqlDialect: Send + Sync {
    /// Dialect identifier, e.g. `"postgres"`.
    fn name(&self) -> &'static str;

    /// List all databases on the server.
    fn list_databases_query(&self) -> ExecutableQuery;

    /// List all user tables.
    fn list_tables_query(&self) -> ExecutableQuery;

    /// Look up the catalog row of one table, if it exists.
    fn table_structure_query(&self, schema: &TableSchema) -> ExecutableQuery;

    /// `CREATE TABLE IF NOT EXISTS` for the full schema.
    fn create_table_query(&self, schema: &TableSchema) -> SqlResult<ExecutableQuery>;

    /// `DROP TABLE IF EXISTS … CASCADE`.
    fn drop_table_query(&self, schema: &TableSchema) -> ExecutableQuery;

    /// `INSERT` with an optional `RETURNING` projection.
    fn insert_query(
        &self,
        table: &str,
        set: &SetMap,
        returning: Option<&ColumnSelector>,
    ) -> SqlResult<ExecutableQuery>;

    /// `UPDATE … SET` with optional filter and `RETURNING` projection.
    ///
    /// WHERE placeholders continue the numbering started by the SET clause.
    fn update_query(
        &self,
        table: &str,
        set: &SetMap,
        filter: Option<&Condition>,
        returning: Option<&ColumnSelector>,
    ) -> SqlResult<ExecutableQuery>;

    /// `SELECT` with projection, filter, limit and join list.
    fn select_query(
        &self,
        table: &str,
        projection: Option<&ColumnSelector>,
        filter: Option<&Condition>,
        limit: Option<u32>,
        joins: &[SqlJoin],
    ) -> SqlResult<ExecutableQuery>;

    /// `DELETE` with optional filter and `RETURNING` projection.
    fn delete_query(
        &self,
        table: &str,
        filter: Option<&Condition>,
        returning: Option<&ColumnSelector>,
    ) -> SqlResult<ExecutableQuery>;
}
