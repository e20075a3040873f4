//! Postgres dialect and tokio-postgres driver.

use std::sync::Arc;

use tokio_postgres::types::Type;
use tokio_postgres::{Config, NoTls};

use crate::condition::{Condition, compile_condition};
use crate::dialect::SqlDialect;
use crate::driver::SqlDriver;
use crate::error::{SqlError, SqlResult};
use crate::schema::{Column, ColumnSelector, SqlJoin, TableSchema};
use crate::value::{ExecutableQuery, SetMap, SqlRow, SqlValue};

/// SQL generation for Postgres.
#[derive(Debug, Default, Clone)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }

    /// Render one column definition for CREATE TABLE.
    fn column_ddl(&self, column: &Column) -> SqlResult<String> {
        let mut ddl = format!("{} {}", column.name, column.type_name.to_uppercase());
        if let Some(size) = column.size {
            ddl.push_str(&format!("({size})"));
        }
        // UNIQUE wins over PRIMARY KEY when both are set.
        if column.unique {
            ddl.push_str(" UNIQUE");
        } else if column.primary_key {
            ddl.push_str(" PRIMARY KEY");
        }
        ddl.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &column.default {
            check_default_type(column, default)?;
            ddl.push_str(" DEFAULT ");
            ddl.push_str(&default_literal(default));
        }
        Ok(ddl)
    }

    /// Render a projection for SELECT or RETURNING.
    ///
    /// Bare columns stay unqualified; a qualifier is only emitted when the
    /// entry names a table or join alias.
    fn projection_sql(&self, selector: Option<&ColumnSelector>) -> String {
        match selector {
            None | Some(ColumnSelector::All) => "*".to_string(),
            Some(ColumnSelector::Column(column)) => format!("\"{column}\""),
            Some(ColumnSelector::Columns(columns)) if columns.is_empty() => "*".to_string(),
            Some(ColumnSelector::Columns(columns)) => columns
                .iter()
                .map(|col| {
                    let mut sql = match &col.table {
                        Some(qualifier) => format!("\"{qualifier}\".\"{}\"", col.column),
                        None => format!("\"{}\"", col.column),
                    };
                    if let Some(alias) = &col.alias {
                        sql.push_str(&format!(" AS \"{alias}\""));
                    }
                    sql
                })
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn join_sql(&self, table: &str, join: &SqlJoin) -> String {
        let mut sql = format!(" {} \"{}\"", join.kind.keyword(), join.target_table);
        if let Some(alias) = &join.alias {
            sql.push_str(&format!(" {alias}"));
        }
        let target = join.alias.as_deref().unwrap_or(&join.target_table);
        let source = join.source_table.as_deref().unwrap_or(table);
        sql.push_str(&format!(
            " ON \"{target}\".{} = \"{source}\".{}",
            join.target_key, join.source_key
        ));
        sql
    }
}

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn list_databases_query(&self) -> ExecutableQuery {
        ExecutableQuery::new("SELECT * FROM pg_database")
    }

    fn list_tables_query(&self) -> ExecutableQuery {
        ExecutableQuery::new(
            "SELECT * FROM pg_catalog.pg_tables WHERE schemaname != 'pg_catalog' \
             AND schemaname != 'information_schema'",
        )
    }

    fn table_structure_query(&self, schema: &TableSchema) -> ExecutableQuery {
        let mut query = self.list_tables_query();
        query.text.push_str(" AND tablename = $1");
        query.values.push(SqlValue::Text(schema.name.clone()));
        query
    }

    fn create_table_query(&self, schema: &TableSchema) -> SqlResult<ExecutableQuery> {
        if schema.columns.is_empty() {
            return Err(SqlError::schema(format!(
                "table '{}' has no columns",
                schema.name
            )));
        }
        let columns = schema
            .columns
            .iter()
            .map(|column| self.column_ddl(column))
            .collect::<SqlResult<Vec<_>>>()?
            .join(", ");
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\"({columns}",
            schema.name
        );
        for fk in &schema.foreign_keys {
            sql.push_str(&format!(
                ", FOREIGN KEY({}) REFERENCES \"{}\" ({}) ON DELETE CASCADE",
                fk.column, fk.foreign_table, fk.foreign_column
            ));
        }
        sql.push(')');
        Ok(ExecutableQuery::new(sql))
    }

    fn drop_table_query(&self, schema: &TableSchema) -> ExecutableQuery {
        ExecutableQuery::new(format!(
            "DROP TABLE IF EXISTS \"{}\" CASCADE",
            schema.name
        ))
    }

    fn insert_query(
        &self,
        table: &str,
        set: &SetMap,
        returning: Option<&ColumnSelector>,
    ) -> SqlResult<ExecutableQuery> {
        if set.is_empty() {
            return Err(SqlError::schema(format!(
                "INSERT into '{table}' requires at least one column"
            )));
        }
        let placeholders = (1..=set.len())
            .map(|n| format!("${n}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "INSERT INTO \"{table}\" ({}) VALUES ({placeholders})",
            set.columns().join(", ")
        );
        if let Some(selector) = returning {
            sql.push_str(&format!(
                " RETURNING {}",
                self.projection_sql(Some(selector))
            ));
        }
        Ok(ExecutableQuery::with_values(sql, set.values()))
    }

    fn update_query(
        &self,
        table: &str,
        set: &SetMap,
        filter: Option<&Condition>,
        returning: Option<&ColumnSelector>,
    ) -> SqlResult<ExecutableQuery> {
        if set.is_empty() {
            return Err(SqlError::schema(format!(
                "UPDATE of '{table}' requires at least one SET column"
            )));
        }
        let mut counter = 0;
        let assignments = set
            .columns()
            .iter()
            .map(|column| {
                counter += 1;
                format!("{column}=${counter}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE \"{table}\" SET {assignments}");
        let mut values = set.values();
        if let Some(condition) = filter {
            // WHERE placeholders continue after the SET clause's.
            let (fragment, mut where_values) = compile_condition(table, condition, &mut counter)?;
            sql.push_str(&format!(" WHERE {fragment}"));
            values.append(&mut where_values);
        }
        if let Some(selector) = returning {
            sql.push_str(&format!(
                " RETURNING {}",
                self.projection_sql(Some(selector))
            ));
        }
        Ok(ExecutableQuery::with_values(sql, values))
    }

    fn select_query(
        &self,
        table: &str,
        projection: Option<&ColumnSelector>,
        filter: Option<&Condition>,
        limit: Option<u32>,
        joins: &[SqlJoin],
    ) -> SqlResult<ExecutableQuery> {
        let mut sql = format!(
            "SELECT {} FROM \"{table}\"",
            self.projection_sql(projection)
        );
        for join in joins {
            sql.push_str(&self.join_sql(table, join));
        }
        let mut values = Vec::new();
        if let Some(condition) = filter {
            let mut counter = 0;
            let (fragment, mut where_values) = compile_condition(table, condition, &mut counter)?;
            sql.push_str(&format!(" WHERE {fragment}"));
            values.append(&mut where_values);
        }
        if let Some(limit) = limit {
            if limit > 0 {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
        }
        Ok(ExecutableQuery::with_values(sql, values))
    }

    fn delete_query(
        &self,
        table: &str,
        filter: Option<&Condition>,
        returning: Option<&ColumnSelector>,
    ) -> SqlResult<ExecutableQuery> {
        let mut sql = format!("DELETE FROM \"{table}\"");
        let mut values = Vec::new();
        if let Some(condition) = filter {
            let mut counter = 0;
            let (fragment, mut where_values) = compile_condition(table, condition, &mut counter)?;
            sql.push_str(&format!(" WHERE {fragment}"));
            values.append(&mut where_values);
        }
        if let Some(selector) = returning {
            sql.push_str(&format!(
                " RETURNING {}",
                self.projection_sql(Some(selector))
            ));
        }
        Ok(ExecutableQuery::with_values(sql, values))
    }
}

/// Render a default value as a SQL literal.
fn default_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(true) => "TRUE".to_string(),
        SqlValue::Bool(false) => "FALSE".to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Text(s) => format!("'{}'", s.replace('\'', "\\'")),
    }
}

/// Reject default literals whose type does not match the column type.
///
/// Unknown type names are passed through unchecked.
fn check_default_type(column: &Column, default: &SqlValue) -> SqlResult<()> {
    let type_name = column.type_name.to_uppercase();
    let ok = match type_name.as_str() {
        "SERIAL" | "BIGSERIAL" | "SMALLINT" | "INT" | "INTEGER" | "BIGINT" | "LONG" => {
            matches!(default, SqlValue::Int(_) | SqlValue::Null)
        }
        "REAL" | "FLOAT" | "DOUBLE" => {
            matches!(default, SqlValue::Float(_) | SqlValue::Int(_) | SqlValue::Null)
        }
        "BOOL" | "BOOLEAN" => matches!(default, SqlValue::Bool(_) | SqlValue::Null),
        "VARCHAR" | "CHAR" | "TEXT" => matches!(default, SqlValue::Text(_) | SqlValue::Null),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(SqlError::schema(format!(
            "default value {default:?} does not match type {type_name} of column '{}'",
            column.name
        )))
    }
}

/// A single logical connection to Postgres over tokio-postgres.
///
/// The driver holds at most one live [`tokio_postgres::Client`]; `connect`
/// replaces a dead client, `close` drops it. Lifecycle serialization and
/// idle-timeout management live in [`SqlClient`](crate::client::SqlClient),
/// not here.
pub struct PostgresDriver {
    config: Config,
    dialect: Arc<PostgresDialect>,
    client: tokio::sync::Mutex<Option<tokio_postgres::Client>>,
}

impl PostgresDriver {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            dialect: Arc::new(PostgresDialect::new()),
            client: tokio::sync::Mutex::new(None),
        }
    }

    /// Build a driver from a connection string such as
    /// `host=localhost user=postgres dbname=app` or a `postgres://` URL.
    pub fn from_url(url: &str) -> SqlResult<Self> {
        let config: Config = url.parse()?;
        Ok(Self::new(config))
    }
}

impl SqlDriver for PostgresDriver {
    fn dialect(&self) -> Arc<dyn SqlDialect> {
        self.dialect.clone()
    }

    async fn connect(&self) -> SqlResult<()> {
        let mut slot = self.client.lock().await;
        if slot.as_ref().is_some_and(|client| !client.is_closed()) {
            return Ok(());
        }
        let (client, connection) = self.config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::warn!(error = %err, "postgres connection task ended with error");
            }
        });
        *slot = Some(client);
        Ok(())
    }

    async fn close(&self) -> SqlResult<()> {
        // Dropping the client terminates the connection task.
        self.client.lock().await.take();
        Ok(())
    }

    async fn is_live(&self) -> bool {
        self.client
            .lock()
            .await
            .as_ref()
            .is_some_and(|client| !client.is_closed())
    }

    async fn execute(&self, query: &ExecutableQuery) -> SqlResult<Vec<SqlRow>> {
        let slot = self.client.lock().await;
        let client = slot
            .as_ref()
            .filter(|client| !client.is_closed())
            .ok_or_else(|| SqlError::connection("not connected"))?;
        let rows = client.query(query.text.as_str(), &query.params()).await?;
        rows.iter().map(decode_row).collect()
    }
}

/// Map a tokio-postgres row into the scalar row model.
fn decode_row(row: &tokio_postgres::Row) -> SqlResult<SqlRow> {
    let mut out = SqlRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)?.into()
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)?.into()
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)?.into()
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)?.into()
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)?.into()
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)?.into()
        } else if *ty == Type::TEXT
            || *ty == Type::VARCHAR
            || *ty == Type::BPCHAR
            || *ty == Type::NAME
        {
            row.try_get::<_, Option<String>>(idx)?.into()
        } else {
            return Err(SqlError::decode(
                name,
                format!("unsupported column type: {ty}"),
            ));
        };
        out.insert(name, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ForeignKey;

    fn dialect() -> PostgresDialect {
        PostgresDialect::new()
    }

    fn user_schema() -> TableSchema {
        TableSchema::new("user")
            .column(Column::new("id", "serial").primary_key())
            .column(Column::new("name", "varchar").size(32).unique())
            .column(Column::new("email", "varchar").size(128).unique())
    }

    fn friendstate_schema() -> TableSchema {
        TableSchema::new("friendstate")
            .column(Column::new("id", "serial").primary_key())
            .column(Column::new("sender_id", "int"))
            .column(Column::new("receiver_id", "int"))
            .column(Column::new("accepted", "bool").default_value(false))
            .foreign_key(ForeignKey::new("sender_id", "user", "id"))
            .foreign_key(ForeignKey::new("receiver_id", "user", "id"))
    }

    #[test]
    fn create_table_sql() {
        let query = dialect().create_table_query(&user_schema()).unwrap();
        assert_eq!(
            query.text,
            "CREATE TABLE IF NOT EXISTS \"user\"(id SERIAL PRIMARY KEY NOT NULL, \
             name VARCHAR(32) UNIQUE NOT NULL, email VARCHAR(128) UNIQUE NOT NULL)"
        );
        assert!(query.values.is_empty());
    }

    #[test]
    fn create_table_with_foreign_keys_and_default() {
        let query = dialect().create_table_query(&friendstate_schema()).unwrap();
        assert_eq!(
            query.text,
            "CREATE TABLE IF NOT EXISTS \"friendstate\"(id SERIAL PRIMARY KEY NOT NULL, \
             sender_id INT NOT NULL, receiver_id INT NOT NULL, \
             accepted BOOL NOT NULL DEFAULT FALSE, \
             FOREIGN KEY(sender_id) REFERENCES \"user\" (id) ON DELETE CASCADE, \
             FOREIGN KEY(receiver_id) REFERENCES \"user\" (id) ON DELETE CASCADE)"
        );
    }

    #[test]
    fn unique_wins_over_primary_key() {
        let schema = TableSchema::new("t")
            .column(Column::new("id", "serial").unique().primary_key());
        let query = dialect().create_table_query(&schema).unwrap();
        assert_eq!(
            query.text,
            "CREATE TABLE IF NOT EXISTS \"t\"(id SERIAL UNIQUE NOT NULL)"
        );
    }

    #[test]
    fn nullable_and_text_default_escaping() {
        let schema = TableSchema::new("t")
            .column(Column::new("note", "varchar").size(64).nullable().default_value("it's"));
        let query = dialect().create_table_query(&schema).unwrap();
        assert_eq!(
            query.text,
            "CREATE TABLE IF NOT EXISTS \"t\"(note VARCHAR(64) NULL DEFAULT 'it\\'s')"
        );
    }

    #[test]
    fn default_type_mismatch_is_a_schema_error() {
        let schema = TableSchema::new("t")
            .column(Column::new("accepted", "bool").default_value("yes"));
        assert!(dialect().create_table_query(&schema).is_err());
    }

    #[test]
    fn drop_table_sql() {
        let query = dialect().drop_table_query(&user_schema());
        assert_eq!(query.text, "DROP TABLE IF EXISTS \"user\" CASCADE");
    }

    #[test]
    fn list_databases_sql() {
        let query = dialect().list_databases_query();
        assert_eq!(query.text, "SELECT * FROM pg_database");
        assert!(query.values.is_empty());
    }

    #[test]
    fn list_and_structure_sql() {
        let list = dialect().list_tables_query();
        assert_eq!(
            list.text,
            "SELECT * FROM pg_catalog.pg_tables WHERE schemaname != 'pg_catalog' \
             AND schemaname != 'information_schema'"
        );
        let structure = dialect().table_structure_query(&user_schema());
        assert_eq!(structure.text, format!("{} AND tablename = $1", list.text));
        assert_eq!(structure.values, vec![SqlValue::Text("user".into())]);
    }

    #[test]
    fn insert_sql_with_returning() {
        let set = SetMap::new()
            .set("name", "tester")
            .set("email", "tester@tester.com");
        let query = dialect()
            .insert_query("user", &set, Some(&ColumnSelector::column("id")))
            .unwrap();
        assert_eq!(
            query.text,
            "INSERT INTO \"user\" (name, email) VALUES ($1, $2) RETURNING \"id\""
        );
        assert_eq!(
            query.values,
            vec![
                SqlValue::Text("tester".into()),
                SqlValue::Text("tester@tester.com".into())
            ]
        );
    }

    #[test]
    fn bare_column_lists_stay_unqualified() {
        let set = SetMap::new()
            .set("name", "tester")
            .set("email", "tester@tester.com");
        let projection = ColumnSelector::columns(["id"]);
        let query = dialect()
            .insert_query("user", &set, Some(&projection))
            .unwrap();
        assert_eq!(
            query.text,
            "INSERT INTO \"user\" (name, email) VALUES ($1, $2) RETURNING \"id\""
        );

        let projection = ColumnSelector::columns(["id", "name"]);
        let query = dialect()
            .select_query("user", Some(&projection), None, None, &[])
            .unwrap();
        assert_eq!(query.text, "SELECT \"id\", \"name\" FROM \"user\"");
    }

    #[test]
    fn insert_without_columns_is_an_error() {
        assert!(dialect().insert_query("user", &SetMap::new(), None).is_err());
    }

    #[test]
    fn update_where_placeholders_continue_after_set() {
        let set = SetMap::new().set("accepted", true);
        let filter = Condition::or(vec![
            Condition::field("receiver_id", 2),
            Condition::field("sender_id", 2),
        ]);
        let query = dialect()
            .update_query("friendstate", &set, Some(&filter), None)
            .unwrap();
        assert_eq!(
            query.text,
            "UPDATE \"friendstate\" SET accepted=$1 WHERE \
             (\"friendstate\".receiver_id = $2 OR \"friendstate\".sender_id = $3)"
        );
        assert_eq!(
            query.values,
            vec![SqlValue::Bool(true), SqlValue::Int(2), SqlValue::Int(2)]
        );
    }

    #[test]
    fn select_with_single_column_and_limit() {
        let query = dialect()
            .select_query(
                "user",
                Some(&ColumnSelector::column("id")),
                Some(&Condition::field("name", "tester")),
                Some(1),
                &[],
            )
            .unwrap();
        assert_eq!(
            query.text,
            "SELECT \"id\" FROM \"user\" WHERE \"user\".name = $1 LIMIT 1"
        );
        assert_eq!(query.values, vec![SqlValue::Text("tester".into())]);
    }

    #[test]
    fn limit_zero_is_not_emitted() {
        let query = dialect()
            .select_query("user", None, None, Some(0), &[])
            .unwrap();
        assert_eq!(query.text, "SELECT * FROM \"user\"");
    }

    #[test]
    fn select_with_aliased_joins() {
        let joins = [
            SqlJoin::new("user", "id", "receiver_id").alias("ra"),
            SqlJoin::new("user", "id", "sender_id").alias("rb"),
        ];
        let projection = ColumnSelector::columns([
            ("ra", "name", "receiver"),
            ("rb", "name", "sender"),
        ]);
        let query = dialect()
            .select_query(
                "friendstate",
                Some(&projection),
                Some(&Condition::field("accepted", true)),
                None,
                &joins,
            )
            .unwrap();
        assert_eq!(
            query.text,
            "SELECT \"ra\".\"name\" AS \"receiver\", \"rb\".\"name\" AS \"sender\" \
             FROM \"friendstate\" \
             INNER JOIN \"user\" ra ON \"ra\".id = \"friendstate\".receiver_id \
             INNER JOIN \"user\" rb ON \"rb\".id = \"friendstate\".sender_id \
             WHERE \"friendstate\".accepted = $1"
        );
    }

    #[test]
    fn join_without_alias_uses_the_target_table() {
        let joins = [SqlJoin::new("user", "id", "sender_id")];
        let query = dialect()
            .select_query("friendstate", None, None, None, &joins)
            .unwrap();
        assert_eq!(
            query.text,
            "SELECT * FROM \"friendstate\" \
             INNER JOIN \"user\" ON \"user\".id = \"friendstate\".sender_id"
        );
    }

    #[test]
    fn delete_with_filter_and_returning() {
        let query = dialect()
            .delete_query(
                "user",
                Some(&Condition::field("id", 7)),
                Some(&ColumnSelector::column("name")),
            )
            .unwrap();
        assert_eq!(
            query.text,
            "DELETE FROM \"user\" WHERE \"user\".id = $1 RETURNING \"name\""
        );
    }

    #[test]
    fn empty_column_list_projects_everything() {
        let query = dialect()
            .select_query(
                "user",
                Some(&ColumnSelector::Columns(Vec::new())),
                None,
                None,
                &[],
            )
            .unwrap();
        assert_eq!(query.text, "SELECT * FROM \"user\"");
    }
}
