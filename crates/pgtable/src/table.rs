//! Per-table facade over the client.
//!
//! An [`SqlTable`] pairs one registered [`TableSchema`] with the client it
//! was registered on. All methods compile through the client's dialect and
//! execute through the client, so they share its connection and idle timer.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::client::SqlClient;
use crate::condition::Condition;
use crate::driver::SqlDriver;
use crate::error::{SqlError, SqlResult};
use crate::schema::{ColumnSelector, SqlJoin, TableSchema};
use crate::value::{SetMap, SqlRow};

/// Typed handle for one table.
pub struct SqlTable<D: SqlDriver> {
    client: SqlClient<D>,
    schema: Arc<TableSchema>,
}

impl<D: SqlDriver> Clone for SqlTable<D> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            schema: self.schema.clone(),
        }
    }
}

impl<D: SqlDriver> SqlTable<D> {
    pub(crate) fn new(client: SqlClient<D>, schema: Arc<TableSchema>) -> Self {
        Self { client, schema }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// `CREATE TABLE IF NOT EXISTS` for this table.
    pub async fn create(&self) -> SqlResult<()> {
        let query = self.client.dialect().create_table_query(&self.schema)?;
        self.client.execute(&query).await?;
        Ok(())
    }

    /// `DROP TABLE IF EXISTS … CASCADE` for this table.
    pub async fn drop(&self) -> SqlResult<()> {
        let query = self.client.dialect().drop_table_query(&self.schema);
        self.client.execute(&query).await?;
        Ok(())
    }

    /// The table's catalog row, or `None` when the table does not exist.
    pub async fn structure(&self) -> SqlResult<Option<SqlRow>> {
        let query = self.client.dialect().table_structure_query(&self.schema);
        let mut rows = self.client.execute(&query).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Whether the table exists in the database.
    pub async fn exists(&self) -> SqlResult<bool> {
        Ok(self.structure().await?.is_some())
    }

    /// Hex-encoded SHA-256 over the table's catalog row.
    ///
    /// Useful as a cheap change detector for migrations; `None` when the
    /// table does not exist.
    pub async fn structure_hash(&self) -> SqlResult<Option<String>> {
        let Some(row) = self.structure().await? else {
            return Ok(None);
        };
        let json = serde_json::to_string(&row)
            .map_err(|err| SqlError::decode("structure", err.to_string()))?;
        let digest = Sha256::digest(json.as_bytes());
        let hex = digest
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        Ok(Some(hex))
    }

    /// Insert one row; with a `returning` projection the returned row is
    /// yielded.
    pub async fn insert(
        &self,
        set: SetMap,
        returning: Option<ColumnSelector>,
    ) -> SqlResult<Option<SqlRow>> {
        let query =
            self.client
                .dialect()
                .insert_query(&self.schema.name, &set, returning.as_ref())?;
        let mut rows = self.client.execute(&query).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Update matching rows, returning rows per the `returning` projection.
    pub async fn update(
        &self,
        set: SetMap,
        filter: Option<Condition>,
        returning: Option<ColumnSelector>,
    ) -> SqlResult<Vec<SqlRow>> {
        let query = self.client.dialect().update_query(
            &self.schema.name,
            &set,
            filter.as_ref(),
            returning.as_ref(),
        )?;
        self.client.execute(&query).await
    }

    /// Delete matching rows, returning rows per the `returning` projection.
    pub async fn delete(
        &self,
        filter: Option<Condition>,
        returning: Option<ColumnSelector>,
    ) -> SqlResult<Vec<SqlRow>> {
        let query = self.client.dialect().delete_query(
            &self.schema.name,
            filter.as_ref(),
            returning.as_ref(),
        )?;
        self.client.execute(&query).await
    }

    /// Select matching rows.
    pub async fn select(
        &self,
        projection: Option<ColumnSelector>,
        filter: Option<Condition>,
        limit: Option<u32>,
        joins: &[SqlJoin],
    ) -> SqlResult<Vec<SqlRow>> {
        let query = self.client.dialect().select_query(
            &self.schema.name,
            projection.as_ref(),
            filter.as_ref(),
            limit,
            joins,
        )?;
        self.client.execute(&query).await
    }

    /// Select with `LIMIT 1`, yielding the row if any matched.
    pub async fn select_one(
        &self,
        projection: Option<ColumnSelector>,
        filter: Option<Condition>,
        joins: &[SqlJoin],
    ) -> SqlResult<Option<SqlRow>> {
        let mut rows = self.select(projection, filter, Some(1), joins).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }
}
