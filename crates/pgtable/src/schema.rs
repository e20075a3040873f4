//! Table, column and join definitions.
//!
//! A [`TableSchema`] describes one table: its columns and foreign keys. The
//! dialect turns it into CREATE/DROP statements and the client registry uses
//! it for create-all/drop-all ordering. [`ColumnSelector`] and [`SqlJoin`]
//! describe the projection and join list of a SELECT.

use serde::Serialize;

use crate::value::SqlValue;

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
    pub size: Option<u32>,
    pub unique: bool,
    pub primary_key: bool,
    pub default: Option<SqlValue>,
}

impl Column {
    /// A `NOT NULL` column of the given type, with no constraints.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable: false,
            size: None,
            unique: false,
            primary_key: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Type size, e.g. `VARCHAR(size)`.
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Default literal, validated against the column type at DDL time.
    pub fn default_value(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A foreign-key clause with `ON DELETE CASCADE` semantics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKey {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

impl ForeignKey {
    pub fn new(
        column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            foreign_table: foreign_table.into(),
            foreign_column: foreign_column.into(),
        }
    }
}

/// A table definition: name, columns and foreign keys.
///
/// # Example
/// ```ignore
/// let user = TableSchema::new("user")
///     .column(Column::new("id", "serial").primary_key())
///     .column(Column::new("name", "varchar").size(32).unique());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }
}

/// One projected column, optionally table-qualified and aliased.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub table: Option<String>,
    pub column: String,
    pub alias: Option<String>,
}

impl SelectColumn {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
            alias: None,
        }
    }

    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
            alias: None,
        }
    }

    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl From<&str> for SelectColumn {
    fn from(column: &str) -> Self {
        SelectColumn::new(column)
    }
}

impl From<(&str, &str)> for SelectColumn {
    fn from((table, column): (&str, &str)) -> Self {
        SelectColumn::qualified(table, column)
    }
}

impl From<(&str, &str, &str)> for SelectColumn {
    fn from((table, column, alias): (&str, &str, &str)) -> Self {
        SelectColumn::qualified(table, column).aliased(alias)
    }
}

/// Projection of a SELECT or RETURNING clause.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSelector {
    /// `*`
    All,
    /// A single quoted column.
    Column(String),
    /// An explicit column list; an empty list falls back to `*`.
    Columns(Vec<SelectColumn>),
}

impl ColumnSelector {
    pub fn column(name: impl Into<String>) -> Self {
        ColumnSelector::Column(name.into())
    }

    pub fn columns<C: Into<SelectColumn>>(columns: impl IntoIterator<Item = C>) -> Self {
        ColumnSelector::Columns(columns.into_iter().map(Into::into).collect())
    }
}

/// Join flavor keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
        }
    }
}

/// One join clause of a SELECT.
///
/// `target_table.target_key` is matched against `source_table.source_key`;
/// `source_table` defaults to the table the query runs against. With an
/// `alias` the joined table is addressed through the alias in the ON clause,
/// which allows joining the same table twice.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlJoin {
    pub kind: JoinKind,
    pub alias: Option<String>,
    pub source_table: Option<String>,
    pub source_key: String,
    pub target_table: String,
    pub target_key: String,
}

impl SqlJoin {
    /// An inner join of `target_table` on
    /// `target_table.target_key = <current>.source_key`.
    pub fn new(
        target_table: impl Into<String>,
        target_key: impl Into<String>,
        source_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: JoinKind::default(),
            alias: None,
            source_table: None,
            source_key: source_key.into(),
            target_table: target_table.into(),
            target_key: target_key.into(),
        }
    }

    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn source_table(mut self, table: impl Into<String>) -> Self {
        self.source_table = Some(table.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_builder_chains() {
        let column = Column::new("name", "varchar").size(32).unique();
        assert_eq!(column.name, "name");
        assert_eq!(column.size, Some(32));
        assert!(column.unique);
        assert!(!column.nullable);
    }

    #[test]
    fn select_column_from_tuples() {
        assert_eq!(SelectColumn::from("id"), SelectColumn::new("id"));
        assert_eq!(
            SelectColumn::from(("user", "name", "sender")),
            SelectColumn::qualified("user", "name").aliased("sender")
        );
    }

    #[test]
    fn schema_keeps_column_order() {
        let schema = TableSchema::new("user")
            .column(Column::new("id", "serial").primary_key())
            .column(Column::new("name", "varchar").size(32));
        assert_eq!(schema.columns[0].name, "id");
        assert_eq!(schema.columns[1].name, "name");
    }
}
