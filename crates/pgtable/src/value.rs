//! Scalar SQL values and the compiled query representation.
//!
//! [`SqlValue`] is the closed set of scalar types that can travel through a
//! compiled query: `NULL`, booleans, integers, floats and text. Rows come
//! back from the driver as [`SqlRow`] maps of the same scalars, and
//! [`ExecutableQuery`] pairs a `$n`-parameterized SQL string with its
//! positional values.

use bytes::BytesMut;
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

use crate::error::{SqlError, SqlResult};

/// A scalar value bound to a `$n` placeholder or read back from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Whether this value is `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Decode a scalar from a JSON literal.
    ///
    /// Used by the condition decoder; arrays and objects are not scalars.
    pub fn from_literal(value: &serde_json::Value) -> SqlResult<Self> {
        match value {
            serde_json::Value::Null => Ok(SqlValue::Null),
            serde_json::Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SqlValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(SqlValue::Float(f))
                } else {
                    Err(SqlError::condition(format!("number out of range: {n}")))
                }
            }
            serde_json::Value::String(s) => Ok(SqlValue::Text(s.clone())),
            other => Err(SqlError::condition(format!(
                "value must be a string, number, boolean or null, got: {other}"
            ))),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(b) => serializer.serialize_bool(*b),
            SqlValue::Int(i) => serializer.serialize_i64(*i),
            SqlValue::Float(f) => serializer.serialize_f64(*f),
            SqlValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i16> for SqlValue {
    fn from(value: i16) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f32> for SqlValue {
    fn from(value: f32) -> Self {
        SqlValue::Float(value.into())
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => b.to_sql(ty, out),
            // Narrow to the column's wire width; plain `i64::to_sql` would
            // write eight bytes into an int2/int4 column.
            SqlValue::Int(i) => {
                if *ty == Type::INT2 {
                    i16::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*i)?.to_sql(ty, out)
                } else {
                    i.to_sql(ty, out)
                }
            }
            SqlValue::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            SqlValue::Text(s) => s.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// A single result row: column name to scalar value.
pub type SqlRow = BTreeMap<String, SqlValue>;

/// A compiled, parameterized query ready for the driver boundary.
///
/// `text` uses `$1`, `$2`, … placeholders; `values` appear in strictly
/// ascending placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableQuery {
    pub text: String,
    pub values: Vec<SqlValue>,
}

impl ExecutableQuery {
    /// Create a query with no parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            values: Vec::new(),
        }
    }

    /// Create a query with positional parameters.
    pub fn with_values(text: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self {
            text: text.into(),
            values,
        }
    }

    /// Borrow the values as `ToSql` references for tokio-postgres.
    pub fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values
            .iter()
            .map(|v| v as &(dyn ToSql + Sync))
            .collect()
    }
}

/// An insertion-ordered column/value list for INSERT and UPDATE SET clauses.
///
/// # Example
/// ```ignore
/// let set = SetMap::new()
///     .set("name", "tester")
///     .set("email", "tester@tester.com");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetMap {
    entries: Vec<(String, SqlValue)>,
}

impl SetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column/value pair, keeping insertion order.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.entries.push((column.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// The column names, in insertion order.
    pub fn columns(&self) -> Vec<&str> {
        self.entries.iter().map(|(c, _)| c.as_str()).collect()
    }

    /// The values, in insertion order.
    pub fn values(&self) -> Vec<SqlValue> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_option_maps_none_to_null() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(7)), SqlValue::Int(7));
    }

    #[test]
    fn scalar_literals_decode() {
        assert_eq!(
            SqlValue::from_literal(&serde_json::json!(true)).unwrap(),
            SqlValue::Bool(true)
        );
        assert_eq!(
            SqlValue::from_literal(&serde_json::json!(1.5)).unwrap(),
            SqlValue::Float(1.5)
        );
        assert!(SqlValue::from_literal(&serde_json::json!([1])).is_err());
    }

    #[test]
    fn set_map_keeps_insertion_order() {
        let set = SetMap::new().set("name", "tester").set("age", 34);
        assert_eq!(set.columns(), vec!["name", "age"]);
        assert_eq!(
            set.values(),
            vec![SqlValue::Text("tester".into()), SqlValue::Int(34)]
        );
    }

    #[test]
    fn row_values_serialize_as_plain_scalars() {
        let json = serde_json::to_string(&SqlValue::Text("a'b".into())).unwrap();
        assert_eq!(json, "\"a'b\"");
        let json = serde_json::to_string(&SqlValue::Null).unwrap();
        assert_eq!(json, "null");
    }
}
