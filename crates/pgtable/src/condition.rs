//! Condition types and the WHERE-clause compiler.
//!
//! A [`Condition`] is a recursive predicate: a single field comparison, an
//! `AND`/`OR` merge of sub-conditions, or a raw SQL escape hatch. Compiling a
//! condition yields a SQL fragment plus its positional values, threading a
//! shared placeholder counter so numbering stays contiguous with whatever
//! placeholders the surrounding statement already emitted (e.g. UPDATE SET).
//!
//! The literal array/object shapes accepted by `Deserialize` exist only at
//! the API boundary; once decoded, the core works on the tagged enum.

use serde::de::{Deserialize, Deserializer, Error as DeError};

use crate::error::{SqlError, SqlResult};
use crate::value::SqlValue;

/// Boolean operator of a [`Condition::Merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOp {
    And,
    Or,
}

impl MergeOp {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeOp::And => "AND",
            MergeOp::Or => "OR",
        }
    }

    fn joiner(self) -> &'static str {
        match self {
            MergeOp::And => " AND ",
            MergeOp::Or => " OR ",
        }
    }
}

/// A field reference inside a field condition.
///
/// `table` defaults to the table the surrounding query runs against;
/// `negated` flips the comparison (`!=`, `NOT IN`, `IS NOT NULL`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub table: Option<String>,
    pub field: String,
    pub negated: bool,
}

impl FieldRef {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            table: None,
            field: field.into(),
            negated: false,
        }
    }

    pub fn qualified(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            field: field.into(),
            negated: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negated = true;
        self
    }
}

/// A composable boolean predicate, compiled into a WHERE fragment plus
/// parameter list.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Compare a field against one value (`=`/`!=`/NULL test) or several
    /// (`IN`/`NOT IN`).
    Field {
        field: FieldRef,
        values: Vec<SqlValue>,
    },
    /// `AND`/`OR` over at least two sub-conditions.
    Merge {
        op: MergeOp,
        conditions: Vec<Condition>,
    },
    /// Raw SQL with `$1..$n` placeholders, renumbered into the surrounding
    /// sequence at compile time.
    Raw { query: String, values: Vec<SqlValue> },
}

impl Condition {
    /// `field = value` (or `field IS NULL` for a null value).
    pub fn field(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Condition::Field {
            field: FieldRef::new(field),
            values: vec![value.into()],
        }
    }

    /// `field != value` (or `field IS NOT NULL` for a null value).
    pub fn field_not(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Condition::Field {
            field: FieldRef::new(field).negated(),
            values: vec![value.into()],
        }
    }

    /// `table.field = value` with an explicit table.
    pub fn qualified(
        table: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<SqlValue>,
    ) -> Self {
        Condition::Field {
            field: FieldRef::qualified(table, field),
            values: vec![value.into()],
        }
    }

    /// `table.field != value` with an explicit table.
    pub fn qualified_not(
        table: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<SqlValue>,
    ) -> Self {
        Condition::Field {
            field: FieldRef::qualified(table, field).negated(),
            values: vec![value.into()],
        }
    }

    /// `field IN (values…)`.
    pub fn field_in<V: Into<SqlValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Condition::Field {
            field: FieldRef::new(field),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `field NOT IN (values…)`.
    pub fn field_not_in<V: Into<SqlValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Condition::Field {
            field: FieldRef::new(field).negated(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `field IS NULL`.
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::field(field, SqlValue::Null)
    }

    /// `field IS NOT NULL`.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::field_not(field, SqlValue::Null)
    }

    /// `(a AND b AND …)` over at least two sub-conditions.
    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition::Merge {
            op: MergeOp::And,
            conditions,
        }
    }

    /// `(a OR b OR …)` over at least two sub-conditions.
    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition::Merge {
            op: MergeOp::Or,
            conditions,
        }
    }

    /// Raw SQL escape hatch.
    ///
    /// Placeholders must be written as ascending `$1..$n`; they are shifted
    /// to continue the surrounding placeholder sequence when compiled.
    pub fn raw<V: Into<SqlValue>>(
        query: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Condition::Raw {
            query: query.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Human-readable variant name, used in compile-error diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Condition::Field { .. } => "field",
            Condition::Merge { .. } => "merge",
            Condition::Raw { .. } => "raw",
        }
    }

    /// Compile into `(fragment, values)`.
    ///
    /// `counter` is the number of placeholders the surrounding statement has
    /// already emitted; it is advanced by every placeholder this condition
    /// consumes, including across nested merges.
    pub fn compile(
        &self,
        current_table: &str,
        counter: &mut usize,
    ) -> SqlResult<(String, Vec<SqlValue>)> {
        match self {
            Condition::Merge { op, conditions } => {
                if conditions.len() < 2 {
                    return Err(SqlError::condition(format!(
                        "{} merge requires at least two sub-conditions, got {}",
                        op.as_str(),
                        conditions.len()
                    )));
                }
                let mut fragments = Vec::with_capacity(conditions.len());
                let mut values = Vec::new();
                for condition in conditions {
                    let (fragment, mut vals) = condition.compile(current_table, counter)?;
                    fragments.push(fragment);
                    values.append(&mut vals);
                }
                Ok((format!("({})", fragments.join(op.joiner())), values))
            }
            Condition::Field { field, values } => {
                let table = field.table.as_deref().unwrap_or(current_table);
                let column = format!("\"{table}\".{}", field.field);
                match values.as_slice() {
                    [] => Err(SqlError::condition(format!(
                        "field condition on '{}' requires at least one value",
                        field.field
                    ))),
                    [value] if value.is_null() => {
                        let not = if field.negated { "NOT " } else { "" };
                        Ok((format!("{column} IS {not}NULL"), Vec::new()))
                    }
                    [value] => {
                        *counter += 1;
                        let op = if field.negated { "!=" } else { "=" };
                        Ok((format!("{column} {op} ${counter}"), vec![value.clone()]))
                    }
                    many => {
                        let mut placeholders = Vec::with_capacity(many.len());
                        for _ in many {
                            *counter += 1;
                            placeholders.push(format!("${counter}"));
                        }
                        let not = if field.negated { "NOT " } else { "" };
                        Ok((
                            format!("{column} {not}IN ({})", placeholders.join(", ")),
                            many.to_vec(),
                        ))
                    }
                }
            }
            Condition::Raw { query, values } => {
                let text = renumber_placeholders(query, counter);
                Ok((text, values.clone()))
            }
        }
    }
}

/// Compile a condition for the given table, annotating any failure with the
/// condition variant and a pretty-printed dump of the offending condition.
pub fn compile_condition(
    current_table: &str,
    condition: &Condition,
    counter: &mut usize,
) -> SqlResult<(String, Vec<SqlValue>)> {
    condition.compile(current_table, counter).map_err(|err| {
        SqlError::condition(format!(
            "{err}\nwhile compiling {} condition:\n{condition:#?}",
            condition.kind()
        ))
    })
}

/// Shift `$n` tokens in a raw condition so they continue the surrounding
/// placeholder sequence.
///
/// A single left-to-right scan rewrites every `$<digits>` token to
/// `$(base + n)`, so already-shifted numbers can never be picked up again.
/// The counter advances by the highest token seen.
fn renumber_placeholders(query: &str, counter: &mut usize) -> String {
    let base = *counter;
    let mut highest = 0usize;
    let mut out = String::with_capacity(query.len() + 8);
    let mut rest = query;
    while let Some(pos) = rest.find('$') {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);
        let after = &tail[1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        match after[..digits].parse::<usize>() {
            Ok(number) if digits > 0 && number > 0 => {
                highest = highest.max(number);
                out.push('$');
                out.push_str(&(base + number).to_string());
            }
            _ => {
                // Not a placeholder token, keep it verbatim.
                out.push('$');
                out.push_str(&after[..digits]);
            }
        }
        rest = &after[digits..];
    }
    out.push_str(rest);
    *counter = base + highest;
    out
}

const COMPARISON_OPERATORS: [&str; 8] = ["=", "==", "!=", "<>", "<", ">", "<=", ">="];

impl Condition {
    /// Decode a condition from its literal JSON shape.
    ///
    /// Accepted shapes:
    /// - `[selector, value, ...values]` — field condition, where `selector`
    ///   is `"field"`, `[table, field]`, `[field, "NOT"]` or
    ///   `[table, field, "NOT"]`
    /// - `["AND"|"OR", cond, cond, ...]` — merge (tag is case-sensitive)
    /// - `{"query": "...", "values": [...]}` — raw condition
    pub fn from_literal(value: &serde_json::Value) -> SqlResult<Self> {
        match value {
            serde_json::Value::Array(items) => {
                if items.is_empty() {
                    return Err(SqlError::condition("condition array is empty"));
                }
                match items[0].as_str() {
                    Some(tag @ ("AND" | "OR")) => {
                        if items.len() < 3 {
                            return Err(SqlError::condition(format!(
                                "{tag} merge requires at least two sub-conditions, got {}",
                                items.len() - 1
                            )));
                        }
                        let conditions = items[1..]
                            .iter()
                            .map(Self::from_literal)
                            .collect::<SqlResult<Vec<_>>>()?;
                        Ok(Condition::Merge {
                            op: if tag == "AND" { MergeOp::And } else { MergeOp::Or },
                            conditions,
                        })
                    }
                    _ => {
                        let field = decode_field_ref(&items[0])?;
                        let values = items[1..]
                            .iter()
                            .map(SqlValue::from_literal)
                            .collect::<SqlResult<Vec<_>>>()?;
                        if values.is_empty() {
                            return Err(SqlError::condition(format!(
                                "field condition on '{}' requires at least one value",
                                field.field
                            )));
                        }
                        if values.len() > 1 {
                            if let SqlValue::Text(first) = &values[0] {
                                if COMPARISON_OPERATORS.contains(&first.as_str()) {
                                    return Err(SqlError::condition(format!(
                                        "'{first}' is not a valid comparison: field conditions \
                                         support equality, NULL tests and IN lists only"
                                    )));
                                }
                            }
                        }
                        Ok(Condition::Field { field, values })
                    }
                }
            }
            serde_json::Value::Object(map) => {
                let query = map
                    .get("query")
                    .and_then(|q| q.as_str())
                    .ok_or_else(|| {
                        SqlError::condition("raw condition requires a string 'query'")
                    })?
                    .to_string();
                let values = match map.get("values") {
                    None => Vec::new(),
                    Some(serde_json::Value::Array(items)) => items
                        .iter()
                        .map(SqlValue::from_literal)
                        .collect::<SqlResult<Vec<_>>>()?,
                    Some(other) => {
                        return Err(SqlError::condition(format!(
                            "raw condition 'values' must be an array, got: {other}"
                        )));
                    }
                };
                Ok(Condition::Raw { query, values })
            }
            other => Err(SqlError::condition(format!(
                "unknown condition shape: {other}"
            ))),
        }
    }
}

fn decode_field_ref(value: &serde_json::Value) -> SqlResult<FieldRef> {
    match value {
        serde_json::Value::String(field) => Ok(FieldRef::new(field.clone())),
        serde_json::Value::Array(items) => {
            let parts = items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        SqlError::condition(format!(
                            "field selector parts must be strings, got: {item}"
                        ))
                    })
                })
                .collect::<SqlResult<Vec<_>>>()?;
            match parts.as_slice() {
                [field, tag] if tag.to_uppercase() == "NOT" => {
                    Ok(FieldRef::new(field.clone()).negated())
                }
                [table, field] => Ok(FieldRef::qualified(table.clone(), field.clone())),
                [table, field, tag, ..] => {
                    let mut field = FieldRef::qualified(table.clone(), field.clone());
                    if tag.to_uppercase() == "NOT" {
                        field = field.negated();
                    }
                    Ok(field)
                }
                _ => Err(SqlError::condition(format!(
                    "malformed field selector: {value}"
                ))),
            }
        }
        other => Err(SqlError::condition(format!(
            "malformed field selector: {other}"
        ))),
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let literal = serde_json::Value::deserialize(deserializer)?;
        Condition::from_literal(&literal).map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(condition: &Condition) -> (String, Vec<SqlValue>) {
        let mut counter = 0;
        condition.compile("t", &mut counter).unwrap()
    }

    #[test]
    fn single_value_equality() {
        let (sql, values) = compile(&Condition::field("name", "tester"));
        assert_eq!(sql, "\"t\".name = $1");
        assert_eq!(values, vec![SqlValue::Text("tester".into())]);
    }

    #[test]
    fn single_value_negated() {
        let (sql, values) = compile(&Condition::field_not("accepted", true));
        assert_eq!(sql, "\"t\".accepted != $1");
        assert_eq!(values, vec![SqlValue::Bool(true)]);
    }

    #[test]
    fn null_test_consumes_no_placeholder() {
        let mut counter = 3;
        let (sql, values) = Condition::is_null("deleted_at")
            .compile("t", &mut counter)
            .unwrap();
        assert_eq!(sql, "\"t\".deleted_at IS NULL");
        assert!(values.is_empty());
        assert_eq!(counter, 3);

        let (sql, _) = compile(&Condition::is_not_null("deleted_at"));
        assert_eq!(sql, "\"t\".deleted_at IS NOT NULL");
    }

    #[test]
    fn multi_value_in_list_keeps_order() {
        let (sql, values) = compile(&Condition::field_in("id", [3, 1, 2]));
        assert_eq!(sql, "\"t\".id IN ($1, $2, $3)");
        assert_eq!(
            values,
            vec![SqlValue::Int(3), SqlValue::Int(1), SqlValue::Int(2)]
        );

        let (sql, _) = compile(&Condition::field_not_in("id", [1, 2]));
        assert_eq!(sql, "\"t\".id NOT IN ($1, $2)");
    }

    #[test]
    fn qualified_field_overrides_current_table() {
        let (sql, _) = compile(&Condition::qualified("other", "id", 1));
        assert_eq!(sql, "\"other\".id = $1");
    }

    #[test]
    fn empty_value_list_is_an_error() {
        let condition = Condition::field_in("id", Vec::<i64>::new());
        let mut counter = 0;
        assert!(condition.compile("t", &mut counter).is_err());
    }

    #[test]
    fn merge_values_concatenate_left_to_right() {
        let condition = Condition::and(vec![
            Condition::field_not("accepted", true),
            Condition::or(vec![
                Condition::field("receiver_id", 1),
                Condition::field("sender_id", 1),
            ]),
        ]);
        let (sql, values) = compile(&condition);
        assert_eq!(
            sql,
            "(\"t\".accepted != $1 AND (\"t\".receiver_id = $2 OR \"t\".sender_id = $3))"
        );
        assert_eq!(
            values,
            vec![SqlValue::Bool(true), SqlValue::Int(1), SqlValue::Int(1)]
        );
    }

    #[test]
    fn merge_value_count_is_sum_of_subconditions() {
        let condition = Condition::or(vec![
            Condition::field_in("a", [1, 2, 3]),
            Condition::and(vec![
                Condition::field("b", 4),
                Condition::is_null("c"),
                Condition::field_in("d", [5, 6]),
            ]),
        ]);
        let mut counter = 0;
        let (_, values) = condition.compile("t", &mut counter).unwrap();
        assert_eq!(values.len(), 6);
        assert_eq!(counter, 6);
    }

    #[test]
    fn merge_with_one_subcondition_is_an_error() {
        let condition = Condition::and(vec![Condition::field("a", 1)]);
        let mut counter = 0;
        let err = condition.compile("t", &mut counter).unwrap_err();
        assert!(err.is_condition());
    }

    #[test]
    fn raw_renumbering_is_identity_without_shift() {
        let condition = Condition::raw("a = $1 AND b >= $2", [1, 2]);
        let mut counter = 0;
        let (sql, values) = condition.compile("t", &mut counter).unwrap();
        assert_eq!(sql, "a = $1 AND b >= $2");
        assert_eq!(values.len(), 2);
        assert_eq!(counter, 2);
    }

    #[test]
    fn raw_renumbering_shifts_past_existing_placeholders() {
        let condition = Condition::raw("a = $1 AND (b = $2 OR c = $3)", [1, 2, 3]);
        let mut counter = 4;
        let (sql, _) = condition.compile("t", &mut counter).unwrap();
        assert_eq!(sql, "a = $5 AND (b = $6 OR c = $7)");
        assert_eq!(counter, 7);
    }

    #[test]
    fn raw_inside_merge_continues_the_sequence() {
        let condition = Condition::and(vec![
            Condition::field("id", 9),
            Condition::raw("score > $1", [50]),
        ]);
        let (sql, values) = compile(&condition);
        assert_eq!(sql, "(\"t\".id = $1 AND score > $2)");
        assert_eq!(values, vec![SqlValue::Int(9), SqlValue::Int(50)]);
    }

    #[test]
    fn compile_condition_annotates_errors_with_a_dump() {
        let condition = Condition::or(vec![Condition::field("a", 1)]);
        let mut counter = 0;
        let err = compile_condition("t", &condition, &mut counter).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("merge condition"));
        assert!(text.contains("Merge"));
    }

    mod decode {
        use super::*;

        fn decode(literal: serde_json::Value) -> SqlResult<Condition> {
            Condition::from_literal(&literal)
        }

        #[test]
        fn bare_field_selector() {
            let condition = decode(serde_json::json!(["name", "tester"])).unwrap();
            assert_eq!(condition, Condition::field("name", "tester"));
        }

        #[test]
        fn negated_selector_is_case_insensitive() {
            let condition = decode(serde_json::json!([["accepted", "not"], true])).unwrap();
            assert_eq!(condition, Condition::field_not("accepted", true));
        }

        #[test]
        fn two_part_selector_is_table_and_field() {
            let condition = decode(serde_json::json!([["friendship", "sender_id"], 1])).unwrap();
            assert_eq!(condition, Condition::qualified("friendship", "sender_id", 1));
        }

        #[test]
        fn three_part_selector_with_not() {
            let condition =
                decode(serde_json::json!([["friendship", "accepted", "NOT"], true])).unwrap();
            assert_eq!(
                condition,
                Condition::qualified_not("friendship", "accepted", true)
            );
        }

        #[test]
        fn merge_tag_is_case_sensitive() {
            let condition = decode(serde_json::json!([
                "AND",
                [["accepted", "NOT"], true],
                ["OR", ["receiver_id", 1], ["sender_id", 1]]
            ]))
            .unwrap();
            let mut counter = 0;
            let (sql, values) = condition.compile("friendstate", &mut counter).unwrap();
            assert_eq!(
                sql,
                "(\"friendstate\".accepted != $1 AND (\"friendstate\".receiver_id = $2 OR \
                 \"friendstate\".sender_id = $3))"
            );
            assert_eq!(
                values,
                vec![SqlValue::Bool(true), SqlValue::Int(1), SqlValue::Int(1)]
            );

            // lowercase "and" is a field selector, not a merge tag
            let condition = decode(serde_json::json!(["and", 1])).unwrap();
            assert_eq!(condition, Condition::field("and", 1));
        }

        #[test]
        fn merge_with_single_member_is_rejected() {
            assert!(decode(serde_json::json!(["AND", ["a", 1]])).is_err());
        }

        #[test]
        fn raw_object_shape() {
            let condition = decode(serde_json::json!({
                "query": "'user'.name != $1",
                "values": ["test"]
            }))
            .unwrap();
            assert_eq!(condition, Condition::raw("'user'.name != $1", ["test"]));
        }

        #[test]
        fn comparison_operator_tuple_is_rejected() {
            let err = decode(serde_json::json!(["age", ">", 34])).unwrap_err();
            assert!(err.is_condition());
            assert!(err.to_string().contains("'>'"));
        }

        #[test]
        fn unknown_shapes_are_rejected() {
            assert!(decode(serde_json::json!(42)).is_err());
            assert!(decode(serde_json::json!([])).is_err());
            assert!(decode(serde_json::json!([["a", 1], 2])).is_err());
        }

        #[test]
        fn deserialize_goes_through_the_literal_decoder() {
            let condition: Condition =
                serde_json::from_str(r#"["AND", ["a", 1], ["b", 2]]"#).unwrap();
            assert_eq!(
                condition,
                Condition::and(vec![Condition::field("a", 1), Condition::field("b", 2)])
            );
        }
    }
}
