// Partition-based join engine
// Rows from both sides are partitioned by the equality key paths extracted
// from the ON predicate; the predicate runs once per partition pair and
// matches emit the cross product of the underlying rows.

use std::collections::HashSet;

use indexmap::IndexMap;
use sqlparser::ast::{self, BinaryOperator, JoinConstraint, JoinOperator};

use crate::error::{ErrorKind, QueryError};
use crate::expr::{self, column_path};
use crate::query::Query;
use crate::value::{Map, Value};

#[derive(Clone, Copy, PartialEq, Eq)]
enum JoinKind {
    Inner,
    Left,
}

/// Execute one join step of a FROM clause.
pub(crate) fn execute(
    query: &Query,
    left: Vec<Value>,
    right: Vec<Value>,
    operator: &JoinOperator,
) -> Result<Vec<Value>, QueryError> {
    match operator {
        JoinOperator::Inner(JoinConstraint::On(on)) => {
            straight_join(query, left, right, on, JoinKind::Inner)
        }
        JoinOperator::LeftOuter(JoinConstraint::On(on)) => {
            straight_join(query, left, right, on, JoinKind::Left)
        }
        // A right join swaps sides and runs as a left join.
        JoinOperator::RightOuter(JoinConstraint::On(on)) => {
            straight_join(query, right, left, on, JoinKind::Left)
        }
        JoinOperator::Inner(_) | JoinOperator::LeftOuter(_) | JoinOperator::RightOuter(_) => {
            Err(ErrorKind::UnsupportedCase.extend("JOIN requires an ON condition"))
        }
        other => Err(ErrorKind::UnsupportedCase
            .extend(format!("join type {:?} is not supported", other))),
    }
}

struct Partition {
    probe: Map,
    rows: Vec<usize>,
}

fn straight_join(
    query: &Query,
    left: Vec<Value>,
    right: Vec<Value>,
    on: &ast::Expr,
    kind: JoinKind,
) -> Result<Vec<Value>, QueryError> {
    let (left_keys, right_keys) = extract_keys(on);
    let left_len = left.len();
    let mut all = left;
    all.extend(right);

    let left_partitions = partition(&all, &left_keys)?;
    let right_partitions = partition(&all, &right_keys)?;

    let mut out = Vec::new();
    let mut matched: HashSet<usize> = HashSet::new();
    for left_part in left_partitions.values() {
        for right_part in right_partitions.values() {
            let mut probe = left_part.probe.clone();
            merge_into(&mut probe, &right_part.probe);
            let verdict = expr::eval_expr(query, &mut probe, on)?;
            let verdict = verdict.as_bool().ok_or_else(|| {
                ErrorKind::InvalidType.extend(format!(
                    "JOIN condition expects a boolean, found {}",
                    verdict.type_name()
                ))
            })?;
            if !verdict {
                continue;
            }
            for &left_index in &left_part.rows {
                for &right_index in &right_part.rows {
                    let mut merged = row_map(&all[left_index])?;
                    for (key, value) in row_map(&all[right_index])? {
                        merged.insert(key, value);
                    }
                    out.push(Value::object(merged));
                    matched.insert(left_index);
                }
            }
        }
    }

    if kind == JoinKind::Left {
        for (index, row) in all.iter().take(left_len).enumerate() {
            if !matched.contains(&index) {
                out.push(row.clone());
            }
        }
    }
    Ok(out)
}

fn row_map(row: &Value) -> Result<Map, QueryError> {
    row.as_object().cloned().ok_or_else(|| {
        ErrorKind::InvalidType.extend(format!("JOIN expects object rows, found {}", row.type_name()))
    })
}

/// Group rows by the values at the given key paths. Rows missing any key
/// path stay out of the partition set.
fn partition(rows: &[Value], keys: &[String]) -> Result<IndexMap<String, Partition>, QueryError> {
    let segments: Vec<Vec<String>> = keys.iter().map(|key| split_key(key)).collect();
    let mut partitions: IndexMap<String, Partition> = IndexMap::new();
    'rows: for (index, row) in rows.iter().enumerate() {
        let map = match row.as_object() {
            Some(map) => map,
            None => {
                return Err(ErrorKind::InvalidType
                    .extend(format!("JOIN expects object rows, found {}", row.type_name())))
            }
        };
        let mut probe = Map::new();
        let mut identity = String::new();
        for (key, path) in keys.iter().zip(&segments) {
            let Some(value) = extract_path(map, path)? else {
                continue 'rows;
            };
            nest_path(&mut probe, path, value.clone());
            identity.push_str(&format!("\"{}\":\"{}\",", key, value.to_text()));
        }
        partitions
            .entry(identity)
            .or_insert_with(|| Partition {
                probe,
                rows: Vec::new(),
            })
            .rows
            .push(index);
    }
    Ok(partitions)
}

/// Read a dotted path out of a row; `None` when a key is absent.
fn extract_path(map: &Map, segments: &[String]) -> Result<Option<Value>, QueryError> {
    let Some(first) = segments.first() else {
        return Ok(None);
    };
    let Some(value) = map.get(first.as_str()) else {
        return Ok(None);
    };
    if segments.len() == 1 {
        return Ok(Some(value.clone()));
    }
    match value.as_object() {
        Some(inner) => extract_path(inner, &segments[1..]),
        None => Err(ErrorKind::ExpectationFailed.extend(format!(
            "cannot navigate through {} at {}",
            value.type_name(),
            first
        ))),
    }
}

/// Install a value at a dotted path, creating intermediate objects.
fn nest_path(target: &mut Map, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        target.insert(first.clone(), value);
        return;
    }
    let entry = target
        .entry(first.clone())
        .or_insert_with(|| Value::object(Map::new()));
    if !entry.is_object() {
        *entry = Value::object(Map::new());
    }
    if let Some(inner) = entry.as_object_mut() {
        nest_path(inner, rest, value);
    }
}

/// Split a dotted key path; a backslash escapes the next character.
fn split_key(key: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut buffer = String::new();
    let mut escaped = false;
    for ch in key.chars() {
        if escaped {
            buffer.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '.' => {
                segments.push(std::mem::take(&mut buffer));
            }
            other => buffer.push(other),
        }
    }
    if !buffer.is_empty() {
        segments.push(buffer);
    }
    segments
}

fn merge_into(target: &mut Map, source: &Map) {
    for (key, value) in source {
        target.insert(key.clone(), value.clone());
    }
}

/// Collect the column paths on each side of the ON predicate's comparisons.
/// Conjunctions merge positionally; comparison operands contribute all their
/// columns to their own side.
pub(crate) fn extract_keys(on: &ast::Expr) -> (Vec<String>, Vec<String>) {
    match on {
        ast::Expr::Nested(inner) => extract_keys(inner),
        ast::Expr::BinaryOp { left, op, right } => {
            let (left_left, left_right) = extract_keys(left);
            let (right_left, right_right) = extract_keys(right);
            match op {
                BinaryOperator::And | BinaryOperator::Or => {
                    let mut lefts = left_left;
                    lefts.extend(right_left);
                    let mut rights = left_right;
                    rights.extend(right_right);
                    (lefts, rights)
                }
                BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq => {
                    let mut lefts = left_left;
                    lefts.extend(left_right);
                    let mut rights = right_left;
                    rights.extend(right_right);
                    (lefts, rights)
                }
                // Arithmetic inside an operand keeps its columns together.
                _ => {
                    let mut all = left_left;
                    all.extend(left_right);
                    all.extend(right_left);
                    all.extend(right_right);
                    (all, Vec::new())
                }
            }
        }
        ast::Expr::Between { expr: target, .. } => extract_keys(target),
        ast::Expr::Identifier(_) | ast::Expr::CompoundIdentifier(_) => {
            match column_path(on) {
                Ok(path) => (vec![path], Vec::new()),
                Err(_) => (Vec::new(), Vec::new()),
            }
        }
        _ => (Vec::new(), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryOptions;
    use sqlparser::dialect::MySqlDialect;
    use sqlparser::parser::Parser;

    fn parse_on(sql: &str) -> ast::Expr {
        let query = format!("SELECT * FROM a JOIN b ON {}", sql);
        let statements = Parser::parse_sql(&MySqlDialect {}, &query).unwrap();
        match statements.into_iter().next().unwrap() {
            ast::Statement::Query(q) => match *q.body {
                ast::SetExpr::Select(select) => {
                    match &select.from[0].joins[0].join_operator {
                        JoinOperator::Inner(JoinConstraint::On(on)) => on.clone(),
                        _ => panic!("expected an inner join"),
                    }
                }
                _ => panic!("expected a select"),
            },
            _ => panic!("expected a query"),
        }
    }

    #[test]
    fn test_extract_keys_single_comparison() {
        let (left, right) = extract_keys(&parse_on("u.id = o.user_id"));
        assert_eq!(left, vec!["u.id"]);
        assert_eq!(right, vec!["o.user_id"]);
    }

    #[test]
    fn test_extract_keys_conjunction() {
        let (left, right) = extract_keys(&parse_on("u.id = o.user_id AND u.x = o.y"));
        assert_eq!(left, vec!["u.id", "u.x"]);
        assert_eq!(right, vec!["o.user_id", "o.y"]);
    }

    #[test]
    fn test_extract_keys_arithmetic_operand() {
        let (left, right) = extract_keys(&parse_on("u.a + u.b = o.c"));
        assert_eq!(left, vec!["u.a", "u.b"]);
        assert_eq!(right, vec!["o.c"]);
    }

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("a.b.c"), vec!["a", "b", "c"]);
        assert_eq!(split_key("plain"), vec!["plain"]);
        assert_eq!(split_key("a\\.b.c"), vec!["a.b", "c"]);
    }

    #[test]
    fn test_nest_path() {
        let mut map = Map::new();
        nest_path(
            &mut map,
            &["u".to_string(), "id".to_string()],
            Value::from(1i64),
        );
        assert_eq!(
            map.get("u").and_then(|v| v.get("id")),
            Some(&Value::from(1i64))
        );
    }

    fn rows(json: &str) -> Vec<Value> {
        Value::from_json_str(json).unwrap().into_rows().unwrap()
    }

    fn test_query() -> Query {
        let data = Value::document_from_json(serde_json::json!({})).unwrap();
        Query::new(data, "SELECT 1 FROM dual", QueryOptions::new()).unwrap()
    }

    #[test]
    fn test_inner_join_pairs_rows() {
        let query = test_query();
        let left = rows(r#"[{"u": {"id": 1, "name": "a"}}, {"u": {"id": 2, "name": "b"}}]"#);
        let right = rows(r#"[{"o": {"user_id": 1, "amount": 100}}, {"o": {"user_id": 1, "amount": 200}}]"#);
        let joined = straight_join(&query, left, right, &parse_on("u.id = o.user_id"), JoinKind::Inner)
            .unwrap();
        assert_eq!(joined.len(), 2);
        for row in &joined {
            assert_eq!(
                row.get("u").and_then(|u| u.get("id")),
                Some(&Value::from(1i64))
            );
            assert!(row.get("o").is_some());
        }
    }

    #[test]
    fn test_left_join_keeps_unmatched_rows() {
        let query = test_query();
        let left = rows(r#"[{"u": {"id": 1}}, {"u": {"id": 2}}]"#);
        let right = rows(r#"[{"o": {"user_id": 1}}]"#);
        let joined = straight_join(&query, left, right, &parse_on("u.id = o.user_id"), JoinKind::Left)
            .unwrap();
        assert_eq!(joined.len(), 2);
        let unmatched = joined
            .iter()
            .find(|row| row.get("o").is_none())
            .expect("unmatched left row");
        assert_eq!(
            unmatched.get("u").and_then(|u| u.get("id")),
            Some(&Value::from(2i64))
        );
    }

    #[test]
    fn test_inner_join_drops_unmatched_rows() {
        let query = test_query();
        let left = rows(r#"[{"u": {"id": 1}}, {"u": {"id": 2}}]"#);
        let right = rows(r#"[{"o": {"user_id": 1}}]"#);
        let joined = straight_join(&query, left, right, &parse_on("u.id = o.user_id"), JoinKind::Inner)
            .unwrap();
        assert_eq!(joined.len(), 1);
    }
}
