// ORDER BY sorting
// Key tuples are extracted up front (extraction can fail), so the sort
// itself runs with a total comparator.

use std::cmp::Ordering;

use crate::compare;
use crate::error::QueryError;
use crate::selector;
use crate::value::Value;

/// Stable-sort rows by `(path, ascending)` pairs. Null keys sort first on
/// the left and last on the right regardless of direction; ties fall through
/// to the next pair.
pub(crate) fn sort_rows(rows: &mut [Value], order: &[(String, bool)]) -> Result<(), QueryError> {
    if order.is_empty() {
        return Ok(());
    }
    let mut keyed: Vec<(Vec<Value>, Value)> = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let mut keys = Vec::with_capacity(order.len());
        for (path, _) in order {
            keys.push(selector::evaluate(row, path)?);
        }
        keyed.push((keys, row.clone()));
    }
    keyed.sort_by(|a, b| compare_keys(&a.0, &b.0, order));
    for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
        *slot = row;
    }
    Ok(())
}

fn compare_keys(a: &[Value], b: &[Value], order: &[(String, bool)]) -> Ordering {
    for (index, (_, ascending)) in order.iter().enumerate() {
        let (left, right) = (&a[index], &b[index]);
        if left.is_null() && right.is_null() {
            continue;
        }
        if left.is_null() {
            return Ordering::Less;
        }
        if right.is_null() {
            return Ordering::Greater;
        }
        let ordering = compare::compare(left, right);
        if ordering == Ordering::Equal {
            continue;
        }
        return if *ascending {
            ordering
        } else {
            ordering.reverse()
        };
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(json: &str) -> Vec<Value> {
        Value::from_json_str(json).unwrap().into_rows().unwrap()
    }

    fn order(pairs: &[(&str, bool)]) -> Vec<(String, bool)> {
        pairs
            .iter()
            .map(|(path, ascending)| (path.to_string(), *ascending))
            .collect()
    }

    #[test]
    fn test_ascending_single_key() {
        let mut data = rows(r#"[{"id": 2}, {"id": 1}, {"id": 3}]"#);
        sort_rows(&mut data, &order(&[("id", true)])).unwrap();
        assert_eq!(
            data,
            rows(r#"[{"id": 1}, {"id": 2}, {"id": 3}]"#)
        );
    }

    #[test]
    fn test_descending_single_key() {
        let mut data = rows(r#"[{"id": 2}, {"id": 1}, {"id": 3}]"#);
        sort_rows(&mut data, &order(&[("id", false)])).unwrap();
        assert_eq!(
            data,
            rows(r#"[{"id": 3}, {"id": 2}, {"id": 1}]"#)
        );
    }

    #[test]
    fn test_ties_fall_through_to_next_key() {
        let mut data = rows(
            r#"[{"age": 30, "name": "Bob"},
                {"age": 25, "name": "Charlie"},
                {"age": 25, "name": "Alice"}]"#,
        );
        sort_rows(&mut data, &order(&[("age", true), ("name", true)])).unwrap();
        assert_eq!(
            data,
            rows(
                r#"[{"age": 25, "name": "Alice"},
                    {"age": 25, "name": "Charlie"},
                    {"age": 30, "name": "Bob"}]"#
            )
        );
    }

    #[test]
    fn test_mixed_directions() {
        let mut data = rows(
            r#"[{"age": 30, "salary": 50000},
                {"age": 25, "salary": 45000},
                {"age": 25, "salary": 55000}]"#,
        );
        sort_rows(&mut data, &order(&[("age", true), ("salary", false)])).unwrap();
        assert_eq!(
            data,
            rows(
                r#"[{"age": 25, "salary": 55000},
                    {"age": 25, "salary": 45000},
                    {"age": 30, "salary": 50000}]"#
            )
        );
    }

    #[test]
    fn test_null_keys_sort_first() {
        let mut data = rows(r#"[{"id": 2}, {"other": true}, {"id": 1}]"#);
        sort_rows(&mut data, &order(&[("id", true)])).unwrap();
        assert_eq!(data[0], rows(r#"[{"other": true}]"#)[0]);
        // Direction does not move the null-keyed row.
        sort_rows(&mut data, &order(&[("id", false)])).unwrap();
        assert_eq!(data[0], rows(r#"[{"other": true}]"#)[0]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut data = rows(
            r#"[{"k": 1, "tag": "first"},
                {"k": 1, "tag": "second"},
                {"k": 0, "tag": "third"}]"#,
        );
        sort_rows(&mut data, &order(&[("k", true)])).unwrap();
        assert_eq!(data[0].get("tag"), Some(&Value::from("third")));
        assert_eq!(data[1].get("tag"), Some(&Value::from("first")));
        assert_eq!(data[2].get("tag"), Some(&Value::from("second")));
    }

    #[test]
    fn test_textual_keys() {
        let mut data = rows(r#"[{"name": "b"}, {"name": "a"}, {"name": "c"}]"#);
        sort_rows(&mut data, &order(&[("name", true)])).unwrap();
        assert_eq!(
            data,
            rows(r#"[{"name": "a"}, {"name": "b"}, {"name": "c"}]"#)
        );
    }
}
