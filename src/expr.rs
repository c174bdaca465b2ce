// Expression tree-walker over the SQL AST

use std::cmp::Ordering;
use std::sync::Arc;

use sqlparser::ast::{self, BinaryOperator, UnaryOperator};

use crate::compare;
use crate::error::{ErrorKind, QueryError};
use crate::functions;
use crate::query::Query;
use crate::selector;
use crate::value::{Map, Value};

/// Evaluate an expression against the current row.
pub(crate) fn eval_expr(
    query: &Query,
    current: &mut Map,
    expression: &ast::Expr,
) -> Result<Value, QueryError> {
    match expression {
        ast::Expr::Nested(inner) => eval_expr(query, current, inner),

        ast::Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And | BinaryOperator::Or => {
                eval_logical(query, current, left, op, right)
            }
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq => eval_comparison(query, current, left, op, right),
            BinaryOperator::Plus
            | BinaryOperator::Minus
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Modulo
            | BinaryOperator::MyIntegerDivide
            | BinaryOperator::BitwiseAnd
            | BinaryOperator::BitwiseOr
            | BinaryOperator::BitwiseXor
            | BinaryOperator::PGBitwiseShiftLeft
            | BinaryOperator::PGBitwiseShiftRight => {
                eval_arithmetic(query, current, left, op, right)
            }
            other => Err(ErrorKind::UndefinedOperator
                .extend(format!("operator {} is not supported", other))),
        },

        ast::Expr::Like {
            negated,
            expr: target,
            pattern,
            ..
        } => {
            let matched = eval_like(query, current, target, pattern)?;
            Ok(Value::Bool(matched != *negated))
        }

        ast::Expr::InList {
            expr: target,
            list,
            negated,
        } => {
            let needle = resolve_operand(query, current, target)?;
            let mut haystack = Vec::with_capacity(list.len());
            for item in list {
                haystack.push(resolve_operand(query, current, item)?);
            }
            let contained = in_array(&needle, &haystack);
            Ok(Value::Bool(contained != *negated))
        }

        ast::Expr::InSubquery {
            expr: target,
            subquery,
            negated,
        } => {
            let needle = resolve_operand(query, current, target)?;
            let rows = eval_subquery(query, current, subquery)?;
            let rows = rows.as_array().cloned().ok_or_else(|| {
                ErrorKind::InvalidType.extend("IN expects the subquery to produce an array")
            })?;
            let contained = in_array(&needle, &rows);
            Ok(Value::Bool(contained != *negated))
        }

        ast::Expr::Between {
            expr: target,
            negated,
            low,
            high,
        } => {
            // BETWEEN compares the textual forms of all three operands.
            let point = resolve_operand(query, current, target)?.to_text();
            let low = resolve_operand(query, current, low)?.to_text();
            let high = resolve_operand(query, current, high)?.to_text();
            let within = point.as_str() > low.as_str() && point.as_str() < high.as_str();
            Ok(Value::Bool(within != *negated))
        }

        ast::Expr::Value(literal) => eval_literal(literal),

        ast::Expr::Identifier(_) | ast::Expr::CompoundIdentifier(_) => {
            Ok(Value::column_name(column_path(expression)?))
        }

        ast::Expr::IsNull(target) => {
            let value = resolve_operand(query, current, target)?;
            Ok(Value::Bool(value.is_null()))
        }
        ast::Expr::IsNotNull(target) => {
            let value = resolve_operand(query, current, target)?;
            Ok(Value::Bool(!value.is_null()))
        }
        ast::Expr::IsTrue(target) | ast::Expr::IsNotFalse(target) => {
            let value = eval_is_bool(query, current, target)?;
            Ok(Value::Bool(value))
        }
        ast::Expr::IsFalse(target) | ast::Expr::IsNotTrue(target) => {
            let value = eval_is_bool(query, current, target)?;
            Ok(Value::Bool(!value))
        }

        ast::Expr::UnaryOp { op, expr: target } => eval_unary(query, current, op, target),

        ast::Expr::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_operand(query, current, item)?);
            }
            Ok(Value::array(out))
        }

        ast::Expr::Subquery(subquery) => eval_subquery(query, current, subquery),

        ast::Expr::Exists { subquery, negated } => {
            let exists = eval_exists(query, current, subquery)?;
            Ok(Value::Bool(exists != *negated))
        }

        ast::Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if operand.is_some() {
                return Err(ErrorKind::UnsupportedCase
                    .extend("CASE with an operand is not supported"));
            }
            for (condition, result) in conditions.iter().zip(results) {
                let verdict = eval_expr(query, current, condition)?;
                let verdict = verdict.as_bool().ok_or_else(|| {
                    ErrorKind::InvalidType.extend(format!(
                        "CASE condition expects a boolean, found {}",
                        verdict.type_name()
                    ))
                })?;
                if verdict {
                    return eval_expr(query, current, result);
                }
            }
            match else_result {
                Some(fallback) => eval_expr(query, current, fallback),
                None => Ok(Value::Null),
            }
        }

        ast::Expr::Substring {
            expr: target,
            substring_from,
            substring_for,
            ..
        } => eval_substring(query, current, target, substring_from, substring_for),

        ast::Expr::Function(function) => functions::dispatch(query, current, function),

        other => Err(ErrorKind::UnsupportedCase
            .extend(format!("expression {} is not supported", other))),
    }
}

/// The value-of rule: column names resolve through the selector (missing
/// keys read as null), string literals become text, everything else passes
/// through.
pub(crate) fn value_of(
    _query: &Query,
    current: &Map,
    value: Value,
) -> Result<Value, QueryError> {
    match value {
        Value::ColumnName(path) => {
            match selector::evaluate(&Value::object(current.clone()), &path) {
                Ok(resolved) => Ok(resolved),
                Err(error) if error.kind == ErrorKind::KeyNotFound => Ok(Value::Null),
                Err(error) => Err(error),
            }
        }
        Value::NeutralString(text) => Ok(Value::Text(text)),
        other => Ok(other),
    }
}

/// Evaluate and resolve in one step.
pub(crate) fn resolve_operand(
    query: &Query,
    current: &mut Map,
    expression: &ast::Expr,
) -> Result<Value, QueryError> {
    let value = eval_expr(query, current, expression)?;
    value_of(query, current, value)
}

/// Build the dotted path of a column reference.
pub(crate) fn column_path(expression: &ast::Expr) -> Result<String, QueryError> {
    match expression {
        ast::Expr::Identifier(ident) => Ok(ident.value.clone()),
        ast::Expr::CompoundIdentifier(idents) => Ok(idents
            .iter()
            .map(|ident| ident.value.as_str())
            .collect::<Vec<_>>()
            .join(".")),
        other => Err(ErrorKind::InvalidType
            .extend(format!("expected a column name, found {}", other))),
    }
}

/// Read a non-negative integer literal (LIMIT/OFFSET operands).
pub(crate) fn literal_usize(expression: &ast::Expr) -> Result<usize, QueryError> {
    match expression {
        ast::Expr::Value(ast::Value::Number(text, _)) => text.parse().map_err(|_| {
            ErrorKind::InvalidCast.extend(format!("{} is not a valid row count", text))
        }),
        other => Err(ErrorKind::InvalidType
            .extend(format!("expected an integer literal, found {}", other))),
    }
}

/// True when the call is one of the standard aggregates.
pub(crate) fn is_aggregate_call(function: &ast::Function) -> bool {
    if function.name.0.len() != 1 {
        return false;
    }
    matches!(
        function.name.0[0].value.to_lowercase().as_str(),
        "sum" | "avg" | "min" | "max" | "count"
    )
}

// ── Operator evaluation ──────────────────────────────────────────────────────

fn eval_logical(
    query: &Query,
    current: &mut Map,
    left: &ast::Expr,
    op: &BinaryOperator,
    right: &ast::Expr,
) -> Result<Value, QueryError> {
    let left_value = resolve_operand(query, current, left)?;
    if left_value.is_null() {
        return Err(ErrorKind::ExpectationFailed
            .extend(format!("left side of {} is null", op)));
    }
    let left_value = left_value.as_bool().ok_or_else(|| {
        ErrorKind::InvalidCast.extend(format!("{} expects boolean operands", op))
    })?;
    let right_value = resolve_operand(query, current, right)?;
    if right_value.is_null() {
        return Err(ErrorKind::ExpectationFailed
            .extend(format!("right side of {} is null", op)));
    }
    let right_value = right_value.as_bool().ok_or_else(|| {
        ErrorKind::InvalidCast.extend(format!("{} expects boolean operands", op))
    })?;
    let result = match op {
        BinaryOperator::And => left_value && right_value,
        _ => left_value || right_value,
    };
    Ok(Value::Bool(result))
}

fn eval_comparison(
    query: &Query,
    current: &mut Map,
    left: &ast::Expr,
    op: &BinaryOperator,
    right: &ast::Expr,
) -> Result<Value, QueryError> {
    // Bind backward navigation for the operand lookups.
    let previous = current.insert("<-".to_string(), Value::object(query.data.clone()));
    let outcome = (|| {
        let left_value = resolve_operand(query, current, left)?;
        let right_value = resolve_operand(query, current, right)?;
        let ordering = compare::compare(&left_value, &right_value);
        let result = match op {
            BinaryOperator::Eq => ordering == Ordering::Equal,
            BinaryOperator::NotEq => ordering != Ordering::Equal,
            BinaryOperator::Gt => ordering == Ordering::Greater,
            BinaryOperator::GtEq => ordering != Ordering::Less,
            BinaryOperator::Lt => ordering == Ordering::Less,
            _ => ordering != Ordering::Greater,
        };
        Ok(Value::Bool(result))
    })();
    match previous {
        Some(previous) => {
            current.insert("<-".to_string(), previous);
        }
        None => {
            current.shift_remove("<-");
        }
    }
    outcome
}

fn in_array(needle: &Value, haystack: &[Value]) -> bool {
    for candidate in haystack {
        // An object element matches against its sole value.
        let candidate = match candidate.as_object().and_then(|map| map.values().next()) {
            Some(sole) => sole,
            None => candidate,
        };
        if compare::compare(needle, candidate) == Ordering::Equal {
            return true;
        }
    }
    false
}

fn eval_like(
    query: &Query,
    current: &mut Map,
    target: &ast::Expr,
    pattern: &ast::Expr,
) -> Result<bool, QueryError> {
    let value = resolve_operand(query, current, target)?;
    let pattern = resolve_operand(query, current, pattern)?;
    compare::like_match(&value.to_text(), &pattern.to_text())
}

fn eval_arithmetic(
    query: &Query,
    current: &mut Map,
    left: &ast::Expr,
    op: &BinaryOperator,
    right: &ast::Expr,
) -> Result<Value, QueryError> {
    let left_value = resolve_operand(query, current, left)?;
    if left_value.is_null() {
        return Ok(Value::Null);
    }
    let right_value = resolve_operand(query, current, right)?;
    if right_value.is_null() {
        return Ok(Value::Null);
    }
    let lhs = require_number(&left_value, op)?;
    let rhs = require_number(&right_value, op)?;
    let result = match op {
        BinaryOperator::Plus => lhs + rhs,
        BinaryOperator::Minus => lhs - rhs,
        BinaryOperator::Multiply => lhs * rhs,
        BinaryOperator::Divide => {
            if rhs == 0.0 {
                return Err(ErrorKind::ExpectationFailed.extend("division by zero"));
            }
            lhs / rhs
        }
        BinaryOperator::MyIntegerDivide => {
            if rhs as i64 == 0 {
                return Err(ErrorKind::ExpectationFailed.extend("division by zero"));
            }
            (lhs as i64 / rhs as i64) as f64
        }
        BinaryOperator::Modulo => {
            if rhs == 0.0 {
                return Err(ErrorKind::ExpectationFailed.extend("division by zero"));
            }
            lhs % rhs
        }
        BinaryOperator::BitwiseAnd => (lhs as i64 & rhs as i64) as f64,
        BinaryOperator::BitwiseOr => (lhs as i64 | rhs as i64) as f64,
        BinaryOperator::BitwiseXor => (lhs as i64 ^ rhs as i64) as f64,
        BinaryOperator::PGBitwiseShiftLeft => ((lhs as i64) << rhs as i64) as f64,
        _ => (lhs as i64 >> rhs as i64) as f64,
    };
    Ok(Value::Number(result))
}

fn require_number(value: &Value, op: &BinaryOperator) -> Result<f64, QueryError> {
    value.as_f64().ok_or_else(|| {
        ErrorKind::InvalidCast.extend(format!(
            "{} expects numeric operands, found {}",
            op,
            value.type_name()
        ))
    })
}

fn eval_literal(literal: &ast::Value) -> Result<Value, QueryError> {
    match literal {
        ast::Value::Number(text, _) => {
            let number: f64 = text.parse().map_err(|_| {
                ErrorKind::InvalidCast.extend(format!("{} is not a valid number", text))
            })?;
            Ok(Value::Number(number))
        }
        ast::Value::SingleQuotedString(text) | ast::Value::DoubleQuotedString(text) => {
            Ok(Value::neutral_string(text.as_str()))
        }
        ast::Value::Boolean(value) => Ok(Value::Bool(*value)),
        ast::Value::Null => Ok(Value::Null),
        other => Err(ErrorKind::UnsupportedCase
            .extend(format!("literal {} is not supported", other))),
    }
}

fn eval_is_bool(
    query: &Query,
    current: &mut Map,
    target: &ast::Expr,
) -> Result<bool, QueryError> {
    let value = resolve_operand(query, current, target)?;
    if value.is_null() {
        return Err(ErrorKind::ExpectationFailed.extend("IS expects a non-null operand"));
    }
    value.as_bool().ok_or_else(|| {
        ErrorKind::InvalidType.extend(format!(
            "IS expects a boolean operand, found {}",
            value.type_name()
        ))
    })
}

fn eval_unary(
    query: &Query,
    current: &mut Map,
    op: &UnaryOperator,
    target: &ast::Expr,
) -> Result<Value, QueryError> {
    let value = resolve_operand(query, current, target)?;
    if value.is_null() {
        return Err(ErrorKind::ExpectationFailed
            .extend(format!("operand of unary {} is null", op)));
    }
    match op {
        UnaryOperator::PGBitwiseNot => {
            let number = value.as_f64().ok_or_else(|| {
                ErrorKind::InvalidCast.extend("~ expects a numeric operand")
            })?;
            Ok(Value::Number(!(number as i64) as f64))
        }
        UnaryOperator::Minus => {
            let number = value.as_f64().ok_or_else(|| {
                ErrorKind::InvalidCast.extend("unary - expects a numeric operand")
            })?;
            Ok(Value::Number(-number))
        }
        UnaryOperator::Not => {
            let flag = value.as_bool().ok_or_else(|| {
                ErrorKind::InvalidCast.extend("NOT expects a boolean operand")
            })?;
            Ok(Value::Bool(!flag))
        }
        other => Err(ErrorKind::UndefinedOperator
            .extend(format!("unary operator {} is not supported", other))),
    }
}

fn eval_substring(
    query: &Query,
    current: &mut Map,
    target: &ast::Expr,
    from: &Option<Box<ast::Expr>>,
    length: &Option<Box<ast::Expr>>,
) -> Result<Value, QueryError> {
    let value = resolve_operand(query, current, target)?;
    if value.is_null() {
        return Err(ErrorKind::ExpectationFailed.extend("SUBSTR target is null"));
    }
    let text = value.as_str().ok_or_else(|| {
        ErrorKind::InvalidCast.extend(format!(
            "SUBSTR expects text, found {}",
            value.type_name()
        ))
    })?;
    let start = match from {
        Some(from) => substring_position(query, current, from)?,
        None => 0,
    };
    let chars: Vec<char> = text.chars().collect();
    let end = match length {
        Some(length) => start + substring_position(query, current, length)?,
        None => chars.len(),
    };
    if start > end || end > chars.len() {
        return Err(ErrorKind::ExpectationFailed.extend(format!(
            "SUBSTR range {}..{} is out of bounds for a text of {} characters",
            start,
            end,
            chars.len()
        )));
    }
    Ok(Value::text(chars[start..end].iter().collect::<String>()))
}

fn substring_position(
    query: &Query,
    current: &mut Map,
    expression: &ast::Expr,
) -> Result<usize, QueryError> {
    let value = resolve_operand(query, current, expression)?;
    if value.is_null() {
        return Err(ErrorKind::ExpectationFailed.extend("SUBSTR position is null"));
    }
    let number = value.as_f64().ok_or_else(|| {
        ErrorKind::InvalidCast.extend(format!(
            "SUBSTR position expects a number, found {}",
            value.type_name()
        ))
    })?;
    if number < 0.0 {
        return Err(ErrorKind::ExpectationFailed
            .extend(format!("SUBSTR position {} is negative", number)));
    }
    Ok(number as usize)
}

// ── Subqueries ───────────────────────────────────────────────────────────────

/// Evaluate a subquery with the current row as its document, binding `<-`
/// for backward navigation.
pub(crate) fn eval_subquery(
    query: &Query,
    current: &mut Map,
    subquery: &ast::Query,
) -> Result<Value, QueryError> {
    let previous = current.insert("<-".to_string(), Value::object(query.data.clone()));
    let outcome = (|| {
        let mut sub = Query::prepare(current.clone(), subquery, Arc::clone(&query.options))?;
        let result = sub.exec_internal()?;
        query.import_work(&sub);
        Ok(result)
    })();
    match previous {
        Some(previous) => {
            current.insert("<-".to_string(), previous);
        }
        None => {
            current.shift_remove("<-");
        }
    }
    outcome
}

/// Evaluate an EXISTS predicate: the subquery sees the current row's entries
/// merged into every FROM row.
fn eval_exists(
    query: &Query,
    current: &mut Map,
    subquery: &ast::Query,
) -> Result<bool, QueryError> {
    let previous = current.insert("<-".to_string(), Value::object(query.data.clone()));
    let outcome = (|| {
        let mut sub = Query::prepare(current.clone(), subquery, Arc::clone(&query.options))?;
        for row in &mut sub.from {
            let row_type_name = row.type_name();
            let map = row.as_object_mut().ok_or_else(|| {
                ErrorKind::InvalidType.extend(format!(
                    "EXISTS expects object rows, found {}",
                    row_type_name
                ))
            })?;
            for (key, value) in current.iter() {
                map.insert(key.clone(), value.clone());
            }
        }
        let result = sub.exec_internal()?;
        query.import_work(&sub);
        let rows = result.as_array().ok_or_else(|| {
            ErrorKind::InvalidType.extend("EXISTS expects the subquery to produce an array")
        })?;
        Ok(!rows.is_empty())
    })();
    match previous {
        Some(previous) => {
            current.insert("<-".to_string(), previous);
        }
        None => {
            current.shift_remove("<-");
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryOptions;
    use sqlparser::ast::SetExpr;
    use sqlparser::dialect::MySqlDialect;
    use sqlparser::parser::Parser;

    fn fixture() -> (Query, Map) {
        let data = crate::value::Value::document_from_json(serde_json::json!({
            "t": [{"id": 1.0, "name": "a", "flag": true}]
        }))
        .unwrap();
        let query = Query::new(data, "SELECT * FROM t", QueryOptions::new()).unwrap();
        let row = query.from[0].as_object().unwrap().clone();
        (query, row)
    }

    fn parse_expr(sql: &str) -> ast::Expr {
        let query = format!("SELECT {} FROM t", sql);
        let statements = Parser::parse_sql(&MySqlDialect {}, &query).unwrap();
        match statements.into_iter().next().unwrap() {
            ast::Statement::Query(q) => match *q.body {
                SetExpr::Select(select) => match select.projection.into_iter().next() {
                    Some(ast::SelectItem::UnnamedExpr(expression)) => expression,
                    Some(ast::SelectItem::ExprWithAlias { expr: expression, .. }) => expression,
                    _ => panic!("expected an expression"),
                },
                _ => panic!("expected a select"),
            },
            _ => panic!("expected a query"),
        }
    }

    fn eval(sql: &str) -> Result<Value, QueryError> {
        let (query, mut row) = fixture();
        let expression = parse_expr(sql);
        let value = eval_expr(&query, &mut row, &expression)?;
        value_of(&query, &row, value)
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("1").unwrap(), Value::from(1i64));
        assert_eq!(eval("1.5").unwrap(), Value::from(1.5));
        assert_eq!(eval("'x'").unwrap(), Value::from("x"));
        assert_eq!(eval("NULL").unwrap(), Value::Null);
        assert_eq!(eval("true").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_column_resolution() {
        assert_eq!(eval("id").unwrap(), Value::from(1i64));
        assert_eq!(eval("missing").unwrap(), Value::Null);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::from(7i64));
        assert_eq!(eval("7 DIV 2").unwrap(), Value::from(3i64));
        assert_eq!(eval("7 % 4").unwrap(), Value::from(3i64));
        assert_eq!(eval("6 & 3").unwrap(), Value::from(2i64));
        assert_eq!(eval("6 | 3").unwrap(), Value::from(7i64));
        assert_eq!(eval("6 ^ 3").unwrap(), Value::from(5i64));
        assert_eq!(eval("1 << 3").unwrap(), Value::from(8i64));
        assert_eq!(eval("8 >> 2").unwrap(), Value::from(2i64));
    }

    #[test]
    fn test_division_by_zero() {
        let error = eval("1 / 0").unwrap_err();
        assert_eq!(error.kind, ErrorKind::ExpectationFailed);
        assert!(eval("1 DIV 0").is_err());
        assert!(eval("1 % 0").is_err());
    }

    #[test]
    fn test_null_short_circuits_arithmetic() {
        assert_eq!(eval("NULL + 1").unwrap(), Value::Null);
        assert_eq!(eval("1 * NULL").unwrap(), Value::Null);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("1 < 2").unwrap(), Value::Bool(true));
        assert_eq!(eval("2 <= 2").unwrap(), Value::Bool(true));
        assert_eq!(eval("id = 1").unwrap(), Value::Bool(true));
        assert_eq!(eval("name != 'a'").unwrap(), Value::Bool(false));
        // Numeric coercion through text.
        assert_eq!(eval("10 > '9'").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_logical_operators() {
        assert_eq!(eval("flag AND true").unwrap(), Value::Bool(true));
        assert_eq!(eval("false OR flag").unwrap(), Value::Bool(true));
        assert!(eval("missing AND true").is_err());
        assert!(eval("1 AND true").is_err());
    }

    #[test]
    fn test_in_operator() {
        assert_eq!(eval("id IN (1, 2, 3)").unwrap(), Value::Bool(true));
        assert_eq!(eval("id NOT IN (2, 3)").unwrap(), Value::Bool(true));
        assert_eq!(eval("'b' IN ('a', 'c')").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_between_is_textual() {
        assert_eq!(eval("'b' BETWEEN 'a' AND 'c'").unwrap(), Value::Bool(true));
        assert_eq!(eval("'a' NOT BETWEEN 'b' AND 'c'").unwrap(), Value::Bool(true));
        // Textual ordering hazard: "10" sorts below "2".
        assert_eq!(eval("10 BETWEEN 2 AND 20").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_like() {
        assert_eq!(eval("name LIKE '_'").unwrap(), Value::Bool(true));
        assert_eq!(eval("name NOT LIKE 'b%'").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_is_variants() {
        assert_eq!(eval("missing IS NULL").unwrap(), Value::Bool(true));
        assert_eq!(eval("id IS NOT NULL").unwrap(), Value::Bool(true));
        assert_eq!(eval("flag IS TRUE").unwrap(), Value::Bool(true));
        assert_eq!(eval("flag IS NOT TRUE").unwrap(), Value::Bool(false));
        assert!(eval("id IS TRUE").is_err());
        assert!(eval("missing IS TRUE").is_err());
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(eval("-id").unwrap(), Value::from(-1i64));
        assert_eq!(eval("NOT flag").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_case_expression() {
        assert_eq!(
            eval("CASE WHEN id = 1 THEN 'one' ELSE 'other' END").unwrap(),
            Value::from("one")
        );
        assert_eq!(
            eval("CASE WHEN id = 2 THEN 'two' END").unwrap(),
            Value::Null
        );
        assert!(eval("CASE WHEN id THEN 'x' END").is_err());
    }

    #[test]
    fn test_value_tuple() {
        assert_eq!(
            eval("(id, name)").unwrap(),
            Value::array(vec![Value::from(1i64), Value::from("a")])
        );
    }

    #[test]
    fn test_substring() {
        assert_eq!(eval("SUBSTRING('hello', 1, 3)").unwrap(), Value::from("ell"));
        assert!(eval("SUBSTRING('hi', 1, 5)").is_err());
    }

    #[test]
    fn test_column_path() {
        assert_eq!(column_path(&parse_expr("a")).unwrap(), "a");
        assert_eq!(column_path(&parse_expr("a.b")).unwrap(), "a.b");
        assert!(column_path(&parse_expr("1")).is_err());
    }
}
