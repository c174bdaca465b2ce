// Function registry, execution strategies and the built-in library

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE as BASE64_URL;
use base64::Engine as _;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use md5::Md5;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use sqlparser::ast::{self, FunctionArg, FunctionArgExpr};

use crate::error::{ErrorKind, QueryError};
use crate::expr::{self, is_aggregate_call};
use crate::query::{Query, QueryEnv};
use crate::value::{Deferred, Map, Value};

/// Options passed through to every function invocation. Currently empty;
/// reserved for per-call settings.
#[derive(Default)]
pub struct FunctionOptions {}

/// A registered function: sees the query environment, the current row, call
/// options and the evaluated arguments.
pub type NativeFunction = Arc<
    dyn Fn(&QueryEnv, &Map, &FunctionOptions, &[Value]) -> Result<Value, QueryError>
        + Send
        + Sync,
>;

/// An argument-only function, the simplest registration form.
pub type ExternalFunction = Box<dyn Fn(&[Value]) -> Result<Value, QueryError> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct FunctionEntry {
    pub(crate) function: NativeFunction,
    pub(crate) immediate: bool,
}

static FUNCTIONS: Lazy<RwLock<HashMap<String, FunctionEntry>>> =
    Lazy::new(|| RwLock::new(builtin_registry()));

/// Register a function under a case-insensitive name. The registry is
/// process-wide.
pub fn register_function(
    name: impl Into<String>,
    function: impl Fn(&QueryEnv, &Map, &FunctionOptions, &[Value]) -> Result<Value, QueryError>
        + Send
        + Sync
        + 'static,
) {
    FUNCTIONS.write().insert(
        name.into().to_lowercase(),
        FunctionEntry {
            function: Arc::new(function),
            immediate: false,
        },
    );
}

/// Register a function that must run inline: `ASYNC`, `SPIN` and `SPINASYNC`
/// qualifiers reject it.
pub fn register_immediate_function(
    name: impl Into<String>,
    function: impl Fn(&QueryEnv, &Map, &FunctionOptions, &[Value]) -> Result<Value, QueryError>
        + Send
        + Sync
        + 'static,
) {
    FUNCTIONS.write().insert(
        name.into().to_lowercase(),
        FunctionEntry {
            function: Arc::new(function),
            immediate: true,
        },
    );
}

/// Register an argument-only function.
pub fn register_external_function(
    name: impl Into<String>,
    function: impl Fn(&[Value]) -> Result<Value, QueryError> + Send + Sync + 'static,
) {
    register_function(name, move |_env, _current, _options, args| function(args));
}

/// Register a batch of argument-only functions.
pub fn import_functions(entries: impl IntoIterator<Item = (String, ExternalFunction)>) {
    for (name, function) in entries {
        register_function(name, move |_env, _current, _options, args| function(args));
    }
}

pub(crate) fn lookup(name: &str) -> Option<FunctionEntry> {
    FUNCTIONS.read().get(&name.to_lowercase()).cloned()
}

// ── Call-site dispatch ───────────────────────────────────────────────────────

/// Evaluate a function call, honoring its execution qualifier.
pub(crate) fn dispatch(
    query: &Query,
    current: &mut Map,
    function: &ast::Function,
) -> Result<Value, QueryError> {
    let parts = &function.name.0;
    let name = parts
        .last()
        .map(|ident| ident.value.to_lowercase())
        .unwrap_or_default();
    let qualifier = parts[..parts.len().saturating_sub(1)]
        .iter()
        .map(|ident| ident.value.to_lowercase())
        .collect::<Vec<_>>()
        .join(".");
    let arg_exprs = argument_expressions(&function.args)?;

    if qualifier.is_empty() && name == "await" {
        return queue_await(query, current, arg_exprs);
    }
    if qualifier.is_empty() && is_aggregate_call(function) {
        return eval_aggregate(query, current, &name, &arg_exprs);
    }

    let entry = lookup(&name).ok_or_else(|| {
        ErrorKind::InvalidFunction.extend(format!("function {} cannot be found", name))
    })?;

    match qualifier.as_str() {
        "async" => {
            reject_immediate(&entry, &name, "run asynchronously")?;
            let args = read_args(query, current, &arg_exprs)?;
            let cell = Arc::new(Deferred::new());
            let env = query.env();
            let row = current.clone();
            let task_cell = Arc::clone(&cell);
            let callee = Arc::clone(&entry.function);
            query.track(std::thread::spawn(move || {
                let value = callee(&env, &row, &FunctionOptions::default(), &args)?;
                task_cell.resolve(value);
                Ok(())
            }));
            Ok(Value::Deferred(cell))
        }
        "spin" => {
            reject_immediate(&entry, &name, "be spun")?;
            let args = read_args(query, current, &arg_exprs)?;
            let env = query.env();
            let row = current.clone();
            let callee = Arc::clone(&entry.function);
            std::thread::spawn(move || {
                if let Err(error) = callee(&env, &row, &FunctionOptions::default(), &args) {
                    env.report_error(&error);
                }
            });
            Ok(Value::Omit)
        }
        "spinasync" => {
            reject_immediate(&entry, &name, "be spun asynchronously")?;
            let args = read_args(query, current, &arg_exprs)?;
            let env = query.env();
            let row = current.clone();
            let callee = Arc::clone(&entry.function);
            query.track(std::thread::spawn(move || {
                if let Err(error) = callee(&env, &row, &FunctionOptions::default(), &args) {
                    env.report_error(&error);
                }
                Ok(())
            }));
            Ok(Value::Omit)
        }
        "once" => {
            let memo_key = format!("{}.{}", qualifier, name);
            if let Some(cached) = query.memo.lock().get(&memo_key).cloned() {
                return Ok(cached);
            }
            let args = read_args(query, current, &arg_exprs)?;
            let result =
                (entry.function)(&query.env(), current, &FunctionOptions::default(), &args)?;
            query.memo.lock().insert(memo_key, result.clone());
            Ok(result)
        }
        "global" => {
            let memo_key = format!("{}.{}", qualifier, name);
            if let Some(cached) = query.memo.lock().get(&memo_key).cloned() {
                return Ok(cached);
            }
            // Arguments resolve against the whole FROM-set.
            let mut whole = Map::new();
            whole.insert("*".to_string(), Value::array(query.from.clone()));
            let args = read_aggregate_args(query, &mut whole, &arg_exprs)?;
            let result =
                (entry.function)(&query.env(), current, &FunctionOptions::default(), &args)?;
            query.memo.lock().insert(memo_key, result.clone());
            Ok(result)
        }
        _ => {
            // SCOPED and unqualified calls evaluate inline against the row.
            let args = read_args(query, current, &arg_exprs)?;
            (entry.function)(&query.env(), current, &FunctionOptions::default(), &args)
        }
    }
}

fn reject_immediate(
    entry: &FunctionEntry,
    name: &str,
    action: &str,
) -> Result<(), QueryError> {
    if entry.immediate {
        return Err(ErrorKind::ExpectationFailed.extend(format!(
            "{} is an immediate function and it cannot {}",
            name, action
        )));
    }
    Ok(())
}

/// `AWAIT(expr)` defers its argument entirely: a post-processor evaluates it
/// after scheduled work drains and fills the returned cell.
fn queue_await(
    query: &Query,
    current: &mut Map,
    arg_exprs: Vec<ast::Expr>,
) -> Result<Value, QueryError> {
    let cell = Arc::new(Deferred::new());
    let row = current.clone();
    let post_cell = Arc::clone(&cell);
    query.add_post(Box::new(move |running: &Query| {
        let mut row = row;
        let mut values = Vec::with_capacity(arg_exprs.len());
        for arg in &arg_exprs {
            values.push(expr::resolve_operand(running, &mut row, arg)?);
        }
        post_cell.resolve(values.into_iter().next().unwrap_or(Value::Null));
        Ok(())
    }));
    Ok(Value::Deferred(cell))
}

fn eval_aggregate(
    query: &Query,
    current: &mut Map,
    name: &str,
    arg_exprs: &[ast::Expr],
) -> Result<Value, QueryError> {
    let entry = lookup(name).ok_or_else(|| {
        ErrorKind::InvalidFunction.extend(format!("function {} cannot be found", name))
    })?;
    if !query.group_keys.is_empty() {
        let args = read_aggregate_args(query, current, arg_exprs)?;
        return (entry.function)(&query.env(), current, &FunctionOptions::default(), &args);
    }
    if let Some(cached) = query.memo.lock().get(name).cloned() {
        return Ok(cached);
    }
    let mut whole = Map::new();
    whole.insert("*".to_string(), Value::array(query.from.clone()));
    let args = read_aggregate_args(query, &mut whole, arg_exprs)?;
    let result = (entry.function)(&query.env(), current, &FunctionOptions::default(), &args)?;
    query.memo.lock().insert(name.to_string(), result.clone());
    Ok(result)
}

fn argument_expressions(args: &[FunctionArg]) -> Result<Vec<ast::Expr>, QueryError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(expression)) => {
                out.push(expression.clone())
            }
            FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => {
                // COUNT(*)-style wildcards read the group's row set.
                out.push(ast::Expr::Identifier(ast::Ident::new("*")))
            }
            other => {
                return Err(ErrorKind::ExpectationFailed
                    .extend(format!("unsupported function argument {}", other)))
            }
        }
    }
    Ok(out)
}

fn read_args(
    query: &Query,
    current: &mut Map,
    arg_exprs: &[ast::Expr],
) -> Result<Vec<Value>, QueryError> {
    let mut out = Vec::with_capacity(arg_exprs.len());
    for arg in arg_exprs {
        out.push(expr::resolve_operand(query, current, arg)?);
    }
    Ok(out)
}

/// Aggregate argument resolution: column references read across the group's
/// `"*"` rows (or the row itself when no group is present), yielding the
/// column's value array.
fn read_aggregate_args(
    query: &Query,
    current: &mut Map,
    arg_exprs: &[ast::Expr],
) -> Result<Vec<Value>, QueryError> {
    let mut out = Vec::with_capacity(arg_exprs.len());
    for arg in arg_exprs {
        let value = expr::eval_expr(query, current, arg)?;
        match value {
            Value::ColumnName(path) => {
                let data = match current.get("*") {
                    Some(rows @ Value::Array(_)) => rows.clone(),
                    _ => Value::object(current.clone()),
                };
                out.push(crate::selector::evaluate(&data, &path)?);
            }
            other => out.push(expr::value_of(query, current, other)?),
        }
    }
    Ok(out)
}

// ── Argument helpers ─────────────────────────────────────────────────────────

fn guard(expected: usize, args: &[Value]) -> Result<(), QueryError> {
    if args.len() < expected {
        return Err(ErrorKind::ExpectationFailed.extend("too few arguments"));
    }
    if args.len() > expected {
        return Err(ErrorKind::ExpectationFailed.extend("too many arguments"));
    }
    Ok(())
}

fn require_array(value: &Value) -> Result<&Vec<Value>, QueryError> {
    value.as_array().ok_or_else(|| {
        ErrorKind::InvalidCast.extend(format!("expected an array, found {}", value.type_name()))
    })
}

fn require_text(value: &Value) -> Result<String, QueryError> {
    value.as_str().map(str::to_string).ok_or_else(|| {
        ErrorKind::InvalidCast.extend(format!("expected text, found {}", value.type_name()))
    })
}

fn require_bool(value: &Value) -> Result<bool, QueryError> {
    value.as_bool().ok_or_else(|| {
        ErrorKind::InvalidCast.extend(format!("expected a boolean, found {}", value.type_name()))
    })
}

fn require_f64(value: &Value) -> Result<f64, QueryError> {
    value.as_f64().ok_or_else(|| {
        ErrorKind::InvalidCast.extend(format!("expected a number, found {}", value.type_name()))
    })
}

/// Coerce any value to a float through its textual form.
fn to_f64(value: &Value) -> Result<f64, QueryError> {
    let text = value.to_text();
    text.parse().map_err(|_| {
        ErrorKind::InvalidCast.extend(format!("cannot convert {} to a number", text))
    })
}

fn json_bytes(value: &Value) -> Result<Vec<u8>, QueryError> {
    serde_json::to_vec(value)
        .map_err(|e| ErrorKind::InvalidCast.extend(format!("serialization failed: {}", e)))
}

fn value_from_json_bytes(bytes: &[u8]) -> Result<Value, QueryError> {
    let parsed: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| ErrorKind::InvalidCast.extend(format!("invalid payload: {}", e)))?;
    Ok(Value::from(parsed))
}

// ── Built-in library ─────────────────────────────────────────────────────────

fn builtin_registry() -> HashMap<String, FunctionEntry> {
    let mut map = HashMap::new();
    {
        let mut immediate = |name: &str, function: NativeFunction| {
            map.insert(
                name.to_string(),
                FunctionEntry {
                    function,
                    immediate: true,
                },
            );
        };
        immediate("sum", Arc::new(sum_fn));
        immediate("avg", Arc::new(avg_fn));
        immediate("min", Arc::new(min_fn));
        immediate("max", Arc::new(max_fn));
        immediate("count", Arc::new(count_fn));
        immediate("fuse", Arc::new(fuse_fn));
        immediate("daterange", Arc::new(date_range_fn));
        immediate("dateadd", Arc::new(date_add_fn));
        immediate("constant", Arc::new(constant_fn));
        immediate("getvar", Arc::new(get_var_fn));
        immediate("setvar", Arc::new(set_var_fn));
        immediate("raise", Arc::new(raise_fn));
        immediate("raise_when", Arc::new(raise_when_fn));
        immediate("timestamp", Arc::new(timestamp_fn));
    }
    {
        let mut plain = |name: &str, function: NativeFunction| {
            map.insert(
                name.to_string(),
                FunctionEntry {
                    function,
                    immediate: false,
                },
            );
        };
        plain("concat", Arc::new(concat_fn));
        plain("first", Arc::new(first_fn));
        plain("last", Arc::new(last_fn));
        plain("elementat", Arc::new(element_at_fn));
        plain("defaultkey", Arc::new(default_key_fn));
        plain("changetype", Arc::new(change_type_fn));
        plain("unwind", Arc::new(unwind_fn));
        plain("if", Arc::new(if_fn));
        plain("hash", Arc::new(hash_fn));
        plain("encode", Arc::new(encode_fn));
        plain("decode", Arc::new(decode_fn));
        plain("encrypt", Arc::new(encrypt_fn));
        plain("decrypt", Arc::new(decrypt_fn));
        plain("array", Arc::new(array_fn));
        // Target of the idiomatic `[..]` rewrite; ARRAY( is reserved by the
        // SQL parser for array subqueries.
        plain("make_array", Arc::new(array_fn));
        plain("substr", Arc::new(substr_fn));
    }
    map
}

/// Fold the non-null numeric elements of an aggregate argument.
fn numeric_fold(
    args: &[Value],
    mut fold: impl FnMut(Option<f64>, f64) -> f64,
) -> Result<Option<f64>, QueryError> {
    guard(1, args)?;
    let items = require_array(&args[0])?;
    let mut state: Option<f64> = None;
    for item in items {
        if item.is_null() {
            continue;
        }
        let number = to_f64(item)?;
        state = Some(fold(state, number));
    }
    Ok(state)
}

fn sum_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    let total = numeric_fold(args, |state, n| state.unwrap_or(0.0) + n)?;
    Ok(total.map(Value::Number).unwrap_or(Value::Null))
}

fn avg_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(1, args)?;
    let items = require_array(&args[0])?;
    let mut total = 0.0;
    let mut counted = 0usize;
    for item in items {
        if item.is_null() {
            continue;
        }
        total += to_f64(item)?;
        counted += 1;
    }
    if counted == 0 {
        return Ok(Value::Null);
    }
    Ok(Value::Number(total / counted as f64))
}

fn min_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    let smallest = numeric_fold(args, |state, n| match state {
        Some(current) if current <= n => current,
        _ => n,
    })?;
    Ok(smallest.map(Value::Number).unwrap_or(Value::Null))
}

fn max_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    let largest = numeric_fold(args, |state, n| match state {
        Some(current) if current >= n => current,
        _ => n,
    })?;
    Ok(largest.map(Value::Number).unwrap_or(Value::Null))
}

fn count_fn(
    env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    if args.is_empty() {
        return Ok(Value::from(env.from_set().len()));
    }
    let items = require_array(&args[0])?;
    Ok(Value::from(items.len()))
}

fn concat_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    let mut out = String::new();
    for arg in args {
        out.push_str(&arg.to_text());
    }
    Ok(Value::text(out))
}

fn first_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(1, args)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let items = require_array(&args[0])?;
    Ok(items.first().cloned().unwrap_or(Value::Null))
}

fn last_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(1, args)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let items = require_array(&args[0])?;
    Ok(items.last().cloned().unwrap_or(Value::Null))
}

fn element_at_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(2, args)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let items = require_array(&args[0])?;
    let index = require_f64(&args[1])? as usize;
    items.get(index).cloned().ok_or_else(|| {
        ErrorKind::ExpectationFailed.extend(format!("index {} is out of range", index))
    })
}

fn default_key_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(1, args)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let map = args[0].as_object().ok_or_else(|| {
        ErrorKind::InvalidCast
            .extend(format!("expected an object, found {}", args[0].type_name()))
    })?;
    if map.len() > 1 {
        return Err(ErrorKind::ExpectationFailed.extend("multiple keys are found"));
    }
    map.values()
        .next()
        .cloned()
        .ok_or_else(|| ErrorKind::ExpectationFailed.extend("no key was found"))
}

fn change_type_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(2, args)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let target = require_text(&args[1])?;
    match target.to_lowercase().as_str() {
        "array" => Ok(Value::array(vec![args[0].clone()])),
        "string" => Ok(Value::text(args[0].to_text())),
        "double" => Ok(Value::Number(to_f64(&args[0])?)),
        "integer" => Ok(Value::Number(to_f64(&args[0])?.trunc())),
        other => Err(ErrorKind::UnsupportedCase
            .extend(format!("{} is not a valid conversion type", other))),
    }
}

fn unwind_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(1, args)?;
    if args[0].is_null() {
        return Ok(Value::Null);
    }
    let items = require_array(&args[0])?;
    Ok(Value::array(crate::selector::unwind(items, 1)))
}

fn if_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(3, args)?;
    let condition = require_bool(&args[0])?;
    Ok(if condition {
        args[1].clone()
    } else {
        args[2].clone()
    })
}

fn fuse_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(1, args)?;
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Object(map) => Ok(Value::Fuse(Arc::clone(map))),
        other => Err(ErrorKind::ExpectationFailed
            .extend(format!("fuse cannot be used with {}", other.type_name()))),
    }
}

fn date_range_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(2, args)?;
    let from = if args[0].is_null() {
        String::new()
    } else {
        args[0].to_text()
    };
    let to = if args[1].is_null() {
        String::new()
    } else {
        args[1].to_text()
    };
    Ok(Value::array(vec![Value::text(from), Value::text(to)]))
}

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

fn date_add_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(3, args)?;
    let text = require_text(&args[0])?;
    let date = DateTime::parse_from_str(&text, DATE_FORMAT)
        .map_err(|e| ErrorKind::InvalidCast.extend(format!("invalid date {}: {}", text, e)))?;
    let segment = require_text(&args[1])?;
    let amount = require_f64(&args[2])? as i64;
    let shifted = match segment.to_lowercase().as_str() {
        "day" => date.checked_add_signed(Duration::days(amount)),
        "month" => shift_months(date, amount),
        "year" => shift_months(date, amount * 12),
        other => {
            return Err(ErrorKind::UnsupportedCase
                .extend(format!("{} is not a date segment", other)))
        }
    };
    let shifted = shifted.ok_or_else(|| {
        ErrorKind::ExpectationFailed.extend(format!("date arithmetic overflow on {}", text))
    })?;
    Ok(Value::text(shifted.format(DATE_FORMAT).to_string()))
}

/// Shift by whole months with civil normalization: a day past the end of
/// the target month rolls into the following month (Jan 31 + 1 month lands
/// on Mar 3), it is not clamped to the month's last day.
fn shift_months(
    date: DateTime<chrono::FixedOffset>,
    amount: i64,
) -> Option<DateTime<chrono::FixedOffset>> {
    let months = date.year() as i64 * 12 + date.month0() as i64 + amount;
    let year = i32::try_from(months.div_euclid(12)).ok()?;
    let month = months.rem_euclid(12) as u32 + 1;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let shifted = first
        .checked_add_signed(Duration::days(date.day() as i64 - 1))?
        .and_time(date.time());
    shifted.and_local_timezone(*date.offset()).single()
}

fn constant_fn(
    env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(1, args)?;
    let key = args[0].to_text();
    env.constant(&key).ok_or_else(|| {
        ErrorKind::ExpectationFailed.extend(format!("no constant by the name {} was found", key))
    })
}

fn get_var_fn(
    env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(1, args)?;
    Ok(env.get_var(&args[0].to_text()).unwrap_or(Value::Null))
}

fn set_var_fn(
    env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(2, args)?;
    env.set_var(args[0].to_text(), args[1].clone());
    Ok(Value::Omit)
}

fn raise_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(1, args)?;
    Err(ErrorKind::ExpectationFailed.extend(args[0].to_text()))
}

fn raise_when_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(2, args)?;
    if require_bool(&args[0])? {
        return Err(ErrorKind::ExpectationFailed.extend(args[1].to_text()));
    }
    Ok(Value::Omit)
}

fn timestamp_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(0, args)?;
    // Saturates for dates past 2262.
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    Ok(Value::Number(nanos as f64))
}

fn hash_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(2, args)?;
    let payload = json_bytes(&args[0])?;
    let algorithm = require_text(&args[1])?;
    let digest = match algorithm.to_lowercase().as_str() {
        "sha1" => hex::encode(Sha1::digest(&payload)),
        "sha256" => hex::encode(Sha256::digest(&payload)),
        "sha512" => hex::encode(Sha512::digest(&payload)),
        "md5" => hex::encode(Md5::digest(&payload)),
        other => {
            return Err(
                ErrorKind::UnsupportedCase.extend(format!("{} is not supported", other))
            )
        }
    };
    Ok(Value::text(digest))
}

fn encode_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(2, args)?;
    let payload = json_bytes(&args[0])?;
    let base = require_text(&args[1])?;
    let encoded = match base.to_lowercase().as_str() {
        "base64" => BASE64_URL.encode(&payload),
        "base32" => base32::encode(base32::Alphabet::Rfc4648 { padding: true }, &payload),
        "hex" => hex::encode(&payload),
        other => {
            return Err(
                ErrorKind::UnsupportedCase.extend(format!("{} is not supported", other))
            )
        }
    };
    Ok(Value::text(encoded))
}

fn decode_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(2, args)?;
    let text = require_text(&args[0])?;
    let base = require_text(&args[1])?;
    let bytes = match base.to_lowercase().as_str() {
        "base64" => BASE64_URL
            .decode(text.as_bytes())
            .map_err(|e| ErrorKind::InvalidCast.extend(format!("invalid base64: {}", e)))?,
        "base32" => base32::decode(base32::Alphabet::Rfc4648 { padding: true }, &text)
            .ok_or_else(|| ErrorKind::InvalidCast.extend("invalid base32"))?,
        "hex" => hex::decode(&text)
            .map_err(|e| ErrorKind::InvalidCast.extend(format!("invalid hex: {}", e)))?,
        other => {
            return Err(
                ErrorKind::UnsupportedCase.extend(format!("{} is not supported", other))
            )
        }
    };
    value_from_json_bytes(&bytes)
}

fn encrypt_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    use aes_gcm::aead::{Aead, KeyInit};
    use aes_gcm::{Aes256Gcm, Nonce};
    use rand::RngCore;

    guard(2, args)?;
    let payload = json_bytes(&args[0])?;
    let key = require_text(&args[1])?;
    let key_hash = Sha256::digest(key.as_bytes());
    let cipher = Aes256Gcm::new_from_slice(&key_hash)
        .map_err(|_| ErrorKind::ExpectationFailed.extend("key derivation failed"))?;
    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), payload.as_slice())
        .map_err(|_| ErrorKind::ExpectationFailed.extend("encryption failed"))?;
    let mut envelope = nonce.to_vec();
    envelope.extend(sealed);
    Ok(Value::text(BASE64_URL.encode(envelope)))
}

fn decrypt_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    use aes_gcm::aead::{Aead, KeyInit};
    use aes_gcm::{Aes256Gcm, Nonce};

    guard(2, args)?;
    let secret = require_text(&args[0])?;
    let key = require_text(&args[1])?;
    let envelope = BASE64_URL
        .decode(secret.as_bytes())
        .map_err(|e| ErrorKind::InvalidCast.extend(format!("invalid envelope: {}", e)))?;
    if envelope.len() < 12 {
        return Err(ErrorKind::ExpectationFailed.extend("envelope is too short"));
    }
    let key_hash = Sha256::digest(key.as_bytes());
    let cipher = Aes256Gcm::new_from_slice(&key_hash)
        .map_err(|_| ErrorKind::ExpectationFailed.extend("key derivation failed"))?;
    let opened = cipher
        .decrypt(Nonce::from_slice(&envelope[..12]), &envelope[12..])
        .map_err(|_| ErrorKind::ExpectationFailed.extend("decryption failed"))?;
    value_from_json_bytes(&opened)
}

fn array_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    Ok(Value::array(args.to_vec()))
}

/// `substr(text, from, len)` for dialects that route SUBSTR through a plain
/// function call.
fn substr_fn(
    _env: &QueryEnv,
    _current: &Map,
    _options: &FunctionOptions,
    args: &[Value],
) -> Result<Value, QueryError> {
    guard(3, args)?;
    let text = require_text(&args[0])?;
    let from = require_f64(&args[1])?;
    let length = require_f64(&args[2])?;
    if from < 0.0 || length < 0.0 {
        return Err(ErrorKind::ExpectationFailed.extend("negative substr position"));
    }
    let chars: Vec<char> = text.chars().collect();
    let start = from as usize;
    let end = start + length as usize;
    if end > chars.len() {
        return Err(ErrorKind::ExpectationFailed.extend(format!(
            "substr range {}..{} is out of bounds for a text of {} characters",
            start,
            end,
            chars.len()
        )));
    }
    Ok(Value::text(chars[start..end].iter().collect::<String>()))
}
