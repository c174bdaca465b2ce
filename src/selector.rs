// Path selector sub-language
// Scans and parses selector strings (keys, dimension groups, pipe groups,
// `::` pipelining, `topfn=>` prefixes) and evaluates them over values.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::error::{ErrorKind, QueryError};
use crate::value::{Map, Value};

/// One element of a `[...]` dimension group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSelector {
    /// A concrete, non-negative element index.
    At(usize),
    /// The `each` keyword: iterate the dimension.
    Each,
    /// A half-open range `(a:b)`; `None` bounds come from `begin`/`end`.
    Range(Option<usize>, Option<usize>),
}

/// Target type of a pipe item (`key|type`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeType {
    /// Pass the value through unchanged.
    None,
    /// Render the value as text.
    Text,
    /// Parse a text value as a 64-bit float.
    Number,
    /// Anything else; rejected at evaluation time.
    Unknown(String),
}

/// One `key|type` item of a `{...}` pipe group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeSelector {
    pub key: String,
    pub ty: PipeType,
}

/// A single parsed step of a selector segment.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Key lookup (`ident`, `'quoted'`, `*`, or the backward step `<-`).
    Key(String),
    /// A `[...]` dimension group; `keep` preserves dimensionality.
    Dimensions {
        selectors: Vec<IndexSelector>,
        keep: bool,
    },
    /// A `{...}` pipe group reshaping an object.
    Pipe(Vec<PipeSelector>),
}

/// A `::` pipeline segment: optional top-level function plus steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub top_fn: Option<String>,
    pub steps: Vec<Step>,
}

// ── Top-level function registry ──────────────────────────────────────────────

/// A function applied to the result of a selector segment via `name=>`.
pub type TopLevelFn = Arc<dyn Fn(&Value) -> Result<Value, QueryError> + Send + Sync>;

static TOP_LEVEL_FUNCTIONS: Lazy<RwLock<HashMap<String, TopLevelFn>>> = Lazy::new(|| {
    let mut map: HashMap<String, TopLevelFn> = HashMap::new();
    map.insert("mix".to_string(), Arc::new(mix));
    map.insert("distinct".to_string(), Arc::new(distinct));
    RwLock::new(map)
});

/// Register a top-level function usable through the selector's `name=>` form.
/// The registry is process-wide.
pub fn register_top_level_function(
    name: impl Into<String>,
    function: impl Fn(&Value) -> Result<Value, QueryError> + Send + Sync + 'static,
) {
    TOP_LEVEL_FUNCTIONS
        .write()
        .insert(name.into(), Arc::new(function));
}

fn top_level_function(name: &str) -> Option<TopLevelFn> {
    TOP_LEVEL_FUNCTIONS.read().get(name).cloned()
}

// ── Scanner ──────────────────────────────────────────────────────────────────

struct Scanner {
    input: Vec<char>,
    position: usize,
}

impl Scanner {
    fn new(input: &str) -> Self {
        Scanner {
            input: input.chars().collect(),
            position: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        if self.position < self.input.len() {
            self.position += 1;
        }
    }

    fn read_word(&mut self) -> String {
        let start = self.position;
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        self.input[start..self.position].iter().collect()
    }

    fn read_quoted(&mut self) -> Result<String, QueryError> {
        self.advance(); // opening quote
        let start = self.position;
        while let Some(ch) = self.current() {
            if ch == '\'' {
                let key: String = self.input[start..self.position].iter().collect();
                self.advance();
                return Ok(key);
            }
            self.advance();
        }
        Err(ErrorKind::ExpectationFailed.extend("unterminated quoted key in selector"))
    }

    fn read_group(&mut self, close: char) -> Result<String, QueryError> {
        self.advance(); // opening bracket
        let start = self.position;
        while let Some(ch) = self.current() {
            if ch == close {
                let body: String = self.input[start..self.position].iter().collect();
                self.advance();
                return Ok(body);
            }
            self.advance();
        }
        Err(ErrorKind::ExpectationFailed
            .extend(format!("unterminated group in selector, expected {}", close)))
    }
}

// ── Parser ───────────────────────────────────────────────────────────────────

fn read_index(text: &str) -> Result<usize, QueryError> {
    let index: i64 = text.trim().parse().map_err(|_| {
        ErrorKind::ExpectationFailed.extend(format!("failed to read index {}", text))
    })?;
    if index < 0 {
        return Err(ErrorKind::ExpectationFailed
            .extend(format!("failed to read index. invalid index {}", index)));
    }
    Ok(index as usize)
}

fn read_range(body: &str) -> Result<IndexSelector, QueryError> {
    let parts: Vec<&str> = body.split(':').collect();
    if parts.len() != 2 {
        return Err(ErrorKind::ExpectationFailed
            .extend(format!("failed to read range. invalid range ({})", body)));
    }
    let start = match parts[0].trim() {
        "begin" => None,
        text => Some(read_index(text)?),
    };
    let end = match parts[1].trim() {
        "end" => None,
        text => Some(read_index(text)?),
    };
    Ok(IndexSelector::Range(start, end))
}

/// Parse the body of a `[...]` group into dimension selectors.
pub fn parse_dimensions(body: &str) -> Result<(Vec<IndexSelector>, bool), QueryError> {
    let mut body = body.trim();
    let keep = body.starts_with("keep=>");
    if keep {
        body = &body["keep=>".len()..];
    }
    let mut selectors = Vec::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '(' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j] != ')' {
                j += 1;
            }
            if j == chars.len() {
                return Err(ErrorKind::ExpectationFailed
                    .extend(format!("failed to read range. invalid range {}", body)));
            }
            let inner: String = chars[start..j].iter().collect();
            selectors.push(read_range(&inner)?);
            i = j + 1;
        } else if ch.is_alphanumeric() || ch == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if word == "each" {
                selectors.push(IndexSelector::Each);
            } else {
                selectors.push(IndexSelector::At(read_index(&word)?));
            }
        } else {
            i += 1;
        }
    }
    Ok((selectors, keep))
}

/// Parse the body of a `{...}` group into pipe selectors.
pub fn parse_pipe(body: &str) -> Result<Vec<PipeSelector>, QueryError> {
    let mut selectors = Vec::new();
    for item in body.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let parts: Vec<&str> = item.split('|').collect();
        if parts.len() > 2 {
            return Err(ErrorKind::ExpectationFailed
                .extend(format!("failed to parse pipe. invalid pipe {}", item)));
        }
        let key = parts[0].trim().trim_matches('\'').to_string();
        let ty = match parts.get(1).map(|t| t.trim()) {
            None | Some("") => PipeType::None,
            Some("string") => PipeType::Text,
            Some("number") => PipeType::Number,
            Some(other) => PipeType::Unknown(other.to_string()),
        };
        selectors.push(PipeSelector { key, ty });
    }
    Ok(selectors)
}

/// Parse one `::` segment: an optional `topfn=>` prefix followed by steps.
pub fn parse_segment(segment: &str) -> Result<Segment, QueryError> {
    let (top_fn, rest) = match segment.find("=>") {
        Some(pos)
            if pos > 0
                && segment[..pos]
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_') =>
        {
            (Some(segment[..pos].to_string()), &segment[pos + 2..])
        }
        _ => (None, segment),
    };

    let mut steps = Vec::new();
    let mut scanner = Scanner::new(rest);
    while let Some(ch) = scanner.current() {
        match ch {
            '\'' => steps.push(Step::Key(scanner.read_quoted()?)),
            '<' if scanner.peek() == Some('-') => {
                scanner.advance();
                scanner.advance();
                steps.push(Step::Key("<-".to_string()));
            }
            '*' => {
                scanner.advance();
                steps.push(Step::Key("*".to_string()));
            }
            '[' => {
                let body = scanner.read_group(']')?;
                let (selectors, keep) = parse_dimensions(&body)?;
                steps.push(Step::Dimensions { selectors, keep });
            }
            '{' => {
                let body = scanner.read_group('}')?;
                steps.push(Step::Pipe(parse_pipe(&body)?));
            }
            c if c.is_alphanumeric() || c == '_' => {
                steps.push(Step::Key(scanner.read_word()));
            }
            _ => scanner.advance(),
        }
    }
    Ok(Segment { top_fn, steps })
}

// ── Evaluation ───────────────────────────────────────────────────────────────

/// Evaluate a full selector (with `::` pipelining) against a value.
pub fn evaluate(data: &Value, selector: &str) -> Result<Value, QueryError> {
    let mut result = data.clone();
    for part in selector.split("::") {
        let segment = parse_segment(part)?;
        result = read(&result, &segment.steps)?;
        if let Some(name) = segment.top_fn {
            let function = top_level_function(&name).ok_or_else(|| {
                ErrorKind::InvalidFunction
                    .extend(format!("failed to execute function. {} is not a function", name))
            })?;
            result = function(&result)?;
        }
    }
    Ok(result)
}

/// Apply parsed steps to a value.
pub fn read(data: &Value, steps: &[Step]) -> Result<Value, QueryError> {
    let Some(step) = steps.first() else {
        return Ok(data.clone());
    };
    if data.is_null() {
        return Ok(Value::Null);
    }
    match step {
        Step::Key(key) => match data {
            Value::Object(map) => {
                let value = map.get(key.as_str()).cloned().unwrap_or(Value::Null);
                read(&value, &steps[1..])
            }
            Value::Array(arr) => {
                let mut out = Vec::with_capacity(arr.len());
                for item in arr.iter() {
                    out.push(read(item, steps)?);
                }
                Ok(Value::array(out))
            }
            Value::Thunk(thunk) => read(&thunk.force()?, steps),
            other => Err(ErrorKind::ExpectationFailed.extend(format!(
                "failed to execute read operation. key selectors are not valid on {}",
                other.type_name()
            ))),
        },
        Step::Dimensions { selectors, keep } => match data {
            Value::Array(_) => {
                let selected = if *keep {
                    select_dimension(data, selectors)?
                } else {
                    select_many(data, selectors)?
                };
                read(&selected, &steps[1..])
            }
            Value::Thunk(thunk) => read(&thunk.force()?, steps),
            other => Err(ErrorKind::ExpectationFailed.extend(format!(
                "failed to execute read operation. index selectors are not valid on {}",
                other.type_name()
            ))),
        },
        Step::Pipe(items) => match data {
            Value::Object(map) => {
                let reshaped = apply_pipe(map, items)?;
                read(&Value::object(reshaped), &steps[1..])
            }
            Value::Array(arr) => {
                let mut out = Vec::with_capacity(arr.len());
                for item in arr.iter() {
                    out.push(read(item, steps)?);
                }
                Ok(Value::array(out))
            }
            Value::Thunk(thunk) => read(&thunk.force()?, steps),
            other => Err(ErrorKind::ExpectationFailed.extend(format!(
                "failed to execute read operation. pipe selectors are not valid on {}",
                other.type_name()
            ))),
        },
    }
}

fn apply_pipe(map: &Map, items: &[PipeSelector]) -> Result<Map, QueryError> {
    let mut reshaped = Map::new();
    for item in items {
        let value = map.get(item.key.as_str()).cloned().unwrap_or(Value::Null);
        let value = match value {
            Value::Thunk(thunk) => thunk.force()?,
            other => other,
        };
        match &item.ty {
            PipeType::None => {
                reshaped.insert(item.key.clone(), value);
            }
            PipeType::Text => {
                let text = match value {
                    Value::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                        format!("{}", n as i64)
                    }
                    other => other.to_text(),
                };
                reshaped.insert(item.key.clone(), Value::text(text));
            }
            PipeType::Number => {
                let text = value.as_str().ok_or_else(|| {
                    ErrorKind::InvalidType.extend(format!(
                        "failed to execute pipe operation. {} is of {} type",
                        item.key,
                        value.type_name()
                    ))
                })?;
                let number: f64 = text.parse().map_err(|_| {
                    ErrorKind::InvalidCast
                        .extend(format!("failed to parse {} as a number", text))
                })?;
                reshaped.insert(item.key.clone(), Value::Number(number));
            }
            PipeType::Unknown(_) => {
                return Err(ErrorKind::UnsupportedCase.into());
            }
        }
    }
    Ok(reshaped)
}

/// Select through dimension selectors, preserving dimensionality.
pub fn select_dimension(data: &Value, selectors: &[IndexSelector]) -> Result<Value, QueryError> {
    let Some(selector) = selectors.first() else {
        return Ok(data.clone());
    };
    let arr = data.as_array().ok_or_else(|| {
        ErrorKind::ExpectationFailed.extend(format!(
            "failed to select dimension on {}",
            data.type_name()
        ))
    })?;
    match selector {
        IndexSelector::At(index) => {
            let item = arr.get(*index).ok_or_else(|| {
                ErrorKind::ExpectationFailed
                    .extend(format!("index {} is out of range", index))
            })?;
            select_dimension(item, &selectors[1..])
        }
        IndexSelector::Each => {
            let mut out = Vec::with_capacity(arr.len());
            for item in arr.iter() {
                out.push(select_dimension(item, &selectors[1..])?);
            }
            Ok(Value::array(out))
        }
        IndexSelector::Range(start, end) => {
            let start = start.unwrap_or(0);
            let end = end.unwrap_or(arr.len());
            if start > end || end > arr.len() {
                return Err(ErrorKind::ExpectationFailed
                    .extend(format!("range ({}:{}) is out of bounds", start, end)));
            }
            let slice = Value::array(arr[start..end].to_vec());
            select_dimension(&slice, &selectors[1..])
        }
    }
}

/// Select through dimension selectors with the default unwind policy:
/// the result flattens by `len(selectors) - 1`.
pub fn select_many(data: &Value, selectors: &[IndexSelector]) -> Result<Value, QueryError> {
    let selected = select_dimension(data, selectors)?;
    if selectors.is_empty() {
        return Ok(selected);
    }
    if let Value::Array(arr) = &selected {
        return Ok(Value::array(unwind(arr, selectors.len() - 1)));
    }
    Ok(selected)
}

/// Flatten nested arrays by `depth` dimensions.
pub fn unwind(data: &[Value], depth: usize) -> Vec<Value> {
    if depth == 0 {
        return data.to_vec();
    }
    let mut out = Vec::new();
    for item in data {
        match item.as_array() {
            Some(inner) => out.extend(unwind(inner, depth - 1)),
            None => out.push(item.clone()),
        }
    }
    out
}

// ── Built-in top-level functions ─────────────────────────────────────────────

/// `mix`: fully flatten an array, or fuse an object's nested objects by
/// joining keys with `_`.
pub fn mix(data: &Value) -> Result<Value, QueryError> {
    match data {
        Value::Array(arr) => Ok(Value::array(mix_array(arr))),
        Value::Object(map) => Ok(Value::object(mix_object(map))),
        _ => Err(ErrorKind::UnsupportedCase.into()),
    }
}

fn mix_array(data: &[Value]) -> Vec<Value> {
    let mut out = Vec::new();
    for item in data {
        match item.as_array() {
            Some(inner) => out.extend(mix_array(inner)),
            None => out.push(item.clone()),
        }
    }
    out
}

fn mix_object(data: &Map) -> Map {
    let mut out = Map::new();
    for (key, item) in data {
        match item.as_object() {
            Some(inner) => {
                for (inner_key, inner_value) in mix_object(inner) {
                    out.insert(format!("{}_{}", key, inner_key), inner_value);
                }
            }
            None => {
                out.insert(key.clone(), item.clone());
            }
        }
    }
    out
}

/// `distinct`: deduplicate an array using the textual form as identity.
pub fn distinct(data: &Value) -> Result<Value, QueryError> {
    let arr = data
        .as_array()
        .ok_or_else(|| QueryError::new(ErrorKind::UnsupportedCase))?;
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in arr.iter() {
        let digest = Sha256::digest(item.to_text().as_bytes());
        if seen.insert(BASE64_STANDARD.encode(digest)) {
            out.push(item.clone());
        }
    }
    Ok(Value::array(out))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> Value {
        Value::from_json_str(json).unwrap()
    }

    #[test]
    fn test_parse_dimensions_indices() {
        let (selectors, keep) = parse_dimensions("1,2,3").unwrap();
        assert!(!keep);
        assert_eq!(
            selectors,
            vec![
                IndexSelector::At(1),
                IndexSelector::At(2),
                IndexSelector::At(3)
            ]
        );
    }

    #[test]
    fn test_parse_dimensions_range() {
        let (selectors, _) = parse_dimensions("(0:10)").unwrap();
        assert_eq!(selectors, vec![IndexSelector::Range(Some(0), Some(10))]);

        let (selectors, _) = parse_dimensions("(begin:end)").unwrap();
        assert_eq!(selectors, vec![IndexSelector::Range(None, None)]);
    }

    #[test]
    fn test_parse_dimensions_each_and_keep() {
        let (selectors, keep) = parse_dimensions("keep=>each,0").unwrap();
        assert!(keep);
        assert_eq!(selectors, vec![IndexSelector::Each, IndexSelector::At(0)]);
    }

    #[test]
    fn test_parse_dimensions_rejects_bad_input() {
        assert!(parse_dimensions("(15)").is_err());
        assert!(read_index("-1").is_err());
        assert!(read_index("abc").is_err());
    }

    #[test]
    fn test_parse_pipe_items() {
        let items = parse_pipe("key1|string,key2|number,key3").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].ty, PipeType::Text);
        assert_eq!(items[1].ty, PipeType::Number);
        assert_eq!(items[2].ty, PipeType::None);

        let items = parse_pipe("'dotted.key'|string").unwrap();
        assert_eq!(items[0].key, "dotted.key");
    }

    #[test]
    fn test_parse_segment_tokens() {
        let segment = parse_segment("root.data[each]{id|number}").unwrap();
        assert!(segment.top_fn.is_none());
        assert_eq!(segment.steps.len(), 4);
        assert_eq!(segment.steps[0], Step::Key("root".to_string()));
        assert_eq!(segment.steps[1], Step::Key("data".to_string()));

        let segment = parse_segment("mix=>a.b").unwrap();
        assert_eq!(segment.top_fn.as_deref(), Some("mix"));

        let segment = parse_segment("<-root.meta").unwrap();
        assert_eq!(segment.steps[0], Step::Key("<-".to_string()));
    }

    #[test]
    fn test_keep_prefix_is_not_a_top_fn() {
        let segment = parse_segment("data[keep=>each,0]").unwrap();
        assert!(segment.top_fn.is_none());
        assert!(matches!(
            segment.steps[1],
            Step::Dimensions { keep: true, .. }
        ));
    }

    #[test]
    fn test_key_selection() {
        let data = doc(r#"{"name": "John", "age": 30}"#);
        assert_eq!(evaluate(&data, "name").unwrap(), Value::from("John"));
        assert_eq!(evaluate(&data, "missing").unwrap(), Value::Null);
        assert_eq!(evaluate(&data, "").unwrap(), data);
    }

    #[test]
    fn test_key_selection_maps_arrays() {
        let data = doc(r#"[{"id": 1}, {"id": 2}]"#);
        assert_eq!(
            evaluate(&data, "id").unwrap(),
            Value::array(vec![Value::from(1i64), Value::from(2i64)])
        );
    }

    #[test]
    fn test_chained_segments() {
        let data = doc(r#"{"user": {"details": {"name": "John"}}}"#);
        assert_eq!(
            evaluate(&data, "user::details::name").unwrap(),
            Value::from("John")
        );
    }

    #[test]
    fn test_quoted_key_with_dots() {
        let data = doc(r#"{"a.b": 1}"#);
        assert_eq!(evaluate(&data, "'a.b'").unwrap(), Value::from(1i64));
    }

    #[test]
    fn test_index_selection() {
        let data = doc("[1, 2, 3]");
        assert_eq!(evaluate(&data, "[1]").unwrap(), Value::from(2i64));
    }

    #[test]
    fn test_range_selection() {
        let data = doc("[1, 2, 3, 4, 5]");
        assert_eq!(
            evaluate(&data, "[(1:3)]").unwrap(),
            doc("[2, 3]")
        );
        assert_eq!(evaluate(&data, "[(begin:end)]").unwrap(), data);
    }

    #[test]
    fn test_each_descends_dimensions() {
        let data = doc("[[1, 2], [3, 4]]");
        let selected = select_dimension(
            &data,
            &[IndexSelector::Each, IndexSelector::At(0)],
        )
        .unwrap();
        assert_eq!(selected, doc("[1, 3]"));
    }

    #[test]
    fn test_unwind_policy() {
        // Two dimensions without keep flatten by one.
        let data = doc("[[1, 2], [3, 4]]");
        assert_eq!(evaluate(&data, "[each,(begin:end)]").unwrap(), doc("[1, 2, 3, 4]"));
        // keep preserves the nested shape.
        assert_eq!(
            evaluate(&data, "[keep=>each,(begin:end)]").unwrap(),
            doc("[[1, 2], [3, 4]]")
        );
    }

    #[test]
    fn test_unwind_depths() {
        let data = doc("[1, [2, 3], 4]");
        assert_eq!(unwind(data.as_array().unwrap(), 0), data.as_array().unwrap().clone());
        assert_eq!(
            Value::array(unwind(data.as_array().unwrap(), 1)),
            doc("[1, 2, 3, 4]")
        );
        let deep = doc("[1, [2, [3, 4]], 5]");
        assert_eq!(
            Value::array(unwind(deep.as_array().unwrap(), 2)),
            doc("[1, 2, 3, 4, 5]")
        );
    }

    #[test]
    fn test_pipe_reshaping() {
        let data = doc(r#"{"num": "42", "name": "x", "extra": true}"#);
        let reshaped = evaluate(&data, "{num|number, name}").unwrap();
        let map = reshaped.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("num"), Some(&Value::from(42i64)));
        assert_eq!(map.get("name"), Some(&Value::from("x")));
    }

    #[test]
    fn test_pipe_string_conversion() {
        let data = doc(r#"{"n": 3.0, "m": 2.5}"#);
        let reshaped = evaluate(&data, "{n|string, m|string}").unwrap();
        assert_eq!(reshaped.get("n"), Some(&Value::from("3")));
        assert_eq!(reshaped.get("m"), Some(&Value::from("2.5")));
    }

    #[test]
    fn test_pipe_errors() {
        let data = doc(r#"{"n": true}"#);
        let err = evaluate(&data, "{n|number}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidType);
        let err = evaluate(&data, "{n|bogus}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedCase);
    }

    #[test]
    fn test_pipe_over_array() {
        let data = doc(r#"[{"a": 1, "b": 2}, {"a": 3, "b": 4}]"#);
        assert_eq!(
            evaluate(&data, "{a}").unwrap(),
            doc(r#"[{"a": 1}, {"a": 3}]"#)
        );
    }

    #[test]
    fn test_key_selector_rejects_scalars() {
        let err = evaluate(&Value::from(5i64), "key").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExpectationFailed);
    }

    #[test]
    fn test_mix_array_and_object() {
        let data = doc("[1, [2, 3], [[4, 5], 6], 7]");
        assert_eq!(mix(&data).unwrap(), doc("[1, 2, 3, 4, 5, 6, 7]"));

        let data = doc(r#"{"a": {"b": 1, "c": 2}, "d": 3}"#);
        let mixed = mix(&data).unwrap();
        assert_eq!(mixed.get("a_b"), Some(&Value::from(1i64)));
        assert_eq!(mixed.get("a_c"), Some(&Value::from(2i64)));
        assert_eq!(mixed.get("d"), Some(&Value::from(3i64)));

        assert!(mix(&Value::from("invalid")).is_err());
    }

    #[test]
    fn test_distinct_identity() {
        let data = doc("[1, 2, 2, 3, 4, 4, 5]");
        assert_eq!(distinct(&data).unwrap(), doc("[1, 2, 3, 4, 5]"));
        assert!(distinct(&Value::from("not an array")).is_err());
    }

    #[test]
    fn test_distinct_through_top_fn() {
        let data = doc(r#"{"items": [1, 1, 2]}"#);
        assert_eq!(evaluate(&data, "distinct=>items[each]").unwrap(), doc("[1, 2]"));
    }

    #[test]
    fn test_unknown_top_fn() {
        let err = evaluate(&doc("[1]"), "nonexistent=>[each]").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFunction);
    }

    #[test]
    fn test_thunk_is_forced() {
        let thunk = Value::thunk(|| Ok(Value::from_json_str(r#"{"x": 9}"#).unwrap()));
        assert_eq!(evaluate(&thunk, "x").unwrap(), Value::from(9i64));
    }
}
