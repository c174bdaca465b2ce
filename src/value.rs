// Value: the tagged-union document value
// Containers are Arc-wrapped for O(1) clone with copy-on-write mutation;
// the Thunk/Deferred cells are shared so scheduled tasks can fill them.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{ErrorKind, QueryError};

/// An insertion-ordered object map. Key order is preserved so GROUP BY and
/// projection iterate reproducibly.
pub type Map = IndexMap<String, Value>;

/// The runtime value currency of the engine.
///
/// Beyond the plain JSON shapes, a handful of engine-internal variants are
/// first-class: `Thunk` (lazily-materialized CTE), `Deferred` (cell filled by
/// a scheduled task), `Omit` (projection drops the holding key), `Fuse`
/// (keys merge into the enclosing projection), `NeutralString` (a SQL string
/// literal, exempt from column lookup) and `ColumnName` (a path reference
/// resolved on demand by the selector).
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<Map>),

    Thunk(Arc<Thunk>),
    Deferred(Arc<Deferred>),
    Omit,
    Fuse(Arc<Map>),
    NeutralString(Arc<str>),
    ColumnName(Arc<str>),
}

// ── Lazy cells ───────────────────────────────────────────────────────────────

type ThunkProducer = Box<dyn FnOnce() -> Result<Value, QueryError> + Send>;

enum ThunkState {
    Pending(ThunkProducer),
    Ready(Value),
}

/// A zero-argument producer evaluated at most once; the first `force` caches
/// the produced value in place.
pub struct Thunk {
    state: Mutex<ThunkState>,
}

impl Thunk {
    pub fn new(producer: impl FnOnce() -> Result<Value, QueryError> + Send + 'static) -> Self {
        Thunk {
            state: Mutex::new(ThunkState::Pending(Box::new(producer))),
        }
    }

    /// Run the producer (once) and return the cached value thereafter.
    pub fn force(&self) -> Result<Value, QueryError> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, ThunkState::Ready(Value::Null)) {
            ThunkState::Ready(value) => {
                *state = ThunkState::Ready(value.clone());
                Ok(value)
            }
            ThunkState::Pending(producer) => {
                let value = producer()?;
                *state = ThunkState::Ready(value.clone());
                Ok(value)
            }
        }
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thunk")
    }
}

/// A cell resolved exactly once by a scheduled task; readers see `None`
/// until the writer publishes.
pub struct Deferred {
    cell: RwLock<Option<Value>>,
}

impl Deferred {
    pub fn new() -> Self {
        Deferred {
            cell: RwLock::new(None),
        }
    }

    pub fn resolve(&self, value: Value) {
        *self.cell.write() = Some(value);
    }

    pub fn get(&self) -> Option<Value> {
        self.cell.read().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.read().is_some()
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deferred(resolved: {})", self.is_resolved())
    }
}

// ── Type checks ──────────────────────────────────────────────────────────────

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    #[inline]
    pub fn is_thunk(&self) -> bool {
        matches!(self, Value::Thunk(_))
    }

    #[inline]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Value::Deferred(_))
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

impl Value {
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::NeutralString(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Mutable access to the inner Vec, cloning if shared (Arc::make_mut).
    #[inline]
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(arr) => Some(Arc::make_mut(arr)),
            _ => None,
        }
    }

    /// Mutable access to the inner map, cloning if shared (Arc::make_mut).
    #[inline]
    pub fn as_object_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Object(map) => Some(Arc::make_mut(map)),
            _ => None,
        }
    }

    /// Index into an object by key.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Index into an array by position.
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Array(arr) => arr.get(index),
            _ => None,
        }
    }

    /// The stable textual form used for identity digests, concatenation and
    /// the comparator's textual fallback.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Coerce to an array for FROM-set construction: arrays pass through,
    /// objects wrap as a single row.
    pub fn into_rows(self) -> Result<Vec<Value>, QueryError> {
        match self {
            Value::Array(arr) => Ok(match Arc::try_unwrap(arr) {
                Ok(vec) => vec,
                Err(shared) => shared.as_ref().clone(),
            }),
            Value::Object(_) => Ok(vec![self]),
            other => Err(ErrorKind::InvalidType
                .extend(format!("cannot treat {} as a row set", other.type_name()))),
        }
    }

    /// Human-readable name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Thunk(_) => "thunk",
            Value::Deferred(_) => "deferred",
            Value::Omit => "omit",
            Value::Fuse(_) => "fuse",
            Value::NeutralString(_) => "string literal",
            Value::ColumnName(_) => "column name",
        }
    }
}

// ── Constructors ─────────────────────────────────────────────────────────────

impl Value {
    #[inline]
    pub fn text(s: impl Into<Arc<str>>) -> Self {
        Value::Text(s.into())
    }

    #[inline]
    pub fn array(v: Vec<Value>) -> Self {
        Value::Array(Arc::new(v))
    }

    #[inline]
    pub fn object(m: Map) -> Self {
        Value::Object(Arc::new(m))
    }

    #[inline]
    pub fn neutral_string(s: impl Into<Arc<str>>) -> Self {
        Value::NeutralString(s.into())
    }

    #[inline]
    pub fn column_name(s: impl Into<Arc<str>>) -> Self {
        Value::ColumnName(s.into())
    }

    #[inline]
    pub fn thunk(producer: impl FnOnce() -> Result<Value, QueryError> + Send + 'static) -> Self {
        Value::Thunk(Arc::new(Thunk::new(producer)))
    }
}

// ── From impls ───────────────────────────────────────────────────────────────

impl From<bool> for Value {
    #[inline]
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    #[inline]
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    #[inline]
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(s: &str) -> Self {
        Value::Text(s.into())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(s: String) -> Self {
        Value::Text(s.into())
    }
}

impl From<Vec<Value>> for Value {
    #[inline]
    fn from(v: Vec<Value>) -> Self {
        Value::Array(Arc::new(v))
    }
}

impl From<Map> for Value {
    #[inline]
    fn from(m: Map) -> Self {
        Value::Object(Arc::new(m))
    }
}

// ── PartialEq ────────────────────────────────────────────────────────────────

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Omit, Value::Omit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                if a.is_nan() && b.is_nan() {
                    return false;
                }
                a == b
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Fuse(a), Value::Fuse(b)) => a == b,
            (Value::NeutralString(a), Value::NeutralString(b)) => a == b,
            (Value::ColumnName(a), Value::ColumnName(b)) => a == b,
            (Value::Thunk(a), Value::Thunk(b)) => Arc::ptr_eq(a, b),
            (Value::Deferred(a), Value::Deferred(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ── Display ──────────────────────────────────────────────────────────────────

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => format_number(*n, f),
            Value::Text(s) | Value::NeutralString(s) => write!(f, "{}", s),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Object(map) | Value::Fuse(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Thunk(_) => write!(f, "<thunk>"),
            Value::Deferred(_) => write!(f, "<deferred>"),
            Value::Omit => write!(f, "<omit>"),
            Value::ColumnName(name) => write!(f, "<column {}>", name),
        }
    }
}

fn format_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{}", n)
    }
}

// ── Serialization ────────────────────────────────────────────────────────────

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null | Value::Omit | Value::Thunk(_) | Value::Deferred(_) => {
                serializer.serialize_none()
            }
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                if n.is_nan() || n.is_infinite() {
                    serializer.serialize_none()
                } else if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::Text(s) | Value::NeutralString(s) | Value::ColumnName(s) => {
                serializer.serialize_str(s)
            }
            Value::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for v in arr.iter() {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Object(map) | Value::Fuse(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
        }
    }
}

// ── JSON interop ─────────────────────────────────────────────────────────────

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::Text(s.into()),
            serde_json::Value::Array(arr) => {
                Value::Array(Arc::new(arr.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => {
                let m: Map = map.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
                Value::Object(Arc::new(m))
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null | Value::Omit | Value::Thunk(_) | Value::Deferred(_) => {
                serde_json::Value::Null
            }
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.is_nan() || n.is_infinite() {
                    serde_json::Value::Null
                } else if n.fract() == 0.0 && n.abs() < 1e15 {
                    serde_json::json!(*n as i64)
                } else {
                    serde_json::json!(*n)
                }
            }
            Value::Text(s) | Value::NeutralString(s) | Value::ColumnName(s) => {
                serde_json::Value::String(s.to_string())
            }
            Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(serde_json::Value::from).collect())
            }
            Value::Object(map) | Value::Fuse(map) => {
                let m: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect();
                serde_json::Value::Object(m)
            }
        }
    }
}

impl Value {
    /// Parse a JSON string into a `Value`.
    pub fn from_json_str(s: &str) -> Result<Value, QueryError> {
        let parsed: serde_json::Value = serde_json::from_str(s)
            .map_err(|e| ErrorKind::InvalidCast.extend(format!("invalid json: {}", e)))?;
        Ok(Value::from(parsed))
    }

    /// Serialize to a JSON string.
    pub fn to_json_string(&self) -> Result<String, QueryError> {
        serde_json::to_string(self)
            .map_err(|e| ErrorKind::InvalidCast.extend(format!("json serialization: {}", e)))
    }

    /// Build a document map from a JSON object.
    pub fn document_from_json(v: serde_json::Value) -> Result<Map, QueryError> {
        match Value::from(v) {
            Value::Object(map) => Ok(match Arc::try_unwrap(map) {
                Ok(map) => map,
                Err(shared) => shared.as_ref().clone(),
            }),
            other => Err(ErrorKind::InvalidType
                .extend(format!("expected an object document, found {}", other.type_name()))),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
