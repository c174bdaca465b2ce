// genql - SQL queries over nested in-memory document trees
// Copyright (c) 2026 genql contributors
// Licensed under the MIT License

//! # genql
//!
//! An in-memory SQL engine for arbitrarily nested, heterogeneously-typed
//! document trees: the kind produced by JSON, Protobuf-derived maps, or
//! similar self-describing data. Queries are MySQL-flavored
//! `SELECT`/`UNION`/CTE statements whose identifiers carry a path-selector
//! sub-language for navigating arrays, dimensions, maps and per-key
//! reshaping, and whose function calls accept execution qualifiers
//! (`ASYNC.`, `SPIN.`, `SPINASYNC.`, `ONCE.`, `GLOBAL.`, `SCOPED.`) that
//! schedule ordinary functions around the query lifecycle.
//!
//! ## Architecture
//!
//! - `value` - the tagged-union document value and its lazy/deferred cells
//! - `error` - the closed error-kind taxonomy
//! - `selector` - the path sub-language (scanner, parser, evaluator)
//! - `compare` - cross-type comparison and LIKE translation
//! - `preprocess` - dialect rewrites on raw query text
//! - `query` - query state, SQL AST binding and the execution pipeline
//! - `expr` - the expression tree-walker
//! - `functions` - function registry, execution strategies, built-ins
//! - `join` - the partition join engine
//! - `sort` - ORDER BY with fallible key extraction
//!
//! ## Example
//!
//! ```
//! use genql::{Query, QueryOptions, Value};
//!
//! let document = Value::document_from_json(serde_json::json!({
//!     "data": [
//!         {"id": 1, "name": "A"},
//!         {"id": 2, "name": "B"},
//!     ]
//! })).unwrap();
//!
//! let mut query = Query::new(
//!     document,
//!     r#"SELECT id FROM "root.data""#,
//!     QueryOptions::new().wrapped(),
//! ).unwrap();
//!
//! let rows = query.exec().unwrap();
//! assert_eq!(rows.len(), 2);
//! assert_eq!(rows[0].get("id"), Some(&Value::from(1i64)));
//! ```

pub mod compare;
pub mod error;
pub mod preprocess;
pub mod selector;
pub mod value;

mod expr;
mod functions;
mod join;
mod query;
mod sort;

pub use error::{ErrorKind, QueryError};
pub use functions::{
    import_functions, register_external_function, register_function,
    register_immediate_function, ExternalFunction, FunctionOptions, NativeFunction,
};
pub use query::{Query, QueryEnv, QueryOptions};
pub use selector::register_top_level_function;
pub use value::{Deferred, Map, Thunk, Value};
