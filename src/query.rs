// Query construction and execution
// Binds a parsed SQL AST to an in-memory document and runs the
// WHERE → GROUP BY → SELECT → DISTINCT → ORDER BY → LIMIT pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use sqlparser::ast::{self, SetExpr, SetOperator, Statement, TableFactor};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use crate::error::{ErrorKind, QueryError};
use crate::expr::{self, column_path, literal_usize};
use crate::preprocess;
use crate::selector;
use crate::value::{Map, Value};
use crate::{join, sort};

/// A post-processor: runs after scheduled work drains, in FIFO order.
pub(crate) type PostFn = Box<dyn FnOnce(&Query) -> Result<(), QueryError> + Send>;

pub(crate) type TaskHandle = JoinHandle<Result<(), QueryError>>;

/// Per-query configuration shared with subqueries and scheduled tasks.
pub(crate) struct Options {
    pub(crate) wrapped: bool,
    pub(crate) postgres_escaping: bool,
    pub(crate) idiomatic_arrays: bool,
    pub(crate) completed: Option<Box<dyn Fn() + Send + Sync>>,
    pub(crate) errors: Option<Box<dyn Fn(&QueryError) + Send + Sync>>,
    pub(crate) constants: Map,
    pub(crate) vars: RwLock<Map>,
}

/// Builder for query configuration.
#[derive(Default)]
pub struct QueryOptions {
    wrapped: bool,
    postgres_escaping: bool,
    idiomatic_arrays: bool,
    completed: Option<Box<dyn Fn() + Send + Sync>>,
    errors: Option<Box<dyn Fn(&QueryError) + Send + Sync>>,
    constants: Map,
    vars: Map,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the input document as `{root: <document>}`.
    pub fn wrapped(mut self) -> Self {
        self.wrapped = true;
        self
    }

    /// Rewrite double-quoted strings to backtick identifiers before parsing.
    pub fn postgres_escaping(mut self) -> Self {
        self.postgres_escaping = true;
        self
    }

    /// Rewrite `[a, b, c]` literals to array-builder calls before parsing.
    pub fn idiomatic_arrays(mut self) -> Self {
        self.idiomatic_arrays = true;
        self
    }

    /// Read-only map exposed through the `constant` function.
    pub fn constants(mut self, constants: Map) -> Self {
        self.constants = constants;
        self
    }

    /// Mutable map exposed through `getvar`/`setvar`.
    pub fn vars(mut self, vars: Map) -> Self {
        self.vars = vars;
        self
    }

    /// Callback invoked once when the query finishes.
    pub fn on_completed(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.completed = Some(Box::new(callback));
        self
    }

    /// Callback receiving errors from `SPIN`/`SPINASYNC` tasks.
    pub fn on_error(mut self, callback: impl Fn(&QueryError) + Send + Sync + 'static) -> Self {
        self.errors = Some(Box::new(callback));
        self
    }

    fn into_options(self) -> Options {
        Options {
            wrapped: self.wrapped,
            postgres_escaping: self.postgres_escaping,
            idiomatic_arrays: self.idiomatic_arrays,
            completed: self.completed,
            errors: self.errors,
            constants: self.constants,
            vars: RwLock::new(self.vars),
        }
    }
}

/// The thread-safe slice of query state visible to registered functions and
/// scheduled tasks.
pub struct QueryEnv {
    pub(crate) options: Arc<Options>,
    pub(crate) from: Vec<Value>,
}

impl QueryEnv {
    /// The FROM-set snapshot this call evaluates against.
    pub fn from_set(&self) -> &[Value] {
        &self.from
    }

    /// Look up a configured constant.
    pub fn constant(&self, key: &str) -> Option<Value> {
        self.options.constants.get(key).cloned()
    }

    /// Read a variable under the read lock.
    pub fn get_var(&self, key: &str) -> Option<Value> {
        self.options.vars.read().get(key).cloned()
    }

    /// Write a variable under the write lock.
    pub fn set_var(&self, key: impl Into<String>, value: Value) {
        self.options.vars.write().insert(key.into(), value);
    }

    /// Route an error to the configured error sink, if any.
    pub fn report_error(&self, error: &QueryError) {
        if let Some(sink) = &self.options.errors {
            sink(error);
        }
    }
}

/// A prepared query bound to a document.
pub struct Query {
    pub(crate) data: Map,
    pub(crate) from: Vec<Value>,
    pub(crate) dual: bool,
    pub(crate) distinct: bool,
    pub(crate) select_items: Vec<ast::SelectItem>,
    pub(crate) where_expr: Option<ast::Expr>,
    pub(crate) group_keys: Vec<String>,
    pub(crate) having_expr: Option<ast::Expr>,
    pub(crate) order_by: Vec<(String, bool)>,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: Option<usize>,
    pub(crate) memo: Mutex<HashMap<String, Value>>,
    pub(crate) post: Mutex<Vec<PostFn>>,
    pub(crate) tasks: Mutex<Vec<TaskHandle>>,
    pub(crate) options: Arc<Options>,
}

impl Query {
    /// Parse and bind a query against a document.
    pub fn new(document: Map, query: &str, options: QueryOptions) -> Result<Query, QueryError> {
        let options = Arc::new(options.into_options());
        let data = if options.wrapped {
            let mut wrapper = Map::new();
            wrapper.insert("root".to_string(), Value::object(document));
            wrapper
        } else {
            document
        };
        let mut text = query.to_string();
        if options.postgres_escaping {
            text = preprocess::double_quotes_to_backticks(&text)?;
        }
        if options.idiomatic_arrays {
            text = preprocess::rewrite_idiomatic_arrays(&text)?;
        }
        let statement = parse(&text)?;
        Query::prepare(data, &statement, options)
    }

    /// Bind an already-parsed statement; used for subqueries and CTEs.
    pub(crate) fn prepare(
        data: Map,
        statement: &ast::Query,
        options: Arc<Options>,
    ) -> Result<Query, QueryError> {
        let mut query = Query::blank(data, options);
        query.build(statement)?;
        Ok(query)
    }

    fn blank(data: Map, options: Arc<Options>) -> Query {
        Query {
            data,
            from: Vec::new(),
            dual: false,
            distinct: false,
            select_items: Vec::new(),
            where_expr: None,
            group_keys: Vec::new(),
            having_expr: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            memo: Mutex::new(HashMap::new()),
            post: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            options,
        }
    }

    /// Run the query: execute, drain scheduled work, run post-processors,
    /// sweep deferred cells, fire the completion callback.
    pub fn exec(&mut self) -> Result<Vec<Value>, QueryError> {
        let result = self.exec_and_post_process()?;
        if let Some(callback) = &self.options.completed {
            callback();
        }
        match result {
            Value::Array(arr) => Ok(arr.as_ref().clone()),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    /// True when the query runs in dual (degenerate one-row) mode.
    pub fn is_dual(&self) -> bool {
        self.dual
    }

    // ── Building ─────────────────────────────────────────────────────────────

    fn build(&mut self, statement: &ast::Query) -> Result<(), QueryError> {
        if let Some(with) = &statement.with {
            self.build_cte(with)?;
        }
        match statement.body.as_ref() {
            SetExpr::Select(select) => self.build_select(select)?,
            SetExpr::Query(inner) => return self.build(inner),
            SetExpr::SetOperation {
                op: SetOperator::Union,
                left,
                right,
                ..
            } => self.build_union(left, right)?,
            other => {
                return Err(ErrorKind::UnsupportedCase
                    .extend(format!("statement body {} is not supported", other)))
            }
        }
        self.build_limit(statement)?;
        self.build_order(&statement.order_by)?;
        Ok(())
    }

    fn build_select(&mut self, select: &ast::Select) -> Result<(), QueryError> {
        if select.from.len() > 1 {
            return Err(ErrorKind::ExpectationFailed
                .extend("selection from multiple tables is not supported"));
        }
        match select.from.first() {
            Some(table) => self.build_from(table)?,
            None => {
                // No FROM clause: degenerate one-row evaluation.
                self.dual = true;
                self.from = vec![Value::object(self.data.clone())];
            }
        }
        match &select.group_by {
            ast::GroupByExpr::Expressions(exprs) => {
                for group_expr in exprs {
                    self.group_keys.push(column_path(group_expr)?);
                }
            }
            ast::GroupByExpr::All => {
                return Err(ErrorKind::UnsupportedCase.extend("GROUP BY ALL is not supported"))
            }
        }
        self.having_expr = select.having.clone();
        self.select_items = select.projection.clone();
        self.where_expr = select.selection.clone();
        self.distinct = select.distinct.is_some();
        Ok(())
    }

    fn build_union(&mut self, left: &SetExpr, right: &SetExpr) -> Result<(), QueryError> {
        let mut rows = self.exec_union_arm(left)?;
        rows.extend(self.exec_union_arm(right)?);
        self.from = rows;
        self.select_items = vec![ast::SelectItem::Wildcard(
            ast::WildcardAdditionalOptions::default(),
        )];
        Ok(())
    }

    fn exec_union_arm(&self, arm: &SetExpr) -> Result<Vec<Value>, QueryError> {
        let select = match arm {
            SetExpr::Select(select) => select,
            other => {
                return Err(ErrorKind::UnsupportedCase
                    .extend(format!("UNION arm {} is not supported", other)))
            }
        };
        let mut sub = Query::blank(self.data.clone(), Arc::clone(&self.options));
        sub.build_select(select)?;
        sub.exec_and_post_process()?.into_rows()
    }

    fn build_cte(&mut self, with: &ast::With) -> Result<(), QueryError> {
        for cte in &with.cte_tables {
            let name = cte.alias.name.value.clone();
            // The thunk captures the document as bound so far: a CTE can
            // reference earlier CTEs, not later ones.
            let snapshot = self.data.clone();
            let statement = cte.query.as_ref().clone();
            let options = Arc::clone(&self.options);
            self.data.insert(
                name,
                Value::thunk(move || {
                    let mut sub = Query::prepare(snapshot, &statement, options)?;
                    sub.exec_and_post_process()
                }),
            );
        }
        Ok(())
    }

    fn build_limit(&mut self, statement: &ast::Query) -> Result<(), QueryError> {
        if let Some(limit) = &statement.limit {
            self.limit = Some(literal_usize(limit)?);
        }
        if let Some(offset) = &statement.offset {
            self.offset = Some(literal_usize(&offset.value)?);
        }
        Ok(())
    }

    fn build_order(&mut self, order_by: &[ast::OrderByExpr]) -> Result<(), QueryError> {
        for order in order_by {
            let path = column_path(&order.expr)?;
            self.order_by.push((path, order.asc.unwrap_or(true)));
        }
        Ok(())
    }

    fn build_from(&mut self, table: &ast::TableWithJoins) -> Result<(), QueryError> {
        let mut rows = self.resolve_table_factor(&table.relation)?;
        for joined in &table.joins {
            let right = self.resolve_table_factor(&joined.relation)?;
            rows = join::execute(self, rows, right, &joined.join_operator)?;
        }
        self.from = rows;
        Ok(())
    }

    fn resolve_table_factor(&mut self, factor: &TableFactor) -> Result<Vec<Value>, QueryError> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let path = name
                    .0
                    .iter()
                    .map(|ident| ident.value.as_str())
                    .collect::<Vec<_>>()
                    .join(".");
                let document = Value::object(self.data.clone());
                let resolved = selector::evaluate(&document, &path)?;
                let resolved = match resolved {
                    Value::Thunk(thunk) => thunk.force()?,
                    other => other,
                };
                match resolved {
                    Value::Null => {
                        if path == "dual" {
                            self.dual = true;
                            return Ok(vec![Value::object(self.data.clone())]);
                        }
                        Ok(Vec::new())
                    }
                    other => {
                        let rows = other.into_rows()?;
                        Ok(apply_alias(rows, alias))
                    }
                }
            }
            TableFactor::Derived { subquery, alias, .. } => {
                let mut sub =
                    Query::prepare(self.data.clone(), subquery, Arc::clone(&self.options))?;
                let data = sub.exec_internal()?;
                self.import_work(&sub);
                let rows = data.into_rows()?;
                Ok(apply_alias(rows, alias))
            }
            other => Err(ErrorKind::UnsupportedCase
                .extend(format!("invalid from clause: {}", other))),
        }
    }

    // ── Execution ────────────────────────────────────────────────────────────

    pub(crate) fn exec_internal(&self) -> Result<Value, QueryError> {
        if self.dual {
            let rows = self.exec_select(&self.from)?;
            return Ok(rows.into_iter().next().unwrap_or(Value::Null));
        }
        let filtered = self.filter_rows(&self.from)?;
        let grouped = self.exec_group_by(filtered)?;
        let projected = self.exec_select(&grouped)?;
        let distinct = self.exec_distinct(projected)?;
        let ordered = self.exec_order_by(distinct)?;
        Ok(Value::array(self.apply_limit_offset(ordered)))
    }

    pub(crate) fn exec_and_post_process(&mut self) -> Result<Value, QueryError> {
        let result = self.exec_internal()?;
        loop {
            self.drain_tasks()?;
            let batch: Vec<PostFn> = self.post.lock().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            for processor in batch {
                processor(self)?;
            }
        }
        resolve_deferred(&result)
    }

    fn filter_rows(&self, rows: &[Value]) -> Result<Vec<Value>, QueryError> {
        let mut out = Vec::new();
        for row in rows {
            match row {
                Value::Array(inner) => {
                    // A nested row set runs the full pipeline and lands as
                    // one element, preserving nesting.
                    let sub = self.copy_with_from(inner.as_ref().clone());
                    let nested = sub.exec_internal()?;
                    self.import_work(&sub);
                    out.push(nested);
                }
                Value::Object(map) => {
                    let mut current = map.as_ref().clone();
                    if self.exec_where(&mut current)? {
                        out.push(Value::object(current));
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    fn exec_where(&self, current: &mut Map) -> Result<bool, QueryError> {
        let Some(condition) = &self.where_expr else {
            return Ok(true);
        };
        let result = expr::eval_expr(self, current, condition)?;
        result.as_bool().ok_or_else(|| {
            ErrorKind::InvalidType.extend(format!(
                "WHERE expects a boolean, found {}",
                result.type_name()
            ))
        })
    }

    fn exec_having(&self, current: &mut Map) -> Result<bool, QueryError> {
        let Some(condition) = &self.having_expr else {
            return Ok(true);
        };
        let result = expr::eval_expr(self, current, condition)?;
        result.as_bool().ok_or_else(|| {
            ErrorKind::InvalidType.extend(format!(
                "HAVING expects a boolean, found {}",
                result.type_name()
            ))
        })
    }

    fn exec_group_by(&self, rows: Vec<Value>) -> Result<Vec<Value>, QueryError> {
        if self.group_keys.is_empty() {
            return Ok(rows);
        }
        let mut groups: Vec<(Map, Vec<Value>)> = Vec::new();
        for row in rows {
            let mut key_map = Map::new();
            for key in &self.group_keys {
                key_map.insert(key.clone(), selector::evaluate(&row, key)?);
            }
            match groups.iter_mut().find(|(keys, _)| *keys == key_map) {
                Some((_, members)) => members.push(row),
                None => groups.push((key_map, vec![row])),
            }
        }
        let mut out = Vec::new();
        for (keys, members) in groups {
            let mut current = keys;
            current.insert("*".to_string(), Value::array(members));
            if self.exec_having(&mut current)? {
                out.push(Value::object(current));
            }
        }
        Ok(out)
    }

    fn is_select_all_aggregate(&self) -> bool {
        if self.select_items.is_empty() {
            return false;
        }
        self.select_items.iter().all(|item| {
            let item_expr = match item {
                ast::SelectItem::UnnamedExpr(item_expr) => item_expr,
                ast::SelectItem::ExprWithAlias { expr: item_expr, .. } => item_expr,
                _ => return false,
            };
            matches!(item_expr, ast::Expr::Function(function) if expr::is_aggregate_call(function))
        })
    }

    fn exec_select(&self, rows: &[Value]) -> Result<Vec<Value>, QueryError> {
        if self.group_keys.is_empty() && self.is_select_all_aggregate() {
            // All-aggregate projection collapses to a single row computed
            // over the entire FROM-set.
            let mut scratch = Map::new();
            let projected = self.project_row(&mut scratch)?;
            return Ok(vec![Value::object(projected)]);
        }
        let mut out = Vec::new();
        for row in rows {
            match row {
                Value::Array(inner) => {
                    out.push(Value::array(self.exec_select(inner)?));
                }
                Value::Object(map) => {
                    let mut current = map.as_ref().clone();
                    out.push(Value::object(self.project_row(&mut current)?));
                }
                other => {
                    return Err(ErrorKind::InvalidType
                        .extend(format!("cannot select from {}", other.type_name())))
                }
            }
        }
        Ok(out)
    }

    fn project_row(&self, current: &mut Map) -> Result<Map, QueryError> {
        let mut projected = Map::new();
        for item in &self.select_items {
            match item {
                ast::SelectItem::Wildcard(_) | ast::SelectItem::QualifiedWildcard(..) => {
                    for (key, value) in current.iter() {
                        if key == "<-" {
                            continue;
                        }
                        projected.insert(key.clone(), value.clone());
                    }
                }
                ast::SelectItem::UnnamedExpr(item_expr) => {
                    self.project_item(current, &mut projected, item_expr, None)?;
                }
                ast::SelectItem::ExprWithAlias {
                    expr: item_expr,
                    alias,
                } => {
                    self.project_item(current, &mut projected, item_expr, Some(&alias.value))?;
                }
            }
        }
        Ok(projected)
    }

    fn project_item(
        &self,
        current: &mut Map,
        projected: &mut Map,
        item_expr: &ast::Expr,
        alias: Option<&str>,
    ) -> Result<(), QueryError> {
        let value = expr::eval_expr(self, current, item_expr)?;
        if matches!(value, Value::Omit) {
            return Ok(());
        }
        match expr::value_of(self, current, value)? {
            Value::Fuse(map) => {
                for (key, fused) in map.iter() {
                    let name = match alias {
                        Some(prefix) => format!("{}.{}", prefix, key),
                        None => key.clone(),
                    };
                    projected.insert(name, fused.clone());
                }
            }
            resolved => {
                let name = match alias {
                    Some(alias) => alias.to_string(),
                    None => match item_expr {
                        ast::Expr::Identifier(_) | ast::Expr::CompoundIdentifier(_) => {
                            column_path(item_expr)?
                        }
                        other => other.to_string(),
                    },
                };
                projected.insert(name, resolved);
            }
        }
        Ok(())
    }

    fn exec_distinct(&self, rows: Vec<Value>) -> Result<Vec<Value>, QueryError> {
        if !self.distinct {
            return Ok(rows);
        }
        use sha2::{Digest, Sha256};
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for row in rows {
            let digest = hex::encode(Sha256::digest(row.to_text().as_bytes()));
            if seen.insert(digest) {
                out.push(row);
            }
        }
        Ok(out)
    }

    fn exec_order_by(&self, mut rows: Vec<Value>) -> Result<Vec<Value>, QueryError> {
        sort::sort_rows(&mut rows, &self.order_by)?;
        Ok(rows)
    }

    fn apply_limit_offset(&self, rows: Vec<Value>) -> Vec<Value> {
        let offset = self.offset.unwrap_or(0);
        if offset >= rows.len() {
            return Vec::new();
        }
        let limit = self.limit.unwrap_or(rows.len() - offset);
        rows.into_iter().skip(offset).take(limit).collect()
    }

    // ── Scheduler plumbing ───────────────────────────────────────────────────

    /// Snapshot the state scheduled tasks and functions may touch.
    pub(crate) fn env(&self) -> QueryEnv {
        QueryEnv {
            options: Arc::clone(&self.options),
            from: self.from.clone(),
        }
    }

    pub(crate) fn track(&self, handle: TaskHandle) {
        self.tasks.lock().push(handle);
    }

    pub(crate) fn add_post(&self, processor: PostFn) {
        self.post.lock().push(processor);
    }

    /// Move a finished subquery's outstanding work into this query.
    pub(crate) fn import_work(&self, sub: &Query) {
        self.post.lock().extend(sub.post.lock().drain(..));
        self.tasks.lock().extend(sub.tasks.lock().drain(..));
    }

    fn drain_tasks(&self) -> Result<(), QueryError> {
        loop {
            let handle = self.tasks.lock().pop();
            let Some(handle) = handle else {
                return Ok(());
            };
            match handle.join() {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ErrorKind::ExpectationFailed.extend("scheduled task panicked"))
                }
            }
        }
    }

    fn copy_with_from(&self, from: Vec<Value>) -> Query {
        let mut copy = Query::blank(self.data.clone(), Arc::clone(&self.options));
        copy.from = from;
        copy.distinct = self.distinct;
        copy.select_items = self.select_items.clone();
        copy.where_expr = self.where_expr.clone();
        copy.group_keys = self.group_keys.clone();
        copy.having_expr = self.having_expr.clone();
        copy.order_by = self.order_by.clone();
        copy.limit = self.limit;
        copy.offset = self.offset;
        copy
    }
}

fn apply_alias(rows: Vec<Value>, alias: &Option<ast::TableAlias>) -> Vec<Value> {
    let Some(alias) = alias else {
        return rows;
    };
    rows.into_iter()
        .map(|row| {
            let mut wrapper = Map::new();
            wrapper.insert(alias.name.value.clone(), row);
            Value::object(wrapper)
        })
        .collect()
}

fn parse(text: &str) -> Result<ast::Query, QueryError> {
    let mut statements = Parser::parse_sql(&MySqlDialect {}, text)
        .map_err(|e| ErrorKind::ExpectationFailed.extend(format!("failed to parse query: {}", e)))?;
    if statements.len() != 1 {
        return Err(ErrorKind::ExpectationFailed
            .extend(format!("expected one statement, found {}", statements.len())));
    }
    match statements.remove(0) {
        Statement::Query(query) => Ok(*query),
        other => Err(ErrorKind::UnsupportedCase
            .extend(format!("statement {} is not supported", other))),
    }
}

/// Replace resolved `Deferred` cells in a result tree, chasing chains.
fn resolve_deferred(value: &Value) -> Result<Value, QueryError> {
    match value {
        Value::Deferred(cell) => match cell.get() {
            Some(inner) => resolve_deferred(&inner),
            None => {
                Err(ErrorKind::ExpectationFailed.extend("deferred value was never resolved"))
            }
        },
        Value::Array(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for item in arr.iter() {
                out.push(resolve_deferred(item)?);
            }
            Ok(Value::array(out))
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map.iter() {
                out.insert(key.clone(), resolve_deferred(item)?);
            }
            Ok(Value::object(out))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(json: &str) -> Map {
        Value::document_from_json(serde_json::from_str(json).unwrap()).unwrap()
    }

    #[test]
    fn test_wrapped_option_nests_document() {
        let data = document(r#"{"test": [{"id": 1}]}"#);
        let query = Query::new(data, r#"SELECT id FROM "root.test""#, QueryOptions::new().wrapped())
            .unwrap();
        assert!(query.data.contains_key("root"));
        assert_eq!(query.from.len(), 1);
    }

    #[test]
    fn test_missing_table_gives_empty_from() {
        let data = document(r#"{"a": 1}"#);
        let query = Query::new(data, "SELECT * FROM nowhere", QueryOptions::new()).unwrap();
        assert!(query.from.is_empty());
        assert!(!query.is_dual());
    }

    #[test]
    fn test_dual_mode() {
        let data = document(r#"{"a": 1}"#);
        let query = Query::new(data, "SELECT 1 FROM dual", QueryOptions::new()).unwrap();
        assert!(query.is_dual());
    }

    #[test]
    fn test_invalid_sql_is_rejected() {
        let data = document("{}");
        assert!(Query::new(data, "DEFINITELY NOT SQL", QueryOptions::new()).is_err());
    }

    #[test]
    fn test_alias_wraps_rows() {
        let data = document(r#"{"users": [{"id": 1}, {"id": 2}]}"#);
        let query = Query::new(data, "SELECT * FROM users AS u", QueryOptions::new()).unwrap();
        assert_eq!(query.from.len(), 2);
        assert!(query.from[0].get("u").is_some());
    }

    #[test]
    fn test_limit_offset_clamping() {
        let data = document("{}");
        let mut query = Query::new(data, "SELECT * FROM t", QueryOptions::new()).unwrap();
        query.limit = Some(10);
        query.offset = Some(1);
        let rows = vec![Value::from(1i64), Value::from(2i64), Value::from(3i64)];
        assert_eq!(
            query.apply_limit_offset(rows.clone()),
            vec![Value::from(2i64), Value::from(3i64)]
        );
        query.offset = Some(5);
        assert!(query.apply_limit_offset(rows).is_empty());
    }

    #[test]
    fn test_resolve_deferred_chases_chains() {
        let inner = Arc::new(crate::value::Deferred::new());
        inner.resolve(Value::from(5i64));
        let outer = Arc::new(crate::value::Deferred::new());
        outer.resolve(Value::Deferred(inner));
        let swept = resolve_deferred(&Value::Deferred(outer)).unwrap();
        assert_eq!(swept, Value::from(5i64));
    }

    #[test]
    fn test_unresolved_deferred_is_an_error() {
        let cell = Arc::new(crate::value::Deferred::new());
        assert!(resolve_deferred(&Value::Deferred(cell)).is_err());
    }
}
