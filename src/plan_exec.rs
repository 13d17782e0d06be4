//! Plan executor (spec §3, §4.5, §9).
//!
//! Builds and drives the operator tree for an `ast::Select`. `ExecContext`
//! bundles the one resource every operator eventually needs — the
//! catalog, the B-tree handles backing each table/index, and the bindings
//! a WITH clause introduces — behind a single `Rc<RefCell<_>>` shared by
//! every operator and subquery evaluation in the statement, since this
//! executor is single-threaded end to end (spec §5) and nested operators
//! need concurrent-in-time mutable access to it that plain borrowing can't
//! express without threading a context parameter through every operator's
//! constructor and lifetime.
//!
//! Every leaf operator (`TableScan`, `CteScan`) is materialized into an
//! owned `MemRows` batch before it is handed to its parent, so no operator
//! ever borrows out of the `RefCell` across a `next()` call — the pull
//! model the `RowIter` trait describes is still honored operator-by-
//! operator, it is just that this crate's reference B-tree and executor
//! never stream a batch larger than one statement's working set.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Expr, FromItem, Select, SelectBody, SelectCore, SelectItem};
use crate::btree::{BTree, BTreeFactory};
use crate::cte::{self, FixpointStep};
use crate::errors::{EngineError, EngineResult};
use crate::expr::SubqueryRunner;
use crate::global::{EngineConfig, Pgno};
use crate::iter::{MemRows, RowIter, Schema};
use crate::ops::aggregate::{expr_has_aggregate, HashAggregate};
use crate::ops::cte_scan::CteScan;
use crate::ops::filter::Filter;
use crate::ops::join::NestedLoopJoin;
use crate::ops::project::Projection;
use crate::ops::setop::SetOpIter;
use crate::ops::sort_limit::{eval_limit_offset, Limit, Sort};
use crate::ops::subquery::SubqueryScan;
use crate::record;
use crate::schema::Catalog;
use crate::value::Value;

pub struct ExecContext {
    pub catalog: Catalog,
    factory: Box<dyn BTreeFactory>,
    trees: HashMap<String, Box<dyn BTree>>,
    cte_bindings: HashMap<String, (Vec<String>, Vec<Vec<Value>>)>,
    pub config: EngineConfig,
}

pub type SharedCtx = Rc<RefCell<ExecContext>>;

impl ExecContext {
    pub fn new(catalog: Catalog, factory: Box<dyn BTreeFactory>, config: EngineConfig) -> Self {
        Self {
            catalog,
            factory,
            trees: HashMap::new(),
            cte_bindings: HashMap::new(),
            config,
        }
    }

    pub fn shared(self) -> SharedCtx {
        Rc::new(RefCell::new(self))
    }

    pub(crate) fn table_tree(&mut self, table: &str) -> EngineResult<&mut Box<dyn BTree>> {
        if !self.trees.contains_key(table) {
            let root = self.catalog.table(table)?.root_page;
            let tree = self.open_or_create(root)?;
            self.trees.insert(table.to_string(), tree);
        }
        Ok(self.trees.get_mut(table).expect("just inserted"))
    }

    pub fn index_tree(&mut self, index_name: &str) -> EngineResult<&mut Box<dyn BTree>> {
        let key = format!("idx:{index_name}");
        if !self.trees.contains_key(&key) {
            let root = self.catalog.index(index_name)?.root_page;
            let tree = self.open_or_create(root)?;
            self.trees.insert(key.clone(), tree);
        }
        Ok(self.trees.get_mut(&key).expect("just inserted"))
    }

    fn open_or_create(&mut self, root: Pgno) -> EngineResult<Box<dyn BTree>> {
        self.factory.open(root)
    }

    /// Evicts a cached index tree handle, e.g. after `CREATE INDEX`
    /// backfill fails and the catalog entry is rolled back — otherwise a
    /// later index of the same name would reuse the half-populated tree.
    pub(crate) fn drop_index_tree(&mut self, index_name: &str) {
        self.trees.remove(&format!("idx:{index_name}"));
    }

    /// Evicts a cached heap tree handle, e.g. after `DROP TABLE` — a later
    /// `CREATE TABLE` reusing the name gets a fresh tree at its own root
    /// page rather than the dropped table's cached handle.
    pub(crate) fn drop_table_tree(&mut self, table: &str) {
        self.trees.remove(table);
    }

    /// Moves a cached heap tree handle to follow `ALTER TABLE ... RENAME
    /// TO` — the reference B-tree factory hands back a brand-new empty
    /// tree on `open()`, so evicting the old key instead of moving it
    /// would silently discard the table's rows.
    pub(crate) fn rename_table_tree(&mut self, old: &str, new: &str) {
        if let Some(tree) = self.trees.remove(old) {
            self.trees.insert(new.to_string(), tree);
        }
    }
}

/// Thin wrapper implementing `expr::SubqueryRunner` by borrowing the
/// shared context for the duration of a single subquery's execution.
pub struct CtxRunner(pub SharedCtx);

impl SubqueryRunner for CtxRunner {
    fn run(&mut self, query: &Select) -> EngineResult<Vec<Vec<Value>>> {
        let (_, rows) = execute_select(&self.0, query)?;
        Ok(rows)
    }
}

fn drain(mut iter: Box<dyn RowIter>) -> EngineResult<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    while iter.next()? {
        rows.push(iter.row().to_vec());
    }
    iter.close();
    Ok(rows)
}

/// Runs a full `Select` (WITH, body, ORDER BY, LIMIT/OFFSET) to completion
/// and returns its output schema and materialized rows.
pub fn execute_select(ctx: &SharedCtx, select: &Select) -> EngineResult<(Schema, Vec<Vec<Value>>)> {
    bind_ctes(ctx, select)?;

    let mut iter = build_body(ctx, &select.body)?;
    if !select.order_by.is_empty() {
        let mut runner = CtxRunner(ctx.clone());
        iter = Box::new(Sort::new(iter, &select.order_by, &mut runner)?);
    }
    let mut runner = CtxRunner(ctx.clone());
    let (offset, limit) = eval_limit_offset(&select.limit, &select.offset, &mut runner)?;
    iter = Box::new(Limit::new(iter, offset, limit));

    let schema = iter.schema().clone();
    let rows = drain(iter)?;
    Ok((schema, rows))
}

fn bind_ctes(ctx: &SharedCtx, select: &Select) -> EngineResult<()> {
    for cte in &select.with {
        let anchor_iter = build_body(ctx, &cte.anchor)?;
        let anchor_rows = drain(anchor_iter)?;

        let rows = if cte.recursive {
            let limit = ctx.borrow().config.recursion_limit;
            let term = cte
                .recursive_term
                .as_ref()
                .ok_or_else(|| EngineError::InvalidExpression(format!("recursive CTE {} has no recursive term", cte.name)))?;
            let mut step = RecursiveStep {
                ctx: ctx.clone(),
                term: (**term).clone(),
                cte_name: cte.name.clone(),
                columns: cte.columns.clone(),
            };
            cte::semi_naive_fixpoint(anchor_rows, limit, &mut step)?
        } else {
            anchor_rows
        };

        ctx.borrow_mut().cte_bindings.insert(cte.name.clone(), (cte.columns.clone(), rows));
    }
    Ok(())
}

/// Drives one round of a recursive CTE's fixpoint: binds the CTE's own
/// name to *only the previous round's new rows* before re-planning the
/// recursive term, so a self-reference inside it sees the semi-naive
/// working set rather than the whole accumulator.
struct RecursiveStep {
    ctx: SharedCtx,
    term: SelectBody,
    cte_name: String,
    columns: Vec<String>,
}

impl FixpointStep for RecursiveStep {
    fn eval_recursive_term(&mut self, working_set: &[Vec<Value>]) -> EngineResult<Vec<Vec<Value>>> {
        self.ctx
            .borrow_mut()
            .cte_bindings
            .insert(self.cte_name.clone(), (self.columns.clone(), working_set.to_vec()));
        let iter = build_body(&self.ctx, &self.term)?;
        drain(iter)
    }
}

fn build_body(ctx: &SharedCtx, body: &SelectBody) -> EngineResult<Box<dyn RowIter>> {
    match body {
        SelectBody::Query(core) => build_core(ctx, core),
        SelectBody::SetOp { op, all, left, right } => {
            let left_iter = build_body(ctx, left)?;
            let right_iter = build_body(ctx, right)?;
            Ok(Box::new(SetOpIter::new(*op, *all, left_iter, right_iter)?))
        }
    }
}

fn build_core(ctx: &SharedCtx, core: &SelectCore) -> EngineResult<Box<dyn RowIter>> {
    let mut iter: Box<dyn RowIter> = match &core.from {
        Some(item) => build_from(ctx, item)?,
        None => Box::new(MemRows::new(Schema::new(Vec::new()), vec![Vec::new()])),
    };

    if let Some(filter) = &core.filter {
        let runner = Box::new(CtxRunner(ctx.clone()));
        iter = Box::new(Filter::new(iter, filter.clone(), runner));
    }

    let is_aggregate = !core.group_by.is_empty()
        || core.projection.iter().any(|item| matches!(item, SelectItem::Expr { expr, .. } if expr_has_aggregate(expr)))
        || core.having.as_ref().is_some_and(expr_has_aggregate);

    if is_aggregate {
        let mut runner = CtxRunner(ctx.clone());
        iter = Box::new(HashAggregate::new(iter, &core.group_by, &core.projection, &core.having, &mut runner)?);
    } else {
        if let Some(having) = &core.having {
            let runner = Box::new(CtxRunner(ctx.clone()));
            iter = Box::new(Filter::new(iter, having.clone(), runner));
        }
        let runner = Box::new(CtxRunner(ctx.clone()));
        iter = Box::new(Projection::new(iter, &core.projection, runner));
    }

    if core.distinct {
        let schema = iter.schema().clone();
        let rows = distinct_rows(drain(iter)?);
        iter = Box::new(MemRows::new(schema, rows));
    }

    Ok(iter)
}

fn distinct_rows(rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let fp = crate::value::row_fingerprint(&row);
        if seen.insert(fp) {
            out.push(row);
        }
    }
    out
}

fn build_from(ctx: &SharedCtx, item: &FromItem) -> EngineResult<Box<dyn RowIter>> {
    match item {
        FromItem::Table { name, alias } => {
            let display_alias = alias.clone().unwrap_or_else(|| name.clone());
            let (columns, rows) = scan_table_rows(ctx, name)?;
            let schema = Schema::prefixed(&display_alias, &columns);
            Ok(Box::new(MemRows::new(schema, rows)))
        }
        FromItem::Cte { name, alias } => {
            let display_alias = alias.clone().unwrap_or_else(|| name.clone());
            let (columns, rows) = ctx
                .borrow()
                .cte_bindings
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::TableNotFound(name.clone()))?;
            Ok(Box::new(CteScan::new(&display_alias, &columns, rows)))
        }
        FromItem::Subquery { query, alias } => {
            let (schema, rows) = execute_select(ctx, query)?;
            let child = Box::new(MemRows::new(schema, rows));
            Ok(Box::new(SubqueryScan::new(child, alias)))
        }
        FromItem::Join { left, right, join_type, on } => {
            let left_iter = build_from(ctx, left)?;
            let right_iter = build_from(ctx, right)?;
            let mut runner = CtxRunner(ctx.clone());
            Ok(Box::new(NestedLoopJoin::new(left_iter, right_iter, *join_type, on.as_ref(), &mut runner)?))
        }
    }
}

fn scan_table_rows(ctx: &SharedCtx, table: &str) -> EngineResult<(Vec<String>, Vec<Vec<Value>>)> {
    let mut ctx_mut = ctx.borrow_mut();
    let columns: Vec<String> = ctx_mut.catalog.table(table)?.columns.iter().map(|c| c.name.clone()).collect();
    let tree = ctx_mut.table_tree(table)?;
    let mut cursor = tree.cursor();
    let mut rows = Vec::new();
    cursor.first()?;
    while cursor.valid() {
        rows.push(record::decode(cursor.value()).unwrap_or_default());
        cursor.next()?;
    }
    cursor.close();
    Ok((columns, rows))
}
