//! INSERT/UPDATE/DELETE (spec §4.7, §4.8 foreign-key enforcement via
//! `fkey`).
//!
//! Buffer-then-apply per row: a row's NOT NULL/CHECK/UNIQUE validation all
//! runs before anything about that row is written, so a later constraint
//! failure never leaves a half-written row behind. Across a multi-row
//! statement, rows are still applied one at a time — a duplicate within the
//! same INSERT is caught because the earlier row in the batch is already
//! visible to the scan backing the later row's UNIQUE check.

use crate::ast::{ColumnDef, Delete, Expr, Insert, InsertSource, TableConstraint, Update};
use crate::btree::Cursor;
use crate::errors::{EngineError, EngineResult};
use crate::expr::{self, SubqueryRunner};
use crate::fkey::{self, HeapStore};
use crate::index::Index;
use crate::iter::{NameMap, Schema};
use crate::plan_exec::{execute_select, CtxRunner, SharedCtx};
use crate::record::{self, RowId};
use crate::table::Table;
use crate::value::Value;
use crate::{index_maint, schema};

/// Index keys and partial predicates are evaluated against a bare row with
/// no enclosing query, so a subquery reached from one is rejected rather
/// than silently given an empty result.
struct NoIndexSubqueries;
impl SubqueryRunner for NoIndexSubqueries {
    fn run(&mut self, _query: &crate::ast::Select) -> EngineResult<Vec<Vec<Value>>> {
        Err(EngineError::InvalidExpression(
            "subqueries are not supported in index keys or partial-index predicates".to_string(),
        ))
    }
}

pub struct DmlContext {
    ctx: SharedCtx,
}

impl DmlContext {
    pub fn new(ctx: SharedCtx) -> Self {
        Self { ctx }
    }

    pub fn scan_table(&mut self, table: &str) -> EngineResult<Vec<(RowId, Vec<Value>)>> {
        let mut ctxm = self.ctx.borrow_mut();
        let tree = ctxm.table_tree(table)?;
        let mut cur = tree.cursor();
        let mut out = Vec::new();
        cur.first()?;
        while cur.valid() {
            let rowid = record::decode_rowid(cur.key()).unwrap_or_default();
            let row = record::decode(cur.value()).unwrap_or_default();
            out.push((rowid, row));
            cur.next()?;
        }
        cur.close();
        Ok(out)
    }

    fn collect_matches(&mut self, table: &str, filter: &Option<Expr>) -> EngineResult<Vec<(RowId, Vec<Value>)>> {
        let all = self.scan_table(table)?;
        let Some(f) = filter else { return Ok(all) };
        let names = table_name_map(&self.ctx, table)?;
        let mut runner = CtxRunner(self.ctx.clone());
        let mut out = Vec::with_capacity(all.len());
        for (rowid, row) in all {
            let v = expr::eval(f, &row, &names, &mut runner)?;
            if expr::is_predicate_true(&v) {
                out.push((rowid, row));
            }
        }
        Ok(out)
    }

    fn replace_row(&mut self, table: &str, rowid: RowId, old_row: &[Value], new_row: &[Value]) -> EngineResult<()> {
        let names = table_name_map(&self.ctx, table)?;
        let index_list: Vec<Index> = self.ctx.borrow().catalog.indexes_for_table(table).cloned().collect();
        let mut ctxm = self.ctx.borrow_mut();
        for ix in &index_list {
            let tree = ctxm.index_tree(&ix.name)?;
            index_maint::delete_entry(tree, ix, old_row, &names, rowid, &mut NoIndexSubqueries)?;
        }
        {
            let tree = ctxm.table_tree(table)?;
            tree.insert(&record::encode_rowid(rowid), &record::encode(new_row))?;
        }
        for ix in &index_list {
            let tree = ctxm.index_tree(&ix.name)?;
            index_maint::insert_entry(tree, ix, new_row, &names, rowid, &mut NoIndexSubqueries)?;
        }
        Ok(())
    }

    /// Runs INSERT: builds every target row (defaults filled, vectors
    /// normalized), validates and writes each in turn, and returns the
    /// number of rows inserted.
    pub fn insert(&mut self, stmt: &Insert) -> EngineResult<u64> {
        let table_snapshot = self.ctx.borrow().catalog.table(&stmt.table)?.clone();
        let target_idxs = resolve_insert_columns(&table_snapshot, &stmt.columns)?;

        let rows: Vec<Vec<Value>> = match &stmt.source {
            InsertSource::Values(rows_exprs) => {
                let mut runner = CtxRunner(self.ctx.clone());
                let empty_names = Schema::new(Vec::new()).name_map();
                let mut out = Vec::with_capacity(rows_exprs.len());
                for exprs in rows_exprs {
                    let mut values = Vec::with_capacity(exprs.len());
                    for e in exprs {
                        values.push(expr::eval(e, &[], &empty_names, &mut runner)?);
                    }
                    out.push(build_row(&table_snapshot, &target_idxs, values)?);
                }
                out
            }
            InsertSource::Select(select) => {
                let (_, rows) = execute_select(&self.ctx, select)?;
                rows.into_iter()
                    .map(|values| build_row(&table_snapshot, &target_idxs, values))
                    .collect::<EngineResult<_>>()?
            }
        };

        for row in &rows {
            self.apply_insert_row(&stmt.table, row.clone())?;
        }
        Ok(rows.len() as u64)
    }

    fn apply_insert_row(&mut self, table: &str, row: Vec<Value>) -> EngineResult<()> {
        validate_not_null(&self.ctx, table, &row)?;
        validate_check_constraints(&self.ctx, table, &row)?;
        validate_unique_constraints(self, table, &row, None)?;

        let rowid = self.ctx.borrow_mut().catalog.table_mut(table)?.take_next_rowid();
        self.write_row(table, rowid, &row)
    }

    fn write_row(&mut self, table: &str, rowid: RowId, row: &[Value]) -> EngineResult<()> {
        let names = table_name_map(&self.ctx, table)?;
        let index_list: Vec<Index> = self.ctx.borrow().catalog.indexes_for_table(table).cloned().collect();
        let mut ctxm = self.ctx.borrow_mut();
        {
            let tree = ctxm.table_tree(table)?;
            tree.insert(&record::encode_rowid(rowid), &record::encode(row))?;
        }
        for ix in &index_list {
            let tree = ctxm.index_tree(&ix.name)?;
            index_maint::insert_entry(tree, ix, row, &names, rowid, &mut NoIndexSubqueries)?;
        }
        ctxm.catalog.table_mut(table)?.row_count += 1;
        Ok(())
    }

    /// Runs UPDATE: matches rows against the filter, computes every new
    /// row, validates all of them, then applies the writes.
    pub fn update(&mut self, stmt: &Update) -> EngineResult<u64> {
        let matched = self.collect_matches(&stmt.table, &stmt.filter)?;
        let table_snapshot = self.ctx.borrow().catalog.table(&stmt.table)?.clone();
        let names = Schema::new(table_snapshot.columns.iter().map(|c| c.name.clone()).collect()).name_map();
        let mut runner = CtxRunner(self.ctx.clone());

        let mut new_rows = Vec::with_capacity(matched.len());
        for (rowid, old_row) in &matched {
            let mut new_row = old_row.clone();
            for (col, assign_expr) in &stmt.assignments {
                let idx = table_snapshot
                    .column_index(col)
                    .ok_or_else(|| EngineError::ColumnNotFound(col.clone()))?;
                let v = expr::eval(assign_expr, old_row, &names, &mut runner)?;
                new_row[idx] = normalize_for_column(&table_snapshot.columns[idx], v)?;
            }
            new_rows.push((*rowid, old_row.clone(), new_row));
        }

        for (rowid, _, new_row) in &new_rows {
            validate_not_null(&self.ctx, &stmt.table, new_row)?;
            validate_check_constraints(&self.ctx, &stmt.table, new_row)?;
            validate_unique_constraints(self, &stmt.table, new_row, Some(*rowid))?;
        }

        for (rowid, old_row, new_row) in &new_rows {
            self.replace_row(&stmt.table, *rowid, old_row, new_row)?;
        }
        Ok(new_rows.len() as u64)
    }

    /// Runs DELETE: matches rows against the filter, enforces every
    /// incoming foreign key (which may itself cascade further deletes),
    /// then removes the matched rows.
    pub fn delete(&mut self, stmt: &Delete) -> EngineResult<u64> {
        let matched = self.collect_matches(&stmt.table, &stmt.filter)?;
        let catalog_snapshot = self.ctx.borrow().catalog.clone();
        for (_, row) in &matched {
            fkey::enforce_on_delete(&catalog_snapshot, self, &stmt.table, row)?;
        }
        for (rowid, _) in &matched {
            HeapStore::delete_row(self, &stmt.table, *rowid)?;
        }
        Ok(matched.len() as u64)
    }
}

impl HeapStore for DmlContext {
    fn scan_table(&mut self, table: &str) -> EngineResult<Vec<(RowId, Vec<Value>)>> {
        self.scan_table(table)
    }

    fn delete_row(&mut self, table: &str, rowid: RowId) -> EngineResult<()> {
        let key = record::encode_rowid(rowid);
        let row = {
            let mut ctxm = self.ctx.borrow_mut();
            let tree = ctxm.table_tree(table)?;
            match tree.get(&key)? {
                Some(bytes) => record::decode(&bytes).unwrap_or_default(),
                None => return Ok(()),
            }
        };
        let names = table_name_map(&self.ctx, table)?;
        let index_list: Vec<Index> = self.ctx.borrow().catalog.indexes_for_table(table).cloned().collect();
        let mut ctxm = self.ctx.borrow_mut();
        for ix in &index_list {
            let tree = ctxm.index_tree(&ix.name)?;
            index_maint::delete_entry(tree, ix, &row, &names, rowid, &mut NoIndexSubqueries)?;
        }
        let tree = ctxm.table_tree(table)?;
        tree.delete(&key)?;
        ctxm.catalog.table_mut(table)?.row_count -= 1;
        Ok(())
    }

    fn update_row(&mut self, table: &str, rowid: RowId, new_values: Vec<Value>) -> EngineResult<()> {
        let old_row = {
            let mut ctxm = self.ctx.borrow_mut();
            let tree = ctxm.table_tree(table)?;
            match tree.get(&record::encode_rowid(rowid))? {
                Some(bytes) => record::decode(&bytes).unwrap_or_default(),
                None => return Ok(()),
            }
        };
        self.replace_row(table, rowid, &old_row, &new_values)
    }

    fn column_index(&self, table: &str, column: &str) -> EngineResult<usize> {
        self.ctx
            .borrow()
            .catalog
            .table(table)?
            .column_index(column)
            .ok_or_else(|| EngineError::ColumnNotFound(column.to_string()))
    }

    fn default_value(&self, table: &str, column: &str) -> EngineResult<Value> {
        let ctxm = self.ctx.borrow();
        let col = ctxm
            .catalog
            .table(table)?
            .column(column)
            .ok_or_else(|| EngineError::ColumnNotFound(column.to_string()))?;
        Ok(col.default.clone().unwrap_or(Value::Null))
    }
}

fn table_name_map(ctx: &SharedCtx, table: &str) -> EngineResult<NameMap> {
    let ctxm = ctx.borrow();
    let cols: Vec<String> = ctxm.catalog.table(table)?.columns.iter().map(|c| c.name.clone()).collect();
    Ok(Schema::new(cols).name_map())
}

fn resolve_insert_columns(table: &Table, columns: &Option<Vec<String>>) -> EngineResult<Vec<usize>> {
    match columns {
        Some(names) => names
            .iter()
            .map(|n| table.column_index(n).ok_or_else(|| EngineError::ColumnNotFound(n.clone())))
            .collect(),
        None => Ok((0..table.columns.len()).collect()),
    }
}

fn build_row(table: &Table, target_idxs: &[usize], values: Vec<Value>) -> EngineResult<Vec<Value>> {
    if values.len() != target_idxs.len() {
        return Err(EngineError::InvalidExpression(format!(
            "expected {} values, got {}",
            target_idxs.len(),
            values.len()
        )));
    }
    let mut row = vec![Value::Null; table.columns.len()];
    let mut set = vec![false; table.columns.len()];
    for (v, &idx) in values.into_iter().zip(target_idxs) {
        row[idx] = normalize_for_column(&table.columns[idx], v)?;
        set[idx] = true;
    }
    for (i, col) in table.columns.iter().enumerate() {
        if !set[i] {
            row[i] = col.default.clone().unwrap_or(Value::Null);
        }
    }
    Ok(row)
}

/// Dimension-checks and unit-normalizes a `Vector` value against its
/// column's declared dimension (spec §3); every other type passes through.
fn normalize_for_column(col: &ColumnDef, v: Value) -> EngineResult<Value> {
    if let Value::Vector(vec) = v {
        if let Some(dim) = col.vector_dim {
            if vec.len() as u32 != dim {
                return Err(EngineError::VectorDimension { expected: dim, got: vec.len() as u32 });
            }
        }
        Ok(Value::Vector(Value::normalize_vector(vec)))
    } else {
        Ok(v)
    }
}

fn validate_not_null(ctx: &SharedCtx, table: &str, row: &[Value]) -> EngineResult<()> {
    let ctxm = ctx.borrow();
    let t = ctxm.catalog.table(table)?;
    for (i, col) in t.columns.iter().enumerate() {
        if col.not_null && row.get(i).map(Value::is_null).unwrap_or(true) {
            return Err(EngineError::NotNullViolation(col.name.clone()));
        }
    }
    Ok(())
}

/// A CHECK fails only when its expression is definitely false; Null (the
/// expression's truth value is unknown) and true both pass, same as a
/// WHERE clause that can't decide excludes a row but a CHECK that can't
/// decide allows the write (spec §3/§4.7).
fn validate_check_constraints(ctx: &SharedCtx, table: &str, row: &[Value]) -> EngineResult<()> {
    let (checks, names) = {
        let ctxm = ctx.borrow();
        let t = ctxm.catalog.table(table)?;
        let names = Schema::new(t.columns.iter().map(|c| c.name.clone()).collect()).name_map();
        let checks: Vec<Expr> = t
            .constraints
            .iter()
            .filter_map(|c| match c {
                TableConstraint::Check(e) => Some(e.clone()),
                _ => None,
            })
            .collect();
        (checks, names)
    };
    let mut runner = CtxRunner(ctx.clone());
    for check in &checks {
        let v = expr::eval(check, row, &names, &mut runner)?;
        let fails = !matches!(v, Value::Null) && !v.is_truthy();
        if fails {
            return Err(EngineError::CheckViolation(None, "CHECK constraint failed".to_string()));
        }
    }
    Ok(())
}

/// Enforces every PRIMARY KEY/UNIQUE table constraint by scanning the
/// table's current rows (which, for a multi-row statement applied one row
/// at a time, already include every earlier row of this same statement).
/// A Null in any constrained column never conflicts, matching SQL UNIQUE
/// semantics.
fn validate_unique_constraints(
    dml: &mut DmlContext,
    table: &str,
    row: &[Value],
    skip_rowid: Option<RowId>,
) -> EngineResult<()> {
    let (col_sets, names) = {
        let ctxm = dml.ctx.borrow();
        let t = ctxm.catalog.table(table)?;
        let names = Schema::new(t.columns.iter().map(|c| c.name.clone()).collect()).name_map();
        let mut sets: Vec<Vec<String>> = Vec::new();
        for c in &t.constraints {
            match c {
                TableConstraint::PrimaryKey(cols) => sets.push(cols.clone()),
                TableConstraint::Unique(cols) => sets.push(cols.clone()),
                _ => {}
            }
        }
        (sets, names)
    };
    if col_sets.is_empty() {
        return Ok(());
    }

    let existing = dml.scan_table(table)?;
    for cols in &col_sets {
        let idxs: Vec<usize> = cols
            .iter()
            .map(|c| names.resolve(c).ok_or_else(|| EngineError::ColumnNotFound(c.clone())))
            .collect::<EngineResult<_>>()?;
        if idxs.iter().any(|&i| row[i].is_null()) {
            continue;
        }
        for (rid, existing_row) in &existing {
            if Some(*rid) == skip_rowid {
                continue;
            }
            let is_match = idxs.iter().all(|&i| matches!(row[i].sql_eq(&existing_row[i]), Some(true)));
            if is_match {
                return Err(EngineError::UniqueViolation(cols.join(",")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ColumnType, FkAction};
    use crate::btree::reference::MemBTreeFactory;
    use crate::global::EngineConfig;
    use crate::plan_exec::ExecContext;

    fn new_ctx() -> SharedCtx {
        ExecContext::new(schema::Catalog::new(), Box::new(MemBTreeFactory::new(2)), EngineConfig::default()).shared()
    }

    fn col(name: &str, not_null: bool) -> ColumnDef {
        ColumnDef { name: name.to_string(), ty: ColumnType::Int, not_null, default: None, vector_dim: None }
    }

    fn make_table(ctx: &SharedCtx, name: &str, columns: Vec<ColumnDef>, constraints: Vec<TableConstraint>) {
        let mut c = ctx.borrow_mut();
        let page = c.catalog.allocate_page();
        c.catalog.create_table(Table::new(name.to_string(), columns, constraints, page)).unwrap();
    }

    #[test]
    fn insert_assigns_rowids_and_fills_defaults() {
        let ctx = new_ctx();
        make_table(&ctx, "t", vec![col("a", true), col("b", false)], Vec::new());
        let mut dml = DmlContext::new(ctx.clone());
        let stmt = Insert {
            table: "t".to_string(),
            columns: Some(vec!["a".to_string()]),
            source: InsertSource::Values(vec![vec![Expr::Literal(Value::Int(1))], vec![Expr::Literal(Value::Int(2))]]),
        };
        let n = dml.insert(&stmt).unwrap();
        assert_eq!(n, 2);
        let rows = dml.scan_table("t").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 1);
        assert!(rows[0].1[1].is_null());
    }

    #[test]
    fn insert_rejects_not_null_violation() {
        let ctx = new_ctx();
        make_table(&ctx, "t", vec![col("a", true)], Vec::new());
        let mut dml = DmlContext::new(ctx);
        let stmt = Insert {
            table: "t".to_string(),
            columns: Some(vec!["a".to_string()]),
            source: InsertSource::Values(vec![vec![Expr::Literal(Value::Null)]]),
        };
        let err = dml.insert(&stmt).unwrap_err();
        assert!(matches!(err, EngineError::NotNullViolation(_)));
    }

    #[test]
    fn insert_rejects_duplicate_primary_key_within_batch() {
        let ctx = new_ctx();
        make_table(&ctx, "t", vec![col("id", true)], vec![TableConstraint::PrimaryKey(vec!["id".to_string()])]);
        let mut dml = DmlContext::new(ctx);
        let stmt = Insert {
            table: "t".to_string(),
            columns: Some(vec!["id".to_string()]),
            source: InsertSource::Values(vec![vec![Expr::Literal(Value::Int(1))], vec![Expr::Literal(Value::Int(1))]]),
        };
        let err = dml.insert(&stmt).unwrap_err();
        assert!(matches!(err, EngineError::UniqueViolation(_)));
    }

    #[test]
    fn update_applies_matching_rows_only() {
        let ctx = new_ctx();
        make_table(&ctx, "t", vec![col("id", true), col("v", false)], Vec::new());
        let mut dml = DmlContext::new(ctx);
        dml.insert(&Insert {
            table: "t".to_string(),
            columns: Some(vec!["id".to_string(), "v".to_string()]),
            source: InsertSource::Values(vec![
                vec![Expr::Literal(Value::Int(1)), Expr::Literal(Value::Int(10))],
                vec![Expr::Literal(Value::Int(2)), Expr::Literal(Value::Int(20))],
            ]),
        })
        .unwrap();

        let n = dml
            .update(&Update {
                table: "t".to_string(),
                assignments: vec![("v".to_string(), Expr::Literal(Value::Int(99)))],
                filter: Some(Expr::Binary(
                    crate::ast::BinOp::Eq,
                    Box::new(Expr::Column("id".to_string())),
                    Box::new(Expr::Literal(Value::Int(1))),
                )),
            })
            .unwrap();
        assert_eq!(n, 1);

        let rows = dml.scan_table("t").unwrap();
        let v1 = rows.iter().find(|(rid, _)| *rid == 1).unwrap().1[1].as_int().unwrap();
        let v2 = rows.iter().find(|(rid, _)| *rid == 2).unwrap().1[1].as_int().unwrap();
        assert_eq!(v1, 99);
        assert_eq!(v2, 20);
    }

    #[test]
    fn delete_cascades_to_referencing_rows() {
        let ctx = new_ctx();
        make_table(&ctx, "p", vec![col("id", true)], vec![TableConstraint::PrimaryKey(vec!["id".to_string()])]);
        make_table(
            &ctx,
            "c",
            vec![col("id", true), col("pid", false)],
            vec![TableConstraint::ForeignKey {
                columns: vec!["pid".to_string()],
                ref_table: "p".to_string(),
                ref_columns: vec!["id".to_string()],
                on_delete: FkAction::Cascade,
            }],
        );
        let mut dml = DmlContext::new(ctx);
        dml.insert(&Insert {
            table: "p".to_string(),
            columns: Some(vec!["id".to_string()]),
            source: InsertSource::Values(vec![vec![Expr::Literal(Value::Int(1))]]),
        })
        .unwrap();
        dml.insert(&Insert {
            table: "c".to_string(),
            columns: Some(vec!["id".to_string(), "pid".to_string()]),
            source: InsertSource::Values(vec![vec![Expr::Literal(Value::Int(1)), Expr::Literal(Value::Int(1))]]),
        })
        .unwrap();

        dml.delete(&Delete {
            table: "p".to_string(),
            filter: Some(Expr::Binary(
                crate::ast::BinOp::Eq,
                Box::new(Expr::Column("id".to_string())),
                Box::new(Expr::Literal(Value::Int(1))),
            )),
        })
        .unwrap();

        assert!(dml.scan_table("p").unwrap().is_empty());
        assert!(dml.scan_table("c").unwrap().is_empty());
    }
}
