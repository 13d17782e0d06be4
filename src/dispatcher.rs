//! Statement dispatcher (spec §4, "Statement dispatcher"; spec §6 "External
//! interfaces").
//!
//! `Engine` is the top-level entry point: it owns the shared plan-execution
//! context, the session's transaction state, and the transaction-manager
//! collaborator, and routes each `ast::Stmt` variant to the subsystem that
//! handles it (DDL against `schema::Catalog` directly, DML through
//! `dml::DmlContext`, `SELECT` through `plan_exec::execute_select`,
//! transaction control through `txn::TxnState`). Every error surfacing from
//! a lower layer is wrapped with a `Phase` tag before it reaches the caller.

use tracing::{debug, info_span, trace};

use crate::ast::{AlterAction, ColumnDef, CreateIndex, CreateTable, Stmt};
use crate::btree::BTreeFactory;
use crate::dml::DmlContext;
use crate::errors::{DispatchError, DispatchResult, EngineError, EngineResult, Phase};
use crate::global::EngineConfig;
use crate::index::Index;
use crate::index_maint;
use crate::iter::Schema;
use crate::plan_exec::{execute_select, CtxRunner, ExecContext, SharedCtx};
use crate::record;
use crate::schema::Catalog;
use crate::table::Table;
use crate::trigger::{Procedure, Trigger, View};
use crate::txn::{TransactionManager, TxnState};
use crate::value::Value;

/// The uniform shape of a statement's result (spec §6 "Output"): an empty
/// column list and zero rows for statements that return nothing but a
/// mutation count, a populated column list and rows for `SELECT`.
#[derive(Debug, Clone, Default)]
pub struct StatementOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: i64,
}

impl StatementOutcome {
    fn rows_only(rows_affected: i64) -> Self {
        Self { columns: Vec::new(), rows: Vec::new(), rows_affected }
    }

    fn query(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let n = rows.len() as i64;
        Self { columns, rows, rows_affected: n }
    }
}

/// Top-level entry point. Generic over the embedder's transaction-manager
/// implementation, matching the way `plan_exec`/`dml` are generic over the
/// `BTreeFactory`/`BTree` collaborators via trait objects.
pub struct Engine<M: TransactionManager> {
    ctx: SharedCtx,
    txn: TxnState,
    mgr: M,
}

impl<M: TransactionManager> Engine<M> {
    pub fn new(catalog: Catalog, factory: Box<dyn BTreeFactory>, config: EngineConfig, mgr: M) -> Self {
        Self {
            ctx: ExecContext::new(catalog, factory, config).shared(),
            txn: TxnState::new(),
            mgr,
        }
    }

    pub fn is_in_transaction(&self) -> bool {
        self.txn.is_active()
    }

    /// Routes one statement to its handler and wraps any error with the
    /// phase it failed in. DDL/catalog resolution failures are tagged
    /// `BuildPlan`; everything that touches rows (DML, SELECT, transaction
    /// control) is tagged `Execution`. `Parse` is never produced here —
    /// lexing/parsing happens upstream of this crate (spec §1).
    pub fn execute(&mut self, stmt: &Stmt) -> DispatchResult<StatementOutcome> {
        let _span = info_span!("statement", kind = stmt_kind(stmt)).entered();
        match stmt {
            Stmt::CreateTable(ct) => wrap(Phase::BuildPlan, self.create_table(ct)),
            Stmt::DropTable { name, if_exists } => wrap(Phase::BuildPlan, self.drop_table(name, *if_exists)),
            Stmt::CreateIndex(ci) => wrap(Phase::BuildPlan, self.create_index(ci)),
            Stmt::DropIndex { name, if_exists } => wrap(Phase::BuildPlan, self.drop_index(name, *if_exists)),
            Stmt::CreateView { name, query } => wrap(Phase::BuildPlan, self.create_view(name, query)),
            Stmt::DropView { name, if_exists, .. } => wrap(Phase::BuildPlan, self.drop_view(name, *if_exists)),
            Stmt::CreateTrigger { name, table, sql } => wrap(Phase::BuildPlan, self.create_trigger(name, table, sql)),
            Stmt::DropTrigger { name, if_exists } => wrap(Phase::BuildPlan, self.drop_trigger(name, *if_exists)),
            Stmt::CreateProcedure { name, sql } => wrap(Phase::BuildPlan, self.create_procedure(name, sql)),
            Stmt::DropProcedure { name, if_exists } => wrap(Phase::BuildPlan, self.drop_procedure(name, *if_exists)),
            Stmt::AlterTable(at) => wrap(Phase::BuildPlan, self.alter_table(&at.table, &at.action)),
            Stmt::Insert(ins) => wrap(Phase::Execution, DmlContext::new(self.ctx.clone()).insert(ins)).map(|n| StatementOutcome::rows_only(n as i64)),
            Stmt::Update(upd) => wrap(Phase::Execution, DmlContext::new(self.ctx.clone()).update(upd)).map(|n| StatementOutcome::rows_only(n as i64)),
            Stmt::Delete(del) => wrap(Phase::Execution, DmlContext::new(self.ctx.clone()).delete(del)).map(|n| StatementOutcome::rows_only(n as i64)),
            Stmt::Select(sel) => wrap(Phase::Execution, execute_select(&self.ctx, sel)).map(|(schema, rows)| StatementOutcome::query(schema.names, rows)),
            Stmt::Analyze { table } => wrap(Phase::Execution, self.analyze(table.as_deref())),
            Stmt::Begin => wrap(Phase::Execution, self.txn.begin(&mut self.mgr)).map(|_| StatementOutcome::rows_only(0)),
            Stmt::Commit => wrap(Phase::Execution, self.txn.commit(&mut self.mgr)).map(|_| StatementOutcome::rows_only(0)),
            Stmt::Rollback => wrap(Phase::Execution, self.txn.rollback(&mut self.mgr)).map(|_| StatementOutcome::rows_only(0)),
            Stmt::Savepoint(name) => {
                wrap(Phase::Execution, self.txn.savepoint(&mut self.mgr, name.clone())).map(|_| StatementOutcome::rows_only(0))
            }
            Stmt::Release(name) => wrap(Phase::Execution, self.txn.release(&mut self.mgr, name)).map(|_| StatementOutcome::rows_only(0)),
            Stmt::RollbackTo(name) => wrap(Phase::Execution, self.txn.rollback_to(&mut self.mgr, name)).map(|_| StatementOutcome::rows_only(0)),
        }
    }

    // -- DDL --

    fn create_table(&mut self, ct: &CreateTable) -> EngineResult<StatementOutcome> {
        let mut ctxm = self.ctx.borrow_mut();
        if ct.if_not_exists && ctxm.catalog.has_table(&ct.name) {
            return Ok(StatementOutcome::rows_only(0));
        }
        let page = ctxm.catalog.allocate_page();
        ctxm.catalog.create_table(Table::new(ct.name.clone(), ct.columns.clone(), ct.constraints.clone(), page))?;
        debug!(table = %ct.name, "created table");
        Ok(StatementOutcome::rows_only(0))
    }

    fn drop_table(&mut self, name: &str, if_exists: bool) -> EngineResult<StatementOutcome> {
        let mut ctxm = self.ctx.borrow_mut();
        if !ctxm.catalog.has_table(name) {
            if if_exists {
                return Ok(StatementOutcome::rows_only(0));
            }
            return Err(EngineError::TableNotFound(name.to_string()));
        }
        let index_names: Vec<String> = ctxm.catalog.indexes_for_table(name).map(|ix| ix.name.clone()).collect();
        ctxm.catalog.drop_table(name)?;
        for ix_name in &index_names {
            ctxm.drop_index_tree(ix_name);
        }
        ctxm.drop_table_tree(name);
        debug!(table = %name, "dropped table");
        Ok(StatementOutcome::rows_only(0))
    }

    fn create_index(&mut self, ci: &CreateIndex) -> EngineResult<StatementOutcome> {
        {
            let ctxm = self.ctx.borrow();
            if ci.if_not_exists && ctxm.catalog.index(&ci.name).is_ok() {
                return Ok(StatementOutcome::rows_only(0));
            }
            ctxm.catalog.table(&ci.table)?;
        }

        let page = self.ctx.borrow_mut().catalog.allocate_page();
        let index = Index::new(ci.name.clone(), ci.table.clone(), ci.unique, ci.columns.clone(), ci.partial.clone(), page);
        self.ctx.borrow_mut().catalog.create_index(index.clone())?;

        let rows = DmlContext::new(self.ctx.clone()).scan_table(&ci.table)?;
        let col_names: Vec<String> = self.ctx.borrow().catalog.table(&ci.table)?.columns.iter().map(|c| c.name.clone()).collect();
        let names = Schema::new(col_names).name_map();
        let mut runner = CtxRunner(self.ctx.clone());

        let backfilled = {
            let mut ctxm = self.ctx.borrow_mut();
            ctxm.index_tree(&index.name)
                .and_then(|tree| index_maint::backfill(tree, &index, &rows, &names, &mut runner))
        };
        if let Err(e) = backfilled {
            let mut ctxm = self.ctx.borrow_mut();
            ctxm.drop_index_tree(&index.name);
            let _ = ctxm.catalog.drop_index(&index.name);
            return Err(e);
        }
        trace!(index = %ci.name, rows = rows.len(), "backfilled index");
        Ok(StatementOutcome::rows_only(0))
    }

    fn drop_index(&mut self, name: &str, if_exists: bool) -> EngineResult<StatementOutcome> {
        let mut ctxm = self.ctx.borrow_mut();
        match ctxm.catalog.drop_index(name) {
            Ok(()) => {
                ctxm.drop_index_tree(name);
                Ok(StatementOutcome::rows_only(0))
            }
            Err(e) if if_exists => {
                let _ = e;
                Ok(StatementOutcome::rows_only(0))
            }
            Err(e) => Err(e),
        }
    }

    fn create_view(&mut self, name: &str, query: &crate::ast::Select) -> EngineResult<StatementOutcome> {
        self.ctx.borrow_mut().catalog.create_view(View { name: name.to_string(), query: query.clone() })?;
        Ok(StatementOutcome::rows_only(0))
    }

    fn drop_view(&mut self, name: &str, if_exists: bool) -> EngineResult<StatementOutcome> {
        match self.ctx.borrow_mut().catalog.drop_view(name) {
            Ok(()) => Ok(StatementOutcome::rows_only(0)),
            Err(_) if if_exists => Ok(StatementOutcome::rows_only(0)),
            Err(e) => Err(e),
        }
    }

    fn create_trigger(&mut self, name: &str, table: &str, sql: &str) -> EngineResult<StatementOutcome> {
        self.ctx.borrow().catalog.table(table)?;
        self.ctx
            .borrow_mut()
            .catalog
            .create_trigger(Trigger { name: name.to_string(), table: table.to_string(), sql: sql.to_string() })?;
        Ok(StatementOutcome::rows_only(0))
    }

    fn drop_trigger(&mut self, name: &str, if_exists: bool) -> EngineResult<StatementOutcome> {
        match self.ctx.borrow_mut().catalog.drop_trigger(name) {
            Ok(()) => Ok(StatementOutcome::rows_only(0)),
            Err(_) if if_exists => Ok(StatementOutcome::rows_only(0)),
            Err(e) => Err(e),
        }
    }

    fn create_procedure(&mut self, name: &str, sql: &str) -> EngineResult<StatementOutcome> {
        self.ctx
            .borrow_mut()
            .catalog
            .create_procedure(Procedure { name: name.to_string(), sql: sql.to_string() })?;
        Ok(StatementOutcome::rows_only(0))
    }

    fn drop_procedure(&mut self, name: &str, if_exists: bool) -> EngineResult<StatementOutcome> {
        match self.ctx.borrow_mut().catalog.drop_procedure(name) {
            Ok(()) => Ok(StatementOutcome::rows_only(0)),
            Err(_) if if_exists => Ok(StatementOutcome::rows_only(0)),
            Err(e) => Err(e),
        }
    }

    /// `ADD COLUMN` backfills every existing row with the new column's
    /// default (or Null); `RENAME TO` also moves the table's cached heap
    /// tree handle so it keeps pointing at the same rows (spec §14).
    fn alter_table(&mut self, table: &str, action: &AlterAction) -> EngineResult<StatementOutcome> {
        match action {
            AlterAction::AddColumn(col) => self.add_column(table, col),
            AlterAction::RenameTo(new_name) => {
                self.ctx.borrow_mut().catalog.rename_table(table, new_name.clone())?;
                self.ctx.borrow_mut().rename_table_tree(table, new_name);
                Ok(StatementOutcome::rows_only(0))
            }
        }
    }

    fn add_column(&mut self, table: &str, col: &ColumnDef) -> EngineResult<StatementOutcome> {
        let default = col.default.clone().unwrap_or(Value::Null);
        let mut ctxm = self.ctx.borrow_mut();
        ctxm.catalog.table_mut(table)?.columns.push(col.clone());

        let entries: Vec<(Vec<u8>, Vec<Value>)> = {
            let tree = ctxm.table_tree(table)?;
            let mut cur = tree.cursor();
            let mut out = Vec::new();
            cur.first()?;
            while cur.valid() {
                let mut row = record::decode(cur.value()).unwrap_or_default();
                row.push(default.clone());
                out.push((cur.key().to_vec(), row));
                cur.next()?;
            }
            cur.close();
            out
        };
        let tree = ctxm.table_tree(table)?;
        for (key, row) in &entries {
            tree.insert(key, &record::encode(row))?;
        }
        Ok(StatementOutcome::rows_only(0))
    }

    /// Recomputes the catalog's cached row-count statistic for one table
    /// (or every table) by scanning the heap once (spec §14) — the actual
    /// histogram/sampling algorithm stays an external concern (spec §1).
    fn analyze(&mut self, table: Option<&str>) -> EngineResult<StatementOutcome> {
        let names: Vec<String> = match table {
            Some(t) => vec![t.to_string()],
            None => self.ctx.borrow().catalog.tables().map(|t| t.name.clone()).collect(),
        };
        for name in &names {
            let count = DmlContext::new(self.ctx.clone()).scan_table(name)?.len() as i64;
            self.ctx.borrow_mut().catalog.table_mut(name)?.row_count = count;
        }
        Ok(StatementOutcome::rows_only(names.len() as i64))
    }
}

fn wrap<T>(phase: Phase, result: EngineResult<T>) -> DispatchResult<T> {
    result.map_err(|source| DispatchError::new(phase, source))
}

fn stmt_kind(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::CreateTable(_) => "create_table",
        Stmt::DropTable { .. } => "drop_table",
        Stmt::CreateIndex(_) => "create_index",
        Stmt::DropIndex { .. } => "drop_index",
        Stmt::CreateView { .. } => "create_view",
        Stmt::DropView { .. } => "drop_view",
        Stmt::CreateTrigger { .. } => "create_trigger",
        Stmt::DropTrigger { .. } => "drop_trigger",
        Stmt::CreateProcedure { .. } => "create_procedure",
        Stmt::DropProcedure { .. } => "drop_procedure",
        Stmt::AlterTable(_) => "alter_table",
        Stmt::Insert(_) => "insert",
        Stmt::Select(_) => "select",
        Stmt::Update(_) => "update",
        Stmt::Delete(_) => "delete",
        Stmt::Analyze { .. } => "analyze",
        Stmt::Begin => "begin",
        Stmt::Commit => "commit",
        Stmt::Rollback => "rollback",
        Stmt::Savepoint(_) => "savepoint",
        Stmt::Release(_) => "release",
        Stmt::RollbackTo(_) => "rollback_to",
    }
}
