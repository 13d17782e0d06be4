//! End-to-end scenarios and boundary properties over the public `Engine`
//! entry point, using the in-memory reference B-tree (`btree::reference`)
//! the way an embedder's own pager/B-tree would be plugged in.

use std::collections::HashSet;

use reldb_core::ast::*;
use reldb_core::btree::reference::MemBTreeFactory;
use reldb_core::dispatcher::Engine;
use reldb_core::errors::{EngineError, EngineResult};
use reldb_core::schema::Catalog;
use reldb_core::txn::{TransactionManager, TxHandle};
use reldb_core::value::Value;
use reldb_core::EngineConfig;

/// A transaction manager that just hands out monotonic handles; the
/// WAL/MVCC mechanics behind BEGIN/COMMIT/ROLLBACK are out of scope for
/// this crate (spec §1) and have no bearing on the scenarios below.
#[derive(Default)]
struct NoopTxnManager {
    next: TxHandle,
    active: HashSet<TxHandle>,
}

impl TransactionManager for NoopTxnManager {
    fn begin(&mut self) -> EngineResult<TxHandle> {
        self.next += 1;
        self.active.insert(self.next);
        Ok(self.next)
    }
    fn commit(&mut self, tx: TxHandle) -> EngineResult<()> {
        self.active.remove(&tx);
        Ok(())
    }
    fn rollback(&mut self, tx: TxHandle) -> EngineResult<()> {
        self.active.remove(&tx);
        Ok(())
    }
    fn is_active(&self, tx: TxHandle) -> bool {
        self.active.contains(&tx)
    }
    fn savepoint(&mut self, _tx: TxHandle, _name: &str) -> EngineResult<()> {
        Ok(())
    }
    fn release(&mut self, _tx: TxHandle, _name: &str) -> EngineResult<()> {
        Ok(())
    }
    fn rollback_to(&mut self, _tx: TxHandle, _name: &str) -> EngineResult<()> {
        Ok(())
    }
}

fn engine() -> Engine<NoopTxnManager> {
    Engine::new(Catalog::new(), Box::new(MemBTreeFactory::new(2)), EngineConfig::default(), NoopTxnManager::default())
}

fn column(name: &str, not_null: bool) -> ColumnDef {
    ColumnDef { name: name.to_string(), ty: ColumnType::Int, not_null, default: None, vector_dim: None }
}

fn text_column(name: &str) -> ColumnDef {
    ColumnDef { name: name.to_string(), ty: ColumnType::Text, not_null: false, default: None, vector_dim: None }
}

fn create_table(name: &str, columns: Vec<ColumnDef>, constraints: Vec<TableConstraint>) -> Stmt {
    Stmt::CreateTable(CreateTable { name: name.to_string(), if_not_exists: false, columns, constraints })
}

fn insert_values(table: &str, rows: Vec<Vec<Expr>>) -> Stmt {
    Stmt::Insert(Insert { table: table.to_string(), columns: None, source: InsertSource::Values(rows) })
}

fn lit_int(n: i64) -> Expr {
    Expr::Literal(Value::Int(n))
}

fn core(from: Option<FromItem>, filter: Option<Expr>, projection: Vec<SelectItem>) -> SelectCore {
    SelectCore { distinct: false, projection, from, filter, group_by: Vec::new(), having: None }
}

fn wildcard_select_from(table: &str) -> Select {
    Select {
        with: Vec::new(),
        body: SelectBody::Query(core(Some(FromItem::Table { name: table.to_string(), alias: None }), None, vec![SelectItem::Wildcard])),
        order_by: Vec::new(),
        limit: None,
        offset: None,
    }
}

fn run_select(engine: &mut Engine<NoopTxnManager>, select: Select) -> (Vec<String>, Vec<Vec<Value>>) {
    let out = engine.execute(&Stmt::Select(select)).expect("select should succeed");
    (out.columns, out.rows)
}

// -- Scenario 1: unique index allows multiple Nulls --

#[test]
fn unique_index_allows_multiple_nulls_but_rejects_duplicate_values() {
    let mut e = engine();
    e.execute(&create_table("u", vec![column("id", false), text_column("email")], Vec::new())).unwrap();
    e.execute(&Stmt::CreateIndex(CreateIndex {
        name: "ix_email".to_string(),
        table: "u".to_string(),
        unique: true,
        if_not_exists: false,
        columns: vec![IndexKey::Column("email".to_string())],
        partial: None,
    }))
    .unwrap();

    for (id, email) in [(1, None), (2, None), (3, None)] {
        let email_expr = match email {
            Some(s) => Expr::Literal(Value::Text(s)),
            None => Expr::Literal(Value::Null),
        };
        e.execute(&insert_values("u", vec![vec![lit_int(id), email_expr]])).unwrap();
    }

    e.execute(&insert_values("u", vec![vec![lit_int(4), Expr::Literal(Value::Text("a".to_string()))]])).unwrap();
    let err = e
        .execute(&insert_values("u", vec![vec![lit_int(5), Expr::Literal(Value::Text("a".to_string()))]]))
        .unwrap_err();
    assert!(matches!(err.source, EngineError::UniqueViolation(_)));

    let (_, rows) = run_select(&mut e, wildcard_select_from("u"));
    assert_eq!(rows.len(), 4);
}

// -- Scenario 2: correlated EXISTS --

#[test]
fn correlated_exists_matches_rows_present_in_the_other_table() {
    let mut e = engine();
    e.execute(&create_table("a", vec![column("x", false)], Vec::new())).unwrap();
    e.execute(&create_table("b", vec![column("y", false)], Vec::new())).unwrap();
    e.execute(&insert_values("a", vec![vec![lit_int(1)], vec![lit_int(2)], vec![lit_int(3)]])).unwrap();
    e.execute(&insert_values("b", vec![vec![lit_int(2)], vec![lit_int(3)], vec![lit_int(4)]])).unwrap();

    let inner = Select {
        with: Vec::new(),
        body: SelectBody::Query(core(
            Some(FromItem::Table { name: "b".to_string(), alias: None }),
            Some(Expr::Binary(BinOp::Eq, Box::new(Expr::Column("b.y".to_string())), Box::new(Expr::Column("a.x".to_string())))),
            vec![SelectItem::Expr { expr: lit_int(1), alias: None }],
        )),
        order_by: Vec::new(),
        limit: None,
        offset: None,
    };
    let select = Select {
        with: Vec::new(),
        body: SelectBody::Query(core(
            Some(FromItem::Table { name: "a".to_string(), alias: None }),
            Some(Expr::Exists { query: Box::new(inner), negated: false }),
            vec![SelectItem::Expr { expr: Expr::Column("x".to_string()), alias: None }],
        )),
        order_by: Vec::new(),
        limit: None,
        offset: None,
    };

    let (_, rows) = run_select(&mut e, select);
    let xs: Vec<i64> = rows.iter().map(|r| r[0].as_int().unwrap()).collect();
    assert_eq!(xs, vec![2, 3]);
}

// -- Scenario 3: recursive CTE counter --

#[test]
fn recursive_cte_counts_one_through_five() {
    let mut e = engine();
    let anchor = SelectBody::Query(core(None, None, vec![SelectItem::Expr { expr: lit_int(1), alias: Some("n".to_string()) }]));
    let recursive_term = SelectBody::Query(core(
        Some(FromItem::Cte { name: "c".to_string(), alias: None }),
        Some(Expr::Binary(BinOp::Lt, Box::new(Expr::Column("n".to_string())), Box::new(lit_int(5)))),
        vec![SelectItem::Expr {
            expr: Expr::Binary(BinOp::Add, Box::new(Expr::Column("n".to_string())), Box::new(lit_int(1))),
            alias: Some("n".to_string()),
        }],
    ));
    let select = Select {
        with: vec![CteDef {
            name: "c".to_string(),
            columns: vec!["n".to_string()],
            recursive: true,
            anchor: Box::new(anchor),
            recursive_term: Some(Box::new(recursive_term)),
        }],
        body: SelectBody::Query(core(Some(FromItem::Cte { name: "c".to_string(), alias: None }), None, vec![SelectItem::Wildcard])),
        order_by: vec![OrderKey { expr: Expr::Column("n".to_string()), desc: false }],
        limit: None,
        offset: None,
    };

    let (_, rows) = run_select(&mut e, select);
    let ns: Vec<i64> = rows.iter().map(|r| r[0].as_int().unwrap()).collect();
    assert_eq!(ns, vec![1, 2, 3, 4, 5]);
}

// -- Scenario 4: hash aggregate with HAVING --

#[test]
fn hash_aggregate_with_having_keeps_groups_of_at_least_two() {
    let mut e = engine();
    e.execute(&create_table("s", vec![text_column("r"), column("v", false)], Vec::new())).unwrap();
    let row = |r: &str, v: i64| vec![Expr::Literal(Value::Text(r.to_string())), lit_int(v)];
    e.execute(&insert_values(
        "s",
        vec![row("N", 100), row("N", 200), row("S", 50), row("N", 150), row("E", 300), row("E", 400)],
    ))
    .unwrap();

    let select = Select {
        with: Vec::new(),
        body: SelectBody::Query(SelectCore {
            distinct: false,
            projection: vec![
                SelectItem::Expr { expr: Expr::Column("r".to_string()), alias: None },
                SelectItem::Expr { expr: Expr::FuncCall { name: "COUNT".to_string(), args: Vec::new(), star: true }, alias: Some("n".to_string()) },
            ],
            from: Some(FromItem::Table { name: "s".to_string(), alias: None }),
            filter: None,
            group_by: vec![Expr::Column("r".to_string())],
            having: Some(Expr::Binary(
                BinOp::Ge,
                Box::new(Expr::FuncCall { name: "COUNT".to_string(), args: Vec::new(), star: true }),
                Box::new(lit_int(2)),
            )),
        }),
        order_by: vec![OrderKey { expr: Expr::Column("r".to_string()), desc: false }],
        limit: None,
        offset: None,
    };

    let (_, rows) = run_select(&mut e, select);
    let groups: Vec<(String, i64)> = rows.iter().map(|r| (r[0].as_text().unwrap().to_string(), r[1].as_int().unwrap())).collect();
    assert_eq!(groups, vec![("E".to_string(), 2), ("N".to_string(), 3)]);
}

// -- Scenario 5: FK cascade on delete --

#[test]
fn fk_cascade_delete_removes_matching_children() {
    let mut e = engine();
    e.execute(&create_table("p", vec![column("id", true)], vec![TableConstraint::PrimaryKey(vec!["id".to_string()])])).unwrap();
    e.execute(&create_table(
        "c",
        vec![column("id", true), column("pid", false)],
        vec![TableConstraint::ForeignKey {
            columns: vec!["pid".to_string()],
            ref_table: "p".to_string(),
            ref_columns: vec!["id".to_string()],
            on_delete: FkAction::Cascade,
        }],
    ))
    .unwrap();
    e.execute(&insert_values("p", vec![vec![lit_int(1)], vec![lit_int(2)], vec![lit_int(3)]])).unwrap();
    e.execute(&insert_values(
        "c",
        vec![vec![lit_int(1), lit_int(1)], vec![lit_int(2), lit_int(1)], vec![lit_int(3), lit_int(2)], vec![lit_int(4), lit_int(3)]],
    ))
    .unwrap();

    let out = e
        .execute(&Stmt::Delete(Delete {
            table: "p".to_string(),
            filter: Some(Expr::InList { expr: Box::new(Expr::Column("id".to_string())), list: vec![lit_int(1), lit_int(3)], negated: false }),
        }))
        .unwrap();
    assert_eq!(out.rows_affected, 2);

    let (_, c_rows) = run_select(&mut e, wildcard_select_from("c"));
    let ids: Vec<i64> = c_rows.iter().map(|r| r[0].as_int().unwrap()).collect();
    assert_eq!(ids, vec![3]);
}

// -- Scenario 6: union with Null dedup --

fn select_null() -> SelectBody {
    SelectBody::Query(core(None, None, vec![SelectItem::Expr { expr: Expr::Literal(Value::Null), alias: None }]))
}

#[test]
fn union_dedups_null_rows_union_all_does_not() {
    let mut e = engine();
    let union = Select {
        with: Vec::new(),
        body: SelectBody::SetOp { op: SetOp::Union, all: false, left: Box::new(select_null()), right: Box::new(select_null()) },
        order_by: Vec::new(),
        limit: None,
        offset: None,
    };
    let (_, rows) = run_select(&mut e, union);
    assert_eq!(rows.len(), 1);

    let union_all = Select {
        with: Vec::new(),
        body: SelectBody::SetOp { op: SetOp::Union, all: true, left: Box::new(select_null()), right: Box::new(select_null()) },
        order_by: Vec::new(),
        limit: None,
        offset: None,
    };
    let (_, rows) = run_select(&mut e, union_all);
    assert_eq!(rows.len(), 2);
}

// -- Boundary behaviors --

#[test]
fn limit_zero_returns_no_rows() {
    let mut e = engine();
    e.execute(&create_table("t", vec![column("a", false)], Vec::new())).unwrap();
    e.execute(&insert_values("t", vec![vec![lit_int(1)], vec![lit_int(2)]])).unwrap();

    let mut select = wildcard_select_from("t");
    select.limit = Some(lit_int(0));
    let (_, rows) = run_select(&mut e, select);
    assert!(rows.is_empty());
}

#[test]
fn offset_past_end_returns_no_rows() {
    let mut e = engine();
    e.execute(&create_table("t", vec![column("a", false)], Vec::new())).unwrap();
    e.execute(&insert_values("t", vec![vec![lit_int(1)], vec![lit_int(2)]])).unwrap();

    let mut select = wildcard_select_from("t");
    select.offset = Some(lit_int(10));
    let (_, rows) = run_select(&mut e, select);
    assert!(rows.is_empty());
}

#[test]
fn division_by_zero_yields_null_not_an_error() {
    let mut e = engine();
    let select = Select {
        with: Vec::new(),
        body: SelectBody::Query(core(
            None,
            None,
            vec![SelectItem::Expr { expr: Expr::Binary(BinOp::Div, Box::new(lit_int(1)), Box::new(lit_int(0))), alias: None }],
        )),
        order_by: Vec::new(),
        limit: None,
        offset: None,
    };
    let (_, rows) = run_select(&mut e, select);
    assert_eq!(rows.len(), 1);
    assert!(rows[0][0].is_null());
}

#[test]
fn scalar_subquery_returning_multiple_rows_fails_cardinality_check() {
    let mut e = engine();
    e.execute(&create_table("t", vec![column("a", false)], Vec::new())).unwrap();
    e.execute(&insert_values("t", vec![vec![lit_int(1)], vec![lit_int(2)]])).unwrap();

    let sub = Select {
        with: Vec::new(),
        body: SelectBody::Query(core(Some(FromItem::Table { name: "t".to_string(), alias: None }), None, vec![SelectItem::Expr { expr: Expr::Column("a".to_string()), alias: None }])),
        order_by: Vec::new(),
        limit: None,
        offset: None,
    };
    let select = Select {
        with: Vec::new(),
        body: SelectBody::Query(core(None, None, vec![SelectItem::Expr { expr: Expr::ScalarSubquery(Box::new(sub)), alias: None }])),
        order_by: Vec::new(),
        limit: None,
        offset: None,
    };
    let err = e.execute(&Stmt::Select(select)).unwrap_err();
    assert!(matches!(err.source, EngineError::ScalarSubqueryCardinality));
}

#[test]
fn recursive_cte_past_the_guard_fails_recursion_limit() {
    let mut e = engine();
    let anchor = SelectBody::Query(core(None, None, vec![SelectItem::Expr { expr: lit_int(1), alias: Some("n".to_string()) }]));
    let recursive_term = SelectBody::Query(core(
        Some(FromItem::Cte { name: "c".to_string(), alias: None }),
        None,
        vec![SelectItem::Expr {
            expr: Expr::Binary(BinOp::Add, Box::new(Expr::Column("n".to_string())), Box::new(lit_int(1))),
            alias: Some("n".to_string()),
        }],
    ));
    let select = Select {
        with: vec![CteDef {
            name: "c".to_string(),
            columns: vec!["n".to_string()],
            recursive: true,
            anchor: Box::new(anchor),
            recursive_term: Some(Box::new(recursive_term)),
        }],
        body: SelectBody::Query(core(Some(FromItem::Cte { name: "c".to_string(), alias: None }), None, vec![SelectItem::Wildcard])),
        order_by: Vec::new(),
        limit: None,
        offset: None,
    };
    let err = e.execute(&Stmt::Select(select)).unwrap_err();
    assert!(matches!(err.source, EngineError::RecursionLimit(_)));
}

#[test]
fn where_null_returns_no_rows() {
    let mut e = engine();
    e.execute(&create_table("t", vec![column("a", false)], Vec::new())).unwrap();
    e.execute(&insert_values("t", vec![vec![lit_int(1)]])).unwrap();

    let select = Select {
        with: Vec::new(),
        body: SelectBody::Query(core(Some(FromItem::Table { name: "t".to_string(), alias: None }), Some(Expr::Literal(Value::Null)), vec![SelectItem::Wildcard])),
        order_by: Vec::new(),
        limit: None,
        offset: None,
    };
    let (_, rows) = run_select(&mut e, select);
    assert!(rows.is_empty());
}

#[test]
fn next_rowid_tracks_successful_insert_count() {
    let mut e = engine();
    e.execute(&create_table("t", vec![column("a", false)], Vec::new())).unwrap();
    e.execute(&insert_values("t", vec![vec![lit_int(1)], vec![lit_int(2)], vec![lit_int(3)]])).unwrap();
    let (_, rows) = run_select(&mut e, wildcard_select_from("t"));
    assert_eq!(rows.len(), 3);

    e.execute(&insert_values("t", vec![vec![lit_int(4)]])).unwrap();
    let out = e
        .execute(&Stmt::Insert(Insert {
            table: "t".to_string(),
            columns: None,
            source: InsertSource::Values(vec![vec![lit_int(5)]]),
        }))
        .unwrap();
    assert_eq!(out.rows_affected, 1);
}
