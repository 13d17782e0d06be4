//! Foreign-key enforcement on delete (spec §4.8).
//!
//! Decoupled from the storage layer via `HeapStore`, the same way
//! `expr::SubqueryRunner` decouples the evaluator from plan execution;
//! `dml::DmlContext` implements it so CASCADE can recursively re-run this
//! whole protocol against rows it deletes.

use crate::ast::FkAction;
use crate::errors::{EngineError, EngineResult};
use crate::record::RowId;
use crate::schema::Catalog;
use crate::value::Value;

pub trait HeapStore {
    fn scan_table(&mut self, table: &str) -> EngineResult<Vec<(RowId, Vec<Value>)>>;
    fn delete_row(&mut self, table: &str, rowid: RowId) -> EngineResult<()>;
    fn update_row(&mut self, table: &str, rowid: RowId, new_values: Vec<Value>) -> EngineResult<()>;
    fn column_index(&self, table: &str, column: &str) -> EngineResult<usize>;
    fn default_value(&self, table: &str, column: &str) -> EngineResult<Value>;
}

/// For every incoming FK reference to `table`, scans the referencing
/// table for rows whose FK column equals the value being deleted from
/// `deleted_row`, and applies NO ACTION/RESTRICT/CASCADE/SET NULL/SET
/// DEFAULT. CASCADE recurses depth-first before deleting the cascaded row,
/// so it sees a consistent store at each step.
pub fn enforce_on_delete(
    catalog: &Catalog,
    store: &mut dyn HeapStore,
    table: &str,
    deleted_row: &[Value],
) -> EngineResult<()> {
    let referenced = catalog.table(table)?;

    for fk in catalog.fk_references_to(table) {
        let rows = store.scan_table(&fk.referencing_table)?;
        for (rowid, row) in rows {
            let is_match = fk
                .ref_columns
                .iter()
                .zip(fk.columns.iter())
                .all(|(ref_col, local_col)| {
                    let ref_idx = match referenced.column_index(ref_col) {
                        Some(i) => i,
                        None => return false,
                    };
                    let local_idx = match store.column_index(&fk.referencing_table, local_col) {
                        Ok(i) => i,
                        Err(_) => return false,
                    };
                    let deleted_value = &deleted_row[ref_idx];
                    let referencing_value = &row[local_idx];
                    matches!(deleted_value.sql_eq(referencing_value), Some(true))
                });
            if !is_match {
                continue;
            }

            match fk.on_delete {
                FkAction::NoAction | FkAction::Restrict => {
                    return Err(EngineError::ForeignKeyViolation {
                        referencing_table: fk.referencing_table.clone(),
                        action: action_name(fk.on_delete).to_string(),
                    });
                }
                FkAction::Cascade => {
                    enforce_on_delete(catalog, store, &fk.referencing_table, &row)?;
                    store.delete_row(&fk.referencing_table, rowid)?;
                }
                FkAction::SetNull => {
                    let mut new_row = row.clone();
                    for local_col in &fk.columns {
                        let idx = store.column_index(&fk.referencing_table, local_col)?;
                        new_row[idx] = Value::Null;
                    }
                    store.update_row(&fk.referencing_table, rowid, new_row)?;
                }
                FkAction::SetDefault => {
                    let mut new_row = row.clone();
                    for local_col in &fk.columns {
                        let idx = store.column_index(&fk.referencing_table, local_col)?;
                        new_row[idx] = store.default_value(&fk.referencing_table, local_col)?;
                    }
                    store.update_row(&fk.referencing_table, rowid, new_row)?;
                }
            }
        }
    }
    Ok(())
}

fn action_name(action: FkAction) -> &'static str {
    match action {
        FkAction::NoAction => "NO ACTION",
        FkAction::Restrict => "RESTRICT",
        FkAction::Cascade => "CASCADE",
        FkAction::SetNull => "SET NULL",
        FkAction::SetDefault => "SET DEFAULT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ColumnDef, ColumnType, TableConstraint};
    use crate::table::Table;
    use std::collections::HashMap;

    struct FakeStore {
        tables: HashMap<String, Vec<(RowId, Vec<Value>)>>,
        columns: HashMap<String, Vec<String>>,
    }

    impl HeapStore for FakeStore {
        fn scan_table(&mut self, table: &str) -> EngineResult<Vec<(RowId, Vec<Value>)>> {
            Ok(self.tables.get(table).cloned().unwrap_or_default())
        }
        fn delete_row(&mut self, table: &str, rowid: RowId) -> EngineResult<()> {
            if let Some(rows) = self.tables.get_mut(table) {
                rows.retain(|(r, _)| *r != rowid);
            }
            Ok(())
        }
        fn update_row(&mut self, table: &str, rowid: RowId, new_values: Vec<Value>) -> EngineResult<()> {
            if let Some(rows) = self.tables.get_mut(table) {
                if let Some(entry) = rows.iter_mut().find(|(r, _)| *r == rowid) {
                    entry.1 = new_values;
                }
            }
            Ok(())
        }
        fn column_index(&self, table: &str, column: &str) -> EngineResult<usize> {
            self.columns
                .get(table)
                .and_then(|cols| cols.iter().position(|c| c == column))
                .ok_or_else(|| EngineError::ColumnNotFound(column.to_string()))
        }
        fn default_value(&self, _table: &str, _column: &str) -> EngineResult<Value> {
            Ok(Value::Null)
        }
    }

    fn make_catalog() -> Catalog {
        let mut cat = Catalog::new();
        cat.create_table(Table::new(
            "p".to_string(),
            vec![ColumnDef { name: "id".to_string(), ty: ColumnType::Int, not_null: true, default: None, vector_dim: None }],
            vec![TableConstraint::PrimaryKey(vec!["id".to_string()])],
            cat_dummy_page(),
        ))
        .unwrap();
        cat.create_table(Table::new(
            "c".to_string(),
            vec![
                ColumnDef { name: "id".to_string(), ty: ColumnType::Int, not_null: true, default: None, vector_dim: None },
                ColumnDef { name: "pid".to_string(), ty: ColumnType::Int, not_null: false, default: None, vector_dim: None },
            ],
            vec![TableConstraint::ForeignKey {
                columns: vec!["pid".to_string()],
                ref_table: "p".to_string(),
                ref_columns: vec!["id".to_string()],
                on_delete: FkAction::Cascade,
            }],
            cat_dummy_page(),
        ))
        .unwrap();
        cat
    }

    fn cat_dummy_page() -> u32 {
        2
    }

    #[test]
    fn cascade_deletes_referencing_rows() {
        let catalog = make_catalog();
        let mut store = FakeStore {
            tables: HashMap::from([(
                "c".to_string(),
                vec![
                    (1, vec![Value::Int(1), Value::Int(1)]),
                    (2, vec![Value::Int(2), Value::Int(1)]),
                    (3, vec![Value::Int(3), Value::Int(2)]),
                ],
            )]),
            columns: HashMap::from([("c".to_string(), vec!["id".to_string(), "pid".to_string()])]),
        };
        enforce_on_delete(&catalog, &mut store, "p", &[Value::Int(1)]).unwrap();
        let remaining = store.tables.get("c").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].0, 3);
    }

    #[test]
    fn restrict_fails_when_child_exists() {
        let catalog = make_catalog_with_restrict();
        let mut store = FakeStore {
            tables: HashMap::from([("c".to_string(), vec![(1, vec![Value::Int(1), Value::Int(1)])])]),
            columns: HashMap::from([("c".to_string(), vec!["id".to_string(), "pid".to_string()])]),
        };
        let err = enforce_on_delete(&catalog, &mut store, "p", &[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, EngineError::ForeignKeyViolation { .. }));
    }

    fn make_catalog_with_restrict() -> Catalog {
        let mut cat = Catalog::new();
        cat.create_table(Table::new(
            "p".to_string(),
            vec![ColumnDef { name: "id".to_string(), ty: ColumnType::Int, not_null: true, default: None, vector_dim: None }],
            vec![TableConstraint::PrimaryKey(vec!["id".to_string()])],
            2,
        ))
        .unwrap();
        cat.create_table(Table::new(
            "c".to_string(),
            vec![
                ColumnDef { name: "id".to_string(), ty: ColumnType::Int, not_null: true, default: None, vector_dim: None },
                ColumnDef { name: "pid".to_string(), ty: ColumnType::Int, not_null: false, default: None, vector_dim: None },
            ],
            vec![TableConstraint::ForeignKey {
                columns: vec!["pid".to_string()],
                ref_table: "p".to_string(),
                ref_columns: vec!["id".to_string()],
                on_delete: FkAction::Restrict,
            }],
            3,
        ))
        .unwrap();
        cat
    }
}
