//! Table catalog objects (spec §3 "Table").

use crate::ast::{ColumnDef, FkAction, TableConstraint};
use crate::global::Pgno;

#[derive(Clone, Debug)]
pub struct Table {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<TableConstraint>,
    /// Root page of this table's heap B-tree.
    pub root_page: Pgno,
    /// Next rowid to assign; persists across restarts, reset on TRUNCATE.
    pub next_rowid: i64,
    /// Cached row-count statistic, maintained incrementally by the DML
    /// engine and recomputed wholesale by ANALYZE.
    pub row_count: i64,
}

impl Table {
    pub fn new(name: String, columns: Vec<ColumnDef>, constraints: Vec<TableConstraint>, root_page: Pgno) -> Self {
        Self {
            name,
            columns,
            constraints,
            root_page,
            next_rowid: 1,
            row_count: 0,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Allocate the next rowid, incrementing the counter (spec §3, §8:
    /// `next_rowid` after `n` successful inserts is `start + n`).
    pub fn take_next_rowid(&mut self) -> i64 {
        let rowid = self.next_rowid;
        self.next_rowid += 1;
        rowid
    }

    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.constraints
            .iter()
            .find_map(|c| match c {
                TableConstraint::PrimaryKey(cols) => Some(cols.iter().map(String::as_str).collect()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &TableConstraint> {
        self.constraints.iter().filter(|c| matches!(c, TableConstraint::ForeignKey { .. }))
    }
}

/// Incoming FK reference used by delete enforcement (spec §4.8):
/// `referencing_table.columns` point at `referenced_table.ref_columns`.
#[derive(Clone, Debug)]
pub struct FkReference {
    pub referencing_table: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub ref_columns: Vec<String>,
    pub on_delete: FkAction,
}
