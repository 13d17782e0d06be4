//! The in-memory catalog (spec §3 "Catalog", §6 "Catalog" collaborator,
//! §14 supplemental view/trigger/procedure bookkeeping).
//!
//! A flat name→object map per kind, mirroring the teacher's per-kind hash
//! tables (`tblHash`/`idxHash`/`trigHash`/`fkeyHash`) but as safe owned
//! `HashMap`s instead of intrusive linked structures over raw pointers.

use std::collections::HashMap;

use crate::errors::{EngineError, EngineResult};
use crate::global::Pgno;
use crate::index::Index;
use crate::table::{FkReference, Table};
use crate::trigger::{Procedure, Trigger, View};

#[derive(Default, Clone)]
pub struct Catalog {
    tables: HashMap<String, Table>,
    indexes: HashMap<String, Index>,
    views: HashMap<String, View>,
    triggers: HashMap<String, Trigger>,
    procedures: HashMap<String, Procedure>,
    next_page: Pgno,
}

impl Catalog {
    pub fn new() -> Self {
        // Page 1 is reserved for the persistent catalog root (spec §6).
        Self { next_page: 2, ..Default::default() }
    }

    pub fn allocate_page(&mut self) -> Pgno {
        let p = self.next_page;
        self.next_page += 1;
        p
    }

    // -- Tables --

    pub fn table(&self, name: &str) -> EngineResult<&Table> {
        self.tables.get(name).ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> EngineResult<&mut Table> {
        self.tables.get_mut(name).ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn create_table(&mut self, table: Table) -> EngineResult<()> {
        if self.tables.contains_key(&table.name) {
            return Err(EngineError::TableExists(table.name.clone()));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> EngineResult<()> {
        if !self.tables.contains_key(name) {
            return Err(EngineError::TableNotFound(name.to_string()));
        }
        if let Some(dep) = self.dependents_of_table(name) {
            return Err(EngineError::DependentObjects(name.to_string(), dep));
        }
        self.tables.remove(name);
        self.indexes.retain(|_, ix| ix.table != name);
        Ok(())
    }

    pub fn rename_table(&mut self, old: &str, new: String) -> EngineResult<()> {
        let mut table = self.tables.remove(old).ok_or_else(|| EngineError::TableNotFound(old.to_string()))?;
        table.name = new.clone();
        for ix in self.indexes.values_mut() {
            if ix.table == old {
                ix.table = new.clone();
            }
        }
        self.tables.insert(new, table);
        Ok(())
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    fn dependents_of_table(&self, name: &str) -> Option<String> {
        let referencing: Vec<&str> = self
            .fk_references_to(name)
            .into_iter()
            .map(|r| r.referencing_table.as_str())
            .collect();
        if referencing.is_empty() {
            None
        } else {
            Some(referencing.join(", "))
        }
    }

    // -- Indexes --

    pub fn index(&self, name: &str) -> EngineResult<&Index> {
        self.indexes.get(name).ok_or_else(|| EngineError::IndexNotFound(name.to_string()))
    }

    pub fn create_index(&mut self, index: Index) -> EngineResult<()> {
        if self.indexes.contains_key(&index.name) {
            return Err(EngineError::IndexExists(index.name.clone()));
        }
        self.indexes.insert(index.name.clone(), index);
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> EngineResult<()> {
        self.indexes.remove(name).map(|_| ()).ok_or_else(|| EngineError::IndexNotFound(name.to_string()))
    }

    pub fn indexes_for_table<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Index> {
        self.indexes.values().filter(move |ix| ix.table == table)
    }

    // -- Views --

    pub fn create_view(&mut self, view: View) -> EngineResult<()> {
        if self.views.contains_key(&view.name) {
            return Err(EngineError::ViewExists(view.name.clone()));
        }
        self.views.insert(view.name.clone(), view);
        Ok(())
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.get(name)
    }

    pub fn drop_view(&mut self, name: &str) -> EngineResult<()> {
        self.views.remove(name).map(|_| ()).ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    // -- Triggers --

    pub fn create_trigger(&mut self, trigger: Trigger) -> EngineResult<()> {
        self.triggers.insert(trigger.name.clone(), trigger);
        Ok(())
    }

    pub fn drop_trigger(&mut self, name: &str) -> EngineResult<()> {
        self.triggers.remove(name).map(|_| ()).ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    pub fn triggers_for_table<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Trigger> {
        self.triggers.values().filter(move |t| t.table == table)
    }

    // -- Procedures --

    pub fn create_procedure(&mut self, proc: Procedure) -> EngineResult<()> {
        self.procedures.insert(proc.name.clone(), proc);
        Ok(())
    }

    pub fn drop_procedure(&mut self, name: &str) -> EngineResult<()> {
        self.procedures.remove(name).map(|_| ()).ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    // -- Foreign keys --

    /// All incoming FK references to `table` (spec §4.8), derived from every
    /// other table's FK constraints rather than a separate reverse index —
    /// the catalog is small and read mostly at DDL/DML boundaries.
    pub fn fk_references_to(&self, table: &str) -> Vec<FkReference> {
        use crate::ast::TableConstraint;
        let mut out = Vec::new();
        for t in self.tables.values() {
            for c in &t.constraints {
                if let TableConstraint::ForeignKey { columns, ref_table, ref_columns, on_delete } = c {
                    if ref_table == table {
                        out.push(FkReference {
                            referencing_table: t.name.clone(),
                            columns: columns.clone(),
                            referenced_table: ref_table.clone(),
                            ref_columns: ref_columns.clone(),
                            on_delete: *on_delete,
                        });
                    }
                }
            }
        }
        out
    }
}
