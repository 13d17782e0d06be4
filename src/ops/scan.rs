//! TableScan (spec §4.5): a forward cursor over a table's heap B-tree,
//! decoding each record and surfacing it in rowid order. No filtering; a
//! `Filter` operator sits on top when the query needs one.

use crate::btree::{BTree, Cursor};
use crate::errors::EngineResult;
use crate::iter::{RowIter, Schema};
use crate::record;
use crate::value::Value;

pub struct TableScan<'a> {
    cursor: Box<dyn Cursor + 'a>,
    schema: Schema,
    row: Vec<Value>,
    started: bool,
}

impl<'a> TableScan<'a> {
    pub fn new(tree: &'a dyn BTree, alias: &str, column_names: &[String]) -> Self {
        Self {
            cursor: tree.cursor(),
            schema: Schema::prefixed(alias, column_names),
            row: Vec::new(),
            started: false,
        }
    }
}

impl<'a> RowIter for TableScan<'a> {
    fn next(&mut self) -> EngineResult<bool> {
        if !self.started {
            self.started = true;
            self.cursor.first()?;
        } else {
            self.cursor.next()?;
        }
        if !self.cursor.valid() {
            self.row.clear();
            return Ok(false);
        }
        self.row = record::decode(self.cursor.value()).unwrap_or_default();
        Ok(true)
    }

    fn row(&self) -> &[Value] {
        &self.row
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn close(&mut self) {
        self.cursor.close();
    }
}
