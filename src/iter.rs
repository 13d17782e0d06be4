//! The row iterator contract (spec §4.4) and its output-schema helper.
//!
//! Every operator is a pull-based `RowIter`: `next()` advances, `row()`
//! borrows the current row (valid only until the next `next()`/`close()`),
//! and `close()` releases owned resources and must be idempotent. Callers
//! that need to retain a row across further advances must copy it — the
//! central lifetime rule the spec calls out in §4.4 and §9.

use crate::errors::EngineResult;
use crate::value::Value;
use std::collections::HashMap;

pub trait RowIter {
    fn next(&mut self) -> EngineResult<bool>;
    fn row(&self) -> &[Value];
    fn schema(&self) -> &Schema;
    fn close(&mut self);
}

/// An operator's published output schema: ordered qualified column names
/// (`"<alias>.<col>"` for scans) plus the short-name-if-unique lookup rule
/// (spec §4.4, §9 "Column-name resolution").
#[derive(Clone, Debug, Default)]
pub struct Schema {
    pub names: Vec<String>,
}

impl Schema {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn concat(left: &Schema, right: &Schema) -> Schema {
        let mut names = left.names.clone();
        names.extend(right.names.iter().cloned());
        Schema { names }
    }

    pub fn prefixed(alias: &str, cols: &[String]) -> Schema {
        Schema {
            names: cols.iter().map(|c| format!("{alias}.{c}")).collect(),
        }
    }

    /// Name→index map: every qualified name resolves, and every short
    /// (post-dot) name resolves too *when it is unique* across the
    /// combined schema — ambiguous short names are simply absent, so a
    /// lookup falls through to `AmbiguousColumn` at the call site.
    pub fn name_map(&self) -> NameMap {
        let mut qualified = HashMap::new();
        let mut short_counts: HashMap<String, usize> = HashMap::new();
        let mut short_index: HashMap<String, usize> = HashMap::new();

        for (i, name) in self.names.iter().enumerate() {
            qualified.insert(name.clone(), i);
            let short = short_name(name);
            *short_counts.entry(short.clone()).or_insert(0) += 1;
            short_index.entry(short).or_insert(i);
        }

        let shorts = short_index
            .into_iter()
            .filter(|(s, _)| short_counts.get(s).copied().unwrap_or(0) == 1)
            .collect();

        NameMap { qualified, shorts, short_counts }
    }
}

fn short_name(name: &str) -> String {
    match name.rfind('.') {
        Some(pos) => name[pos + 1..].to_string(),
        None => name.to_string(),
    }
}

pub struct NameMap {
    qualified: HashMap<String, usize>,
    shorts: HashMap<String, usize>,
    short_counts: HashMap<String, usize>,
}

impl NameMap {
    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.qualified.get(name).or_else(|| self.shorts.get(name)).copied()
    }

    /// True when `name` matches more than one column's short name (so
    /// `resolve` returning `None` for it means "ambiguous", not "missing").
    pub fn is_ambiguous(&self, name: &str) -> bool {
        self.short_counts.get(name).copied().unwrap_or(0) > 1
    }
}

/// A fully materialized batch of rows under a fixed schema, used by the
/// plan executor as the common leaf/glue representation between operators
/// (spec §9: every scan is effectively pre-drained in this reference
/// executor, see `plan_exec`'s module doc).
pub struct MemRows {
    schema: Schema,
    rows: Vec<Vec<Value>>,
    pos: usize,
    started: bool,
}

impl MemRows {
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows, pos: 0, started: false }
    }
}

impl RowIter for MemRows {
    fn next(&mut self) -> EngineResult<bool> {
        if !self.started {
            self.started = true;
        } else {
            self.pos += 1;
        }
        Ok(self.pos < self.rows.len())
    }

    fn row(&self) -> &[Value] {
        &self.rows[self.pos]
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn close(&mut self) {
        self.pos = self.rows.len();
    }
}
