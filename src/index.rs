//! Secondary index catalog objects (spec §3 "Index", §4.6 key encoding).

use crate::ast::{Expr, IndexKey};
use crate::global::Pgno;

#[derive(Clone, Debug)]
pub struct Index {
    pub name: String,
    pub table: String,
    pub unique: bool,
    pub keys: Vec<IndexKey>,
    /// WHERE-clause predicate for a partial index, if any (spec §4.6).
    pub partial: Option<Expr>,
    pub root_page: Pgno,
}

impl Index {
    pub fn new(name: String, table: String, unique: bool, keys: Vec<IndexKey>, partial: Option<Expr>, root_page: Pgno) -> Self {
        Self {
            name,
            table,
            unique,
            keys,
            partial,
            root_page,
        }
    }

    pub fn key_column_names(&self) -> Vec<&str> {
        self.keys
            .iter()
            .filter_map(|k| match k {
                IndexKey::Column(c) => Some(c.as_str()),
                IndexKey::Expr(_) => None,
            })
            .collect()
    }
}
