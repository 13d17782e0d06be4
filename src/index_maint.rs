//! Secondary index maintenance (spec §4.6).
//!
//! An index entry's key is the concatenated `Value::fingerprint` of its key
//! columns/expressions (so key equality matches grouping equality, Null
//! included) plus, except for the one case below, the row's rowid — the
//! underlying B-tree is a plain ordered key/value store and needs a unique
//! key per entry regardless of the index's own uniqueness constraint.
//!
//! The one case that omits the rowid: a UNIQUE index whose key contains no
//! Null. There the fingerprint alone *is* the key, so a second insert with
//! an equal key collides in the B-tree and is rejected as a UNIQUE
//! violation before it ever lands. A Null key column never participates in
//! uniqueness (spec §4.6), so those rows always get the rowid appended and
//! skip the duplicate check entirely — this is the "unique index allows
//! multiple NULLs" behavior the spec calls out.

use crate::ast::IndexKey;
use crate::btree::BTree;
use crate::errors::{EngineError, EngineResult};
use crate::expr::{self, SubqueryRunner};
use crate::index::Index;
use crate::iter::NameMap;
use crate::record::{self, RowId};
use crate::value::Value;

struct BuiltKey {
    key: Vec<u8>,
    check_duplicate: bool,
}

fn build_key(
    index: &Index,
    row: &[Value],
    names: &NameMap,
    rowid: RowId,
    runner: &mut dyn SubqueryRunner,
) -> EngineResult<Option<BuiltKey>> {
    if let Some(pred) = &index.partial {
        let v = expr::eval(pred, row, names, runner)?;
        if !expr::is_predicate_true(&v) {
            return Ok(None);
        }
    }

    let mut prefix = String::new();
    let mut has_null = false;
    for k in &index.keys {
        let v = match k {
            IndexKey::Column(name) => {
                let idx = names.resolve(name).ok_or_else(|| EngineError::ColumnNotFound(name.clone()))?;
                row.get(idx).cloned().unwrap_or(Value::Null)
            }
            IndexKey::Expr(e) => expr::eval(e, row, names, runner)?,
        };
        has_null = has_null || v.is_null();
        v.fingerprint(&mut prefix);
    }

    let mut key = prefix.into_bytes();
    let check_duplicate = index.unique && !has_null;
    if !check_duplicate {
        key.extend_from_slice(&record::encode_rowid(rowid));
    }
    Ok(Some(BuiltKey { key, check_duplicate }))
}

/// Inserts one row's entry into `index`'s tree. Fails `UniqueViolation` if
/// the index is unique, the row's key has no Null, and an equal key
/// already exists.
pub fn insert_entry(
    tree: &mut dyn BTree,
    index: &Index,
    row: &[Value],
    names: &NameMap,
    rowid: RowId,
    runner: &mut dyn SubqueryRunner,
) -> EngineResult<()> {
    let Some(built) = build_key(index, row, names, rowid, runner)? else {
        return Ok(());
    };
    if built.check_duplicate && tree.get(&built.key)?.is_some() {
        return Err(EngineError::UniqueViolation(index.name.clone()));
    }
    tree.insert(&built.key, &record::encode_rowid(rowid))
}

/// Removes a row's entry, if it has one (a partial index may never have
/// indexed it in the first place).
pub fn delete_entry(
    tree: &mut dyn BTree,
    index: &Index,
    row: &[Value],
    names: &NameMap,
    rowid: RowId,
    runner: &mut dyn SubqueryRunner,
) -> EngineResult<()> {
    if let Some(built) = build_key(index, row, names, rowid, runner)? {
        tree.delete(&built.key)?;
    }
    Ok(())
}

/// CREATE INDEX backfill: indexes every existing row, aborting on the
/// first duplicate (spec §4.6) rather than rolling back partial entries —
/// callers are expected to create the index's tree fresh and discard it on
/// error.
pub fn backfill(
    tree: &mut dyn BTree,
    index: &Index,
    rows: &[(RowId, Vec<Value>)],
    names: &NameMap,
    runner: &mut dyn SubqueryRunner,
) -> EngineResult<()> {
    for (rowid, row) in rows {
        insert_entry(tree, index, row, names, *rowid, runner)?;
    }
    Ok(())
}
