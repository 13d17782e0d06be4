//! In-memory `BTreeMap`-backed `BTree`/`BTreeFactory` used by this crate's
//! own test suite (spec §13). Not a production B-tree: no paging, no
//! on-disk format, no WAL — just enough ordered key/value storage to drive
//! the operator library and DML engine end to end in tests.

use std::collections::BTreeMap;

use super::{BTree, BTreeFactory, Cursor};
use crate::errors::EngineResult;
use crate::global::Pgno;

#[derive(Default)]
pub struct MemBTree {
    root_page: Pgno,
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemBTree {
    pub fn new(root_page: Pgno) -> Self {
        Self {
            root_page,
            data: BTreeMap::new(),
        }
    }
}

impl BTree for MemBTree {
    fn root_page(&self) -> Pgno {
        self.root_page
    }

    fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn insert(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> EngineResult<()> {
        self.data.remove(key);
        Ok(())
    }

    fn cursor(&self) -> Box<dyn Cursor + '_> {
        let snapshot: Vec<(Vec<u8>, Vec<u8>)> = self.data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Box::new(MemCursor { entries: snapshot, pos: None })
    }
}

/// Snapshots the map on creation rather than holding a live borrow: a
/// forward cursor over an in-memory reference implementation need not
/// observe concurrent mutation, and this sidesteps borrowing `data` across
/// the `Cursor` trait's `&mut self` methods.
struct MemCursor {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: Option<usize>,
}

impl Cursor for MemCursor {
    fn first(&mut self) -> EngineResult<()> {
        self.pos = if self.entries.is_empty() { None } else { Some(0) };
        Ok(())
    }

    fn valid(&self) -> bool {
        matches!(self.pos, Some(i) if i < self.entries.len())
    }

    fn next(&mut self) -> EngineResult<()> {
        self.pos = match self.pos {
            Some(i) if i + 1 < self.entries.len() => Some(i + 1),
            _ => None,
        };
        Ok(())
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.pos.expect("cursor not valid")].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos.expect("cursor not valid")].1
    }

    fn close(&mut self) {
        self.pos = None;
    }
}

#[derive(Default)]
pub struct MemBTreeFactory {
    next_page: Pgno,
}

impl MemBTreeFactory {
    pub fn new(start_page: Pgno) -> Self {
        Self { next_page: start_page }
    }
}

impl BTreeFactory for MemBTreeFactory {
    fn create(&mut self) -> EngineResult<Box<dyn BTree>> {
        let page = self.next_page;
        self.next_page += 1;
        Ok(Box::new(MemBTree::new(page)))
    }

    fn create_at(&mut self, page: Pgno) -> EngineResult<Box<dyn BTree>> {
        Ok(Box::new(MemBTree::new(page)))
    }

    fn open(&mut self, page: Pgno) -> EngineResult<Box<dyn BTree>> {
        Ok(Box::new(MemBTree::new(page)))
    }
}
