//! Small index-set utility for tracking which materialized rows have been
//! matched during a join (spec §4.5 NestedLoopJoin/HashJoin outer-join
//! unmatched-row padding), built on `util::bitvec`.

use crate::util::bitvec::Bitvec;

pub struct MatchedSet {
    bits: Box<Bitvec>,
}

impl MatchedSet {
    /// `len` is the number of rows on the side being tracked; `len == 0` is
    /// legal (an empty materialized side never needs marking).
    pub fn new(len: u32) -> Self {
        Self {
            bits: Bitvec::new(len.max(1)),
        }
    }

    pub fn mark(&mut self, index: u32) {
        let _ = self.bits.set(index + 1);
    }

    pub fn is_marked(&self, index: u32) -> bool {
        self.bits.test(index + 1)
    }
}
