//! Engine-wide constants and the knobs the core itself owns.
//!
//! This is deliberately small: file/env configuration loading belongs to the
//! outer layers (spec §1), but the recursion guard and similar parameters
//! are the core's own behavior, not configuration of it.

/// Page number, as used by the `Pager`/`BTree` collaborator traits.
pub type Pgno = u32;

/// Parameters of the executor itself.
#[derive(Copy, Clone, Debug)]
pub struct EngineConfig {
    /// Recursive CTE fixpoint round guard (spec §4.5 CTEScan).
    pub recursion_limit: u32,
    /// Sanity bound on `Vector` dimension to reject corrupt/malicious blobs
    /// before they drive an allocation.
    pub max_vector_dim: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 100,
            max_vector_dim: 1 << 16,
        }
    }
}
