//! Stable error taxonomy for the query execution core (spec §7).
//!
//! Every error carries a stable kind plus a human-readable detail string.
//! The dispatcher wraps these with a `Phase` tag rather than relying on
//! string prefixes, so callers can match on the phase programmatically.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // -- Schema --
    #[error("no such table: {0}")]
    TableNotFound(String),
    #[error("table {0} already exists")]
    TableExists(String),
    #[error("no such column: {0}")]
    ColumnNotFound(String),
    #[error("no such index: {0}")]
    IndexNotFound(String),
    #[error("index {0} already exists")]
    IndexExists(String),
    #[error("view {0} already exists")]
    ViewExists(String),
    #[error("cannot drop {0}: other objects depend on it ({1})")]
    DependentObjects(String, String),

    // -- Constraint --
    #[error("NOT NULL constraint failed: {0}")]
    NotNullViolation(String),
    #[error("UNIQUE constraint failed: {0}")]
    UniqueViolation(String),
    #[error("CHECK constraint failed: {1}")]
    CheckViolation(Option<String>, String),
    #[error("FOREIGN KEY constraint failed: referencing table {referencing_table} ({action})")]
    ForeignKeyViolation {
        referencing_table: String,
        action: String,
    },
    #[error("PRIMARY KEY constraint failed")]
    PrimaryKeyViolation,

    // -- Type --
    #[error("type mismatch on {column}: expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: String,
        got: String,
    },
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    VectorDimension { expected: u32, got: u32 },
    #[error("invalid vector blob")]
    InvalidVectorBlob,

    // -- Query --
    #[error("more than one row returned by a subquery used as an expression")]
    ScalarSubqueryCardinality,
    #[error("recursion limit ({0}) exceeded in recursive CTE")]
    RecursionLimit(u32),
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),
    #[error("ambiguous column name: {0}")]
    AmbiguousColumn(String),
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    // -- Transaction --
    #[error("cannot start a transaction within a transaction")]
    NestedTransaction,
    #[error("no transaction is active")]
    NoActiveTransaction,
    #[error("no such savepoint: {0}")]
    SavepointNotFound(String),
}

/// Phase tag the statement dispatcher wraps errors with (spec §7).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Parse,
    BuildPlan,
    Execution,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Parse => "parse",
            Phase::BuildPlan => "build plan",
            Phase::Execution => "execution",
        };
        write!(f, "{s}")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{phase}: {source}")]
pub struct DispatchError {
    pub phase: Phase,
    #[source]
    pub source: EngineError,
}

impl DispatchError {
    pub fn new(phase: Phase, source: EngineError) -> Self {
        Self { phase, source }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
