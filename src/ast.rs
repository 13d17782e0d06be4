//! The statement and expression AST this core consumes (spec §6).
//!
//! SQL lexing and parsing are out of scope (spec §1); callers hand us an
//! already-built tree. This module only declares the shape of that tree —
//! exhaustively enough for the dispatcher (`dispatcher.rs`) to route every
//! variant and for the plan executor to build an operator tree from a
//! `Select`.

use crate::value::Value;

#[derive(Clone, Debug)]
pub enum Stmt {
    CreateTable(CreateTable),
    DropTable { name: String, if_exists: bool },
    CreateIndex(CreateIndex),
    DropIndex { name: String, if_exists: bool },
    CreateView { name: String, query: Select },
    DropView { name: String, if_exists: bool, cascade: bool },
    CreateTrigger { name: String, table: String, sql: String },
    DropTrigger { name: String, if_exists: bool },
    CreateProcedure { name: String, sql: String },
    DropProcedure { name: String, if_exists: bool },
    AlterTable(AlterTable),
    Insert(Insert),
    Select(Select),
    Update(Update),
    Delete(Delete),
    Analyze { table: Option<String> },
    Begin,
    Commit,
    Rollback,
    Savepoint(String),
    Release(String),
    RollbackTo(String),
}

#[derive(Clone, Debug)]
pub struct CreateTable {
    pub name: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<TableConstraint>,
}

#[derive(Clone, Debug)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub not_null: bool,
    pub default: Option<Value>,
    pub vector_dim: Option<u32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Text,
    Blob,
    Vector,
}

#[derive(Clone, Debug)]
pub enum TableConstraint {
    PrimaryKey(Vec<String>),
    Unique(Vec<String>),
    Check(Expr),
    ForeignKey {
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
        on_delete: FkAction,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FkAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

#[derive(Clone, Debug)]
pub struct AlterTable {
    pub table: String,
    pub action: AlterAction,
}

#[derive(Clone, Debug)]
pub enum AlterAction {
    AddColumn(ColumnDef),
    RenameTo(String),
}

#[derive(Clone, Debug)]
pub struct CreateIndex {
    pub name: String,
    pub table: String,
    pub unique: bool,
    pub if_not_exists: bool,
    pub columns: Vec<IndexKey>,
    pub partial: Option<Expr>,
}

/// One element of an index's key: a plain column or a stored expression.
#[derive(Clone, Debug)]
pub enum IndexKey {
    Column(String),
    Expr(Expr),
}

#[derive(Clone, Debug)]
pub struct Insert {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub source: InsertSource,
}

#[derive(Clone, Debug)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Select(Box<Select>),
}

#[derive(Clone, Debug)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub filter: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct Delete {
    pub table: String,
    pub filter: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct Select {
    pub with: Vec<CteDef>,
    pub body: SelectBody,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct CteDef {
    pub name: String,
    pub columns: Vec<String>,
    pub recursive: bool,
    /// Anchor term, and the recursive term if this is a recursive CTE
    /// (spec §4.5 CTEScan: UNION ALL between the two).
    pub anchor: Box<SelectBody>,
    pub recursive_term: Option<Box<SelectBody>>,
}

#[derive(Clone, Debug)]
pub enum SelectBody {
    Query(SelectCore),
    SetOp {
        op: SetOp,
        all: bool,
        left: Box<SelectBody>,
        right: Box<SelectBody>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Clone, Debug)]
pub struct SelectCore {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    pub from: Option<FromItem>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Clone, Debug)]
pub enum SelectItem {
    Expr { expr: Expr, alias: Option<String> },
    Wildcard,
}

#[derive(Clone, Debug)]
pub struct OrderKey {
    pub expr: Expr,
    pub desc: bool,
}

#[derive(Clone, Debug)]
pub enum FromItem {
    Table {
        name: String,
        alias: Option<String>,
    },
    Cte {
        name: String,
        alias: Option<String>,
    },
    Subquery {
        query: Box<Select>,
        alias: String,
    },
    Join {
        left: Box<FromItem>,
        right: Box<FromItem>,
        join_type: JoinType,
        on: Option<Expr>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

#[derive(Clone, Debug)]
pub enum Expr {
    Literal(Value),
    Column(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    InList { expr: Box<Expr>, list: Vec<Expr>, negated: bool },
    InSubquery { expr: Box<Expr>, query: Box<Select>, negated: bool },
    Exists { query: Box<Select>, negated: bool },
    ScalarSubquery(Box<Select>),
    FuncCall { name: String, args: Vec<Expr>, star: bool },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}
