//! Catalog-only objects whose execution bodies are peripheral to this core
//! (spec §1: "triggers... the core exposes the hooks these need... but
//! their internal logic is peripheral"). Kept as plain name/SQL records so
//! `DROP ... RESTRICT` dependency checks and `ALTER TABLE` consistency
//! checks can see them without the core running trigger bodies itself.

#[derive(Clone, Debug)]
pub struct Trigger {
    pub name: String,
    pub table: String,
    pub sql: String,
}

#[derive(Clone, Debug)]
pub struct View {
    pub name: String,
    pub query: crate::ast::Select,
}

#[derive(Clone, Debug)]
pub struct Procedure {
    pub name: String,
    pub sql: String,
}
