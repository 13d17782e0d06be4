//! Operator library (spec §4.5, ~28% of the budget): the volcano-style
//! iterators that make up a plan tree, each implementing `iter::RowIter`.

pub mod aggregate;
pub mod cte_scan;
pub mod filter;
pub mod join;
pub mod project;
pub mod scan;
pub mod setop;
pub mod sort_limit;
pub mod subquery;
