//! SubqueryScan (spec §4.5): runs an inner plan to completion and presents
//! its rows under a new alias, re-prefixing every output column name so
//! the outer query can refer to them as `alias.col`.

use crate::errors::EngineResult;
use crate::iter::{RowIter, Schema};
use crate::value::Value;

pub struct SubqueryScan<'a> {
    schema: Schema,
    child: Box<dyn RowIter + 'a>,
}

impl<'a> SubqueryScan<'a> {
    pub fn new(child: Box<dyn RowIter + 'a>, alias: &str) -> Self {
        let short_names: Vec<String> = child
            .schema()
            .names
            .iter()
            .map(|n| match n.rfind('.') {
                Some(pos) => n[pos + 1..].to_string(),
                None => n.clone(),
            })
            .collect();
        let schema = Schema::prefixed(alias, &short_names);
        Self { schema, child }
    }
}

impl<'a> RowIter for SubqueryScan<'a> {
    fn next(&mut self) -> EngineResult<bool> {
        self.child.next()
    }

    fn row(&self) -> &[Value] {
        self.child.row()
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn close(&mut self) {
        self.child.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneRow {
        schema: Schema,
        row: Vec<Value>,
        done: bool,
    }
    impl RowIter for OneRow {
        fn next(&mut self) -> EngineResult<bool> {
            if self.done {
                return Ok(false);
            }
            self.done = true;
            Ok(true)
        }
        fn row(&self) -> &[Value] {
            &self.row
        }
        fn schema(&self) -> &Schema {
            &self.schema
        }
        fn close(&mut self) {}
    }

    #[test]
    fn reprefixes_child_columns_under_new_alias() {
        let child = Box::new(OneRow {
            schema: Schema::new(vec!["t.a".to_string()]),
            row: vec![Value::Int(1)],
            done: false,
        });
        let scan = SubqueryScan::new(child, "sub");
        assert_eq!(scan.schema().names, vec!["sub.a".to_string()]);
    }
}
