//! Projection (spec §4.5): evaluates each projection expression per row.
//! `Wildcard` expands to every column of the child's schema in order; a
//! bare `Column` keeps its short name as the output label, an aliased
//! expression uses its alias, anything else is labeled `"?"`.

use crate::ast::{Expr, SelectItem};
use crate::errors::EngineResult;
use crate::expr::{self, SubqueryRunner};
use crate::iter::{NameMap, RowIter, Schema};
use crate::value::Value;

enum Item {
    Expr(Expr),
    ChildColumn(usize),
}

pub struct Projection<'a> {
    child: Box<dyn RowIter + 'a>,
    items: Vec<Item>,
    names: NameMap,
    schema: Schema,
    row: Vec<Value>,
    runner: Box<dyn SubqueryRunner + 'a>,
}

impl<'a> Projection<'a> {
    pub fn new(child: Box<dyn RowIter + 'a>, projection: &[SelectItem], runner: Box<dyn SubqueryRunner + 'a>) -> Self {
        let names = child.schema().name_map();
        let mut items = Vec::new();
        let mut labels = Vec::new();
        for item in projection {
            match item {
                SelectItem::Wildcard => {
                    for (i, name) in child.schema().names.iter().enumerate() {
                        items.push(Item::ChildColumn(i));
                        labels.push(short_label(name));
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    let label = alias.clone().unwrap_or_else(|| match expr {
                        Expr::Column(name) => short_label(name),
                        _ => "?".to_string(),
                    });
                    items.push(Item::Expr(expr.clone()));
                    labels.push(label);
                }
            }
        }
        Self {
            child,
            items,
            names,
            schema: Schema::new(labels),
            row: Vec::new(),
            runner,
        }
    }
}

fn short_label(name: &str) -> String {
    match name.rfind('.') {
        Some(pos) => name[pos + 1..].to_string(),
        None => name.to_string(),
    }
}

impl<'a> RowIter for Projection<'a> {
    fn next(&mut self) -> EngineResult<bool> {
        if !self.child.next()? {
            self.row.clear();
            return Ok(false);
        }
        let source = self.child.row();
        let mut out = Vec::with_capacity(self.items.len());
        for item in &self.items {
            match item {
                Item::ChildColumn(i) => out.push(source[*i].clone()),
                Item::Expr(e) => out.push(expr::eval(e, source, &self.names, self.runner.as_mut())?),
            }
        }
        self.row = out;
        Ok(true)
    }

    fn row(&self) -> &[Value] {
        &self.row
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
    use crate::ast::Select;

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
    struct NoSub;
    impl SubqueryRunner for NoSub {
        fn run(&mut self, _q: &Select) -> EngineResult<Vec<Vec<Value>>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn wildcard_expands_to_all_child_columns() {
        let child = Box::new(OneRow {
            schema: Schema::new(vec!["t.a".to_string(), "t.b".to_string()]),
            row: vec![Value::Int(1), Value::Int(2)],
            done: false,
        });
        let mut proj = Projection::new(child, &[SelectItem::Wildcard], Box::new(NoSub));
        assert!(proj.next().unwrap());
        assert_eq!(proj.row(), &[Value::Int(1), Value::Int(2)]);
        assert_eq!(proj.schema().names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn aliased_expr_uses_alias_as_label() {
        let child = Box::new(OneRow {
            schema: Schema::new(vec!["t.a".to_string()]),
            row: vec![Value::Int(5)],
            done: false,
        });
        let items = vec![SelectItem::Expr {
            expr: Expr::Column("a".to_string()),
            alias: Some("renamed".to_string()),
        }];
        let mut proj = Projection::new(child, &items, Box::new(NoSub));
        assert!(proj.next().unwrap());
        assert_eq!(proj.schema().names, vec!["renamed".to_string()]);
    }
}
