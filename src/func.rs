//! Built-in scalar functions (spec §4.3).
//!
//! `MAX`/`MIN`/`SUM`/`AVG`/`COUNT` also name aggregates (`agg.rs`); in a
//! scalar (non-aggregate) expression context the spec defines them as
//! reducing placeholders rather than errors: `COUNT(*)` is `1`, the others
//! return their sole argument unchanged.

use crate::errors::{EngineError, EngineResult};
use crate::util::strings::{ascii_lower, ascii_upper};
use crate::value::Value;

pub fn call(name: &str, args: &[Value], star: bool) -> EngineResult<Value> {
    match name.to_ascii_uppercase().as_str() {
        "COALESCE" => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
        "ABS" => abs(args),
        "UPPER" => text_fn(args, ascii_upper),
        "LOWER" => text_fn(args, ascii_lower),
        "COUNT" if star => Ok(Value::Int(1)),
        "COUNT" | "MAX" | "MIN" | "SUM" | "AVG" => args.first().cloned().ok_or_else(|| {
            EngineError::InvalidExpression(format!("{name} requires an argument in scalar context"))
        }),
        other => Err(EngineError::UnsupportedOperator(other.to_string())),
    }
}

fn abs(args: &[Value]) -> EngineResult<Value> {
    let arg = args
        .first()
        .ok_or_else(|| EngineError::InvalidExpression("ABS requires one argument".to_string()))?;
    match arg {
        Value::Null => Ok(Value::Null),
        Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(EngineError::TypeMismatch {
            column: "<expr>".to_string(),
            expected: "numeric".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

fn text_fn(args: &[Value], f: impl Fn(&str) -> String) -> EngineResult<Value> {
    let arg = args
        .first()
        .ok_or_else(|| EngineError::InvalidExpression("function requires one argument".to_string()))?;
    match arg {
        Value::Null => Ok(Value::Null),
        Value::Text(s) => Ok(Value::Text(f(s))),
        other => Err(EngineError::TypeMismatch {
            column: "<expr>".to_string(),
            expected: "TEXT".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_returns_first_non_null() {
        let r = call("COALESCE", &[Value::Null, Value::Null, Value::Int(5)], false).unwrap();
        assert!(matches!(r, Value::Int(5)));
    }

    #[test]
    fn count_star_is_one() {
        let r = call("COUNT", &[], true).unwrap();
        assert!(matches!(r, Value::Int(1)));
    }

    #[test]
    fn upper_lower_roundtrip() {
        let r = call("UPPER", &[Value::Text("abc".to_string())], false).unwrap();
        assert_eq!(r.as_text(), Some("ABC"));
        let r = call("LOWER", &[Value::Text("ABC".to_string())], false).unwrap();
        assert_eq!(r.as_text(), Some("abc"));
    }
}
