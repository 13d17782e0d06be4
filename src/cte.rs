//! Recursive CTE fixpoint evaluation (spec §4.5 CTEScan, "Recursive CTEs").
//!
//! The semi-naive strategy: seed the accumulator and working set from the
//! anchor, then repeatedly re-evaluate the recursive term with the
//! self-reference bound to only the *previous round's new rows* (not the
//! whole accumulator), appending what it produces. Stops when a round is
//! empty, or fails `RecursionLimit` past the configured guard.
//!
//! `FixpointStep` decouples the pure round-by-round algorithm (tested
//! below) from the plan-execution machinery that actually runs the
//! recursive term's plan; `plan_exec::ExecContext` implements it.

use crate::errors::{EngineError, EngineResult};
use crate::value::Value;

pub trait FixpointStep {
    fn eval_recursive_term(&mut self, working_set: &[Vec<Value>]) -> EngineResult<Vec<Vec<Value>>>;
}

pub fn semi_naive_fixpoint(
    anchor_rows: Vec<Vec<Value>>,
    recursion_limit: u32,
    step: &mut dyn FixpointStep,
) -> EngineResult<Vec<Vec<Value>>> {
    let mut accumulator = anchor_rows.clone();
    let mut working = anchor_rows;
    let mut round: u32 = 0;

    loop {
        if working.is_empty() {
            break;
        }
        round += 1;
        if round > recursion_limit {
            return Err(EngineError::RecursionLimit(recursion_limit));
        }
        let produced = step.eval_recursive_term(&working)?;
        if produced.is_empty() {
            break;
        }
        accumulator.extend(produced.iter().cloned());
        working = produced;
    }

    Ok(accumulator)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `n+1` counter stopping once it would exceed `max`, matching the
    /// `WITH RECURSIVE c(n) AS (SELECT 1 UNION ALL SELECT n+1 FROM c WHERE
    /// n<5)` scenario from spec §8.
    struct Counter {
        max: i64,
    }

    impl FixpointStep for Counter {
        fn eval_recursive_term(&mut self, working_set: &[Vec<Value>]) -> EngineResult<Vec<Vec<Value>>> {
            Ok(working_set
                .iter()
                .filter_map(|row| match row.first() {
                    Some(Value::Int(n)) if *n < self.max => Some(vec![Value::Int(n + 1)]),
                    _ => None,
                })
                .collect())
        }
    }

    #[test]
    fn counter_terminates_at_bound() {
        let anchor = vec![vec![Value::Int(1)]];
        let rows = semi_naive_fixpoint(anchor, 100, &mut Counter { max: 5 }).unwrap();
        let ns: Vec<i64> = rows.iter().map(|r| r[0].as_int().unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3, 4, 5]);
    }

    struct NeverStops;
    impl FixpointStep for NeverStops {
        fn eval_recursive_term(&mut self, working_set: &[Vec<Value>]) -> EngineResult<Vec<Vec<Value>>> {
            Ok(working_set.to_vec())
        }
    }

    #[test]
    fn nonterminating_recursion_fails_at_limit() {
        let anchor = vec![vec![Value::Int(1)]];
        let err = semi_naive_fixpoint(anchor, 100, &mut NeverStops).unwrap_err();
        assert!(matches!(err, EngineError::RecursionLimit(100)));
    }
}
