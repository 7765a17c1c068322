//! Scalar comparison and ordering semantics.
//!
//! Every comparison operator delegates to the generic ordering derived from
//! the operands' resolved primitive type. All operators share one
//! null-propagation rule: if either operand is `Null`, the result is `Null`,
//! and per-operator logic only runs when both sides are present.

use std::cmp::Ordering;

use arrow_schema::DataType;

use crate::logical_plan::{BinaryOp, LiteralValue};
use crate::types::is_primitive;

/// Total-ordering comparison between two present values of a common primitive
/// type. Returns `None` for `Null` operands or cross-category pairs, which
/// strict typing rules out before evaluation.
pub fn compare_values(l: &LiteralValue, r: &LiteralValue) -> Option<Ordering> {
    use LiteralValue::*;
    match (l, r) {
        (Null, _) | (_, Null) => None,
        (Int32(a), Int32(b)) => Some(a.cmp(b)),
        (Int64(a), Int64(b)) => Some(a.cmp(b)),
        // Mixed integer widths compare through i64; promotion normally
        // removes these pairs but folding may see them.
        (Int32(a), Int64(b)) => Some(i64::from(*a).cmp(b)),
        (Int64(a), Int32(b)) => Some(a.cmp(&i64::from(*b))),
        (Float64(a), Float64(b)) => a.partial_cmp(b),
        (Utf8(a), Utf8(b)) => Some(a.cmp(b)),
        (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Evaluate one of the six comparison operators with shared null propagation.
///
/// Callers must pass a comparison operator; arithmetic operators belong to
/// [`eval_binary`].
pub fn eval_comparison(op: BinaryOp, l: &LiteralValue, r: &LiteralValue) -> LiteralValue {
    if *l == LiteralValue::Null || *r == LiteralValue::Null {
        return LiteralValue::Null;
    }
    match compare_values(l, r) {
        Some(ord) => LiteralValue::Boolean(match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::NotEq => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::LtEq => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            BinaryOp::GtEq => ord != Ordering::Less,
            _ => return LiteralValue::Null,
        }),
        None => LiteralValue::Null,
    }
}

/// Evaluate a binary operator over two literals, or `None` when the pair is
/// not evaluable (used by constant folding, which must then keep the original
/// expression).
pub fn eval_binary(l: &LiteralValue, op: BinaryOp, r: &LiteralValue) -> Option<LiteralValue> {
    use LiteralValue::*;
    if op.is_comparison() {
        return Some(eval_comparison(op, l, r));
    }
    // Integer arithmetic uses the checked forms: overflow (and division by
    // zero) is not evaluable rather than a panic.
    match (l, op, r) {
        (Int64(a), BinaryOp::Plus, Int64(b)) => a.checked_add(*b).map(Int64),
        (Int64(a), BinaryOp::Minus, Int64(b)) => a.checked_sub(*b).map(Int64),
        (Int64(a), BinaryOp::Multiply, Int64(b)) => a.checked_mul(*b).map(Int64),
        (Int64(a), BinaryOp::Divide, Int64(b)) => a.checked_div(*b).map(Int64),
        (Int32(a), BinaryOp::Plus, Int32(b)) => a.checked_add(*b).map(Int32),
        (Int32(a), BinaryOp::Minus, Int32(b)) => a.checked_sub(*b).map(Int32),
        (Int32(a), BinaryOp::Multiply, Int32(b)) => a.checked_mul(*b).map(Int32),
        (Int32(a), BinaryOp::Divide, Int32(b)) => a.checked_div(*b).map(Int32),
        (Float64(a), BinaryOp::Plus, Float64(b)) => Some(Float64(a + b)),
        (Float64(a), BinaryOp::Minus, Float64(b)) => Some(Float64(a - b)),
        (Float64(a), BinaryOp::Multiply, Float64(b)) => Some(Float64(a * b)),
        (Float64(a), BinaryOp::Divide, Float64(b)) if *b != 0.0 => Some(Float64(a / b)),
        _ => None,
    }
}

/// Evaluate set membership: true iff the test value compares equal to any
/// list value under the resolved type's ordering.
///
/// When the resolved type is not primitive there is no ordering to compare
/// with, so membership is false unconditionally. This is a deliberate,
/// auditable fallback: strict typing admits IN over matching opaque types,
/// and this layer owns the rejection.
pub fn eval_in_list(
    test: &LiteralValue,
    list: &[LiteralValue],
    resolved_type: &DataType,
    negated: bool,
) -> LiteralValue {
    if !is_primitive(resolved_type) {
        return LiteralValue::Boolean(negated);
    }
    if *test == LiteralValue::Null {
        return LiteralValue::Null;
    }
    let found = list
        .iter()
        .any(|v| compare_values(test, v) == Some(Ordering::Equal));
    LiteralValue::Boolean(found != negated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::Field;
    use std::sync::Arc;

    #[test]
    fn null_propagates_through_every_comparison() {
        for op in [
            BinaryOp::Eq,
            BinaryOp::NotEq,
            BinaryOp::Lt,
            BinaryOp::LtEq,
            BinaryOp::Gt,
            BinaryOp::GtEq,
        ] {
            assert_eq!(
                eval_comparison(op, &LiteralValue::Null, &LiteralValue::Int64(1)),
                LiteralValue::Null
            );
            assert_eq!(
                eval_comparison(op, &LiteralValue::Int64(1), &LiteralValue::Null),
                LiteralValue::Null
            );
        }
    }

    #[test]
    fn relational_operators_use_type_ordering() {
        let a = LiteralValue::Utf8("apple".to_string());
        let b = LiteralValue::Utf8("banana".to_string());
        assert_eq!(
            eval_comparison(BinaryOp::Lt, &a, &b),
            LiteralValue::Boolean(true)
        );
        assert_eq!(
            eval_comparison(BinaryOp::GtEq, &a, &b),
            LiteralValue::Boolean(false)
        );
    }

    #[test]
    fn integer_overflow_is_not_evaluable() {
        assert_eq!(
            eval_binary(&LiteralValue::Int64(i64::MAX), BinaryOp::Plus, &LiteralValue::Int64(1)),
            None
        );
        assert_eq!(
            eval_binary(&LiteralValue::Int32(i32::MIN), BinaryOp::Minus, &LiteralValue::Int32(1)),
            None
        );
        assert_eq!(
            eval_binary(
                &LiteralValue::Int64(i64::MIN),
                BinaryOp::Divide,
                &LiteralValue::Int64(-1)
            ),
            None
        );
        assert_eq!(
            eval_binary(&LiteralValue::Int64(1), BinaryOp::Divide, &LiteralValue::Int64(0)),
            None
        );
    }

    #[test]
    fn in_list_matches_promoted_values() {
        let test = LiteralValue::Int64(3);
        let list = vec![LiteralValue::Int64(1), LiteralValue::Int64(3)];
        assert_eq!(
            eval_in_list(&test, &list, &DataType::Int64, false),
            LiteralValue::Boolean(true)
        );
        assert_eq!(
            eval_in_list(&test, &list, &DataType::Int64, true),
            LiteralValue::Boolean(false)
        );
    }

    #[test]
    fn in_list_null_test_value_is_null() {
        let list = vec![LiteralValue::Int64(1)];
        assert_eq!(
            eval_in_list(&LiteralValue::Null, &list, &DataType::Int64, false),
            LiteralValue::Null
        );
    }

    #[test]
    fn in_list_non_primitive_type_falls_back_to_false() {
        let list_type = DataType::List(Arc::new(Field::new("item", DataType::Int32, true)));
        let test = LiteralValue::Utf8("anything".to_string());
        let list = vec![test.clone()];
        // Membership is false for every input, not an evaluation error.
        assert_eq!(
            eval_in_list(&test, &list, &list_type, false),
            LiteralValue::Boolean(false)
        );
    }
}
