//! Primitive type classification, the widest-common-type lattice, and
//! implicit promotion.
//!
//! Promotion preserves value equality: when no cast is needed the original
//! expression is returned unchanged so callers can detect no-op resolution.

use arrow_schema::DataType;
use slate_common::{Result, SlateError};

use crate::logical_plan::{BinaryOp, Expr, LiteralValue};

/// Static type of a literal value.
///
/// Untyped integer literals parse as `Int64` and may be narrowed to the other
/// comparison side's integer type when the value fits (see
/// [`coerce_for_compare`]).
pub fn literal_type(v: &LiteralValue) -> DataType {
    match v {
        LiteralValue::Int32(_) => DataType::Int32,
        LiteralValue::Int64(_) => DataType::Int64,
        LiteralValue::Float64(_) => DataType::Float64,
        LiteralValue::Utf8(_) => DataType::Utf8,
        LiteralValue::Boolean(_) => DataType::Boolean,
        LiteralValue::Null => DataType::Null,
    }
}

pub fn is_numeric(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Primitive types carry a total ordering and participate in promotion.
/// Everything else (lists, structs, maps, ...) is opaque to comparison and
/// sorting.
pub fn is_primitive(dt: &DataType) -> bool {
    is_numeric(dt)
        || matches!(
            dt,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Boolean
        )
}

fn numeric_rank(dt: &DataType) -> Option<u8> {
    Some(match dt {
        DataType::Int8 => 1,
        DataType::Int16 => 2,
        DataType::Int32 => 3,
        DataType::Int64 => 4,
        DataType::UInt8 => 1,
        DataType::UInt16 => 2,
        DataType::UInt32 => 3,
        DataType::UInt64 => 4,
        DataType::Float32 => 5,
        DataType::Float64 => 6,
        _ => return None,
    })
}

fn is_signed_int(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
    )
}

fn is_unsigned_int(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
    )
}

fn signed_int_of_rank(rank: u8) -> Option<DataType> {
    Some(match rank {
        1 => DataType::Int8,
        2 => DataType::Int16,
        3 => DataType::Int32,
        4 => DataType::Int64,
        _ => return None,
    })
}

fn wider_numeric(a: &DataType, b: &DataType) -> Option<DataType> {
    let ra = numeric_rank(a)?;
    let rb = numeric_rank(b)?;
    // Mixed-sign integer pairs widen to the smallest signed integer that
    // holds both sides. An unsigned value needs one extra rank of signed
    // headroom, so Int64 vs UInt64 has no lossless target and fails.
    if is_unsigned_int(a) != is_unsigned_int(b) && ra <= 4 && rb <= 4 {
        let (unsigned_rank, signed_rank) = if is_unsigned_int(a) { (ra, rb) } else { (rb, ra) };
        return signed_int_of_rank(signed_rank.max(unsigned_rank + 1));
    }
    if ra >= rb {
        Some(a.clone())
    } else {
        Some(b.clone())
    }
}

/// Minimal common type both operands can be losslessly promoted to, or a
/// `TypeMismatch` when none exists (for example text vs. numeric).
pub fn widest_common_type(a: &DataType, b: &DataType) -> Result<DataType> {
    if a == b && is_primitive(a) {
        return Ok(a.clone());
    }
    // Null absorbs into the other side.
    if *a == DataType::Null {
        return Ok(b.clone());
    }
    if *b == DataType::Null {
        return Ok(a.clone());
    }
    if is_numeric(a) && is_numeric(b) {
        if let Some(w) = wider_numeric(a, b) {
            return Ok(w);
        }
    }
    if matches!(a, DataType::Utf8 | DataType::LargeUtf8)
        && matches!(b, DataType::Utf8 | DataType::LargeUtf8)
    {
        let target = if *a == DataType::LargeUtf8 || *b == DataType::LargeUtf8 {
            DataType::LargeUtf8
        } else {
            DataType::Utf8
        };
        return Ok(target);
    }
    Err(SlateError::TypeMismatch(format!(
        "no common type for {a:?} and {b:?}"
    )))
}

/// True when a value of type `from` can be promoted into `to` without loss.
///
/// Equal types always narrow, including non-primitive ones: strict typing
/// permits `x IN (...)` over matching opaque types and leaves the rejection
/// to the evaluator's documented false fallback.
pub fn narrows_into(from: &DataType, to: &DataType) -> bool {
    if from == to || *from == DataType::Null {
        return true;
    }
    if let (Some(rf), Some(rt)) = (numeric_rank(from), numeric_rank(to)) {
        // An unsigned integer only fits into a strictly wider signed one;
        // signed into unsigned loses the negative range.
        if is_unsigned_int(from) && is_signed_int(to) {
            return rf < rt;
        }
        if is_signed_int(from) && is_unsigned_int(to) {
            return false;
        }
        return rf <= rt;
    }
    matches!((from, to), (DataType::Utf8, DataType::LargeUtf8))
}

/// Wrap `expr` in a cast to `to`, or return it unchanged when the types
/// already agree.
pub fn cast_if_needed(expr: Expr, from: &DataType, to: &DataType) -> Expr {
    if from == to {
        expr
    } else {
        Expr::Cast {
            expr: Box::new(expr),
            to_type: to.clone(),
        }
    }
}

/// Coerce a literal value into `to`. Returns `None` when the coercion would
/// lose information or the pair is unsupported.
pub fn promote_value(v: &LiteralValue, to: &DataType) -> Option<LiteralValue> {
    match (v, to) {
        (LiteralValue::Null, _) => Some(LiteralValue::Null),
        (LiteralValue::Int32(i), DataType::Int32) => Some(LiteralValue::Int32(*i)),
        (LiteralValue::Int32(i), DataType::Int64) => Some(LiteralValue::Int64(*i as i64)),
        (LiteralValue::Int32(i), DataType::Float64) => Some(LiteralValue::Float64(*i as f64)),
        (LiteralValue::Int64(i), DataType::Int64) => Some(LiteralValue::Int64(*i)),
        (LiteralValue::Int64(i), DataType::Int32) => {
            i32::try_from(*i).ok().map(LiteralValue::Int32)
        }
        (LiteralValue::Int64(i), DataType::Float64) => Some(LiteralValue::Float64(*i as f64)),
        (LiteralValue::Float64(f), DataType::Float64) => Some(LiteralValue::Float64(*f)),
        (LiteralValue::Utf8(s), DataType::Utf8 | DataType::LargeUtf8) => {
            Some(LiteralValue::Utf8(s.clone()))
        }
        (LiteralValue::Boolean(b), DataType::Boolean) => Some(LiteralValue::Boolean(*b)),
        _ => None,
    }
}

// Integer literals adopt the other side's narrower integer type when the
// value fits, so `age > 18` with an Int32 column stays an Int32 comparison
// with no casts.
pub(crate) fn narrow_literal_to(expr: &Expr, to: &DataType) -> Option<Expr> {
    match expr {
        Expr::Literal(v @ (LiteralValue::Int32(_) | LiteralValue::Int64(_))) => {
            promote_value(v, to).map(Expr::Literal)
        }
        _ => None,
    }
}

/// Promote both sides of a comparison to their widest common type.
///
/// Both operands must be primitive. When no promotion is needed the original
/// expressions are returned unchanged.
pub fn coerce_for_compare(
    left: Expr,
    ldt: DataType,
    right: Expr,
    rdt: DataType,
) -> Result<(Expr, Expr, DataType)> {
    // Null literals adopt the other side's type.
    if ldt == DataType::Null {
        return Ok((cast_if_needed(left, &ldt, &rdt), right, rdt));
    }
    if rdt == DataType::Null {
        return Ok((left, cast_if_needed(right, &rdt, &ldt), ldt));
    }

    if !is_primitive(&ldt) {
        return Err(SlateError::TypeMismatch(format!(
            "left comparison operand must be a primitive type, got {ldt:?}"
        )));
    }
    if !is_primitive(&rdt) {
        return Err(SlateError::TypeMismatch(format!(
            "right comparison operand must be a primitive type, got {rdt:?}"
        )));
    }

    if ldt == rdt {
        return Ok((left, right, ldt));
    }

    // Same-type fast path for integer literals against narrower columns.
    if is_numeric(&ldt) && is_numeric(&rdt) {
        if let Some(narrowed) = narrow_literal_to(&right, &ldt) {
            return Ok((left, narrowed, ldt));
        }
        if let Some(narrowed) = narrow_literal_to(&left, &rdt) {
            return Ok((narrowed, right, rdt));
        }
    }

    let target = widest_common_type(&ldt, &rdt)?;
    Ok((
        cast_if_needed(left, &ldt, &target),
        cast_if_needed(right, &rdt, &target),
        target,
    ))
}

/// Promote both sides of an arithmetic operator; division widens to float.
pub fn coerce_for_arith(
    op: BinaryOp,
    left: Expr,
    ldt: DataType,
    right: Expr,
    rdt: DataType,
) -> Result<(Expr, Expr, DataType)> {
    if !is_numeric(&ldt) || !is_numeric(&rdt) {
        return Err(SlateError::TypeMismatch(format!(
            "arithmetic requires numeric operands, got {ldt:?} and {rdt:?}"
        )));
    }

    if op == BinaryOp::Divide {
        let target = DataType::Float64;
        return Ok((
            cast_if_needed(left, &ldt, &target),
            cast_if_needed(right, &rdt, &target),
            target,
        ));
    }

    let target = widest_common_type(&ldt, &rdt)?;
    Ok((
        cast_if_needed(left, &ldt, &target),
        cast_if_needed(right, &rdt, &target),
        target,
    ))
}
