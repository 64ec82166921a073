//! Constant propagation and folding.
//!
//! Folds unary, binary, cast, swizzle, select and a subset of intrinsic
//! expressions over constants into `ConstantValue` nodes, and evaluates
//! `const if` branches down to the taken branch.
//!
//! Folding contracts:
//! - `i32`/`u32` arithmetic wraps (two's-complement); overflow is not a
//!   compilation failure, but integer division or modulo by zero is.
//! - floats follow IEEE-754; type-level constants (`f32::Max`, ...)
//!   materialize the corresponding IEEE values.
//! - untyped literals fold in their own domain (`i64`/`f64`) and stay
//!   untyped.
//! - folding is idempotent: a folded tree folds to itself.

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::transformer::{
    constant_to_expression, transform_module, ExpressionTransform, StatementTransform,
    TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::{CompilationError, Error, Result, SourceLocation};
use smallvec::SmallVec;

/// Folds `expr` to a constant in `ctx`, if possible.
///
/// `Ok(None)` means the expression is not constant; errors are reserved
/// for constant expressions that are invalid (integer division by zero).
pub fn compute_constant(
    expr: &Expression,
    ctx: &TransformerContext,
) -> Result<Option<ConstantValue>> {
    match expr {
        Expression::ConstantValue(constant) => Ok(Some(constant.value.clone())),
        Expression::ConstantArrayValue(constant) => {
            Ok(Some(ConstantValue::Array(constant.values.clone())))
        }
        Expression::IdentifierValue(value) if value.kind == IdentifierKind::Constant => {
            Ok(ctx
                .constants
                .try_retrieve(value.index)
                .and_then(|constant| constant.value.clone()))
        }
        Expression::TypeConstant(constant) => Ok(type_constant_value(constant.ty, constant.constant)),
        Expression::Unary(unary) => {
            let Some(operand) = compute_constant(&unary.expr, ctx)? else {
                return Ok(None);
            };
            fold_unary(unary.op, &operand, &unary.location)
        }
        Expression::Binary(binary) => {
            let Some(left) = compute_constant(&binary.left, ctx)? else {
                return Ok(None);
            };
            let Some(right) = compute_constant(&binary.right, ctx)? else {
                return Ok(None);
            };
            fold_binary(binary.op, &left, &right, &binary.location)
        }
        Expression::Swizzle(swizzle) => {
            let Some(value) = compute_constant(&swizzle.expr, ctx)? else {
                return Ok(None);
            };
            Ok(fold_swizzle(&value, &swizzle.components))
        }
        Expression::Conditional(conditional) => {
            let Some(condition) = compute_constant(&conditional.condition, ctx)? else {
                return Ok(None);
            };
            match condition.as_bool() {
                Some(true) => compute_constant(&conditional.true_path, ctx),
                Some(false) => compute_constant(&conditional.false_path, ctx),
                None => Ok(None),
            }
        }
        Expression::Cast(cast) => {
            let ExpressionValue::Value(target) = &cast.target_type else {
                return Ok(None);
            };
            let mut values = Vec::with_capacity(cast.expressions.len());
            for sub in &cast.expressions {
                match compute_constant(sub, ctx)? {
                    Some(value) => values.push(value),
                    None => return Ok(None),
                }
            }
            fold_cast(target, &values, &cast.location)
        }
        Expression::Intrinsic(intrinsic) => {
            let mut values = Vec::with_capacity(intrinsic.parameters.len());
            for parameter in &intrinsic.parameters {
                match compute_constant(parameter, ctx)? {
                    Some(value) => values.push(value),
                    None => return Ok(None),
                }
            }
            Ok(fold_intrinsic(intrinsic.intrinsic, &values))
        }
        _ => Ok(None),
    }
}

fn type_constant_value(ty: PrimitiveType, constant: TypeConstant) -> Option<ConstantValue> {
    use ConstantSingleValue::*;
    let single = match (ty, constant) {
        (PrimitiveType::Float32, TypeConstant::Epsilon) => F32(f32::EPSILON),
        (PrimitiveType::Float32, TypeConstant::Infinity) => F32(f32::INFINITY),
        (PrimitiveType::Float32, TypeConstant::Max) => F32(f32::MAX),
        (PrimitiveType::Float32, TypeConstant::Min) => F32(f32::MIN),
        (PrimitiveType::Float32, TypeConstant::NaN) => F32(f32::NAN),
        (PrimitiveType::Float64, TypeConstant::Epsilon) => F64(f64::EPSILON),
        (PrimitiveType::Float64, TypeConstant::Infinity) => F64(f64::INFINITY),
        (PrimitiveType::Float64, TypeConstant::Max) => F64(f64::MAX),
        (PrimitiveType::Float64, TypeConstant::Min) => F64(f64::MIN),
        (PrimitiveType::Float64, TypeConstant::NaN) => F64(f64::NAN),
        (PrimitiveType::Int32, TypeConstant::Max) => I32(i32::MAX),
        (PrimitiveType::Int32, TypeConstant::Min) => I32(i32::MIN),
        (PrimitiveType::UInt32, TypeConstant::Max) => U32(u32::MAX),
        (PrimitiveType::UInt32, TypeConstant::Min) => U32(u32::MIN),
        _ => return None,
    };
    Some(ConstantValue::Single(single))
}

/// Reconciles an untyped literal with a concrete operand so both sides of
/// an operation have the same representation.
fn coerce_pair(
    a: &ConstantSingleValue,
    b: &ConstantSingleValue,
) -> Option<(ConstantSingleValue, ConstantSingleValue)> {
    use ConstantSingleValue::*;
    Some(match (a, b) {
        (IntLiteral(lhs), I32(rhs)) => (I32(*lhs as i32), I32(*rhs)),
        (I32(lhs), IntLiteral(rhs)) => (I32(*lhs), I32(*rhs as i32)),
        (IntLiteral(lhs), U32(rhs)) => (U32(*lhs as u32), U32(*rhs)),
        (U32(lhs), IntLiteral(rhs)) => (U32(*lhs), U32(*rhs as u32)),
        (FloatLiteral(lhs), F32(rhs)) => (F32(*lhs as f32), F32(*rhs)),
        (F32(lhs), FloatLiteral(rhs)) => (F32(*lhs), F32(*rhs as f32)),
        (FloatLiteral(lhs), F64(rhs)) => (F64(*lhs), F64(*rhs)),
        (F64(lhs), FloatLiteral(rhs)) => (F64(*lhs), F64(*rhs)),
        _ if a.primitive_type() == b.primitive_type() => (a.clone(), b.clone()),
        _ => return None,
    })
}

fn fold_binary_single(
    op: BinaryType,
    left: &ConstantSingleValue,
    right: &ConstantSingleValue,
    location: &SourceLocation,
) -> Result<Option<ConstantSingleValue>> {
    use ConstantSingleValue::*;

    let Some((left, right)) = coerce_pair(left, right) else {
        return Ok(None);
    };

    macro_rules! int_div_guard {
        ($value:expr) => {
            if $value == 0 {
                return Err(Error::new(
                    location.clone(),
                    CompilationError::DivisionByZero,
                ));
            }
        };
    }

    let result = match (op, &left, &right) {
        // arithmetic
        (BinaryType::Add, I32(a), I32(b)) => I32(a.wrapping_add(*b)),
        (BinaryType::Add, U32(a), U32(b)) => U32(a.wrapping_add(*b)),
        (BinaryType::Add, IntLiteral(a), IntLiteral(b)) => IntLiteral(a.wrapping_add(*b)),
        (BinaryType::Add, F32(a), F32(b)) => F32(a + b),
        (BinaryType::Add, F64(a), F64(b)) => F64(a + b),
        (BinaryType::Add, FloatLiteral(a), FloatLiteral(b)) => FloatLiteral(a + b),

        (BinaryType::Subtract, I32(a), I32(b)) => I32(a.wrapping_sub(*b)),
        (BinaryType::Subtract, U32(a), U32(b)) => U32(a.wrapping_sub(*b)),
        (BinaryType::Subtract, IntLiteral(a), IntLiteral(b)) => IntLiteral(a.wrapping_sub(*b)),
        (BinaryType::Subtract, F32(a), F32(b)) => F32(a - b),
        (BinaryType::Subtract, F64(a), F64(b)) => F64(a - b),
        (BinaryType::Subtract, FloatLiteral(a), FloatLiteral(b)) => FloatLiteral(a - b),

        (BinaryType::Multiply, I32(a), I32(b)) => I32(a.wrapping_mul(*b)),
        (BinaryType::Multiply, U32(a), U32(b)) => U32(a.wrapping_mul(*b)),
        (BinaryType::Multiply, IntLiteral(a), IntLiteral(b)) => IntLiteral(a.wrapping_mul(*b)),
        (BinaryType::Multiply, F32(a), F32(b)) => F32(a * b),
        (BinaryType::Multiply, F64(a), F64(b)) => F64(a * b),
        (BinaryType::Multiply, FloatLiteral(a), FloatLiteral(b)) => FloatLiteral(a * b),

        (BinaryType::Divide, I32(a), I32(b)) => {
            int_div_guard!(*b);
            I32(a.wrapping_div(*b))
        }
        (BinaryType::Divide, U32(a), U32(b)) => {
            int_div_guard!(*b);
            U32(a.wrapping_div(*b))
        }
        (BinaryType::Divide, IntLiteral(a), IntLiteral(b)) => {
            int_div_guard!(*b);
            IntLiteral(a.wrapping_div(*b))
        }
        (BinaryType::Divide, F32(a), F32(b)) => F32(a / b),
        (BinaryType::Divide, F64(a), F64(b)) => F64(a / b),
        (BinaryType::Divide, FloatLiteral(a), FloatLiteral(b)) => FloatLiteral(a / b),

        (BinaryType::Modulo, I32(a), I32(b)) => {
            int_div_guard!(*b);
            I32(a.wrapping_rem(*b))
        }
        (BinaryType::Modulo, U32(a), U32(b)) => {
            int_div_guard!(*b);
            U32(a.wrapping_rem(*b))
        }
        (BinaryType::Modulo, IntLiteral(a), IntLiteral(b)) => {
            int_div_guard!(*b);
            IntLiteral(a.wrapping_rem(*b))
        }
        (BinaryType::Modulo, F32(a), F32(b)) => F32(a % b),
        (BinaryType::Modulo, F64(a), F64(b)) => F64(a % b),
        (BinaryType::Modulo, FloatLiteral(a), FloatLiteral(b)) => FloatLiteral(a % b),

        // bitwise / shifts
        (BinaryType::BitwiseAnd, I32(a), I32(b)) => I32(a & b),
        (BinaryType::BitwiseAnd, U32(a), U32(b)) => U32(a & b),
        (BinaryType::BitwiseAnd, IntLiteral(a), IntLiteral(b)) => IntLiteral(a & b),
        (BinaryType::BitwiseOr, I32(a), I32(b)) => I32(a | b),
        (BinaryType::BitwiseOr, U32(a), U32(b)) => U32(a | b),
        (BinaryType::BitwiseOr, IntLiteral(a), IntLiteral(b)) => IntLiteral(a | b),
        (BinaryType::BitwiseXor, I32(a), I32(b)) => I32(a ^ b),
        (BinaryType::BitwiseXor, U32(a), U32(b)) => U32(a ^ b),
        (BinaryType::BitwiseXor, IntLiteral(a), IntLiteral(b)) => IntLiteral(a ^ b),
        (BinaryType::ShiftLeft, I32(a), I32(b)) => I32(a.wrapping_shl(*b as u32)),
        (BinaryType::ShiftLeft, U32(a), U32(b)) => U32(a.wrapping_shl(*b)),
        (BinaryType::ShiftLeft, IntLiteral(a), IntLiteral(b)) => {
            IntLiteral(a.wrapping_shl(*b as u32))
        }
        (BinaryType::ShiftRight, I32(a), I32(b)) => I32(a.wrapping_shr(*b as u32)),
        (BinaryType::ShiftRight, U32(a), U32(b)) => U32(a.wrapping_shr(*b)),
        (BinaryType::ShiftRight, IntLiteral(a), IntLiteral(b)) => {
            IntLiteral(a.wrapping_shr(*b as u32))
        }

        // logical
        (BinaryType::LogicalAnd, Bool(a), Bool(b)) => Bool(*a && *b),
        (BinaryType::LogicalOr, Bool(a), Bool(b)) => Bool(*a || *b),

        // comparisons
        (BinaryType::CompEq, a, b) => Bool(compare_eq(a, b)?),
        (BinaryType::CompNe, a, b) => Bool(!compare_eq(a, b)?),
        (BinaryType::CompLt, a, b) => match compare_order(a, b) {
            Some(ordering) => Bool(ordering == std::cmp::Ordering::Less),
            None => return Ok(None),
        },
        (BinaryType::CompLe, a, b) => match compare_order(a, b) {
            Some(ordering) => Bool(ordering != std::cmp::Ordering::Greater),
            None => return Ok(None),
        },
        (BinaryType::CompGt, a, b) => match compare_order(a, b) {
            Some(ordering) => Bool(ordering == std::cmp::Ordering::Greater),
            None => return Ok(None),
        },
        (BinaryType::CompGe, a, b) => match compare_order(a, b) {
            Some(ordering) => Bool(ordering != std::cmp::Ordering::Less),
            None => return Ok(None),
        },

        _ => return Ok(None),
    };

    Ok(Some(result))
}

fn compare_eq(a: &ConstantSingleValue, b: &ConstantSingleValue) -> Result<bool> {
    use ConstantSingleValue::*;
    Ok(match (a, b) {
        (Bool(a), Bool(b)) => a == b,
        (I32(a), I32(b)) => a == b,
        (U32(a), U32(b)) => a == b,
        (IntLiteral(a), IntLiteral(b)) => a == b,
        (F32(a), F32(b)) => a == b,
        (F64(a), F64(b)) => a == b,
        (FloatLiteral(a), FloatLiteral(b)) => a == b,
        (String(a), String(b)) => a == b,
        _ => false,
    })
}

fn compare_order(a: &ConstantSingleValue, b: &ConstantSingleValue) -> Option<std::cmp::Ordering> {
    use ConstantSingleValue::*;
    match (a, b) {
        (I32(a), I32(b)) => Some(a.cmp(b)),
        (U32(a), U32(b)) => Some(a.cmp(b)),
        (IntLiteral(a), IntLiteral(b)) => Some(a.cmp(b)),
        (F32(a), F32(b)) => a.partial_cmp(b),
        (F64(a), F64(b)) => a.partial_cmp(b),
        (FloatLiteral(a), FloatLiteral(b)) => a.partial_cmp(b),
        _ => None,
    }
}

fn fold_binary(
    op: BinaryType,
    left: &ConstantValue,
    right: &ConstantValue,
    location: &SourceLocation,
) -> Result<Option<ConstantValue>> {
    match (left, right) {
        (ConstantValue::Single(a), ConstantValue::Single(b)) => {
            Ok(fold_binary_single(op, a, b, location)?.map(ConstantValue::Single))
        }
        (ConstantValue::Vector(a), ConstantValue::Vector(b)) => {
            if a.component_count() != b.component_count() {
                return Ok(None);
            }
            let mut components = SmallVec::new();
            for (ca, cb) in a.components.iter().zip(&b.components) {
                match fold_binary_single(op, ca, cb, location)? {
                    Some(component) => components.push(component),
                    None => return Ok(None),
                }
            }
            Ok(Some(ConstantValue::Vector(ConstantVectorValue::new(
                components,
            ))))
        }
        // scalar broadcast
        (ConstantValue::Vector(a), ConstantValue::Single(b)) => {
            let mut components = SmallVec::new();
            for ca in &a.components {
                match fold_binary_single(op, ca, b, location)? {
                    Some(component) => components.push(component),
                    None => return Ok(None),
                }
            }
            Ok(Some(ConstantValue::Vector(ConstantVectorValue::new(
                components,
            ))))
        }
        (ConstantValue::Single(a), ConstantValue::Vector(b)) => {
            let mut components = SmallVec::new();
            for cb in &b.components {
                match fold_binary_single(op, a, cb, location)? {
                    Some(component) => components.push(component),
                    None => return Ok(None),
                }
            }
            Ok(Some(ConstantValue::Vector(ConstantVectorValue::new(
                components,
            ))))
        }
        _ => Ok(None),
    }
}

fn fold_unary_single(
    op: UnaryType,
    value: &ConstantSingleValue,
) -> Option<ConstantSingleValue> {
    use ConstantSingleValue::*;
    Some(match (op, value) {
        (UnaryType::Minus, I32(v)) => I32(v.wrapping_neg()),
        (UnaryType::Minus, IntLiteral(v)) => IntLiteral(v.wrapping_neg()),
        (UnaryType::Minus, F32(v)) => F32(-v),
        (UnaryType::Minus, F64(v)) => F64(-v),
        (UnaryType::Minus, FloatLiteral(v)) => FloatLiteral(-v),
        (UnaryType::Plus, v @ (I32(_) | U32(_) | IntLiteral(_) | F32(_) | F64(_) | FloatLiteral(_))) => {
            v.clone()
        }
        (UnaryType::LogicalNot, Bool(v)) => Bool(!v),
        (UnaryType::BitwiseNot, I32(v)) => I32(!v),
        (UnaryType::BitwiseNot, U32(v)) => U32(!v),
        (UnaryType::BitwiseNot, IntLiteral(v)) => IntLiteral(!v),
        _ => return None,
    })
}

fn fold_unary(
    op: UnaryType,
    value: &ConstantValue,
    _location: &SourceLocation,
) -> Result<Option<ConstantValue>> {
    Ok(match value {
        ConstantValue::Single(single) => fold_unary_single(op, single).map(ConstantValue::Single),
        ConstantValue::Vector(vector) => {
            let mut components = SmallVec::new();
            for component in &vector.components {
                match fold_unary_single(op, component) {
                    Some(folded) => components.push(folded),
                    None => return Ok(None),
                }
            }
            Some(ConstantValue::Vector(ConstantVectorValue::new(components)))
        }
        _ => None,
    })
}

fn fold_swizzle(value: &ConstantValue, components: &[u32]) -> Option<ConstantValue> {
    let pick = |index: u32| -> Option<ConstantSingleValue> {
        match value {
            ConstantValue::Single(single) => (index == 0).then(|| single.clone()),
            ConstantValue::Vector(vector) => vector.components.get(index as usize).cloned(),
            _ => None,
        }
    };

    if components.len() == 1 {
        return pick(components[0]).map(ConstantValue::Single);
    }

    let mut picked = SmallVec::new();
    for &component in components {
        picked.push(pick(component)?);
    }
    Some(ConstantValue::Vector(ConstantVectorValue::new(picked)))
}

/// Converts a scalar to a concrete primitive type, for cast folding.
fn convert_single(
    value: &ConstantSingleValue,
    target: PrimitiveType,
) -> Option<ConstantSingleValue> {
    use ConstantSingleValue::*;

    let as_f64 = |value: &ConstantSingleValue| -> Option<f64> {
        Some(match value {
            F32(v) => f64::from(*v),
            F64(v) | FloatLiteral(v) => *v,
            I32(v) => f64::from(*v),
            U32(v) => f64::from(*v),
            IntLiteral(v) => *v as f64,
            _ => return None,
        })
    };

    Some(match target {
        PrimitiveType::Bool => match value {
            Bool(v) => Bool(*v),
            _ => return None,
        },
        PrimitiveType::Float32 => F32(as_f64(value)? as f32),
        PrimitiveType::Float64 => F64(as_f64(value)?),
        PrimitiveType::Int32 => match value {
            I32(v) => I32(*v),
            // same-width integer casts preserve bits
            U32(v) => I32(*v as i32),
            IntLiteral(v) => I32(*v as i32),
            F32(v) => I32(*v as i32),
            F64(v) | FloatLiteral(v) => I32(*v as i32),
            _ => return None,
        },
        PrimitiveType::UInt32 => match value {
            U32(v) => U32(*v),
            I32(v) => U32(*v as u32),
            IntLiteral(v) => U32(*v as u32),
            F32(v) => U32(*v as u32),
            F64(v) | FloatLiteral(v) => U32(*v as u32),
            _ => return None,
        },
        PrimitiveType::String
        | PrimitiveType::FloatLiteral
        | PrimitiveType::IntLiteral => return None,
    })
}

fn fold_cast(
    target: &ExpressionType,
    values: &[ConstantValue],
    _location: &SourceLocation,
) -> Result<Option<ConstantValue>> {
    match target {
        ExpressionType::Primitive(primitive) => {
            let [ConstantValue::Single(single)] = values else {
                return Ok(None);
            };
            Ok(convert_single(single, *primitive).map(ConstantValue::Single))
        }
        ExpressionType::Vector(vector) => {
            // flatten the component stream
            let mut components: SmallVec<[ConstantSingleValue; 4]> = SmallVec::new();
            for value in values {
                match value {
                    ConstantValue::Single(single) => {
                        match convert_single(single, vector.base) {
                            Some(converted) => components.push(converted),
                            None => return Ok(None),
                        }
                    }
                    ConstantValue::Vector(inner) => {
                        for component in &inner.components {
                            match convert_single(component, vector.base) {
                                Some(converted) => components.push(converted),
                                None => return Ok(None),
                            }
                        }
                    }
                    _ => return Ok(None),
                }
            }

            // a single scalar splats to the full width
            if components.len() == 1 && vector.component_count > 1 {
                let single = components[0].clone();
                while (components.len() as u32) < vector.component_count {
                    components.push(single.clone());
                }
            }

            if components.len() as u32 != vector.component_count {
                return Ok(None);
            }
            Ok(Some(ConstantValue::Vector(ConstantVectorValue::new(
                components,
            ))))
        }
        ExpressionType::Array(array) => {
            if values.len() as u32 != array.length {
                return Ok(None);
            }
            Ok(Some(ConstantValue::Array(ConstantArrayValue {
                values: values.to_vec(),
            })))
        }
        _ => Ok(None),
    }
}

fn fold_intrinsic(kind: IntrinsicKind, values: &[ConstantValue]) -> Option<ConstantValue> {
    use ConstantSingleValue::*;

    fn map_componentwise(
        values: &[ConstantValue],
        op: impl Fn(&[&ConstantSingleValue]) -> Option<ConstantSingleValue>,
    ) -> Option<ConstantValue> {
        if values.iter().all(|v| matches!(v, ConstantValue::Single(_))) {
            let singles: Vec<_> = values
                .iter()
                .map(|v| match v {
                    ConstantValue::Single(s) => s,
                    _ => unreachable!(),
                })
                .collect();
            return op(&singles).map(ConstantValue::Single);
        }

        let count = match values.first()? {
            ConstantValue::Vector(vector) => vector.component_count(),
            _ => return None,
        };
        let mut components = SmallVec::new();
        for index in 0..count as usize {
            let mut row = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    ConstantValue::Vector(vector) => row.push(&vector.components[index]),
                    _ => return None,
                }
            }
            components.push(op(&row)?);
        }
        Some(ConstantValue::Vector(ConstantVectorValue::new(components)))
    }

    match kind {
        IntrinsicKind::Abs => map_componentwise(values, |row| match row {
            [I32(v)] => Some(I32(v.wrapping_abs())),
            [IntLiteral(v)] => Some(IntLiteral(v.wrapping_abs())),
            [F32(v)] => Some(F32(v.abs())),
            [F64(v)] => Some(F64(v.abs())),
            [FloatLiteral(v)] => Some(FloatLiteral(v.abs())),
            _ => None,
        }),
        IntrinsicKind::Sign => map_componentwise(values, |row| match row {
            [I32(v)] => Some(I32(v.signum())),
            [IntLiteral(v)] => Some(IntLiteral(v.signum())),
            [F32(v)] => Some(F32(v.signum())),
            [F64(v)] => Some(F64(v.signum())),
            [FloatLiteral(v)] => Some(FloatLiteral(v.signum())),
            _ => None,
        }),
        IntrinsicKind::Min | IntrinsicKind::Max => map_componentwise(values, |row| {
            let [a, b] = row else { return None };
            let ordering = compare_order(a, b)?;
            let take_left = match kind {
                IntrinsicKind::Min => ordering != std::cmp::Ordering::Greater,
                _ => ordering != std::cmp::Ordering::Less,
            };
            Some(if take_left { (*a).clone() } else { (*b).clone() })
        }),
        IntrinsicKind::Clamp => map_componentwise(values, |row| {
            let [value, low, high] = row else { return None };
            let clamped_low = match compare_order(value, low)? {
                std::cmp::Ordering::Less => (*low).clone(),
                _ => (*value).clone(),
            };
            Some(match compare_order(&clamped_low, high)? {
                std::cmp::Ordering::Greater => (*high).clone(),
                _ => clamped_low,
            })
        }),
        _ => None,
    }
}

/// The constant-propagation pass.
#[derive(Default)]
pub struct ConstantPropagationPass;

impl ConstantPropagationPass {
    /// Unwraps the scope around a taken `const if` branch so its
    /// declarations splice into the outer scope, preserving index
    /// validity.
    fn unscope(statement: Statement) -> Statement {
        match statement {
            Statement::Scoped(scoped) => *scoped.statement,
            other => other,
        }
    }
}

impl Transformer for ConstantPropagationPass {
    fn transform_expression(
        &mut self,
        expr: &mut Expression,
        state: &mut TransformState,
    ) -> Result<ExpressionTransform> {
        if matches!(
            expr,
            Expression::ConstantValue(_) | Expression::ConstantArrayValue(_)
        ) {
            return Ok(ExpressionTransform::DontVisitChildren);
        }

        if let Some(value) = compute_constant(expr, state.ctx)? {
            if !matches!(value, ConstantValue::NoValue) {
                return Ok(ExpressionTransform::Replace(constant_to_expression(
                    value,
                    expr.location().clone(),
                )));
            }
        }

        Ok(ExpressionTransform::VisitChildren)
    }

    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        match stmt {
            Statement::Branch(branch) => {
                // evaluate `const if` (and any branch whose conditions all
                // fold) down to the taken branch
                let mut all_known = true;
                let mut taken: Option<usize> = None;
                for (index, cond) in branch.cond_statements.iter().enumerate() {
                    match compute_constant(&cond.condition, state.ctx)?
                        .as_ref()
                        .and_then(ConstantValue::as_bool)
                    {
                        Some(true) => {
                            taken = Some(index);
                            break;
                        }
                        Some(false) => {}
                        None => {
                            all_known = false;
                            break;
                        }
                    }
                }

                if let Some(index) = taken {
                    let branch_statement = *branch.cond_statements.swap_remove(index).statement;
                    return Ok(StatementTransform::Replace(Self::unscope(branch_statement)));
                }

                if all_known {
                    // every condition is false
                    return match branch.else_statement.take() {
                        Some(else_statement) => {
                            Ok(StatementTransform::Replace(Self::unscope(*else_statement)))
                        }
                        None => Ok(StatementTransform::Remove),
                    };
                }

                if branch.is_const && !state.ctx.partial_compilation {
                    let location = branch
                        .cond_statements
                        .first()
                        .map(|cond| cond.condition.location().clone())
                        .unwrap_or_else(|| branch.location.clone());
                    return Err(Error::new(
                        location,
                        CompilationError::ConstantExpressionRequired,
                    ));
                }

                Ok(StatementTransform::VisitChildren)
            }
            Statement::Conditional(conditional) => {
                match compute_constant(&conditional.condition, state.ctx)?
                    .as_ref()
                    .and_then(ConstantValue::as_bool)
                {
                    Some(true) => {
                        let inner = std::mem::replace(
                            &mut *conditional.statement,
                            Statement::no_op(conditional.location.clone()),
                        );
                        Ok(StatementTransform::Replace(inner))
                    }
                    Some(false) => Ok(StatementTransform::Remove),
                    None => {
                        if state.ctx.partial_compilation {
                            Ok(StatementTransform::VisitChildren)
                        } else {
                            Err(Error::new(
                                conditional.condition.location().clone(),
                                CompilationError::ConstantExpressionRequired,
                            ))
                        }
                    }
                }
            }
            _ => Ok(StatementTransform::VisitChildren),
        }
    }
}

impl Pass for ConstantPropagationPass {
    fn name(&self) -> &'static str {
        "constant propagation"
    }

    fn transform(
        &mut self,
        module: &mut nzslc_par::ast::Module,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        transform_module(self, module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn loc() -> SourceLocation {
        SourceLocation::default()
    }

    fn binary(op: BinaryType, left: Expression, right: Expression) -> Expression {
        Expression::Binary(BinaryExpression {
            op,
            left: Box::new(left),
            right: Box::new(right),
            cached_type: None,
            location: loc(),
        })
    }

    fn float(value: f64) -> Expression {
        Expression::constant(
            ConstantValue::Single(ConstantSingleValue::FloatLiteral(value)),
            loc(),
        )
    }

    fn eval(expr: &Expression) -> Option<ConstantValue> {
        let ctx = TransformerContext::new();
        compute_constant(expr, &ctx).unwrap()
    }

    #[test]
    fn test_arithmetic_chain() {
        // 8.0 * (7.0 + 5.0) * 2.0 / 4.0 - 6.0 % 7.0 == 42.0
        let expr = binary(
            BinaryType::Subtract,
            binary(
                BinaryType::Divide,
                binary(
                    BinaryType::Multiply,
                    binary(
                        BinaryType::Multiply,
                        float(8.0),
                        binary(BinaryType::Add, float(7.0), float(5.0)),
                    ),
                    float(2.0),
                ),
                float(4.0),
            ),
            binary(BinaryType::Modulo, float(6.0), float(7.0)),
        );

        assert_eq!(
            eval(&expr),
            Some(ConstantValue::Single(ConstantSingleValue::FloatLiteral(
                42.0
            )))
        );
    }

    #[test]
    fn test_integer_wrapping() {
        let expr = binary(
            BinaryType::Add,
            Expression::constant(ConstantValue::i32(i32::MAX), loc()),
            Expression::constant(ConstantValue::i32(1), loc()),
        );
        assert_eq!(eval(&expr), Some(ConstantValue::i32(i32::MIN)));
    }

    #[test]
    fn test_division_by_zero_fails() {
        let expr = binary(
            BinaryType::Divide,
            Expression::constant(ConstantValue::i32(1), loc()),
            Expression::constant(ConstantValue::i32(0), loc()),
        );
        let ctx = TransformerContext::new();
        assert!(compute_constant(&expr, &ctx).is_err());
    }

    #[test]
    fn test_vector_swizzle_fold() {
        let vector = ConstantValue::Vector(ConstantVectorValue::new(smallvec![
            ConstantSingleValue::F32(1.0),
            ConstantSingleValue::F32(2.0),
            ConstantSingleValue::F32(3.0),
            ConstantSingleValue::F32(4.0),
        ]));
        let expr = Expression::Swizzle(SwizzleExpression {
            expr: Box::new(Expression::constant(vector, loc())),
            components: smallvec![1, 2, 3, 0],
            cached_type: None,
            location: loc(),
        });

        let ConstantValue::Vector(folded) = eval(&expr).unwrap() else {
            panic!("expected a vector");
        };
        assert_eq!(
            folded.components.as_slice(),
            &[
                ConstantSingleValue::F32(2.0),
                ConstantSingleValue::F32(3.0),
                ConstantSingleValue::F32(4.0),
                ConstantSingleValue::F32(1.0),
            ]
        );
    }

    #[test]
    fn test_scalar_swizzle_fold() {
        let expr = Expression::Swizzle(SwizzleExpression {
            expr: Box::new(Expression::constant(ConstantValue::f32(5.0), loc())),
            components: smallvec![0, 0, 0],
            cached_type: None,
            location: loc(),
        });

        let ConstantValue::Vector(folded) = eval(&expr).unwrap() else {
            panic!("expected a vector");
        };
        assert_eq!(folded.component_count(), 3);
        assert!(folded
            .components
            .iter()
            .all(|c| *c == ConstantSingleValue::F32(5.0)));
    }

    #[test]
    fn test_comparison_fold() {
        let expr = binary(
            BinaryType::CompLt,
            Expression::constant(ConstantValue::i32(1), loc()),
            Expression::constant(ConstantValue::i32(2), loc()),
        );
        assert_eq!(eval(&expr), Some(ConstantValue::bool(true)));
    }

    #[test]
    fn test_intrinsic_fold() {
        let expr = Expression::Intrinsic(IntrinsicExpression {
            intrinsic: IntrinsicKind::Max,
            parameters: vec![
                Expression::constant(ConstantValue::i32(3), loc()),
                Expression::constant(ConstantValue::i32(7), loc()),
            ],
            cached_type: None,
            location: loc(),
        });
        assert_eq!(eval(&expr), Some(ConstantValue::i32(7)));
    }

    #[test]
    fn test_cast_fold_vector() {
        let expr = Expression::Cast(CastExpression {
            target_type: ExpressionValue::Value(ExpressionType::vector(
                3,
                PrimitiveType::Float32,
            )),
            expressions: vec![float(1.5)],
            cached_type: None,
            location: loc(),
        });
        let ConstantValue::Vector(folded) = eval(&expr).unwrap() else {
            panic!("expected a vector splat");
        };
        assert_eq!(folded.component_count(), 3);
        assert_eq!(folded.components[0], ConstantSingleValue::F32(1.5));
    }

    #[test]
    fn test_bit_preserving_int_cast() {
        let expr = Expression::Cast(CastExpression {
            target_type: ExpressionValue::Value(ExpressionType::u32()),
            expressions: vec![Expression::constant(ConstantValue::i32(-1), loc())],
            cached_type: None,
            location: loc(),
        });
        assert_eq!(eval(&expr), Some(ConstantValue::u32(u32::MAX)));
    }

    #[test]
    fn test_folding_is_idempotent() {
        let folded = constant_to_expression(
            eval(&binary(BinaryType::Add, float(1.0), float(2.0))).unwrap(),
            loc(),
        );
        assert_eq!(
            eval(&folded),
            Some(ConstantValue::Single(ConstantSingleValue::FloatLiteral(
                3.0
            )))
        );
    }

    #[test]
    fn test_type_constants() {
        let expr = Expression::TypeConstant(TypeConstantExpression {
            ty: PrimitiveType::Float32,
            constant: TypeConstant::Max,
            cached_type: None,
            location: loc(),
        });
        assert_eq!(
            eval(&expr),
            Some(ConstantValue::Single(ConstantSingleValue::F32(f32::MAX)))
        );
    }
}
