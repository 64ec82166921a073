//! Intrinsic catalog.
//!
//! Intrinsics form a closed set with typed parameter schemas; the resolve
//! pass dispatches calls against [`check_intrinsic`], which validates the
//! argument types and infers the return type. Signature mismatches fail
//! with `IntrinsicSignatureMismatch`.

use crate::type_rules::unify_types;
use nzslc_par::ast::{
    ExpressionType, IntrinsicKind, PrimitiveType, TextureDim, VectorType,
};
use nzslc_util::{CompilationError, Error, Result, SourceLocation};

/// Every name-callable intrinsic (method-style intrinsics such as
/// `Sample` are dispatched through method resolution instead).
pub const NAMED_INTRINSICS: &[IntrinsicKind] = &[
    IntrinsicKind::Abs,
    IntrinsicKind::All,
    IntrinsicKind::Any,
    IntrinsicKind::ArraySize,
    IntrinsicKind::Ceil,
    IntrinsicKind::Clamp,
    IntrinsicKind::Cos,
    IntrinsicKind::Cross,
    IntrinsicKind::Distance,
    IntrinsicKind::Dot,
    IntrinsicKind::Exp,
    IntrinsicKind::Exp2,
    IntrinsicKind::Floor,
    IntrinsicKind::Fract,
    IntrinsicKind::InverseSqrt,
    IntrinsicKind::Length,
    IntrinsicKind::Lerp,
    IntrinsicKind::Log,
    IntrinsicKind::Log2,
    IntrinsicKind::Max,
    IntrinsicKind::Min,
    IntrinsicKind::Normalize,
    IntrinsicKind::Pow,
    IntrinsicKind::Rcp,
    IntrinsicKind::Reflect,
    IntrinsicKind::Refract,
    IntrinsicKind::Round,
    IntrinsicKind::RoundEven,
    IntrinsicKind::Select,
    IntrinsicKind::Sign,
    IntrinsicKind::Sin,
    IntrinsicKind::Sqrt,
    IntrinsicKind::Tan,
    IntrinsicKind::Trunc,
];

fn mismatch(kind: IntrinsicKind, index: u32, location: &SourceLocation) -> Error {
    Error::new(
        location.clone(),
        CompilationError::IntrinsicSignatureMismatch {
            intrinsic: kind.identifier(),
            index,
        },
    )
}

fn check_arity(
    kind: IntrinsicKind,
    args: &[ExpressionType],
    expected: usize,
    location: &SourceLocation,
) -> Result<()> {
    if args.len() != expected {
        return Err(Error::new(
            location.clone(),
            CompilationError::IntrinsicExpectedParameterCount {
                intrinsic: kind.identifier(),
                expected: expected as u32,
                got: args.len() as u32,
            },
        ));
    }
    Ok(())
}

fn is_float_scalar_or_vector(ty: &ExpressionType) -> bool {
    ty.base_primitive().is_some_and(PrimitiveType::is_float) && !ty.is_matrix()
}

fn is_numeric_scalar_or_vector(ty: &ExpressionType) -> bool {
    ty.base_primitive().is_some_and(PrimitiveType::is_numeric) && !ty.is_matrix()
}

fn is_float_vector(ty: &ExpressionType) -> bool {
    matches!(ty, ExpressionType::Vector(vector) if vector.base.is_float())
}

fn scalar_of(ty: &ExpressionType) -> ExpressionType {
    match ty {
        ExpressionType::Vector(vector) => ExpressionType::Primitive(vector.base),
        other => other.clone(),
    }
}

fn unify_all(
    kind: IntrinsicKind,
    args: &[ExpressionType],
    location: &SourceLocation,
) -> Result<ExpressionType> {
    let mut result = args[0].clone();
    for (index, arg) in args.iter().enumerate().skip(1) {
        result = unify_types(&result, arg)
            .ok_or_else(|| mismatch(kind, index as u32, location))?;
    }
    Ok(result)
}

/// Validates the argument types of an intrinsic call and returns its
/// result type.
pub fn check_intrinsic(
    kind: IntrinsicKind,
    args: &[ExpressionType],
    location: &SourceLocation,
) -> Result<ExpressionType> {
    use IntrinsicKind::*;

    match kind {
        // component-wise float, one argument
        Ceil | Cos | Exp | Exp2 | Floor | Fract | InverseSqrt | Log | Log2 | Rcp | Round
        | RoundEven | Sin | Sqrt | Tan | Trunc => {
            check_arity(kind, args, 1, location)?;
            if !is_float_scalar_or_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            Ok(args[0].clone())
        }

        // component-wise numeric, one argument
        Abs | Sign => {
            check_arity(kind, args, 1, location)?;
            if !is_numeric_scalar_or_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            Ok(args[0].clone())
        }

        // component-wise numeric, same-typed arguments
        Max | Min => {
            check_arity(kind, args, 2, location)?;
            if !is_numeric_scalar_or_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            unify_all(kind, args, location)
        }
        Clamp => {
            check_arity(kind, args, 3, location)?;
            if !is_numeric_scalar_or_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            unify_all(kind, args, location)
        }

        // component-wise float, same-typed arguments
        Pow => {
            check_arity(kind, args, 2, location)?;
            if !is_float_scalar_or_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            unify_all(kind, args, location)
        }
        Lerp => {
            check_arity(kind, args, 3, location)?;
            if !is_float_scalar_or_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            unify_all(kind, args, location)
        }

        // geometry
        Dot => {
            check_arity(kind, args, 2, location)?;
            if !is_float_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            let unified = unify_all(kind, args, location)?;
            Ok(scalar_of(&unified))
        }
        Distance => {
            check_arity(kind, args, 2, location)?;
            if !is_float_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            let unified = unify_all(kind, args, location)?;
            Ok(scalar_of(&unified))
        }
        Cross => {
            check_arity(kind, args, 2, location)?;
            match &args[0] {
                ExpressionType::Vector(vector)
                    if vector.component_count == 3 && vector.base.is_float() => {}
                _ => return Err(mismatch(kind, 0, location)),
            }
            unify_all(kind, args, location)
        }
        Length => {
            check_arity(kind, args, 1, location)?;
            if !is_float_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            Ok(scalar_of(&args[0]))
        }
        Normalize => {
            check_arity(kind, args, 1, location)?;
            if !is_float_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            Ok(args[0].clone())
        }
        Reflect => {
            check_arity(kind, args, 2, location)?;
            if !is_float_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            unify_all(kind, args, location)
        }
        Refract => {
            check_arity(kind, args, 3, location)?;
            if !is_float_vector(&args[0]) {
                return Err(mismatch(kind, 0, location));
            }
            let vector = unify_types(&args[0], &args[1])
                .ok_or_else(|| mismatch(kind, 1, location))?;
            let base = vector.base_primitive().expect("vector has a base");
            let eta = unify_types(&args[2], &ExpressionType::Primitive(base))
                .ok_or_else(|| mismatch(kind, 2, location))?;
            debug_assert!(eta.is_primitive());
            Ok(vector)
        }

        // boolean reductions
        All | Any => {
            check_arity(kind, args, 1, location)?;
            match &args[0] {
                ExpressionType::Vector(vector) if vector.base == PrimitiveType::Bool => {
                    Ok(ExpressionType::bool())
                }
                ExpressionType::Primitive(PrimitiveType::Bool) => Ok(ExpressionType::bool()),
                _ => Err(mismatch(kind, 0, location)),
            }
        }

        Select => {
            check_arity(kind, args, 3, location)?;
            let value_type = unify_types(&args[1], &args[2])
                .ok_or_else(|| mismatch(kind, 2, location))?;
            match &args[0] {
                ExpressionType::Primitive(PrimitiveType::Bool) => Ok(value_type),
                ExpressionType::Vector(cond)
                    if cond.base == PrimitiveType::Bool
                        && Some(cond.component_count) == value_type.component_count() =>
                {
                    Ok(value_type)
                }
                _ => Err(mismatch(kind, 0, location)),
            }
        }

        ArraySize => {
            check_arity(kind, args, 1, location)?;
            match &args[0] {
                ExpressionType::Array(_) | ExpressionType::DynArray(_) => {
                    Ok(ExpressionType::u32())
                }
                _ => Err(mismatch(kind, 0, location)),
            }
        }

        TextureSampleImplicitLod => {
            check_arity(kind, args, 2, location)?;
            let ExpressionType::Sampler(sampler) = &args[0] else {
                return Err(mismatch(kind, 0, location));
            };
            let expected_coords = coords_type(sampler.dim, PrimitiveType::Float32);
            if unify_types(&args[1], &expected_coords).is_none() {
                return Err(mismatch(kind, 1, location));
            }
            Ok(ExpressionType::vector(4, sampler.base))
        }

        TextureRead => {
            check_arity(kind, args, 2, location)?;
            let ExpressionType::Texture(texture) = &args[0] else {
                return Err(mismatch(kind, 0, location));
            };
            let expected_coords = coords_type(texture.dim, PrimitiveType::Int32);
            if unify_types(&args[1], &expected_coords).is_none() {
                return Err(mismatch(kind, 1, location));
            }
            Ok(ExpressionType::vector(4, texture.base))
        }

        TextureWrite => {
            check_arity(kind, args, 3, location)?;
            let ExpressionType::Texture(texture) = &args[0] else {
                return Err(mismatch(kind, 0, location));
            };
            let expected_coords = coords_type(texture.dim, PrimitiveType::Int32);
            if unify_types(&args[1], &expected_coords).is_none() {
                return Err(mismatch(kind, 1, location));
            }
            let expected_value = ExpressionType::vector(4, texture.base);
            if unify_types(&args[2], &expected_value).is_none() {
                return Err(mismatch(kind, 2, location));
            }
            Ok(ExpressionType::NoType)
        }
    }
}

fn coords_type(dim: TextureDim, base: PrimitiveType) -> ExpressionType {
    match dim.coordinate_count() {
        1 => ExpressionType::Primitive(base),
        count => ExpressionType::Vector(VectorType {
            component_count: count,
            base,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::default()
    }

    fn vec3f() -> ExpressionType {
        ExpressionType::vector(3, PrimitiveType::Float32)
    }

    #[test]
    fn test_component_wise_float() {
        assert_eq!(
            check_intrinsic(IntrinsicKind::Cos, &[vec3f()], &loc()).unwrap(),
            vec3f()
        );
        assert!(check_intrinsic(IntrinsicKind::Cos, &[ExpressionType::i32()], &loc()).is_err());
    }

    #[test]
    fn test_min_max_unify_literals() {
        let result = check_intrinsic(
            IntrinsicKind::Max,
            &[
                ExpressionType::i32(),
                ExpressionType::Primitive(PrimitiveType::IntLiteral),
            ],
            &loc(),
        )
        .unwrap();
        assert_eq!(result, ExpressionType::i32());
    }

    #[test]
    fn test_dot_returns_scalar() {
        assert_eq!(
            check_intrinsic(IntrinsicKind::Dot, &[vec3f(), vec3f()], &loc()).unwrap(),
            ExpressionType::f32()
        );
    }

    #[test]
    fn test_cross_requires_vec3() {
        let vec2 = ExpressionType::vector(2, PrimitiveType::Float32);
        assert!(check_intrinsic(IntrinsicKind::Cross, &[vec2.clone(), vec2], &loc()).is_err());
    }

    #[test]
    fn test_arity_error() {
        let err = check_intrinsic(IntrinsicKind::Dot, &[vec3f()], &loc()).unwrap_err();
        assert!(err.to_string().contains("expects 2 parameter(s)"));
    }

    #[test]
    fn test_select() {
        let result = check_intrinsic(
            IntrinsicKind::Select,
            &[ExpressionType::bool(), vec3f(), vec3f()],
            &loc(),
        )
        .unwrap();
        assert_eq!(result, vec3f());

        // mismatching condition width
        let cond = ExpressionType::vector(2, PrimitiveType::Bool);
        assert!(check_intrinsic(IntrinsicKind::Select, &[cond, vec3f(), vec3f()], &loc()).is_err());
    }

    #[test]
    fn test_sampler_sampling() {
        let sampler = ExpressionType::Sampler(nzslc_par::ast::SamplerType {
            dim: TextureDim::Dim2D,
            base: PrimitiveType::Float32,
            depth: false,
        });
        let coords = ExpressionType::vector(2, PrimitiveType::Float32);
        let result = check_intrinsic(
            IntrinsicKind::TextureSampleImplicitLod,
            &[sampler, coords],
            &loc(),
        )
        .unwrap();
        assert_eq!(result, ExpressionType::vector(4, PrimitiveType::Float32));
    }

    #[test]
    fn test_array_size() {
        let array = ExpressionType::Array(nzslc_par::ast::ArrayType {
            inner: Box::new(ExpressionType::f32()),
            length: 4,
        });
        assert_eq!(
            check_intrinsic(IntrinsicKind::ArraySize, &[array], &loc()).unwrap(),
            ExpressionType::u32()
        );
    }
}
