//! Shared typing rules.
//!
//! Element types must match exactly between `f32`/`f64`/`i32`/`u32`;
//! there is no implicit widening. The only flexibility is untyped
//! literals, which are compatible with any concrete type of their family
//! until the literal-typing pass reifies them.

use nzslc_par::ast::{ExpressionType, PrimitiveType, VectorType};

/// True if an untyped `literal` marker may take the concrete type.
pub fn literal_compatible(literal: PrimitiveType, concrete: PrimitiveType) -> bool {
    match literal {
        PrimitiveType::IntLiteral => matches!(
            concrete,
            PrimitiveType::Int32 | PrimitiveType::UInt32
        ),
        PrimitiveType::FloatLiteral => matches!(
            concrete,
            PrimitiveType::Float32 | PrimitiveType::Float64
        ),
        _ => false,
    }
}

/// Unifies two primitive types, treating literals as polymorphic.
pub fn unify_primitives(a: PrimitiveType, b: PrimitiveType) -> Option<PrimitiveType> {
    if a == b {
        return Some(a);
    }
    if a.is_literal() && literal_compatible(a, b) {
        return Some(b);
    }
    if b.is_literal() && literal_compatible(b, a) {
        return Some(a);
    }
    None
}

/// Unifies two expression types, treating untyped literals as
/// polymorphic. Returns the concrete result type when the two are
/// compatible.
pub fn unify_types(a: &ExpressionType, b: &ExpressionType) -> Option<ExpressionType> {
    if a == b {
        return Some(a.clone());
    }

    match (a, b) {
        (ExpressionType::Primitive(pa), ExpressionType::Primitive(pb)) => {
            unify_primitives(*pa, *pb).map(ExpressionType::Primitive)
        }
        (ExpressionType::Vector(va), ExpressionType::Vector(vb))
            if va.component_count == vb.component_count =>
        {
            unify_primitives(va.base, vb.base).map(|base| {
                ExpressionType::Vector(VectorType {
                    component_count: va.component_count,
                    base,
                })
            })
        }
        (ExpressionType::Matrix(ma), ExpressionType::Matrix(mb))
            if ma.column_count == mb.column_count && ma.row_count == mb.row_count =>
        {
            unify_primitives(ma.base, mb.base).map(|base| {
                ExpressionType::Matrix(nzslc_par::ast::MatrixType {
                    column_count: ma.column_count,
                    row_count: ma.row_count,
                    base,
                })
            })
        }
        (ExpressionType::Array(aa), ExpressionType::Array(ab)) if aa.length == ab.length => {
            unify_types(&aa.inner, &ab.inner).map(|inner| {
                ExpressionType::Array(nzslc_par::ast::ArrayType {
                    inner: Box::new(inner),
                    length: aa.length,
                })
            })
        }
        _ => None,
    }
}

/// True if `source` can be assigned to a slot of type `target`.
pub fn is_assignable(target: &ExpressionType, source: &ExpressionType) -> bool {
    if target == source {
        return true;
    }
    // assignment only tolerates literal polymorphism on the source side
    match (target, source) {
        (ExpressionType::Primitive(pt), ExpressionType::Primitive(ps)) => {
            ps.is_literal() && literal_compatible(*ps, *pt)
        }
        (ExpressionType::Vector(vt), ExpressionType::Vector(vs)) => {
            vt.component_count == vs.component_count
                && vs.base.is_literal()
                && literal_compatible(vs.base, vt.base)
        }
        (ExpressionType::Matrix(mt), ExpressionType::Matrix(ms)) => {
            mt.column_count == ms.column_count
                && mt.row_count == ms.row_count
                && ms.base.is_literal()
                && literal_compatible(ms.base, mt.base)
        }
        (ExpressionType::Array(at), ExpressionType::Array(as_)) => {
            at.length == as_.length && is_assignable(&at.inner, &as_.inner)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert_eq!(
            unify_types(&ExpressionType::f32(), &ExpressionType::f32()),
            Some(ExpressionType::f32())
        );
        assert_eq!(unify_types(&ExpressionType::f32(), &ExpressionType::i32()), None);
    }

    #[test]
    fn test_no_implicit_widening() {
        assert_eq!(
            unify_primitives(PrimitiveType::Float32, PrimitiveType::Float64),
            None
        );
        assert_eq!(
            unify_primitives(PrimitiveType::Int32, PrimitiveType::UInt32),
            None
        );
    }

    #[test]
    fn test_literal_polymorphism() {
        assert_eq!(
            unify_primitives(PrimitiveType::IntLiteral, PrimitiveType::UInt32),
            Some(PrimitiveType::UInt32)
        );
        assert_eq!(
            unify_primitives(PrimitiveType::FloatLiteral, PrimitiveType::Float64),
            Some(PrimitiveType::Float64)
        );
        assert_eq!(
            unify_primitives(PrimitiveType::IntLiteral, PrimitiveType::Float32),
            None
        );
    }

    #[test]
    fn test_vector_unification() {
        let literal_vec = ExpressionType::vector(3, PrimitiveType::FloatLiteral);
        let concrete_vec = ExpressionType::vector(3, PrimitiveType::Float32);
        assert_eq!(unify_types(&literal_vec, &concrete_vec), Some(concrete_vec.clone()));

        let other_count = ExpressionType::vector(2, PrimitiveType::Float32);
        assert_eq!(unify_types(&literal_vec, &other_count), None);
    }

    #[test]
    fn test_assignability() {
        assert!(is_assignable(
            &ExpressionType::f32(),
            &ExpressionType::Primitive(PrimitiveType::FloatLiteral)
        ));
        assert!(!is_assignable(
            &ExpressionType::Primitive(PrimitiveType::FloatLiteral),
            &ExpressionType::f32()
        ));
        assert!(!is_assignable(&ExpressionType::f32(), &ExpressionType::i32()));
    }
}
