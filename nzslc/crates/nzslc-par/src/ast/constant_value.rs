//! Constant values.
//!
//! The closed set of values constant expressions can fold to: no value,
//! a scalar, a small vector (2-4 homogeneous components), or an array of
//! scalars/vectors. Untyped literals have their own scalar variants so a
//! folded literal stays polymorphic until the literal-typing pass.

use super::types::{ArrayType, ExpressionType, PrimitiveType, VectorType};
use smallvec::SmallVec;
use std::fmt;

/// A single scalar constant.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantSingleValue {
    Bool(bool),
    F32(f32),
    F64(f64),
    I32(i32),
    U32(u32),
    String(String),
    FloatLiteral(f64),
    IntLiteral(i64),
}

impl ConstantSingleValue {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            ConstantSingleValue::Bool(_) => PrimitiveType::Bool,
            ConstantSingleValue::F32(_) => PrimitiveType::Float32,
            ConstantSingleValue::F64(_) => PrimitiveType::Float64,
            ConstantSingleValue::I32(_) => PrimitiveType::Int32,
            ConstantSingleValue::U32(_) => PrimitiveType::UInt32,
            ConstantSingleValue::String(_) => PrimitiveType::String,
            ConstantSingleValue::FloatLiteral(_) => PrimitiveType::FloatLiteral,
            ConstantSingleValue::IntLiteral(_) => PrimitiveType::IntLiteral,
        }
    }
}

impl fmt::Display for ConstantSingleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantSingleValue::Bool(value) => value.fmt(f),
            ConstantSingleValue::F32(value) => value.fmt(f),
            ConstantSingleValue::F64(value) => value.fmt(f),
            ConstantSingleValue::I32(value) => value.fmt(f),
            ConstantSingleValue::U32(value) => value.fmt(f),
            ConstantSingleValue::String(value) => write!(f, "\"{value}\""),
            ConstantSingleValue::FloatLiteral(value) => value.fmt(f),
            ConstantSingleValue::IntLiteral(value) => value.fmt(f),
        }
    }
}

/// A constant vector of 2 to 4 homogeneous components.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantVectorValue {
    pub components: SmallVec<[ConstantSingleValue; 4]>,
}

impl ConstantVectorValue {
    pub fn new(components: SmallVec<[ConstantSingleValue; 4]>) -> Self {
        debug_assert!((2..=4).contains(&components.len()));
        Self { components }
    }

    pub fn component_count(&self) -> u32 {
        self.components.len() as u32
    }

    pub fn base(&self) -> PrimitiveType {
        self.components[0].primitive_type()
    }

    pub fn vector_type(&self) -> VectorType {
        VectorType {
            component_count: self.component_count(),
            base: self.base(),
        }
    }
}

/// A constant array whose elements are all scalars or all vectors of the
/// same shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantArrayValue {
    pub values: Vec<ConstantValue>,
}

impl ConstantArrayValue {
    pub fn element_type(&self) -> ExpressionType {
        self.values
            .first()
            .map(ConstantValue::expression_type)
            .unwrap_or(ExpressionType::NoType)
    }
}

/// Any constant value.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    NoValue,
    Single(ConstantSingleValue),
    Vector(ConstantVectorValue),
    Array(ConstantArrayValue),
}

impl ConstantValue {
    pub fn bool(value: bool) -> Self {
        ConstantValue::Single(ConstantSingleValue::Bool(value))
    }

    pub fn f32(value: f32) -> Self {
        ConstantValue::Single(ConstantSingleValue::F32(value))
    }

    pub fn i32(value: i32) -> Self {
        ConstantValue::Single(ConstantSingleValue::I32(value))
    }

    pub fn u32(value: u32) -> Self {
        ConstantValue::Single(ConstantSingleValue::U32(value))
    }

    pub fn expression_type(&self) -> ExpressionType {
        match self {
            ConstantValue::NoValue => ExpressionType::NoType,
            ConstantValue::Single(single) => ExpressionType::Primitive(single.primitive_type()),
            ConstantValue::Vector(vector) => ExpressionType::Vector(vector.vector_type()),
            ConstantValue::Array(array) => ExpressionType::Array(ArrayType {
                inner: Box::new(array.element_type()),
                length: array.values.len() as u32,
            }),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstantValue::Single(ConstantSingleValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// Integer view of the value, accepting `i32`, `u32` and untyped
    /// integer literals. Used for array lengths and loop bounds.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConstantValue::Single(ConstantSingleValue::I32(value)) => Some(i64::from(*value)),
            ConstantValue::Single(ConstantSingleValue::U32(value)) => Some(i64::from(*value)),
            ConstantValue::Single(ConstantSingleValue::IntLiteral(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_integer().and_then(|value| u32::try_from(value).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_scalar_types() {
        assert_eq!(ConstantValue::bool(true).expression_type(), ExpressionType::bool());
        assert_eq!(ConstantValue::f32(1.5).expression_type(), ExpressionType::f32());
        assert_eq!(
            ConstantValue::Single(ConstantSingleValue::IntLiteral(3)).expression_type(),
            ExpressionType::Primitive(PrimitiveType::IntLiteral)
        );
    }

    #[test]
    fn test_vector_type() {
        let vector = ConstantVectorValue::new(smallvec![
            ConstantSingleValue::F32(1.0),
            ConstantSingleValue::F32(2.0),
            ConstantSingleValue::F32(3.0),
        ]);
        assert_eq!(
            ConstantValue::Vector(vector).expression_type().to_string(),
            "vec3[f32]"
        );
    }

    #[test]
    fn test_array_type() {
        let array = ConstantArrayValue {
            values: vec![ConstantValue::i32(1), ConstantValue::i32(2)],
        };
        assert_eq!(
            ConstantValue::Array(array).expression_type().to_string(),
            "array[i32, 2]"
        );
    }

    #[test]
    fn test_integer_views() {
        assert_eq!(ConstantValue::i32(-4).as_integer(), Some(-4));
        assert_eq!(ConstantValue::u32(7).as_u32(), Some(7));
        assert_eq!(ConstantValue::i32(-4).as_u32(), None);
        assert_eq!(ConstantValue::f32(1.0).as_integer(), None);
    }
}
