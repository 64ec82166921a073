//! Expression types.
//!
//! [`ExpressionType`] is the closed sum of every type an expression can
//! have after resolution: primitives, vectors/matrices/arrays, structs,
//! resource types, and the "meta" types used while resolving (a function
//! value, a module value, a type used as a value, ...).
//!
//! Untyped literals keep the [`PrimitiveType::FloatLiteral`] /
//! [`PrimitiveType::IntLiteral`] markers until the literal-typing pass
//! reifies them against their use site; back-ends never see them.

use super::enums::{AccessPolicy, IntrinsicKind, TextureDim};
use std::fmt;

/// Scalar primitive types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    Float32,
    Float64,
    Int32,
    UInt32,
    String,
    /// A floating-point literal that has not been given a concrete width
    /// yet.
    FloatLiteral,
    /// An integer literal that has not been given a concrete type yet.
    IntLiteral,
}

impl PrimitiveType {
    /// Stable wire index.
    pub fn to_index(self) -> u32 {
        match self {
            PrimitiveType::Bool => 0,
            PrimitiveType::Float32 => 1,
            PrimitiveType::Float64 => 2,
            PrimitiveType::Int32 => 3,
            PrimitiveType::UInt32 => 4,
            PrimitiveType::String => 5,
            PrimitiveType::FloatLiteral => 6,
            PrimitiveType::IntLiteral => 7,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Some(match index {
            0 => PrimitiveType::Bool,
            1 => PrimitiveType::Float32,
            2 => PrimitiveType::Float64,
            3 => PrimitiveType::Int32,
            4 => PrimitiveType::UInt32,
            5 => PrimitiveType::String,
            6 => PrimitiveType::FloatLiteral,
            7 => PrimitiveType::IntLiteral,
            _ => return None,
        })
    }

    /// True for every type ordering and arithmetic accept.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            PrimitiveType::Float32
                | PrimitiveType::Float64
                | PrimitiveType::Int32
                | PrimitiveType::UInt32
                | PrimitiveType::FloatLiteral
                | PrimitiveType::IntLiteral
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            PrimitiveType::Int32 | PrimitiveType::UInt32 | PrimitiveType::IntLiteral
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            PrimitiveType::Float32 | PrimitiveType::Float64 | PrimitiveType::FloatLiteral
        )
    }

    /// True for the untyped literal markers.
    pub fn is_literal(self) -> bool {
        matches!(self, PrimitiveType::FloatLiteral | PrimitiveType::IntLiteral)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::Float32 => "f32",
            PrimitiveType::Float64 => "f64",
            PrimitiveType::Int32 => "i32",
            PrimitiveType::UInt32 => "u32",
            PrimitiveType::String => "string",
            PrimitiveType::FloatLiteral => "float literal",
            PrimitiveType::IntLiteral => "int literal",
        };
        f.write_str(name)
    }
}

/// `vecN[base]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VectorType {
    pub component_count: u32,
    pub base: PrimitiveType,
}

/// `matCxR[base]`; square matrices display as `matN`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MatrixType {
    pub column_count: u32,
    pub row_count: u32,
    pub base: PrimitiveType,
}

/// `array[T, N]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArrayType {
    pub inner: Box<ExpressionType>,
    pub length: u32,
}

/// `dyn_array[T]`: runtime-sized, only valid in storage buffers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DynArrayType {
    pub inner: Box<ExpressionType>,
}

/// `samplerND[base]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerType {
    pub dim: TextureDim,
    pub base: PrimitiveType,
    /// Depth-comparison sampler (`depth_samplerND`).
    pub depth: bool,
}

/// `textureND[base, access]` storage texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureType {
    pub dim: TextureDim,
    pub base: PrimitiveType,
    pub access: AccessPolicy,
}

/// `storage[S, access]` buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StorageType {
    pub struct_index: usize,
    pub access: AccessPolicy,
}

/// `uniform[S]` buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformType {
    pub struct_index: usize,
}

/// `push_constant[S]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PushConstantType {
    pub struct_index: usize,
}

/// The closed sum of every expression type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExpressionType {
    Primitive(PrimitiveType),
    Vector(VectorType),
    Matrix(MatrixType),
    Array(ArrayType),
    DynArray(DynArrayType),
    Struct(usize),
    Sampler(SamplerType),
    Texture(TextureType),
    Storage(StorageType),
    Uniform(UniformType),
    PushConstant(PushConstantType),

    // meta types, resolved away before back-end emission
    Alias(usize),
    Function(usize),
    Intrinsic(IntrinsicKind),
    Method {
        object: Box<ExpressionType>,
        method: String,
    },
    Module(usize),
    NamedExternalBlock(usize),
    /// A type used as a value (the callee of a cast such as
    /// `vec3[f32](...)`).
    Type(Box<ExpressionType>),
    /// A vector constructor whose base type is deduced from its
    /// arguments (`vec3(...)` without an explicit `[f32]`).
    ImplicitVector(u32),

    NoType,
}

impl ExpressionType {
    pub fn bool() -> Self {
        ExpressionType::Primitive(PrimitiveType::Bool)
    }

    pub fn f32() -> Self {
        ExpressionType::Primitive(PrimitiveType::Float32)
    }

    pub fn i32() -> Self {
        ExpressionType::Primitive(PrimitiveType::Int32)
    }

    pub fn u32() -> Self {
        ExpressionType::Primitive(PrimitiveType::UInt32)
    }

    pub fn vector(component_count: u32, base: PrimitiveType) -> Self {
        ExpressionType::Vector(VectorType {
            component_count,
            base,
        })
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, ExpressionType::Primitive(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, ExpressionType::Vector(_))
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, ExpressionType::Matrix(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ExpressionType::Array(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, ExpressionType::Struct(_))
    }

    /// Scalar or vector base type, if this type has one.
    pub fn base_primitive(&self) -> Option<PrimitiveType> {
        match self {
            ExpressionType::Primitive(primitive) => Some(*primitive),
            ExpressionType::Vector(vector) => Some(vector.base),
            ExpressionType::Matrix(matrix) => Some(matrix.base),
            _ => None,
        }
    }

    /// Component count: 1 for scalars, N for vectors.
    pub fn component_count(&self) -> Option<u32> {
        match self {
            ExpressionType::Primitive(_) => Some(1),
            ExpressionType::Vector(vector) => Some(vector.component_count),
            _ => None,
        }
    }

    /// True if this type still contains an untyped literal marker.
    pub fn contains_literal(&self) -> bool {
        match self {
            ExpressionType::Primitive(primitive) => primitive.is_literal(),
            ExpressionType::Vector(vector) => vector.base.is_literal(),
            ExpressionType::Matrix(matrix) => matrix.base.is_literal(),
            ExpressionType::Array(array) => array.inner.contains_literal(),
            ExpressionType::DynArray(array) => array.inner.contains_literal(),
            _ => false,
        }
    }

    /// The struct index wrapped by a resource type, if any.
    pub fn wrapped_struct_index(&self) -> Option<usize> {
        match self {
            ExpressionType::Storage(storage) => Some(storage.struct_index),
            ExpressionType::Uniform(uniform) => Some(uniform.struct_index),
            ExpressionType::PushConstant(push_constant) => Some(push_constant.struct_index),
            _ => None,
        }
    }
}

impl fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionType::Primitive(primitive) => primitive.fmt(f),
            ExpressionType::Vector(vector) => {
                write!(f, "vec{}[{}]", vector.component_count, vector.base)
            }
            ExpressionType::Matrix(matrix) => {
                if matrix.column_count == matrix.row_count {
                    write!(f, "mat{}[{}]", matrix.column_count, matrix.base)
                } else {
                    write!(
                        f,
                        "mat{}x{}[{}]",
                        matrix.column_count, matrix.row_count, matrix.base
                    )
                }
            }
            ExpressionType::Array(array) => write!(f, "array[{}, {}]", array.inner, array.length),
            ExpressionType::DynArray(array) => write!(f, "dyn_array[{}]", array.inner),
            ExpressionType::Struct(index) => write!(f, "struct #{index}"),
            ExpressionType::Sampler(sampler) => {
                let prefix = if sampler.depth { "depth_sampler" } else { "sampler" };
                write!(f, "{}{}[{}]", prefix, dim_suffix(sampler.dim), sampler.base)
            }
            ExpressionType::Texture(texture) => {
                write!(f, "texture{}[{}]", dim_suffix(texture.dim), texture.base)
            }
            ExpressionType::Storage(storage) => write!(f, "storage[struct #{}]", storage.struct_index),
            ExpressionType::Uniform(uniform) => write!(f, "uniform[struct #{}]", uniform.struct_index),
            ExpressionType::PushConstant(push_constant) => {
                write!(f, "push_constant[struct #{}]", push_constant.struct_index)
            }
            ExpressionType::Alias(index) => write!(f, "alias #{index}"),
            ExpressionType::Function(index) => write!(f, "function #{index}"),
            ExpressionType::Intrinsic(kind) => write!(f, "intrinsic {}", kind.identifier()),
            ExpressionType::Method { object, method } => write!(f, "method {method} of {object}"),
            ExpressionType::Module(index) => write!(f, "module #{index}"),
            ExpressionType::NamedExternalBlock(index) => write!(f, "external block #{index}"),
            ExpressionType::Type(inner) => write!(f, "type {inner}"),
            ExpressionType::ImplicitVector(count) => write!(f, "vec{count}"),
            ExpressionType::NoType => f.write_str("no type"),
        }
    }
}

fn dim_suffix(dim: TextureDim) -> &'static str {
    match dim {
        TextureDim::Cubemap => "_cube",
        TextureDim::Dim1D => "1D",
        TextureDim::Dim1DArray => "1D_array",
        TextureDim::Dim2D => "2D",
        TextureDim::Dim2DArray => "2D_array",
        TextureDim::Dim3D => "3D",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ExpressionType::f32().to_string(), "f32");
        assert_eq!(
            ExpressionType::vector(3, PrimitiveType::Float32).to_string(),
            "vec3[f32]"
        );
        assert_eq!(
            ExpressionType::Matrix(MatrixType {
                column_count: 4,
                row_count: 4,
                base: PrimitiveType::Float32
            })
            .to_string(),
            "mat4[f32]"
        );
        assert_eq!(
            ExpressionType::Array(ArrayType {
                inner: Box::new(ExpressionType::f32()),
                length: 5
            })
            .to_string(),
            "array[f32, 5]"
        );
    }

    #[test]
    fn test_literal_detection() {
        assert!(ExpressionType::Primitive(PrimitiveType::IntLiteral).contains_literal());
        assert!(
            ExpressionType::vector(2, PrimitiveType::FloatLiteral).contains_literal()
        );
        assert!(!ExpressionType::f32().contains_literal());
    }

    #[test]
    fn test_component_count() {
        assert_eq!(ExpressionType::f32().component_count(), Some(1));
        assert_eq!(
            ExpressionType::vector(4, PrimitiveType::Int32).component_count(),
            Some(4)
        );
        assert_eq!(ExpressionType::NoType.component_count(), None);
    }
}
