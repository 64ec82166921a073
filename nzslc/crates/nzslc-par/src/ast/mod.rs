//! AST data model.
//!
//! Nodes are plain enums of structs with exclusive parent-to-child
//! ownership: the tree is a tree, never a DAG. References to declared
//! identifiers are carried as indices into the transformer context's
//! tables, never as pointers, so rewriting passes can replace nodes in
//! place without breaking references.

mod constant_value;
mod enums;
mod module;
mod nodes;
mod option_hash;
mod types;

pub use constant_value::{ConstantArrayValue, ConstantSingleValue, ConstantValue, ConstantVectorValue};
pub use enums::{
    AccessPolicy, AssignType, BinaryType, BuiltinEntry, DepthWriteMode, IdentifierKind,
    InterpolationQualifier, IntrinsicKind, ModuleFeature, ParameterSemantic, ShaderStage,
    TextureDim, TypeConstant, UnaryType,
};
pub use module::{ImportedModule, Metadata, Module, Version};
pub use nodes::*;
pub use option_hash::{hash_option, OptionHash};
pub use types::{
    ArrayType, DynArrayType, ExpressionType, MatrixType, PrimitiveType, PushConstantType,
    SamplerType, StorageType, TextureType, UniformType, VectorType,
};
