//! Closed enumerations used across the AST.
//!
//! Every enum here has a stable `u32` wire index (used by the binary
//! serializer) and, where users can see it, a display name.

/// Defines a plain enum with stable `to_index`/`from_index` conversions.
macro_rules! indexed_enum {
    ($(#[$meta:meta])* pub enum $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Stable wire index of this variant.
            pub fn to_index(self) -> u32 {
                self as u32
            }

            /// Variant for a wire index, if in range.
            pub fn from_index(index: u32) -> Option<Self> {
                const VARIANTS: &[$name] = &[$($name::$variant),+];
                VARIANTS.get(index as usize).copied()
            }
        }
    };
}

indexed_enum! {
    /// Memory access allowed on a storage buffer or storage texture.
    pub enum AccessPolicy {
        ReadOnly,
        ReadWrite,
        WriteOnly,
    }
}

indexed_enum! {
    /// Assignment operators, simple and compound.
    pub enum AssignType {
        Simple,
        CompoundAdd,
        CompoundSubtract,
        CompoundMultiply,
        CompoundDivide,
        CompoundModulo,
        CompoundLogicalAnd,
        CompoundLogicalOr,
    }
}

indexed_enum! {
    /// Binary operators.
    pub enum BinaryType {
        Add,
        Subtract,
        Multiply,
        Divide,
        Modulo,
        CompEq,
        CompGe,
        CompGt,
        CompLe,
        CompLt,
        CompNe,
        LogicalAnd,
        LogicalOr,
        BitwiseAnd,
        BitwiseOr,
        BitwiseXor,
        ShiftLeft,
        ShiftRight,
    }
}

impl BinaryType {
    /// Operator spelling, used in error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryType::Add => "+",
            BinaryType::Subtract => "-",
            BinaryType::Multiply => "*",
            BinaryType::Divide => "/",
            BinaryType::Modulo => "%",
            BinaryType::CompEq => "==",
            BinaryType::CompGe => ">=",
            BinaryType::CompGt => ">",
            BinaryType::CompLe => "<=",
            BinaryType::CompLt => "<",
            BinaryType::CompNe => "!=",
            BinaryType::LogicalAnd => "&&",
            BinaryType::LogicalOr => "||",
            BinaryType::BitwiseAnd => "&",
            BinaryType::BitwiseOr => "|",
            BinaryType::BitwiseXor => "^",
            BinaryType::ShiftLeft => "<<",
            BinaryType::ShiftRight => ">>",
        }
    }
}

indexed_enum! {
    /// Unary operators.
    pub enum UnaryType {
        BitwiseNot,
        LogicalNot,
        Minus,
        Plus,
    }
}

impl UnaryType {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryType::BitwiseNot => "~",
            UnaryType::LogicalNot => "!",
            UnaryType::Minus => "-",
            UnaryType::Plus => "+",
        }
    }
}

indexed_enum! {
    /// Shader built-in values usable as struct member attributes.
    pub enum BuiltinEntry {
        BaseInstance,
        BaseVertex,
        DrawIndex,
        FragCoord,
        FragDepth,
        GlobalInvocationIndices,
        InstanceIndex,
        LocalInvocationIndex,
        LocalInvocationIndices,
        Position,
        VertexIndex,
        WorkgroupCount,
        WorkgroupIndices,
    }
}

impl BuiltinEntry {
    /// Attribute spelling of this builtin.
    pub fn identifier(self) -> &'static str {
        match self {
            BuiltinEntry::BaseInstance => "base_instance",
            BuiltinEntry::BaseVertex => "base_vertex",
            BuiltinEntry::DrawIndex => "draw_index",
            BuiltinEntry::FragCoord => "frag_coord",
            BuiltinEntry::FragDepth => "frag_depth",
            BuiltinEntry::GlobalInvocationIndices => "global_invocation_indices",
            BuiltinEntry::InstanceIndex => "instance_index",
            BuiltinEntry::LocalInvocationIndex => "local_invocation_index",
            BuiltinEntry::LocalInvocationIndices => "local_invocation_indices",
            BuiltinEntry::Position => "position",
            BuiltinEntry::VertexIndex => "vertex_index",
            BuiltinEntry::WorkgroupCount => "workgroup_count",
            BuiltinEntry::WorkgroupIndices => "workgroup_indices",
        }
    }

    pub fn from_identifier(name: &str) -> Option<Self> {
        const ALL: &[BuiltinEntry] = &[
            BuiltinEntry::BaseInstance,
            BuiltinEntry::BaseVertex,
            BuiltinEntry::DrawIndex,
            BuiltinEntry::FragCoord,
            BuiltinEntry::FragDepth,
            BuiltinEntry::GlobalInvocationIndices,
            BuiltinEntry::InstanceIndex,
            BuiltinEntry::LocalInvocationIndex,
            BuiltinEntry::LocalInvocationIndices,
            BuiltinEntry::Position,
            BuiltinEntry::VertexIndex,
            BuiltinEntry::WorkgroupCount,
            BuiltinEntry::WorkgroupIndices,
        ];
        ALL.iter().copied().find(|entry| entry.identifier() == name)
    }
}

indexed_enum! {
    /// Depth-write modes for fragment entry points.
    pub enum DepthWriteMode {
        Greater,
        Less,
        Replace,
        Unchanged,
    }
}

indexed_enum! {
    /// The table an [`crate::ast::IdentifierValueExpression`] index points
    /// into.
    pub enum IdentifierKind {
        Alias,
        Constant,
        ExternalBlock,
        Function,
        Intrinsic,
        Module,
        Struct,
        Type,
        Variable,
    }
}

impl IdentifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentifierKind::Alias => "alias",
            IdentifierKind::Constant => "constant",
            IdentifierKind::ExternalBlock => "external block",
            IdentifierKind::Function => "function",
            IdentifierKind::Intrinsic => "intrinsic",
            IdentifierKind::Module => "module",
            IdentifierKind::Struct => "struct",
            IdentifierKind::Type => "type",
            IdentifierKind::Variable => "variable",
        }
    }
}

indexed_enum! {
    /// Interpolation qualifiers on fragment inputs.
    pub enum InterpolationQualifier {
        Flat,
        NoPerspective,
        Smooth,
    }
}

indexed_enum! {
    /// The closed intrinsic catalog. Intrinsics are built-in functions
    /// with fixed typed signatures; they are not user-declarable.
    pub enum IntrinsicKind {
        Abs,
        All,
        Any,
        ArraySize,
        Ceil,
        Clamp,
        Cos,
        Cross,
        Distance,
        Dot,
        Exp,
        Exp2,
        Floor,
        Fract,
        InverseSqrt,
        Length,
        Lerp,
        Log,
        Log2,
        Max,
        Min,
        Normalize,
        Pow,
        Rcp,
        Reflect,
        Refract,
        Round,
        RoundEven,
        Select,
        Sign,
        Sin,
        Sqrt,
        Tan,
        TextureRead,
        TextureSampleImplicitLod,
        TextureWrite,
        Trunc,
    }
}

impl IntrinsicKind {
    /// Source-level name of the intrinsic.
    pub fn identifier(self) -> &'static str {
        match self {
            IntrinsicKind::Abs => "abs",
            IntrinsicKind::All => "all",
            IntrinsicKind::Any => "any",
            IntrinsicKind::ArraySize => "array_size",
            IntrinsicKind::Ceil => "ceil",
            IntrinsicKind::Clamp => "clamp",
            IntrinsicKind::Cos => "cos",
            IntrinsicKind::Cross => "cross",
            IntrinsicKind::Distance => "distance",
            IntrinsicKind::Dot => "dot",
            IntrinsicKind::Exp => "exp",
            IntrinsicKind::Exp2 => "exp2",
            IntrinsicKind::Floor => "floor",
            IntrinsicKind::Fract => "fract",
            IntrinsicKind::InverseSqrt => "inverse_sqrt",
            IntrinsicKind::Length => "length",
            IntrinsicKind::Lerp => "lerp",
            IntrinsicKind::Log => "log",
            IntrinsicKind::Log2 => "log2",
            IntrinsicKind::Max => "max",
            IntrinsicKind::Min => "min",
            IntrinsicKind::Normalize => "normalize",
            IntrinsicKind::Pow => "pow",
            IntrinsicKind::Rcp => "rcp",
            IntrinsicKind::Reflect => "reflect",
            IntrinsicKind::Refract => "refract",
            IntrinsicKind::Round => "round",
            IntrinsicKind::RoundEven => "round_even",
            IntrinsicKind::Select => "select",
            IntrinsicKind::Sign => "sign",
            IntrinsicKind::Sin => "sin",
            IntrinsicKind::Sqrt => "sqrt",
            IntrinsicKind::Tan => "tan",
            IntrinsicKind::TextureRead => "Read",
            IntrinsicKind::TextureSampleImplicitLod => "Sample",
            IntrinsicKind::TextureWrite => "Write",
            IntrinsicKind::Trunc => "trunc",
        }
    }
}

indexed_enum! {
    /// Optional language features a module can enable.
    pub enum ModuleFeature {
        Float64,
        PrimitiveExternals,
        Texture1D,
    }
}

impl ModuleFeature {
    pub fn identifier(self) -> &'static str {
        match self {
            ModuleFeature::Float64 => "float64",
            ModuleFeature::PrimitiveExternals => "primitive_externals",
            ModuleFeature::Texture1D => "texture1d",
        }
    }

    pub fn from_identifier(name: &str) -> Option<Self> {
        match name {
            "float64" => Some(ModuleFeature::Float64),
            "primitive_externals" => Some(ModuleFeature::PrimitiveExternals),
            "texture1d" => Some(ModuleFeature::Texture1D),
            _ => None,
        }
    }
}

indexed_enum! {
    /// Function parameter passing semantic.
    pub enum ParameterSemantic {
        In,
        InOut,
        Out,
    }
}

indexed_enum! {
    /// Shader entry-point stages.
    pub enum ShaderStage {
        Compute,
        Fragment,
        Vertex,
    }
}

impl ShaderStage {
    /// Full stage name ("fragment" rather than "frag").
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Compute => "compute",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Vertex => "vertex",
        }
    }

    /// The `entry` attribute spelling of this stage.
    pub fn identifier(self) -> &'static str {
        match self {
            ShaderStage::Compute => "comp",
            ShaderStage::Fragment => "frag",
            ShaderStage::Vertex => "vert",
        }
    }

    pub fn from_identifier(name: &str) -> Option<Self> {
        match name {
            "comp" => Some(ShaderStage::Compute),
            "frag" => Some(ShaderStage::Fragment),
            "vert" => Some(ShaderStage::Vertex),
            _ => None,
        }
    }
}

indexed_enum! {
    /// Texture and sampler dimensionality.
    pub enum TextureDim {
        Cubemap,
        Dim1D,
        Dim1DArray,
        Dim2D,
        Dim2DArray,
        Dim3D,
    }
}

impl TextureDim {
    /// Number of coordinate components used to address the texture.
    pub fn coordinate_count(self) -> u32 {
        match self {
            TextureDim::Dim1D => 1,
            TextureDim::Dim1DArray | TextureDim::Dim2D => 2,
            TextureDim::Dim2DArray | TextureDim::Dim3D | TextureDim::Cubemap => 3,
        }
    }
}

indexed_enum! {
    /// Type-level numeric constants such as `f32::Max`.
    pub enum TypeConstant {
        Epsilon,
        Infinity,
        Max,
        Min,
        NaN,
    }
}

impl TypeConstant {
    pub fn identifier(self) -> &'static str {
        match self {
            TypeConstant::Epsilon => "Epsilon",
            TypeConstant::Infinity => "Infinity",
            TypeConstant::Max => "Max",
            TypeConstant::Min => "Min",
            TypeConstant::NaN => "NaN",
        }
    }

    pub fn from_identifier(name: &str) -> Option<Self> {
        match name {
            "Epsilon" => Some(TypeConstant::Epsilon),
            "Infinity" => Some(TypeConstant::Infinity),
            "Max" => Some(TypeConstant::Max),
            "Min" => Some(TypeConstant::Min),
            "NaN" => Some(TypeConstant::NaN),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        assert_eq!(BinaryType::from_index(BinaryType::Modulo.to_index()), Some(BinaryType::Modulo));
        assert_eq!(IdentifierKind::from_index(IdentifierKind::Variable.to_index()), Some(IdentifierKind::Variable));
        assert_eq!(IntrinsicKind::from_index(IntrinsicKind::Trunc.to_index()), Some(IntrinsicKind::Trunc));
        assert_eq!(BinaryType::from_index(999), None);
    }

    #[test]
    fn test_stage_identifiers() {
        assert_eq!(ShaderStage::from_identifier("frag"), Some(ShaderStage::Fragment));
        assert_eq!(ShaderStage::Fragment.name(), "fragment");
        assert_eq!(ShaderStage::from_identifier("geom"), None);
    }

    #[test]
    fn test_builtin_identifiers() {
        assert_eq!(BuiltinEntry::from_identifier("position"), Some(BuiltinEntry::Position));
        assert_eq!(BuiltinEntry::Position.identifier(), "position");
        assert_eq!(BuiltinEntry::from_identifier("nope"), None);
    }
}
