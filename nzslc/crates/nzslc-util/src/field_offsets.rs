//! Struct memory-layout calculator.
//!
//! [`FieldOffsets`] computes the byte offset of every field of a struct
//! under a given [`StructLayout`]. It is a small accumulator tracking the
//! largest field alignment seen so far, the rounding the next offset must
//! honor, and the running size. The std140 emulation pass, the uniform
//! layout validation and the back-ends all rely on this single
//! implementation so that they agree on layouts.
//!
//! std140 rules implemented here:
//! - scalars align and size to 4 bytes (8 for double-precision),
//! - vec2 aligns to 2x its component, vec3 and vec4 to 4x,
//! - array elements (and matrix columns, which are treated as arrays of
//!   column vectors) have their stride and alignment rounded up to the
//!   vec4 alignment (16 bytes),
//! - nested structs align to at least 16 bytes and pad their tail.
//!
//! std430 follows the same vector rules but drops the vec4 rounding on
//! arrays and structs; `scalar` packs everything at natural alignment.

/// Memory layout of a struct block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StructLayout {
    /// Natural per-component packing.
    Scalar,
    /// OpenGL std140 uniform layout.
    Std140,
    /// OpenGL std430 storage layout.
    Std430,
}

/// Type of a single struct field, as seen by the layout calculator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool1,
    Bool2,
    Bool3,
    Bool4,
    Float1,
    Float2,
    Float3,
    Float4,
    Double1,
    Double2,
    Double3,
    Double4,
    Int1,
    Int2,
    Int3,
    Int4,
    UInt1,
    UInt2,
    UInt3,
    UInt4,
}

impl FieldKind {
    /// Number of components of this field (1 for scalars, 2-4 for
    /// vectors).
    pub fn component_count(self) -> usize {
        match self {
            FieldKind::Bool1 | FieldKind::Float1 | FieldKind::Double1 | FieldKind::Int1 | FieldKind::UInt1 => 1,
            FieldKind::Bool2 | FieldKind::Float2 | FieldKind::Double2 | FieldKind::Int2 | FieldKind::UInt2 => 2,
            FieldKind::Bool3 | FieldKind::Float3 | FieldKind::Double3 | FieldKind::Int3 | FieldKind::UInt3 => 3,
            FieldKind::Bool4 | FieldKind::Float4 | FieldKind::Double4 | FieldKind::Int4 | FieldKind::UInt4 => 4,
        }
    }

    /// Byte size of one component.
    pub fn component_size(self) -> usize {
        match self {
            FieldKind::Double1 | FieldKind::Double2 | FieldKind::Double3 | FieldKind::Double4 => 8,
            _ => 4,
        }
    }

    /// Byte size of the whole field.
    pub fn size(self) -> usize {
        self.component_count() * self.component_size()
    }

    /// The vector form of this field's component type with `rows`
    /// components; used to lay out matrices as column arrays.
    pub fn with_component_count(self, count: usize) -> FieldKind {
        debug_assert!((1..=4).contains(&count));
        let base = match self {
            FieldKind::Bool1 | FieldKind::Bool2 | FieldKind::Bool3 | FieldKind::Bool4 => 0,
            FieldKind::Float1 | FieldKind::Float2 | FieldKind::Float3 | FieldKind::Float4 => 4,
            FieldKind::Double1 | FieldKind::Double2 | FieldKind::Double3 | FieldKind::Double4 => 8,
            FieldKind::Int1 | FieldKind::Int2 | FieldKind::Int3 | FieldKind::Int4 => 12,
            FieldKind::UInt1 | FieldKind::UInt2 | FieldKind::UInt3 | FieldKind::UInt4 => 16,
        };
        const KINDS: [FieldKind; 20] = [
            FieldKind::Bool1,
            FieldKind::Bool2,
            FieldKind::Bool3,
            FieldKind::Bool4,
            FieldKind::Float1,
            FieldKind::Float2,
            FieldKind::Float3,
            FieldKind::Float4,
            FieldKind::Double1,
            FieldKind::Double2,
            FieldKind::Double3,
            FieldKind::Double4,
            FieldKind::Int1,
            FieldKind::Int2,
            FieldKind::Int3,
            FieldKind::Int4,
            FieldKind::UInt1,
            FieldKind::UInt2,
            FieldKind::UInt3,
            FieldKind::UInt4,
        ];
        KINDS[base + count - 1]
    }
}

fn align(offset: usize, alignment: usize) -> usize {
    (offset + alignment - 1) / alignment * alignment
}

/// Field-offset accumulator for one struct under one layout.
#[derive(Clone, Copy, Debug)]
pub struct FieldOffsets {
    largest_field_alignment: usize,
    offset_rounding: usize,
    size: usize,
    layout: StructLayout,
}

impl FieldOffsets {
    pub fn new(layout: StructLayout) -> Self {
        Self {
            largest_field_alignment: 1,
            offset_rounding: 1,
            size: 0,
            layout,
        }
    }

    /// Alignment of a field under a layout.
    pub fn alignment_of(layout: StructLayout, kind: FieldKind) -> usize {
        let component = kind.component_size();
        match layout {
            StructLayout::Scalar => component,
            StructLayout::Std140 | StructLayout::Std430 => match kind.component_count() {
                1 => component,
                2 => 2 * component,
                _ => 4 * component,
            },
        }
    }

    /// The vec4 alignment std140 rounds arrays and structs up to.
    const STD140_ROUNDING: usize = 16;

    /// Appends a single field and returns its byte offset.
    pub fn add_field(&mut self, kind: FieldKind) -> usize {
        let field_alignment = Self::alignment_of(self.layout, kind);

        self.largest_field_alignment = self.largest_field_alignment.max(field_alignment);

        let offset = align(self.size, align(field_alignment, self.offset_rounding));
        self.size = offset + kind.size();
        self.offset_rounding = 1;

        offset
    }

    /// Appends an array of `array_size` fields and returns the offset of
    /// its first element. Under std140 the element stride and alignment
    /// are rounded up to the vec4 alignment.
    pub fn add_field_array(&mut self, kind: FieldKind, array_size: usize) -> usize {
        let mut field_alignment = Self::alignment_of(self.layout, kind);
        let mut stride = align(kind.size(), field_alignment);
        if self.layout == StructLayout::Std140 {
            field_alignment = align(field_alignment, Self::STD140_ROUNDING);
            stride = align(stride, field_alignment);
        }

        self.largest_field_alignment = self.largest_field_alignment.max(field_alignment);

        let offset = align(self.size, align(field_alignment, self.offset_rounding));
        self.size = offset + stride * array_size;
        self.offset_rounding = 1;

        offset
    }

    /// Appends a matrix, laid out as an array of column (or row) vectors.
    ///
    /// `cell` must be a scalar kind; `column_major` picks whether columns
    /// or rows are the stored vectors.
    pub fn add_matrix(
        &mut self,
        cell: FieldKind,
        columns: usize,
        rows: usize,
        column_major: bool,
    ) -> usize {
        debug_assert_eq!(cell.component_count(), 1);
        debug_assert!((2..=4).contains(&columns));
        debug_assert!((2..=4).contains(&rows));

        if column_major {
            self.add_field_array(cell.with_component_count(rows), columns)
        } else {
            self.add_field_array(cell.with_component_count(columns), rows)
        }
    }

    /// Appends an array of matrices.
    pub fn add_matrix_array(
        &mut self,
        cell: FieldKind,
        columns: usize,
        rows: usize,
        column_major: bool,
        array_size: usize,
    ) -> usize {
        debug_assert_eq!(cell.component_count(), 1);

        if column_major {
            self.add_field_array(cell.with_component_count(rows), columns * array_size)
        } else {
            self.add_field_array(cell.with_component_count(columns), rows * array_size)
        }
    }

    /// Appends a nested struct, described by its own accumulated offsets,
    /// and returns its byte offset. The following field rounds its offset
    /// by the nested struct's tail padding.
    pub fn add_struct(&mut self, inner: &FieldOffsets) -> usize {
        let mut field_alignment = inner.largest_field_alignment();
        if self.layout == StructLayout::Std140 {
            field_alignment = align(field_alignment, Self::STD140_ROUNDING);
        }

        self.largest_field_alignment = self.largest_field_alignment.max(field_alignment);

        let offset = align(self.size, align(field_alignment, self.offset_rounding));
        self.size = offset + inner.size();
        self.offset_rounding = (align(inner.size(), field_alignment) - inner.size()).max(1);

        offset
    }

    /// Appends an array of nested structs.
    pub fn add_struct_array(&mut self, inner: &FieldOffsets, array_size: usize) -> usize {
        debug_assert!(array_size > 0);

        let mut field_alignment = inner.largest_field_alignment();
        if self.layout == StructLayout::Std140 {
            field_alignment = align(field_alignment, Self::STD140_ROUNDING);
        }

        self.largest_field_alignment = self.largest_field_alignment.max(field_alignment);

        let offset = align(self.size, align(field_alignment, self.offset_rounding));
        let padded = align(inner.size(), field_alignment);
        self.size = offset + inner.size() * array_size + (padded - inner.size()) * (array_size - 1);
        self.offset_rounding = field_alignment;

        offset
    }

    /// Size of the struct including tail padding to its alignment.
    pub fn aligned_size(&self) -> usize {
        align(self.size, self.largest_field_alignment)
    }

    pub fn largest_field_alignment(&self) -> usize {
        self.largest_field_alignment
    }

    pub fn layout(&self) -> StructLayout {
        self.layout
    }

    /// Size of the struct without tail padding.
    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_fields_std140() {
        let mut offsets = FieldOffsets::new(StructLayout::Std140);
        assert_eq!(offsets.add_field(FieldKind::Float1), 0);
        assert_eq!(offsets.add_field(FieldKind::Float1), 4);
        assert_eq!(offsets.add_field(FieldKind::Int1), 8);
        assert_eq!(offsets.size(), 12);
        assert_eq!(offsets.aligned_size(), 12);
    }

    #[test]
    fn test_vector_alignment_std140() {
        // scalar then vec3: the vec3 must jump to offset 16
        let mut offsets = FieldOffsets::new(StructLayout::Std140);
        assert_eq!(offsets.add_field(FieldKind::Float1), 0);
        assert_eq!(offsets.add_field(FieldKind::Float3), 16);
        assert_eq!(offsets.size(), 28);
        assert_eq!(offsets.aligned_size(), 32);
    }

    #[test]
    fn test_vec2_alignment_std140() {
        let mut offsets = FieldOffsets::new(StructLayout::Std140);
        assert_eq!(offsets.add_field(FieldKind::Float1), 0);
        assert_eq!(offsets.add_field(FieldKind::Float2), 8);
        assert_eq!(offsets.add_field(FieldKind::Float4), 16);
        assert_eq!(offsets.size(), 32);
    }

    #[test]
    fn test_vec3_followed_by_scalar_std140() {
        // a scalar fits right after a vec3 inside the same 16-byte slot
        let mut offsets = FieldOffsets::new(StructLayout::Std140);
        assert_eq!(offsets.add_field(FieldKind::Float3), 0);
        assert_eq!(offsets.add_field(FieldKind::Float1), 12);
        assert_eq!(offsets.size(), 16);
    }

    #[test]
    fn test_array_stride_std140() {
        // float[4] has a 16-byte stride under std140
        let mut offsets = FieldOffsets::new(StructLayout::Std140);
        assert_eq!(offsets.add_field_array(FieldKind::Float1, 4), 0);
        assert_eq!(offsets.size(), 64);
        assert_eq!(offsets.add_field(FieldKind::Float1), 64);
    }

    #[test]
    fn test_array_stride_std430() {
        // std430 drops the vec4 rounding: float[4] packs at stride 4
        let mut offsets = FieldOffsets::new(StructLayout::Std430);
        assert_eq!(offsets.add_field_array(FieldKind::Float1, 4), 0);
        assert_eq!(offsets.size(), 16);
    }

    #[test]
    fn test_matrix_std140() {
        // mat3x3[f32] = 3 columns of vec3, each padded to 16 bytes
        let mut offsets = FieldOffsets::new(StructLayout::Std140);
        assert_eq!(offsets.add_matrix(FieldKind::Float1, 3, 3, true), 0);
        assert_eq!(offsets.size(), 48);

        // mat4x4[f32]
        let mut offsets = FieldOffsets::new(StructLayout::Std140);
        assert_eq!(offsets.add_matrix(FieldKind::Float1, 4, 4, true), 0);
        assert_eq!(offsets.size(), 64);
    }

    #[test]
    fn test_nested_struct_std140() {
        // inner { vec2 } -> aligned to 16 when nested under std140
        let mut inner = FieldOffsets::new(StructLayout::Std140);
        inner.add_field(FieldKind::Float2);

        let mut outer = FieldOffsets::new(StructLayout::Std140);
        assert_eq!(outer.add_field(FieldKind::Float1), 0);
        assert_eq!(outer.add_struct(&inner), 16);
        // the next field rounds its offset by the struct's tail padding
        // (align(8, 16) - 8 = 8), landing at 24
        assert_eq!(outer.add_field(FieldKind::Float1), 24);
    }

    #[test]
    fn test_scalar_layout_packs_naturally() {
        let mut offsets = FieldOffsets::new(StructLayout::Scalar);
        assert_eq!(offsets.add_field(FieldKind::Float1), 0);
        assert_eq!(offsets.add_field(FieldKind::Float3), 4);
        assert_eq!(offsets.size(), 16);
    }

    #[test]
    fn test_double_vectors() {
        let mut offsets = FieldOffsets::new(StructLayout::Std140);
        assert_eq!(offsets.add_field(FieldKind::Double3), 0);
        assert_eq!(offsets.largest_field_alignment(), 32);
        assert_eq!(offsets.size(), 24);
        assert_eq!(offsets.aligned_size(), 32);
    }

    #[test]
    fn test_struct_array_std140() {
        let mut inner = FieldOffsets::new(StructLayout::Std140);
        inner.add_field(FieldKind::Float4);
        inner.add_field(FieldKind::Float1);

        // inner size is 20, padded to 32 between consecutive elements
        let mut outer = FieldOffsets::new(StructLayout::Std140);
        assert_eq!(outer.add_struct_array(&inner, 2), 0);
        assert_eq!(outer.size(), 52);
    }
}
