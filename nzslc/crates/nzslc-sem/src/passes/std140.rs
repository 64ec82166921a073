//! std140 struct layout passes.
//!
//! [`Std140EmulationPass`] annotates every struct used in uniform or
//! push-constant position (and the structs nested in them) with the
//! `std140` layout, so back-ends emit the right offsets.
//!
//! [`UniformStructToStd140Pass`] goes further for structs that carry an
//! explicit non-std140 layout: it emits a shadow struct whose scalar
//! layout matches std140 by inserting explicit padding fields, repoints
//! the uniform variables at the shadow and rewrites field accesses with
//! the shifted field indices.

use crate::context::{StructData, TransformerContext};
use crate::executor::Pass;
use crate::transformer::{
    transform_module, ExpressionTransform, StatementTransform, TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::{
    CompilationError, Error, FieldKind, FieldOffsets, Result, SourceLocation, StructLayout,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Field kind of a member type, for the offset calculator.
fn member_field_kind(ty: &ExpressionType) -> Option<FieldKind> {
    let scalar_kind = |primitive: PrimitiveType| match primitive {
        PrimitiveType::Bool => Some(FieldKind::Bool1),
        PrimitiveType::Float32 => Some(FieldKind::Float1),
        PrimitiveType::Float64 => Some(FieldKind::Double1),
        PrimitiveType::Int32 => Some(FieldKind::Int1),
        PrimitiveType::UInt32 => Some(FieldKind::UInt1),
        _ => None,
    };
    match ty {
        ExpressionType::Primitive(primitive) => scalar_kind(*primitive),
        ExpressionType::Vector(vector) => scalar_kind(vector.base)
            .map(|kind| kind.with_component_count(vector.component_count as usize)),
        _ => None,
    }
}

/// Collects the struct indices used by uniform / push-constant externals,
/// including nested member structs.
fn collect_uniform_structs(
    module: &Module,
    ctx: &TransformerContext,
) -> Result<FxHashSet<usize>> {
    fn visit_statements(
        statements: &[Statement],
        ctx: &TransformerContext,
        found: &mut FxHashSet<usize>,
    ) -> Result<()> {
        for stmt in statements {
            match stmt {
                Statement::DeclareExternal(external) => {
                    for var in &external.external_vars {
                        if let Some(index) = var
                            .ty
                            .as_value()
                            .and_then(ExpressionType::wrapped_struct_index)
                        {
                            mark(index, ctx, found, &var.location)?;
                        }
                    }
                }
                Statement::Conditional(conditional) => {
                    visit_statements(
                        std::slice::from_ref(conditional.statement.as_ref()),
                        ctx,
                        found,
                    )?;
                }
                Statement::Multi(multi) => visit_statements(&multi.statements, ctx, found)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn mark(
        index: usize,
        ctx: &TransformerContext,
        found: &mut FxHashSet<usize>,
        location: &SourceLocation,
    ) -> Result<()> {
        if !found.insert(index) {
            return Ok(());
        }
        let data = ctx.structs.retrieve(index, location)?;
        for member in &data.description.members {
            if let Some(ExpressionType::Struct(inner)) = member.ty.as_value() {
                mark(*inner, ctx, found, location)?;
            }
        }
        Ok(())
    }

    let mut found = FxHashSet::default();
    for imported in &module.imported_modules {
        found.extend(collect_uniform_structs(&imported.module, ctx)?);
    }
    visit_statements(&module.root.statements, ctx, &mut found)?;
    Ok(found)
}

// ---------------------------------------------------------------------------
// Annotation pass
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Std140EmulationPass {
    uniform_structs: FxHashSet<usize>,
}

impl Transformer for Std140EmulationPass {
    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        let Statement::DeclareStruct(decl) = stmt else {
            return Ok(StatementTransform::VisitChildren);
        };
        let Some(index) = decl.struct_index else {
            return Ok(StatementTransform::VisitChildren);
        };
        if !self.uniform_structs.contains(&index) || decl.description.layout.has_value() {
            return Ok(StatementTransform::VisitChildren);
        }

        decl.description.layout = ExpressionValue::Value(StructLayout::Std140);
        let data = state.ctx.structs.retrieve_mut(index, &decl.location)?;
        data.description.layout = ExpressionValue::Value(StructLayout::Std140);

        Ok(StatementTransform::VisitChildren)
    }
}

impl Pass for Std140EmulationPass {
    fn name(&self) -> &'static str {
        "std140 emulation"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        self.uniform_structs = collect_uniform_structs(module, ctx)?;
        transform_module(self, module, ctx)
    }
}

// ---------------------------------------------------------------------------
// Shadow-struct pass
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct UniformStructToStd140Pass {
    /// original struct index -> (shadow index, original field -> shadow
    /// field)
    shadows: FxHashMap<usize, (usize, FxHashMap<u32, u32>)>,
}

impl UniformStructToStd140Pass {
    /// Builds a shadow description whose tightly-packed layout matches
    /// std140 by inserting explicit padding fields.
    fn build_shadow(
        description: &StructDescription,
        location: &SourceLocation,
    ) -> Result<(StructDescription, FxHashMap<u32, u32>)> {
        let mut shadow = StructDescription {
            name: format!("{}_std140", description.name),
            layout: ExpressionValue::Value(StructLayout::Std140),
            tag: description.tag.clone(),
            members: Vec::new(),
        };
        let mut mapping = FxHashMap::default();

        let mut reference = FieldOffsets::new(StructLayout::Std140);
        let mut packed_size = 0usize;
        let mut padding_count = 0usize;

        for (index, member) in description.members.iter().enumerate() {
            let member_type = member
                .ty
                .as_value()
                .cloned()
                .unwrap_or(ExpressionType::NoType);
            let (offset, size) = match &member_type {
                ExpressionType::Matrix(matrix) => {
                    let cell = member_field_kind(&ExpressionType::Primitive(matrix.base))
                        .ok_or_else(|| {
                            Error::new(
                                member.location.clone(),
                                CompilationError::StructLayoutInnerMismatch {
                                    inner: member.name.clone(),
                                    outer: description.name.clone(),
                                },
                            )
                        })?;
                    let offset = reference.add_matrix(
                        cell,
                        matrix.column_count as usize,
                        matrix.row_count as usize,
                        true,
                    );
                    (offset, reference.size() - offset)
                }
                other => {
                    let kind = member_field_kind(other).ok_or_else(|| {
                        Error::new(
                            member.location.clone(),
                            CompilationError::StructLayoutInnerMismatch {
                                inner: member.name.clone(),
                                outer: description.name.clone(),
                            },
                        )
                    })?;
                    let offset = reference.add_field(kind);
                    (offset, kind.size())
                }
            };

            if offset > packed_size {
                // fill the gap so scalar packing reaches the std140 offset
                let padding_floats = (offset - packed_size) / 4;
                shadow.members.push(StructMember {
                    name: format!("_padding{padding_count}"),
                    ty: ExpressionValue::Value(ExpressionType::Array(ArrayType {
                        inner: Box::new(ExpressionType::f32()),
                        length: padding_floats as u32,
                    })),
                    builtin: ExpressionValue::None,
                    location_index: ExpressionValue::None,
                    interp: ExpressionValue::None,
                    cond: ExpressionValue::None,
                    tag: String::new(),
                    location: location.clone(),
                });
                padding_count += 1;
                packed_size = offset;
            }

            mapping.insert(index as u32, shadow.members.len() as u32);
            shadow.members.push(member.clone());
            packed_size += size;
        }

        Ok((shadow, mapping))
    }

    fn shadow_for(
        &mut self,
        struct_index: usize,
        state: &mut TransformState,
        location: &SourceLocation,
    ) -> Result<Option<usize>> {
        if let Some((shadow_index, _)) = self.shadows.get(&struct_index) {
            return Ok(Some(*shadow_index));
        }

        let data = state.ctx.structs.retrieve(struct_index, location)?;
        // std140 (or unannotated, handled by the annotation pass) structs
        // need no shadow
        match data.description.layout.as_value() {
            Some(StructLayout::Std140) | None => return Ok(None),
            Some(_) => {}
        }

        let module_index = data.module_index;
        let (shadow, mapping) = Self::build_shadow(&data.description, location)?;
        let shadow_index = state.ctx.structs.register(
            None,
            StructData {
                module_index,
                description: shadow,
            },
            location,
        )?;
        self.shadows
            .insert(struct_index, (shadow_index, mapping));
        Ok(Some(shadow_index))
    }

    fn rewrite_wrapped_type(&self, ty: &mut ExpressionType) {
        let index = match ty {
            ExpressionType::Uniform(uniform) => Some(&mut uniform.struct_index),
            ExpressionType::PushConstant(push_constant) => Some(&mut push_constant.struct_index),
            _ => None,
        };
        if let Some(index) = index {
            if let Some((shadow_index, _)) = self.shadows.get(index) {
                *index = *shadow_index;
            }
        }
    }
}

impl Transformer for UniformStructToStd140Pass {
    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        let Statement::DeclareExternal(external) = stmt else {
            return Ok(StatementTransform::VisitChildren);
        };

        for var in &mut external.external_vars {
            let Some(struct_index) = var
                .ty
                .as_value()
                .and_then(ExpressionType::wrapped_struct_index)
            else {
                continue;
            };
            let location = var.location.clone();
            if self.shadow_for(struct_index, state, &location)?.is_some() {
                if let ExpressionValue::Value(ty) = &mut var.ty {
                    self.rewrite_wrapped_type(ty);
                }
                if let Some(var_index) = var.var_index {
                    let data = state.ctx.variables.retrieve_mut(var_index, &location)?;
                    self.rewrite_wrapped_type(&mut data.ty);
                }
            }
        }

        Ok(StatementTransform::VisitChildren)
    }

    fn transform_expression(
        &mut self,
        expr: &mut Expression,
        _state: &mut TransformState,
    ) -> Result<ExpressionTransform> {
        // field accesses into shadowed structs shift by the inserted
        // padding fields
        if let Expression::AccessField(access) = expr {
            let base_struct = match access.expr.cached_type() {
                Some(ExpressionType::Uniform(uniform)) => Some(uniform.struct_index),
                Some(ExpressionType::PushConstant(push_constant)) => {
                    Some(push_constant.struct_index)
                }
                Some(ExpressionType::Struct(index)) => Some(*index),
                _ => None,
            };
            if let Some(struct_index) = base_struct {
                if let Some((_, mapping)) = self.shadows.get(&struct_index) {
                    if let Some(&new_index) = mapping.get(&access.field_index) {
                        access.field_index = new_index;
                    }
                }
            }
        }

        // uniform-typed expressions follow their variable to the shadow
        if let Some(ty) = expr.cached_type_mut() {
            self.rewrite_wrapped_type(ty);
        }

        Ok(ExpressionTransform::VisitChildren)
    }
}

impl Pass for UniformStructToStd140Pass {
    fn name(&self) -> &'static str {
        "uniform struct to std140"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        transform_module(self, module, ctx)?;

        // declare the generated shadow structs at the end of the root so
        // the tree stays closed
        for (shadow_index, _) in self.shadows.values() {
            let location = module.root.location.clone();
            let description = ctx
                .structs
                .retrieve(*shadow_index, &location)?
                .description
                .clone();
            module
                .root
                .statements
                .push(Statement::DeclareStruct(DeclareStructStatement {
                    struct_index: Some(*shadow_index),
                    description,
                    is_exported: ExpressionValue::None,
                    location,
                }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::resolve::ResolvePass;
    use nzslc_par::parse;

    const HEADER: &str = "[nzsl_version(\"1.0\")]\nmodule;\n";

    fn resolve(source: &str) -> (Module, TransformerContext) {
        let mut module = parse(source).expect("parse");
        let mut ctx = TransformerContext::new();
        ResolvePass::new(None, FxHashMap::default())
            .transform(&mut module, &mut ctx)
            .expect("resolve");
        (module, ctx)
    }

    #[test]
    fn test_uniform_struct_gets_std140_annotation() {
        let source = format!(
            "{HEADER}struct Data {{ value: f32 }}\nexternal {{ [binding(0)] data: uniform[Data] }}\n"
        );
        let (mut module, mut ctx) = resolve(&source);
        Std140EmulationPass::default()
            .transform(&mut module, &mut ctx)
            .unwrap();

        let Statement::DeclareStruct(decl) = &module.root.statements[0] else {
            panic!("expected struct");
        };
        assert_eq!(
            decl.description.layout.as_value(),
            Some(&StructLayout::Std140)
        );
        let (_, data) = ctx.structs.iter().next().unwrap();
        assert_eq!(
            data.description.layout.as_value(),
            Some(&StructLayout::Std140)
        );
    }

    #[test]
    fn test_unused_struct_keeps_no_layout() {
        let source = format!("{HEADER}struct Plain {{ value: f32 }}\n");
        let (mut module, mut ctx) = resolve(&source);
        Std140EmulationPass::default()
            .transform(&mut module, &mut ctx)
            .unwrap();
        let Statement::DeclareStruct(decl) = &module.root.statements[0] else {
            panic!("expected struct");
        };
        assert!(!decl.description.layout.has_value());
    }

    #[test]
    fn test_shadow_struct_padding() {
        // scalar layout: value is at offset 4; std140 pushes the vec3 to
        // offset 16, so the shadow inserts 3 floats of padding
        let source = format!(
            "{HEADER}[layout(scalar)]\nstruct Data {{ value: f32, dir: vec3[f32] }}\nexternal {{ [binding(0)] data: uniform[Data] }}\nfn f() -> f32 {{ return data.dir.x; }}\n"
        );
        let (mut module, mut ctx) = resolve(&source);
        let mut pass = UniformStructToStd140Pass::default();
        pass.transform(&mut module, &mut ctx).unwrap();

        // a shadow struct was declared at the root
        let Some(Statement::DeclareStruct(shadow)) = module.root.statements.last() else {
            panic!("expected shadow struct declaration");
        };
        assert_eq!(shadow.description.name, "Data_std140");
        assert_eq!(shadow.description.members.len(), 3);
        assert_eq!(shadow.description.members[1].name, "_padding0");
        assert_eq!(
            shadow.description.members[1].ty.as_value().unwrap().to_string(),
            "array[f32, 3]"
        );

        // the field access now targets the shifted index
        let Statement::DeclareFunction(func) = &module.root.statements[2] else {
            panic!("expected function");
        };
        let Statement::Return(ret) = &func.statements[0] else {
            panic!("expected return");
        };
        let Some(Expression::Swizzle(swizzle)) = ret.returned_expr.as_ref() else {
            panic!("expected swizzle");
        };
        let Expression::AccessField(access) = swizzle.expr.as_ref() else {
            panic!("expected field access");
        };
        assert_eq!(access.field_index, 2);
    }
}
