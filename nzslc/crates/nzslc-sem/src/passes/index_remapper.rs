//! Index remapping.
//!
//! Reassigns identifier indices across a subtree through a caller-supplied
//! `(kind, old_index) -> new target` function. Used by loop unrolling
//! (each unrolled copy needs fresh indices for the declarations it
//! contains) and by serialization consumers merging modules.

use crate::context::{IdentifierTarget, TransformerContext};
use crate::executor::Pass;
use crate::transformer::{
    transform_module, ExpressionTransform, StatementTransform, TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::Result;

/// Remap function: `None` keeps the index unchanged.
pub type RemapFn = Box<dyn FnMut(IdentifierKind, usize) -> Option<IdentifierTarget>>;

pub struct IndexRemapperPass {
    remap: RemapFn,
}

impl IndexRemapperPass {
    pub fn new(remap: RemapFn) -> Self {
        Self { remap }
    }

    fn remap_index(&mut self, kind: IdentifierKind, index: &mut Option<usize>) {
        if let Some(old) = *index {
            if let Some(target) = (self.remap)(kind, old) {
                *index = Some(target.index);
            }
        }
    }

    fn remap_type(&mut self, ty: &mut ExpressionType) {
        match ty {
            ExpressionType::Struct(index) => {
                if let Some(target) = (self.remap)(IdentifierKind::Struct, *index) {
                    *index = target.index;
                }
            }
            ExpressionType::Alias(index) => {
                if let Some(target) = (self.remap)(IdentifierKind::Alias, *index) {
                    *index = target.index;
                }
            }
            ExpressionType::Function(index) => {
                if let Some(target) = (self.remap)(IdentifierKind::Function, *index) {
                    *index = target.index;
                }
            }
            ExpressionType::Array(array) => self.remap_type(&mut array.inner),
            ExpressionType::DynArray(array) => self.remap_type(&mut array.inner),
            ExpressionType::Storage(storage) => {
                if let Some(target) = (self.remap)(IdentifierKind::Struct, storage.struct_index) {
                    storage.struct_index = target.index;
                }
            }
            ExpressionType::Uniform(uniform) => {
                if let Some(target) = (self.remap)(IdentifierKind::Struct, uniform.struct_index) {
                    uniform.struct_index = target.index;
                }
            }
            ExpressionType::PushConstant(push_constant) => {
                if let Some(target) =
                    (self.remap)(IdentifierKind::Struct, push_constant.struct_index)
                {
                    push_constant.struct_index = target.index;
                }
            }
            ExpressionType::Type(inner) => self.remap_type(inner),
            _ => {}
        }
    }

    fn remap_type_value(&mut self, value: &mut ExpressionValue<ExpressionType>) {
        if let ExpressionValue::Value(ty) = value {
            self.remap_type(ty);
        }
    }
}

impl Transformer for IndexRemapperPass {
    fn transform_expression(
        &mut self,
        expr: &mut Expression,
        _state: &mut TransformState,
    ) -> Result<ExpressionTransform> {
        if let Expression::IdentifierValue(value) = expr {
            if let Some(target) = (self.remap)(value.kind, value.index) {
                value.kind = target.kind;
                value.index = target.index;
            }
        }
        if let Expression::Cast(cast) = expr {
            self.remap_type_value(&mut cast.target_type);
        }
        if let Some(ty) = expr.cached_type_mut() {
            self.remap_type(ty);
        }
        Ok(ExpressionTransform::VisitChildren)
    }

    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        _state: &mut TransformState,
    ) -> Result<StatementTransform> {
        match stmt {
            Statement::DeclareAlias(decl) => {
                self.remap_index(IdentifierKind::Alias, &mut decl.alias_index)
            }
            Statement::DeclareConst(decl) => {
                self.remap_index(IdentifierKind::Constant, &mut decl.const_index);
                self.remap_type_value(&mut decl.ty);
            }
            Statement::DeclareExternal(decl) => {
                self.remap_index(IdentifierKind::ExternalBlock, &mut decl.external_index);
                for var in &mut decl.external_vars {
                    self.remap_index(IdentifierKind::Variable, &mut var.var_index);
                    self.remap_type_value(&mut var.ty);
                }
            }
            Statement::DeclareFunction(decl) => {
                self.remap_index(IdentifierKind::Function, &mut decl.func_index);
                for parameter in &mut decl.parameters {
                    self.remap_index(IdentifierKind::Variable, &mut parameter.var_index);
                    self.remap_type_value(&mut parameter.ty);
                }
                self.remap_type_value(&mut decl.return_type);
            }
            Statement::DeclareOption(decl) => {
                self.remap_index(IdentifierKind::Constant, &mut decl.opt_index);
                self.remap_type_value(&mut decl.ty);
            }
            Statement::DeclareStruct(decl) => {
                self.remap_index(IdentifierKind::Struct, &mut decl.struct_index);
                for member in &mut decl.description.members {
                    self.remap_type_value(&mut member.ty);
                }
            }
            Statement::DeclareVariable(decl) => {
                self.remap_index(IdentifierKind::Variable, &mut decl.var_index);
                self.remap_type_value(&mut decl.ty);
            }
            Statement::For(for_stmt) => {
                self.remap_index(IdentifierKind::Variable, &mut for_stmt.var_index)
            }
            Statement::ForEach(for_each) => {
                self.remap_index(IdentifierKind::Variable, &mut for_each.var_index)
            }
            _ => {}
        }
        Ok(StatementTransform::VisitChildren)
    }
}

impl Pass for IndexRemapperPass {
    fn name(&self) -> &'static str {
        "index remapper"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        transform_module(self, module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::visit_statement;
    use nzslc_util::SourceLocation;

    #[test]
    fn test_variable_remap() {
        let loc = SourceLocation::default();
        let mut stmt = Statement::DeclareVariable(DeclareVariableStatement {
            name: String::from("x"),
            var_index: Some(3),
            ty: ExpressionValue::Value(ExpressionType::i32()),
            initial_expression: Some(Box::new(Expression::IdentifierValue(
                IdentifierValueExpression {
                    kind: IdentifierKind::Variable,
                    index: 3,
                    cached_type: Some(ExpressionType::i32()),
                    location: loc.clone(),
                },
            ))),
            location: loc,
        });

        let mut pass = IndexRemapperPass::new(Box::new(|kind, index| {
            (kind == IdentifierKind::Variable && index == 3).then_some(IdentifierTarget {
                kind: IdentifierKind::Variable,
                index: 7,
            })
        }));

        let mut ctx = TransformerContext::new();
        let mut state = TransformState::new(&mut ctx);
        visit_statement(&mut pass, &mut stmt, &mut state).unwrap();

        let Statement::DeclareVariable(decl) = &stmt else {
            unreachable!()
        };
        assert_eq!(decl.var_index, Some(7));
        let Some(Expression::IdentifierValue(value)) = decl.initial_expression.as_deref() else {
            panic!("expected identifier value");
        };
        assert_eq!(value.index, 7);
    }

    #[test]
    fn test_struct_type_remap() {
        let loc = SourceLocation::default();
        let mut stmt = Statement::DeclareVariable(DeclareVariableStatement {
            name: String::from("s"),
            var_index: Some(0),
            ty: ExpressionValue::Value(ExpressionType::Struct(2)),
            initial_expression: None,
            location: loc,
        });

        let mut pass = IndexRemapperPass::new(Box::new(|kind, index| {
            (kind == IdentifierKind::Struct && index == 2).then_some(IdentifierTarget {
                kind: IdentifierKind::Struct,
                index: 9,
            })
        }));

        let mut ctx = TransformerContext::new();
        let mut state = TransformState::new(&mut ctx);
        visit_statement(&mut pass, &mut stmt, &mut state).unwrap();

        let Statement::DeclareVariable(decl) = &stmt else {
            unreachable!()
        };
        assert_eq!(decl.ty.as_value(), Some(&ExpressionType::Struct(9)));
    }
}
