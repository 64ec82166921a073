//! Constant removal.
//!
//! Substitutes references to `const` and `option` declarations by their
//! resolved values, and (when the back-end asks for it) strips the
//! declarations themselves.

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::transformer::{
    constant_to_expression, transform_module, ExpressionTransform, StatementTransform,
    TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::Result;

pub struct ConstantRemovalPass {
    /// Also remove the `const` / `option` declaration statements.
    pub remove_declarations: bool,
}

impl Default for ConstantRemovalPass {
    fn default() -> Self {
        Self {
            remove_declarations: true,
        }
    }
}

impl Transformer for ConstantRemovalPass {
    fn transform_expression(
        &mut self,
        expr: &mut Expression,
        state: &mut TransformState,
    ) -> Result<ExpressionTransform> {
        let Expression::IdentifierValue(value) = expr else {
            return Ok(ExpressionTransform::VisitChildren);
        };
        if value.kind != IdentifierKind::Constant {
            return Ok(ExpressionTransform::VisitChildren);
        }

        let Some(constant) = state.ctx.constants.try_retrieve(value.index) else {
            return Ok(ExpressionTransform::VisitChildren);
        };
        let Some(constant_value) = constant.value.clone() else {
            // unresolved under partial compilation
            return Ok(ExpressionTransform::VisitChildren);
        };

        Ok(ExpressionTransform::Replace(constant_to_expression(
            constant_value,
            value.location.clone(),
        )))
    }

    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        _state: &mut TransformState,
    ) -> Result<StatementTransform> {
        if !self.remove_declarations {
            return Ok(StatementTransform::VisitChildren);
        }
        match stmt {
            Statement::DeclareConst(_) | Statement::DeclareOption(_) => {
                Ok(StatementTransform::Remove)
            }
            _ => Ok(StatementTransform::VisitChildren),
        }
    }
}

impl Pass for ConstantRemovalPass {
    fn name(&self) -> &'static str {
        "constant removal"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        transform_module(self, module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConstantData;
    use nzslc_util::SourceLocation;

    #[test]
    fn test_constant_reference_substituted() {
        let loc = SourceLocation::default();
        let mut ctx = TransformerContext::new();
        let index = ctx
            .constants
            .register(
                None,
                ConstantData {
                    module_index: 0,
                    name: String::from("X"),
                    ty: ExpressionType::i32(),
                    value: Some(ConstantValue::i32(7)),
                },
                &loc,
            )
            .unwrap();

        let mut module = Module::new(Metadata::default());
        module.root.statements.push(Statement::Expression(ExpressionStatement {
            expression: Expression::IdentifierValue(IdentifierValueExpression {
                kind: IdentifierKind::Constant,
                index,
                cached_type: Some(ExpressionType::i32()),
                location: loc.clone(),
            }),
            location: loc,
        }));

        let mut pass = ConstantRemovalPass::default();
        pass.transform(&mut module, &mut ctx).unwrap();

        let Statement::Expression(stmt) = &module.root.statements[0] else {
            panic!("expected expression statement");
        };
        let Expression::ConstantValue(constant) = &stmt.expression else {
            panic!("expected constant, got {:?}", stmt.expression);
        };
        assert_eq!(constant.value, ConstantValue::i32(7));
    }
}
