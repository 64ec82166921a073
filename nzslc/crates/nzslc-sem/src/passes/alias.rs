//! Alias expansion.
//!
//! Removes `alias` declarations from the tree and rewrites every alias
//! reference to its (non-alias) target, so back-ends never see aliases.

use crate::context::{IdentifierTarget, TransformerContext};
use crate::executor::Pass;
use crate::passes::resolve::identifier_target_type;
use crate::transformer::{
    transform_module, ExpressionTransform, StatementTransform, TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::Result;

#[derive(Default)]
pub struct AliasPass;

impl Transformer for AliasPass {
    fn transform_expression(
        &mut self,
        expr: &mut Expression,
        state: &mut TransformState,
    ) -> Result<ExpressionTransform> {
        let Expression::IdentifierValue(value) = expr else {
            return Ok(ExpressionTransform::VisitChildren);
        };
        if value.kind != IdentifierKind::Alias {
            return Ok(ExpressionTransform::VisitChildren);
        }

        let target = state
            .ctx
            .resolve_alias_target(value.index, &value.location)?;
        let cached_type = identifier_target_type(target, state.ctx, &value.location)?;

        Ok(ExpressionTransform::Replace(Expression::IdentifierValue(
            IdentifierValueExpression {
                kind: target.kind,
                index: target.index,
                cached_type,
                location: value.location.clone(),
            },
        )))
    }

    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        _state: &mut TransformState,
    ) -> Result<StatementTransform> {
        match stmt {
            Statement::DeclareAlias(_) => Ok(StatementTransform::Remove),
            _ => Ok(StatementTransform::VisitChildren),
        }
    }
}

impl Pass for AliasPass {
    fn name(&self) -> &'static str {
        "alias expansion"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        transform_module(self, module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AliasData;
    use nzslc_util::SourceLocation;

    #[test]
    fn test_alias_reference_is_rewritten() {
        let mut ctx = TransformerContext::new();
        let loc = SourceLocation::default();

        let func_index = ctx
            .functions
            .register(
                None,
                crate::context::FunctionData {
                    module_index: 0,
                    name: String::from("helper"),
                    entry_stage: None,
                    parameters: Vec::new(),
                    return_type: ExpressionType::NoType,
                },
                &loc,
            )
            .unwrap();
        let alias_index = ctx
            .aliases
            .register(
                None,
                AliasData {
                    name: String::from("h"),
                    target: IdentifierTarget {
                        kind: IdentifierKind::Function,
                        index: func_index,
                    },
                },
                &loc,
            )
            .unwrap();

        let mut module = Module::new(Metadata::default());
        module.root.statements.push(Statement::DeclareAlias(DeclareAliasStatement {
            name: String::from("h"),
            alias_index: Some(alias_index),
            expression: Box::new(Expression::IdentifierValue(IdentifierValueExpression {
                kind: IdentifierKind::Function,
                index: func_index,
                cached_type: None,
                location: loc.clone(),
            })),
            location: loc.clone(),
        }));
        module.root.statements.push(Statement::Expression(ExpressionStatement {
            expression: Expression::IdentifierValue(IdentifierValueExpression {
                kind: IdentifierKind::Alias,
                index: alias_index,
                cached_type: Some(ExpressionType::Alias(alias_index)),
                location: loc.clone(),
            }),
            location: loc,
        }));

        let mut pass = AliasPass;
        pass.transform(&mut module, &mut ctx).unwrap();

        // the declaration is gone, the reference now targets the function
        assert_eq!(module.root.statements.len(), 1);
        let Statement::Expression(stmt) = &module.root.statements[0] else {
            panic!("expected expression statement");
        };
        let Expression::IdentifierValue(value) = &stmt.expression else {
            panic!("expected identifier value");
        };
        assert_eq!(value.kind, IdentifierKind::Function);
        assert_eq!(value.index, func_index);
    }
}
