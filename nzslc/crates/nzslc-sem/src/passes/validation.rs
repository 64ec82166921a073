//! Last-resort structural validation.
//!
//! Runs at the end of the pipeline and re-checks the invariants every
//! prior pass relies on: every bound identifier resolves into a live
//! table entry, every expression carries a concrete type, no untyped
//! literal survived literal typing, intrinsic parameters still match
//! their signatures and declarations carry their indices.

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::intrinsics::check_intrinsic;
use crate::transformer::{
    transform_module, ExpressionTransform, StatementTransform, TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::{AstError, Error, Result, SourceLocation};

#[derive(Default)]
pub struct ValidationPass {
    /// Accept untyped literals (tooling / partial pipelines).
    pub allow_untyped: bool,
}

impl ValidationPass {
    fn check_index(
        ctx: &TransformerContext,
        kind: IdentifierKind,
        index: usize,
        location: &SourceLocation,
    ) -> Result<()> {
        let registered = match kind {
            IdentifierKind::Alias => ctx.aliases.is_registered(index),
            IdentifierKind::Constant => ctx.constants.is_registered(index),
            IdentifierKind::ExternalBlock => ctx.named_external_blocks.is_registered(index),
            IdentifierKind::Function => ctx.functions.is_registered(index),
            IdentifierKind::Intrinsic => ctx.intrinsics.is_registered(index),
            IdentifierKind::Module => ctx.modules.is_registered(index),
            IdentifierKind::Struct => ctx.structs.is_registered(index),
            IdentifierKind::Type => ctx.types.is_registered(index),
            IdentifierKind::Variable => ctx.variables.is_registered(index),
        };
        if !registered {
            return Err(Error::new(
                location.clone(),
                AstError::InvalidIndex {
                    kind: kind.as_str(),
                    index,
                },
            ));
        }
        Ok(())
    }

    fn expect_index(index: Option<usize>, kind: &'static str, location: &SourceLocation) -> Result<()> {
        if index.is_none() {
            return Err(Error::new(location.clone(), AstError::ExpectedIndex { kind }));
        }
        Ok(())
    }
}

impl Transformer for ValidationPass {
    fn transform_expression(
        &mut self,
        expr: &mut Expression,
        state: &mut TransformState,
    ) -> Result<ExpressionTransform> {
        let partial = state.ctx.partial_compilation;
        let location = expr.location().clone();

        match expr.cached_type() {
            None if !partial => {
                return Err(Error::new(location, AstError::MissingType));
            }
            Some(ty) if ty.contains_literal() && !self.allow_untyped && !partial => {
                return Err(Error::new(location, AstError::UntypedLiteral));
            }
            _ => {}
        }

        match expr {
            Expression::Identifier(identifier) if !partial => {
                return Err(Error::new(
                    identifier.location.clone(),
                    AstError::UnresolvedIdentifier {
                        identifier: identifier.identifier.clone(),
                    },
                ));
            }
            Expression::IdentifierValue(value) => {
                Self::check_index(state.ctx, value.kind, value.index, &value.location)?;
            }
            Expression::Intrinsic(intrinsic) => {
                let mut types = Vec::with_capacity(intrinsic.parameters.len());
                let mut known = true;
                for parameter in &intrinsic.parameters {
                    match parameter.cached_type() {
                        Some(ty) => types.push(ty.clone()),
                        None => known = false,
                    }
                }
                if known {
                    check_intrinsic(intrinsic.intrinsic, &types, &intrinsic.location)?;
                }
            }
            _ => {}
        }

        Ok(ExpressionTransform::VisitChildren)
    }

    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        if state.ctx.partial_compilation {
            return Ok(StatementTransform::VisitChildren);
        }
        match stmt {
            Statement::DeclareAlias(alias) => {
                Self::expect_index(alias.alias_index, "alias", &alias.location)?;
            }
            Statement::DeclareConst(constant) => {
                Self::expect_index(constant.const_index, "constant", &constant.location)?;
            }
            Statement::DeclareFunction(function) => {
                Self::expect_index(function.func_index, "function", &function.location)?;
                for parameter in &function.parameters {
                    Self::expect_index(parameter.var_index, "variable", &parameter.location)?;
                }
            }
            Statement::DeclareStruct(decl) => {
                Self::expect_index(decl.struct_index, "struct", &decl.location)?;
            }
            Statement::DeclareVariable(variable) => {
                Self::expect_index(variable.var_index, "variable", &variable.location)?;
                if let Some(index) = variable.var_index {
                    Self::check_index(
                        state.ctx,
                        IdentifierKind::Variable,
                        index,
                        &variable.location,
                    )?;
                }
            }
            Statement::DeclareExternal(external) => {
                for var in &external.external_vars {
                    Self::expect_index(var.var_index, "variable", &var.location)?;
                }
            }
            _ => {}
        }
        Ok(StatementTransform::VisitChildren)
    }
}

impl Pass for ValidationPass {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        transform_module(self, module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nzslc_util::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::default()
    }

    fn module_with_expression(expression: Expression) -> Module {
        let mut module = Module::new(Metadata::default());
        module.root.statements.push(Statement::Expression(ExpressionStatement {
            expression,
            location: loc(),
        }));
        module
    }

    #[test]
    fn test_dangling_index_rejected() {
        let mut module = module_with_expression(Expression::IdentifierValue(
            IdentifierValueExpression {
                kind: IdentifierKind::Variable,
                index: 42,
                cached_type: Some(ExpressionType::f32()),
                location: loc(),
            },
        ));
        let mut ctx = TransformerContext::new();
        let err = ValidationPass::default()
            .transform(&mut module, &mut ctx)
            .unwrap_err();
        assert!(err.to_string().contains("invalid variable index 42"));
    }

    #[test]
    fn test_missing_type_rejected() {
        let mut module = module_with_expression(Expression::ConstantValue(
            ConstantValueExpression {
                value: ConstantValue::f32(1.0),
                cached_type: None,
                location: loc(),
            },
        ));
        let mut ctx = TransformerContext::new();
        let err = ValidationPass::default()
            .transform(&mut module, &mut ctx)
            .unwrap_err();
        assert!(err.to_string().contains("no type"));
    }

    #[test]
    fn test_untyped_literal_rejected() {
        let mut module = module_with_expression(Expression::constant(
            ConstantValue::Single(ConstantSingleValue::IntLiteral(1)),
            loc(),
        ));
        let mut ctx = TransformerContext::new();
        let err = ValidationPass::default()
            .transform(&mut module, &mut ctx)
            .unwrap_err();
        assert!(err.to_string().contains("untyped literal"));

        // accepted when untyped literals are allowed
        let mut module = module_with_expression(Expression::constant(
            ConstantValue::Single(ConstantSingleValue::IntLiteral(1)),
            loc(),
        ));
        ValidationPass {
            allow_untyped: true,
        }
        .transform(&mut module, &mut ctx)
        .unwrap();
    }

    #[test]
    fn test_partial_compilation_tolerates_unresolved() {
        let mut module = module_with_expression(Expression::Identifier(IdentifierExpression {
            identifier: String::from("missing"),
            cached_type: None,
            location: loc(),
        }));
        let mut ctx = TransformerContext::new();
        ctx.partial_compilation = true;
        ValidationPass::default()
            .transform(&mut module, &mut ctx)
            .unwrap();
    }
}
