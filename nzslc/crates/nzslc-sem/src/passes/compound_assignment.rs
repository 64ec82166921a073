//! Compound-assignment lowering.
//!
//! Rewrites `a op= b` into `a = a op b` for back-ends without compound
//! assignment operators. The left side is a place expression, so cloning
//! it does not duplicate side effects.

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::transformer::{
    transform_module, ExpressionTransform, TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::Result;

#[derive(Default)]
pub struct CompoundAssignmentPass;

fn binary_op(op: AssignType) -> Option<BinaryType> {
    Some(match op {
        AssignType::Simple => return None,
        AssignType::CompoundAdd => BinaryType::Add,
        AssignType::CompoundSubtract => BinaryType::Subtract,
        AssignType::CompoundMultiply => BinaryType::Multiply,
        AssignType::CompoundDivide => BinaryType::Divide,
        AssignType::CompoundModulo => BinaryType::Modulo,
        AssignType::CompoundLogicalAnd => BinaryType::LogicalAnd,
        AssignType::CompoundLogicalOr => BinaryType::LogicalOr,
    })
}

impl Transformer for CompoundAssignmentPass {
    fn transform_expression(
        &mut self,
        expr: &mut Expression,
        _state: &mut TransformState,
    ) -> Result<ExpressionTransform> {
        let Expression::Assign(assign) = expr else {
            return Ok(ExpressionTransform::VisitChildren);
        };
        let Some(op) = binary_op(assign.op) else {
            return Ok(ExpressionTransform::VisitChildren);
        };

        assign.op = AssignType::Simple;
        let right = std::mem::replace(
            &mut assign.right,
            Box::new(Expression::constant(
                ConstantValue::NoValue,
                assign.location.clone(),
            )),
        );
        let location = right.location().clone();
        assign.right = Box::new(Expression::Binary(BinaryExpression {
            op,
            left: assign.left.clone(),
            right,
            cached_type: assign.cached_type.clone(),
            location,
        }));

        Ok(ExpressionTransform::VisitChildren)
    }
}

impl Pass for CompoundAssignmentPass {
    fn name(&self) -> &'static str {
        "compound assignment"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        transform_module(self, module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nzslc_util::SourceLocation;

    #[test]
    fn test_compound_add_lowering() {
        let loc = SourceLocation::default();
        let variable = Expression::IdentifierValue(IdentifierValueExpression {
            kind: IdentifierKind::Variable,
            index: 0,
            cached_type: Some(ExpressionType::i32()),
            location: loc.clone(),
        });

        let mut module = Module::new(Metadata::default());
        module.root.statements.push(Statement::Expression(ExpressionStatement {
            expression: Expression::Assign(AssignExpression {
                op: AssignType::CompoundAdd,
                left: Box::new(variable.clone()),
                right: Box::new(Expression::constant(ConstantValue::i32(1), loc.clone())),
                cached_type: Some(ExpressionType::i32()),
                location: loc.clone(),
            }),
            location: loc,
        }));

        let mut ctx = TransformerContext::new();
        CompoundAssignmentPass
            .transform(&mut module, &mut ctx)
            .unwrap();

        let Statement::Expression(stmt) = &module.root.statements[0] else {
            panic!("expected expression statement");
        };
        let Expression::Assign(assign) = &stmt.expression else {
            panic!("expected assignment");
        };
        assert_eq!(assign.op, AssignType::Simple);
        let Expression::Binary(binary) = assign.right.as_ref() else {
            panic!("expected binary right side");
        };
        assert_eq!(binary.op, BinaryType::Add);
        assert_eq!(*binary.left, variable);
    }
}
