//! Branch splitting.
//!
//! Rewrites multi-arm `if / else if / else` chains into nested two-way
//! branches, for back-ends without else-if chains.

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::transformer::{transform_module, StatementTransform, TransformState, Transformer};
use nzslc_par::ast::*;
use nzslc_util::Result;

#[derive(Default)]
pub struct BranchSplitterPass;

impl Transformer for BranchSplitterPass {
    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        _state: &mut TransformState,
    ) -> Result<StatementTransform> {
        let Statement::Branch(branch) = stmt else {
            return Ok(StatementTransform::VisitChildren);
        };
        if branch.cond_statements.len() <= 1 {
            return Ok(StatementTransform::VisitChildren);
        }

        let location = branch.location.clone();
        let is_const = branch.is_const;
        let mut arms = std::mem::take(&mut branch.cond_statements);
        let mut else_statement = branch.else_statement.take();

        // rebuild inside-out: the last arm keeps the original else
        while arms.len() > 1 {
            let arm = arms.pop().expect("length checked");
            let inner_location = arm.statement.location().clone();
            else_statement = Some(Box::new(Statement::Branch(BranchStatement {
                cond_statements: vec![arm],
                else_statement,
                is_const,
                location: inner_location,
            })));
        }

        Ok(StatementTransform::Replace(Statement::Branch(
            BranchStatement {
                cond_statements: arms,
                else_statement,
                is_const,
                location,
            },
        )))
    }
}

impl Pass for BranchSplitterPass {
    fn name(&self) -> &'static str {
        "branch splitter"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        transform_module(self, module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nzslc_util::SourceLocation;

    fn condition(value: bool) -> Expression {
        Expression::constant(ConstantValue::bool(value), SourceLocation::default())
    }

    fn empty_block() -> Box<Statement> {
        Box::new(Statement::no_op(SourceLocation::default()))
    }

    #[test]
    fn test_three_arms_become_nested() {
        let mut module = Module::new(Metadata::default());
        module.root.statements.push(Statement::Branch(BranchStatement {
            cond_statements: vec![
                ConditionalBranch {
                    condition: condition(false),
                    statement: empty_block(),
                },
                ConditionalBranch {
                    condition: condition(false),
                    statement: empty_block(),
                },
                ConditionalBranch {
                    condition: condition(true),
                    statement: empty_block(),
                },
            ],
            else_statement: Some(empty_block()),
            is_const: false,
            location: SourceLocation::default(),
        }));

        let mut ctx = TransformerContext::new();
        BranchSplitterPass
            .transform(&mut module, &mut ctx)
            .unwrap();

        // outer branch has one arm, whose else is another single-arm
        // branch, and so on
        let Statement::Branch(outer) = &module.root.statements[0] else {
            panic!("expected branch");
        };
        assert_eq!(outer.cond_statements.len(), 1);
        let Some(Statement::Branch(middle)) = outer.else_statement.as_deref() else {
            panic!("expected nested branch");
        };
        assert_eq!(middle.cond_statements.len(), 1);
        let Some(Statement::Branch(inner)) = middle.else_statement.as_deref() else {
            panic!("expected nested branch");
        };
        assert_eq!(inner.cond_statements.len(), 1);
        assert!(inner.else_statement.is_some());
    }
}
