//! Struct-assignment splitting.
//!
//! Some back-ends cannot assign a whole struct or array living in a
//! buffer (`ubo.s = localS`). This pass splits such assignments into
//! per-field (or per-element) stores; nested aggregates split recursively
//! as the walker revisits the produced statements.

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::transformer::{
    transform_module, StatementTransform, TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::{Result, SourceLocation};

#[derive(Default)]
pub struct StructAssignmentPass;

fn field_store(
    left: &Expression,
    right: &Expression,
    field_index: u32,
    field_type: ExpressionType,
    location: &SourceLocation,
) -> Statement {
    let access = |base: &Expression| {
        Expression::AccessField(AccessFieldExpression {
            expr: Box::new(base.clone()),
            field_index,
            cached_type: Some(field_type.clone()),
            location: location.clone(),
        })
    };
    Statement::Expression(ExpressionStatement {
        expression: Expression::Assign(AssignExpression {
            op: AssignType::Simple,
            left: Box::new(access(left)),
            right: Box::new(access(right)),
            cached_type: Some(field_type.clone()),
            location: location.clone(),
        }),
        location: location.clone(),
    })
}

fn element_store(
    left: &Expression,
    right: &Expression,
    element: u32,
    element_type: ExpressionType,
    location: &SourceLocation,
) -> Statement {
    let access = |base: &Expression| {
        Expression::AccessIndex(AccessIndexExpression {
            expr: Box::new(base.clone()),
            indices: vec![Expression::constant(
                ConstantValue::u32(element),
                location.clone(),
            )],
            cached_type: Some(element_type.clone()),
            location: location.clone(),
        })
    };
    Statement::Expression(ExpressionStatement {
        expression: Expression::Assign(AssignExpression {
            op: AssignType::Simple,
            left: Box::new(access(left)),
            right: Box::new(access(right)),
            cached_type: Some(element_type.clone()),
            location: location.clone(),
        }),
        location: location.clone(),
    })
}

impl Transformer for StructAssignmentPass {
    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        let Statement::Expression(expression_stmt) = stmt else {
            return Ok(StatementTransform::VisitChildren);
        };
        let Expression::Assign(assign) = &mut expression_stmt.expression else {
            return Ok(StatementTransform::VisitChildren);
        };
        if assign.op != AssignType::Simple {
            return Ok(StatementTransform::VisitChildren);
        }

        let assigned_type = assign.left.cached_type().cloned();
        let location = expression_stmt.location.clone();

        match assigned_type {
            Some(ExpressionType::Struct(struct_index)) => {
                let members: Vec<(u32, ExpressionType)> = state
                    .ctx
                    .structs
                    .retrieve(struct_index, &location)?
                    .description
                    .members
                    .iter()
                    .enumerate()
                    .map(|(index, member)| {
                        (
                            index as u32,
                            member
                                .ty
                                .as_value()
                                .cloned()
                                .unwrap_or(ExpressionType::NoType),
                        )
                    })
                    .collect();

                let left = std::mem::replace(
                    &mut *assign.left,
                    Expression::constant(ConstantValue::NoValue, location.clone()),
                );
                let right = std::mem::replace(
                    &mut *assign.right,
                    Expression::constant(ConstantValue::NoValue, location.clone()),
                );
                let right = state.cache_expression(right)?;

                let statements = members
                    .into_iter()
                    .map(|(index, field_type)| {
                        field_store(&left, &right, index, field_type, &location)
                    })
                    .collect();

                Ok(StatementTransform::Replace(Statement::Multi(
                    MultiStatement {
                        statements,
                        location,
                    },
                )))
            }
            Some(ExpressionType::Array(array)) => {
                let left = std::mem::replace(
                    &mut *assign.left,
                    Expression::constant(ConstantValue::NoValue, location.clone()),
                );
                let right = std::mem::replace(
                    &mut *assign.right,
                    Expression::constant(ConstantValue::NoValue, location.clone()),
                );
                let right = state.cache_expression(right)?;

                let statements = (0..array.length)
                    .map(|element| {
                        element_store(&left, &right, element, (*array.inner).clone(), &location)
                    })
                    .collect();

                Ok(StatementTransform::Replace(Statement::Multi(
                    MultiStatement {
                        statements,
                        location,
                    },
                )))
            }
            _ => Ok(StatementTransform::VisitChildren),
        }
    }
}

impl Pass for StructAssignmentPass {
    fn name(&self) -> &'static str {
        "struct assignment splitter"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        transform_module(self, module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::resolve::ResolvePass;
    use nzslc_par::parse;
    use rustc_hash::FxHashMap;

    fn run(source: &str) -> Module {
        let mut module = parse(source).expect("parse");
        let mut ctx = TransformerContext::new();
        ResolvePass::new(None, FxHashMap::default())
            .transform(&mut module, &mut ctx)
            .expect("resolve");
        StructAssignmentPass
            .transform(&mut module, &mut ctx)
            .expect("split");
        module
    }

    const HEADER: &str = "[nzsl_version(\"1.0\")]\nmodule;\n";

    #[test]
    fn test_struct_assignment_splits_per_field() {
        let source = format!(
            "{HEADER}struct Data {{ a: f32, b: f32 }}\nfn f(x: Data, y: Data) {{ x = y; }}\n"
        );
        let module = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[1] else {
            panic!("expected function");
        };
        let Statement::Multi(split) = func.statements.last().unwrap() else {
            panic!("expected multi, got {:?}", func.statements.last());
        };
        assert_eq!(split.statements.len(), 2);
        for (index, stmt) in split.statements.iter().enumerate() {
            let Statement::Expression(stmt) = stmt else {
                panic!("expected expression statement");
            };
            let Expression::Assign(assign) = &stmt.expression else {
                panic!("expected assignment");
            };
            let Expression::AccessField(left) = assign.left.as_ref() else {
                panic!("expected field access");
            };
            assert_eq!(left.field_index, index as u32);
        }
    }

    #[test]
    fn test_array_assignment_splits_per_element() {
        let source = format!(
            "{HEADER}fn f() {{ let a = array[f32, 3](1.0, 2.0, 3.0); let b = array[f32, 3](0.0, 0.0, 0.0); b = a; }}\n"
        );
        let module = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::Multi(split) = func.statements.last().unwrap() else {
            panic!("expected multi");
        };
        assert_eq!(split.statements.len(), 3);
    }
}
