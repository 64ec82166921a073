//! For-loop lowering.
//!
//! Rewrites `for i in a -> b : s` and `for v in arr` into `while` loops
//! with an explicit counter, for back-ends without range loops. Loops
//! marked `[unroll]` are left for the unrolling pass.

use crate::context::{TransformerContext, VariableData};
use crate::executor::Pass;
use crate::transformer::{
    transform_module, StatementTransform, TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::{CompilationError, Error, Result, SourceLocation};

#[derive(Default)]
pub struct ForToWhilePass;

fn variable_ref(index: usize, ty: ExpressionType, location: SourceLocation) -> Expression {
    Expression::IdentifierValue(IdentifierValueExpression {
        kind: IdentifierKind::Variable,
        index,
        cached_type: Some(ty),
        location,
    })
}

fn one_of(ty: &ExpressionType) -> ConstantValue {
    match ty {
        ExpressionType::Primitive(PrimitiveType::UInt32) => ConstantValue::u32(1),
        _ => ConstantValue::i32(1),
    }
}

impl ForToWhilePass {
    fn lower_for(
        for_stmt: &mut ForStatement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        let location = for_stmt.location.clone();
        let Some(var_index) = for_stmt.var_index else {
            // unresolved loop, leave as-is (partial compilation)
            return Ok(StatementTransform::VisitChildren);
        };
        let counter_type = state
            .ctx
            .variables
            .retrieve(var_index, &location)?
            .ty
            .clone();

        let from = std::mem::replace(
            &mut *for_stmt.from_expr,
            Expression::constant(ConstantValue::NoValue, location.clone()),
        );
        let to = std::mem::replace(
            &mut *for_stmt.to_expr,
            Expression::constant(ConstantValue::NoValue, location.clone()),
        );
        let step = for_stmt.step_expr.take();
        let body = std::mem::replace(
            &mut *for_stmt.statement,
            Statement::no_op(location.clone()),
        );

        // evaluate the bound and step once, before the loop
        let target = state.cache_expression(to)?;
        let step = match step {
            Some(step) => state.cache_expression(*step)?,
            None => Expression::constant(one_of(&counter_type), location.clone()),
        };

        state.append_statement(Statement::DeclareVariable(DeclareVariableStatement {
            name: for_stmt.var_name.clone(),
            var_index: Some(var_index),
            ty: ExpressionValue::Value(counter_type.clone()),
            initial_expression: Some(Box::new(from)),
            location: location.clone(),
        }));

        let condition = Expression::Binary(BinaryExpression {
            op: BinaryType::CompLt,
            left: Box::new(variable_ref(
                var_index,
                counter_type.clone(),
                location.clone(),
            )),
            right: Box::new(target),
            cached_type: Some(ExpressionType::bool()),
            location: location.clone(),
        });

        let increment = Statement::Expression(ExpressionStatement {
            expression: Expression::Assign(AssignExpression {
                op: AssignType::Simple,
                left: Box::new(variable_ref(
                    var_index,
                    counter_type.clone(),
                    location.clone(),
                )),
                right: Box::new(Expression::Binary(BinaryExpression {
                    op: BinaryType::Add,
                    left: Box::new(variable_ref(
                        var_index,
                        counter_type.clone(),
                        location.clone(),
                    )),
                    right: Box::new(step),
                    cached_type: Some(counter_type.clone()),
                    location: location.clone(),
                })),
                cached_type: Some(counter_type),
                location: location.clone(),
            }),
            location: location.clone(),
        });

        Ok(StatementTransform::Replace(Statement::While(
            WhileStatement {
                condition: Box::new(condition),
                body: Box::new(Statement::Multi(MultiStatement {
                    statements: vec![body, increment],
                    location: location.clone(),
                })),
                unroll: ExpressionValue::None,
                location,
            },
        )))
    }

    fn lower_for_each(
        for_each: &mut ForEachStatement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        let location = for_each.location.clone();
        let Some(var_index) = for_each.var_index else {
            return Ok(StatementTransform::VisitChildren);
        };
        let element_type = state
            .ctx
            .variables
            .retrieve(var_index, &location)?
            .ty
            .clone();

        let container = std::mem::replace(
            &mut *for_each.expression,
            Expression::constant(ConstantValue::NoValue, location.clone()),
        );
        let container_type = container
            .cached_type()
            .cloned()
            .unwrap_or(ExpressionType::NoType);
        let ExpressionType::Array(array_type) = &container_type else {
            return Err(Error::new(
                location,
                CompilationError::ForEachUnsupportedType {
                    ty: container_type.to_string(),
                },
            ));
        };
        let length = array_type.length;
        let body = std::mem::replace(
            &mut *for_each.statement,
            Statement::no_op(location.clone()),
        );

        let container = state.cache_expression(container)?;

        // counter
        let counter_index = state.ctx.variables.register(
            None,
            VariableData {
                name: format!("_nzsl_counter_{var_index}"),
                ty: ExpressionType::u32(),
            },
            &location,
        )?;
        state.append_statement(Statement::DeclareVariable(DeclareVariableStatement {
            name: format!("_nzsl_counter_{var_index}"),
            var_index: Some(counter_index),
            ty: ExpressionValue::Value(ExpressionType::u32()),
            initial_expression: Some(Box::new(Expression::constant(
                ConstantValue::u32(0),
                location.clone(),
            ))),
            location: location.clone(),
        }));

        let condition = Expression::Binary(BinaryExpression {
            op: BinaryType::CompLt,
            left: Box::new(variable_ref(
                counter_index,
                ExpressionType::u32(),
                location.clone(),
            )),
            right: Box::new(Expression::constant(
                ConstantValue::u32(length),
                location.clone(),
            )),
            cached_type: Some(ExpressionType::bool()),
            location: location.clone(),
        });

        let element_decl = Statement::DeclareVariable(DeclareVariableStatement {
            name: for_each.var_name.clone(),
            var_index: Some(var_index),
            ty: ExpressionValue::Value(element_type.clone()),
            initial_expression: Some(Box::new(Expression::AccessIndex(AccessIndexExpression {
                expr: Box::new(container),
                indices: vec![variable_ref(
                    counter_index,
                    ExpressionType::u32(),
                    location.clone(),
                )],
                cached_type: Some(element_type),
                location: location.clone(),
            }))),
            location: location.clone(),
        });

        let increment = Statement::Expression(ExpressionStatement {
            expression: Expression::Assign(AssignExpression {
                op: AssignType::Simple,
                left: Box::new(variable_ref(
                    counter_index,
                    ExpressionType::u32(),
                    location.clone(),
                )),
                right: Box::new(Expression::Binary(BinaryExpression {
                    op: BinaryType::Add,
                    left: Box::new(variable_ref(
                        counter_index,
                        ExpressionType::u32(),
                        location.clone(),
                    )),
                    right: Box::new(Expression::constant(
                        ConstantValue::u32(1),
                        location.clone(),
                    )),
                    cached_type: Some(ExpressionType::u32()),
                    location: location.clone(),
                })),
                cached_type: Some(ExpressionType::u32()),
                location: location.clone(),
            }),
            location: location.clone(),
        });

        Ok(StatementTransform::Replace(Statement::While(
            WhileStatement {
                condition: Box::new(condition),
                body: Box::new(Statement::Multi(MultiStatement {
                    statements: vec![element_decl, body, increment],
                    location: location.clone(),
                })),
                unroll: ExpressionValue::None,
                location,
            },
        )))
    }
}

impl Transformer for ForToWhilePass {
    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        match stmt {
            Statement::For(for_stmt) => {
                if for_stmt.unroll.as_value() == Some(&true) {
                    return Ok(StatementTransform::VisitChildren);
                }
                Self::lower_for(for_stmt, state)
            }
            Statement::ForEach(for_each) => {
                if for_each.unroll.as_value() == Some(&true) {
                    return Ok(StatementTransform::VisitChildren);
                }
                Self::lower_for_each(for_each, state)
            }
            _ => Ok(StatementTransform::VisitChildren),
        }
    }
}

impl Pass for ForToWhilePass {
    fn name(&self) -> &'static str {
        "for-to-while"
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

    fn lower(source: &str) -> Module {
        let mut module = parse(source).expect("parse");
        let mut ctx = TransformerContext::new();
        ResolvePass::new(None, FxHashMap::default())
            .transform(&mut module, &mut ctx)
            .expect("resolve");
        ForToWhilePass
            .transform(&mut module, &mut ctx)
            .expect("lower");
        module
    }

    #[test]
    fn test_range_for_becomes_while() {
        let module = lower(
            "[nzsl_version(\"1.0\")]\nmodule;\nfn f() {\n let counter = 0;\n for i in 0 -> 3 { }\n}\n",
        );
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        // let counter; counter declaration for i; while
        let kinds: Vec<_> = func
            .statements
            .iter()
            .map(|stmt| match stmt {
                Statement::DeclareVariable(decl) => format!("let {}", decl.name),
                Statement::While(_) => String::from("while"),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec!["let counter", "let i", "while"]);

        let Statement::While(while_stmt) = &func.statements[2] else {
            panic!("expected while");
        };
        let Expression::Binary(cond) = while_stmt.condition.as_ref() else {
            panic!("expected comparison condition");
        };
        assert_eq!(cond.op, BinaryType::CompLt);
        let Statement::Multi(body) = while_stmt.body.as_ref() else {
            panic!("expected multi body");
        };
        // original body + increment
        assert_eq!(body.statements.len(), 2);
    }

    #[test]
    fn test_unrolled_for_is_kept() {
        let module = lower(
            "[nzsl_version(\"1.0\")]\nmodule;\nfn f() {\n [unroll] for i in 0 -> 3 { }\n}\n",
        );
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        assert!(matches!(&func.statements[0], Statement::For(_)));
    }

    #[test]
    fn test_for_each_becomes_while() {
        let module = lower(
            "[nzsl_version(\"1.0\")]\nmodule;\nfn f() {\n let data = array[f32, 2](1.0, 2.0);\n for v in data { let x = v; }\n}\n",
        );
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::While(while_stmt) = func.statements.last().unwrap() else {
            panic!("expected while, got {:?}", func.statements.last());
        };
        let Statement::Multi(body) = while_stmt.body.as_ref() else {
            panic!("expected multi body");
        };
        // element declaration + original body + increment
        assert_eq!(body.statements.len(), 3);
        assert!(matches!(&body.statements[0], Statement::DeclareVariable(_)));
    }
}
