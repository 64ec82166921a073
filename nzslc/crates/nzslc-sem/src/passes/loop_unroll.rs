//! Loop unrolling.
//!
//! Unrolls `[unroll]` range loops: the trip count must fold to constants,
//! the body is cloned once per iteration, the loop variable is rebound as
//! a `const` carrying the iteration value, and declarations inside each
//! copy receive fresh indices through the index remapper.

use crate::context::{ConstantData, IdentifierTarget, TransformerContext, VariableData};
use crate::executor::Pass;
use crate::passes::index_remapper::IndexRemapperPass;
use crate::transformer::{
    transform_module, visit_statement, StatementTransform, TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::{CompilationError, Error, Result};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
pub struct LoopUnrollPass;

/// Walks a cloned body, registering a fresh index for every declaration
/// and recording the mapping.
struct DeclarationRefresher {
    mapping: Rc<RefCell<FxHashMap<(IdentifierKind, usize), IdentifierTarget>>>,
}

impl Transformer for DeclarationRefresher {
    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        let location = stmt.location().clone();
        match stmt {
            Statement::DeclareVariable(decl) => {
                if let Some(old) = decl.var_index {
                    let data = state.ctx.variables.retrieve(old, &location)?.clone();
                    let new = state.ctx.variables.register(None, data, &location)?;
                    self.mapping.borrow_mut().insert(
                        (IdentifierKind::Variable, old),
                        IdentifierTarget {
                            kind: IdentifierKind::Variable,
                            index: new,
                        },
                    );
                }
            }
            Statement::DeclareConst(decl) => {
                if let Some(old) = decl.const_index {
                    let data = state.ctx.constants.retrieve(old, &location)?.clone();
                    let new = state.ctx.constants.register(None, data, &location)?;
                    self.mapping.borrow_mut().insert(
                        (IdentifierKind::Constant, old),
                        IdentifierTarget {
                            kind: IdentifierKind::Constant,
                            index: new,
                        },
                    );
                }
            }
            Statement::For(for_stmt) => {
                if let Some(old) = for_stmt.var_index {
                    let data = state.ctx.variables.retrieve(old, &location)?.clone();
                    let new = state.ctx.variables.register(None, data, &location)?;
                    self.mapping.borrow_mut().insert(
                        (IdentifierKind::Variable, old),
                        IdentifierTarget {
                            kind: IdentifierKind::Variable,
                            index: new,
                        },
                    );
                }
            }
            Statement::ForEach(for_each) => {
                if let Some(old) = for_each.var_index {
                    let data = state.ctx.variables.retrieve(old, &location)?.clone();
                    let new = state.ctx.variables.register(None, data, &location)?;
                    self.mapping.borrow_mut().insert(
                        (IdentifierKind::Variable, old),
                        IdentifierTarget {
                            kind: IdentifierKind::Variable,
                            index: new,
                        },
                    );
                }
            }
            _ => {}
        }
        Ok(StatementTransform::VisitChildren)
    }
}

impl LoopUnrollPass {
    /// Clones `body` for one iteration, refreshing declared indices and
    /// redirecting the loop variable to `iteration_const`.
    fn instantiate_body(
        body: &Statement,
        loop_var: usize,
        iteration_const: usize,
        state: &mut TransformState,
    ) -> Result<Statement> {
        let mut copy = body.clone();

        let mapping = Rc::new(RefCell::new(FxHashMap::default()));
        mapping.borrow_mut().insert(
            (IdentifierKind::Variable, loop_var),
            IdentifierTarget {
                kind: IdentifierKind::Constant,
                index: iteration_const,
            },
        );

        let mut refresher = DeclarationRefresher {
            mapping: mapping.clone(),
        };
        visit_statement(&mut refresher, &mut copy, state)?;

        let remap_mapping = mapping.clone();
        let mut remapper = IndexRemapperPass::new(Box::new(move |kind, index| {
            remap_mapping.borrow().get(&(kind, index)).copied()
        }));
        visit_statement(&mut remapper, &mut copy, state)?;

        Ok(copy)
    }

    fn unroll_for(
        for_stmt: &mut ForStatement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        let location = for_stmt.location.clone();
        let Some(var_index) = for_stmt.var_index else {
            return Ok(StatementTransform::VisitChildren);
        };

        let constant_bound = |expr: &Expression, state: &TransformState| -> Result<Option<i64>> {
            Ok(state.compute_constant_value(expr)?.and_then(|value| value.as_integer()))
        };

        let from = constant_bound(&for_stmt.from_expr, state)?;
        let to = constant_bound(&for_stmt.to_expr, state)?;
        let step = match &for_stmt.step_expr {
            Some(step) => constant_bound(step, state)?,
            None => Some(1),
        };

        let (Some(from), Some(to), Some(step)) = (from, to, step) else {
            if state.ctx.partial_compilation {
                return Ok(StatementTransform::VisitChildren);
            }
            return Err(Error::new(
                location,
                CompilationError::ConstantExpressionRequired,
            ));
        };
        if step <= 0 {
            return Err(Error::new(
                location,
                CompilationError::ConstantExpressionRequired,
            ));
        }

        let counter_type = state
            .ctx
            .variables
            .retrieve(var_index, &location)?
            .ty
            .clone();
        let var_name = for_stmt.var_name.clone();
        let body = std::mem::replace(
            &mut *for_stmt.statement,
            Statement::no_op(location.clone()),
        );

        let mut statements = Vec::new();
        let mut value = from;
        while value < to {
            let constant_value = match counter_type {
                ExpressionType::Primitive(PrimitiveType::UInt32) => {
                    ConstantValue::u32(value as u32)
                }
                _ => ConstantValue::i32(value as i32),
            };

            let const_index = state.ctx.constants.register(
                None,
                ConstantData {
                    module_index: 0,
                    name: var_name.clone(),
                    ty: counter_type.clone(),
                    value: Some(constant_value.clone()),
                },
                &location,
            )?;

            statements.push(Statement::DeclareConst(DeclareConstStatement {
                name: var_name.clone(),
                const_index: Some(const_index),
                ty: ExpressionValue::Value(counter_type.clone()),
                expression: Box::new(Expression::constant(constant_value, location.clone())),
                is_exported: ExpressionValue::None,
                location: location.clone(),
            }));

            statements.push(Self::instantiate_body(&body, var_index, const_index, state)?);

            value += step;
        }

        Ok(StatementTransform::Replace(Statement::Multi(
            MultiStatement {
                statements,
                location,
            },
        )))
    }

    fn unroll_for_each(
        for_each: &mut ForEachStatement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        let location = for_each.location.clone();
        let Some(var_index) = for_each.var_index else {
            return Ok(StatementTransform::VisitChildren);
        };

        let container_type = for_each
            .expression
            .cached_type()
            .cloned()
            .unwrap_or(ExpressionType::NoType);
        let ExpressionType::Array(array_type) = &container_type else {
            if state.ctx.partial_compilation {
                return Ok(StatementTransform::VisitChildren);
            }
            return Err(Error::new(
                location,
                CompilationError::ForEachUnsupportedType {
                    ty: container_type.to_string(),
                },
            ));
        };
        let length = array_type.length;
        let element_type = (*array_type.inner).clone();

        let container = std::mem::replace(
            &mut *for_each.expression,
            Expression::constant(ConstantValue::NoValue, location.clone()),
        );
        let container = state.cache_expression(container)?;
        let body = std::mem::replace(
            &mut *for_each.statement,
            Statement::no_op(location.clone()),
        );
        let var_name = for_each.var_name.clone();

        let mut statements = Vec::new();
        for index in 0..length {
            // each copy gets its own element variable
            let element_index = state.ctx.variables.register(
                None,
                VariableData {
                    name: var_name.clone(),
                    ty: element_type.clone(),
                },
                &location,
            )?;
            statements.push(Statement::DeclareVariable(DeclareVariableStatement {
                name: var_name.clone(),
                var_index: Some(element_index),
                ty: ExpressionValue::Value(element_type.clone()),
                initial_expression: Some(Box::new(Expression::AccessIndex(
                    AccessIndexExpression {
                        expr: Box::new(container.clone()),
                        indices: vec![Expression::constant(
                            ConstantValue::u32(index),
                            location.clone(),
                        )],
                        cached_type: Some(element_type.clone()),
                        location: location.clone(),
                    },
                ))),
                location: location.clone(),
            }));

            let mut copy = body.clone();
            let mapping = Rc::new(RefCell::new(FxHashMap::default()));
            mapping.borrow_mut().insert(
                (IdentifierKind::Variable, var_index),
                IdentifierTarget {
                    kind: IdentifierKind::Variable,
                    index: element_index,
                },
            );
            let mut refresher = DeclarationRefresher {
                mapping: mapping.clone(),
            };
            visit_statement(&mut refresher, &mut copy, state)?;
            let remap_mapping = mapping.clone();
            let mut remapper = IndexRemapperPass::new(Box::new(move |kind, index| {
                remap_mapping.borrow().get(&(kind, index)).copied()
            }));
            visit_statement(&mut remapper, &mut copy, state)?;
            statements.push(copy);
        }

        Ok(StatementTransform::Replace(Statement::Multi(
            MultiStatement {
                statements,
                location,
            },
        )))
    }
}

impl Transformer for LoopUnrollPass {
    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        match stmt {
            Statement::For(for_stmt) if for_stmt.unroll.as_value() == Some(&true) => {
                Self::unroll_for(for_stmt, state)
            }
            Statement::ForEach(for_each) if for_each.unroll.as_value() == Some(&true) => {
                Self::unroll_for_each(for_each, state)
            }
            _ => Ok(StatementTransform::VisitChildren),
        }
    }
}

impl Pass for LoopUnrollPass {
    fn name(&self) -> &'static str {
        "loop unroll"
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

    fn unroll(source: &str) -> (Module, TransformerContext) {
        let mut module = parse(source).expect("parse");
        let mut ctx = TransformerContext::new();
        ResolvePass::new(None, FxHashMap::default())
            .transform(&mut module, &mut ctx)
            .expect("resolve");
        LoopUnrollPass.transform(&mut module, &mut ctx).expect("unroll");
        (module, ctx)
    }

    #[test]
    fn test_unroll_produces_const_per_iteration() {
        let (module, ctx) = unroll(
            "[nzsl_version(\"1.0\")]\nmodule;\nfn f() {\n let counter = 0;\n [unroll] for i in 0 -> 3 { counter += i; }\n}\n",
        );
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::Multi(unrolled) = &func.statements[1] else {
            panic!("expected unrolled multi, got {:?}", func.statements[1]);
        };
        // three (const + body) pairs
        assert_eq!(unrolled.statements.len(), 6);

        let mut const_values = Vec::new();
        for stmt in &unrolled.statements {
            if let Statement::DeclareConst(decl) = stmt {
                assert_eq!(decl.name, "i");
                assert_eq!(decl.ty.as_value(), Some(&ExpressionType::i32()));
                let index = decl.const_index.unwrap();
                const_values.push(ctx.constants.try_retrieve(index).unwrap().value.clone());
            }
        }
        assert_eq!(
            const_values,
            vec![
                Some(ConstantValue::i32(0)),
                Some(ConstantValue::i32(1)),
                Some(ConstantValue::i32(2)),
            ]
        );
    }

    #[test]
    fn test_unrolled_bodies_get_fresh_indices() {
        let (module, _ctx) = unroll(
            "[nzsl_version(\"1.0\")]\nmodule;\nfn f() {\n [unroll] for i in 0 -> 2 { let local = i; }\n}\n",
        );
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::Multi(unrolled) = &func.statements[0] else {
            panic!("expected unrolled multi");
        };

        // collect the `local` declarations of each copy
        let mut indices = Vec::new();
        for stmt in &unrolled.statements {
            let Statement::Scoped(scoped) = stmt else {
                continue;
            };
            let Statement::Multi(body) = scoped.statement.as_ref() else {
                continue;
            };
            for inner in &body.statements {
                if let Statement::DeclareVariable(decl) = inner {
                    indices.push(decl.var_index.unwrap());
                }
            }
        }
        assert_eq!(indices.len(), 2);
        assert_ne!(indices[0], indices[1]);
    }

    #[test]
    fn test_unroll_requires_constant_bounds() {
        let mut module = parse(
            "[nzsl_version(\"1.0\")]\nmodule;\nfn f(n: i32) {\n [unroll] for i in 0 -> n { }\n}\n",
        )
        .unwrap();
        let mut ctx = TransformerContext::new();
        ResolvePass::new(None, FxHashMap::default())
            .transform(&mut module, &mut ctx)
            .unwrap();
        let err = LoopUnrollPass.transform(&mut module, &mut ctx).unwrap_err();
        assert!(err.to_string().contains("constant expression is required"));
    }
}
