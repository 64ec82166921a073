//! Swizzle lowering.
//!
//! - Scalar swizzles become vector constructors: `a.xxx` turns into
//!   `vec3[T](a, a, a)` (the operand is hoisted when re-evaluating it
//!   could duplicate side effects), `a.x` collapses to `a`.
//! - Writes through non-trivial swizzles are rewritten into a full-vector
//!   store: `v.zx = rhs` becomes `v = vec3(rhs.y, v.y, rhs.x)`.

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::transformer::{
    transform_module, ExpressionTransform, TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::Result;
use smallvec::smallvec;

#[derive(Default)]
pub struct SwizzlePass;

fn is_scalar(ty: Option<&ExpressionType>) -> bool {
    matches!(ty, Some(ExpressionType::Primitive(_)))
}

/// Identity swizzle over the full width of the vector (`v.xyzw`).
fn is_trivial(components: &[u32], base_type: Option<&ExpressionType>) -> bool {
    let Some(ExpressionType::Vector(vector)) = base_type else {
        return false;
    };
    components.len() as u32 == vector.component_count
        && components.iter().enumerate().all(|(i, &c)| c == i as u32)
}

impl Transformer for SwizzlePass {
    fn transform_expression(
        &mut self,
        expr: &mut Expression,
        state: &mut TransformState,
    ) -> Result<ExpressionTransform> {
        match expr {
            // scalar swizzle reads
            Expression::Swizzle(swizzle) if is_scalar(swizzle.expr.cached_type()) => {
                let base = std::mem::replace(
                    &mut *swizzle.expr,
                    Expression::constant(ConstantValue::NoValue, swizzle.location.clone()),
                );

                if swizzle.components.len() == 1 {
                    // a.x is a itself
                    return Ok(ExpressionTransform::Replace(base));
                }

                let base = state.cache_expression(base)?;
                let count = swizzle.components.len() as u32;
                let base_primitive = match base.cached_type() {
                    Some(ExpressionType::Primitive(primitive)) => *primitive,
                    _ => PrimitiveType::Float32,
                };
                let target = ExpressionType::vector(count, base_primitive);

                let expressions = (0..count).map(|_| base.clone()).collect();
                Ok(ExpressionTransform::Replace(Expression::Cast(
                    CastExpression {
                        target_type: ExpressionValue::Value(target.clone()),
                        expressions,
                        cached_type: Some(target),
                        location: swizzle.location.clone(),
                    },
                )))
            }

            // swizzle writes
            Expression::Assign(assign)
                if assign.op == AssignType::Simple
                    && matches!(assign.left.as_ref(), Expression::Swizzle(_)) =>
            {
                let Expression::Swizzle(left_swizzle) = assign.left.as_mut() else {
                    unreachable!()
                };

                if is_trivial(&left_swizzle.components, left_swizzle.expr.cached_type()) {
                    // v.xyzw = rhs is a plain store to v
                    let base = std::mem::replace(
                        &mut *left_swizzle.expr,
                        Expression::constant(
                            ConstantValue::NoValue,
                            left_swizzle.location.clone(),
                        ),
                    );
                    *assign.left = base;
                    return Ok(ExpressionTransform::VisitChildren);
                }

                let Some(ExpressionType::Vector(vector)) =
                    left_swizzle.expr.cached_type().cloned()
                else {
                    return Ok(ExpressionTransform::VisitChildren);
                };

                let location = assign.location.clone();
                let components = left_swizzle.components.clone();
                let base = std::mem::replace(
                    &mut *left_swizzle.expr,
                    Expression::constant(ConstantValue::NoValue, location.clone()),
                );
                let rhs = std::mem::replace(
                    &mut *assign.right,
                    Expression::constant(ConstantValue::NoValue, location.clone()),
                );
                let rhs = state.cache_expression(rhs)?;
                let rhs_is_scalar = is_scalar(rhs.cached_type());

                // rebuild the full vector: assigned lanes read from the
                // right side, the others keep their current value
                let mut shuffle = Vec::with_capacity(vector.component_count as usize);
                for lane in 0..vector.component_count {
                    if let Some(position) = components.iter().position(|&c| c == lane) {
                        if rhs_is_scalar {
                            shuffle.push(rhs.clone());
                        } else {
                            shuffle.push(Expression::Swizzle(SwizzleExpression {
                                expr: Box::new(rhs.clone()),
                                components: smallvec![position as u32],
                                cached_type: Some(ExpressionType::Primitive(vector.base)),
                                location: location.clone(),
                            }));
                        }
                    } else {
                        shuffle.push(Expression::Swizzle(SwizzleExpression {
                            expr: Box::new(base.clone()),
                            components: smallvec![lane],
                            cached_type: Some(ExpressionType::Primitive(vector.base)),
                            location: location.clone(),
                        }));
                    }
                }

                let vector_type = ExpressionType::Vector(vector);
                Ok(ExpressionTransform::Replace(Expression::Assign(
                    AssignExpression {
                        op: AssignType::Simple,
                        left: Box::new(base),
                        right: Box::new(Expression::Cast(CastExpression {
                            target_type: ExpressionValue::Value(vector_type.clone()),
                            expressions: shuffle,
                            cached_type: Some(vector_type.clone()),
                            location: location.clone(),
                        })),
                        cached_type: Some(vector_type),
                        location,
                    },
                )))
            }
            _ => Ok(ExpressionTransform::VisitChildren),
        }
    }
}

impl Pass for SwizzlePass {
    fn name(&self) -> &'static str {
        "swizzle lowering"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        transform_module(self, module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::literal::LiteralPass;
    use crate::passes::resolve::ResolvePass;
    use nzslc_par::parse;
    use rustc_hash::FxHashMap;

    fn run(source: &str) -> Module {
        let mut module = parse(source).expect("parse");
        let mut ctx = TransformerContext::new();
        ResolvePass::new(None, FxHashMap::default())
            .transform(&mut module, &mut ctx)
            .expect("resolve");
        LiteralPass::default()
            .transform(&mut module, &mut ctx)
            .expect("literal");
        SwizzlePass.transform(&mut module, &mut ctx).expect("swizzle");
        module
    }

    const HEADER: &str = "[nzsl_version(\"1.0\")]\nmodule;\n";

    #[test]
    fn test_scalar_swizzle_becomes_vector_cast() {
        let source = format!("{HEADER}[entry(frag)]\nfn main() {{ let value = 42.0; let vec = value.xxx; }}\n");
        let module = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(vec_var) = &func.statements[1] else {
            panic!("expected variable");
        };
        let Some(Expression::Cast(cast)) = vec_var.initial_expression.as_deref() else {
            panic!(
                "expected cast, got {:?}",
                vec_var.initial_expression.as_deref()
            );
        };
        assert_eq!(
            cast.target_type.as_value().unwrap().to_string(),
            "vec3[f32]"
        );
        assert_eq!(cast.expressions.len(), 3);
        // all three components reference the same variable
        for component in &cast.expressions {
            assert!(matches!(component, Expression::IdentifierValue(value) if value.kind == IdentifierKind::Variable));
        }
    }

    #[test]
    fn test_single_component_scalar_swizzle_collapses() {
        let source = format!("{HEADER}fn f() {{ let value = 1.0; let x = value.x; }}\n");
        let module = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(x) = &func.statements[1] else {
            panic!("expected variable");
        };
        assert!(matches!(
            x.initial_expression.as_deref(),
            Some(Expression::IdentifierValue(_))
        ));
    }

    #[test]
    fn test_swizzle_write_lowering() {
        let source = format!(
            "{HEADER}fn f() {{ let v = vec3[f32](0.0, 0.0, 0.0); v.zx = vec2[f32](1.0, 2.0); }}\n"
        );
        let module = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        // the rhs was hoisted, then the assignment stores a full vector
        let Statement::Expression(stmt) = func.statements.last().unwrap() else {
            panic!("expected expression statement");
        };
        let Expression::Assign(assign) = &stmt.expression else {
            panic!("expected assignment");
        };
        assert!(matches!(assign.left.as_ref(), Expression::IdentifierValue(_)));
        let Expression::Cast(cast) = assign.right.as_ref() else {
            panic!("expected cast on the right side");
        };
        assert_eq!(cast.expressions.len(), 3);
        // lane x reads rhs.y, lane y keeps v.y, lane z reads rhs.x
        let Expression::Swizzle(lane0) = &cast.expressions[0] else {
            panic!("expected swizzle");
        };
        assert_eq!(lane0.components.as_slice(), &[1]);
        let Expression::Swizzle(lane2) = &cast.expressions[2] else {
            panic!("expected swizzle");
        };
        assert_eq!(lane2.components.as_slice(), &[0]);
    }

    #[test]
    fn test_identity_swizzle_write_is_plain_store() {
        let source = format!(
            "{HEADER}fn f() {{ let v = vec2[f32](0.0, 0.0); v.xy = vec2[f32](1.0, 2.0); }}\n"
        );
        let module = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::Expression(stmt) = func.statements.last().unwrap() else {
            panic!("expected expression statement");
        };
        let Expression::Assign(assign) = &stmt.expression else {
            panic!("expected assignment");
        };
        assert!(matches!(assign.left.as_ref(), Expression::IdentifierValue(_)));
        assert!(matches!(assign.right.as_ref(), Expression::Cast(_)));
    }
}
