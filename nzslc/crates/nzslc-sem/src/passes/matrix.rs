//! Matrix lowering.
//!
//! Lowers the matrix operations some back-ends lack into column-wise
//! vector operations: `mat + mat` / `mat - mat` become per-column adds
//! inside a matrix constructor, and matrix-from-matrix casts are
//! decomposed into column extraction with truncation or identity
//! extension.

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::transformer::{
    transform_module, ExpressionTransform, TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::{Result, SourceLocation};
use smallvec::SmallVec;

#[derive(Default)]
pub struct MatrixPass;

fn column_access(
    matrix: Expression,
    column: u32,
    rows: u32,
    base: PrimitiveType,
    location: &SourceLocation,
) -> Expression {
    Expression::AccessIndex(AccessIndexExpression {
        expr: Box::new(matrix),
        indices: vec![Expression::constant(
            ConstantValue::i32(column as i32),
            location.clone(),
        )],
        cached_type: Some(ExpressionType::vector(rows, base)),
        location: location.clone(),
    })
}

fn zero_constant(base: PrimitiveType) -> ConstantValue {
    match base {
        PrimitiveType::Float64 => ConstantValue::Single(ConstantSingleValue::F64(0.0)),
        PrimitiveType::Int32 => ConstantValue::i32(0),
        PrimitiveType::UInt32 => ConstantValue::u32(0),
        _ => ConstantValue::f32(0.0),
    }
}

fn one_constant(base: PrimitiveType) -> ConstantValue {
    match base {
        PrimitiveType::Float64 => ConstantValue::Single(ConstantSingleValue::F64(1.0)),
        PrimitiveType::Int32 => ConstantValue::i32(1),
        PrimitiveType::UInt32 => ConstantValue::u32(1),
        _ => ConstantValue::f32(1.0),
    }
}

impl Transformer for MatrixPass {
    fn transform_expression(
        &mut self,
        expr: &mut Expression,
        state: &mut TransformState,
    ) -> Result<ExpressionTransform> {
        match expr {
            Expression::Binary(binary)
                if matches!(binary.op, BinaryType::Add | BinaryType::Subtract)
                    && matches!(binary.cached_type, Some(ExpressionType::Matrix(_))) =>
            {
                let Some(ExpressionType::Matrix(matrix)) = binary.cached_type.clone() else {
                    unreachable!()
                };
                let op = binary.op;
                let location = binary.location.clone();
                let left = std::mem::replace(
                    &mut *binary.left,
                    Expression::constant(ConstantValue::NoValue, location.clone()),
                );
                let right = std::mem::replace(
                    &mut *binary.right,
                    Expression::constant(ConstantValue::NoValue, location.clone()),
                );
                let left = state.cache_expression(left)?;
                let right = state.cache_expression(right)?;

                let column_type = ExpressionType::vector(matrix.row_count, matrix.base);
                let mut columns = Vec::with_capacity(matrix.column_count as usize);
                for column in 0..matrix.column_count {
                    columns.push(Expression::Binary(BinaryExpression {
                        op,
                        left: Box::new(column_access(
                            left.clone(),
                            column,
                            matrix.row_count,
                            matrix.base,
                            &location,
                        )),
                        right: Box::new(column_access(
                            right.clone(),
                            column,
                            matrix.row_count,
                            matrix.base,
                            &location,
                        )),
                        cached_type: Some(column_type.clone()),
                        location: location.clone(),
                    }));
                }

                let matrix_type = ExpressionType::Matrix(matrix);
                Ok(ExpressionTransform::Replace(Expression::Cast(
                    CastExpression {
                        target_type: ExpressionValue::Value(matrix_type.clone()),
                        expressions: columns,
                        cached_type: Some(matrix_type),
                        location,
                    },
                )))
            }

            Expression::Cast(cast)
                if matches!(
                    cast.target_type.as_value(),
                    Some(ExpressionType::Matrix(_))
                ) && cast.expressions.len() == 1
                    && matches!(
                        cast.expressions[0].cached_type(),
                        Some(ExpressionType::Matrix(_))
                    ) =>
            {
                let Some(ExpressionType::Matrix(target)) =
                    cast.target_type.as_value().cloned()
                else {
                    unreachable!()
                };
                let Some(ExpressionType::Matrix(source)) =
                    cast.expressions[0].cached_type().cloned()
                else {
                    unreachable!()
                };
                if target == source {
                    return Ok(ExpressionTransform::VisitChildren);
                }

                let location = cast.location.clone();
                let matrix = state.cache_expression(cast.expressions.remove(0))?;

                let column_type = ExpressionType::vector(target.row_count, target.base);
                let mut columns = Vec::with_capacity(target.column_count as usize);
                for column in 0..target.column_count {
                    if column < source.column_count {
                        let source_column = column_access(
                            matrix.clone(),
                            column,
                            source.row_count,
                            source.base,
                            &location,
                        );
                        if target.row_count == source.row_count {
                            columns.push(source_column);
                        } else if target.row_count < source.row_count {
                            // truncate the column
                            let components: SmallVec<[u32; 4]> =
                                (0..target.row_count).collect();
                            columns.push(Expression::Swizzle(SwizzleExpression {
                                expr: Box::new(source_column),
                                components,
                                cached_type: Some(column_type.clone()),
                                location: location.clone(),
                            }));
                        } else {
                            // extend with identity lanes
                            let mut parts = vec![source_column];
                            for row in source.row_count..target.row_count {
                                let value = if row == column {
                                    one_constant(target.base)
                                } else {
                                    zero_constant(target.base)
                                };
                                parts.push(Expression::constant(value, location.clone()));
                            }
                            columns.push(Expression::Cast(CastExpression {
                                target_type: ExpressionValue::Value(column_type.clone()),
                                expressions: parts,
                                cached_type: Some(column_type.clone()),
                                location: location.clone(),
                            }));
                        }
                    } else {
                        // identity column
                        let mut parts = Vec::with_capacity(target.row_count as usize);
                        for row in 0..target.row_count {
                            let value = if row == column {
                                one_constant(target.base)
                            } else {
                                zero_constant(target.base)
                            };
                            parts.push(Expression::constant(value, location.clone()));
                        }
                        columns.push(Expression::Cast(CastExpression {
                            target_type: ExpressionValue::Value(column_type.clone()),
                            expressions: parts,
                            cached_type: Some(column_type.clone()),
                            location: location.clone(),
                        }));
                    }
                }

                let matrix_type = ExpressionType::Matrix(target);
                Ok(ExpressionTransform::Replace(Expression::Cast(
                    CastExpression {
                        target_type: ExpressionValue::Value(matrix_type.clone()),
                        expressions: columns,
                        cached_type: Some(matrix_type),
                        location,
                    },
                )))
            }
            _ => Ok(ExpressionTransform::VisitChildren),
        }
    }
}

impl Pass for MatrixPass {
    fn name(&self) -> &'static str {
        "matrix lowering"
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
        MatrixPass.transform(&mut module, &mut ctx).expect("matrix");
        module
    }

    const HEADER: &str = "[nzsl_version(\"1.0\")]\nmodule;\n";

    #[test]
    fn test_matrix_addition_is_columnwise() {
        let source = format!("{HEADER}fn f(a: mat3[f32], b: mat3[f32]) {{ let c = a + b; }}\n");
        let module = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(c) = func.statements.last().unwrap() else {
            panic!("expected variable");
        };
        let Some(Expression::Cast(cast)) = c.initial_expression.as_deref() else {
            panic!("expected cast");
        };
        assert_eq!(cast.expressions.len(), 3);
        for column in &cast.expressions {
            let Expression::Binary(binary) = column else {
                panic!("expected binary column");
            };
            assert_eq!(binary.op, BinaryType::Add);
            assert_eq!(
                binary.cached_type.as_ref().unwrap().to_string(),
                "vec3[f32]"
            );
        }
    }

    #[test]
    fn test_matrix_truncating_cast() {
        let source = format!("{HEADER}fn f(m: mat4[f32]) {{ let s = mat3[f32](m); }}\n");
        let module = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(s) = func.statements.last().unwrap() else {
            panic!("expected variable");
        };
        let Some(Expression::Cast(cast)) = s.initial_expression.as_deref() else {
            panic!("expected cast");
        };
        assert_eq!(cast.expressions.len(), 3);
        // each column is a truncating swizzle of the source column
        for column in &cast.expressions {
            let Expression::Swizzle(swizzle) = column else {
                panic!("expected swizzle column, got {column:?}");
            };
            assert_eq!(swizzle.components.as_slice(), &[0, 1, 2]);
        }
    }

    #[test]
    fn test_matrix_extending_cast_has_identity_lanes() {
        let source = format!("{HEADER}fn f(m: mat2[f32]) {{ let l = mat4[f32](m); }}\n");
        let module = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(l) = func.statements.last().unwrap() else {
            panic!("expected variable");
        };
        let Some(Expression::Cast(cast)) = l.initial_expression.as_deref() else {
            panic!("expected cast");
        };
        assert_eq!(cast.expressions.len(), 4);
        // column 3 is the identity column (0, 0, 0, 1)
        let Expression::Cast(identity) = &cast.expressions[3] else {
            panic!("expected constructed identity column");
        };
        let Expression::ConstantValue(last) = &identity.expressions[3] else {
            panic!("expected constant lane");
        };
        assert_eq!(last.value, ConstantValue::f32(1.0));
    }
}
