//! Literal typing.
//!
//! `IntLiteral` / `FloatLiteral` expressions stay polymorphic through
//! resolution; this pass reifies them exactly once, by propagating the
//! reference type from the context that consumes them (assignment target,
//! declared variable type, function parameter, cast target, array
//! element). A literal with no reference at top level defaults to `i32` /
//! `f32`. Cached types and the variable/constant tables are recomputed so
//! no untyped literal leaks to the back-ends.

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::intrinsics::check_intrinsic;
use crate::passes::resolve::binary_type;
use nzslc_par::ast::*;
use nzslc_util::{CompilationError, Error, Result, SourceLocation};

#[derive(Default)]
pub struct LiteralPass {
    return_types: Vec<ExpressionType>,
}

fn default_primitive(primitive: PrimitiveType) -> PrimitiveType {
    match primitive {
        PrimitiveType::IntLiteral => PrimitiveType::Int32,
        PrimitiveType::FloatLiteral => PrimitiveType::Float32,
        other => other,
    }
}

/// Rebuilds `ty` with every literal marker defaulted.
fn default_type(ty: &ExpressionType) -> ExpressionType {
    match ty {
        ExpressionType::Primitive(primitive) => {
            ExpressionType::Primitive(default_primitive(*primitive))
        }
        ExpressionType::Vector(vector) => {
            ExpressionType::vector(vector.component_count, default_primitive(vector.base))
        }
        ExpressionType::Matrix(matrix) => ExpressionType::Matrix(MatrixType {
            column_count: matrix.column_count,
            row_count: matrix.row_count,
            base: default_primitive(matrix.base),
        }),
        ExpressionType::Array(array) => ExpressionType::Array(ArrayType {
            inner: Box::new(default_type(&array.inner)),
            length: array.length,
        }),
        other => other.clone(),
    }
}

/// Rebuilds `ty` with the same shape but the base primitive of
/// `reference`, when `ty` still carries a literal marker.
fn apply_reference(ty: &ExpressionType, reference: &ExpressionType) -> ExpressionType {
    if !ty.contains_literal() {
        return ty.clone();
    }
    let Some(base) = reference.base_primitive().map(default_primitive) else {
        return default_type(ty);
    };
    match ty {
        ExpressionType::Primitive(_) => ExpressionType::Primitive(base),
        ExpressionType::Vector(vector) => ExpressionType::vector(vector.component_count, base),
        ExpressionType::Matrix(matrix) => ExpressionType::Matrix(MatrixType {
            column_count: matrix.column_count,
            row_count: matrix.row_count,
            base,
        }),
        other => default_type(other),
    }
}

fn convert_single(
    value: &ConstantSingleValue,
    target: PrimitiveType,
    location: &SourceLocation,
) -> Result<ConstantSingleValue> {
    use ConstantSingleValue::*;
    Ok(match (value, target) {
        (IntLiteral(v), PrimitiveType::Int32) => {
            let converted = i32::try_from(*v).map_err(|_| {
                Error::new(
                    location.clone(),
                    CompilationError::LiteralOutOfRange { ty: "i32" },
                )
            })?;
            I32(converted)
        }
        (IntLiteral(v), PrimitiveType::UInt32) => {
            let converted = u32::try_from(*v).map_err(|_| {
                Error::new(
                    location.clone(),
                    CompilationError::LiteralOutOfRange { ty: "u32" },
                )
            })?;
            U32(converted)
        }
        (FloatLiteral(v), PrimitiveType::Float32) => F32(*v as f32),
        (FloatLiteral(v), PrimitiveType::Float64) => F64(*v),
        (other, _) => other.clone(),
    })
}

/// Converts literal scalars inside a constant value to `target_base`.
fn convert_value(
    value: &ConstantValue,
    target_base: PrimitiveType,
    location: &SourceLocation,
) -> Result<ConstantValue> {
    Ok(match value {
        ConstantValue::Single(single) => {
            ConstantValue::Single(convert_single(single, target_base, location)?)
        }
        ConstantValue::Vector(vector) => {
            let mut components = smallvec::SmallVec::new();
            for component in &vector.components {
                components.push(convert_single(component, target_base, location)?);
            }
            ConstantValue::Vector(ConstantVectorValue::new(components))
        }
        ConstantValue::Array(array) => {
            let mut values = Vec::with_capacity(array.values.len());
            for element in &array.values {
                values.push(convert_value(element, target_base, location)?);
            }
            ConstantValue::Array(ConstantArrayValue { values })
        }
        ConstantValue::NoValue => ConstantValue::NoValue,
    })
}

impl LiteralPass {
    /// Retypes an expression, resolving literals against `reference`, and
    /// returns the (now concrete where possible) type.
    fn retype_expression(
        &mut self,
        expr: &mut Expression,
        reference: Option<&ExpressionType>,
        ctx: &mut TransformerContext,
    ) -> Result<ExpressionType> {
        let ty = match expr {
            Expression::ConstantValue(constant) => {
                let current = constant.value.expression_type();
                if current.contains_literal() {
                    let target = match reference {
                        Some(reference) => apply_reference(&current, reference),
                        None => default_type(&current),
                    };
                    if let Some(base) = target.base_primitive() {
                        constant.value =
                            convert_value(&constant.value, base, &constant.location)?;
                    }
                }
                constant.value.expression_type()
            }
            Expression::ConstantArrayValue(constant) => {
                let current = ConstantValue::Array(constant.values.clone()).expression_type();
                if current.contains_literal() {
                    let target = match reference {
                        Some(reference) => apply_reference(&current, reference),
                        None => default_type(&current),
                    };
                    if let Some(base) = match &target {
                        ExpressionType::Array(array) => array.inner.base_primitive(),
                        _ => None,
                    } {
                        let converted = convert_value(
                            &ConstantValue::Array(constant.values.clone()),
                            base,
                            &constant.location,
                        )?;
                        if let ConstantValue::Array(values) = converted {
                            constant.values = values;
                        }
                    }
                }
                ConstantValue::Array(constant.values.clone()).expression_type()
            }
            Expression::IdentifierValue(value) => {
                // tables were retyped when their declarations were visited
                let refreshed = match value.kind {
                    IdentifierKind::Variable => ctx
                        .variables
                        .try_retrieve(value.index)
                        .map(|data| data.ty.clone()),
                    IdentifierKind::Constant => ctx
                        .constants
                        .try_retrieve(value.index)
                        .map(|data| data.ty.clone()),
                    _ => None,
                };
                match refreshed {
                    Some(ty) => ty,
                    None => value
                        .cached_type
                        .clone()
                        .unwrap_or(ExpressionType::NoType),
                }
            }
            Expression::Identifier(_) => ExpressionType::NoType,
            Expression::TypeConstant(constant) => ExpressionType::Primitive(constant.ty),
            Expression::Unary(unary) => self.retype_expression(&mut unary.expr, reference, ctx)?,
            Expression::Binary(binary) => {
                let op = binary.op;
                let operand_reference = match op {
                    // comparisons and logic pass no outer reference down
                    BinaryType::CompEq
                    | BinaryType::CompGe
                    | BinaryType::CompGt
                    | BinaryType::CompLe
                    | BinaryType::CompLt
                    | BinaryType::CompNe
                    | BinaryType::LogicalAnd
                    | BinaryType::LogicalOr => None,
                    _ => reference,
                };

                let left_type =
                    self.retype_expression(&mut binary.left, operand_reference, ctx)?;
                // a concrete left side types the right side (and vice
                // versa)
                let right_reference = if !left_type.contains_literal()
                    && left_type != ExpressionType::NoType
                {
                    Some(left_type.clone())
                } else {
                    operand_reference.cloned()
                };
                let right_type =
                    self.retype_expression(&mut binary.right, right_reference.as_ref(), ctx)?;
                let left_type = if left_type.contains_literal()
                    && !right_type.contains_literal()
                    && right_type != ExpressionType::NoType
                {
                    self.retype_expression(&mut binary.left, Some(&right_type), ctx)?
                } else {
                    left_type
                };

                if left_type == ExpressionType::NoType || right_type == ExpressionType::NoType {
                    ExpressionType::NoType
                } else {
                    binary_type(op, &left_type, &right_type, &binary.location)?
                }
            }
            Expression::Assign(assign) => {
                let left_type = self.retype_expression(&mut assign.left, None, ctx)?;
                let target = (!left_type.contains_literal()).then_some(left_type.clone());
                self.retype_expression(&mut assign.right, target.as_ref(), ctx)?;
                left_type
            }
            Expression::Swizzle(swizzle) => {
                let base_reference = reference.map(|reference| {
                    // only the base primitive propagates through a swizzle
                    apply_reference(
                        &ExpressionType::Primitive(PrimitiveType::FloatLiteral),
                        reference,
                    )
                });
                let mut base_type =
                    self.retype_expression(&mut swizzle.expr, None, ctx)?;
                if base_type.contains_literal() {
                    let target = match &base_reference {
                        Some(reference) => apply_reference(&base_type, reference),
                        None => default_type(&base_type),
                    };
                    base_type = self.retype_expression(&mut swizzle.expr, Some(&target), ctx)?;
                }

                match base_type.base_primitive() {
                    Some(base) if swizzle.components.len() > 1 => {
                        ExpressionType::vector(swizzle.components.len() as u32, base)
                    }
                    Some(base) => ExpressionType::Primitive(base),
                    None => ExpressionType::NoType,
                }
            }
            Expression::AccessField(access) => {
                self.retype_expression(&mut access.expr, None, ctx)?;
                access.cached_type.clone().unwrap_or(ExpressionType::NoType)
            }
            Expression::AccessIndex(access) => {
                let base_type = self.retype_expression(&mut access.expr, None, ctx)?;
                for index in &mut access.indices {
                    self.retype_expression(index, Some(&ExpressionType::i32()), ctx)?;
                }
                match access.cached_type.clone() {
                    Some(cached) if !cached.contains_literal() => cached,
                    _ => match base_type {
                        ExpressionType::Array(array) => (*array.inner).clone(),
                        ExpressionType::DynArray(array) => (*array.inner).clone(),
                        ExpressionType::Vector(vector) => ExpressionType::Primitive(vector.base),
                        ExpressionType::Matrix(matrix) => {
                            ExpressionType::vector(matrix.row_count, matrix.base)
                        }
                        _ => access.cached_type.clone().unwrap_or(ExpressionType::NoType),
                    },
                }
            }
            Expression::AccessIdentifier(access) => {
                self.retype_expression(&mut access.expr, None, ctx)?;
                ExpressionType::NoType
            }
            Expression::Cast(cast) => {
                let target = cast
                    .target_type
                    .as_value()
                    .cloned()
                    .unwrap_or(ExpressionType::NoType);
                let element_reference = target
                    .base_primitive()
                    .map(ExpressionType::Primitive)
                    .or_else(|| match &target {
                        ExpressionType::Array(array) => Some((*array.inner).clone()),
                        _ => None,
                    });
                for sub in &mut cast.expressions {
                    self.retype_expression(sub, element_reference.as_ref(), ctx)?;
                }
                target
            }
            Expression::Conditional(conditional) => {
                self.retype_expression(&mut conditional.condition, None, ctx)?;
                let true_type =
                    self.retype_expression(&mut conditional.true_path, reference, ctx)?;
                let reference = if !true_type.contains_literal() {
                    Some(true_type.clone())
                } else {
                    reference.cloned()
                };
                let false_type =
                    self.retype_expression(&mut conditional.false_path, reference.as_ref(), ctx)?;
                if true_type.contains_literal() {
                    self.retype_expression(&mut conditional.true_path, Some(&false_type), ctx)?
                } else {
                    true_type
                }
            }
            Expression::CallFunction(call) => {
                let signature = match call.target.cached_type() {
                    Some(ExpressionType::Function(index)) => ctx
                        .functions
                        .try_retrieve(*index)
                        .map(|data| data.parameters.clone()),
                    _ => None,
                };
                for (position, parameter) in call.parameters.iter_mut().enumerate() {
                    let parameter_reference = signature
                        .as_ref()
                        .and_then(|parameters| parameters.get(position))
                        .map(|(ty, _)| ty.clone());
                    self.retype_expression(parameter, parameter_reference.as_ref(), ctx)?;
                }
                call.cached_type.clone().unwrap_or(ExpressionType::NoType)
            }
            Expression::CallMethod(call) => {
                self.retype_expression(&mut call.object, None, ctx)?;
                for parameter in &mut call.parameters {
                    self.retype_expression(parameter, None, ctx)?;
                }
                call.cached_type.clone().unwrap_or(ExpressionType::NoType)
            }
            Expression::Intrinsic(intrinsic) => {
                // retype, then let a concrete parameter type the literal
                // ones
                let mut types = Vec::with_capacity(intrinsic.parameters.len());
                for parameter in &mut intrinsic.parameters {
                    types.push(self.retype_expression(parameter, None, ctx)?);
                }
                let concrete = types
                    .iter()
                    .find(|ty| !ty.contains_literal() && **ty != ExpressionType::NoType)
                    .cloned();
                if let Some(concrete) = concrete {
                    for (parameter, ty) in intrinsic.parameters.iter_mut().zip(&mut types) {
                        if ty.contains_literal() {
                            *ty = self.retype_expression(parameter, Some(&concrete), ctx)?;
                        }
                    }
                } else {
                    for (parameter, ty) in intrinsic.parameters.iter_mut().zip(&mut types) {
                        if ty.contains_literal() {
                            let target = default_type(ty);
                            *ty = self.retype_expression(parameter, Some(&target), ctx)?;
                        }
                    }
                }
                if types
                    .iter()
                    .all(|ty| *ty != ExpressionType::NoType)
                {
                    check_intrinsic(intrinsic.intrinsic, &types, &intrinsic.location)?
                } else {
                    intrinsic.cached_type.clone().unwrap_or(ExpressionType::NoType)
                }
            }
        };

        if ty != ExpressionType::NoType {
            expr.set_cached_type(ty.clone());
        }
        Ok(ty)
    }

    fn retype_statement(
        &mut self,
        stmt: &mut Statement,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        match stmt {
            Statement::Branch(branch) => {
                for cond in &mut branch.cond_statements {
                    self.retype_expression(&mut cond.condition, None, ctx)?;
                    self.retype_statement(&mut cond.statement, ctx)?;
                }
                if let Some(else_statement) = &mut branch.else_statement {
                    self.retype_statement(else_statement, ctx)?;
                }
            }
            Statement::Conditional(conditional) => {
                self.retype_expression(&mut conditional.condition, None, ctx)?;
                self.retype_statement(&mut conditional.statement, ctx)?;
            }
            Statement::DeclareConst(decl) => {
                let declared = decl.ty.as_value().cloned();
                let reference = declared
                    .as_ref()
                    .filter(|ty| !ty.contains_literal())
                    .cloned();
                let final_type =
                    self.retype_expression(&mut decl.expression, reference.as_ref(), ctx)?;
                if let Some(index) = decl.const_index {
                    if let Ok(data) = ctx.constants.retrieve_mut(index, &decl.location) {
                        if data.ty.contains_literal() {
                            data.ty = final_type.clone();
                        }
                        if let Some(base) = data.ty.base_primitive() {
                            if let Some(value) = data.value.take() {
                                data.value =
                                    Some(convert_value(&value, base, &decl.location)?);
                            }
                        }
                    }
                }
                if declared.is_none() || declared.as_ref().is_some_and(|t| t.contains_literal()) {
                    decl.ty = ExpressionValue::Value(final_type);
                }
            }
            Statement::DeclareOption(decl) => {
                if let Some(default_value) = &mut decl.default_value {
                    let reference = decl.ty.as_value().cloned();
                    self.retype_expression(default_value, reference.as_ref(), ctx)?;
                }
            }
            Statement::DeclareVariable(decl) => {
                let declared = decl.ty.as_value().cloned();
                let concrete_declared = declared
                    .as_ref()
                    .filter(|ty| !ty.contains_literal())
                    .cloned();
                let mut final_type = concrete_declared.clone().unwrap_or(ExpressionType::NoType);
                if let Some(init) = &mut decl.initial_expression {
                    let init_type =
                        self.retype_expression(init, concrete_declared.as_ref(), ctx)?;
                    if final_type == ExpressionType::NoType {
                        final_type = init_type;
                    }
                } else if let Some(declared) = &declared {
                    final_type = default_type(declared);
                }

                if final_type != ExpressionType::NoType {
                    decl.ty = ExpressionValue::Value(final_type.clone());
                    if let Some(index) = decl.var_index {
                        if let Ok(data) = ctx.variables.retrieve_mut(index, &decl.location) {
                            data.ty = final_type;
                        }
                    }
                }
            }
            Statement::DeclareExternal(_) => {}
            Statement::DeclareFunction(function) => {
                let return_type = function
                    .return_type
                    .as_value()
                    .cloned()
                    .unwrap_or(ExpressionType::NoType);
                self.return_types.push(return_type);
                for inner in &mut function.statements {
                    self.retype_statement(inner, ctx)?;
                }
                self.return_types.pop();
            }
            Statement::Expression(expression) => {
                self.retype_expression(&mut expression.expression, None, ctx)?;
            }
            Statement::For(for_stmt) => {
                let counter_type = for_stmt
                    .var_index
                    .and_then(|index| ctx.variables.try_retrieve(index))
                    .map(|data| data.ty.clone());
                self.retype_expression(&mut for_stmt.from_expr, counter_type.as_ref(), ctx)?;
                self.retype_expression(&mut for_stmt.to_expr, counter_type.as_ref(), ctx)?;
                if let Some(step) = &mut for_stmt.step_expr {
                    self.retype_expression(step, counter_type.as_ref(), ctx)?;
                }
                self.retype_statement(&mut for_stmt.statement, ctx)?;
            }
            Statement::ForEach(for_each) => {
                self.retype_expression(&mut for_each.expression, None, ctx)?;
                self.retype_statement(&mut for_each.statement, ctx)?;
            }
            Statement::Multi(multi) => {
                for inner in &mut multi.statements {
                    self.retype_statement(inner, ctx)?;
                }
            }
            Statement::Return(ret) => {
                if let Some(expr) = &mut ret.returned_expr {
                    let reference = self
                        .return_types
                        .last()
                        .filter(|ty| **ty != ExpressionType::NoType)
                        .cloned();
                    self.retype_expression(expr, reference.as_ref(), ctx)?;
                }
            }
            Statement::Scoped(scoped) => {
                self.retype_statement(&mut scoped.statement, ctx)?;
            }
            Statement::While(while_stmt) => {
                self.retype_expression(&mut while_stmt.condition, None, ctx)?;
                self.retype_statement(&mut while_stmt.body, ctx)?;
            }
            Statement::Break(_)
            | Statement::Continue(_)
            | Statement::DeclareAlias(_)
            | Statement::DeclareStruct(_)
            | Statement::Discard(_)
            | Statement::Import(_)
            | Statement::NoOp(_) => {}
        }
        Ok(())
    }

    fn retype_module(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        for imported in &mut module.imported_modules {
            self.retype_module(&mut imported.module, ctx)?;
        }
        for stmt in &mut module.root.statements {
            self.retype_statement(stmt, ctx)?;
        }
        Ok(())
    }
}

impl Pass for LiteralPass {
    fn name(&self) -> &'static str {
        "literal typing"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        self.retype_module(module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::resolve::ResolvePass;
    use nzslc_par::parse;
    use rustc_hash::FxHashMap;

    fn run(source: &str) -> (Module, TransformerContext) {
        let mut module = parse(source).expect("parse");
        let mut ctx = TransformerContext::new();
        ResolvePass::new(None, FxHashMap::default())
            .transform(&mut module, &mut ctx)
            .expect("resolve");
        LiteralPass::default()
            .transform(&mut module, &mut ctx)
            .expect("literal");
        (module, ctx)
    }

    const HEADER: &str = "[nzsl_version(\"1.0\")]\nmodule;\n";

    #[test]
    fn test_default_types() {
        let source = format!("{HEADER}fn f() {{ let a = 42; let b = 42.0; }}\n");
        let (module, ctx) = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(a) = &func.statements[0] else {
            panic!("expected variable");
        };
        assert_eq!(a.ty.as_value(), Some(&ExpressionType::i32()));
        let Statement::DeclareVariable(b) = &func.statements[1] else {
            panic!("expected variable");
        };
        assert_eq!(b.ty.as_value(), Some(&ExpressionType::f32()));

        // tables were updated too
        assert_eq!(ctx.variables.try_retrieve(0).unwrap().ty, ExpressionType::i32());
        assert_eq!(ctx.variables.try_retrieve(1).unwrap().ty, ExpressionType::f32());
    }

    #[test]
    fn test_reference_from_declared_type() {
        let source = format!("{HEADER}fn f() {{ let a: u32 = 42; }}\n");
        let (module, _) = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(a) = &func.statements[0] else {
            panic!("expected variable");
        };
        let Some(Expression::ConstantValue(constant)) = a.initial_expression.as_deref() else {
            panic!("expected constant");
        };
        assert_eq!(constant.value, ConstantValue::u32(42));
    }

    #[test]
    fn test_literal_out_of_range() {
        let source = format!("{HEADER}fn f() {{ let a: u32 = 4294967296; }}\n");
        let mut module = parse(&source).unwrap();
        let mut ctx = TransformerContext::new();
        ResolvePass::new(None, FxHashMap::default())
            .transform(&mut module, &mut ctx)
            .unwrap();
        let err = LiteralPass::default()
            .transform(&mut module, &mut ctx)
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_concrete_side_types_literal_side() {
        let source = format!("{HEADER}fn f(x: u32) {{ let y = x + 1; }}\n");
        let (module, _) = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(y) = &func.statements[0] else {
            panic!("expected variable");
        };
        assert_eq!(y.ty.as_value(), Some(&ExpressionType::u32()));
        let Some(Expression::Binary(binary)) = y.initial_expression.as_deref() else {
            panic!("expected binary");
        };
        let Expression::ConstantValue(one) = binary.right.as_ref() else {
            panic!("expected constant");
        };
        assert_eq!(one.value, ConstantValue::u32(1));
    }

    #[test]
    fn test_scalar_swizzle_types_base() {
        let source = format!("{HEADER}fn f() {{ let value = 42.0; let vec = value.xxx; }}\n");
        let (module, _) = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(vec_var) = &func.statements[1] else {
            panic!("expected variable");
        };
        assert_eq!(
            vec_var.ty.as_value().unwrap().to_string(),
            "vec3[f32]"
        );
    }

    #[test]
    fn test_function_parameter_reference() {
        let source = format!(
            "{HEADER}fn g(v: u32) {{ }}\nfn f() {{ g(5); }}\n"
        );
        let (module, _) = run(&source);
        let Statement::DeclareFunction(func) = &module.root.statements[1] else {
            panic!("expected function");
        };
        let Statement::Expression(stmt) = &func.statements[0] else {
            panic!("expected call statement");
        };
        let Expression::CallFunction(call) = &stmt.expression else {
            panic!("expected call");
        };
        let Expression::ConstantValue(arg) = &call.parameters[0] else {
            panic!("expected constant argument");
        };
        assert_eq!(arg.value, ConstantValue::u32(5));
    }
}
