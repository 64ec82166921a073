//! Transformer framework.
//!
//! A pass implements [`Transformer`] and returns, for each visited node,
//! what the walker should do next: keep walking into children, skip them,
//! replace the node, or (for statements) remove it from its parent list.
//!
//! The walker owns the traversal mechanics every pass needs:
//!
//! - statement-list splicing: a pass can inject statements before the one
//!   being visited via [`TransformState::append_statement`] (used by
//!   [`TransformState::cache_expression`] to hoist side-effecting
//!   expressions into anonymous variables),
//! - scope tracking through the [`Transformer::push_scope`] /
//!   [`Transformer::pop_scope`] hooks,
//! - cheap subtree skipping through [`TransformerFlags`].

use crate::context::{TransformerContext, VariableData};
use crate::passes::constant_propagation::compute_constant;
use bitflags::bitflags;
use nzslc_par::ast::*;
use nzslc_util::{Result, SourceLocation};

bitflags! {
    /// Traversal subtrees a pass can skip wholesale.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TransformerFlags: u32 {
        const IGNORE_EXPRESSIONS = 1 << 0;
        const IGNORE_FUNCTION_CONTENT = 1 << 1;
        const IGNORE_LOOP_CONTENT = 1 << 2;
    }
}

/// Outcome of visiting an expression.
pub enum ExpressionTransform {
    VisitChildren,
    DontVisitChildren,
    Replace(Expression),
}

/// Outcome of visiting a statement.
pub enum StatementTransform {
    VisitChildren,
    DontVisitChildren,
    Replace(Statement),
    Remove,
}

/// Mutable traversal state shared between the walker and the pass.
pub struct TransformState<'c> {
    pub ctx: &'c mut TransformerContext,
    pending_statements: Vec<Statement>,
    cache_counter: usize,
}

impl<'c> TransformState<'c> {
    pub fn new(ctx: &'c mut TransformerContext) -> Self {
        Self {
            ctx,
            pending_statements: Vec::new(),
            cache_counter: 0,
        }
    }

    /// Queues `statement` to be spliced into the current statement list,
    /// right before the statement being visited.
    pub fn append_statement(&mut self, statement: Statement) {
        self.pending_statements.push(statement);
    }

    fn take_pending(&mut self) -> Vec<Statement> {
        std::mem::take(&mut self.pending_statements)
    }

    /// Declares a variable initialized with `init` in the current
    /// statement list and returns its variable index.
    pub fn declare_variable(
        &mut self,
        name: &str,
        ty: ExpressionType,
        init: Option<Expression>,
        location: SourceLocation,
    ) -> Result<usize> {
        let index = self.ctx.variables.register(
            None,
            VariableData {
                name: name.to_owned(),
                ty: ty.clone(),
            },
            &location,
        )?;

        self.append_statement(Statement::DeclareVariable(DeclareVariableStatement {
            name: name.to_owned(),
            var_index: Some(index),
            ty: ExpressionValue::Value(ty),
            initial_expression: init.map(Box::new),
            location,
        }));

        Ok(index)
    }

    /// Returns an expression that can be evaluated several times without
    /// duplicating side effects.
    ///
    /// Constants and already-bound identifiers are returned as-is;
    /// anything else is hoisted into an anonymous variable and a
    /// reference to it is returned.
    pub fn cache_expression(&mut self, expr: Expression) -> Result<Expression> {
        if expr.is_trivially_reusable() {
            return Ok(expr);
        }

        let ty = expr
            .cached_type()
            .cloned()
            .unwrap_or(ExpressionType::NoType);
        let location = expr.location().clone();

        let name = format!("_nzsl_cached{}", self.cache_counter);
        self.cache_counter += 1;

        let index = self.declare_variable(&name, ty.clone(), Some(expr), location.clone())?;

        Ok(Expression::IdentifierValue(IdentifierValueExpression {
            kind: IdentifierKind::Variable,
            index,
            cached_type: Some(ty),
            location,
        }))
    }

    /// Folds `expr` to a constant in the current context, if possible.
    pub fn compute_constant_value(&self, expr: &Expression) -> Result<Option<ConstantValue>> {
        compute_constant(expr, self.ctx)
    }

    /// Runs a bounded folding pass over a sub-expression in place.
    pub fn propagate_constants(&self, expr: &mut Expression) -> Result<()> {
        if let Some(value) = compute_constant(expr, self.ctx)? {
            if !matches!(value, ConstantValue::NoValue) {
                *expr = constant_to_expression(value, expr.location().clone());
            }
        }
        Ok(())
    }

    /// Formats a type for an error message, resolving struct and alias
    /// indices to their declared names.
    pub fn type_to_string(&self, ty: &ExpressionType) -> String {
        stringify_type(ty, self.ctx)
    }
}

/// Formats a type with struct/alias names looked up in the context.
pub fn stringify_type(ty: &ExpressionType, ctx: &TransformerContext) -> String {
    match ty {
        ExpressionType::Struct(index) => ctx
            .structs
            .try_retrieve(*index)
            .map(|data| data.description.name.clone())
            .unwrap_or_else(|| ty.to_string()),
        ExpressionType::Alias(index) => ctx
            .aliases
            .try_retrieve(*index)
            .map(|data| data.name.clone())
            .unwrap_or_else(|| ty.to_string()),
        ExpressionType::Array(array) => {
            format!("array[{}, {}]", stringify_type(&array.inner, ctx), array.length)
        }
        ExpressionType::DynArray(array) => {
            format!("dyn_array[{}]", stringify_type(&array.inner, ctx))
        }
        ExpressionType::Storage(storage) => format!(
            "storage[{}]",
            stringify_type(&ExpressionType::Struct(storage.struct_index), ctx)
        ),
        ExpressionType::Uniform(uniform) => format!(
            "uniform[{}]",
            stringify_type(&ExpressionType::Struct(uniform.struct_index), ctx)
        ),
        ExpressionType::PushConstant(push_constant) => format!(
            "push_constant[{}]",
            stringify_type(&ExpressionType::Struct(push_constant.struct_index), ctx)
        ),
        other => other.to_string(),
    }
}

/// Builds the expression node for a folded constant.
pub fn constant_to_expression(value: ConstantValue, location: SourceLocation) -> Expression {
    match value {
        ConstantValue::Array(values) => {
            let cached_type = Some(
                ConstantValue::Array(values.clone()).expression_type(),
            );
            Expression::ConstantArrayValue(ConstantArrayValueExpression {
                values,
                cached_type,
                location,
            })
        }
        value => Expression::constant(value, location),
    }
}

/// A transformation pass over the AST.
#[allow(unused_variables)]
pub trait Transformer {
    /// Subtrees the walker skips for this pass.
    fn flags(&self) -> TransformerFlags {
        TransformerFlags::empty()
    }

    fn transform_expression(
        &mut self,
        expr: &mut Expression,
        state: &mut TransformState,
    ) -> Result<ExpressionTransform> {
        Ok(ExpressionTransform::VisitChildren)
    }

    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        Ok(StatementTransform::VisitChildren)
    }

    fn push_scope(&mut self, state: &mut TransformState) {}

    fn pop_scope(&mut self, state: &mut TransformState) {}
}

/// Runs a transformer over a module: imported modules first (depth
/// first), then the module's own root.
pub fn transform_module<T: Transformer>(
    pass: &mut T,
    module: &mut Module,
    ctx: &mut TransformerContext,
) -> Result<()> {
    for imported in &mut module.imported_modules {
        transform_module(pass, &mut imported.module, ctx)?;
    }

    let mut state = TransformState::new(ctx);
    visit_statement_list(pass, &mut module.root.statements, &mut state)
}

/// Runs a transformer over a statement list with splice support.
pub fn visit_statement_list<T: Transformer>(
    pass: &mut T,
    statements: &mut Vec<Statement>,
    state: &mut TransformState,
) -> Result<()> {
    let mut index = 0;
    while index < statements.len() {
        let keep = visit_statement(pass, &mut statements[index], state)?;

        let pending = state.take_pending();
        if !pending.is_empty() {
            let count = pending.len();
            statements.splice(index..index, pending);
            index += count;
        }

        if keep {
            index += 1;
        } else {
            statements.remove(index);
        }
    }
    Ok(())
}

/// Visits one statement; returns false if it must be removed from its
/// parent.
pub fn visit_statement<T: Transformer>(
    pass: &mut T,
    stmt: &mut Statement,
    state: &mut TransformState,
) -> Result<bool> {
    match pass.transform_statement(stmt, state)? {
        StatementTransform::DontVisitChildren => Ok(true),
        StatementTransform::VisitChildren => {
            visit_statement_children(pass, stmt, state)?;
            Ok(true)
        }
        StatementTransform::Replace(new) => {
            *stmt = new;
            visit_statement_children(pass, stmt, state)?;
            Ok(true)
        }
        StatementTransform::Remove => Ok(false),
    }
}

/// Visits a statement held in a single (non-list) slot. Removal turns it
/// into a no-op; spliced statements wrap the slot in a multi-statement.
pub fn visit_boxed_statement<T: Transformer>(
    pass: &mut T,
    slot: &mut Statement,
    state: &mut TransformState,
) -> Result<()> {
    let keep = visit_statement(pass, slot, state)?;
    let pending = state.take_pending();
    let location = slot.location().clone();

    if pending.is_empty() {
        if !keep {
            *slot = Statement::no_op(location);
        }
        return Ok(());
    }

    let mut statements = pending;
    if keep {
        statements.push(std::mem::replace(slot, Statement::no_op(location.clone())));
    }
    *slot = Statement::Multi(MultiStatement {
        statements,
        location,
    });
    Ok(())
}

/// Default recursion into a statement's children.
pub fn visit_statement_children<T: Transformer>(
    pass: &mut T,
    stmt: &mut Statement,
    state: &mut TransformState,
) -> Result<()> {
    let flags = pass.flags();

    match stmt {
        Statement::Branch(branch) => {
            for cond in &mut branch.cond_statements {
                visit_expression(pass, &mut cond.condition, state)?;
                pass.push_scope(state);
                visit_boxed_statement(pass, &mut cond.statement, state)?;
                pass.pop_scope(state);
            }
            if let Some(else_statement) = &mut branch.else_statement {
                pass.push_scope(state);
                visit_boxed_statement(pass, else_statement, state)?;
                pass.pop_scope(state);
            }
        }
        Statement::Break(_) | Statement::Continue(_) | Statement::Discard(_) => {}
        Statement::Conditional(conditional) => {
            visit_expression(pass, &mut conditional.condition, state)?;
            visit_boxed_statement(pass, &mut conditional.statement, state)?;
        }
        Statement::DeclareAlias(alias) => {
            visit_expression(pass, &mut alias.expression, state)?;
        }
        Statement::DeclareConst(constant) => {
            visit_expression_value(pass, &mut constant.ty, state)?;
            visit_expression(pass, &mut constant.expression, state)?;
        }
        Statement::DeclareExternal(external) => {
            visit_expression_value(pass, &mut external.auto_binding, state)?;
            visit_expression_value(pass, &mut external.binding_set, state)?;
            for var in &mut external.external_vars {
                visit_expression_value(pass, &mut var.ty, state)?;
                visit_expression_value(pass, &mut var.binding_set, state)?;
                visit_expression_value(pass, &mut var.binding_index, state)?;
            }
        }
        Statement::DeclareFunction(function) => {
            for parameter in &mut function.parameters {
                visit_expression_value(pass, &mut parameter.ty, state)?;
            }
            visit_expression_value(pass, &mut function.return_type, state)?;
            visit_expression_value(pass, &mut function.entry_stage, state)?;
            visit_expression_value(pass, &mut function.depth_write, state)?;
            visit_expression_value(pass, &mut function.early_fragment_tests, state)?;
            visit_expression_value(pass, &mut function.is_exported, state)?;
            visit_expression_value(pass, &mut function.workgroup_size, state)?;

            if !flags.contains(TransformerFlags::IGNORE_FUNCTION_CONTENT) {
                pass.push_scope(state);
                visit_statement_list(pass, &mut function.statements, state)?;
                pass.pop_scope(state);
            }
        }
        Statement::DeclareOption(option) => {
            visit_expression_value(pass, &mut option.ty, state)?;
            if let Some(default_value) = &mut option.default_value {
                visit_expression(pass, default_value, state)?;
            }
        }
        Statement::DeclareStruct(decl) => {
            visit_expression_value(pass, &mut decl.is_exported, state)?;
            visit_expression_value(pass, &mut decl.description.layout, state)?;
            for member in &mut decl.description.members {
                visit_expression_value(pass, &mut member.ty, state)?;
                visit_expression_value(pass, &mut member.builtin, state)?;
                visit_expression_value(pass, &mut member.location_index, state)?;
                visit_expression_value(pass, &mut member.interp, state)?;
                visit_expression_value(pass, &mut member.cond, state)?;
            }
        }
        Statement::DeclareVariable(variable) => {
            visit_expression_value(pass, &mut variable.ty, state)?;
            if let Some(init) = &mut variable.initial_expression {
                visit_expression(pass, init, state)?;
            }
        }
        Statement::Expression(expression) => {
            visit_expression(pass, &mut expression.expression, state)?;
        }
        Statement::For(for_stmt) => {
            visit_expression(pass, &mut for_stmt.from_expr, state)?;
            visit_expression(pass, &mut for_stmt.to_expr, state)?;
            if let Some(step) = &mut for_stmt.step_expr {
                visit_expression(pass, step, state)?;
            }
            visit_expression_value(pass, &mut for_stmt.unroll, state)?;
            if !flags.contains(TransformerFlags::IGNORE_LOOP_CONTENT) {
                pass.push_scope(state);
                visit_boxed_statement(pass, &mut for_stmt.statement, state)?;
                pass.pop_scope(state);
            }
        }
        Statement::ForEach(for_each) => {
            visit_expression(pass, &mut for_each.expression, state)?;
            visit_expression_value(pass, &mut for_each.unroll, state)?;
            if !flags.contains(TransformerFlags::IGNORE_LOOP_CONTENT) {
                pass.push_scope(state);
                visit_boxed_statement(pass, &mut for_each.statement, state)?;
                pass.pop_scope(state);
            }
        }
        Statement::Import(_) | Statement::NoOp(_) => {}
        Statement::Multi(multi) => {
            visit_statement_list(pass, &mut multi.statements, state)?;
        }
        Statement::Return(ret) => {
            if let Some(expr) = &mut ret.returned_expr {
                visit_expression(pass, expr, state)?;
            }
        }
        Statement::Scoped(scoped) => {
            pass.push_scope(state);
            visit_boxed_statement(pass, &mut scoped.statement, state)?;
            pass.pop_scope(state);
        }
        Statement::While(while_stmt) => {
            visit_expression(pass, &mut while_stmt.condition, state)?;
            visit_expression_value(pass, &mut while_stmt.unroll, state)?;
            if !flags.contains(TransformerFlags::IGNORE_LOOP_CONTENT) {
                pass.push_scope(state);
                visit_boxed_statement(pass, &mut while_stmt.body, state)?;
                pass.pop_scope(state);
            }
        }
    }
    Ok(())
}

/// Visits the inner expression of an [`ExpressionValue`], if any.
pub fn visit_expression_value<T: Transformer, V>(
    pass: &mut T,
    value: &mut ExpressionValue<V>,
    state: &mut TransformState,
) -> Result<()> {
    if let ExpressionValue::Expression(expr) = value {
        visit_expression(pass, expr, state)?;
    }
    Ok(())
}

/// Visits one expression node.
pub fn visit_expression<T: Transformer>(
    pass: &mut T,
    expr: &mut Expression,
    state: &mut TransformState,
) -> Result<()> {
    if pass.flags().contains(TransformerFlags::IGNORE_EXPRESSIONS) {
        return Ok(());
    }

    match pass.transform_expression(expr, state)? {
        ExpressionTransform::DontVisitChildren => Ok(()),
        ExpressionTransform::VisitChildren => visit_expression_children(pass, expr, state),
        ExpressionTransform::Replace(new) => {
            *expr = new;
            visit_expression_children(pass, expr, state)
        }
    }
}

/// Default recursion into an expression's children.
pub fn visit_expression_children<T: Transformer>(
    pass: &mut T,
    expr: &mut Expression,
    state: &mut TransformState,
) -> Result<()> {
    match expr {
        Expression::AccessField(access) => visit_expression(pass, &mut access.expr, state)?,
        Expression::AccessIdentifier(access) => visit_expression(pass, &mut access.expr, state)?,
        Expression::AccessIndex(access) => {
            visit_expression(pass, &mut access.expr, state)?;
            for index in &mut access.indices {
                visit_expression(pass, index, state)?;
            }
        }
        Expression::Assign(assign) => {
            visit_expression(pass, &mut assign.left, state)?;
            visit_expression(pass, &mut assign.right, state)?;
        }
        Expression::Binary(binary) => {
            visit_expression(pass, &mut binary.left, state)?;
            visit_expression(pass, &mut binary.right, state)?;
        }
        Expression::CallFunction(call) => {
            visit_expression(pass, &mut call.target, state)?;
            for parameter in &mut call.parameters {
                visit_expression(pass, parameter, state)?;
            }
        }
        Expression::CallMethod(call) => {
            visit_expression(pass, &mut call.object, state)?;
            for parameter in &mut call.parameters {
                visit_expression(pass, parameter, state)?;
            }
        }
        Expression::Cast(cast) => {
            if let ExpressionValue::Expression(target) = &mut cast.target_type {
                visit_expression(pass, target, state)?;
            }
            for sub in &mut cast.expressions {
                visit_expression(pass, sub, state)?;
            }
        }
        Expression::Conditional(conditional) => {
            visit_expression(pass, &mut conditional.condition, state)?;
            visit_expression(pass, &mut conditional.true_path, state)?;
            visit_expression(pass, &mut conditional.false_path, state)?;
        }
        Expression::ConstantArrayValue(_)
        | Expression::ConstantValue(_)
        | Expression::Identifier(_)
        | Expression::IdentifierValue(_)
        | Expression::TypeConstant(_) => {}
        Expression::Intrinsic(intrinsic) => {
            for parameter in &mut intrinsic.parameters {
                visit_expression(pass, parameter, state)?;
            }
        }
        Expression::Swizzle(swizzle) => visit_expression(pass, &mut swizzle.expr, state)?,
        Expression::Unary(unary) => visit_expression(pass, &mut unary.expr, state)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A pass that removes every no-op statement and injects a marker
    /// variable before each `let`.
    struct TestPass;

    impl Transformer for TestPass {
        fn transform_statement(
            &mut self,
            stmt: &mut Statement,
            state: &mut TransformState,
        ) -> Result<StatementTransform> {
            match stmt {
                Statement::NoOp(_) => Ok(StatementTransform::Remove),
                Statement::DeclareVariable(decl) if !decl.name.starts_with('_') => {
                    state.declare_variable(
                        "_marker",
                        ExpressionType::i32(),
                        None,
                        decl.location.clone(),
                    )?;
                    Ok(StatementTransform::VisitChildren)
                }
                _ => Ok(StatementTransform::VisitChildren),
            }
        }
    }

    fn let_statement(name: &str) -> Statement {
        Statement::DeclareVariable(DeclareVariableStatement {
            name: name.to_owned(),
            var_index: None,
            ty: ExpressionValue::Value(ExpressionType::i32()),
            initial_expression: None,
            location: SourceLocation::default(),
        })
    }

    #[test]
    fn test_remove_and_splice() {
        let mut ctx = TransformerContext::new();
        let mut state = TransformState::new(&mut ctx);
        let mut statements = vec![
            Statement::no_op(SourceLocation::default()),
            let_statement("a"),
            Statement::no_op(SourceLocation::default()),
            let_statement("b"),
        ];

        visit_statement_list(&mut TestPass, &mut statements, &mut state).unwrap();

        let names: Vec<_> = statements
            .iter()
            .map(|stmt| match stmt {
                Statement::DeclareVariable(decl) => decl.name.as_str(),
                _ => panic!("unexpected statement"),
            })
            .collect();
        assert_eq!(names, vec!["_marker", "a", "_marker", "b"]);
    }

    #[test]
    fn test_cache_expression_passes_through_trivial() {
        let mut ctx = TransformerContext::new();
        let mut state = TransformState::new(&mut ctx);

        let constant = Expression::constant(ConstantValue::f32(1.0), SourceLocation::default());
        let cached = state.cache_expression(constant.clone()).unwrap();
        assert_eq!(cached, constant);
        assert!(state.take_pending().is_empty());
    }

    #[test]
    fn test_cache_expression_hoists_complex() {
        let mut ctx = TransformerContext::new();
        let mut state = TransformState::new(&mut ctx);

        let complex = Expression::Binary(BinaryExpression {
            op: BinaryType::Add,
            left: Box::new(Expression::constant(
                ConstantValue::f32(1.0),
                SourceLocation::default(),
            )),
            right: Box::new(Expression::constant(
                ConstantValue::f32(2.0),
                SourceLocation::default(),
            )),
            cached_type: Some(ExpressionType::f32()),
            location: SourceLocation::default(),
        });

        let cached = state.cache_expression(complex).unwrap();
        let Expression::IdentifierValue(value) = &cached else {
            panic!("expected a variable reference");
        };
        assert_eq!(value.kind, IdentifierKind::Variable);
        assert_eq!(state.take_pending().len(), 1);
        assert!(ctx.variables.is_registered(0));
    }
}
