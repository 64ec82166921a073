//! Unused-symbol elimination.
//!
//! Builds a dependency set seeded from the entry points of the used
//! shader stages and removes every alias, constant, external variable,
//! function and struct with no path to an entry point.

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::transformer::{transform_module, StatementTransform, TransformState, Transformer};
use nzslc_par::ast::*;
use nzslc_util::Result;
use rustc_hash::FxHashSet;

/// Which stages' entry points seed the dependency walk; `None` keeps all
/// of them.
#[derive(Default)]
pub struct EliminateUnusedPass {
    pub stages: Option<Vec<ShaderStage>>,
    usage: UsageSet,
}

#[derive(Default)]
struct UsageSet {
    aliases: FxHashSet<usize>,
    constants: FxHashSet<usize>,
    external_blocks: FxHashSet<usize>,
    functions: FxHashSet<usize>,
    structs: FxHashSet<usize>,
    variables: FxHashSet<usize>,
}

impl UsageSet {
    fn mark(&mut self, kind: IdentifierKind, index: usize) -> bool {
        match kind {
            IdentifierKind::Alias => self.aliases.insert(index),
            IdentifierKind::Constant => self.constants.insert(index),
            IdentifierKind::ExternalBlock => self.external_blocks.insert(index),
            IdentifierKind::Function => self.functions.insert(index),
            IdentifierKind::Struct => self.structs.insert(index),
            IdentifierKind::Variable => self.variables.insert(index),
            IdentifierKind::Intrinsic | IdentifierKind::Module | IdentifierKind::Type => false,
        }
    }

    fn mark_type(&mut self, ty: &ExpressionType) {
        match ty {
            ExpressionType::Struct(index) => {
                self.structs.insert(*index);
            }
            ExpressionType::Alias(index) => {
                self.aliases.insert(*index);
            }
            ExpressionType::Function(index) => {
                self.functions.insert(*index);
            }
            ExpressionType::Array(array) => self.mark_type(&array.inner),
            ExpressionType::DynArray(array) => self.mark_type(&array.inner),
            ExpressionType::Storage(storage) => {
                self.structs.insert(storage.struct_index);
            }
            ExpressionType::Uniform(uniform) => {
                self.structs.insert(uniform.struct_index);
            }
            ExpressionType::PushConstant(push_constant) => {
                self.structs.insert(push_constant.struct_index);
            }
            ExpressionType::Type(inner) => self.mark_type(inner),
            ExpressionType::NamedExternalBlock(index) => {
                self.external_blocks.insert(*index);
            }
            _ => {}
        }
    }
}

/// Marks everything an expression tree references.
fn mark_expression(expr: &Expression, usage: &mut UsageSet) {
    if let Some(ty) = expr.cached_type() {
        usage.mark_type(ty);
    }
    match expr {
        Expression::AccessField(access) => mark_expression(&access.expr, usage),
        Expression::AccessIdentifier(access) => mark_expression(&access.expr, usage),
        Expression::AccessIndex(access) => {
            mark_expression(&access.expr, usage);
            for index in &access.indices {
                mark_expression(index, usage);
            }
        }
        Expression::Assign(assign) => {
            mark_expression(&assign.left, usage);
            mark_expression(&assign.right, usage);
        }
        Expression::Binary(binary) => {
            mark_expression(&binary.left, usage);
            mark_expression(&binary.right, usage);
        }
        Expression::CallFunction(call) => {
            mark_expression(&call.target, usage);
            for parameter in &call.parameters {
                mark_expression(parameter, usage);
            }
        }
        Expression::CallMethod(call) => {
            mark_expression(&call.object, usage);
            for parameter in &call.parameters {
                mark_expression(parameter, usage);
            }
        }
        Expression::Cast(cast) => {
            if let Some(ty) = cast.target_type.as_value() {
                usage.mark_type(ty);
            }
            for sub in &cast.expressions {
                mark_expression(sub, usage);
            }
        }
        Expression::Conditional(conditional) => {
            mark_expression(&conditional.condition, usage);
            mark_expression(&conditional.true_path, usage);
            mark_expression(&conditional.false_path, usage);
        }
        Expression::IdentifierValue(value) => {
            usage.mark(value.kind, value.index);
        }
        Expression::Intrinsic(intrinsic) => {
            for parameter in &intrinsic.parameters {
                mark_expression(parameter, usage);
            }
        }
        Expression::Swizzle(swizzle) => mark_expression(&swizzle.expr, usage),
        Expression::Unary(unary) => mark_expression(&unary.expr, usage),
        Expression::ConstantArrayValue(_)
        | Expression::ConstantValue(_)
        | Expression::Identifier(_)
        | Expression::TypeConstant(_) => {}
    }
}

fn mark_statement(stmt: &Statement, usage: &mut UsageSet) {
    match stmt {
        Statement::Branch(branch) => {
            for cond in &branch.cond_statements {
                mark_expression(&cond.condition, usage);
                mark_statement(&cond.statement, usage);
            }
            if let Some(else_statement) = &branch.else_statement {
                mark_statement(else_statement, usage);
            }
        }
        Statement::Conditional(conditional) => {
            mark_expression(&conditional.condition, usage);
            mark_statement(&conditional.statement, usage);
        }
        Statement::DeclareAlias(alias) => mark_expression(&alias.expression, usage),
        Statement::DeclareConst(constant) => mark_expression(&constant.expression, usage),
        Statement::DeclareVariable(variable) => {
            if let Some(ty) = variable.ty.as_value() {
                usage.mark_type(ty);
            }
            if let Some(init) = &variable.initial_expression {
                mark_expression(init, usage);
            }
        }
        Statement::Expression(expression) => mark_expression(&expression.expression, usage),
        Statement::For(for_stmt) => {
            mark_expression(&for_stmt.from_expr, usage);
            mark_expression(&for_stmt.to_expr, usage);
            if let Some(step) = &for_stmt.step_expr {
                mark_expression(step, usage);
            }
            mark_statement(&for_stmt.statement, usage);
        }
        Statement::ForEach(for_each) => {
            mark_expression(&for_each.expression, usage);
            mark_statement(&for_each.statement, usage);
        }
        Statement::Multi(multi) => {
            for inner in &multi.statements {
                mark_statement(inner, usage);
            }
        }
        Statement::Return(ret) => {
            if let Some(expr) = &ret.returned_expr {
                mark_expression(expr, usage);
            }
        }
        Statement::Scoped(scoped) => mark_statement(&scoped.statement, usage),
        Statement::While(while_stmt) => {
            mark_expression(&while_stmt.condition, usage);
            mark_statement(&while_stmt.body, usage);
        }
        _ => {}
    }
}

impl EliminateUnusedPass {
    /// Fixed-point dependency walk: the body of a used declaration marks
    /// further declarations as used.
    fn collect_usage(&mut self, module: &Module) {
        fn collect_declarations<'m>(
            statements: &'m [Statement],
            out: &mut Vec<&'m Statement>,
        ) {
            for stmt in statements {
                match stmt {
                    Statement::Multi(multi) => collect_declarations(&multi.statements, out),
                    Statement::Conditional(conditional) => collect_declarations(
                        std::slice::from_ref(conditional.statement.as_ref()),
                        out,
                    ),
                    other => out.push(other),
                }
            }
        }

        let mut declarations = Vec::new();
        fn walk_modules<'m>(module: &'m Module, out: &mut Vec<&'m Statement>) {
            for imported in &module.imported_modules {
                walk_modules(&imported.module, out);
            }
            collect_declarations(&module.root.statements, out);
        }
        walk_modules(module, &mut declarations);

        // seed: entry points of the retained stages
        for stmt in &declarations {
            if let Statement::DeclareFunction(function) = stmt {
                let Some(stage) = function.entry_stage.as_value() else {
                    continue;
                };
                let retained = self
                    .stages
                    .as_ref()
                    .map_or(true, |stages| stages.contains(stage));
                if retained {
                    if let Some(index) = function.func_index {
                        self.usage.functions.insert(index);
                    }
                }
            }
        }

        // external variables and block-level declarations count as roots
        // only once something reachable references them, so iterate to a
        // fixed point
        loop {
            let before = self.usage_len();
            for stmt in &declarations {
                match stmt {
                    Statement::DeclareFunction(function) => {
                        let used = function
                            .func_index
                            .is_some_and(|index| self.usage.functions.contains(&index));
                        if !used {
                            continue;
                        }
                        for parameter in &function.parameters {
                            if let Some(ty) = parameter.ty.as_value() {
                                self.usage.mark_type(ty);
                            }
                        }
                        if let Some(ty) = function.return_type.as_value() {
                            self.usage.mark_type(ty);
                        }
                        for inner in &function.statements {
                            mark_statement(inner, &mut self.usage);
                        }
                    }
                    Statement::DeclareStruct(decl) => {
                        let used = decl
                            .struct_index
                            .is_some_and(|index| self.usage.structs.contains(&index));
                        if !used {
                            continue;
                        }
                        for member in &decl.description.members {
                            if let Some(ty) = member.ty.as_value() {
                                self.usage.mark_type(ty);
                            }
                        }
                    }
                    Statement::DeclareAlias(alias) => {
                        let used = alias
                            .alias_index
                            .is_some_and(|index| self.usage.aliases.contains(&index));
                        if used {
                            mark_expression(&alias.expression, &mut self.usage);
                        }
                    }
                    Statement::DeclareConst(constant) => {
                        let used = constant
                            .const_index
                            .is_some_and(|index| self.usage.constants.contains(&index));
                        if used {
                            mark_expression(&constant.expression, &mut self.usage);
                        }
                    }
                    Statement::DeclareExternal(external) => {
                        for var in &external.external_vars {
                            let used = var
                                .var_index
                                .is_some_and(|index| self.usage.variables.contains(&index));
                            if used {
                                if let Some(ty) = var.ty.as_value() {
                                    self.usage.mark_type(ty);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            if self.usage_len() == before {
                break;
            }
        }
    }

    fn usage_len(&self) -> usize {
        self.usage.aliases.len()
            + self.usage.constants.len()
            + self.usage.external_blocks.len()
            + self.usage.functions.len()
            + self.usage.structs.len()
            + self.usage.variables.len()
    }
}

impl Transformer for EliminateUnusedPass {
    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        _state: &mut TransformState,
    ) -> Result<StatementTransform> {
        match stmt {
            Statement::DeclareAlias(alias) => {
                let used = alias
                    .alias_index
                    .is_some_and(|index| self.usage.aliases.contains(&index));
                if used {
                    Ok(StatementTransform::VisitChildren)
                } else {
                    Ok(StatementTransform::Remove)
                }
            }
            Statement::DeclareConst(constant) => {
                let used = constant
                    .const_index
                    .is_some_and(|index| self.usage.constants.contains(&index));
                if used {
                    Ok(StatementTransform::VisitChildren)
                } else {
                    Ok(StatementTransform::Remove)
                }
            }
            Statement::DeclareFunction(function) => {
                let used = function
                    .func_index
                    .is_some_and(|index| self.usage.functions.contains(&index));
                if used {
                    Ok(StatementTransform::VisitChildren)
                } else {
                    Ok(StatementTransform::Remove)
                }
            }
            Statement::DeclareStruct(decl) => {
                let used = decl
                    .struct_index
                    .is_some_and(|index| self.usage.structs.contains(&index));
                if used {
                    Ok(StatementTransform::VisitChildren)
                } else {
                    Ok(StatementTransform::Remove)
                }
            }
            Statement::DeclareExternal(external) => {
                external.external_vars.retain(|var| {
                    var.var_index
                        .is_some_and(|index| self.usage.variables.contains(&index))
                });
                if external.external_vars.is_empty() {
                    Ok(StatementTransform::Remove)
                } else {
                    Ok(StatementTransform::VisitChildren)
                }
            }
            _ => Ok(StatementTransform::VisitChildren),
        }
    }
}

impl Pass for EliminateUnusedPass {
    fn name(&self) -> &'static str {
        "eliminate unused"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        self.usage = UsageSet::default();
        self.collect_usage(module);
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
        EliminateUnusedPass::default()
            .transform(&mut module, &mut ctx)
            .expect("eliminate");
        module
    }

    const HEADER: &str = "[nzsl_version(\"1.0\")]\nmodule;\n";

    #[test]
    fn test_unused_function_removed() {
        let source = format!(
            "{HEADER}fn unused() {{ }}\nfn used() -> f32 {{ return 1.0; }}\n[entry(frag)]\nfn main() {{ let x = used(); }}\n"
        );
        let module = run(&source);
        let names: Vec<_> = module
            .root
            .statements
            .iter()
            .filter_map(|stmt| match stmt {
                Statement::DeclareFunction(func) => Some(func.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["used", "main"]);
    }

    #[test]
    fn test_unused_struct_and_const_removed() {
        let source = format!(
            "{HEADER}struct Unused {{ v: f32 }}\nstruct Used {{ v: f32 }}\nconst DEAD: i32 = 1;\n[entry(frag)]\nfn main(input: Used) {{ }}\n"
        );
        let module = run(&source);
        let mut struct_names = Vec::new();
        let mut const_count = 0;
        for stmt in &module.root.statements {
            match stmt {
                Statement::DeclareStruct(decl) => struct_names.push(decl.description.name.clone()),
                Statement::DeclareConst(_) => const_count += 1,
                _ => {}
            }
        }
        assert_eq!(struct_names, vec![String::from("Used")]);
        assert_eq!(const_count, 0);
    }

    #[test]
    fn test_unused_external_var_removed() {
        let source = format!(
            "{HEADER}struct A {{ v: f32 }}\nstruct B {{ v: f32 }}\nexternal {{ [binding(0)] used: uniform[A], [binding(1)] unused: uniform[B] }}\n[entry(frag)]\nfn main() -> f32 {{ return used.v; }}\n"
        );
        let module = run(&source);
        let Some(Statement::DeclareExternal(external)) = module
            .root
            .statements
            .iter()
            .find(|stmt| matches!(stmt, Statement::DeclareExternal(_)))
        else {
            panic!("expected external block");
        };
        assert_eq!(external.external_vars.len(), 1);
        assert_eq!(external.external_vars[0].name, "used");

        // B's struct went away with its external
        let struct_names: Vec<_> = module
            .root
            .statements
            .iter()
            .filter_map(|stmt| match stmt {
                Statement::DeclareStruct(decl) => Some(decl.description.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(struct_names, vec!["A"]);
    }
}
