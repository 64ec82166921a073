//! Resolve pass: name binding and type inference.
//!
//! Walks declarations in source order, interns every declaration into the
//! context tables, binds identifiers to `(kind, index)` pairs, rewrites
//! member paths into field accesses and swizzles, resolves type
//! expressions, dispatches calls (user functions, intrinsics, casts and
//! method-style intrinsics) and annotates every expression with its type.
//!
//! Imports are resolved here too: the imported module is obtained from
//! the module resolver, recursively resolved under its own module index,
//! and its exported symbols are bound into the importer as aliases.
//!
//! With `partial_compilation` set, unresolved identifiers and types are
//! left in place for a later run instead of failing.

use crate::context::*;
use crate::executor::Pass;
use crate::intrinsics::{check_intrinsic, NAMED_INTRINSICS};
use crate::module_resolver::ModuleResolver;
use crate::passes::constant_propagation::compute_constant;
use crate::type_rules::{is_assignable, unify_types};
use nzslc_par::ast::*;
use nzslc_util::{AstError, CompilationError, Error, Result, SourceLocation};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

struct Scope {
    identifiers: FxHashMap<String, IdentifierTarget>,
}

#[derive(Default)]
struct ModuleEnvironment {
    exported: FxHashMap<String, IdentifierTarget>,
}

struct FunctionContext {
    return_type: ExpressionType,
}

/// Name binding + type inference.
pub struct ResolvePass {
    resolver: Option<Arc<dyn ModuleResolver>>,
    option_values: FxHashMap<OptionHash, ConstantValue>,
    scopes: Vec<Scope>,
    module_environments: Vec<ModuleEnvironment>,
    modules_by_name: FxHashMap<String, usize>,
    next_module_index: usize,
    current_module_index: usize,
    current_features: Vec<ModuleFeature>,
    in_flight_modules: Vec<String>,
    function_stack: Vec<FunctionContext>,
    entry_stages: FxHashMap<(usize, ShaderStage), ()>,
    loop_depth: usize,
}

impl ResolvePass {
    pub fn new(
        resolver: Option<Arc<dyn ModuleResolver>>,
        option_values: FxHashMap<OptionHash, ConstantValue>,
    ) -> Self {
        Self {
            resolver,
            option_values,
            scopes: Vec::new(),
            module_environments: Vec::new(),
            modules_by_name: FxHashMap::default(),
            next_module_index: 0,
            current_module_index: 0,
            current_features: Vec::new(),
            in_flight_modules: Vec::new(),
            function_stack: Vec::new(),
            entry_stages: FxHashMap::default(),
            loop_depth: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(Scope {
            identifiers: FxHashMap::default(),
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn find_identifier(&self, name: &str) -> Option<IdentifierTarget> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.identifiers.get(name).copied())
    }

    fn register_identifier(
        &mut self,
        name: &str,
        target: IdentifierTarget,
        location: &SourceLocation,
    ) -> Result<()> {
        let scope = self.scopes.last_mut().expect("a scope is always open");
        if scope.identifiers.contains_key(name) {
            return Err(Error::new(
                location.clone(),
                CompilationError::IdentifierAlreadyUsed {
                    identifier: name.to_owned(),
                },
            ));
        }
        scope.identifiers.insert(name.to_owned(), target);
        Ok(())
    }

    fn export(&mut self, name: &str, target: IdentifierTarget) {
        self.module_environments[self.current_module_index]
            .exported
            .insert(name.to_owned(), target);
    }

    // -----------------------------------------------------------------------
    // Builtin environment
    // -----------------------------------------------------------------------

    fn register_builtins(&mut self, ctx: &mut TransformerContext) -> Result<()> {
        let location = SourceLocation::default();

        let mut concrete = |this: &mut Self, ctx: &mut TransformerContext, name: &str, ty: ExpressionType| -> Result<()> {
            let index = ctx.types.register(
                None,
                TypeData {
                    name: name.to_owned(),
                    content: TypeContent::Concrete(ty),
                },
                &location,
            )?;
            this.register_identifier(
                name,
                IdentifierTarget {
                    kind: IdentifierKind::Type,
                    index,
                },
                &location,
            )
        };

        concrete(self, ctx, "bool", ExpressionType::bool())?;
        concrete(self, ctx, "f32", ExpressionType::f32())?;
        concrete(self, ctx, "f64", ExpressionType::Primitive(PrimitiveType::Float64))?;
        concrete(self, ctx, "i32", ExpressionType::i32())?;
        concrete(self, ctx, "u32", ExpressionType::u32())?;

        for partial in builtin_partial_types() {
            let index = ctx.types.register(
                None,
                TypeData {
                    name: partial.name.to_owned(),
                    content: TypeContent::Partial(partial),
                },
                &location,
            )?;
            self.register_identifier(
                partial.name,
                IdentifierTarget {
                    kind: IdentifierKind::Type,
                    index,
                },
                &location,
            )?;
        }

        for &kind in NAMED_INTRINSICS {
            let index = ctx.intrinsics.register(None, IntrinsicData { kind }, &location)?;
            self.register_identifier(
                kind.identifier(),
                IdentifierTarget {
                    kind: IdentifierKind::Intrinsic,
                    index,
                },
                &location,
            )?;
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Modules
    // -----------------------------------------------------------------------

    fn resolve_module(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        let module_index = self.next_module_index;
        self.next_module_index += 1;
        self.module_environments.push(ModuleEnvironment::default());
        if !module.metadata.module_name.is_empty() {
            self.modules_by_name
                .insert(module.metadata.module_name.clone(), module_index);
        }

        let previous_module = self.current_module_index;
        let previous_features =
            std::mem::replace(&mut self.current_features, module.metadata.enabled_features.clone());
        self.current_module_index = module_index;

        // a module being resolved counts as in flight so cycles through
        // its importers are caught
        let tracked = !module.metadata.module_name.is_empty();
        if tracked {
            self.in_flight_modules
                .push(module.metadata.module_name.clone());
        }

        self.push_scope();
        let mut statements = std::mem::take(&mut module.root.statements);
        let mut imported_modules = std::mem::take(&mut module.imported_modules);
        let result: Result<()> = statements
            .iter_mut()
            .try_for_each(|stmt| self.resolve_statement(stmt, ctx, &mut imported_modules));
        module.root.statements = statements;
        module.imported_modules = imported_modules;
        self.pop_scope();

        if tracked {
            self.in_flight_modules.pop();
        }
        self.current_module_index = previous_module;
        self.current_features = previous_features;
        result
    }

    fn resolve_import(
        &mut self,
        import: &mut ImportStatement,
        ctx: &mut TransformerContext,
        imported_modules: &mut Vec<ImportedModule>,
    ) -> Result<()> {
        let module_name = import.module_name.clone();

        if self.in_flight_modules.contains(&module_name) {
            return Err(Error::new(
                import.location.clone(),
                CompilationError::CircularImport {
                    module: module_name,
                },
            ));
        }

        let module_index = match self.modules_by_name.get(&module_name) {
            Some(&index) => index,
            None => {
                let Some(resolver) = self.resolver.clone() else {
                    if ctx.partial_compilation {
                        return Ok(());
                    }
                    return Err(Error::new(
                        import.location.clone(),
                        CompilationError::ModuleNotFound {
                            module: module_name,
                        },
                    ));
                };

                let Some(resolved) = resolver.resolve(&module_name) else {
                    if ctx.partial_compilation {
                        return Ok(());
                    }
                    return Err(Error::new(
                        import.location.clone(),
                        CompilationError::ModuleNotFound {
                            module: module_name,
                        },
                    ));
                };

                // imported modules are shared by the resolver; clone so
                // the pipeline can transform our copy in place
                let mut imported = (*resolved).clone();

                // the imported module only sees the builtin scope, not
                // the importer's declarations
                let saved_scopes = self.scopes.split_off(1);

                self.in_flight_modules.push(module_name.clone());
                let index = self.next_module_index;
                let result = self.resolve_module(&mut imported, ctx);
                self.in_flight_modules.pop();
                self.scopes.extend(saved_scopes);
                result?;

                imported_modules.push(ImportedModule {
                    identifier: module_name.clone(),
                    module: imported,
                });
                index
            }
        };

        let table_index = ctx.modules.register(
            None,
            ModuleData {
                module_index,
                name: module_name.clone(),
            },
            &import.location,
        )?;

        if import.identifiers.is_empty() {
            // whole-module import, bound under its last path segment
            let identifier = module_name
                .rsplit('.')
                .next()
                .unwrap_or(&module_name)
                .to_owned();
            self.register_identifier(
                &identifier,
                IdentifierTarget {
                    kind: IdentifierKind::Module,
                    index: table_index,
                },
                &import.location,
            )?;
            return Ok(());
        }

        let exported: Vec<(String, IdentifierTarget)> = self.module_environments[module_index]
            .exported
            .iter()
            .map(|(name, target)| (name.clone(), *target))
            .collect();

        for identifier in &import.identifiers {
            if identifier.identifier == "*" {
                for (name, target) in &exported {
                    let alias_index = ctx.aliases.register(
                        None,
                        AliasData {
                            name: name.clone(),
                            target: *target,
                        },
                        &identifier.location,
                    )?;
                    self.register_identifier(
                        name,
                        IdentifierTarget {
                            kind: IdentifierKind::Alias,
                            index: alias_index,
                        },
                        &identifier.location,
                    )?;
                }
                continue;
            }

            let Some(target) = exported
                .iter()
                .find(|(name, _)| *name == identifier.identifier)
                .map(|(_, target)| *target)
            else {
                return Err(Error::new(
                    identifier.location.clone(),
                    CompilationError::UnknownIdentifier {
                        identifier: identifier.identifier.clone(),
                    },
                ));
            };

            let bound_name = identifier
                .renamed_identifier
                .as_deref()
                .unwrap_or(&identifier.identifier);
            let alias_index = ctx.aliases.register(
                None,
                AliasData {
                    name: bound_name.to_owned(),
                    target,
                },
                &identifier.location,
            )?;
            self.register_identifier(
                bound_name,
                IdentifierTarget {
                    kind: IdentifierKind::Alias,
                    index: alias_index,
                },
                &identifier.location,
            )?;
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn resolve_statement(
        &mut self,
        stmt: &mut Statement,
        ctx: &mut TransformerContext,
        imported_modules: &mut Vec<ImportedModule>,
    ) -> Result<()> {
        match stmt {
            Statement::Branch(branch) if branch.is_const => {
                // conditional compilation: only the taken branch is
                // resolved, the others may reference disabled code
                let mut taken = None;
                for (index, cond) in branch.cond_statements.iter_mut().enumerate() {
                    self.resolve_expression(&mut cond.condition, ctx)?;
                    match compute_constant(&cond.condition, ctx)?
                        .as_ref()
                        .and_then(ConstantValue::as_bool)
                    {
                        Some(true) => {
                            taken = Some(index);
                            break;
                        }
                        Some(false) => {}
                        None => {
                            if !ctx.partial_compilation {
                                return Err(Error::new(
                                    cond.condition.location().clone(),
                                    CompilationError::ConstantExpressionRequired,
                                ));
                            }
                            return Ok(());
                        }
                    }
                }

                match taken {
                    Some(index) => {
                        self.push_scope();
                        let result = self.resolve_statement(
                            &mut branch.cond_statements[index].statement,
                            ctx,
                            imported_modules,
                        );
                        self.pop_scope();
                        result
                    }
                    None => {
                        if let Some(else_statement) = &mut branch.else_statement {
                            self.push_scope();
                            let result =
                                self.resolve_statement(else_statement, ctx, imported_modules);
                            self.pop_scope();
                            result?;
                        }
                        Ok(())
                    }
                }
            }
            Statement::Branch(branch) => {
                for cond in &mut branch.cond_statements {
                    self.resolve_expression(&mut cond.condition, ctx)?;
                    self.check_bool_condition(&cond.condition, ctx)?;
                    self.push_scope();
                    self.resolve_statement(&mut cond.statement, ctx, imported_modules)?;
                    self.pop_scope();
                }
                if let Some(else_statement) = &mut branch.else_statement {
                    self.push_scope();
                    self.resolve_statement(else_statement, ctx, imported_modules)?;
                    self.pop_scope();
                }
                Ok(())
            }
            Statement::Break(break_stmt) => {
                if self.loop_depth == 0 {
                    return Err(Error::new(
                        break_stmt.location.clone(),
                        CompilationError::LoopControlOutsideOfLoop { keyword: "break" },
                    ));
                }
                Ok(())
            }
            Statement::Continue(continue_stmt) => {
                if self.loop_depth == 0 {
                    return Err(Error::new(
                        continue_stmt.location.clone(),
                        CompilationError::LoopControlOutsideOfLoop {
                            keyword: "continue",
                        },
                    ));
                }
                Ok(())
            }
            Statement::Conditional(conditional) => {
                self.resolve_expression(&mut conditional.condition, ctx)?;
                self.check_bool_condition(&conditional.condition, ctx)?;
                self.resolve_statement(&mut conditional.statement, ctx, imported_modules)
            }
            Statement::DeclareAlias(alias) => self.resolve_alias_declaration(alias, ctx),
            Statement::DeclareConst(constant) => self.resolve_const_declaration(constant, ctx),
            Statement::DeclareExternal(external) => {
                self.resolve_external_declaration(external, ctx)
            }
            Statement::DeclareFunction(function) => {
                self.resolve_function_declaration(function, ctx, imported_modules)
            }
            Statement::DeclareOption(option) => self.resolve_option_declaration(option, ctx),
            Statement::DeclareStruct(decl) => self.resolve_struct_declaration(decl, ctx),
            Statement::DeclareVariable(variable) => {
                self.resolve_variable_declaration(variable, ctx)
            }
            Statement::Discard(_) => Ok(()),
            Statement::Expression(expression) => {
                self.resolve_expression(&mut expression.expression, ctx)
            }
            Statement::For(for_stmt) => {
                self.resolve_expression(&mut for_stmt.from_expr, ctx)?;
                self.resolve_expression(&mut for_stmt.to_expr, ctx)?;
                if let Some(step) = &mut for_stmt.step_expr {
                    self.resolve_expression(step, ctx)?;
                }
                self.resolve_bool_attribute(&mut for_stmt.unroll, ctx)?;

                let from_type = self.expression_type(&for_stmt.from_expr, ctx)?;
                let to_type = self.expression_type(&for_stmt.to_expr, ctx)?;
                let counter_type = unify_types(&from_type, &to_type).ok_or_else(|| {
                    Error::new(
                        for_stmt.location.clone(),
                        CompilationError::UnmatchingTypes {
                            left: from_type.to_string(),
                            right: to_type.to_string(),
                        },
                    )
                })?;
                // untyped bounds default the counter to i32
                let counter_type = match counter_type {
                    ExpressionType::Primitive(PrimitiveType::IntLiteral) => ExpressionType::i32(),
                    other => other,
                };
                if !matches!(
                    counter_type,
                    ExpressionType::Primitive(PrimitiveType::Int32 | PrimitiveType::UInt32)
                ) {
                    return Err(Error::new(
                        for_stmt.location.clone(),
                        CompilationError::IndexRequiresIntegerIndices {
                            got: counter_type.to_string(),
                        },
                    ));
                }

                self.push_scope();
                let var_index = ctx.variables.register(
                    None,
                    VariableData {
                        name: for_stmt.var_name.clone(),
                        ty: counter_type,
                    },
                    &for_stmt.location,
                )?;
                for_stmt.var_index = Some(var_index);
                self.register_identifier(
                    &for_stmt.var_name.clone(),
                    IdentifierTarget {
                        kind: IdentifierKind::Variable,
                        index: var_index,
                    },
                    &for_stmt.location.clone(),
                )?;

                self.loop_depth += 1;
                let result = self.resolve_statement(&mut for_stmt.statement, ctx, imported_modules);
                self.loop_depth -= 1;
                self.pop_scope();
                result
            }
            Statement::ForEach(for_each) => {
                self.resolve_expression(&mut for_each.expression, ctx)?;
                self.resolve_bool_attribute(&mut for_each.unroll, ctx)?;

                let container_type = self.expression_type(&for_each.expression, ctx)?;
                let element_type = match ctx
                    .resolve_alias_type(&container_type, &for_each.location)?
                {
                    ExpressionType::Array(array) => (*array.inner).clone(),
                    ExpressionType::DynArray(array) => (*array.inner).clone(),
                    ExpressionType::NoType if ctx.partial_compilation => ExpressionType::NoType,
                    other => {
                        return Err(Error::new(
                            for_each.location.clone(),
                            CompilationError::ForEachUnsupportedType {
                                ty: other.to_string(),
                            },
                        ))
                    }
                };

                self.push_scope();
                let var_index = ctx.variables.register(
                    None,
                    VariableData {
                        name: for_each.var_name.clone(),
                        ty: element_type,
                    },
                    &for_each.location,
                )?;
                for_each.var_index = Some(var_index);
                self.register_identifier(
                    &for_each.var_name.clone(),
                    IdentifierTarget {
                        kind: IdentifierKind::Variable,
                        index: var_index,
                    },
                    &for_each.location.clone(),
                )?;

                self.loop_depth += 1;
                let result = self.resolve_statement(&mut for_each.statement, ctx, imported_modules);
                self.loop_depth -= 1;
                self.pop_scope();
                result
            }
            Statement::Import(import) => self.resolve_import(import, ctx, imported_modules),
            Statement::Multi(multi) => multi
                .statements
                .iter_mut()
                .try_for_each(|stmt| self.resolve_statement(stmt, ctx, imported_modules)),
            Statement::NoOp(_) => Ok(()),
            Statement::Return(ret) => {
                if let Some(expr) = &mut ret.returned_expr {
                    self.resolve_expression(expr, ctx)?;
                }
                let Some(function) = self.function_stack.last() else {
                    return Ok(());
                };
                let return_type = function.return_type.clone();
                match &ret.returned_expr {
                    Some(expr) => {
                        let expr_type = self.expression_type(expr, ctx)?;
                        if !is_assignable(&return_type, &expr_type)
                            && unify_types(&return_type, &expr_type).is_none()
                        {
                            return Err(Error::new(
                                ret.location.clone(),
                                CompilationError::UnmatchingTypes {
                                    left: return_type.to_string(),
                                    right: expr_type.to_string(),
                                },
                            ));
                        }
                    }
                    None => {
                        if return_type != ExpressionType::NoType {
                            return Err(Error::new(
                                ret.location.clone(),
                                CompilationError::UnmatchingTypes {
                                    left: return_type.to_string(),
                                    right: ExpressionType::NoType.to_string(),
                                },
                            ));
                        }
                    }
                }
                Ok(())
            }
            Statement::Scoped(scoped) => {
                self.push_scope();
                let result = self.resolve_statement(&mut scoped.statement, ctx, imported_modules);
                self.pop_scope();
                result
            }
            Statement::While(while_stmt) => {
                self.resolve_expression(&mut while_stmt.condition, ctx)?;
                self.check_bool_condition(&while_stmt.condition, ctx)?;
                self.resolve_bool_attribute(&mut while_stmt.unroll, ctx)?;
                self.push_scope();
                self.loop_depth += 1;
                let result = self.resolve_statement(&mut while_stmt.body, ctx, imported_modules);
                self.loop_depth -= 1;
                self.pop_scope();
                result
            }
        }
    }

    fn resolve_alias_declaration(
        &mut self,
        alias: &mut DeclareAliasStatement,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        self.resolve_expression(&mut alias.expression, ctx)?;

        let target = match &*alias.expression {
            Expression::IdentifierValue(value) => {
                let mut target = IdentifierTarget {
                    kind: value.kind,
                    index: value.index,
                };
                // aliases always resolve in a single hop
                if target.kind == IdentifierKind::Alias {
                    target = ctx.resolve_alias_target(target.index, &alias.location)?;
                }
                target
            }
            Expression::AccessIndex(access) => {
                // a type instantiation: intern it as a concrete type
                let ty = self.expression_to_type(&Expression::AccessIndex(access.clone()), ctx)?;
                let index = ctx.types.register(
                    None,
                    TypeData {
                        name: alias.name.clone(),
                        content: TypeContent::Concrete(ty),
                    },
                    &alias.location,
                )?;
                IdentifierTarget {
                    kind: IdentifierKind::Type,
                    index,
                }
            }
            _ if ctx.partial_compilation => return Ok(()),
            other => {
                return Err(Error::new(
                    other.location().clone(),
                    CompilationError::UnknownIdentifier {
                        identifier: alias.name.clone(),
                    },
                ))
            }
        };

        let alias_index = ctx.aliases.register(
            None,
            AliasData {
                name: alias.name.clone(),
                target,
            },
            &alias.location,
        )?;
        alias.alias_index = Some(alias_index);
        self.register_identifier(
            &alias.name.clone(),
            IdentifierTarget {
                kind: IdentifierKind::Alias,
                index: alias_index,
            },
            &alias.location.clone(),
        )?;
        Ok(())
    }

    fn resolve_const_declaration(
        &mut self,
        constant: &mut DeclareConstStatement,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        let declared_type = self.resolve_type_value(&mut constant.ty, ctx)?;
        self.resolve_expression(&mut constant.expression, ctx)?;

        let value = compute_constant(&constant.expression, ctx)?;
        if value.is_none() && !ctx.partial_compilation {
            return Err(Error::new(
                constant.expression.location().clone(),
                CompilationError::ConstantExpressionRequired,
            ));
        }

        let expr_type = self.expression_type(&constant.expression, ctx)?;
        let final_type = match &declared_type {
            Some(declared) => {
                if unify_types(declared, &expr_type).is_none() {
                    return Err(Error::new(
                        constant.location.clone(),
                        CompilationError::UnmatchingTypes {
                            left: declared.to_string(),
                            right: expr_type.to_string(),
                        },
                    ));
                }
                declared.clone()
            }
            None => expr_type,
        };

        let const_index = ctx.constants.register(
            None,
            ConstantData {
                module_index: self.current_module_index,
                name: constant.name.clone(),
                ty: final_type,
                value,
            },
            &constant.location,
        )?;
        constant.const_index = Some(const_index);
        let target = IdentifierTarget {
            kind: IdentifierKind::Constant,
            index: const_index,
        };
        self.register_identifier(&constant.name.clone(), target, &constant.location.clone())?;
        if constant.is_exported.as_value() == Some(&true) {
            self.export(&constant.name.clone(), target);
        }
        Ok(())
    }

    fn resolve_option_declaration(
        &mut self,
        option: &mut DeclareOptionStatement,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        let Some(declared_type) = self.resolve_type_value(&mut option.ty, ctx)? else {
            return Err(Error::new(
                option.location.clone(),
                CompilationError::VarDeclarationMissingTypeAndValue,
            ));
        };

        let default_value = match &mut option.default_value {
            Some(expr) => {
                self.resolve_expression(expr, ctx)?;
                let value = compute_constant(expr, ctx)?;
                if value.is_none() && !ctx.partial_compilation {
                    return Err(Error::new(
                        expr.location().clone(),
                        CompilationError::ConstantExpressionRequired,
                    ));
                }
                value
            }
            None => None,
        };

        let hash = hash_option(&option.name);
        let value = match ctx.option_values.get(&hash) {
            Some(provided) => {
                let provided_type = provided.expression_type();
                if unify_types(&declared_type, &provided_type).is_none() {
                    return Err(Error::new(
                        option.location.clone(),
                        CompilationError::ConflictingOptionDefaultValues {
                            option: option.name.clone(),
                        },
                    ));
                }
                Some(provided.clone())
            }
            None => default_value,
        };

        if value.is_none() && !ctx.partial_compilation {
            return Err(Error::new(
                option.location.clone(),
                CompilationError::MissingOptionValue {
                    option: option.name.clone(),
                },
            ));
        }

        if let Some(value) = &value {
            let value_type = value.expression_type();
            if unify_types(&declared_type, &value_type).is_none() {
                return Err(Error::new(
                    option.location.clone(),
                    CompilationError::UnmatchingTypes {
                        left: declared_type.to_string(),
                        right: value_type.to_string(),
                    },
                ));
            }
        }

        let const_index = ctx.constants.register(
            None,
            ConstantData {
                module_index: self.current_module_index,
                name: option.name.clone(),
                ty: declared_type,
                value,
            },
            &option.location,
        )?;
        option.opt_index = Some(const_index);
        self.register_identifier(
            &option.name.clone(),
            IdentifierTarget {
                kind: IdentifierKind::Constant,
                index: const_index,
            },
            &option.location.clone(),
        )?;
        Ok(())
    }

    fn resolve_struct_declaration(
        &mut self,
        decl: &mut DeclareStructStatement,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        let layout = decl.description.layout.as_value().copied();

        for member in &mut decl.description.members {
            if let Some(member_type) = self.resolve_type_value(&mut member.ty, ctx)? {
                self.check_type_features(&member_type, &member.location)?;

                // a nested struct must carry a compatible layout
                if let Some(layout) = layout {
                    let inner = ctx.resolve_alias_type(&member_type, &member.location)?;
                    if let ExpressionType::Struct(inner_index) = inner {
                        let inner_struct = ctx.structs.retrieve(inner_index, &member.location)?;
                        let inner_layout = inner_struct.description.layout.as_value().copied();
                        if inner_layout != Some(layout) {
                            return Err(Error::new(
                                member.location.clone(),
                                CompilationError::StructLayoutInnerMismatch {
                                    inner: inner_struct.description.name.clone(),
                                    outer: decl.description.name.clone(),
                                },
                            ));
                        }
                    }
                }
            }
            self.resolve_bool_attribute(&mut member.cond, ctx)?;
            self.resolve_u32_attribute(&mut member.location_index, ctx)?;
        }

        let struct_index = ctx.structs.register(
            None,
            StructData {
                module_index: self.current_module_index,
                description: decl.description.clone(),
            },
            &decl.location,
        )?;
        decl.struct_index = Some(struct_index);

        let target = IdentifierTarget {
            kind: IdentifierKind::Struct,
            index: struct_index,
        };
        self.register_identifier(&decl.description.name.clone(), target, &decl.location.clone())?;
        if decl.is_exported.as_value() == Some(&true) {
            self.export(&decl.description.name.clone(), target);
        }
        Ok(())
    }

    fn resolve_external_declaration(
        &mut self,
        external: &mut DeclareExternalStatement,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        self.resolve_bool_attribute(&mut external.auto_binding, ctx)?;
        self.resolve_u32_attribute(&mut external.binding_set, ctx)?;

        let mut block_variables = FxHashMap::default();
        for var in &mut external.external_vars {
            let Some(var_type) = self.resolve_type_value(&mut var.ty, ctx)? else {
                continue;
            };
            self.check_external_type(&var_type, ctx, &var.location)?;
            self.check_type_features(&var_type, &var.location)?;
            self.resolve_u32_attribute(&mut var.binding_set, ctx)?;
            self.resolve_u32_attribute(&mut var.binding_index, ctx)?;

            let var_index = ctx.variables.register(
                None,
                VariableData {
                    name: var.name.clone(),
                    ty: var_type,
                },
                &var.location,
            )?;
            var.var_index = Some(var_index);

            if external.name.is_some() {
                block_variables.insert(var.name.clone(), var_index);
            } else {
                self.register_identifier(
                    &var.name.clone(),
                    IdentifierTarget {
                        kind: IdentifierKind::Variable,
                        index: var_index,
                    },
                    &var.location.clone(),
                )?;
            }
        }

        if let Some(name) = &external.name {
            let block_index = ctx.named_external_blocks.register(
                None,
                ExternalBlockData {
                    environment_index: self.current_module_index,
                    name: name.clone(),
                    variables: block_variables,
                },
                &external.location,
            )?;
            external.external_index = Some(block_index);
            self.register_identifier(
                &name.clone(),
                IdentifierTarget {
                    kind: IdentifierKind::ExternalBlock,
                    index: block_index,
                },
                &external.location.clone(),
            )?;
        }
        Ok(())
    }

    fn resolve_function_declaration(
        &mut self,
        function: &mut DeclareFunctionStatement,
        ctx: &mut TransformerContext,
        imported_modules: &mut Vec<ImportedModule>,
    ) -> Result<()> {
        let entry_stage = function.entry_stage.as_value().copied();

        // entry-point constraints
        if let Some(stage) = entry_stage {
            if self
                .entry_stages
                .insert((self.current_module_index, stage), ())
                .is_some()
            {
                return Err(Error::new(
                    function.location.clone(),
                    CompilationError::EntryPointAlreadyDefined {
                        stage: stage.name(),
                    },
                ));
            }
            if function.parameters.len() > 1 {
                return Err(Error::new(
                    function.location.clone(),
                    CompilationError::EntryFunctionParameter,
                ));
            }
            if stage == ShaderStage::Compute {
                if !function.workgroup_size.has_value() {
                    return Err(Error::new(
                        function.location.clone(),
                        CompilationError::MissingWorkgroupAttribute,
                    ));
                }
            }
        }

        if let ExpressionValue::Expression(expr) = &mut function.workgroup_size {
            self.resolve_expression(expr, ctx)?;
            if let Some(ConstantValue::Vector(vector)) = compute_constant(expr, ctx)? {
                let components: Vec<u32> = vector
                    .components
                    .iter()
                    .filter_map(|component| {
                        ConstantValue::Single(component.clone()).as_u32()
                    })
                    .collect();
                if components.len() == 3 {
                    function.workgroup_size =
                        ExpressionValue::Value([components[0], components[1], components[2]]);
                }
            }
            if !function.workgroup_size.is_resolved() && !ctx.partial_compilation {
                return Err(Error::new(
                    function.location.clone(),
                    CompilationError::ConstantExpressionRequired,
                ));
            }
        }

        let mut parameter_data = Vec::with_capacity(function.parameters.len());
        for parameter in &mut function.parameters {
            let parameter_type = self
                .resolve_type_value(&mut parameter.ty, ctx)?
                .unwrap_or(ExpressionType::NoType);
            self.check_type_features(&parameter_type, &parameter.location)?;
            parameter_data.push((parameter_type, parameter.semantic));
        }

        let return_type = self
            .resolve_type_value(&mut function.return_type, ctx)?
            .unwrap_or(ExpressionType::NoType);

        let func_index = ctx.functions.register(
            None,
            FunctionData {
                module_index: self.current_module_index,
                name: function.name.clone(),
                entry_stage,
                parameters: parameter_data.clone(),
                return_type: return_type.clone(),
            },
            &function.location,
        )?;
        function.func_index = Some(func_index);
        let target = IdentifierTarget {
            kind: IdentifierKind::Function,
            index: func_index,
        };
        self.register_identifier(&function.name.clone(), target, &function.location.clone())?;
        if function.is_exported.as_value() == Some(&true) {
            self.export(&function.name.clone(), target);
        }

        // function body
        self.push_scope();
        for (parameter, (parameter_type, _)) in
            function.parameters.iter_mut().zip(&parameter_data)
        {
            let var_index = ctx.variables.register(
                None,
                VariableData {
                    name: parameter.name.clone(),
                    ty: parameter_type.clone(),
                },
                &parameter.location,
            )?;
            parameter.var_index = Some(var_index);
            self.register_identifier(
                &parameter.name.clone(),
                IdentifierTarget {
                    kind: IdentifierKind::Variable,
                    index: var_index,
                },
                &parameter.location.clone(),
            )?;
        }

        self.function_stack.push(FunctionContext { return_type });
        let result: Result<()> = function
            .statements
            .iter_mut()
            .try_for_each(|stmt| self.resolve_statement(stmt, ctx, imported_modules));
        self.function_stack.pop();
        self.pop_scope();
        result
    }

    fn resolve_variable_declaration(
        &mut self,
        variable: &mut DeclareVariableStatement,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        let declared_type = self.resolve_type_value(&mut variable.ty, ctx)?;
        if let Some(init) = &mut variable.initial_expression {
            self.resolve_expression(init, ctx)?;
        }

        let var_type = match (&declared_type, &variable.initial_expression) {
            (Some(declared), Some(init)) => {
                let init_type = self.expression_type(init, ctx)?;
                if !is_assignable(declared, &init_type) {
                    return Err(Error::new(
                        variable.location.clone(),
                        CompilationError::UnmatchingTypes {
                            left: declared.to_string(),
                            right: init_type.to_string(),
                        },
                    ));
                }
                declared.clone()
            }
            (Some(declared), None) => declared.clone(),
            (None, Some(init)) => self.expression_type(init, ctx)?,
            (None, None) => {
                return Err(Error::new(
                    variable.location.clone(),
                    CompilationError::VarDeclarationMissingTypeAndValue,
                ))
            }
        };
        self.check_type_features(&var_type, &variable.location)?;

        let var_index = ctx.variables.register(
            None,
            VariableData {
                name: variable.name.clone(),
                ty: var_type.clone(),
            },
            &variable.location,
        )?;
        variable.var_index = Some(var_index);
        variable.ty = ExpressionValue::Value(var_type);
        self.register_identifier(
            &variable.name.clone(),
            IdentifierTarget {
                kind: IdentifierKind::Variable,
                index: var_index,
            },
            &variable.location.clone(),
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn resolve_expression(
        &mut self,
        expr: &mut Expression,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        match expr {
            Expression::ConstantValue(constant) => {
                constant.cached_type = Some(constant.value.expression_type());
                Ok(())
            }
            Expression::ConstantArrayValue(constant) => {
                constant.cached_type =
                    Some(ConstantValue::Array(constant.values.clone()).expression_type());
                Ok(())
            }
            Expression::Identifier(identifier) => {
                match self.find_identifier(&identifier.identifier) {
                    Some(target) => {
                        *expr = self.make_identifier_value(
                            target,
                            identifier.location.clone(),
                            ctx,
                        )?;
                        Ok(())
                    }
                    None => {
                        if ctx.partial_compilation || ctx.allow_unknown_identifiers {
                            Ok(())
                        } else {
                            Err(Error::new(
                                identifier.location.clone(),
                                CompilationError::UnknownIdentifier {
                                    identifier: identifier.identifier.clone(),
                                },
                            ))
                        }
                    }
                }
            }
            Expression::IdentifierValue(_) | Expression::TypeConstant(_) => Ok(()),
            Expression::AccessIdentifier(_) => self.resolve_access_identifier(expr, ctx),
            Expression::AccessIndex(_) => self.resolve_access_index(expr, ctx),
            Expression::AccessField(access) => {
                self.resolve_expression(&mut access.expr, ctx)?;
                if access.cached_type.is_none() {
                    let base_type = self.expression_type(&access.expr, ctx)?;
                    access.cached_type =
                        Some(self.field_type(&base_type, access.field_index, ctx, &access.location)?);
                }
                Ok(())
            }
            Expression::Assign(_) => self.resolve_assign(expr, ctx),
            Expression::Binary(_) => self.resolve_binary(expr, ctx),
            Expression::Unary(_) => self.resolve_unary(expr, ctx),
            Expression::CallFunction(_) => self.resolve_call(expr, ctx),
            Expression::CallMethod(_) => self.resolve_method_call(expr, ctx),
            Expression::Cast(_) => self.resolve_cast(expr, ctx),
            Expression::Conditional(conditional) => {
                self.resolve_expression(&mut conditional.condition, ctx)?;
                self.resolve_expression(&mut conditional.true_path, ctx)?;
                self.resolve_expression(&mut conditional.false_path, ctx)?;
                self.check_bool_condition(&conditional.condition, ctx)?;

                let true_type = self.expression_type(&conditional.true_path, ctx)?;
                let false_type = self.expression_type(&conditional.false_path, ctx)?;
                let unified = unify_types(&true_type, &false_type).ok_or_else(|| {
                    Error::new(
                        conditional.location.clone(),
                        CompilationError::UnmatchingTypes {
                            left: true_type.to_string(),
                            right: false_type.to_string(),
                        },
                    )
                })?;
                conditional.cached_type = Some(unified);
                Ok(())
            }
            Expression::Intrinsic(intrinsic) => {
                for parameter in &mut intrinsic.parameters {
                    self.resolve_expression(parameter, ctx)?;
                }
                if intrinsic.cached_type.is_none() {
                    let mut types = Vec::with_capacity(intrinsic.parameters.len());
                    for parameter in &intrinsic.parameters {
                        types.push(self.expression_type(parameter, ctx)?);
                    }
                    intrinsic.cached_type = Some(check_intrinsic(
                        intrinsic.intrinsic,
                        &types,
                        &intrinsic.location,
                    )?);
                }
                Ok(())
            }
            Expression::Swizzle(swizzle) => {
                self.resolve_expression(&mut swizzle.expr, ctx)?;
                if swizzle.cached_type.is_none() {
                    let base_type = self.expression_type(&swizzle.expr, ctx)?;
                    swizzle.cached_type = Some(self.swizzle_type(
                        &base_type,
                        &swizzle.components,
                        ctx,
                        &swizzle.location,
                    )?);
                }
                Ok(())
            }
        }
    }

    /// Type of a resolved expression; `NoType` stands in under partial
    /// compilation.
    fn expression_type(
        &self,
        expr: &Expression,
        ctx: &TransformerContext,
    ) -> Result<ExpressionType> {
        match expr.cached_type() {
            Some(ty) => ctx.resolve_alias_type(ty, expr.location()),
            None => {
                if ctx.partial_compilation || ctx.allow_unknown_identifiers {
                    Ok(ExpressionType::NoType)
                } else {
                    Err(Error::new(expr.location().clone(), AstError::MissingType))
                }
            }
        }
    }

    fn make_identifier_value(
        &self,
        target: IdentifierTarget,
        location: SourceLocation,
        ctx: &TransformerContext,
    ) -> Result<Expression> {
        let cached_type = identifier_target_type(target, ctx, &location)?;
        Ok(Expression::IdentifierValue(IdentifierValueExpression {
            kind: target.kind,
            index: target.index,
            cached_type,
            location,
        }))
    }

    fn resolve_access_identifier(
        &mut self,
        expr: &mut Expression,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        let Expression::AccessIdentifier(access) = expr else {
            unreachable!()
        };

        self.resolve_expression(&mut access.expr, ctx)?;

        // unresolved base: keep the member path for a later run
        if access.expr.cached_type().is_none() {
            if ctx.partial_compilation || ctx.allow_unknown_identifiers {
                return Ok(());
            }
            return Err(Error::new(access.location.clone(), AstError::MissingType));
        }

        let location = access.location.clone();
        let identifiers = std::mem::take(&mut access.identifiers);
        let mut current = std::mem::replace(
            &mut *access.expr,
            Expression::constant(ConstantValue::NoValue, location.clone()),
        );

        for entry in identifiers {
            current = self.resolve_member_access(current, &entry, ctx)?;
        }

        *expr = current;
        Ok(())
    }

    fn resolve_member_access(
        &mut self,
        base: Expression,
        entry: &IdentifierEntry,
        ctx: &mut TransformerContext,
    ) -> Result<Expression> {
        let base_type = self.expression_type(&base, ctx)?;

        // resource wrappers deref to their inner struct
        let accessed_type = match &base_type {
            ExpressionType::Storage(storage) => ExpressionType::Struct(storage.struct_index),
            ExpressionType::Uniform(uniform) => ExpressionType::Struct(uniform.struct_index),
            ExpressionType::PushConstant(push_constant) => {
                ExpressionType::Struct(push_constant.struct_index)
            }
            other => other.clone(),
        };

        match accessed_type {
            ExpressionType::Struct(struct_index) => {
                let data = ctx.structs.retrieve(struct_index, &entry.location)?;
                let Some((field_index, member)) = data
                    .description
                    .members
                    .iter()
                    .enumerate()
                    .find(|(_, member)| member.name == entry.identifier)
                else {
                    return Err(Error::new(
                        entry.location.clone(),
                        CompilationError::UnknownField {
                            field: entry.identifier.clone(),
                        },
                    ));
                };

                let field_type = member
                    .ty
                    .as_value()
                    .cloned()
                    .unwrap_or(ExpressionType::NoType);
                let location =
                    SourceLocation::build_from_to(base.location(), &entry.location);
                Ok(Expression::AccessField(AccessFieldExpression {
                    expr: Box::new(base),
                    field_index: field_index as u32,
                    cached_type: Some(field_type),
                    location,
                }))
            }
            ExpressionType::Primitive(_) | ExpressionType::Vector(_) => {
                let components = parse_swizzle(&entry.identifier).ok_or_else(|| {
                    Error::new(
                        entry.location.clone(),
                        CompilationError::InvalidSwizzle {
                            swizzle: entry.identifier.clone(),
                        },
                    )
                })?;
                let swizzle_type =
                    self.swizzle_type(&accessed_type, &components, ctx, &entry.location)?;
                let location =
                    SourceLocation::build_from_to(base.location(), &entry.location);
                Ok(Expression::Swizzle(SwizzleExpression {
                    expr: Box::new(base),
                    components,
                    cached_type: Some(swizzle_type),
                    location,
                }))
            }
            ExpressionType::Module(module_table_index) => {
                let module_data = ctx.modules.retrieve(module_table_index, &entry.location)?;
                let environment = &self.module_environments[module_data.module_index];
                let Some(target) = environment.exported.get(&entry.identifier).copied() else {
                    return Err(Error::new(
                        entry.location.clone(),
                        CompilationError::UnknownIdentifier {
                            identifier: entry.identifier.clone(),
                        },
                    ));
                };
                self.make_identifier_value(target, entry.location.clone(), ctx)
            }
            ExpressionType::NamedExternalBlock(block_index) => {
                let block = ctx
                    .named_external_blocks
                    .retrieve(block_index, &entry.location)?;
                let Some(&var_index) = block.variables.get(&entry.identifier) else {
                    return Err(Error::new(
                        entry.location.clone(),
                        CompilationError::UnknownIdentifier {
                            identifier: entry.identifier.clone(),
                        },
                    ));
                };
                self.make_identifier_value(
                    IdentifierTarget {
                        kind: IdentifierKind::Variable,
                        index: var_index,
                    },
                    entry.location.clone(),
                    ctx,
                )
            }
            ExpressionType::Type(inner) => match *inner {
                ExpressionType::Primitive(primitive) => {
                    let Some(constant) = TypeConstant::from_identifier(&entry.identifier) else {
                        return Err(Error::new(
                            entry.location.clone(),
                            CompilationError::UnknownField {
                                field: entry.identifier.clone(),
                            },
                        ));
                    };
                    Ok(Expression::TypeConstant(TypeConstantExpression {
                        ty: primitive,
                        constant,
                        cached_type: Some(ExpressionType::Primitive(primitive)),
                        location: entry.location.clone(),
                    }))
                }
                other => Err(Error::new(
                    entry.location.clone(),
                    CompilationError::UnexpectedAccessedType {
                        ty: other.to_string(),
                    },
                )),
            },
            other => Err(Error::new(
                entry.location.clone(),
                CompilationError::UnexpectedAccessedType {
                    ty: other.to_string(),
                },
            )),
        }
    }

    fn swizzle_type(
        &self,
        base_type: &ExpressionType,
        components: &[u32],
        ctx: &TransformerContext,
        location: &SourceLocation,
    ) -> Result<ExpressionType> {
        let base_type = ctx.resolve_alias_type(base_type, location)?;
        let (base, component_count) = match &base_type {
            ExpressionType::Primitive(primitive) => (*primitive, 1u32),
            ExpressionType::Vector(vector) => (vector.base, vector.component_count),
            other => {
                return Err(Error::new(
                    location.clone(),
                    CompilationError::UnexpectedAccessedType {
                        ty: other.to_string(),
                    },
                ))
            }
        };

        if components.is_empty() || components.len() > 4 {
            return Err(Error::new(
                location.clone(),
                CompilationError::InvalidSwizzle {
                    swizzle: String::new(),
                },
            ));
        }

        for &component in components {
            if component >= component_count {
                if component_count == 1 {
                    return Err(Error::new(
                        location.clone(),
                        CompilationError::InvalidScalarSwizzle,
                    ));
                }
                return Err(Error::new(
                    location.clone(),
                    CompilationError::InvalidSwizzle {
                        swizzle: components
                            .iter()
                            .map(|&c| ['x', 'y', 'z', 'w'][c as usize % 4])
                            .collect(),
                    },
                ));
            }
        }

        Ok(if components.len() == 1 {
            ExpressionType::Primitive(base)
        } else {
            ExpressionType::vector(components.len() as u32, base)
        })
    }

    fn field_type(
        &self,
        base_type: &ExpressionType,
        field_index: u32,
        ctx: &TransformerContext,
        location: &SourceLocation,
    ) -> Result<ExpressionType> {
        let struct_index = match ctx.resolve_alias_type(base_type, location)? {
            ExpressionType::Struct(index) => index,
            ExpressionType::Storage(storage) => storage.struct_index,
            ExpressionType::Uniform(uniform) => uniform.struct_index,
            ExpressionType::PushConstant(push_constant) => push_constant.struct_index,
            other => {
                return Err(Error::new(
                    location.clone(),
                    CompilationError::UnexpectedAccessedType {
                        ty: other.to_string(),
                    },
                ))
            }
        };
        let data = ctx.structs.retrieve(struct_index, location)?;
        let member = data
            .description
            .members
            .get(field_index as usize)
            .ok_or_else(|| {
                Error::new(
                    location.clone(),
                    AstError::InvalidIndex {
                        kind: "field",
                        index: field_index as usize,
                    },
                )
            })?;
        Ok(member
            .ty
            .as_value()
            .cloned()
            .unwrap_or(ExpressionType::NoType))
    }

    fn resolve_access_index(
        &mut self,
        expr: &mut Expression,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        let Expression::AccessIndex(access) = expr else {
            unreachable!()
        };

        self.resolve_expression(&mut access.expr, ctx)?;

        // `vec3[f32]`-style type instantiation
        if let Expression::IdentifierValue(value) = &*access.expr {
            if value.kind == IdentifierKind::Type {
                let data = ctx.types.retrieve(value.index, &access.location)?;
                if let TypeContent::Partial(partial) = &data.content {
                    let partial = *partial;
                    let mut parameters = Vec::with_capacity(access.indices.len());
                    for index_expr in &mut access.indices {
                        parameters.push(self.resolve_type_parameter(index_expr, ctx)?);
                    }
                    if parameters.len() < partial.min_parameters
                        || parameters.len() > partial.max_parameters
                    {
                        return Err(Error::new(
                            access.location.clone(),
                            CompilationError::PartialTypeParameter {
                                index: parameters.len() as u32,
                                expected: partial.name,
                            },
                        ));
                    }
                    let built = (partial.build)(&parameters, &access.location)?;
                    access.cached_type = Some(ExpressionType::Type(Box::new(built)));
                    return Ok(());
                }
            }
        }

        // value indexing
        for index_expr in &mut access.indices {
            self.resolve_expression(index_expr, ctx)?;
        }

        let mut current = self.expression_type(&access.expr, ctx)?;
        for index_expr in &access.indices {
            let index_type = self.expression_type(index_expr, ctx)?;
            if !matches!(
                index_type,
                ExpressionType::Primitive(
                    PrimitiveType::Int32 | PrimitiveType::UInt32 | PrimitiveType::IntLiteral
                ) | ExpressionType::NoType
            ) {
                return Err(Error::new(
                    index_expr.location().clone(),
                    CompilationError::IndexRequiresIntegerIndices {
                        got: index_type.to_string(),
                    },
                ));
            }

            current = match ctx.resolve_alias_type(&current, &access.location)? {
                ExpressionType::Array(array) => (*array.inner).clone(),
                ExpressionType::DynArray(array) => (*array.inner).clone(),
                ExpressionType::Vector(vector) => ExpressionType::Primitive(vector.base),
                ExpressionType::Matrix(matrix) => ExpressionType::Vector(VectorType {
                    component_count: matrix.row_count,
                    base: matrix.base,
                }),
                ExpressionType::NoType => ExpressionType::NoType,
                other => {
                    return Err(Error::new(
                        access.location.clone(),
                        CompilationError::IndexUnexpectedType {
                            ty: other.to_string(),
                        },
                    ))
                }
            };
        }

        access.cached_type = Some(current);
        Ok(())
    }

    fn resolve_type_parameter(
        &mut self,
        expr: &mut Expression,
        ctx: &mut TransformerContext,
    ) -> Result<TypeParameter> {
        // access-policy keywords are not regular identifiers
        if let Expression::Identifier(identifier) = expr {
            let policy = match identifier.identifier.as_str() {
                "readonly" => Some(AccessPolicy::ReadOnly),
                "readwrite" => Some(AccessPolicy::ReadWrite),
                "writeonly" => Some(AccessPolicy::WriteOnly),
                _ => None,
            };
            if let Some(policy) = policy {
                return Ok(TypeParameter::Constant(ConstantValue::u32(
                    policy.to_index(),
                )));
            }
        }

        self.resolve_expression(expr, ctx)?;

        if let Some(ty) = expr.cached_type() {
            match ty {
                ExpressionType::Type(inner) if **inner != ExpressionType::NoType => {
                    return Ok(TypeParameter::Type((**inner).clone()));
                }
                ExpressionType::Alias(index) => {
                    let resolved =
                        ctx.resolve_alias_type(&ExpressionType::Alias(*index), expr.location())?;
                    return Ok(TypeParameter::Type(resolved));
                }
                _ => {}
            }
        }

        if let Some(value) = compute_constant(expr, ctx)? {
            return Ok(TypeParameter::Constant(value));
        }

        Err(Error::new(
            expr.location().clone(),
            CompilationError::ConstantExpressionRequired,
        ))
    }

    fn resolve_assign(&mut self, expr: &mut Expression, ctx: &mut TransformerContext) -> Result<()> {
        let Expression::Assign(assign) = expr else {
            unreachable!()
        };

        self.resolve_expression(&mut assign.left, ctx)?;
        self.resolve_expression(&mut assign.right, ctx)?;

        check_place_expression(&assign.left)?;

        let left_type = self.expression_type(&assign.left, ctx)?;
        let right_type = self.expression_type(&assign.right, ctx)?;

        if left_type != ExpressionType::NoType && right_type != ExpressionType::NoType {
            let value_type = match assign.op {
                AssignType::Simple => right_type.clone(),
                AssignType::CompoundAdd => binary_type(
                    BinaryType::Add,
                    &left_type,
                    &right_type,
                    &assign.location,
                )?,
                AssignType::CompoundSubtract => binary_type(
                    BinaryType::Subtract,
                    &left_type,
                    &right_type,
                    &assign.location,
                )?,
                AssignType::CompoundMultiply => binary_type(
                    BinaryType::Multiply,
                    &left_type,
                    &right_type,
                    &assign.location,
                )?,
                AssignType::CompoundDivide => binary_type(
                    BinaryType::Divide,
                    &left_type,
                    &right_type,
                    &assign.location,
                )?,
                AssignType::CompoundModulo => binary_type(
                    BinaryType::Modulo,
                    &left_type,
                    &right_type,
                    &assign.location,
                )?,
                AssignType::CompoundLogicalAnd => binary_type(
                    BinaryType::LogicalAnd,
                    &left_type,
                    &right_type,
                    &assign.location,
                )?,
                AssignType::CompoundLogicalOr => binary_type(
                    BinaryType::LogicalOr,
                    &left_type,
                    &right_type,
                    &assign.location,
                )?,
            };

            // the left side may itself still carry a literal type (a
            // variable whose initializer was an untyped literal), so
            // unify rather than require strict assignability
            if unify_types(&left_type, &value_type).is_none() {
                return Err(Error::new(
                    assign.location.clone(),
                    CompilationError::UnmatchingTypes {
                        left: left_type.to_string(),
                        right: value_type.to_string(),
                    },
                ));
            }
        }

        assign.cached_type = Some(left_type);
        Ok(())
    }

    fn resolve_binary(&mut self, expr: &mut Expression, ctx: &mut TransformerContext) -> Result<()> {
        let Expression::Binary(binary) = expr else {
            unreachable!()
        };

        self.resolve_expression(&mut binary.left, ctx)?;
        self.resolve_expression(&mut binary.right, ctx)?;

        let left_type = self.expression_type(&binary.left, ctx)?;
        let right_type = self.expression_type(&binary.right, ctx)?;
        if left_type == ExpressionType::NoType || right_type == ExpressionType::NoType {
            return Ok(());
        }

        binary.cached_type = Some(binary_type(
            binary.op,
            &left_type,
            &right_type,
            &binary.location,
        )?);
        Ok(())
    }

    fn resolve_unary(&mut self, expr: &mut Expression, ctx: &mut TransformerContext) -> Result<()> {
        let Expression::Unary(unary) = expr else {
            unreachable!()
        };

        self.resolve_expression(&mut unary.expr, ctx)?;
        let operand_type = self.expression_type(&unary.expr, ctx)?;
        if operand_type == ExpressionType::NoType {
            return Ok(());
        }

        let supported = match unary.op {
            UnaryType::LogicalNot => operand_type == ExpressionType::bool(),
            UnaryType::BitwiseNot => operand_type
                .base_primitive()
                .is_some_and(PrimitiveType::is_integer),
            UnaryType::Minus | UnaryType::Plus => operand_type
                .base_primitive()
                .is_some_and(PrimitiveType::is_numeric),
        };
        if !supported {
            return Err(Error::new(
                unary.location.clone(),
                CompilationError::UnaryUnsupported {
                    op: unary.op.symbol(),
                    ty: operand_type.to_string(),
                },
            ));
        }

        unary.cached_type = Some(operand_type);
        Ok(())
    }

    fn resolve_call(&mut self, expr: &mut Expression, ctx: &mut TransformerContext) -> Result<()> {
        let Expression::CallFunction(call) = expr else {
            unreachable!()
        };

        self.resolve_expression(&mut call.target, ctx)?;
        for parameter in &mut call.parameters {
            self.resolve_expression(parameter, ctx)?;
        }

        let Some(target_type) = call.target.cached_type().cloned() else {
            if ctx.partial_compilation || ctx.allow_unknown_identifiers {
                return Ok(());
            }
            return Err(Error::new(call.location.clone(), AstError::MissingType));
        };

        // resolve alias targets to what they name
        let target_type = match target_type {
            ExpressionType::Alias(index) => {
                let target = ctx.resolve_alias_target(index, &call.location)?;
                match target.kind {
                    IdentifierKind::Function => ExpressionType::Function(target.index),
                    IdentifierKind::Struct => {
                        ExpressionType::Type(Box::new(ExpressionType::Struct(target.index)))
                    }
                    IdentifierKind::Type => {
                        let data = ctx.types.retrieve(target.index, &call.location)?;
                        match &data.content {
                            TypeContent::Concrete(ty) => {
                                ExpressionType::Type(Box::new(ty.clone()))
                            }
                            TypeContent::Partial(_) => {
                                ExpressionType::Type(Box::new(ExpressionType::NoType))
                            }
                        }
                    }
                    _ => ExpressionType::Alias(index),
                }
            }
            other => other,
        };

        let mut parameter_types = Vec::with_capacity(call.parameters.len());
        for parameter in &call.parameters {
            parameter_types.push(self.expression_type(parameter, ctx)?);
        }

        match target_type {
            ExpressionType::Function(func_index) => {
                let function = ctx.functions.retrieve(func_index, &call.location)?;
                if function.entry_stage.is_some() {
                    return Err(Error::new(
                        call.location.clone(),
                        CompilationError::FunctionCallUnexpectedEntryFunction {
                            name: function.name.clone(),
                        },
                    ));
                }
                if function.parameters.len() != call.parameters.len() {
                    return Err(Error::new(
                        call.location.clone(),
                        CompilationError::FunctionCallUnmatchingParameterCount {
                            expected: function.parameters.len() as u32,
                            got: call.parameters.len() as u32,
                        },
                    ));
                }
                for (index, ((expected, _), got)) in
                    function.parameters.iter().zip(&parameter_types).enumerate()
                {
                    if *got == ExpressionType::NoType {
                        continue;
                    }
                    if unify_types(expected, got).is_none() {
                        return Err(Error::new(
                            call.location.clone(),
                            CompilationError::FunctionCallUnmatchingParameterType {
                                index: index as u32,
                                expected: expected.to_string(),
                                got: got.to_string(),
                            },
                        ));
                    }
                }
                call.cached_type = Some(function.return_type.clone());
                Ok(())
            }
            ExpressionType::Intrinsic(kind) => {
                let return_type = check_intrinsic(kind, &parameter_types, &call.location)?;
                let parameters = std::mem::take(&mut call.parameters);
                let location = call.location.clone();
                *expr = Expression::Intrinsic(IntrinsicExpression {
                    intrinsic: kind,
                    parameters,
                    cached_type: Some(return_type),
                    location,
                });
                Ok(())
            }
            ExpressionType::Type(target) => {
                let target = match *target {
                    ExpressionType::ImplicitVector(component_count) => {
                        // deduce the base type from the arguments
                        let base = parameter_types
                            .iter()
                            .find_map(ExpressionType::base_primitive)
                            .ok_or_else(|| {
                                Error::new(
                                    call.location.clone(),
                                    CompilationError::CastIncompatibleTypes {
                                        from: String::from("no type"),
                                        to: format!("vec{component_count}"),
                                    },
                                )
                            })?;
                        ExpressionType::vector(component_count, concrete_base(base))
                    }
                    other => other,
                };

                validate_cast(&target, &parameter_types, ctx, &call.location)?;
                let parameters = std::mem::take(&mut call.parameters);
                let location = call.location.clone();
                *expr = Expression::Cast(CastExpression {
                    target_type: ExpressionValue::Value(target.clone()),
                    expressions: parameters,
                    cached_type: Some(target),
                    location,
                });
                Ok(())
            }
            other => Err(Error::new(
                call.location.clone(),
                CompilationError::ExpectedFunction {
                    got: other.to_string(),
                },
            )),
        }
    }

    fn resolve_method_call(
        &mut self,
        expr: &mut Expression,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        let Expression::CallMethod(call) = expr else {
            unreachable!()
        };

        self.resolve_expression(&mut call.object, ctx)?;
        for parameter in &mut call.parameters {
            self.resolve_expression(parameter, ctx)?;
        }

        let object_type = self.expression_type(&call.object, ctx)?;
        if object_type == ExpressionType::NoType {
            return Ok(());
        }

        let intrinsic = match (&object_type, call.method.as_str()) {
            (ExpressionType::Sampler(_), "Sample") => IntrinsicKind::TextureSampleImplicitLod,
            (ExpressionType::Texture(_), "Read") => IntrinsicKind::TextureRead,
            (ExpressionType::Texture(_), "Write") => IntrinsicKind::TextureWrite,
            (ExpressionType::Array(_) | ExpressionType::DynArray(_), "Size") => {
                IntrinsicKind::ArraySize
            }
            _ => {
                return Err(Error::new(
                    call.location.clone(),
                    CompilationError::UnknownMethod {
                        method: call.method.clone(),
                        ty: object_type.to_string(),
                    },
                ))
            }
        };

        let object = std::mem::replace(
            &mut call.object,
            Box::new(Expression::constant(
                ConstantValue::NoValue,
                call.location.clone(),
            )),
        );
        let mut parameters = vec![*object];
        parameters.append(&mut call.parameters);

        let mut parameter_types = Vec::with_capacity(parameters.len());
        for parameter in &parameters {
            parameter_types.push(self.expression_type(parameter, ctx)?);
        }
        let return_type = check_intrinsic(intrinsic, &parameter_types, &call.location)?;
        let location = call.location.clone();

        *expr = Expression::Intrinsic(IntrinsicExpression {
            intrinsic,
            parameters,
            cached_type: Some(return_type),
            location,
        });
        Ok(())
    }

    fn resolve_cast(&mut self, expr: &mut Expression, ctx: &mut TransformerContext) -> Result<()> {
        let Expression::Cast(cast) = expr else {
            unreachable!()
        };

        let target = self.resolve_type_value(&mut cast.target_type, ctx)?;
        for sub in &mut cast.expressions {
            self.resolve_expression(sub, ctx)?;
        }

        let Some(target) = target else {
            return Ok(());
        };

        let mut types = Vec::with_capacity(cast.expressions.len());
        for sub in &cast.expressions {
            types.push(self.expression_type(sub, ctx)?);
        }
        validate_cast(&target, &types, ctx, &cast.location)?;
        cast.cached_type = Some(target);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn check_bool_condition(
        &self,
        condition: &Expression,
        ctx: &TransformerContext,
    ) -> Result<()> {
        let condition_type = self.expression_type(condition, ctx)?;
        if condition_type != ExpressionType::bool() && condition_type != ExpressionType::NoType {
            return Err(Error::new(
                condition.location().clone(),
                CompilationError::ConditionExpectedBool {
                    got: condition_type.to_string(),
                },
            ));
        }
        Ok(())
    }

    /// Resolves an `ExpressionValue` type slot to a concrete type.
    fn resolve_type_value(
        &mut self,
        value: &mut ExpressionValue<ExpressionType>,
        ctx: &mut TransformerContext,
    ) -> Result<Option<ExpressionType>> {
        match value {
            ExpressionValue::None => Ok(None),
            ExpressionValue::Value(ty) => Ok(Some(ty.clone())),
            ExpressionValue::Expression(expr) => {
                self.resolve_expression(expr, ctx)?;
                match self.try_expression_to_type(expr, ctx)? {
                    Some(ty) => {
                        *value = ExpressionValue::Value(ty.clone());
                        Ok(Some(ty))
                    }
                    None => {
                        if ctx.partial_compilation || ctx.allow_unknown_identifiers {
                            Ok(None)
                        } else {
                            Err(Error::new(
                                expr.location().clone(),
                                CompilationError::TypeExpected {
                                    got: expr
                                        .cached_type()
                                        .map(ExpressionType::to_string)
                                        .unwrap_or_else(|| String::from("no type")),
                                },
                            ))
                        }
                    }
                }
            }
        }
    }

    fn try_expression_to_type(
        &self,
        expr: &Expression,
        ctx: &TransformerContext,
    ) -> Result<Option<ExpressionType>> {
        let Some(cached) = expr.cached_type() else {
            return Ok(None);
        };
        match cached {
            ExpressionType::Type(inner) if **inner != ExpressionType::NoType => {
                Ok(Some((**inner).clone()))
            }
            ExpressionType::Alias(index) => Ok(Some(
                ctx.resolve_alias_type(&ExpressionType::Alias(*index), expr.location())?,
            )),
            _ => Ok(None),
        }
    }

    fn expression_to_type(
        &self,
        expr: &Expression,
        ctx: &TransformerContext,
    ) -> Result<ExpressionType> {
        self.try_expression_to_type(expr, ctx)?.ok_or_else(|| {
            Error::new(
                expr.location().clone(),
                CompilationError::TypeExpected {
                    got: expr
                        .cached_type()
                        .map(ExpressionType::to_string)
                        .unwrap_or_else(|| String::from("no type")),
                },
            )
        })
    }

    fn resolve_bool_attribute(
        &mut self,
        value: &mut ExpressionValue<bool>,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        if let ExpressionValue::Expression(expr) = value {
            self.resolve_expression(expr, ctx)?;
            if let Some(constant) = compute_constant(expr, ctx)? {
                if let Some(flag) = constant.as_bool() {
                    *value = ExpressionValue::Value(flag);
                    return Ok(());
                }
            }
            if !ctx.partial_compilation {
                return Err(Error::new(
                    expr.location().clone(),
                    CompilationError::ConstantExpressionRequired,
                ));
            }
        }
        Ok(())
    }

    fn resolve_u32_attribute(
        &mut self,
        value: &mut ExpressionValue<u32>,
        ctx: &mut TransformerContext,
    ) -> Result<()> {
        if let ExpressionValue::Expression(expr) = value {
            self.resolve_expression(expr, ctx)?;
            if let Some(constant) = compute_constant(expr, ctx)? {
                if let Some(index) = constant.as_u32() {
                    *value = ExpressionValue::Value(index);
                    return Ok(());
                }
            }
            if !ctx.partial_compilation {
                return Err(Error::new(
                    expr.location().clone(),
                    CompilationError::ConstantExpressionRequired,
                ));
            }
        }
        Ok(())
    }

    fn check_external_type(
        &self,
        ty: &ExpressionType,
        ctx: &TransformerContext,
        location: &SourceLocation,
    ) -> Result<()> {
        let resolved = ctx.resolve_alias_type(ty, location)?;
        let allowed = match &resolved {
            ExpressionType::Sampler(_)
            | ExpressionType::Texture(_)
            | ExpressionType::Storage(_)
            | ExpressionType::Uniform(_)
            | ExpressionType::PushConstant(_) => true,
            ExpressionType::Array(array) => matches!(
                &*array.inner,
                ExpressionType::Sampler(_) | ExpressionType::Texture(_)
            ),
            ExpressionType::Primitive(_) | ExpressionType::Vector(_) | ExpressionType::Matrix(_) => {
                self.current_features
                    .contains(&ModuleFeature::PrimitiveExternals)
            }
            _ => false,
        };
        if !allowed {
            return Err(Error::new(
                location.clone(),
                CompilationError::ExtTypeNotAllowed {
                    ty: resolved.to_string(),
                },
            ));
        }
        Ok(())
    }

    fn check_type_features(&self, ty: &ExpressionType, location: &SourceLocation) -> Result<()> {
        if let Some(base) = ty.base_primitive() {
            if base == PrimitiveType::Float64
                && !self.current_features.contains(&ModuleFeature::Float64)
            {
                return Err(Error::new(
                    location.clone(),
                    CompilationError::FeatureNotEnabled { feature: "float64" },
                ));
            }
        }
        match ty {
            ExpressionType::Sampler(sampler)
                if matches!(sampler.dim, TextureDim::Dim1D | TextureDim::Dim1DArray)
                    && !self.current_features.contains(&ModuleFeature::Texture1D) =>
            {
                Err(Error::new(
                    location.clone(),
                    CompilationError::FeatureNotEnabled {
                        feature: "texture1d",
                    },
                ))
            }
            ExpressionType::Texture(texture)
                if matches!(texture.dim, TextureDim::Dim1D | TextureDim::Dim1DArray)
                    && !self.current_features.contains(&ModuleFeature::Texture1D) =>
            {
                Err(Error::new(
                    location.clone(),
                    CompilationError::FeatureNotEnabled {
                        feature: "texture1d",
                    },
                ))
            }
            _ => Ok(()),
        }
    }
}

impl Pass for ResolvePass {
    fn name(&self) -> &'static str {
        "resolve"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        for (hash, value) in &self.option_values {
            ctx.option_values.insert(*hash, value.clone());
        }

        self.push_scope();
        self.register_builtins(ctx)?;
        let result = self.resolve_module(module, ctx);
        self.pop_scope();
        result
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

/// Type an identifier-value expression carries for a given target.
pub fn identifier_target_type(
    target: IdentifierTarget,
    ctx: &TransformerContext,
    location: &SourceLocation,
) -> Result<Option<ExpressionType>> {
    Ok(match target.kind {
        IdentifierKind::Alias => Some(ExpressionType::Alias(target.index)),
        IdentifierKind::Constant => {
            Some(ctx.constants.retrieve(target.index, location)?.ty.clone())
        }
        IdentifierKind::ExternalBlock => Some(ExpressionType::NamedExternalBlock(target.index)),
        IdentifierKind::Function => Some(ExpressionType::Function(target.index)),
        IdentifierKind::Intrinsic => Some(ExpressionType::Intrinsic(
            ctx.intrinsics.retrieve(target.index, location)?.kind,
        )),
        IdentifierKind::Module => Some(ExpressionType::Module(target.index)),
        IdentifierKind::Struct => Some(ExpressionType::Type(Box::new(ExpressionType::Struct(
            target.index,
        )))),
        IdentifierKind::Type => {
            let data = ctx.types.retrieve(target.index, location)?;
            match &data.content {
                TypeContent::Concrete(ty) => Some(ExpressionType::Type(Box::new(ty.clone()))),
                TypeContent::Partial(partial) => {
                    if partial.min_parameters == 0 {
                        let built = (partial.build)(&[], location)?;
                        Some(ExpressionType::Type(Box::new(built)))
                    } else {
                        // awaiting its bracket arguments
                        Some(ExpressionType::Type(Box::new(ExpressionType::NoType)))
                    }
                }
            }
        }
        IdentifierKind::Variable => {
            Some(ctx.variables.retrieve(target.index, location)?.ty.clone())
        }
    })
}

/// Parses swizzle characters (`xyzw` or `rgba`, not mixed).
pub fn parse_swizzle(text: &str) -> Option<SmallVec<[u32; 4]>> {
    if text.is_empty() || text.len() > 4 {
        return None;
    }

    let xyzw = text.chars().all(|c| matches!(c, 'x' | 'y' | 'z' | 'w'));
    let rgba = text.chars().all(|c| matches!(c, 'r' | 'g' | 'b' | 'a'));
    if !xyzw && !rgba {
        return None;
    }

    Some(
        text.chars()
            .map(|c| match c {
                'x' | 'r' => 0,
                'y' | 'g' => 1,
                'z' | 'b' => 2,
                _ => 3,
            })
            .collect(),
    )
}

fn concrete_base(base: PrimitiveType) -> PrimitiveType {
    match base {
        PrimitiveType::FloatLiteral => PrimitiveType::Float32,
        PrimitiveType::IntLiteral => PrimitiveType::Int32,
        other => other,
    }
}

/// Checks that the left side of an assignment is a place expression, and
/// that swizzle writes do not repeat components.
fn check_place_expression(expr: &Expression) -> Result<()> {
    match expr {
        Expression::IdentifierValue(value) if value.kind == IdentifierKind::Variable => Ok(()),
        Expression::Identifier(_) => Ok(()), // unresolved, checked on a later run
        Expression::AccessField(access) => check_place_expression(&access.expr),
        Expression::AccessIndex(access) => check_place_expression(&access.expr),
        Expression::AccessIdentifier(access) => check_place_expression(&access.expr),
        Expression::Swizzle(swizzle) => {
            let mut seen = [false; 4];
            for &component in &swizzle.components {
                if seen[component as usize] {
                    return Err(Error::new(
                        swizzle.location.clone(),
                        CompilationError::SwizzleWriteDuplicate,
                    ));
                }
                seen[component as usize] = true;
            }
            check_place_expression(&swizzle.expr)
        }
        other => Err(Error::new(
            other.location().clone(),
            CompilationError::NotAssignable,
        )),
    }
}

/// Result type of a binary operation (§typing rules).
pub fn binary_type(
    op: BinaryType,
    left: &ExpressionType,
    right: &ExpressionType,
    location: &SourceLocation,
) -> Result<ExpressionType> {
    use BinaryType::*;

    let incompatible = || {
        Error::new(
            location.clone(),
            CompilationError::BinaryIncompatibleTypes {
                left: left.to_string(),
                right: right.to_string(),
            },
        )
    };
    let unsupported = |ty: &ExpressionType| {
        Error::new(
            location.clone(),
            CompilationError::BinaryUnsupported {
                op: op.symbol(),
                ty: ty.to_string(),
            },
        )
    };

    match op {
        CompEq | CompNe => {
            let unified = unify_types(left, right).ok_or_else(incompatible)?;
            if !(unified.is_primitive() || unified.is_vector()) {
                return Err(unsupported(&unified));
            }
            Ok(ExpressionType::bool())
        }
        CompGe | CompGt | CompLe | CompLt => {
            let unified = unify_types(left, right).ok_or_else(incompatible)?;
            if !unified
                .base_primitive()
                .is_some_and(PrimitiveType::is_numeric)
                || unified.is_matrix()
            {
                return Err(unsupported(&unified));
            }
            Ok(ExpressionType::bool())
        }
        LogicalAnd | LogicalOr => {
            if *left != ExpressionType::bool() || *right != ExpressionType::bool() {
                return Err(unsupported(left));
            }
            Ok(ExpressionType::bool())
        }
        BitwiseAnd | BitwiseOr | BitwiseXor | ShiftLeft | ShiftRight => {
            let unified = unify_types(left, right).ok_or_else(incompatible)?;
            if !unified
                .base_primitive()
                .is_some_and(PrimitiveType::is_integer)
                || unified.is_matrix()
            {
                return Err(unsupported(&unified));
            }
            Ok(unified)
        }
        Add | Subtract | Divide | Modulo | Multiply => {
            numeric_binary_type(op, left, right, location)
        }
    }
}

fn numeric_binary_type(
    op: BinaryType,
    left: &ExpressionType,
    right: &ExpressionType,
    location: &SourceLocation,
) -> Result<ExpressionType> {
    use nzslc_par::ast::MatrixType;

    let incompatible = || {
        Error::new(
            location.clone(),
            CompilationError::BinaryIncompatibleTypes {
                left: left.to_string(),
                right: right.to_string(),
            },
        )
    };
    let unsupported = |ty: &ExpressionType| {
        Error::new(
            location.clone(),
            CompilationError::BinaryUnsupported {
                op: op.symbol(),
                ty: ty.to_string(),
            },
        )
    };

    let check_numeric = |ty: &ExpressionType| -> Result<()> {
        if ty.base_primitive().is_some_and(PrimitiveType::is_numeric) {
            Ok(())
        } else {
            Err(unsupported(ty))
        }
    };

    match (left, right) {
        // matrix algebra
        (ExpressionType::Matrix(a), ExpressionType::Matrix(b)) => {
            check_numeric(left)?;
            if crate::type_rules::unify_primitives(a.base, b.base).is_none() {
                return Err(incompatible());
            }
            match op {
                BinaryType::Add | BinaryType::Subtract => {
                    if a.column_count != b.column_count || a.row_count != b.row_count {
                        return Err(incompatible());
                    }
                    Ok(left.clone())
                }
                BinaryType::Multiply => {
                    if a.column_count != b.row_count {
                        return Err(incompatible());
                    }
                    Ok(ExpressionType::Matrix(MatrixType {
                        column_count: b.column_count,
                        row_count: a.row_count,
                        base: a.base,
                    }))
                }
                _ => Err(unsupported(left)),
            }
        }
        (ExpressionType::Matrix(a), ExpressionType::Vector(b)) => {
            if op != BinaryType::Multiply {
                return Err(unsupported(left));
            }
            if crate::type_rules::unify_primitives(a.base, b.base).is_none()
                || a.column_count != b.component_count
            {
                return Err(incompatible());
            }
            Ok(ExpressionType::vector(a.row_count, a.base))
        }
        (ExpressionType::Vector(a), ExpressionType::Matrix(b)) => {
            if op != BinaryType::Multiply {
                return Err(unsupported(right));
            }
            if crate::type_rules::unify_primitives(a.base, b.base).is_none()
                || a.component_count != b.row_count
            {
                return Err(incompatible());
            }
            Ok(ExpressionType::vector(b.column_count, b.base))
        }
        (ExpressionType::Matrix(_), ExpressionType::Primitive(_)) => {
            if op != BinaryType::Multiply {
                return Err(unsupported(left));
            }
            check_numeric(right)?;
            Ok(left.clone())
        }
        (ExpressionType::Primitive(_), ExpressionType::Matrix(_)) => {
            if op != BinaryType::Multiply {
                return Err(unsupported(right));
            }
            check_numeric(left)?;
            Ok(right.clone())
        }

        // scalar / vector arithmetic with broadcast
        (ExpressionType::Vector(_), ExpressionType::Primitive(scalar)) => {
            check_numeric(left)?;
            let base = left.base_primitive().expect("vector has a base");
            let unified = crate::type_rules::unify_primitives(base, *scalar)
                .ok_or_else(incompatible)?;
            Ok(ExpressionType::vector(
                left.component_count().expect("vector"),
                unified,
            ))
        }
        (ExpressionType::Primitive(scalar), ExpressionType::Vector(_)) => {
            check_numeric(right)?;
            let base = right.base_primitive().expect("vector has a base");
            let unified = crate::type_rules::unify_primitives(*scalar, base)
                .ok_or_else(incompatible)?;
            Ok(ExpressionType::vector(
                right.component_count().expect("vector"),
                unified,
            ))
        }
        _ => {
            check_numeric(left)?;
            check_numeric(right)?;
            unify_types(left, right).ok_or_else(incompatible)
        }
    }
}

/// Validates a cast / construction against its argument types.
fn validate_cast(
    target: &ExpressionType,
    args: &[ExpressionType],
    ctx: &TransformerContext,
    location: &SourceLocation,
) -> Result<()> {
    let error = |from: String| {
        Error::new(
            location.clone(),
            CompilationError::CastIncompatibleTypes {
                from,
                to: target.to_string(),
            },
        )
    };

    // under partial compilation unresolved arguments pass through
    if args.iter().any(|arg| *arg == ExpressionType::NoType) {
        return Ok(());
    }

    match target {
        ExpressionType::Primitive(primitive) => {
            if !primitive.is_numeric() {
                return Err(error(String::from("non-numeric")));
            }
            let [arg] = args else {
                return Err(Error::new(
                    location.clone(),
                    CompilationError::CastComponentMismatch {
                        expected: 1,
                        got: args.len() as u32,
                    },
                ));
            };
            match arg.base_primitive() {
                Some(base) if base.is_numeric() && arg.component_count() == Some(1) => Ok(()),
                _ => Err(error(arg.to_string())),
            }
        }
        ExpressionType::Vector(vector) => {
            let mut total = 0u32;
            for arg in args {
                let resolved = ctx.resolve_alias_type(arg, location)?;
                match resolved.base_primitive() {
                    Some(base)
                        if crate::type_rules::unify_primitives(base, vector.base).is_some()
                            && !resolved.is_matrix() =>
                    {
                        total += resolved.component_count().unwrap_or(0);
                    }
                    _ => return Err(error(resolved.to_string())),
                }
            }
            // a single scalar splats
            if args.len() == 1 && total == 1 {
                return Ok(());
            }
            if total != vector.component_count {
                return Err(Error::new(
                    location.clone(),
                    CompilationError::CastComponentMismatch {
                        expected: vector.component_count,
                        got: total,
                    },
                ));
            }
            Ok(())
        }
        ExpressionType::Matrix(matrix) => {
            // column vectors, a full scalar list, or another matrix
            if args.len() == 1 {
                if let ExpressionType::Matrix(from) = &args[0] {
                    if crate::type_rules::unify_primitives(from.base, matrix.base).is_some() {
                        return Ok(());
                    }
                }
            }
            if args.len() as u32 == matrix.column_count {
                let expected_column = ExpressionType::vector(matrix.row_count, matrix.base);
                for arg in args {
                    if unify_types(arg, &expected_column).is_none() {
                        return Err(error(arg.to_string()));
                    }
                }
                return Ok(());
            }
            if args.len() as u32 == matrix.column_count * matrix.row_count {
                for arg in args {
                    match arg.base_primitive() {
                        Some(base)
                            if crate::type_rules::unify_primitives(base, matrix.base)
                                .is_some()
                                && arg.component_count() == Some(1) => {}
                        _ => return Err(error(arg.to_string())),
                    }
                }
                return Ok(());
            }
            Err(Error::new(
                location.clone(),
                CompilationError::CastComponentMismatch {
                    expected: matrix.column_count,
                    got: args.len() as u32,
                },
            ))
        }
        ExpressionType::Array(array) => {
            if args.len() as u32 != array.length {
                return Err(Error::new(
                    location.clone(),
                    CompilationError::CastComponentMismatch {
                        expected: array.length,
                        got: args.len() as u32,
                    },
                ));
            }
            for arg in args {
                if unify_types(arg, &array.inner).is_none() {
                    return Err(error(arg.to_string()));
                }
            }
            Ok(())
        }
        _ => Err(error(
            args.first()
                .map(ExpressionType::to_string)
                .unwrap_or_default(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Builtin partial types
// ---------------------------------------------------------------------------

fn parameter_primitive(
    parameter: &TypeParameter,
    location: &SourceLocation,
    index: u32,
) -> Result<PrimitiveType> {
    match parameter {
        TypeParameter::Type(ExpressionType::Primitive(primitive)) => Ok(*primitive),
        _ => Err(Error::new(
            location.clone(),
            CompilationError::PartialTypeParameter {
                index,
                expected: "primitive type",
            },
        )),
    }
}

fn parameter_struct(
    parameter: &TypeParameter,
    location: &SourceLocation,
    index: u32,
) -> Result<usize> {
    match parameter {
        TypeParameter::Type(ExpressionType::Struct(struct_index)) => Ok(*struct_index),
        _ => Err(Error::new(
            location.clone(),
            CompilationError::PartialTypeParameter {
                index,
                expected: "struct",
            },
        )),
    }
}

fn parameter_access(
    parameter: &TypeParameter,
    location: &SourceLocation,
    index: u32,
) -> Result<AccessPolicy> {
    match parameter {
        TypeParameter::Constant(value) => value
            .as_u32()
            .and_then(AccessPolicy::from_index)
            .ok_or_else(|| {
                Error::new(
                    location.clone(),
                    CompilationError::PartialTypeParameter {
                        index,
                        expected: "access policy",
                    },
                )
            }),
        _ => Err(Error::new(
            location.clone(),
            CompilationError::PartialTypeParameter {
                index,
                expected: "access policy",
            },
        )),
    }
}

macro_rules! vector_partial {
    ($name:literal, $count:literal) => {
        PartialType {
            name: $name,
            min_parameters: 0,
            max_parameters: 1,
            build: |parameters, location| match parameters {
                [] => Ok(ExpressionType::ImplicitVector($count)),
                [parameter] => Ok(ExpressionType::vector(
                    $count,
                    parameter_primitive(parameter, location, 0)?,
                )),
                _ => unreachable!("arity checked by the caller"),
            },
        }
    };
}

macro_rules! matrix_partial {
    ($name:literal, $columns:literal, $rows:literal) => {
        PartialType {
            name: $name,
            min_parameters: 1,
            max_parameters: 1,
            build: |parameters, location| {
                Ok(ExpressionType::Matrix(nzslc_par::ast::MatrixType {
                    column_count: $columns,
                    row_count: $rows,
                    base: parameter_primitive(&parameters[0], location, 0)?,
                }))
            },
        }
    };
}

macro_rules! sampler_partial {
    ($name:literal, $dim:expr, $depth:literal) => {
        PartialType {
            name: $name,
            min_parameters: 1,
            max_parameters: 1,
            build: |parameters, location| {
                Ok(ExpressionType::Sampler(SamplerType {
                    dim: $dim,
                    base: parameter_primitive(&parameters[0], location, 0)?,
                    depth: $depth,
                }))
            },
        }
    };
}

macro_rules! texture_partial {
    ($name:literal, $dim:expr) => {
        PartialType {
            name: $name,
            min_parameters: 2,
            max_parameters: 2,
            build: |parameters, location| {
                Ok(ExpressionType::Texture(TextureType {
                    dim: $dim,
                    base: parameter_primitive(&parameters[0], location, 0)?,
                    access: parameter_access(&parameters[1], location, 1)?,
                }))
            },
        }
    };
}

fn builtin_partial_types() -> Vec<PartialType> {
    vec![
        vector_partial!("vec2", 2),
        vector_partial!("vec3", 3),
        vector_partial!("vec4", 4),
        matrix_partial!("mat2", 2, 2),
        matrix_partial!("mat3", 3, 3),
        matrix_partial!("mat4", 4, 4),
        matrix_partial!("mat2x3", 2, 3),
        matrix_partial!("mat2x4", 2, 4),
        matrix_partial!("mat3x2", 3, 2),
        matrix_partial!("mat3x4", 3, 4),
        matrix_partial!("mat4x2", 4, 2),
        matrix_partial!("mat4x3", 4, 3),
        PartialType {
            name: "array",
            min_parameters: 2,
            max_parameters: 2,
            build: |parameters, location| {
                let TypeParameter::Type(inner) = &parameters[0] else {
                    return Err(Error::new(
                        location.clone(),
                        CompilationError::PartialTypeParameter {
                            index: 0,
                            expected: "type",
                        },
                    ));
                };
                let TypeParameter::Constant(length) = &parameters[1] else {
                    return Err(Error::new(
                        location.clone(),
                        CompilationError::ArrayLengthRequired,
                    ));
                };
                let length = length.as_u32().filter(|&length| length > 0).ok_or_else(|| {
                    Error::new(location.clone(), CompilationError::ArrayLengthRequired)
                })?;
                Ok(ExpressionType::Array(ArrayType {
                    inner: Box::new(inner.clone()),
                    length,
                }))
            },
        },
        PartialType {
            name: "dyn_array",
            min_parameters: 1,
            max_parameters: 1,
            build: |parameters, location| {
                let TypeParameter::Type(inner) = &parameters[0] else {
                    return Err(Error::new(
                        location.clone(),
                        CompilationError::PartialTypeParameter {
                            index: 0,
                            expected: "type",
                        },
                    ));
                };
                Ok(ExpressionType::DynArray(DynArrayType {
                    inner: Box::new(inner.clone()),
                }))
            },
        },
        sampler_partial!("sampler1D", TextureDim::Dim1D, false),
        sampler_partial!("sampler1D_array", TextureDim::Dim1DArray, false),
        sampler_partial!("sampler2D", TextureDim::Dim2D, false),
        sampler_partial!("sampler2D_array", TextureDim::Dim2DArray, false),
        sampler_partial!("sampler3D", TextureDim::Dim3D, false),
        sampler_partial!("sampler_cube", TextureDim::Cubemap, false),
        sampler_partial!("depth_sampler2D", TextureDim::Dim2D, true),
        sampler_partial!("depth_sampler2D_array", TextureDim::Dim2DArray, true),
        sampler_partial!("depth_sampler_cube", TextureDim::Cubemap, true),
        texture_partial!("texture1D", TextureDim::Dim1D),
        texture_partial!("texture1D_array", TextureDim::Dim1DArray),
        texture_partial!("texture2D", TextureDim::Dim2D),
        texture_partial!("texture2D_array", TextureDim::Dim2DArray),
        texture_partial!("texture3D", TextureDim::Dim3D),
        texture_partial!("texture_cube", TextureDim::Cubemap),
        PartialType {
            name: "storage",
            min_parameters: 1,
            max_parameters: 2,
            build: |parameters, location| {
                let struct_index = parameter_struct(&parameters[0], location, 0)?;
                let access = match parameters.get(1) {
                    Some(parameter) => parameter_access(parameter, location, 1)?,
                    None => AccessPolicy::ReadWrite,
                };
                Ok(ExpressionType::Storage(StorageType {
                    struct_index,
                    access,
                }))
            },
        },
        PartialType {
            name: "uniform",
            min_parameters: 1,
            max_parameters: 1,
            build: |parameters, location| {
                Ok(ExpressionType::Uniform(UniformType {
                    struct_index: parameter_struct(&parameters[0], location, 0)?,
                }))
            },
        },
        PartialType {
            name: "push_constant",
            min_parameters: 1,
            max_parameters: 1,
            build: |parameters, location| {
                Ok(ExpressionType::PushConstant(PushConstantType {
                    struct_index: parameter_struct(&parameters[0], location, 0)?,
                }))
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use nzslc_par::parse;

    fn resolve_source(source: &str) -> Result<(Module, TransformerContext)> {
        let mut module = parse(source)?;
        let mut ctx = TransformerContext::new();
        let mut pass = ResolvePass::new(None, FxHashMap::default());
        pass.transform(&mut module, &mut ctx)?;
        Ok((module, ctx))
    }

    const HEADER: &str = "[nzsl_version(\"1.0\")]\nmodule;\n";

    #[test]
    fn test_variable_binding() {
        let source = format!("{HEADER}fn f() {{ let x = 1.0; let y = x; }}\n");
        let (module, ctx) = resolve_source(&source).unwrap();

        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(second) = &func.statements[1] else {
            panic!("expected variable");
        };
        let Expression::IdentifierValue(value) = second.initial_expression.as_deref().unwrap()
        else {
            panic!("expected bound identifier");
        };
        assert_eq!(value.kind, IdentifierKind::Variable);
        assert!(ctx.variables.is_registered(value.index));
    }

    #[test]
    fn test_unknown_identifier() {
        let source = format!("{HEADER}fn f() {{ let x = missing; }}\n");
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("unknown identifier missing"));
    }

    #[test]
    fn test_partial_compilation_keeps_unknown() {
        let source = format!("{HEADER}fn f() {{ let x = missing; }}\n");
        let mut module = parse(&source).unwrap();
        let mut ctx = TransformerContext::new();
        ctx.partial_compilation = true;
        let mut pass = ResolvePass::new(None, FxHashMap::default());
        pass.transform(&mut module, &mut ctx).unwrap();

        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[0] else {
            panic!("expected variable");
        };
        assert!(matches!(
            var.initial_expression.as_deref(),
            Some(Expression::Identifier(_))
        ));
    }

    #[test]
    fn test_type_inference_binary() {
        let source = format!("{HEADER}fn f() {{ let x = 1.0; let y = x * 2.0; }}\n");
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(second) = &func.statements[1] else {
            panic!("expected variable");
        };
        // 2.0 is still an untyped literal at this point, unified with the
        // (untyped) x
        let init_type = second.initial_expression.as_deref().unwrap().cached_type();
        assert_eq!(
            init_type,
            Some(&ExpressionType::Primitive(PrimitiveType::FloatLiteral))
        );
    }

    #[test]
    fn test_vector_construction() {
        let source = format!("{HEADER}fn f() {{ let v = vec3[f32](1.0, 2.0, 3.0); }}\n");
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[0] else {
            panic!("expected variable");
        };
        let init = var.initial_expression.as_deref().unwrap();
        assert!(matches!(init, Expression::Cast(_)));
        assert_eq!(init.cached_type().unwrap().to_string(), "vec3[f32]");
    }

    #[test]
    fn test_implicit_vector_construction() {
        let source = format!("{HEADER}fn f() {{ let v = vec3(1.0, 2.0, 3.0); }}\n");
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[0] else {
            panic!("expected variable");
        };
        // untyped float literals deduce a f32 vector
        assert_eq!(
            var.initial_expression.as_deref().unwrap().cached_type().unwrap().to_string(),
            "vec3[f32]"
        );
    }

    #[test]
    fn test_struct_field_access() {
        let source = format!(
            "{HEADER}struct Data {{ value: f32 }}\nfn f(input: Data) -> f32 {{ return input.value; }}\n"
        );
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(func) = &module.root.statements[1] else {
            panic!("expected function");
        };
        let Statement::Return(ret) = &func.statements[0] else {
            panic!("expected return");
        };
        let Some(Expression::AccessField(access)) = &ret.returned_expr else {
            panic!("expected field access, got {:?}", ret.returned_expr);
        };
        assert_eq!(access.field_index, 0);
        assert_eq!(access.cached_type, Some(ExpressionType::f32()));
    }

    #[test]
    fn test_unknown_field() {
        let source = format!(
            "{HEADER}struct Data {{ value: f32 }}\nfn f(input: Data) {{ let x = input.missing; }}\n"
        );
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("unknown field missing"));
    }

    #[test]
    fn test_swizzle_resolution() {
        let source = format!(
            "{HEADER}fn f() {{ let v = vec4[f32](1.0, 2.0, 3.0, 4.0); let s = v.xyz; let b = v.rgba; }}\n"
        );
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(swizzled) = &func.statements[1] else {
            panic!("expected variable");
        };
        let Expression::Swizzle(swizzle) = swizzled.initial_expression.as_deref().unwrap() else {
            panic!("expected swizzle");
        };
        assert_eq!(swizzle.components.as_slice(), &[0, 1, 2]);
        assert_eq!(swizzle.cached_type.as_ref().unwrap().to_string(), "vec3[f32]");
    }

    #[test]
    fn test_scalar_swizzle() {
        let source = format!("{HEADER}fn f() {{ let value = 42.0; let vec = value.xxx; }}\n");
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(vec_var) = &func.statements[1] else {
            panic!("expected variable");
        };
        let Expression::Swizzle(swizzle) = vec_var.initial_expression.as_deref().unwrap() else {
            panic!("expected swizzle");
        };
        assert_eq!(swizzle.components.as_slice(), &[0, 0, 0]);
    }

    #[test]
    fn test_invalid_scalar_swizzle() {
        let source = format!("{HEADER}fn f() {{ let value = 42.0; let vec = value.xyz; }}\n");
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("invalid scalar swizzle"));
    }

    #[test]
    fn test_function_call_type() {
        let source = format!(
            "{HEADER}fn add(a: f32, b: f32) -> f32 {{ return a + b; }}\nfn main() {{ let x = add(1.0, 2.0); }}\n"
        );
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(main) = &module.root.statements[1] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &main.statements[0] else {
            panic!("expected variable");
        };
        assert_eq!(
            var.initial_expression.as_deref().unwrap().cached_type(),
            Some(&ExpressionType::f32())
        );
    }

    #[test]
    fn test_function_call_wrong_arity() {
        let source = format!(
            "{HEADER}fn add(a: f32, b: f32) -> f32 {{ return a + b; }}\nfn main() {{ let x = add(1.0); }}\n"
        );
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("expects 2 parameter(s)"));
    }

    #[test]
    fn test_entry_function_cannot_be_called() {
        let source = format!(
            "{HEADER}[entry(frag)]\nfn main() {{ }}\nfn other() {{ main(); }}\n"
        );
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("cannot be called"));
    }

    #[test]
    fn test_duplicate_entry_stage() {
        let source = format!(
            "{HEADER}[entry(frag)]\nfn a() {{ }}\n[entry(frag)]\nfn b() {{ }}\n"
        );
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn test_intrinsic_call() {
        let source = format!(
            "{HEADER}fn f() {{ let v = vec3[f32](1.0, 0.0, 0.0); let d = dot(v, v); }}\n"
        );
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[1] else {
            panic!("expected variable");
        };
        let Expression::Intrinsic(intrinsic) = var.initial_expression.as_deref().unwrap() else {
            panic!("expected intrinsic");
        };
        assert_eq!(intrinsic.intrinsic, IntrinsicKind::Dot);
        assert_eq!(intrinsic.cached_type, Some(ExpressionType::f32()));
    }

    #[test]
    fn test_method_call_becomes_intrinsic() {
        let source = format!(
            "{HEADER}external {{ [binding(0)] tex: sampler2D[f32] }}\nfn f() {{ let uv = vec2[f32](0.0, 0.0); let c = tex.Sample(uv); }}\n"
        );
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(func) = &module.root.statements[1] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[1] else {
            panic!("expected variable");
        };
        let Expression::Intrinsic(intrinsic) = var.initial_expression.as_deref().unwrap() else {
            panic!("expected intrinsic");
        };
        assert_eq!(intrinsic.intrinsic, IntrinsicKind::TextureSampleImplicitLod);
        assert_eq!(intrinsic.parameters.len(), 2);
        assert_eq!(
            intrinsic.cached_type.as_ref().unwrap().to_string(),
            "vec4[f32]"
        );
    }

    #[test]
    fn test_alias_declaration_resolves_single_hop() {
        let source = format!(
            "{HEADER}struct Data {{ value: f32 }}\nalias D = Data;\nalias D2 = D;\nfn f(input: D2) -> f32 {{ return input.value; }}\n"
        );
        let (_, ctx) = resolve_source(&source).unwrap();
        // both aliases point directly at the struct
        for (_, alias) in ctx.aliases.iter() {
            assert_eq!(alias.target.kind, IdentifierKind::Struct);
        }
    }

    #[test]
    fn test_const_requires_constant() {
        let source = format!("{HEADER}fn f() {{ }}\nconst X: i32 = 1 + 2;\n");
        let (_, ctx) = resolve_source(&source).unwrap();
        let constant = ctx
            .constants
            .iter()
            .find(|(_, data)| data.name == "X")
            .map(|(_, data)| data.value.clone())
            .unwrap();
        assert_eq!(constant, Some(ConstantValue::i32(3)));
    }

    #[test]
    fn test_option_default_and_override() {
        let source = format!("{HEADER}option UseInt: bool = false;\n");
        let (_, ctx) = resolve_source(&source).unwrap();
        let (_, data) = ctx.constants.iter().next().unwrap();
        assert_eq!(data.value, Some(ConstantValue::bool(false)));

        // with an override
        let mut module = parse(&source).unwrap();
        let mut ctx = TransformerContext::new();
        let mut options = FxHashMap::default();
        options.insert(hash_option("UseInt"), ConstantValue::bool(true));
        let mut pass = ResolvePass::new(None, options);
        pass.transform(&mut module, &mut ctx).unwrap();
        let (_, data) = ctx.constants.iter().next().unwrap();
        assert_eq!(data.value, Some(ConstantValue::bool(true)));
    }

    #[test]
    fn test_option_wrong_value_type() {
        let source = format!("{HEADER}option UseInt: bool = false;\n");
        let mut module = parse(&source).unwrap();
        let mut ctx = TransformerContext::new();
        let mut options = FxHashMap::default();
        options.insert(hash_option("UseInt"), ConstantValue::i32(1));
        let mut pass = ResolvePass::new(None, options);
        let err = pass.transform(&mut module, &mut ctx).unwrap_err();
        assert!(err.to_string().contains("conflicting default values"));
    }

    #[test]
    fn test_compute_entry_requires_workgroup() {
        let source = format!("{HEADER}[entry(comp)]\nfn main() {{ }}\n");
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("workgroup"));
    }

    #[test]
    fn test_workgroup_resolution() {
        let source = format!("{HEADER}[entry(comp)]\n[workgroup(8, 8, 1)]\nfn main() {{ }}\n");
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        assert_eq!(func.workgroup_size.as_value(), Some(&[8, 8, 1]));
    }

    #[test]
    fn test_break_outside_loop() {
        let source = format!("{HEADER}fn f() {{ break; }}\n");
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("break must be used inside a loop"));
    }

    #[test]
    fn test_for_loop_counter_type() {
        let source = format!("{HEADER}fn f() {{ for i in 0 -> 10 {{ let x = i; }} }}\n");
        let (_, ctx) = resolve_source(&source).unwrap();
        let counter = ctx
            .variables
            .iter()
            .find(|(_, data)| data.name == "i")
            .map(|(_, data)| data.ty.clone())
            .unwrap();
        assert_eq!(counter, ExpressionType::i32());
    }

    #[test]
    fn test_assign_to_non_place() {
        let source = format!("{HEADER}fn f() {{ 1 = 2; }}\n");
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("not assignable"));
    }

    #[test]
    fn test_swizzle_write_duplicate() {
        let source = format!(
            "{HEADER}fn f() {{ let v = vec2[f32](0.0, 0.0); v.xx = vec2[f32](1.0, 1.0); }}\n"
        );
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("same component twice"));
    }

    #[test]
    fn test_matrix_vector_multiply() {
        let source = format!(
            "{HEADER}fn f(m: mat4[f32]) {{ let v = vec4[f32](0.0, 0.0, 0.0, 1.0); let r = m * v; }}\n"
        );
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[1] else {
            panic!("expected variable");
        };
        assert_eq!(
            var.initial_expression.as_deref().unwrap().cached_type().unwrap().to_string(),
            "vec4[f32]"
        );
    }

    #[test]
    fn test_no_implicit_widening_between_scalars() {
        let source = format!("{HEADER}fn f(a: i32, b: u32) {{ let c = a + b; }}\n");
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("incompatible types"));
    }

    #[test]
    fn test_type_constant() {
        let source = format!("{HEADER}const Big: f32 = f32.Max;\n");
        let (_, ctx) = resolve_source(&source).unwrap();
        let (_, data) = ctx.constants.iter().next().unwrap();
        assert_eq!(
            data.value,
            Some(ConstantValue::Single(ConstantSingleValue::F32(f32::MAX)))
        );
    }

    #[test]
    fn test_feature_gating_f64() {
        let source = format!("{HEADER}fn f() {{ let x: f64 = f64(1.0); }}\n");
        let err = resolve_source(&source).unwrap_err();
        assert!(err.to_string().contains("float64"));

        let gated = "[nzsl_version(\"1.0\")]\n[feature(float64)]\nmodule;\nfn f() { let x: f64 = f64(1.0); }\n";
        resolve_source(gated).unwrap();
    }

    #[test]
    fn test_array_type_and_indexing() {
        let source = format!(
            "{HEADER}fn f() {{ let a = array[f32, 3](1.0, 2.0, 3.0); let x = a[1]; }}\n"
        );
        let (module, _) = resolve_source(&source).unwrap();
        let Statement::DeclareFunction(func) = &module.root.statements[0] else {
            panic!("expected function");
        };
        let Statement::DeclareVariable(var) = &func.statements[1] else {
            panic!("expected variable");
        };
        assert_eq!(
            var.initial_expression.as_deref().unwrap().cached_type(),
            Some(&ExpressionType::f32())
        );
    }

    #[test]
    fn test_named_external_block() {
        let source = format!(
            "{HEADER}struct Data {{ value: f32 }}\nexternal Ext {{ [binding(0)] data: uniform[Data] }}\nfn f() -> f32 {{ return Ext.data.value; }}\n"
        );
        resolve_source(&source).unwrap();
    }
}
