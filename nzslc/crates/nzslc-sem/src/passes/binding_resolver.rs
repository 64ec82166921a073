//! Binding resolution.
//!
//! Assigns a concrete `(set, binding)` pair to every external variable.
//! `auto_binding` externals are numbered after all explicit entries, by
//! scanning the used indices of their set and taking the first free
//! range; an external of array type consumes as many contiguous bindings
//! as its length. Externals under a `[cond(...)]` statement get their own
//! numbering scope so mutually-exclusive branches can share bindings.

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::transformer::{
    transform_module, visit_statement_children, StatementTransform, TransformState, Transformer,
};
use nzslc_par::ast::*;
use nzslc_util::{CompilationError, Error, Result, SourceLocation};
use rustc_hash::FxHashMap;

#[derive(Default)]
pub struct BindingResolverPass {
    /// binding key -> conditional scope that claimed it (0 =
    /// unconditional)
    used_binding_indexes: FxHashMap<u64, u32>,
    current_conditional_index: u32,
    next_conditional_index: u32,
}

fn binding_key(set: u32, binding: u32) -> u64 {
    (u64::from(set)) << 32 | u64::from(binding)
}

impl BindingResolverPass {
    fn register_binding(
        &mut self,
        count: u32,
        set: u32,
        binding: u32,
        location: &SourceLocation,
    ) -> Result<()> {
        for offset in 0..count {
            let key = binding_key(set, binding + offset);
            if let Some(&owner) = self.used_binding_indexes.get(&key) {
                if owner == 0 || owner == self.current_conditional_index {
                    return Err(Error::new(
                        location.clone(),
                        CompilationError::ExtBindingAlreadyUsed {
                            set,
                            binding: binding + offset,
                        },
                    ));
                }
            }
            self.used_binding_indexes
                .insert(key, self.current_conditional_index);
        }
        Ok(())
    }

    fn binding_count(ty: Option<&ExpressionType>) -> u32 {
        match ty {
            Some(ExpressionType::Array(array)) => array.length,
            _ => 1,
        }
    }

    fn resolve_external(
        &mut self,
        external: &mut DeclareExternalStatement,
        state: &mut TransformState,
    ) -> Result<()> {
        let partial = state.ctx.partial_compilation;

        let default_set = match &external.binding_set {
            ExpressionValue::None => Some(0),
            ExpressionValue::Value(set) => Some(*set),
            ExpressionValue::Expression(expr) => {
                if !partial {
                    return Err(Error::new(
                        expr.location().clone(),
                        CompilationError::ConstantExpressionRequired,
                    ));
                }
                None
            }
        };

        let auto_binding = match &external.auto_binding {
            ExpressionValue::None => Some(false),
            ExpressionValue::Value(flag) => Some(*flag),
            ExpressionValue::Expression(expr) => {
                if !partial {
                    return Err(Error::new(
                        expr.location().clone(),
                        CompilationError::ConstantExpressionRequired,
                    ));
                }
                None
            }
        };

        // first walk: install the default set, register explicit bindings
        // and queue the auto ones
        let mut auto_entries = Vec::new();
        for (index, var) in external.external_vars.iter_mut().enumerate() {
            let Some(var_type) = var.ty.as_value() else {
                if !partial {
                    return Err(Error::new(
                        var.location.clone(),
                        nzslc_util::AstError::MissingType,
                    ));
                }
                continue;
            };

            // push constants take no binding
            if matches!(var_type, ExpressionType::PushConstant(_)) {
                continue;
            }

            if !var.binding_set.has_value() {
                if let Some(set) = default_set {
                    var.binding_set = ExpressionValue::Value(set);
                }
            }

            if !var.binding_index.has_value() {
                match auto_binding {
                    Some(false) => {
                        return Err(Error::new(
                            var.location.clone(),
                            CompilationError::ExtMissingBindingIndex,
                        ))
                    }
                    Some(true) if var.binding_set.is_resolved() => auto_entries.push(index),
                    _ => {}
                }
            }

            if let (Some(&set), Some(&binding)) =
                (var.binding_set.as_value(), var.binding_index.as_value())
            {
                let count = Self::binding_count(var.ty.as_value());
                let location = var.location.clone();
                self.register_binding(count, set, binding, &location)?;
            }
        }

        // second walk: number the auto-binding entries
        for index in auto_entries {
            let var = &mut external.external_vars[index];
            let set = *var.binding_set.as_value().expect("checked above");
            let count = Self::binding_count(var.ty.as_value());

            let mut binding = 0u32;
            'search: loop {
                for offset in 0..count {
                    if self
                        .used_binding_indexes
                        .contains_key(&binding_key(set, binding + offset))
                    {
                        binding += offset + 1;
                        continue 'search;
                    }
                }
                break;
            }

            var.binding_index = ExpressionValue::Value(binding);
            let location = var.location.clone();
            self.register_binding(count, set, binding, &location)?;
        }

        Ok(())
    }
}

impl Transformer for BindingResolverPass {
    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        state: &mut TransformState,
    ) -> Result<StatementTransform> {
        match stmt {
            Statement::Conditional(_) => {
                // a conditional branch numbers its bindings in its own
                // scope
                let previous = self.current_conditional_index;
                self.current_conditional_index = self.next_conditional_index;
                self.next_conditional_index += 1;
                visit_statement_children(self, stmt, state)?;
                self.current_conditional_index = previous;
                Ok(StatementTransform::DontVisitChildren)
            }
            Statement::DeclareExternal(external) => {
                self.resolve_external(external, state)?;
                Ok(StatementTransform::DontVisitChildren)
            }
            _ => Ok(StatementTransform::VisitChildren),
        }
    }
}

impl Pass for BindingResolverPass {
    fn name(&self) -> &'static str {
        "binding resolver"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        self.used_binding_indexes.clear();
        self.current_conditional_index = 0;
        self.next_conditional_index = 1;
        transform_module(self, module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::resolve::ResolvePass;
    use nzslc_par::parse;

    fn run(source: &str) -> Result<Module> {
        let mut module = parse(source)?;
        let mut ctx = TransformerContext::new();
        ResolvePass::new(None, FxHashMap::default()).transform(&mut module, &mut ctx)?;
        BindingResolverPass::default().transform(&mut module, &mut ctx)?;
        Ok(module)
    }

    const HEADER: &str = "[nzsl_version(\"1.0\")]\nmodule;\nstruct A { v: f32 }\nstruct B { v: f32 }\nstruct C { v: f32 }\n";

    fn external_bindings(module: &Module, statement_index: usize) -> Vec<(String, u32, u32)> {
        let Statement::DeclareExternal(external) = &module.root.statements[statement_index]
        else {
            panic!("expected external block");
        };
        external
            .external_vars
            .iter()
            .map(|var| {
                (
                    var.name.clone(),
                    *var.binding_set.as_value().unwrap(),
                    *var.binding_index.as_value().unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_auto_binding_assignment() {
        let source = format!(
            "{HEADER}[auto_binding]\nexternal {{ a: uniform[A], [binding(0)] b: uniform[B], c: uniform[C] }}\n"
        );
        let module = run(&source).unwrap();
        let bindings = external_bindings(&module, 3);
        // b keeps its explicit binding 0; a and c are numbered around it
        assert_eq!(
            bindings,
            vec![
                (String::from("a"), 0, 1),
                (String::from("b"), 0, 0),
                (String::from("c"), 0, 2),
            ]
        );
    }

    #[test]
    fn test_missing_binding_without_auto() {
        let source = format!("{HEADER}external {{ a: uniform[A] }}\n");
        let err = run(&source).unwrap_err();
        assert!(err.to_string().contains("requires a binding index"));
    }

    #[test]
    fn test_duplicate_binding() {
        let source = format!(
            "{HEADER}external {{ [binding(0)] a: uniform[A], [binding(0)] b: uniform[B] }}\n"
        );
        let err = run(&source).unwrap_err();
        assert!(err
            .to_string()
            .contains("binding (set=0, binding=0) is already in use"));
    }

    #[test]
    fn test_array_consumes_contiguous_bindings() {
        let source = format!(
            "{HEADER}[auto_binding]\nexternal {{ [binding(1)] taken: uniform[A], textures: array[sampler2D[f32], 3], single: uniform[B] }}\n"
        );
        let module = run(&source).unwrap();
        let bindings = external_bindings(&module, 3);
        // the 3-element array cannot use 0 (range 0..3 collides with 1),
        // so it lands at 2..5 and the next free slot for `single` is 0
        assert_eq!(bindings[0], (String::from("taken"), 0, 1));
        assert_eq!(bindings[1], (String::from("textures"), 0, 2));
        assert_eq!(bindings[2], (String::from("single"), 0, 0));
    }

    #[test]
    fn test_explicit_set_attribute() {
        let source = format!(
            "{HEADER}[set(2), auto_binding]\nexternal {{ a: uniform[A], b: uniform[B] }}\n"
        );
        let module = run(&source).unwrap();
        let bindings = external_bindings(&module, 3);
        assert_eq!(bindings[0], (String::from("a"), 2, 0));
        assert_eq!(bindings[1], (String::from("b"), 2, 1));
    }
}
