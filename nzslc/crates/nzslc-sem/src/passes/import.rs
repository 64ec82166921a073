//! Import resolution.
//!
//! The resolve pass already consulted the module resolver, registered the
//! imported modules and bound the imported identifiers as aliases; what
//! remains of an `import` statement is bookkeeping. This pass drops the
//! statements so later passes and back-ends see a closed tree, with the
//! imported modules attached to [`Module::imported_modules`].

use crate::context::TransformerContext;
use crate::executor::Pass;
use crate::transformer::{transform_module, StatementTransform, TransformState, Transformer};
use nzslc_par::ast::{Module, Statement};
use nzslc_util::Result;

#[derive(Default)]
pub struct ImportResolverPass;

impl Transformer for ImportResolverPass {
    fn transform_statement(
        &mut self,
        stmt: &mut Statement,
        _state: &mut TransformState,
    ) -> Result<StatementTransform> {
        match stmt {
            Statement::Import(_) => Ok(StatementTransform::Remove),
            _ => Ok(StatementTransform::VisitChildren),
        }
    }
}

impl Pass for ImportResolverPass {
    fn name(&self) -> &'static str {
        "import resolution"
    }

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        transform_module(self, module, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nzslc_par::ast::{ImportStatement, Metadata};
    use nzslc_util::SourceLocation;

    #[test]
    fn test_import_statements_are_dropped() {
        let mut module = Module::new(Metadata::default());
        module.root.statements.push(Statement::Import(ImportStatement {
            module_name: String::from("Engine.Utils"),
            identifiers: Vec::new(),
            location: SourceLocation::default(),
        }));

        let mut ctx = TransformerContext::new();
        ImportResolverPass
            .transform(&mut module, &mut ctx)
            .unwrap();
        assert!(module.root.statements.is_empty());
    }
}
