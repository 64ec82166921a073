//! Pass pipeline executor.
//!
//! The executor runs an ordered list of passes over a module. Each pass
//! runs to completion over the whole module (imported modules included)
//! before the next pass starts; within a module every pass observes all
//! prior passes' effects. Errors abort the pipeline at the first failing
//! pass, with the original span intact.

use crate::context::TransformerContext;
use nzslc_par::ast::Module;
use nzslc_util::Result;

/// A pipeline pass: a named `Module -> Module` transformation.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()>;
}

/// Ordered pass list.
#[derive(Default)]
pub struct TransformerExecutor {
    passes: Vec<Box<dyn Pass>>,
}

impl TransformerExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass<P: Pass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs every pass in order.
    pub fn transform(&mut self, module: &mut Module, ctx: &mut TransformerContext) -> Result<()> {
        for pass in &mut self.passes {
            pass.transform(module, ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nzslc_par::ast::Metadata;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingPass {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Pass for RecordingPass {
        fn name(&self) -> &'static str {
            self.name
        }

        fn transform(&mut self, _module: &mut Module, _ctx: &mut TransformerContext) -> Result<()> {
            self.log.borrow_mut().push(self.name);
            Ok(())
        }
    }

    #[test]
    fn test_passes_run_in_declared_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut executor = TransformerExecutor::new();
        for name in ["first", "second", "third"] {
            executor.add_pass(RecordingPass {
                name,
                log: log.clone(),
            });
        }

        let mut module = Module::new(Metadata::default());
        let mut ctx = TransformerContext::new();
        executor.transform(&mut module, &mut ctx).unwrap();

        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }
}
