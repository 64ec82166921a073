//! nzslc-drv - Compilation pipeline driver
//!
//! Ties the phases together: lex, parse, run the semantic pipeline, hand
//! the resolved module to a back-end. Back-ends are external
//! collaborators; this crate only defines the contract they consume: a
//! fully-resolved module plus the [`BackendParameters`] they were invoked
//! with.

use nzslc_par::ast::{ConstantValue, Module, OptionHash};
use nzslc_sem::module_resolver::ModuleResolver;
use nzslc_sem::{
    register_canonical_passes, CompilationOptions, TransformerContext, TransformerExecutor,
};
use nzslc_util::Result;
use rustc_hash::FxHashMap;
use std::sync::Arc;

bitflags::bitflags! {
    /// Pass groups a back-end can request.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BackendPasses: u32 {
        const OPTIMIZE = 1 << 0;
        const REMOVE_DEAD_CODE = 1 << 1;
        const RESOLVE = 1 << 2;
        const TARGET_REQUIRED = 1 << 3;
        const VALIDATE = 1 << 4;
    }
}

/// How much source-location / name metadata a back-end embeds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DebugLevel {
    None,
    Minimal,
    #[default]
    Regular,
    Full,
}

/// Parameters a back-end is invoked with.
#[derive(Clone, Default)]
pub struct BackendParameters {
    pub module_resolver: Option<Arc<dyn ModuleResolver>>,
    pub option_values: FxHashMap<OptionHash, ConstantValue>,
    pub passes: BackendPasses,
    pub debug_level: DebugLevel,
}

impl Default for BackendPasses {
    fn default() -> Self {
        BackendPasses::RESOLVE | BackendPasses::TARGET_REQUIRED | BackendPasses::VALIDATE
    }
}

/// A target code generator. The driver runs the pipeline; the back-end
/// consumes the resolved module and produces its artifact plus whatever
/// side tables (binding assignments, ...) it exposes.
pub trait Backend {
    type Artifact;

    fn generate(
        &mut self,
        module: &Module,
        ctx: &TransformerContext,
        parameters: &BackendParameters,
    ) -> Result<Self::Artifact>;
}

/// Runs the canonical pipeline over an already-parsed module.
pub fn transform(module: &mut Module, parameters: &BackendParameters) -> Result<TransformerContext> {
    let options = CompilationOptions {
        option_values: parameters.option_values.clone(),
        module_resolver: parameters.module_resolver.clone(),
        partial_compilation: false,
        keep_constant_declarations: false,
        remove_dead_code: parameters.passes.contains(BackendPasses::REMOVE_DEAD_CODE),
    };

    let mut executor = TransformerExecutor::new();
    register_canonical_passes(&mut executor, &options);

    let mut ctx = TransformerContext::new();
    ctx.partial_compilation = options.partial_compilation;
    executor.transform(module, &mut ctx)?;
    Ok(ctx)
}

/// Lex + parse + pipeline in one call.
pub fn compile_source(
    source: &str,
    file_path: Option<&str>,
    parameters: &BackendParameters,
) -> Result<(Module, TransformerContext)> {
    let mut module = nzslc_par::parse_source(source, file_path)?;
    let ctx = transform(&mut module, parameters)?;
    Ok((module, ctx))
}

/// Compiles and hands the result to a back-end.
pub fn compile_with_backend<B: Backend>(
    source: &str,
    file_path: Option<&str>,
    parameters: &BackendParameters,
    backend: &mut B,
) -> Result<B::Artifact> {
    let (module, ctx) = compile_source(source, file_path, parameters)?;
    backend.generate(&module, &ctx, parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_passes() {
        let passes = BackendPasses::default();
        assert!(passes.contains(BackendPasses::RESOLVE));
        assert!(passes.contains(BackendPasses::VALIDATE));
        assert!(!passes.contains(BackendPasses::REMOVE_DEAD_CODE));
    }

    #[test]
    fn test_backend_receives_resolved_module() {
        struct CountingBackend;
        impl Backend for CountingBackend {
            type Artifact = usize;

            fn generate(
                &mut self,
                module: &Module,
                _ctx: &TransformerContext,
                _parameters: &BackendParameters,
            ) -> Result<usize> {
                Ok(module.root.statements.len())
            }
        }

        let artifact = compile_with_backend(
            "[nzsl_version(\"1.0\")]\nmodule;\n[entry(frag)]\nfn main() { }\n",
            None,
            &BackendParameters::default(),
            &mut CountingBackend,
        )
        .unwrap();
        assert_eq!(artifact, 1);
    }
}
