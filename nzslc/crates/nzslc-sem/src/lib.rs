//! nzslc-sem - Semantic middle-end
//!
//! The middle-end lowers the parser's surface tree into a fully-resolved,
//! type-checked, target-ready IR through an ordered pipeline of
//! AST-to-AST transformation passes sharing a [`TransformerContext`] of
//! interned identifier tables.
//!
//! The canonical target-complete pipeline (built by
//! [`register_canonical_passes`]) is:
//!
//! 1. resolve (name binding + type inference)
//! 2. import resolution
//! 3. constant propagation
//! 4. constant removal
//! 5. literal typing
//! 6. alias expansion
//! 7. target-requested lowerings (branch split, for-to-while, loop
//!    unrolling, compound assignment, matrix, swizzle, std140
//!    emulation, struct-assignment split)
//! 8. binding resolution
//! 9. unused-symbol elimination
//! 10. validation

pub mod context;
pub mod executor;
pub mod intrinsics;
pub mod module_resolver;
pub mod passes;
pub mod transformer;
pub mod type_rules;

pub use context::{
    AliasData, ConstantData, ExternalBlockData, FunctionData, IdentifierTable, IdentifierTarget,
    IntrinsicData, ModuleData, PartialType, StructData, TransformerContext, TypeContent, TypeData,
    TypeParameter, VariableData,
};
pub use executor::{Pass, TransformerExecutor};
pub use module_resolver::ModuleResolver;
pub use transformer::{
    ExpressionTransform, StatementTransform, TransformState, Transformer, TransformerFlags,
};

use nzslc_par::ast::{ConstantValue, OptionHash};
use rustc_hash::FxHashMap;

/// Options driving a full compilation pipeline.
#[derive(Clone, Default)]
pub struct CompilationOptions {
    pub option_values: FxHashMap<OptionHash, ConstantValue>,
    pub module_resolver: Option<std::sync::Arc<dyn ModuleResolver>>,
    pub partial_compilation: bool,
    /// Keep `const` and `option` declarations in the tree instead of
    /// stripping them after substitution.
    pub keep_constant_declarations: bool,
    /// Remove dead declarations before validation.
    pub remove_dead_code: bool,
}

/// Registers the canonical pass order on an executor.
pub fn register_canonical_passes(executor: &mut TransformerExecutor, options: &CompilationOptions) {
    executor.add_pass(passes::ResolvePass::new(
        options.module_resolver.clone(),
        options.option_values.clone(),
    ));
    executor.add_pass(passes::ImportResolverPass::default());
    executor.add_pass(passes::ConstantPropagationPass::default());
    executor.add_pass(passes::ConstantRemovalPass {
        remove_declarations: !options.keep_constant_declarations,
    });
    executor.add_pass(passes::LiteralPass::default());
    executor.add_pass(passes::AliasPass::default());
    executor.add_pass(passes::BranchSplitterPass::default());
    executor.add_pass(passes::ForToWhilePass::default());
    executor.add_pass(passes::LoopUnrollPass::default());
    executor.add_pass(passes::CompoundAssignmentPass::default());
    executor.add_pass(passes::MatrixPass::default());
    executor.add_pass(passes::SwizzlePass::default());
    executor.add_pass(passes::Std140EmulationPass::default());
    executor.add_pass(passes::UniformStructToStd140Pass::default());
    executor.add_pass(passes::StructAssignmentPass::default());
    executor.add_pass(passes::BindingResolverPass::default());
    if options.remove_dead_code {
        executor.add_pass(passes::EliminateUnusedPass::default());
    }
    executor.add_pass(passes::ValidationPass::default());
}
