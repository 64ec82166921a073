//! The pass pipeline.
//!
//! One module per pass; [`crate::register_canonical_passes`] wires them in
//! the canonical order.

pub mod alias;
pub mod binding_resolver;
pub mod branch_splitter;
pub mod compound_assignment;
pub mod constant_propagation;
pub mod constant_removal;
pub mod eliminate_unused;
pub mod for_to_while;
pub mod import;
pub mod index_remapper;
pub mod literal;
pub mod loop_unroll;
pub mod matrix;
pub mod resolve;
pub mod std140;
pub mod struct_assignment;
pub mod swizzle;
pub mod validation;

pub use alias::AliasPass;
pub use binding_resolver::BindingResolverPass;
pub use branch_splitter::BranchSplitterPass;
pub use compound_assignment::CompoundAssignmentPass;
pub use constant_propagation::ConstantPropagationPass;
pub use constant_removal::ConstantRemovalPass;
pub use eliminate_unused::EliminateUnusedPass;
pub use for_to_while::ForToWhilePass;
pub use import::ImportResolverPass;
pub use index_remapper::IndexRemapperPass;
pub use literal::LiteralPass;
pub use loop_unroll::LoopUnrollPass;
pub use matrix::MatrixPass;
pub use resolve::ResolvePass;
pub use std140::{Std140EmulationPass, UniformStructToStd140Pass};
pub use struct_assignment::StructAssignmentPass;
pub use swizzle::SwizzlePass;
pub use validation::ValidationPass;
