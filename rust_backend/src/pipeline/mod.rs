//! Reading SNANA campaign outputs into registered collections.

pub mod assembler;
pub mod registry;
pub mod scratch;

pub use assembler::{BuiltVariant, CollectionAssembler, ReadOptions, VariantOutcome};
pub use registry::CollectionRegistry;
pub use scratch::ScratchResolver;
