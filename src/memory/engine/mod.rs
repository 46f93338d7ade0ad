//! Context assembly module.

pub mod assembler;

pub use assembler::{AssembledPrompt, ContextAssembler};
