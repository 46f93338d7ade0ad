//! Prompt construction modules.

pub mod prompt_builder;

pub use prompt_builder::{PromptParts, build_prompt_block, build_transcript_prompt};
