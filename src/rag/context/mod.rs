//! Context assembly and prompt construction

mod assembler;
mod templates;

pub use assembler::{AssembledContext, ContextAssembler, ContextConfig, Passage, SizeUnit};
pub use templates::{PromptTemplates, CITATION_INSTRUCTION};
