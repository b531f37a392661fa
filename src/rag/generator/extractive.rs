//! Offline extractive generator
//!
//! Answers by quoting the start of the first tagged passage in the prompt.
//! Used when no model server is available, and in tests.

use super::{Generator, SamplingParams};
use crate::error::Result;
use crate::utils::truncate_chars;

const SOURCE_TAG: &str = "[source: ";

/// Quotes the best passage instead of generating
pub struct ExtractiveGenerator {
    excerpt_chars: usize,
}

impl ExtractiveGenerator {
    pub fn new(excerpt_chars: usize) -> Self {
        Self { excerpt_chars }
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new(300)
    }
}

/// First line-leading `[source: id]` tag in `prompt` and the passage text under it
fn first_passage(prompt: &str) -> Option<(&str, &str)> {
    let line_start = if prompt.starts_with(SOURCE_TAG) {
        0
    } else {
        prompt.find(&format!("\n{}", SOURCE_TAG))? + 1
    };
    let start = line_start + SOURCE_TAG.len();
    let rest = &prompt[start..];
    let close = rest.find(']')?;
    let id = &rest[..close];
    let body = rest[close + 1..].trim_start_matches('\n');
    let end = body.find("\n\n").unwrap_or(body.len());
    Some((id, body[..end].trim()))
}

impl Generator for ExtractiveGenerator {
    fn generate(&self, prompt: &str, _params: &SamplingParams) -> Result<String> {
        let Some((id, text)) = first_passage(prompt) else {
            return Ok("I don't have enough information in the uploaded documents to answer that.".to_string());
        };

        let excerpt = truncate_chars(text, self.excerpt_chars);
        Ok(format!("Based on the uploaded documents:\n\n{} [source: {}]", excerpt, id))
    }

    fn model_name(&self) -> &str {
        "extractive"
    }
}
