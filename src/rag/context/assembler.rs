//! Context assembly
//!
//! Turns a ranked retrieval result into the passages that go into the prompt:
//! resolve each hit against the corpus, drop extra chunks per document, then
//! accept passages in rank order until the budget is spent.

use crate::data::{CorpusStore, Span};
use crate::retrieval::ScoredEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

use super::templates::PromptTemplates;

/// Unit the context budget is measured in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeUnit {
    /// Unicode scalar values
    #[default]
    Chars,
    /// cl100k BPE tokens
    Tokens,
}

impl SizeUnit {
    /// Size of `text` in this unit
    pub fn measure(&self, text: &str) -> usize {
        match self {
            Self::Chars => text.chars().count(),
            Self::Tokens => match bpe() {
                Some(bpe) => bpe.encode_ordinary(text).len(),
                None => text.chars().count(),
            },
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chars => f.write_str("chars"),
            Self::Tokens => f.write_str("tokens"),
        }
    }
}

impl std::str::FromStr for SizeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Chars),
            "tokens" => Ok(Self::Tokens),
            other => Err(format!("unknown size unit '{}' (expected chars or tokens)", other)),
        }
    }
}

fn bpe() -> Option<&'static CoreBPE> {
    static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();
    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::warn!("cl100k tokenizer unavailable ({}), counting characters instead", e);
            None
        }
    })
    .as_ref()
}

/// Context assembly settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub unit: SizeUnit,
    /// Chunks kept per document, highest ranked first; 0 keeps all
    pub max_chunks_per_document: usize,
    /// Upper bound on passages regardless of budget
    pub max_passages: Option<usize>,
    /// Prompt template name
    pub template: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            unit: SizeUnit::Chars,
            max_chunks_per_document: 1,
            max_passages: Some(3),
            template: "default".to_string(),
        }
    }
}

/// One accepted passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub document_id: String,
    /// Byte range of `text` in the document
    pub span: Span,
    pub text: String,
    pub score: f32,
    /// Size of `text` in the context unit
    pub size: usize,
}

/// Passages in rank order, with `used <= budget`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub passages: Vec<Passage>,
    pub used: usize,
    pub budget: usize,
    pub unit: SizeUnit,
}

impl AssembledContext {
    pub fn empty(budget: usize, unit: SizeUnit) -> Self {
        Self {
            passages: Vec::new(),
            used: 0,
            budget,
            unit,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Distinct document ids in rank order
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for passage in &self.passages {
            if !ids.contains(&passage.document_id) {
                ids.push(passage.document_id.clone());
            }
        }
        ids
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.passages.iter().any(|p| p.document_id == document_id)
    }

    /// Passages rendered for the prompt, each tagged with its source
    pub fn render(&self) -> String {
        self.passages
            .iter()
            .map(|p| format!("[source: {}]\n{}", p.document_id, p.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Builds [`AssembledContext`]s and prompts
pub struct ContextAssembler {
    config: ContextConfig,
    templates: PromptTemplates,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            templates: PromptTemplates::default(),
        }
    }

    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Select passages for `results` within `budget`
    ///
    /// Hits whose document or span no longer resolves are stale: they are
    /// logged and skipped. Acceptance stops at the first passage that does not
    /// fit; only a first passage that alone exceeds the budget is truncated.
    pub fn assemble(&self, results: &[ScoredEntry], corpus: &dyn CorpusStore, budget: usize) -> AssembledContext {
        let unit = self.config.unit;
        let mut context = AssembledContext::empty(budget, unit);
        let mut per_document: HashMap<&str, usize> = HashMap::new();
        let mut candidates: Vec<Passage> = Vec::new();

        for hit in results {
            let Some(document) = corpus.get(&hit.document_id) else {
                tracing::warn!("Stale index entry: document '{}' not in corpus", hit.document_id);
                continue;
            };
            let Some(text) = document.passage(hit.span) else {
                tracing::warn!(
                    "Stale index entry: span {} out of range for document '{}'",
                    hit.span,
                    hit.document_id
                );
                continue;
            };

            let seen = per_document.entry(hit.document_id.as_str()).or_insert(0);
            if self.config.max_chunks_per_document > 0 && *seen >= self.config.max_chunks_per_document {
                continue;
            }
            *seen += 1;

            candidates.push(Passage {
                document_id: hit.document_id.clone(),
                span: hit.span,
                text: text.to_string(),
                score: hit.score,
                size: unit.measure(text),
            });
        }

        if let Some(max) = self.config.max_passages {
            candidates.truncate(max);
        }

        for passage in candidates {
            if context.used + passage.size <= budget {
                context.used += passage.size;
                context.passages.push(passage);
                continue;
            }
            if context.passages.is_empty() {
                if let Some(truncated) = truncate_to_budget(passage, budget, unit) {
                    context.used = truncated.size;
                    context.passages.push(truncated);
                }
            }
            break;
        }

        tracing::debug!(
            "Assembled {} passages ({} of {} {})",
            context.passages.len(),
            context.used,
            budget,
            unit
        );
        context
    }

    /// Fill `template_name` with the rendered context and the query
    pub fn format_prompt(&self, query: &str, context: &AssembledContext, template_name: &str) -> String {
        self.templates.render(template_name, &context.render(), query)
    }
}

/// Longest prefix of `passage` measuring at most `budget`; `None` if empty
fn truncate_to_budget(passage: Passage, budget: usize, unit: SizeUnit) -> Option<Passage> {
    let boundaries: Vec<usize> = passage
        .text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(passage.text.len()))
        .collect();

    // Prefix sizes grow with length, so binary search the largest fitting one
    let (mut lo, mut hi) = (0, boundaries.len() - 1);
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if unit.measure(&passage.text[..boundaries[mid]]) <= budget {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    let mut end = boundaries[lo];
    while end > 0 && unit.measure(&passage.text[..end]) > budget {
        lo -= 1;
        end = boundaries[lo];
    }
    if end == 0 {
        return None;
    }

    let text = passage.text[..end].to_string();
    Some(Passage {
        span: Span::new(passage.span.start, passage.span.start + end),
        size: unit.measure(&text),
        text,
        ..passage
    })
}
