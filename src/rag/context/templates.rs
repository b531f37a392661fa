//! Prompt templates for RAG generation
//!
//! Templates use `{context}`, `{query}` and `{citation_instruction}`
//! placeholders. The context arrives with each passage tagged
//! `[source: <document id>]`.

use std::collections::HashMap;

/// Asks the model to cite with the same tags the context carries
pub const CITATION_INSTRUCTION: &str =
    "After each fact, cite the passage it came from by repeating the source tag printed above that passage.";

/// Prompt templates for different use cases
pub struct PromptTemplates {
    templates: HashMap<String, String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        let mut templates = HashMap::new();

        templates.insert(
            "default".to_string(),
            concat!(
                "Based on the following context from uploaded documents, please answer the question. ",
                "If the answer is not in the context, say you don't have enough information.\n\n",
                "{citation_instruction}\n\n",
                "Context:\n{context}\n\n",
                "Question: {query}\n\n",
                "Answer:"
            )
            .to_string(),
        );

        templates.insert(
            "concise".to_string(),
            concat!(
                "Answer the following question using only the provided context. Be concise and direct.\n",
                "{citation_instruction}\n\n",
                "Context:\n{context}\n\n",
                "Question: {query}\n\n",
                "Answer:"
            )
            .to_string(),
        );

        // For small local models that lose track of long instructions
        templates.insert(
            "simple".to_string(),
            concat!("Answer based on this info:\n\n", "{context}\n\n", "Q: {query}\n", "A:").to_string(),
        );

        Self { templates }
    }
}

impl PromptTemplates {
    /// Create a new empty template collection
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Get a template by name, falling back to "default" if not found
    pub fn get(&self, name: &str) -> &str {
        self.templates
            .get(name)
            .or_else(|| self.templates.get("default"))
            .map(|s| s.as_str())
            .unwrap_or("{context}\n\n{query}")
    }

    /// Register a custom template
    pub fn register(&mut self, name: &str, template: &str) {
        self.templates.insert(name.to_string(), template.to_string());
    }

    /// Check if a template exists
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// All template names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Fill the named template
    pub fn render(&self, name: &str, context: &str, query: &str) -> String {
        self.get(name)
            .replace("{citation_instruction}", CITATION_INSTRUCTION)
            .replace("{context}", context)
            .replace("{query}", query)
    }
}
