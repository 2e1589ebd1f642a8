//! Prompt templates.
//!
//! Two templates exist on disk, keyed `question_generation` and `testing`.
//! Only the testing template is rendered at run time; the generation template
//! is loaded for completeness so a single template directory serves the whole
//! toolchain. The `user` string accepts the placeholders `{context}`,
//! `{question}` and `{choices}`, substituted literally.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_TESTING_SYSTEM: &str = "You are a careful reading-comprehension expert. \
Read the provided text and answer the question strictly from its content. \
Do not invent information that is not in the text.";

const DEFAULT_TESTING_USER: &str = "Read the following text:\n\n{context}\n\n---\n\n\
Question: {question}\n\nChoices:\n{choices}\n\n\
Pick the correct answer(s) based on the text.\n\
Reply with JSON only, in this exact shape:\n\
{\"answer\": [\"a\"]} for a single choice, or {\"answer\": [\"a\", \"c\"]} for multiple choices.\n\
Do not add any other text.";

/// One prompt template: a system message and a user message with
/// placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// System message sent verbatim.
    pub system: String,
    /// User message with `{context}` / `{question}` / `{choices}` holes.
    pub user: String,
    /// Free-form notes about what the template guarantees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,
}

impl PromptTemplate {
    /// Substitute the placeholders and return `(system, user)`.
    #[must_use]
    pub fn render(
        &self,
        context: &str,
        question: &str,
        choices: &BTreeMap<String, String>,
    ) -> (String, String) {
        let user = self
            .user
            .replace("{context}", context)
            .replace("{question}", question)
            .replace("{choices}", &format_choices(choices));
        (self.system.clone(), user)
    }
}

/// Format choices as one `key. text` line per option, in key order.
#[must_use]
pub fn format_choices(choices: &BTreeMap<String, String>) -> String {
    choices
        .iter()
        .map(|(key, text)| format!("{key}. {text}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Templates available to the harness.
#[derive(Debug, Clone)]
pub struct PromptStore {
    testing: PromptTemplate,
    generation: Option<PromptTemplate>,
}

impl Default for PromptStore {
    fn default() -> Self {
        Self {
            testing: PromptTemplate {
                system: DEFAULT_TESTING_SYSTEM.to_string(),
                user: DEFAULT_TESTING_USER.to_string(),
                constraints: None,
            },
            generation: None,
        }
    }
}

impl PromptStore {
    /// Load templates from `dir`, falling back to the built-in testing
    /// template for anything missing. Pass `None` for defaults only.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut store = PromptStore::default();
        let Some(dir) = dir else {
            return Ok(store);
        };

        let testing_path = dir.join("testing.json");
        if testing_path.exists() {
            let template = load_template(&testing_path)?;
            for placeholder in ["{context}", "{question}", "{choices}"] {
                if !template.user.contains(placeholder) {
                    return Err(Error::template(format!(
                        "{}: user template is missing the {placeholder} placeholder",
                        testing_path.display()
                    )));
                }
            }
            store.testing = template;
            log::info!("loaded testing template from {}", testing_path.display());
        }

        // The generation template has its own placeholder contract and is
        // not rendered by this harness; load it unvalidated.
        let generation_path = dir.join("question_generation.json");
        if generation_path.exists() {
            store.generation = Some(load_template(&generation_path)?);
        }

        Ok(store)
    }

    /// The template used by the execution pipeline.
    #[must_use]
    pub fn testing(&self) -> &PromptTemplate {
        &self.testing
    }

    /// The question generation template, when present on disk.
    #[must_use]
    pub fn generation(&self) -> Option<&PromptTemplate> {
        self.generation.as_ref()
    }
}

fn load_template(path: &Path) -> Result<PromptTemplate> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| Error::template(format!("{}: {e}", path.display())))
}
