//! Instruction block rendering from snippet selections.

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use promptpack_core::{AppConfig, SnippetCatalog, SnippetCategory};

/// Snippet slot that carries freeform text.
pub const CUSTOM_SNIPPET: &str = "Custom";

const TAG_INDENT: &str = "    ";
const TEXT_INDENT: &str = "        ";

/// What was chosen in one category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySelection {
    /// Chosen snippet names.
    pub names: IndexSet<String>,
    /// Freeform text for the custom slot.
    pub custom: Option<String>,
}

/// Chosen snippets across categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnippetSelection {
    categories: IndexMap<String, CategorySelection>,
}

impl SnippetSelection {
    /// Create an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a named snippet in a category.
    pub fn select(&mut self, category: impl Into<String>, name: impl Into<String>) -> &mut Self {
        self.categories
            .entry(category.into())
            .or_default()
            .names
            .insert(name.into());
        self
    }

    /// Set the custom text of a category.
    pub fn set_custom(&mut self, category: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.categories.entry(category.into()).or_default().custom = Some(text.into());
        self
    }

    /// Selection for a category, if any.
    pub fn get(&self, category: &str) -> Option<&CategorySelection> {
        self.categories.get(category)
    }

    /// Check whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.categories
            .values()
            .all(|c| c.names.is_empty() && c.custom.is_none())
    }
}

/// Renders `<instructions>` blocks.
#[derive(Debug, Clone)]
pub struct InstructionEngine {
    snippets: SnippetCatalog,
    questions: Vec<String>,
}

impl InstructionEngine {
    /// Create an engine over a snippet catalog and canonical questions.
    pub fn new(snippets: SnippetCatalog, questions: Vec<String>) -> Self {
        Self {
            snippets,
            questions,
        }
    }

    /// Create an engine from the application config.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.prompt_snippets.clone(), config.common_questions.clone())
    }

    /// Canonical questions, in order.
    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    /// Snippet catalog.
    pub fn snippets(&self) -> &SnippetCatalog {
        &self.snippets
    }

    /// Render the instruction block.
    ///
    /// Categories follow catalog order and snippets follow definition
    /// order within a category. Questions are listed in canonical order;
    /// selected questions that are not canonical follow in the order given.
    /// Returns an empty string when nothing renders.
    pub fn render<S: AsRef<str>>(&self, selection: &SnippetSelection, questions: &[S]) -> String {
        let mut lines = vec!["<instructions>".to_string()];
        let mut rendered_any = false;

        for (category, items) in &self.snippets {
            let Some(chosen) = selection.get(category) else {
                continue;
            };
            let body = self.render_category(category, items, chosen);
            if body.is_empty() {
                debug!(category, "No snippet text selected, omitting category");
                continue;
            }
            let tag = category_tag(category);
            lines.push(format!("{TAG_INDENT}<{tag}>"));
            lines.extend(body);
            lines.push(format!("{TAG_INDENT}</{tag}>"));
            rendered_any = true;
        }

        for category in selection.categories.keys() {
            if !self.snippets.contains_key(category) {
                warn!(category = %category, "Unknown snippet category");
            }
        }

        let question_lines = self.render_questions(questions);
        if !question_lines.is_empty() {
            lines.push(format!("{TAG_INDENT}<questions>"));
            lines.extend(question_lines);
            lines.push(format!("{TAG_INDENT}</questions>"));
            rendered_any = true;
        }

        if !rendered_any {
            return String::new();
        }
        lines.push("</instructions>".to_string());
        lines.join("\n")
    }

    fn render_category(
        &self,
        category: &str,
        items: &SnippetCategory,
        chosen: &CategorySelection,
    ) -> Vec<String> {
        let mut body = Vec::new();
        let mut custom_done = false;

        for (name, text) in items {
            if name == CUSTOM_SNIPPET {
                custom_done = true;
                if let Some(custom) = &chosen.custom {
                    push_custom(&mut body, custom);
                }
                continue;
            }
            if !chosen.names.contains(name) {
                continue;
            }
            let text = text.trim();
            if text.is_empty() {
                debug!(category, snippet = %name, "Snippet has no text");
                continue;
            }
            body.push(format!("{TEXT_INDENT}{text}"));
        }

        if !custom_done {
            if let Some(custom) = &chosen.custom {
                push_custom(&mut body, custom);
            }
        }

        for name in &chosen.names {
            if name != CUSTOM_SNIPPET && !items.contains_key(name) {
                warn!(category, snippet = %name, "Unknown snippet");
            }
        }
        body
    }

    fn render_questions<S: AsRef<str>>(&self, selected: &[S]) -> Vec<String> {
        let selected: IndexSet<&str> = selected.iter().map(|q| q.as_ref().trim()).collect();
        let mut lines: Vec<String> = self
            .questions
            .iter()
            .filter(|q| selected.contains(q.as_str()))
            .map(|q| format!("{TEXT_INDENT}{q}"))
            .collect();
        lines.extend(
            selected
                .iter()
                .filter(|q| !q.is_empty() && !self.questions.iter().any(|c| c == *q))
                .map(|q| format!("{TEXT_INDENT}{q}")),
        );
        lines
    }
}

fn push_custom(body: &mut Vec<String>, custom: &str) {
    let custom = custom.trim();
    if custom.is_empty() {
        return;
    }
    body.extend(custom.lines().map(|line| format!("{TEXT_INDENT}{line}")));
}

/// Tag name for a category: lowercase, spaces replaced by `_`.
pub fn category_tag(category: &str) -> String {
    category.to_lowercase().replace(' ', "_")
}

/// Join an instruction block and a context document.
pub fn compose_prompt(instructions: &str, document: &str) -> String {
    if instructions.is_empty() {
        return document.to_string();
    }
    format!("{instructions}\n\n{document}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn engine() -> InstructionEngine {
        InstructionEngine::from_config(&AppConfig::default())
    }

    #[test]
    fn test_empty_selection_renders_nothing() {
        assert_eq!(engine().render::<&str>(&SnippetSelection::new(), &[]), "");
    }

    #[test]
    fn test_definition_order_not_selection_order() {
        let mut selection = SnippetSelection::new();
        selection.select("Objective", "Debug").select("Objective", "Review");

        assert_eq!(
            engine().render::<&str>(&selection, &[]),
            "<instructions>\n\
             \x20   <objective>\n\
             \x20       Review the provided context carefully and thoroughly.\n\
             \x20       Try to debug any errors.\n\
             \x20   </objective>\n\
             </instructions>"
        );
    }

    #[test]
    fn test_custom_text_is_trimmed_and_indented() {
        let mut selection = SnippetSelection::new();
        selection
            .select("Output", "XML")
            .set_custom("Output", "\n  First line\nSecond line  \n");

        let rendered = engine().render::<&str>(&selection, &[]);
        assert!(rendered.contains(
            "        Use an XML-styled output format.\n        First line\n        Second line\n"
        ));
    }

    #[test]
    fn test_questions_in_canonical_order() {
        let engine = engine();
        let qs = engine.questions().to_vec();
        let rendered = engine.render(&SnippetSelection::new(), &[qs[2].as_str(), qs[0].as_str()]);

        assert_eq!(
            rendered,
            format!(
                "<instructions>\n    <questions>\n        {}\n        {}\n    </questions>\n</instructions>",
                qs[0], qs[2]
            )
        );
    }

    #[test]
    fn test_category_with_only_empty_snippets_is_omitted() {
        let mut selection = SnippetSelection::new();
        selection.select("Scope", "Custom").select("Process", "CoT");

        let rendered = engine().render::<&str>(&selection, &[]);
        assert!(!rendered.contains("<scope>"));
        assert!(rendered.contains("<process>"));
    }

    #[test]
    fn test_category_tag() {
        assert_eq!(category_tag("Output Format"), "output_format");
    }

    #[test]
    fn test_compose_prompt() {
        assert_eq!(compose_prompt("", "<context>\n</context>"), "<context>\n</context>");
        assert_eq!(compose_prompt("<i/>", "<c/>"), "<i/>\n\n<c/>");
    }
}
