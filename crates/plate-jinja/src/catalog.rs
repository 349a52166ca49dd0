use std::fmt;
use std::sync::Arc;

use plate_core::{CommandError, Editor, TextRange};
use serde_json::json;

use crate::codec::Params;
use crate::config::DEFAULT_MAX_RESULTS;
use crate::node::try_insert_template;
use crate::registry::TemplateRegistry;

/// What an executor receives: the text span of the trigger and query, which
/// executors delete before acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub range: TextRange,
}

pub type CommandAction =
    Arc<dyn Fn(&mut Editor, &CommandContext) -> Result<(), CommandError> + Send + Sync>;

#[derive(Clone)]
pub struct CommandItem {
    pub title: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    action: CommandAction,
}

impl CommandItem {
    pub fn new(
        title: impl Into<String>,
        action: impl Fn(&mut Editor, &CommandContext) -> Result<(), CommandError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            title: title.into(),
            aliases: Vec::new(),
            description: None,
            action: Arc::new(action),
        }
    }

    /// Duplicates are dropped; first occurrence wins.
    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for alias in aliases {
            let alias = alias.into();
            if !self.aliases.contains(&alias) {
                self.aliases.push(alias);
            }
        }
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Case-insensitive prefix match on the title or any alias.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        std::iter::once(&self.title)
            .chain(self.aliases.iter())
            .any(|name| name.to_lowercase().starts_with(&query))
    }

    /// Runs the action as one undo step; a failing action leaves the document
    /// as it was, trigger text included.
    pub fn execute(&self, editor: &mut Editor, context: &CommandContext) -> Result<(), CommandError> {
        editor.batch(|editor| (self.action)(editor, context))
    }
}

impl fmt::Debug for CommandItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandItem")
            .field("title", &self.title)
            .field("aliases", &self.aliases)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct CommandCatalog {
    items: Vec<CommandItem>,
    max_results: usize,
}

impl Default for CommandCatalog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl CommandCatalog {
    pub fn new(items: Vec<CommandItem>) -> Self {
        Self {
            items,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn push(&mut self, item: CommandItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[CommandItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Matching items in catalog order, capped at `max_results`.
    pub fn filter(&self, query: &str) -> Vec<CommandItem> {
        self.items
            .iter()
            .filter(|item| item.matches(query))
            .take(self.max_results)
            .cloned()
            .collect()
    }

    /// Block formatting commands followed by one entry per registered
    /// template.
    pub fn standard(templates: Arc<TemplateRegistry>) -> Self {
        let mut items = vec![
            block_item("Text", ["p", "paragraph"], "block.set_paragraph", None),
            block_item("Heading 1", ["h1"], "block.set_heading", Some(json!({ "level": 1 }))),
            block_item("Heading 2", ["h2"], "block.set_heading", Some(json!({ "level": 2 }))),
            block_item("Heading 3", ["h3"], "block.set_heading", Some(json!({ "level": 3 }))),
            block_item("Bullet List", ["ul", "bullet"], "list.toggle_bulleted", None),
            block_item("Numbered List", ["ol", "ordered"], "list.toggle_ordered", None),
            block_item("Divider", ["hr"], "core.insert_divider", None),
        ];

        for (id, definition) in templates.iter() {
            let template_id = id.to_string();
            let registry = templates.clone();
            let mut item = CommandItem::new(definition.display_name.clone(), move |editor, context| {
                delete_trigger(editor, context)?;
                try_insert_template(editor, &registry, &template_id, Params::new())
                    .map_err(|err| CommandError::new(err.to_string()))
            })
            .aliases([id]);
            if !definition.description.is_empty() {
                item = item.description(definition.description.clone());
            }
            items.push(item);
        }

        Self::new(items)
    }
}

fn block_item<const N: usize>(
    title: &str,
    aliases: [&str; N],
    command: &'static str,
    args: Option<serde_json::Value>,
) -> CommandItem {
    CommandItem::new(title, move |editor, context| {
        delete_trigger(editor, context)?;
        editor.run_command(command, args.clone())
    })
    .aliases(aliases)
}

fn delete_trigger(editor: &mut Editor, context: &CommandContext) -> Result<(), CommandError> {
    editor
        .delete_text_range(&context.range)
        .map_err(|err| CommandError::new(format!("Failed to remove trigger text: {err}")))
}
