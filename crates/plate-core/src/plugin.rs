use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{
    AttrPatch, Attrs, Document, Editor, ElementNode, Node, Point, Selection, TextNode, VoidNode,
    clamp_to_char_boundary, node_ref,
};
use crate::ops::{Op, Transaction};

#[derive(Debug, Clone)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandError {}

#[derive(Debug, Clone)]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type CommandHandler =
    Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>;

pub type QueryHandler = Arc<dyn Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: QueryHandler,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: String,
    pub role: NodeRole,
    pub is_void: bool,
    pub children: ChildConstraint,
}

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op>;
}

pub trait PlatePlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    node_specs: HashMap<String, NodeSpec>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn PlatePlugin>>) -> Result<Self, String> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    pub fn core() -> Self {
        let plugins: Vec<Box<dyn PlatePlugin>> = vec![
            Box::new(CoreParagraphPlugin),
            Box::new(CoreDividerPlugin),
            Box::new(CoreNormalizePlugin),
        ];
        Self::new(plugins).expect("core registry must be valid")
    }

    pub fn richtext() -> Self {
        let plugins: Vec<Box<dyn PlatePlugin>> = vec![
            Box::new(CoreParagraphPlugin),
            Box::new(CoreDividerPlugin),
            Box::new(CoreNormalizePlugin),
            Box::new(HeadingPlugin),
            Box::new(ListPlugin),
            Box::new(ImagePlugin),
        ];
        Self::new(plugins).expect("richtext registry must be valid")
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn PlatePlugin>) -> Result<(), String> {
        for spec in plugin.node_specs() {
            if self.node_specs.contains_key(&spec.kind) {
                return Err(format!("Duplicate node spec kind: {}", spec.kind));
            }
            self.node_specs.insert(spec.kind.clone(), spec);
        }

        self.normalize_passes.extend(plugin.normalize_passes());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(format!("Duplicate command id: {}", cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(format!("Duplicate query id: {}", query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        Ok(())
    }

    /// Builder form of [`PluginRegistry::register_plugin`].
    pub fn with_plugin(mut self, plugin: Box<dyn PlatePlugin>) -> Result<Self, String> {
        self.register_plugin(plugin)?;
        Ok(self)
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn normalize(&self, doc: &Document) -> Vec<Op> {
        let mut ops: Vec<Op> = Vec::new();
        for pass in &self.normalize_passes {
            ops.extend(pass.run(doc, self));
        }
        ops
    }

    pub fn normalize_selection(&self, doc: &Document, selection: &Selection) -> Selection {
        let fallback = first_text_point(&doc.children, &mut Vec::new())
            .unwrap_or_else(|| Point::new(vec![0], 0));

        let anchor = resolve_text_point(doc, &selection.anchor)
            .or_else(|| resolve_text_point(doc, &selection.focus))
            .unwrap_or(fallback);
        let focus = resolve_text_point(doc, &selection.focus).unwrap_or_else(|| anchor.clone());

        Selection { anchor, focus }
    }

    fn child_constraint(&self, el: &ElementNode) -> ChildConstraint {
        match self.node_specs.get(&el.kind) {
            Some(spec) => spec.children.clone(),
            None if el.children.iter().any(|n| matches!(n, Node::Text(_))) => {
                ChildConstraint::InlineOnly
            }
            None => ChildConstraint::Any,
        }
    }
}

fn first_text_point(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
    for (ix, node) in children.iter().enumerate() {
        path.push(ix);
        let found = match node {
            Node::Text(_) => Some(Point::new(path.clone(), 0)),
            Node::Element(el) => first_text_point(&el.children, path),
            Node::Void(_) => None,
        };
        path.pop();
        if found.is_some() {
            return found;
        }
    }
    None
}

/// Maps a point onto an existing text leaf, clamping indices that fell off the
/// end of a child list. A point resting on an inline void moves to the
/// neighbouring text leaf.
fn resolve_text_point(doc: &Document, point: &Point) -> Option<Point> {
    let mut resolved: Vec<usize> = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            return None;
        }
        let ix = wanted.min(children.len() - 1);
        resolved.push(ix);
        match &children[ix] {
            Node::Text(t) => {
                return Some(Point::new(
                    resolved,
                    clamp_to_char_boundary(&t.text, point.offset),
                ));
            }
            Node::Element(el) => children = &el.children,
            Node::Void(_) => return text_beside_void(children, resolved),
        }
    }

    if resolved.is_empty() {
        return None;
    }
    first_text_point(children, &mut resolved)
}

fn text_beside_void(siblings: &[Node], mut path: Vec<usize>) -> Option<Point> {
    let ix = path.pop()?;
    if let Some(next) = siblings.iter().skip(ix + 1).position(|n| matches!(n, Node::Text(_))) {
        path.push(ix + 1 + next);
        return Some(Point::new(path, 0));
    }
    let (prev_ix, Node::Text(prev)) = siblings
        .iter()
        .enumerate()
        .take(ix)
        .rev()
        .find(|(_, n)| matches!(n, Node::Text(_)))?
    else {
        return None;
    };
    path.push(prev_ix);
    Some(Point::new(path, prev.text.len()))
}

struct CoreParagraphPlugin;

impl PlatePlugin for CoreParagraphPlugin {
    fn id(&self) -> &'static str {
        "core.paragraph"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: "paragraph".to_string(),
            role: NodeRole::Block,
            is_void: false,
            children: ChildConstraint::InlineOnly,
        }]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.set_paragraph", "Turn into text", |editor, _args| {
                let tx = retype_active_block(editor, "paragraph", &["level", "list_type"], Attrs::new())
                    .map_err(CommandError::new)?;
                apply_unless_empty(editor, tx, "turn block into paragraph")
            })
            .description("Convert the active text block into a plain paragraph.")
            .keywords(["text", "paragraph", "plain"]),
        ]
    }
}

struct CoreDividerPlugin;

impl PlatePlugin for CoreDividerPlugin {
    fn id(&self) -> &'static str {
        "core.divider"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: "divider".to_string(),
            role: NodeRole::Block,
            is_void: true,
            children: ChildConstraint::None,
        }]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("core.insert_divider", "Insert divider", |editor, _args| {
                let tx = insert_blocks_after_active(editor, vec![Node::divider()])
                    .source("command:core.insert_divider");
                editor
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("Failed to insert divider: {e}")))
            })
            .description("Insert a divider block and a trailing paragraph.")
            .keywords(["divider", "separator", "hr", "horizontal rule"]),
        ]
    }
}

struct CoreNormalizePlugin;

impl PlatePlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(EnsureTextBlockHasTextLeaf),
            Box::new(MergeAdjacentTextLeaves),
        ]
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

/// Calls `visit` for every element whose children are inline content.
fn for_each_text_block(
    children: &[Node],
    path: &mut Vec<usize>,
    registry: &PluginRegistry,
    visit: &mut dyn FnMut(&ElementNode, &[usize]),
) {
    for (ix, node) in children.iter().enumerate() {
        let Node::Element(el) = node else {
            continue;
        };
        path.push(ix);
        if registry.child_constraint(el) == ChildConstraint::InlineOnly {
            visit(el, path);
        } else {
            for_each_text_block(&el.children, path, registry, visit);
        }
        path.pop();
    }
}

struct EnsureTextBlockHasTextLeaf;

impl NormalizePass for EnsureTextBlockHasTextLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_inline_only_blocks_have_text_leaf"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();
        for_each_text_block(&doc.children, &mut Vec::new(), registry, &mut |el, path| {
            if el.children.iter().any(|n| matches!(n, Node::Text(_))) {
                return;
            }
            let mut insert_path = path.to_vec();
            insert_path.push(el.children.len());
            ops.push(Op::InsertNode {
                path: insert_path,
                node: Node::text(""),
            });
        });
        ops
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();
        for_each_text_block(&doc.children, &mut Vec::new(), registry, &mut |el, path| {
            // Walk right to left so earlier indices stay valid while removing.
            let mut ix = el.children.len();
            while ix > 1 {
                ix -= 1;
                let (Node::Text(left), Node::Text(right)) = (&el.children[ix - 1], &el.children[ix])
                else {
                    continue;
                };
                if left.marks != right.marks {
                    continue;
                }
                let mut left_path = path.to_vec();
                left_path.push(ix - 1);
                let mut right_path = path.to_vec();
                right_path.push(ix);
                if !right.text.is_empty() {
                    ops.push(Op::InsertText {
                        path: left_path,
                        offset: left.text.len(),
                        text: right.text.clone(),
                    });
                }
                ops.push(Op::RemoveNode { path: right_path });
                // One merge per block per round; normalization loops to a fixed point.
                break;
            }
        });
        ops
    }
}

struct HeadingPlugin;

impl PlatePlugin for HeadingPlugin {
    fn id(&self) -> &'static str {
        "heading"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: "heading".to_string(),
            role: NodeRole::Block,
            is_void: false,
            children: ChildConstraint::InlineOnly,
        }]
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeHeadingLevels)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.set_heading", "Set heading", |editor, args| {
                let level = args
                    .as_ref()
                    .and_then(|v| v.get("level"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(1)
                    .clamp(1, 6);
                let mut set = Attrs::new();
                set.insert("level".to_string(), Value::from(level));
                let tx = retype_active_block(editor, "heading", &["list_type"], set)
                    .map_err(CommandError::new)?;
                apply_unless_empty(editor, tx, "set heading")
            })
            .description("Convert the active text block into a heading.")
            .keywords(["heading", "title", "h1", "h2", "h3", "h4", "h5", "h6"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("block.heading_level", |editor, _args| {
            Ok(active_block(editor)
                .filter(|(_, el)| el.kind == "heading")
                .and_then(|(_, el)| el.attrs.get("level").cloned())
                .unwrap_or(Value::Null))
        })]
    }
}

struct NormalizeHeadingLevels;

impl NormalizePass for NormalizeHeadingLevels {
    fn id(&self) -> &'static str {
        "heading.normalize_levels"
    }

    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();
        for_each_text_block(&doc.children, &mut Vec::new(), registry, &mut |el, path| {
            if el.kind != "heading" {
                return;
            }
            let current = el.attrs.get("level").and_then(|v| v.as_u64());
            let level = current.unwrap_or(1).clamp(1, 6);
            if current == Some(level) {
                return;
            }
            let mut patch = AttrPatch::default();
            patch.set.insert("level".to_string(), Value::from(level));
            ops.push(Op::SetNodeAttrs {
                path: path.to_vec(),
                patch,
            });
        });
        ops
    }
}

struct ListPlugin;

impl PlatePlugin for ListPlugin {
    fn id(&self) -> &'static str {
        "list"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: "list_item".to_string(),
            role: NodeRole::Block,
            is_void: false,
            children: ChildConstraint::InlineOnly,
        }]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new(
                "list.toggle_bulleted",
                "Toggle bulleted list",
                |editor, _args| toggle_list(editor, "bulleted"),
            )
            .description("Toggle bulleted list for the active block.")
            .keywords(["list", "bulleted", "unordered", "ul"]),
            CommandSpec::new(
                "list.toggle_ordered",
                "Toggle ordered list",
                |editor, _args| toggle_list(editor, "ordered"),
            )
            .description("Toggle ordered list for the active block.")
            .keywords(["list", "ordered", "numbered", "ol"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("list.active_type", |editor, _args| {
            Ok(active_block(editor)
                .filter(|(_, el)| el.kind == "list_item")
                .and_then(|(_, el)| el.attrs.get("list_type").cloned())
                .unwrap_or(Value::Null))
        })]
    }
}

fn toggle_list(editor: &mut Editor, list_type: &str) -> Result<(), CommandError> {
    let already = active_block(editor).is_some_and(|(_, el)| {
        el.kind == "list_item"
            && el.attrs.get("list_type").and_then(|v| v.as_str()) == Some(list_type)
    });
    let tx = if already {
        retype_active_block(editor, "paragraph", &["list_type"], Attrs::new())
    } else {
        let mut set = Attrs::new();
        set.insert("list_type".to_string(), Value::String(list_type.to_string()));
        retype_active_block(editor, "list_item", &["level"], set)
    }
    .map_err(CommandError::new)?;
    apply_unless_empty(editor, tx, "toggle list")
}

struct ImagePlugin;

impl PlatePlugin for ImagePlugin {
    fn id(&self) -> &'static str {
        "image"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: "image".to_string(),
            role: NodeRole::Block,
            is_void: true,
            children: ChildConstraint::None,
        }]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("image.insert", "Insert image", |editor, args| {
                let src = args
                    .as_ref()
                    .and_then(|v| v.get("src"))
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| CommandError::new("Missing args.src"))?
                    .to_string();
                let alt = args
                    .as_ref()
                    .and_then(|v| v.get("alt"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);

                let tx = insert_blocks_after_active(editor, vec![Node::image(src, alt)])
                    .source("command:image.insert");
                editor
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("Failed to insert image: {e}")))
            })
            .description("Insert a block image node (void).")
            .keywords(["image", "img", "media", "void"]),
        ]
    }
}

fn apply_unless_empty(editor: &mut Editor, tx: Transaction, what: &str) -> Result<(), CommandError> {
    if tx.is_empty() {
        return Ok(());
    }
    editor
        .apply(tx)
        .map_err(|e| CommandError::new(format!("Failed to {what}: {e}")))
}

/// The block holding the caret and its path.
pub fn active_block(editor: &Editor) -> Option<(Vec<usize>, &ElementNode)> {
    let (_, block_path) = editor.selection().focus.path.split_last()?;
    match editor.node(block_path)? {
        Node::Element(el) => Some((block_path.to_vec(), el)),
        _ => None,
    }
}

/// Replaces the active text block with one of `kind`, keeping its inline
/// children and attrs minus `drop_attrs`, plus `set`.
fn retype_active_block(
    editor: &Editor,
    kind: &str,
    drop_attrs: &[&str],
    set: Attrs,
) -> Result<Transaction, String> {
    let Some((block_path, el)) = active_block(editor) else {
        return Err("No active block".into());
    };
    if editor.registry().child_constraint(el) != ChildConstraint::InlineOnly {
        return Err("Active block is not a text block".into());
    }

    let mut attrs = el.attrs.clone();
    for key in drop_attrs {
        attrs.remove(*key);
    }
    attrs.extend(set);
    if el.kind == kind && attrs == el.attrs {
        return Ok(Transaction::new(Vec::new()));
    }

    let next = Node::Element(ElementNode {
        kind: kind.to_string(),
        attrs,
        children: el.children.clone(),
    });
    Ok(Transaction::new(vec![
        Op::RemoveNode {
            path: block_path.clone(),
        },
        Op::InsertNode {
            path: block_path,
            node: next,
        },
    ])
    .selection_after(editor.selection().clone())
    .source(format!("command:block.retype.{kind}")))
}

/// Inserts `blocks` as siblings after the active block, followed by an empty
/// paragraph that receives the caret.
fn insert_blocks_after_active(editor: &Editor, blocks: Vec<Node>) -> Transaction {
    let (parent_path, insert_at) = match active_block(editor) {
        Some((block_path, _)) => {
            let (block_ix, parent) = block_path.split_last().map_or((0, &[][..]), |(ix, p)| (*ix, p));
            (parent.to_vec(), block_ix + 1)
        }
        None => (Vec::new(), editor.doc().children.len()),
    };

    let mut ops: Vec<Op> = Vec::new();
    for (i, node) in blocks.into_iter().enumerate() {
        let mut path = parent_path.clone();
        path.push(insert_at + i);
        ops.push(Op::InsertNode { path, node });
    }

    let mut paragraph_path = parent_path;
    paragraph_path.push(insert_at + ops.len());
    ops.push(Op::InsertNode {
        path: paragraph_path.clone(),
        node: Node::paragraph(""),
    });
    paragraph_path.push(0);

    Transaction::new(ops).selection_after(Selection::collapsed(Point::new(paragraph_path, 0)))
}

/// Builds a transaction that splits the text leaf under the caret and places
/// `void` between the halves. A selection inside a single text leaf is
/// replaced; selections spanning leaves are rejected.
pub fn insert_inline_void(
    editor: &Editor,
    void: VoidNode,
    source: impl Into<String>,
) -> Result<Transaction, String> {
    let sel = editor.selection();
    if sel.anchor.path != sel.focus.path {
        return Err("Selection must be within a single text node".into());
    }
    let start = sel.anchor.offset.min(sel.focus.offset);
    let end = sel.anchor.offset.max(sel.focus.offset);
    let caret_path = sel.focus.path.clone();

    let Some((&child_ix, block_path)) = caret_path.split_last() else {
        return Err("Selection is not in a text node".into());
    };
    let Some(Node::Element(_)) = node_ref(editor.doc(), block_path) else {
        return Err("Selection is not in a text block".into());
    };
    let Some(Node::Text(text)) = node_ref(editor.doc(), &caret_path) else {
        return Err("Selection is not in a text node".into());
    };

    let start = clamp_to_char_boundary(&text.text, start);
    let end = clamp_to_char_boundary(&text.text, end);
    let left = text.text[..start].to_string();
    let right = text.text[end..].to_string();

    let mut replacement: Vec<Node> = Vec::new();
    if !left.is_empty() {
        replacement.push(Node::Text(TextNode {
            text: left,
            marks: text.marks.clone(),
        }));
    }
    let void_ix = child_ix + replacement.len();
    replacement.push(Node::Void(void));
    replacement.push(Node::Text(TextNode {
        text: right,
        marks: text.marks.clone(),
    }));

    let mut ops = vec![Op::RemoveNode {
        path: caret_path.clone(),
    }];
    for (i, node) in replacement.into_iter().enumerate() {
        let mut path = block_path.to_vec();
        path.push(child_ix + i);
        ops.push(Op::InsertNode { path, node });
    }

    let mut selection_path = block_path.to_vec();
    selection_path.push(void_ix + 1);
    Ok(Transaction::new(ops)
        .selection_after(Selection::collapsed(Point::new(selection_path, 0)))
        .source(source))
}
