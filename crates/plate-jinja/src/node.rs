use std::sync::Arc;

use plate_core::{
    ApplyError, ChildConstraint, CommandError, CommandSpec, Editor, Node, NodeRole, NodeSpec,
    PlatePlugin, PluginRegistry, QueryError, QuerySpec, insert_inline_void,
};
use serde_json::Value;

use crate::codec::{DRAG_HANDLE_ATTR, PARAMS_ATTR, Params, TAG_ATTR, TemplateReference};
use crate::registry::{TemplateDefinition, TemplateRegistry};

pub const JINJA_TAG_KIND: &str = "jinja_tag";
pub const NODE_CLASS_NAME: &str = "jinja-tag-node";

#[derive(Debug, thiserror::Error)]
pub enum InsertError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),
    #[error("cannot place template here: {0}")]
    Placement(String),
    #[error("failed to insert template: {0}")]
    Apply(#[from] ApplyError),
}

/// Registers the inline, atomic template node plus its insert command and
/// display query.
pub struct JinjaTagPlugin {
    registry: Arc<TemplateRegistry>,
}

impl JinjaTagPlugin {
    pub fn new(registry: Arc<TemplateRegistry>) -> Self {
        Self { registry }
    }
}

impl PlatePlugin for JinjaTagPlugin {
    fn id(&self) -> &'static str {
        "jinja_tag"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            kind: JINJA_TAG_KIND.to_string(),
            role: NodeRole::Inline,
            is_void: true,
            children: ChildConstraint::None,
        }]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let registry = self.registry.clone();
        vec![
            CommandSpec::new("jinja_tag.insert", "Insert template", move |editor, args| {
                let name = args
                    .as_ref()
                    .and_then(|v| v.get("name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| CommandError::new("Missing args.name"))?
                    .to_string();
                let params = match args.as_ref().and_then(|v| v.get("params")) {
                    None | Some(Value::Null) => Params::new(),
                    Some(Value::Object(map)) => map.clone().into_iter().collect(),
                    Some(_) => return Err(CommandError::new("args.params must be an object")),
                };
                try_insert_template(editor, &registry, &name, params)
                    .map_err(|err| CommandError::new(err.to_string()))
            })
            .description("Insert a template reference at the caret.")
            .keywords(["template", "jinja", "macro"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        let registry = self.registry.clone();
        vec![QuerySpec::new("jinja_tag.display", move |editor, args| {
            let path: Vec<usize> = args
                .as_ref()
                .and_then(|v| v.get("path"))
                .cloned()
                .map(serde_json::from_value::<Vec<usize>>)
                .transpose()
                .map_err(|err| QueryError::new(format!("Invalid args.path: {err}")))?
                .ok_or_else(|| QueryError::new("Missing args.path"))?;
            let Some(Node::Void(void)) = editor.node(&path) else {
                return Err(QueryError::new(format!("No template node at {path:?}")));
            };
            let reference = TemplateReference::from_node(void)
                .ok_or_else(|| QueryError::new(format!("No template node at {path:?}")))?;
            Ok(Value::String(display_label(&registry, &reference)))
        })]
    }
}

/// The rich-text plugin set plus the template node.
pub fn richtext_with_templates(templates: Arc<TemplateRegistry>) -> Result<PluginRegistry, String> {
    PluginRegistry::richtext().with_plugin(Box::new(JinjaTagPlugin::new(templates)))
}

/// Registry defaults for every attribute that declares one, overlaid with
/// `params`. Keys absent from the definition are kept.
pub fn effective_params(definition: Option<&TemplateDefinition>, params: &Params) -> Params {
    let mut merged = definition.map(TemplateDefinition::defaults).unwrap_or_default();
    merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

pub fn try_insert_template(
    editor: &mut Editor,
    registry: &TemplateRegistry,
    template_id: &str,
    params: Params,
) -> Result<(), InsertError> {
    let Some(definition) = registry.get(template_id) else {
        return Err(InsertError::UnknownTemplate(template_id.to_string()));
    };
    let reference = TemplateReference::new(template_id, effective_params(Some(definition), &params));
    let tx = insert_inline_void(editor, reference.to_node(), "command:jinja_tag.insert")
        .map_err(InsertError::Placement)?;
    editor.apply(tx)?;
    log::debug!("inserted template `{template_id}`");
    Ok(())
}

/// Inserts a reference to `template_id` at the caret. Unknown ids leave the
/// document untouched and return `false`.
pub fn insert_template(
    editor: &mut Editor,
    registry: &TemplateRegistry,
    template_id: &str,
    params: Params,
) -> bool {
    match try_insert_template(editor, registry, template_id, params) {
        Ok(()) => true,
        Err(InsertError::UnknownTemplate(id)) => {
            log::warn!("Unknown template: {id}");
            false
        }
        Err(err) => {
            log::warn!("{err}");
            false
        }
    }
}

/// `{Display Name: key=value, ...}` with JSON-encoded values, or just
/// `{Display Name}` when there are no params. Unregistered ids fall back to
/// the raw id.
pub fn display_label(registry: &TemplateRegistry, reference: &TemplateReference) -> String {
    let definition = registry.get(&reference.template_id);
    let name = definition
        .map(|def| def.display_name.as_str())
        .unwrap_or(reference.template_id.as_str());
    let params = effective_params(definition, &reference.params);
    if params.is_empty() {
        return format!("{{{name}}}");
    }
    let rendered: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{name}: {}}}", rendered.join(", "))
}

/// What a host renders for a template node: a non-editable, draggable chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub label: String,
    pub class_name: &'static str,
    pub draggable: bool,
    pub editable: bool,
}

pub fn node_view(registry: &TemplateRegistry, reference: &TemplateReference) -> NodeView {
    NodeView {
        label: display_label(registry, reference),
        class_name: NODE_CLASS_NAME,
        draggable: true,
        editable: false,
    }
}

/// Persisted markup: an empty span carrying the reference attributes.
pub fn render_html(reference: &TemplateReference) -> String {
    let attrs = reference.to_attrs();
    let mut html = format!("<span {TAG_ATTR}=\"{}\"", escape_attr(&attrs.tag));
    if let Some(params) = &attrs.params {
        html.push_str(&format!(" {PARAMS_ATTR}=\"{}\"", escape_attr(params)));
    }
    html.push_str(&format!(" {DRAG_HANDLE_ATTR}=\"\"></span>"));
    html
}

pub(crate) fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn span_escapes_params_json() {
        let mut params = Params::new();
        params.insert("type".into(), json!("secondary"));
        let html = render_html(&TemplateReference::new("menu", params));
        assert_eq!(
            html,
            r#"<span data-jinja-tag="menu" data-jinja-params="{&quot;type&quot;:&quot;secondary&quot;}" data-drag-handle=""></span>"#
        );
    }

    #[test]
    fn span_omits_empty_params() {
        let html = render_html(&TemplateReference::new("year", Params::new()));
        assert_eq!(html, r#"<span data-jinja-tag="year" data-drag-handle=""></span>"#);
    }
}
