use plate_core::{Document, Editor, ElementNode, Node, TextNode, VoidNode};
use serde_json::Value;

use crate::codec::TemplateReference;
use crate::node::{escape_attr, render_html};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaveError {
    #[error("unsupported node `{kind}` at {path:?}")]
    UnsupportedNode { kind: String, path: Vec<usize> },
    #[error("image at {path:?} has no src")]
    MissingImageSource { path: Vec<usize> },
}

impl SaveError {
    pub fn user_message(&self) -> String {
        format!("Error saving content: {self}")
    }
}

/// Serializes the editor content and logs failures. The document is never
/// modified.
pub fn save_document(editor: &Editor) -> Result<String, SaveError> {
    document_to_html(editor.doc()).inspect_err(|err| log::error!("save failed: {err}"))
}

pub fn document_to_html(doc: &Document) -> Result<String, SaveError> {
    let mut out = String::new();
    let mut open_list: Option<&'static str> = None;

    for (ix, node) in doc.children.iter().enumerate() {
        let path = vec![ix];
        let list_tag = match node {
            Node::Element(el) if el.kind == "list_item" => Some(list_tag(el)),
            _ => None,
        };
        if open_list != list_tag {
            if let Some(tag) = open_list {
                out.push_str(&format!("</{tag}>"));
            }
            if let Some(tag) = list_tag {
                out.push_str(&format!("<{tag}>"));
            }
            open_list = list_tag;
        }
        write_block(&mut out, node, &path)?;
    }
    if let Some(tag) = open_list {
        out.push_str(&format!("</{tag}>"));
    }
    Ok(out)
}

fn list_tag(el: &ElementNode) -> &'static str {
    match el.attrs.get("list_type").and_then(Value::as_str) {
        Some("ordered") => "ol",
        _ => "ul",
    }
}

fn write_block(out: &mut String, node: &Node, path: &[usize]) -> Result<(), SaveError> {
    match node {
        Node::Element(el) => {
            let tag = match el.kind.as_str() {
                "paragraph" => "p".to_string(),
                "heading" => {
                    let level = el.attrs.get("level").and_then(Value::as_u64).unwrap_or(1);
                    format!("h{}", level.clamp(1, 6))
                }
                "list_item" => "li".to_string(),
                other => return Err(unsupported(other, path)),
            };
            out.push_str(&format!("<{tag}>"));
            write_inlines(out, el, path)?;
            out.push_str(&format!("</{tag}>"));
            Ok(())
        }
        Node::Void(void) => match void.kind.as_str() {
            "divider" => {
                out.push_str("<hr>");
                Ok(())
            }
            "image" => write_image(out, void, path),
            other => Err(unsupported(other, path)),
        },
        Node::Text(_) => Err(unsupported("text", path)),
    }
}

fn write_inlines(out: &mut String, el: &ElementNode, path: &[usize]) -> Result<(), SaveError> {
    for (ix, child) in el.children.iter().enumerate() {
        match child {
            Node::Text(text) => write_text(out, text),
            Node::Void(void) => match TemplateReference::from_node(void) {
                Some(reference) => out.push_str(&render_html(&reference)),
                None => {
                    let mut child_path = path.to_vec();
                    child_path.push(ix);
                    return Err(unsupported(&void.kind, &child_path));
                }
            },
            Node::Element(inner) => {
                let mut child_path = path.to_vec();
                child_path.push(ix);
                return Err(unsupported(&inner.kind, &child_path));
            }
        }
    }
    Ok(())
}

fn write_text(out: &mut String, text: &TextNode) {
    if text.text.is_empty() {
        return;
    }
    let mut html = escape_text(&text.text);
    if text.marks.code {
        html = format!("<code>{html}</code>");
    }
    if text.marks.italic {
        html = format!("<em>{html}</em>");
    }
    if text.marks.bold {
        html = format!("<strong>{html}</strong>");
    }
    if let Some(href) = &text.marks.link {
        html = format!("<a href=\"{}\">{html}</a>", escape_attr(href));
    }
    out.push_str(&html);
}

fn write_image(out: &mut String, void: &VoidNode, path: &[usize]) -> Result<(), SaveError> {
    let src = void
        .attrs
        .get("src")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SaveError::MissingImageSource {
            path: path.to_vec(),
        })?;
    out.push_str(&format!("<img src=\"{}\"", escape_attr(src)));
    if let Some(alt) = void.attrs.get("alt").and_then(Value::as_str) {
        out.push_str(&format!(" alt=\"{}\"", escape_attr(alt)));
    }
    out.push('>');
    Ok(())
}

fn unsupported(kind: &str, path: &[usize]) -> SaveError {
    SaveError::UnsupportedNode {
        kind: kind.to_string(),
        path: path.to_vec(),
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
