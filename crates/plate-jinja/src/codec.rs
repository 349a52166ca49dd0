//! Conversion between a [`TemplateReference`] and the two places it is
//! persisted: the `data-jinja-*` markup attributes and the attrs of the
//! in-document void node.

use std::collections::BTreeMap;

use plate_core::{Attrs, VoidNode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::JINJA_TAG_KIND;

/// Template parameters. Keys iterate in sorted order, which is also the
/// order they are serialized and displayed in.
pub type Params = BTreeMap<String, Value>;

/// Attribute name/value pairs of a markup element.
pub type MarkupAttrs = BTreeMap<String, String>;

pub const TAG_ATTR: &str = "data-jinja-tag";
pub const PARAMS_ATTR: &str = "data-jinja-params";
pub const DRAG_HANDLE_ATTR: &str = "data-drag-handle";

const TAG_NAME_KEY: &str = "tag_name";
const PARAMS_KEY: &str = "params";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateReference {
    pub template_id: String,
    #[serde(default)]
    pub params: Params,
}

impl TemplateReference {
    pub fn new(template_id: impl Into<String>, params: Params) -> Self {
        Self {
            template_id: template_id.into(),
            params,
        }
    }

    /// Builds the void node that carries this reference inside a document.
    pub fn to_node(&self) -> VoidNode {
        let mut attrs = Attrs::new();
        attrs.insert(
            TAG_NAME_KEY.to_string(),
            Value::String(self.template_id.clone()),
        );
        attrs.insert(
            PARAMS_KEY.to_string(),
            Value::Object(self.params.clone().into_iter().collect()),
        );
        VoidNode {
            kind: JINJA_TAG_KIND.to_string(),
            attrs,
        }
    }

    /// Reads a reference back from a template void node. Other void kinds
    /// yield `None`.
    pub fn from_node(node: &VoidNode) -> Option<Self> {
        if node.kind != JINJA_TAG_KIND {
            return None;
        }
        let template_id = node
            .attrs
            .get(TAG_NAME_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let params = match node.attrs.get(PARAMS_KEY) {
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            Some(Value::Null) | None => Params::new(),
            Some(other) => {
                log::warn!("ignoring non-object params on template node `{template_id}`: {other}");
                Params::new()
            }
        };
        Some(Self {
            template_id,
            params,
        })
    }

    pub fn to_attrs(&self) -> SerializedAttrs {
        serialize(self)
    }
}

/// The two persisted attribute values. `params` is `None` when there is
/// nothing to store, so the attribute is omitted from markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedAttrs {
    pub tag: String,
    pub params: Option<String>,
}

impl SerializedAttrs {
    pub fn to_markup_attrs(&self) -> MarkupAttrs {
        let mut attrs = MarkupAttrs::new();
        attrs.insert(TAG_ATTR.to_string(), self.tag.clone());
        if let Some(params) = &self.params {
            attrs.insert(PARAMS_ATTR.to_string(), params.clone());
        }
        attrs
    }
}

/// Reads a reference from raw attribute values. A missing tag becomes an
/// empty id; missing or malformed params become an empty map.
pub fn parse(tag: Option<&str>, params: Option<&str>) -> TemplateReference {
    TemplateReference {
        template_id: tag.unwrap_or_default().to_string(),
        params: decode_params(params),
    }
}

pub fn decode_params(raw: Option<&str>) -> Params {
    let Some(raw) = raw else {
        return Params::new();
    };
    match serde_json::from_str::<Params>(raw) {
        Ok(params) => params,
        Err(err) => {
            log::error!("error parsing {PARAMS_ATTR} value {raw:?}: {err}");
            Params::new()
        }
    }
}

pub fn serialize(reference: &TemplateReference) -> SerializedAttrs {
    SerializedAttrs {
        tag: reference.template_id.clone(),
        params: encode_params(&reference.params),
    }
}

pub fn encode_params(params: &Params) -> Option<String> {
    if params.is_empty() {
        return None;
    }
    let object: serde_json::Map<String, Value> = params.clone().into_iter().collect();
    Some(Value::Object(object).to_string())
}

pub fn from_markup_attrs(attrs: &MarkupAttrs) -> TemplateReference {
    parse(
        attrs.get(TAG_ATTR).map(String::as_str),
        attrs.get(PARAMS_ATTR).map(String::as_str),
    )
}
