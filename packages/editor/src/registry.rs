//! # Node Type Table
//!
//! Each type tag is registered with three functions: `validate` (schema
//! check run on commit), `export` (payload → persisted fields) and `import`
//! (persisted fields → payload). Serialization and commit validation go
//! through this table instead of per-type inheritance.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::errors::ValidationError;
use crate::node::{EmbedKind, HeadingTag, ListType, Node, NodePayload, NodeType};
use crate::state::EditorState;

pub type Fields = Map<String, Value>;

pub type ValidateFn = fn(&EditorState, &Node) -> Result<(), String>;
pub type ExportFn = fn(&NodePayload, &mut Fields);
pub type ImportFn = fn(&Fields) -> Result<NodePayload, ValidationError>;

/// Registered behaviour of one node type
#[derive(Clone, Copy)]
pub struct NodeTypeSpec {
    pub node_type: NodeType,
    pub validate: ValidateFn,
    pub export: ExportFn,
    pub import: ImportFn,
}

impl std::fmt::Debug for NodeTypeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTypeSpec")
            .field("node_type", &self.node_type)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    specs: HashMap<&'static str, NodeTypeSpec>,
}

impl NodeTypeRegistry {
    /// Registry without any types
    pub fn empty() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    /// Registry with every built-in type
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for node_type in NodeType::ALL {
            registry.register(builtin_spec(node_type));
        }
        registry
    }

    pub fn register(&mut self, spec: NodeTypeSpec) {
        self.specs.insert(spec.node_type.as_str(), spec);
    }

    /// Remove a type; documents using it will no longer import or commit.
    pub fn unregister(&mut self, node_type: NodeType) {
        self.specs.remove(node_type.as_str());
    }

    pub fn get(&self, tag: &str) -> Option<&NodeTypeSpec> {
        self.specs.get(tag)
    }

    pub fn is_registered(&self, node_type: NodeType) -> bool {
        self.specs.contains_key(node_type.as_str())
    }

    pub fn validate(&self, state: &EditorState, node: &Node) -> Result<(), String> {
        let spec = self
            .get(node.node_type().as_str())
            .ok_or_else(|| format!("node type `{}` is not registered", node.node_type()))?;
        (spec.validate)(state, node)
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_spec(node_type: NodeType) -> NodeTypeSpec {
    let (validate, export, import): (ValidateFn, ExportFn, ImportFn) = match node_type {
        NodeType::Root => (validate_root, export_nothing, import_root),
        NodeType::Caption => (validate_caption, export_nothing, import_caption),
        NodeType::Text => (validate_leaf, export_text, import_text),
        NodeType::Paragraph => (validate_text_block, export_nothing, import_paragraph),
        NodeType::Heading => (validate_text_block, export_heading, import_heading),
        NodeType::Quote => (validate_text_block, export_nothing, import_quote),
        NodeType::Code => (validate_text_block, export_code, import_code),
        NodeType::List => (validate_list, export_list, import_list),
        NodeType::ListItem => (validate_list_item, export_list_item, import_list_item),
        NodeType::Image => (validate_image, export_image, import_image),
        NodeType::Embed => (validate_leaf, export_embed, import_embed),
        NodeType::Collapsible => (validate_block_container, export_collapsible, import_collapsible),
        NodeType::HorizontalRule => (validate_leaf, export_nothing, import_horizontal_rule),
    };
    NodeTypeSpec {
        node_type,
        validate,
        export,
        import,
    }
}

// Validation

fn child_types<'a>(state: &'a EditorState, node: &'a Node) -> impl Iterator<Item = NodeType> + 'a {
    node.children()
        .iter()
        .filter_map(move |k| state.node_type(k))
}

fn validate_root(state: &EditorState, node: &Node) -> Result<(), String> {
    if node.parent().is_some() {
        return Err("root cannot have a parent".into());
    }
    validate_block_container(state, node)
}

fn validate_block_container(state: &EditorState, node: &Node) -> Result<(), String> {
    match child_types(state, node).find(|t| !t.is_block()) {
        Some(bad) => Err(format!("{} cannot contain {}", node.node_type(), bad)),
        None => Ok(()),
    }
}

fn validate_caption(state: &EditorState, node: &Node) -> Result<(), String> {
    let owner = node
        .parent()
        .and_then(|p| state.node(p))
        .ok_or("caption must belong to an image")?;
    if owner.caption() != Some(node.key()) {
        return Err("caption is not referenced by its image".into());
    }
    match child_types(state, node).find(|t| *t != NodeType::Paragraph) {
        Some(bad) => Err(format!("caption cannot contain {bad}")),
        None => Ok(()),
    }
}

fn validate_leaf(_state: &EditorState, node: &Node) -> Result<(), String> {
    if node.children().is_empty() {
        Ok(())
    } else {
        Err(format!("{} cannot have children", node.node_type()))
    }
}

fn validate_text_block(state: &EditorState, node: &Node) -> Result<(), String> {
    match child_types(state, node).find(|t| *t != NodeType::Text) {
        Some(bad) => Err(format!("{} cannot contain {}", node.node_type(), bad)),
        None => Ok(()),
    }
}

fn validate_list(state: &EditorState, node: &Node) -> Result<(), String> {
    match child_types(state, node).find(|t| *t != NodeType::ListItem) {
        Some(bad) => Err(format!("list cannot contain {bad}")),
        None => Ok(()),
    }
}

fn validate_list_item(state: &EditorState, node: &Node) -> Result<(), String> {
    if node.parent().and_then(|p| state.node_type(p)) != Some(NodeType::List) {
        return Err("listitem must be inside a list".into());
    }
    let types: Vec<NodeType> = child_types(state, node).collect();
    let nested = types.iter().filter(|t| **t == NodeType::List).count();
    if nested == 0 && types.iter().all(|t| *t == NodeType::Text) {
        Ok(())
    } else if nested == 1 && types.len() == 1 {
        Ok(())
    } else {
        Err("listitem holds either text or exactly one nested list".into())
    }
}

fn validate_image(state: &EditorState, node: &Node) -> Result<(), String> {
    validate_leaf(state, node)?;
    if let Some(caption) = node.caption() {
        let caption_node = state.node(caption).ok_or("image caption is missing")?;
        if caption_node.parent() != Some(node.key()) {
            return Err("image caption has a foreign parent".into());
        }
    }
    Ok(())
}

// Export

fn export_nothing(_payload: &NodePayload, _fields: &mut Fields) {}

fn export_text(payload: &NodePayload, fields: &mut Fields) {
    if let NodePayload::Text { text } = payload {
        fields.insert("text".into(), json!(text));
        fields.insert("mode".into(), json!("normal"));
        fields.insert("detail".into(), json!(0));
    }
}

fn export_heading(payload: &NodePayload, fields: &mut Fields) {
    if let NodePayload::Heading { tag } = payload {
        fields.insert("tag".into(), json!(tag.as_str()));
    }
}

fn export_code(payload: &NodePayload, fields: &mut Fields) {
    if let NodePayload::Code { language } = payload {
        fields.insert("language".into(), json!(language));
    }
}

fn export_list(payload: &NodePayload, fields: &mut Fields) {
    if let NodePayload::List { list_type, start } = payload {
        fields.insert("listType".into(), json!(list_type.as_str()));
        fields.insert("start".into(), json!(start));
        fields.insert("tag".into(), json!(list_type.tag()));
    }
}

fn export_list_item(payload: &NodePayload, fields: &mut Fields) {
    if let NodePayload::ListItem { value, checked } = payload {
        fields.insert("value".into(), json!(value));
        if let Some(checked) = checked {
            fields.insert("checked".into(), json!(checked));
        }
    }
}

fn export_image(payload: &NodePayload, fields: &mut Fields) {
    if let NodePayload::Image {
        src,
        alt_text,
        width,
        height,
        max_width,
        show_caption,
        ..
    } = payload
    {
        fields.insert("src".into(), json!(src));
        fields.insert("altText".into(), json!(alt_text));
        fields.insert("width".into(), dimension(*width));
        fields.insert("height".into(), dimension(*height));
        fields.insert("maxWidth".into(), json!(max_width));
        fields.insert("showCaption".into(), json!(show_caption));
    }
}

fn dimension(value: Option<u32>) -> Value {
    match value {
        Some(px) => json!(px),
        None => json!("inherit"),
    }
}

fn export_embed(payload: &NodePayload, fields: &mut Fields) {
    if let NodePayload::Embed {
        kind,
        src,
        width,
        height,
    } = payload
    {
        fields.insert("embedType".into(), json!(kind.as_str()));
        fields.insert("src".into(), json!(src));
        fields.insert("width".into(), json!(width));
        fields.insert("height".into(), json!(height));
    }
}

fn export_collapsible(payload: &NodePayload, fields: &mut Fields) {
    if let NodePayload::Collapsible { open } = payload {
        fields.insert("open".into(), json!(open));
    }
}

// Import

fn malformed(reason: impl Into<String>) -> ValidationError {
    ValidationError::Malformed(reason.into())
}

fn str_field<'a>(fields: &'a Fields, name: &str) -> Result<&'a str, ValidationError> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("missing string field `{name}`")))
}

fn u32_field(fields: &Fields, name: &str, default: u32) -> u32 {
    fields
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(default)
}

fn dimension_field(fields: &Fields, name: &str) -> Option<u32> {
    fields
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn import_root(_fields: &Fields) -> Result<NodePayload, ValidationError> {
    Ok(NodePayload::Root)
}

fn import_caption(_fields: &Fields) -> Result<NodePayload, ValidationError> {
    Ok(NodePayload::Caption)
}

fn import_paragraph(_fields: &Fields) -> Result<NodePayload, ValidationError> {
    Ok(NodePayload::Paragraph)
}

fn import_quote(_fields: &Fields) -> Result<NodePayload, ValidationError> {
    Ok(NodePayload::Quote)
}

fn import_horizontal_rule(_fields: &Fields) -> Result<NodePayload, ValidationError> {
    Ok(NodePayload::HorizontalRule)
}

fn import_text(fields: &Fields) -> Result<NodePayload, ValidationError> {
    Ok(NodePayload::text(str_field(fields, "text")?))
}

fn import_heading(fields: &Fields) -> Result<NodePayload, ValidationError> {
    let tag = str_field(fields, "tag")?;
    let tag = HeadingTag::parse(tag).ok_or_else(|| malformed(format!("bad heading tag `{tag}`")))?;
    Ok(NodePayload::Heading { tag })
}

fn import_code(fields: &Fields) -> Result<NodePayload, ValidationError> {
    let language = fields
        .get("language")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(NodePayload::Code { language })
}

fn import_list(fields: &Fields) -> Result<NodePayload, ValidationError> {
    let list_type = str_field(fields, "listType")?;
    let list_type =
        ListType::parse(list_type).ok_or_else(|| malformed(format!("bad list type `{list_type}`")))?;
    Ok(NodePayload::List {
        list_type,
        start: u32_field(fields, "start", 1),
    })
}

fn import_list_item(fields: &Fields) -> Result<NodePayload, ValidationError> {
    Ok(NodePayload::ListItem {
        value: u32_field(fields, "value", 1),
        checked: fields.get("checked").and_then(Value::as_bool),
    })
}

fn import_image(fields: &Fields) -> Result<NodePayload, ValidationError> {
    Ok(NodePayload::Image {
        src: str_field(fields, "src")?.to_string(),
        alt_text: fields
            .get("altText")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        width: dimension_field(fields, "width"),
        height: dimension_field(fields, "height"),
        max_width: u32_field(fields, "maxWidth", 500),
        show_caption: fields
            .get("showCaption")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        caption: None,
    })
}

fn import_embed(fields: &Fields) -> Result<NodePayload, ValidationError> {
    let kind = str_field(fields, "embedType")?;
    let kind = EmbedKind::parse(kind).ok_or_else(|| malformed(format!("bad embed type `{kind}`")))?;
    Ok(NodePayload::Embed {
        kind,
        src: str_field(fields, "src")?.to_string(),
        width: u32_field(fields, "width", 0),
        height: u32_field(fields, "height", 0),
    })
}

fn import_collapsible(fields: &Fields) -> Result<NodePayload, ValidationError> {
    Ok(NodePayload::Collapsible {
        open: fields.get("open").and_then(Value::as_bool).unwrap_or(true),
    })
}
