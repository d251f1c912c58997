//! # Document Serialization
//!
//! Persisted documents are a recursive tagged tree rooted at a `root` object:
//!
//! ```text
//! { type, format, style: "key: value;…", version, …type fields, children? }
//! ```
//!
//! - Text nodes export their format bitmask as `format`.
//! - Elements export their alignment code as `format`, plus `indent` and the
//!   pending typing format as `textFormat`.
//! - Image captions are exported inline under `caption`.
//!
//! Import goes through the node type table. Unknown or malformed nodes are
//! recovered with a plain paragraph (or a text node, inside a text block)
//! holding the raw text found under them, and reported as notices.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::errors::{EditorError, ValidationError};
use crate::keys::KeyGenerator;
use crate::node::{Alignment, Node, NodeKey, NodeKind, NodePayload, NodeType, Style, TextFormat};
use crate::registry::NodeTypeRegistry;
use crate::selection::{normalize_point, Point, Selection};
use crate::state::EditorState;

/// Current serialized node version
pub const NODE_VERSION: u32 = 1;

fn default_version() -> u32 {
    NODE_VERSION
}

/// One node of the persisted document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    #[serde(rename = "type")]
    pub node_type: String,

    #[serde(default)]
    pub format: u32,

    #[serde(default)]
    pub style: String,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<SerializedNode>>,

    /// Type-specific fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Export the document tree of `state`.
pub fn export_json(state: &EditorState, registry: &NodeTypeRegistry) -> Value {
    let root = export_node(state, registry, state.root_key());
    serde_json::to_value(root).unwrap_or(Value::Null)
}

/// Export the document as a JSON string, as stored by persistence.
pub fn export_string(state: &EditorState, registry: &NodeTypeRegistry) -> Result<String, EditorError> {
    let root = export_node(state, registry, state.root_key());
    Ok(serde_json::to_string(&root)?)
}

fn export_node(state: &EditorState, registry: &NodeTypeRegistry, key: &NodeKey) -> SerializedNode {
    // keys come from the state's own child lists
    let node = &state.nodes[key];
    let node_type = node.node_type();
    let mut fields = Map::new();
    if let Some(spec) = registry.get(node_type.as_str()) {
        (spec.export)(&node.payload, &mut fields);
    }

    let (format, children) = match node.kind() {
        NodeKind::Text => (node.format.bits(), None),
        NodeKind::Decorator => (node.align.code(), None),
        NodeKind::Root | NodeKind::Element => {
            fields.insert("indent".into(), json!(node.indent));
            fields.insert("textFormat".into(), json!(node.format.bits()));
            let children = node
                .children()
                .iter()
                .map(|child| export_node(state, registry, child))
                .collect();
            (node.align.code(), Some(children))
        }
    };

    if let Some(caption) = node.caption() {
        let caption = export_node(state, registry, caption);
        fields.insert("caption".into(), serde_json::to_value(caption).unwrap_or(Value::Null));
    }

    SerializedNode {
        node_type: node_type.as_str().to_string(),
        format,
        style: node.style.to_css(),
        version: NODE_VERSION,
        children,
        fields,
    }
}

/// Result of a lenient import
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub state: EditorState,
    /// Non-fatal problems that were recovered from
    pub notices: Vec<ValidationError>,
}

/// Import a persisted document, recovering from unknown or malformed nodes.
pub fn import_json(
    blob: &Value,
    registry: &NodeTypeRegistry,
    keys: &mut KeyGenerator,
) -> Result<ImportOutcome, EditorError> {
    import_with(blob, registry, keys, false)
}

/// Import a persisted document, failing on the first unknown or malformed node.
pub fn import_json_strict(
    blob: &Value,
    registry: &NodeTypeRegistry,
    keys: &mut KeyGenerator,
) -> Result<EditorState, EditorError> {
    import_with(blob, registry, keys, true).map(|outcome| outcome.state)
}

/// Import from a JSON string.
pub fn import_str(
    source: &str,
    registry: &NodeTypeRegistry,
    keys: &mut KeyGenerator,
) -> Result<ImportOutcome, EditorError> {
    let blob: Value = serde_json::from_str(source)?;
    import_json(&blob, registry, keys)
}

fn import_with(
    blob: &Value,
    registry: &NodeTypeRegistry,
    keys: &mut KeyGenerator,
    strict: bool,
) -> Result<ImportOutcome, EditorError> {
    let root: SerializedNode = serde_json::from_value(blob.clone())
        .map_err(|e| ValidationError::Malformed(e.to_string()))?;
    if root.node_type != NodeType::Root.as_str() {
        return Err(ValidationError::Malformed(format!(
            "document root has type `{}`",
            root.node_type
        ))
        .into());
    }

    let mut builder = Builder {
        registry,
        keys,
        nodes: HashMap::new(),
        notices: Vec::new(),
        strict,
    };
    let root_key = builder.build_element(&root, NodePayload::Root, None)?;

    let mut state = EditorState {
        nodes: builder.nodes,
        root: root_key.clone(),
        selection: None,
        version: 0,
    };
    let first = state.first_descendant(&root_key);
    state.selection = Some(if state.node(&first).map(Node::is_decorator).unwrap_or(false) {
        Selection::node(first)
    } else {
        let point = normalize_point(&state, Point::new(first, 0));
        Selection::caret(point.key, point.offset)
    });

    for notice in &builder.notices {
        warn!(notice = %notice, "recovered from invalid node during import");
    }
    Ok(ImportOutcome {
        state,
        notices: builder.notices,
    })
}

/// What a container accepts as children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Blocks,
    CaptionBlocks,
    Inline,
    ListItems,
    ListItemContent,
}

impl Slot {
    fn for_type(node_type: NodeType) -> Slot {
        match node_type {
            NodeType::Caption => Slot::CaptionBlocks,
            NodeType::List => Slot::ListItems,
            NodeType::ListItem => Slot::ListItemContent,
            t if t.is_text_block() => Slot::Inline,
            _ => Slot::Blocks,
        }
    }

    fn accepts(self, node_type: NodeType) -> bool {
        match self {
            Slot::Blocks => node_type.is_block(),
            Slot::CaptionBlocks => node_type == NodeType::Paragraph,
            Slot::Inline => node_type == NodeType::Text,
            Slot::ListItems => node_type == NodeType::ListItem,
            Slot::ListItemContent => matches!(node_type, NodeType::Text | NodeType::List),
        }
    }
}

struct Builder<'a> {
    registry: &'a NodeTypeRegistry,
    keys: &'a mut KeyGenerator,
    nodes: HashMap<NodeKey, Arc<Node>>,
    notices: Vec<ValidationError>,
    strict: bool,
}

impl Builder<'_> {
    fn insert(&mut self, node: Node) -> NodeKey {
        let key = node.key().clone();
        self.nodes.insert(key.clone(), Arc::new(node));
        key
    }

    /// Build `serialized` into the slot of `parent`. Returns `None` when the
    /// node is dropped.
    fn build(
        &mut self,
        serialized: &SerializedNode,
        parent: &NodeKey,
        slot: Slot,
    ) -> Result<Option<NodeKey>, EditorError> {
        let node_type = NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == serialized.node_type);
        let spec = node_type.and_then(|t| self.registry.get(t.as_str()).copied());

        let problem = match (node_type, spec) {
            (Some(node_type), Some(spec)) if slot.accepts(node_type) => {
                match (spec.import)(&serialized.fields) {
                    Ok(payload) => return self.build_known(serialized, payload, parent).map(Some),
                    Err(e) => e,
                }
            }
            (Some(node_type), Some(_)) => ValidationError::Malformed(format!(
                "{node_type} is not allowed here"
            )),
            _ => ValidationError::UnknownNodeType(serialized.node_type.clone()),
        };

        if self.strict {
            return Err(problem.into());
        }
        self.notices.push(problem);
        Ok(self.substitute(serialized, parent, slot))
    }

    fn build_known(
        &mut self,
        serialized: &SerializedNode,
        payload: NodePayload,
        parent: &NodeKey,
    ) -> Result<NodeKey, EditorError> {
        match payload.node_type().kind() {
            NodeKind::Text => {
                let mut node = Node::new(self.keys.next_key(), payload);
                node.format = TextFormat::from_bits_truncate(serialized.format);
                node.style = Style::parse(&serialized.style);
                node.set_parent(Some(parent.clone()));
                Ok(self.insert(node))
            }
            NodeKind::Decorator => self.build_decorator(serialized, payload, parent),
            NodeKind::Root | NodeKind::Element => self.build_element(serialized, payload, Some(parent)),
        }
    }

    fn build_element(
        &mut self,
        serialized: &SerializedNode,
        payload: NodePayload,
        parent: Option<&NodeKey>,
    ) -> Result<NodeKey, EditorError> {
        let node_type = payload.node_type();
        let mut node = Node::new(self.keys.next_key(), payload);
        node.align = Alignment::from_code(serialized.format).unwrap_or_default();
        node.style = Style::parse(&serialized.style);
        node.indent = serialized
            .fields
            .get("indent")
            .and_then(Value::as_u64)
            .map(|v| v.min(u8::MAX as u64) as u8)
            .unwrap_or(0);
        node.format = serialized
            .fields
            .get("textFormat")
            .and_then(Value::as_u64)
            .map(|v| TextFormat::from_bits_truncate(v as u32))
            .unwrap_or_default();
        node.set_parent(parent.cloned());
        let key = node.key().clone();
        self.insert(node);

        let slot = Slot::for_type(node_type);
        let mut children = Vec::new();
        for child in serialized.children.iter().flatten() {
            if let Some(child_key) = self.build(child, &key, slot)? {
                children.push(child_key);
            }
        }
        if slot == Slot::ListItemContent && children.len() > 1 {
            let nested: Vec<NodeKey> = children
                .iter()
                .filter(|k| self.nodes.get(*k).map(|n| n.node_type()) == Some(NodeType::List))
                .cloned()
                .collect();
            if !nested.is_empty() {
                self.notices.push(ValidationError::Malformed(
                    "listitem mixes text with a nested list".into(),
                ));
                children.retain(|k| !nested.contains(k));
                for dropped in &nested {
                    for key in subtree(&self.nodes, dropped) {
                        self.nodes.remove(&key);
                    }
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(&key) {
            *Arc::make_mut(node).children_mut() = children;
        }
        Ok(key)
    }

    fn build_decorator(
        &mut self,
        serialized: &SerializedNode,
        payload: NodePayload,
        parent: &NodeKey,
    ) -> Result<NodeKey, EditorError> {
        let mut node = Node::new(self.keys.next_key(), payload);
        node.align = Alignment::from_code(serialized.format).unwrap_or_default();
        node.style = Style::parse(&serialized.style);
        node.set_parent(Some(parent.clone()));
        let key = self.insert(node);

        if node_is_image(&self.nodes, &key) {
            if let Some(caption) = serialized.fields.get("caption") {
                let caption: SerializedNode = serde_json::from_value(caption.clone())
                    .map_err(|e| ValidationError::Malformed(format!("caption: {e}")))?;
                let caption_key = self.build_element(&caption, NodePayload::Caption, Some(&key))?;
                if let Some(node) = self.nodes.get_mut(&key) {
                    if let NodePayload::Image { caption, .. } = &mut Arc::make_mut(node).payload {
                        *caption = Some(caption_key);
                    }
                }
            }
        }
        Ok(key)
    }

    /// Replacement for an unusable node: a text node inside text blocks, a
    /// plain paragraph where blocks are expected.
    fn substitute(&mut self, serialized: &SerializedNode, parent: &NodeKey, slot: Slot) -> Option<NodeKey> {
        let raw = raw_text(serialized);
        match slot {
            Slot::Inline | Slot::ListItemContent => {
                if raw.is_empty() {
                    return None;
                }
                let mut text = Node::new(self.keys.next_key(), NodePayload::text(raw));
                text.set_parent(Some(parent.clone()));
                Some(self.insert(text))
            }
            Slot::ListItems => {
                let mut item = Node::new(self.keys.next_key(), NodePayload::ListItem { value: 1, checked: None });
                item.set_parent(Some(parent.clone()));
                let item_key = self.insert(item);
                if !raw.is_empty() {
                    let mut text = Node::new(self.keys.next_key(), NodePayload::text(raw));
                    text.set_parent(Some(item_key.clone()));
                    let text_key = self.insert(text);
                    if let Some(item) = self.nodes.get_mut(&item_key) {
                        Arc::make_mut(item).children_mut().push(text_key);
                    }
                }
                Some(item_key)
            }
            Slot::Blocks | Slot::CaptionBlocks => {
                let mut paragraph = Node::new(self.keys.next_key(), NodePayload::Paragraph);
                paragraph.set_parent(Some(parent.clone()));
                let paragraph_key = self.insert(paragraph);
                if !raw.is_empty() {
                    let mut text = Node::new(self.keys.next_key(), NodePayload::text(raw));
                    text.set_parent(Some(paragraph_key.clone()));
                    let text_key = self.insert(text);
                    if let Some(paragraph) = self.nodes.get_mut(&paragraph_key) {
                        Arc::make_mut(paragraph).children_mut().push(text_key);
                    }
                }
                Some(paragraph_key)
            }
        }
    }
}

fn subtree(nodes: &HashMap<NodeKey, Arc<Node>>, key: &NodeKey) -> Vec<NodeKey> {
    let mut out = Vec::new();
    let mut stack = vec![key.clone()];
    while let Some(current) = stack.pop() {
        if let Some(node) = nodes.get(&current) {
            stack.extend(node.children().iter().cloned());
            if let Some(caption) = node.caption() {
                stack.push(caption.clone());
            }
        }
        out.push(current);
    }
    out
}

fn node_is_image(nodes: &HashMap<NodeKey, Arc<Node>>, key: &NodeKey) -> bool {
    nodes.get(key).map(|n| n.node_type()) == Some(NodeType::Image)
}

/// All `text` strings found anywhere under a serialized node, in order.
fn raw_text(serialized: &SerializedNode) -> String {
    let mut out = String::new();
    if let Some(text) = serialized.fields.get("text").and_then(Value::as_str) {
        out.push_str(text);
    }
    for value in serialized.fields.values() {
        collect_nested_text(value, &mut out);
    }
    for child in serialized.children.iter().flatten() {
        out.push_str(&raw_text(child));
    }
    out
}

fn collect_nested_text(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
            for (name, nested) in map {
                if name != "text" {
                    collect_nested_text(nested, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_nested_text(item, out)),
        _ => {}
    }
}
