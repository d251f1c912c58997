//! # Document Nodes
//!
//! Nodes live in a flat key-addressed map owned by an [`EditorState`].
//! Parent and children are plain key references: the parent link is a
//! back-reference only, ownership is expressed by reachability from the root.
//!
//! [`EditorState`]: crate::EditorState

use std::fmt;

use bitflags::bitflags;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Opaque, unique node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(String);

impl NodeKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeKey {
    fn from(s: &str) -> Self {
        NodeKey::new(s)
    }
}

bitflags! {
    /// Inline text format bitmask. Values match the persisted document format.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextFormat: u32 {
        const BOLD          = 1;
        const ITALIC        = 1 << 1;
        const STRIKETHROUGH = 1 << 2;
        const UNDERLINE     = 1 << 3;
        const CODE          = 1 << 4;
        const SUBSCRIPT     = 1 << 5;
        const SUPERSCRIPT   = 1 << 6;
        const HIGHLIGHT     = 1 << 7;
    }
}

impl TextFormat {
    /// Toggle `flag`, keeping subscript and superscript mutually exclusive.
    pub fn toggled(self, flag: TextFormat) -> TextFormat {
        let mut next = self ^ flag;
        if next.contains(flag) {
            if flag == TextFormat::SUBSCRIPT {
                next.remove(TextFormat::SUPERSCRIPT);
            } else if flag == TextFormat::SUPERSCRIPT {
                next.remove(TextFormat::SUBSCRIPT);
            }
        }
        next
    }
}

/// Named format flag, as carried by `FORMAT_TEXT` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFlag {
    Bold,
    Italic,
    Strikethrough,
    Underline,
    Code,
    Subscript,
    Superscript,
    Highlight,
}

impl FormatFlag {
    pub const ALL: [FormatFlag; 8] = [
        FormatFlag::Bold,
        FormatFlag::Italic,
        FormatFlag::Strikethrough,
        FormatFlag::Underline,
        FormatFlag::Code,
        FormatFlag::Subscript,
        FormatFlag::Superscript,
        FormatFlag::Highlight,
    ];

    pub fn bits(self) -> TextFormat {
        match self {
            FormatFlag::Bold => TextFormat::BOLD,
            FormatFlag::Italic => TextFormat::ITALIC,
            FormatFlag::Strikethrough => TextFormat::STRIKETHROUGH,
            FormatFlag::Underline => TextFormat::UNDERLINE,
            FormatFlag::Code => TextFormat::CODE,
            FormatFlag::Subscript => TextFormat::SUBSCRIPT,
            FormatFlag::Superscript => TextFormat::SUPERSCRIPT,
            FormatFlag::Highlight => TextFormat::HIGHLIGHT,
        }
    }
}

/// Ordered CSS-like style map (`color`, `font-family`, `font-size`, `background-color`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Style(IndexMap<String, String>);

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `key: value;` style string. Malformed declarations are skipped.
    ///
    /// A `;` inside parentheses or quotes does not end a declaration, so
    /// values such as `url(data:image/png;base64,...)` survive.
    pub fn parse(css: &str) -> Self {
        let mut style = Style::new();
        for declaration in split_declarations(css) {
            if let Some((key, value)) = declaration.split_once(':') {
                let (key, value) = (key.trim(), value.trim());
                if Self::accepts(key, value) && !value.is_empty() {
                    style.0.insert(key.to_string(), value.to_string());
                }
            }
        }
        style
    }

    /// Serialize back to the persisted `key: value;` form.
    pub fn to_css(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!("{key}: {value};"))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether `key: value` can be stored and read back from [`Style::to_css`].
    ///
    /// Keys are CSS property names; values must close every parenthesis and
    /// quote they open and may only hold `;` inside them.
    pub fn accepts(key: &str, value: &str) -> bool {
        let (key, value) = (key.trim(), value.trim());
        !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            && is_balanced(value)
            && split_declarations(value).len() == 1
    }

    /// Set a property; an empty value removes it. Declarations rejected by
    /// [`Style::accepts`] are ignored.
    pub fn set(&mut self, key: &str, value: &str) {
        let (key, value) = (key.trim(), value.trim());
        if value.is_empty() {
            self.0.shift_remove(key);
        } else if Self::accepts(key, value) {
            self.0.insert(key.to_string(), value.to_string());
        }
    }

    /// Apply every entry of `patch` on top of this style.
    pub fn patch(&mut self, patch: &Style) {
        for (key, value) in &patch.0 {
            self.set(key, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Split a style string on `;` outside parentheses and quotes.
fn split_declarations(css: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in css.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                out.push(&css[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&css[start..]);
    out
}

/// Every `(` has a matching `)` and every quote is closed.
fn is_balanced(value: &str) -> bool {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }
    depth == 0 && quote.is_none() && !escaped
}

/// Block alignment. Exported as the element `format` integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Unset,
    Left,
    Center,
    Right,
    Justify,
    Start,
    End,
}

impl Alignment {
    pub fn code(self) -> u32 {
        match self {
            Alignment::Unset => 0,
            Alignment::Left => 1,
            Alignment::Center => 2,
            Alignment::Right => 3,
            Alignment::Justify => 4,
            Alignment::Start => 5,
            Alignment::End => 6,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Alignment::Unset,
            1 => Alignment::Left,
            2 => Alignment::Center,
            3 => Alignment::Right,
            4 => Alignment::Justify,
            5 => Alignment::Start,
            6 => Alignment::End,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    Bullet,
    Number,
    Check,
}

impl ListType {
    pub fn as_str(self) -> &'static str {
        match self {
            ListType::Bullet => "bullet",
            ListType::Number => "number",
            ListType::Check => "check",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bullet" => Some(ListType::Bullet),
            "number" => Some(ListType::Number),
            "check" => Some(ListType::Check),
            _ => None,
        }
    }

    /// HTML tag the list renders to.
    pub fn tag(self) -> &'static str {
        match self {
            ListType::Number => "ol",
            ListType::Bullet | ListType::Check => "ul",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingTag {
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
}

impl HeadingTag {
    pub fn as_str(self) -> &'static str {
        match self {
            HeadingTag::H1 => "h1",
            HeadingTag::H2 => "h2",
            HeadingTag::H3 => "h3",
            HeadingTag::H4 => "h4",
            HeadingTag::H5 => "h5",
            HeadingTag::H6 => "h6",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "h1" => Some(HeadingTag::H1),
            "h2" => Some(HeadingTag::H2),
            "h3" => Some(HeadingTag::H3),
            "h4" => Some(HeadingTag::H4),
            "h5" => Some(HeadingTag::H5),
            "h6" => Some(HeadingTag::H6),
            _ => None,
        }
    }
}

/// Source of an external embed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedKind {
    YouTube,
    Tweet,
    Figma,
    Link,
}

impl EmbedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EmbedKind::YouTube => "youtube",
            EmbedKind::Tweet => "tweet",
            EmbedKind::Figma => "figma",
            EmbedKind::Link => "link",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "youtube" => Some(EmbedKind::YouTube),
            "tweet" => Some(EmbedKind::Tweet),
            "figma" => Some(EmbedKind::Figma),
            "link" => Some(EmbedKind::Link),
            _ => None,
        }
    }
}

/// Type-specific node data. The variant is the node's type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum NodePayload {
    Root,
    /// Isolated root of an image caption subtree
    Caption,
    Text {
        text: String,
    },
    Paragraph,
    Heading {
        tag: HeadingTag,
    },
    Quote,
    Code {
        language: Option<String>,
    },
    List {
        list_type: ListType,
        start: u32,
    },
    ListItem {
        value: u32,
        checked: Option<bool>,
    },
    Image {
        src: String,
        alt_text: String,
        /// `None` renders at the container's natural width
        width: Option<u32>,
        height: Option<u32>,
        max_width: u32,
        show_caption: bool,
        caption: Option<NodeKey>,
    },
    Embed {
        kind: EmbedKind,
        src: String,
        width: u32,
        height: u32,
    },
    Collapsible {
        open: bool,
    },
    HorizontalRule,
}

impl NodePayload {
    pub fn text(text: impl Into<String>) -> Self {
        NodePayload::Text { text: text.into() }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodePayload::Root => NodeType::Root,
            NodePayload::Caption => NodeType::Caption,
            NodePayload::Text { .. } => NodeType::Text,
            NodePayload::Paragraph => NodeType::Paragraph,
            NodePayload::Heading { .. } => NodeType::Heading,
            NodePayload::Quote => NodeType::Quote,
            NodePayload::Code { .. } => NodeType::Code,
            NodePayload::List { .. } => NodeType::List,
            NodePayload::ListItem { .. } => NodeType::ListItem,
            NodePayload::Image { .. } => NodeType::Image,
            NodePayload::Embed { .. } => NodeType::Embed,
            NodePayload::Collapsible { .. } => NodeType::Collapsible,
            NodePayload::HorizontalRule => NodeType::HorizontalRule,
        }
    }
}

/// Node type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Caption,
    Text,
    Paragraph,
    Heading,
    Quote,
    Code,
    List,
    ListItem,
    Image,
    Embed,
    Collapsible,
    HorizontalRule,
}

/// Broad role of a node type in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Element,
    Text,
    Decorator,
}

impl NodeType {
    pub const ALL: [NodeType; 13] = [
        NodeType::Root,
        NodeType::Caption,
        NodeType::Text,
        NodeType::Paragraph,
        NodeType::Heading,
        NodeType::Quote,
        NodeType::Code,
        NodeType::List,
        NodeType::ListItem,
        NodeType::Image,
        NodeType::Embed,
        NodeType::Collapsible,
        NodeType::HorizontalRule,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Root => "root",
            NodeType::Caption => "caption",
            NodeType::Text => "text",
            NodeType::Paragraph => "paragraph",
            NodeType::Heading => "heading",
            NodeType::Quote => "quote",
            NodeType::Code => "code",
            NodeType::List => "list",
            NodeType::ListItem => "listitem",
            NodeType::Image => "image",
            NodeType::Embed => "embed",
            NodeType::Collapsible => "collapsible",
            NodeType::HorizontalRule => "horizontalrule",
        }
    }

    pub fn kind(self) -> NodeKind {
        match self {
            NodeType::Root | NodeType::Caption => NodeKind::Root,
            NodeType::Text => NodeKind::Text,
            NodeType::Image | NodeType::Embed | NodeType::HorizontalRule => NodeKind::Decorator,
            _ => NodeKind::Element,
        }
    }

    /// Blocks that hold inline text directly
    pub fn is_text_block(self) -> bool {
        matches!(
            self,
            NodeType::Paragraph | NodeType::Heading | NodeType::Quote | NodeType::Code
        )
    }

    /// Types allowed as children of a block container (root, collapsible, nested list wrapper)
    pub fn is_block(self) -> bool {
        self.is_text_block()
            || matches!(
                self,
                NodeType::List
                    | NodeType::Image
                    | NodeType::Embed
                    | NodeType::HorizontalRule
                    | NodeType::Collapsible
            )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single element of the document tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    key: NodeKey,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    /// Text format for text nodes; typing format for empty blocks
    pub format: TextFormat,
    pub style: Style,
    pub align: Alignment,
    pub indent: u8,
    pub payload: NodePayload,
}

impl Node {
    pub(crate) fn new(key: NodeKey, payload: NodePayload) -> Self {
        Self {
            key,
            parent: None,
            children: Vec::new(),
            format: TextFormat::empty(),
            style: Style::new(),
            align: Alignment::Unset,
            indent: 0,
            payload,
        }
    }

    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    pub fn parent(&self) -> Option<&NodeKey> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn node_type(&self) -> NodeType {
        self.payload.node_type()
    }

    pub fn kind(&self) -> NodeKind {
        self.node_type().kind()
    }

    pub fn is_text(&self) -> bool {
        self.kind() == NodeKind::Text
    }

    pub fn is_decorator(&self) -> bool {
        self.kind() == NodeKind::Decorator
    }

    /// Roots and elements may hold children
    pub fn is_container(&self) -> bool {
        matches!(self.kind(), NodeKind::Root | NodeKind::Element)
    }

    /// Text content of a text node
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            NodePayload::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Length in chars of a text node, child count for containers, zero otherwise.
    pub fn size(&self) -> usize {
        match &self.payload {
            NodePayload::Text { text } => text.chars().count(),
            _ => self.children.len(),
        }
    }

    /// Key of the caption subtree for decorators that carry one
    pub fn caption(&self) -> Option<&NodeKey> {
        match &self.payload {
            NodePayload::Image { caption, .. } => caption.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeKey>) {
        self.parent = parent;
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<NodeKey> {
        &mut self.children
    }
}

/// Convert a char offset into a byte offset, clamping at the end of `s`.
pub(crate) fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_round_trip_keeps_order() {
        let style = Style::parse("font-size: 15px; color: #333;");
        assert_eq!(style.get("color"), Some("#333"));
        assert_eq!(style.to_css(), "font-size: 15px;color: #333;");
    }

    #[test]
    fn test_style_keeps_semicolons_inside_url() {
        let mut style = Style::new();
        style.set("background-image", " url(data:image/png;base64,AA) ");
        style.set("font-family", "\"A;B\", serif");
        style.set("color", "red");
        let css = style.to_css();
        let reparsed = Style::parse(&css);
        assert_eq!(reparsed, style);
        assert_eq!(reparsed.get("background-image"), Some("url(data:image/png;base64,AA)"));
        assert_eq!(reparsed.to_css(), css);
    }

    #[test]
    fn test_style_rejects_declarations_that_cannot_round_trip() {
        let mut style = Style::parse("color: red;");
        style.set("color", "blue; font-size: 99px");
        style.set("bad key", "x");
        style.set("width", "calc(1px");
        assert_eq!(style.to_css(), "color: red;");
        assert!(!Style::accepts("a:b", "x"));
        assert!(Style::accepts("font-size", "20px"));
    }

    #[test]
    fn test_style_set_empty_removes() {
        let mut style = Style::parse("color: red;");
        style.set("color", "");
        assert!(style.is_empty());
    }

    #[test]
    fn test_sub_and_superscript_are_exclusive() {
        let format = TextFormat::SUBSCRIPT.toggled(TextFormat::SUPERSCRIPT);
        assert_eq!(format, TextFormat::SUPERSCRIPT);
        assert_eq!(format.toggled(TextFormat::SUPERSCRIPT), TextFormat::empty());
    }

    #[test]
    fn test_alignment_codes() {
        for code in 0..=6 {
            assert_eq!(Alignment::from_code(code).unwrap().code(), code);
        }
        assert!(Alignment::from_code(7).is_none());
    }

    #[test]
    fn test_byte_offset_handles_multibyte() {
        assert_eq!(byte_offset("héllo", 2), 3);
        assert_eq!(byte_offset("abc", 10), 3);
    }
}
