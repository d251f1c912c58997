//! Plain-text preview of a document, as shown in note listings.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::EditorConfig;
use crate::node::{NodePayload, NodeType};
use crate::state::EditorState;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewOptions {
    pub max_length: usize,
    /// Placeholder text removed before truncation
    pub excluded_phrases: Vec<String>,
}

impl PreviewOptions {
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            max_length: config.preview_max_length,
            excluded_phrases: config.preview_excluded_phrases.clone(),
        }
    }
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self::from_config(&EditorConfig::default())
    }
}

/// Sanitized plain-text preview: block texts joined by spaces, captions and
/// excluded phrases dropped, whitespace collapsed, truncated with an ellipsis.
pub fn generate(state: &EditorState, options: &PreviewOptions) -> String {
    let mut blocks = Vec::new();
    for key in state.preorder(state.root_key()) {
        let Some(node) = state.node(&key) else { continue };
        let holds_text = node.node_type().is_text_block()
            || (node.node_type() == NodeType::ListItem
                && node.children().iter().all(|c| state.node_type(c) == Some(NodeType::Text)));
        if holds_text {
            blocks.push(state.text_content(&key));
        }
    }
    let mut text = blocks.join(" ");
    for phrase in options.excluded_phrases.iter().filter(|p| !p.is_empty()) {
        text = text.replace(phrase.as_str(), " ");
    }
    let text = WHITESPACE_RE.replace_all(&text, " ");
    truncate(text.trim(), options.max_length)
}

/// Cut `text` to at most `max` chars, ellipsis included.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    // no room for the ellipsis
    if max <= ELLIPSIS.len() {
        return text.chars().take(max).collect();
    }
    let keep = max - ELLIPSIS.len();
    let mut out: String = text.chars().take(keep).collect();
    out.truncate(out.trim_end().len());
    out.push_str(ELLIPSIS);
    out
}

/// Source of the first image or embed in document order, or `""`.
pub fn representative_image(state: &EditorState) -> String {
    state
        .preorder(state.root_key())
        .iter()
        .filter_map(|k| state.node(k))
        .find_map(|n| match &n.payload {
            NodePayload::Image { src, .. } | NodePayload::Embed { src, .. } => Some(src.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyGenerator;
    use crate::registry::NodeTypeRegistry;
    use crate::serializer::import_json;
    use serde_json::json;

    fn state(children: serde_json::Value) -> EditorState {
        let blob = json!({ "type": "root", "children": children });
        import_json(&blob, &NodeTypeRegistry::new(), &mut KeyGenerator::default())
            .unwrap()
            .state
    }

    #[test]
    fn test_blocks_are_joined_and_whitespace_collapsed() {
        let state = state(json!([
            { "type": "heading", "tag": "h1", "children": [{ "type": "text", "text": "Trip  plan" }] },
            { "type": "list", "listType": "bullet", "children": [
                { "type": "listitem", "children": [{ "type": "text", "text": "\tpack\n" }] }
            ]}
        ]));
        assert_eq!(generate(&state, &PreviewOptions::default()), "Trip plan pack");
    }

    #[test]
    fn test_captions_and_placeholders_are_excluded() {
        let state = state(json!([
            { "type": "paragraph", "children": [{ "type": "text", "text": "Enter a caption... Body" }] },
            { "type": "image", "src": "https://example.com/i.png", "caption": {
                "type": "caption",
                "children": [{ "type": "paragraph", "children": [{ "type": "text", "text": "secret" }] }]
            }}
        ]));
        assert_eq!(generate(&state, &PreviewOptions::default()), "Body");
        assert_eq!(representative_image(&state), "https://example.com/i.png");
    }

    #[test]
    fn test_long_text_is_truncated_with_ellipsis() {
        let state = state(json!([
            { "type": "paragraph", "children": [{ "type": "text", "text": "word ".repeat(60) }] }
        ]));
        let options = PreviewOptions {
            max_length: 20,
            excluded_phrases: Vec::new(),
        };
        let preview = generate(&state, &options);
        assert!(preview.chars().count() <= 20);
        assert!(preview.ends_with("..."));
        assert_eq!(preview, "word word word wo...");
    }

    #[test]
    fn test_tiny_limit_never_exceeds_max_length() {
        let state = state(json!([
            { "type": "paragraph", "children": [{ "type": "text", "text": "Hello world" }] }
        ]));
        for max_length in 0..=4 {
            let options = PreviewOptions {
                max_length,
                excluded_phrases: Vec::new(),
            };
            let preview = generate(&state, &options);
            assert!(preview.chars().count() <= max_length, "{max_length}: {preview:?}");
        }
        assert_eq!(truncate("Hello world", 2), "He");
        assert_eq!(truncate("Hello world", 4), "H...");
    }

    #[test]
    fn test_empty_document_has_no_image() {
        let state = state(json!([{ "type": "paragraph" }]));
        assert_eq!(generate(&state, &PreviewOptions::default()), "");
        assert_eq!(representative_image(&state), "");
    }
}
