//! Serializer and dispatch benchmarks
//!
//! Target: import and export a 500-block note in <5ms

use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use inkwell_editor::keys::KeyGenerator;
use inkwell_editor::registry::NodeTypeRegistry;
use inkwell_editor::serializer::{export_string, import_json};
use inkwell_editor::{Command, Editor, ManualClock};
use serde_json::{json, Value};

fn generate_note(blocks: usize) -> Value {
    let mut children = Vec::new();
    for i in 0..blocks {
        let block = match i % 5 {
            0 => json!({ "type": "heading", "tag": "h2", "children": [
                { "type": "text", "text": format!("Section {i}"), "format": 1 }
            ]}),
            1 => json!({ "type": "list", "listType": "check", "start": 1, "children": [
                { "type": "listitem", "value": 1, "checked": true, "children": [
                    { "type": "text", "text": "done" }
                ]},
                { "type": "listitem", "value": 2, "checked": false, "children": [
                    { "type": "text", "text": "pending" }
                ]}
            ]}),
            2 => json!({ "type": "code", "language": "rust", "children": [
                { "type": "text", "text": "fn main() {\n}" }
            ]}),
            _ => json!({ "type": "paragraph", "children": [
                { "type": "text", "text": "Plain words and ", "style": "color: #333" },
                { "type": "text", "text": "emphasis", "format": 2 }
            ]}),
        };
        children.push(block);
    }
    json!({ "type": "root", "children": children })
}

fn import_large_note(c: &mut Criterion) {
    let note = generate_note(500);
    let registry = NodeTypeRegistry::new();

    c.bench_function("import_500_blocks", |b| {
        b.iter(|| {
            let mut keys = KeyGenerator::new(Some("bench"));
            import_json(black_box(&note), &registry, &mut keys)
        })
    });
}

fn export_large_note(c: &mut Criterion) {
    let note = generate_note(500);
    let registry = NodeTypeRegistry::new();
    let mut keys = KeyGenerator::new(Some("bench"));
    let outcome = import_json(&note, &registry, &mut keys).expect("bench note imports");

    c.bench_function("export_500_blocks", |b| {
        b.iter(|| export_string(black_box(&outcome.state), &registry))
    });
}

fn typing_burst(c: &mut Criterion) {
    c.bench_function("dispatch_100_keystrokes", |b| {
        b.iter(|| {
            let mut editor = Editor::builder()
                .clock(Rc::new(ManualClock::new(0)))
                .build()
                .expect("editor builds");
            for _ in 0..100 {
                let _ = editor.dispatch(Command::insert_text(black_box("x")));
            }
            editor
        })
    });
}

criterion_group!(benches, import_large_note, export_large_note, typing_burst);
criterion_main!(benches);
