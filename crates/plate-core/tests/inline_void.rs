use plate_core::{
    Document, Editor, ElementNode, Node, Op, PluginRegistry, Point, Selection, Transaction,
    VoidNode, insert_inline_void,
};

fn chip() -> VoidNode {
    VoidNode {
        kind: "chip".to_string(),
        attrs: Default::default(),
    }
}

fn paragraph_children(editor: &Editor) -> &[Node] {
    let Some(Node::Element(ElementNode { children, .. })) = editor.doc().children.first() else {
        panic!("expected paragraph element");
    };
    children
}

fn editor_with(children: Vec<Node>, selection: Selection) -> Editor {
    let doc = Document {
        children: vec![Node::Element(ElementNode {
            kind: "paragraph".to_string(),
            attrs: Default::default(),
            children,
        })],
    };
    Editor::new(doc, selection, PluginRegistry::core())
}

#[test]
fn inline_void_splits_text_at_caret() {
    let mut editor = editor_with(
        vec![Node::text("hello")],
        Selection::collapsed(Point::new(vec![0, 0], 2)),
    );

    let tx = insert_inline_void(&editor, chip(), "test:chip").unwrap();
    editor.apply(tx).unwrap();

    assert_eq!(
        paragraph_children(&editor),
        &[Node::text("he"), Node::Void(chip()), Node::text("llo")]
    );
    assert_eq!(editor.selection().focus, Point::new(vec![0, 2], 0));
}

#[test]
fn inline_void_at_block_start_keeps_trailing_text_leaf() {
    let mut editor = editor_with(
        vec![Node::text("")],
        Selection::collapsed(Point::new(vec![0, 0], 0)),
    );

    let tx = insert_inline_void(&editor, chip(), "test:chip").unwrap();
    editor.apply(tx).unwrap();

    assert_eq!(
        paragraph_children(&editor),
        &[Node::Void(chip()), Node::text("")]
    );
    let caret = editor.caret_text().unwrap();
    assert_eq!(caret.path, vec![0, 1]);
    assert!(!caret.is_block_start);
}

#[test]
fn inline_void_replaces_selection_within_one_leaf() {
    let mut editor = editor_with(
        vec![Node::text("hello")],
        Selection {
            anchor: Point::new(vec![0, 0], 4),
            focus: Point::new(vec![0, 0], 1),
        },
    );

    let tx = insert_inline_void(&editor, chip(), "test:chip").unwrap();
    editor.apply(tx).unwrap();

    assert_eq!(
        paragraph_children(&editor),
        &[Node::text("h"), Node::Void(chip()), Node::text("o")]
    );
}

#[test]
fn removing_void_merges_surrounding_text() {
    let mut editor = editor_with(
        vec![Node::text("a"), Node::Void(chip()), Node::text("b")],
        Selection::collapsed(Point::new(vec![0, 2], 0)),
    );

    editor
        .apply(Transaction::new(vec![Op::RemoveNode { path: vec![0, 1] }]))
        .unwrap();

    assert_eq!(paragraph_children(&editor), &[Node::text("ab")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 1));
}

#[test]
fn selection_on_void_moves_to_next_text_leaf() {
    let editor = editor_with(
        vec![Node::text("a"), Node::Void(chip()), Node::text("b")],
        Selection::collapsed(Point::new(vec![0, 1], 0)),
    );
    assert_eq!(editor.selection().focus, Point::new(vec![0, 2], 0));
}

#[test]
fn caret_text_reports_text_before_caret() {
    let editor = editor_with(
        vec![Node::text("/hea")],
        Selection::collapsed(Point::new(vec![0, 0], 3)),
    );
    let caret = editor.caret_text().unwrap();
    assert_eq!(caret.before_caret(), "/he");
    assert!(caret.is_block_start);
}
