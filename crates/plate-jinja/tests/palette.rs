use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use plate_core::{
    CommandError, Document, Editor, ElementNode, Node, Op, Point, Selection, Transaction,
};
use plate_jinja::{
    CommandCatalog, CommandItem, JINJA_TAG_KIND, KeyOutcome, PaletteConfig, PaletteKey,
    PopupAdapter, PopupContent, PopupHandle, Rect, SessionState, SuggestionController,
    TemplateReference, TemplateRegistry, document_to_html, richtext_with_templates,
};
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Mount(u64),
    Update(u64),
    Unmount(u64),
}

#[derive(Clone, Default)]
struct RecordingPopup {
    events: Rc<RefCell<Vec<Event>>>,
    frames: Rc<RefCell<Vec<PopupContent>>>,
    next: u64,
}

impl RecordingPopup {
    fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    fn last_frame(&self) -> PopupContent {
        self.frames.borrow().last().cloned().unwrap()
    }
}

impl PopupAdapter for RecordingPopup {
    fn mount(&mut self, content: &PopupContent) -> PopupHandle {
        self.next += 1;
        self.events.borrow_mut().push(Event::Mount(self.next));
        self.frames.borrow_mut().push(content.clone());
        PopupHandle(self.next)
    }

    fn update(&mut self, handle: PopupHandle, content: &PopupContent) {
        self.events.borrow_mut().push(Event::Update(handle.0));
        self.frames.borrow_mut().push(content.clone());
    }

    fn unmount(&mut self, handle: PopupHandle) {
        self.events.borrow_mut().push(Event::Unmount(handle.0));
    }
}

fn registry() -> Arc<TemplateRegistry> {
    let raw = include_str!("fixtures/microtemplates.json");
    Arc::new(TemplateRegistry::from_json_str(raw).unwrap())
}

fn editor_with(children: Vec<Node>, caret: Point) -> Editor {
    let plugins = richtext_with_templates(registry()).unwrap();
    Editor::new(Document { children }, Selection::collapsed(caret), plugins)
}

fn empty_editor() -> Editor {
    editor_with(vec![Node::paragraph("")], Point::new(vec![0, 0], 0))
}

fn standard_controller() -> (SuggestionController<RecordingPopup>, RecordingPopup) {
    let popup = RecordingPopup::default();
    let controller = SuggestionController::new(
        CommandCatalog::standard(registry()),
        PaletteConfig::default(),
        popup.clone(),
    );
    (controller, popup)
}

fn type_text(editor: &mut Editor, controller: &mut SuggestionController<RecordingPopup>, text: &str) {
    for ch in text.chars() {
        let caret = editor.caret_text().unwrap();
        let tx = Transaction::new(vec![Op::InsertText {
            path: caret.path.clone(),
            offset: caret.offset,
            text: ch.to_string(),
        }])
        .selection_after(Selection::collapsed(Point::new(
            caret.path,
            caret.offset + ch.len_utf8(),
        )));
        editor.apply(tx).unwrap();
        controller.sync(editor);
    }
}

fn titles(items: &[CommandItem]) -> Vec<&str> {
    items.iter().map(|item| item.title.as_str()).collect()
}

fn noop(title: &str) -> CommandItem {
    CommandItem::new(title, |_, _| Ok(()))
}

fn first_block(editor: &Editor) -> &ElementNode {
    let Some(Node::Element(el)) = editor.doc().children.first() else {
        panic!("expected element block");
    };
    el
}

#[test]
fn prefix_filter_matches_titles_and_aliases() {
    let catalog = CommandCatalog::new(vec![
        noop("Heading 1").aliases(["h1"]),
        noop("Heading 2").aliases(["h2"]),
        noop("Heading 3").aliases(["h3"]),
        noop("Bullet List").aliases(["ul"]),
    ]);

    assert_eq!(
        titles(&catalog.filter("h")),
        vec!["Heading 1", "Heading 2", "Heading 3"]
    );
    assert_eq!(titles(&catalog.filter("H1")), vec!["Heading 1"]);
    assert_eq!(titles(&catalog.filter("bul")), vec!["Bullet List"]);
    assert!(catalog.filter("list").is_empty());
}

#[test]
fn empty_query_is_capped_at_ten() {
    let items = (0..12).map(|i| noop(&format!("Item {i}"))).collect();
    let catalog = CommandCatalog::new(items);
    let all = catalog.filter("");
    assert_eq!(all.len(), 10);
    assert_eq!(all[0].title, "Item 0");
    assert_eq!(all[9].title, "Item 9");
}

#[test]
fn aliases_are_deduplicated_in_order() {
    let item = noop("Text").aliases(["p", "paragraph", "p"]);
    assert_eq!(item.aliases, vec!["p".to_string(), "paragraph".to_string()]);
}

#[test]
fn standard_catalog_lists_blocks_then_templates() {
    let catalog = CommandCatalog::standard(registry());
    assert_eq!(
        titles(catalog.items()),
        vec![
            "Text",
            "Heading 1",
            "Heading 2",
            "Heading 3",
            "Bullet List",
            "Numbered List",
            "Divider",
            "Button",
            "Menu",
            "Current Year",
        ]
    );
    assert_eq!(titles(&catalog.filter("year")), vec!["Current Year"]);
    assert_eq!(titles(&catalog.filter("heading")), vec!["Heading 1", "Heading 2", "Heading 3"]);
}

#[test]
fn slash_menu_inserts_template_end_to_end() {
    let mut editor = empty_editor();
    let (mut controller, popup) = standard_controller();

    type_text(&mut editor, &mut controller, "/");
    assert_eq!(controller.state(), SessionState::Open);
    assert_eq!(controller.session().unwrap().query(), "");
    assert_eq!(controller.session().unwrap().candidates().len(), 10);

    type_text(&mut editor, &mut controller, "menu");
    let session = controller.session().unwrap();
    assert_eq!(session.query(), "menu");
    assert_eq!(titles(session.candidates()), vec!["Menu"]);
    assert_eq!(popup.last_frame().items[0].title, "Menu");
    assert!(popup.last_frame().items[0].selected);

    assert_eq!(controller.handle_key(&mut editor, PaletteKey::Enter), KeyOutcome::Handled);
    assert_eq!(controller.state(), SessionState::Idle);

    let block = first_block(&editor);
    assert_eq!(block.plain_text(), "");
    let Some(Node::Void(void)) = block.children.first() else {
        panic!("expected template node first");
    };
    assert_eq!(void.kind, JINJA_TAG_KIND);
    let reference = TemplateReference::from_node(void).unwrap();
    assert_eq!(reference.template_id, "menu");
    assert_eq!(reference.params.get("type"), Some(&json!("primary")));

    controller.sync(&editor);
    assert_eq!(controller.state(), SessionState::Idle);

    let events = popup.events();
    assert_eq!(events.first(), Some(&Event::Mount(1)));
    assert_eq!(events.last(), Some(&Event::Unmount(1)));
    assert_eq!(events.iter().filter(|e| **e == Event::Unmount(1)).count(), 1);

    assert_eq!(
        document_to_html(editor.doc()).unwrap(),
        r#"<p><span data-jinja-tag="menu" data-jinja-params="{&quot;type&quot;:&quot;primary&quot;}" data-drag-handle=""></span></p>"#
    );
}

#[test]
fn arrows_wrap_and_enter_runs_selected_block_command() {
    let mut editor = empty_editor();
    let (mut controller, _popup) = standard_controller();

    type_text(&mut editor, &mut controller, "/heading");
    assert_eq!(controller.session().unwrap().candidates().len(), 3);

    controller.handle_key(&mut editor, PaletteKey::ArrowUp);
    assert_eq!(controller.session().unwrap().selected_index(), 2);
    controller.handle_key(&mut editor, PaletteKey::ArrowDown);
    assert_eq!(controller.session().unwrap().selected_index(), 0);
    controller.handle_key(&mut editor, PaletteKey::ArrowDown);
    assert_eq!(controller.session().unwrap().selected_index(), 1);

    controller.handle_key(&mut editor, PaletteKey::Enter);
    assert_eq!(editor.doc().children[0], Node::heading(2, ""));
    assert_eq!(controller.state(), SessionState::Idle);
}

#[test]
fn pointer_selection_commits_that_index() {
    let mut editor = empty_editor();
    let (mut controller, _popup) = standard_controller();

    type_text(&mut editor, &mut controller, "/ul");
    assert_eq!(controller.select(&mut editor, 0), KeyOutcome::Handled);

    let block = first_block(&editor);
    assert_eq!(block.kind, "list_item");
    assert_eq!(block.attrs.get("list_type"), Some(&json!("bulleted")));
    assert_eq!(block.plain_text(), "");
}

#[test]
fn zero_candidates_make_keys_no_ops() {
    let mut editor = empty_editor();
    let (mut controller, _popup) = standard_controller();

    type_text(&mut editor, &mut controller, "/zzz");
    assert!(controller.session().unwrap().candidates().is_empty());
    let before = editor.doc().clone();

    assert_eq!(controller.handle_key(&mut editor, PaletteKey::ArrowDown), KeyOutcome::Handled);
    assert_eq!(controller.handle_key(&mut editor, PaletteKey::ArrowUp), KeyOutcome::Handled);
    assert_eq!(controller.session().unwrap().selected_index(), 0);

    assert_eq!(controller.handle_key(&mut editor, PaletteKey::Enter), KeyOutcome::Handled);
    assert_eq!(editor.doc(), &before);
    assert_eq!(controller.state(), SessionState::Open);
}

#[test]
fn narrowing_query_does_not_run_stale_selection() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let catalog = CommandCatalog::new(vec![
        noop("Alpha"),
        CommandItem::new("Beta", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    ]);
    let mut editor = empty_editor();
    let mut controller =
        SuggestionController::new(catalog, PaletteConfig::default(), RecordingPopup::default());

    type_text(&mut editor, &mut controller, "/");
    controller.handle_key(&mut editor, PaletteKey::ArrowDown);
    assert_eq!(controller.session().unwrap().selected_index(), 1);

    type_text(&mut editor, &mut controller, "x");
    assert!(controller.session().unwrap().candidates().is_empty());
    controller.handle_key(&mut editor, PaletteKey::Enter);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[test]
fn escape_cancels_without_running_anything() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let catalog = CommandCatalog::new(vec![CommandItem::new("Count", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })]);
    let popup = RecordingPopup::default();
    let mut editor = empty_editor();
    let mut controller = SuggestionController::new(catalog, PaletteConfig::default(), popup.clone());

    type_text(&mut editor, &mut controller, "/co");
    assert_eq!(controller.handle_key(&mut editor, PaletteKey::Escape), KeyOutcome::Handled);
    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(first_block(&editor).plain_text(), "/co");

    controller.sync(&editor);
    assert_eq!(controller.state(), SessionState::Idle);

    type_text(&mut editor, &mut controller, "u");
    assert_eq!(controller.state(), SessionState::Open);
    assert_eq!(controller.session().unwrap().id(), 2);
    assert_eq!(popup.events().last(), Some(&Event::Mount(2)));
}

#[test]
fn other_keys_are_returned_to_the_editor() {
    let mut editor = empty_editor();
    let (mut controller, _popup) = standard_controller();
    assert_eq!(controller.handle_key(&mut editor, PaletteKey::Enter), KeyOutcome::Ignored);

    type_text(&mut editor, &mut controller, "/");
    assert_eq!(controller.handle_key(&mut editor, PaletteKey::Other), KeyOutcome::Ignored);
    assert_eq!(controller.state(), SessionState::Open);
}

#[test]
fn new_trigger_tears_down_previous_session_once() {
    let mut editor = editor_with(
        vec![Node::paragraph("/a"), Node::paragraph("/b")],
        Point::new(vec![0, 0], 2),
    );
    let (mut controller, popup) = standard_controller();

    controller.sync(&editor);
    editor.set_selection(Selection::collapsed(Point::new(vec![1, 0], 2)));
    controller.sync(&editor);
    assert_eq!(
        popup.events(),
        vec![Event::Mount(1), Event::Unmount(1), Event::Mount(2)]
    );

    controller.cancel();
    controller.cancel();
    drop(controller);
    assert_eq!(
        popup.events(),
        vec![
            Event::Mount(1),
            Event::Unmount(1),
            Event::Mount(2),
            Event::Unmount(2)
        ]
    );
}

#[test]
fn dropping_controller_closes_live_popup() {
    let mut editor = empty_editor();
    let (mut controller, popup) = standard_controller();
    type_text(&mut editor, &mut controller, "/");
    drop(controller);
    assert_eq!(popup.events(), vec![Event::Mount(1), Event::Unmount(1)]);
}

#[test]
fn caret_leaving_trigger_or_space_cancels() {
    let mut editor = empty_editor();
    let (mut controller, _popup) = standard_controller();

    type_text(&mut editor, &mut controller, "/he");
    editor.set_selection(Selection::collapsed(Point::new(vec![0, 0], 0)));
    controller.sync(&editor);
    assert_eq!(controller.state(), SessionState::Idle);

    let mut editor = empty_editor();
    type_text(&mut editor, &mut controller, "/h");
    assert_eq!(controller.state(), SessionState::Open);
    type_text(&mut editor, &mut controller, " ");
    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(first_block(&editor).plain_text(), "/h ");
}

#[test]
fn trigger_after_text_is_ignored_at_line_start_only() {
    let mut editor = editor_with(vec![Node::paragraph("ab")], Point::new(vec![0, 0], 2));
    let (mut controller, _popup) = standard_controller();
    type_text(&mut editor, &mut controller, " /");
    assert_eq!(controller.state(), SessionState::Idle);

    let config = PaletteConfig {
        start_of_line: false,
        ..PaletteConfig::default()
    };
    let mut controller =
        SuggestionController::new(CommandCatalog::standard(registry()), config, RecordingPopup::default());
    controller.sync(&editor);
    assert_eq!(controller.state(), SessionState::Open);
    assert_eq!(controller.session().unwrap().trigger_range().range, 3..4);
}

#[test]
fn failed_command_closes_session_and_keeps_text() {
    let catalog = CommandCatalog::new(vec![CommandItem::new("Broken", |_, _| {
        Err(CommandError::new("boom"))
    })]);
    let mut editor = empty_editor();
    let mut controller = SuggestionController::new(catalog, PaletteConfig::default(), RecordingPopup::default());

    type_text(&mut editor, &mut controller, "/b");
    controller.handle_key(&mut editor, PaletteKey::Enter);
    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(first_block(&editor).plain_text(), "/b");

    controller.sync(&editor);
    assert_eq!(controller.state(), SessionState::Idle);
}

#[test]
fn missing_anchor_falls_back_to_zero_rect() {
    let mut editor = empty_editor();
    let (mut controller, popup) = standard_controller();
    type_text(&mut editor, &mut controller, "/");
    assert_eq!(popup.last_frame().anchor, Rect::default());

    let popup = RecordingPopup::default();
    let mut controller =
        SuggestionController::new(CommandCatalog::standard(registry()), PaletteConfig::default(), popup.clone())
            .with_anchor_source(|| -> Option<Rect> { None });
    controller.sync(&editor);
    assert_eq!(popup.last_frame().anchor, Rect::default());
    controller.cancel();

    let popup = RecordingPopup::default();
    let rect = Rect::new(10.0, 20.0, 1.0, 16.0);
    let mut controller =
        SuggestionController::new(CommandCatalog::standard(registry()), PaletteConfig::default(), popup.clone())
            .with_anchor_source(move || Some(rect));
    controller.sync(&editor);
    assert_eq!(popup.last_frame().anchor, rect);
}

#[test]
fn anchor_is_refreshed_on_every_update() {
    let caret_rect: Rc<Cell<Option<Rect>>> = Rc::new(Cell::new(None));
    let source = caret_rect.clone();
    let popup = RecordingPopup::default();
    let mut controller =
        SuggestionController::new(CommandCatalog::standard(registry()), PaletteConfig::default(), popup.clone())
            .with_anchor_source(move || source.get());
    let mut editor = empty_editor();

    let first = Rect::new(4.0, 8.0, 1.0, 16.0);
    caret_rect.set(Some(first));
    type_text(&mut editor, &mut controller, "/");
    assert_eq!(popup.last_frame().anchor, first);

    let moved = Rect::new(12.0, 8.0, 1.0, 16.0);
    caret_rect.set(Some(moved));
    type_text(&mut editor, &mut controller, "m");
    assert_eq!(popup.events().last(), Some(&Event::Update(1)));
    assert_eq!(popup.last_frame().anchor, moved);

    caret_rect.set(None);
    type_text(&mut editor, &mut controller, "e");
    assert_eq!(popup.events().last(), Some(&Event::Update(1)));
    assert_eq!(popup.last_frame().anchor, Rect::default());
    assert_eq!(controller.session().unwrap().query(), "me");
}

#[test]
fn committed_command_undoes_in_one_step() {
    let mut editor = empty_editor();
    let (mut controller, _popup) = standard_controller();

    type_text(&mut editor, &mut controller, "/menu");
    controller.handle_key(&mut editor, PaletteKey::Enter);
    assert!(matches!(first_block(&editor).children.first(), Some(Node::Void(_))));

    assert!(editor.undo());
    assert_eq!(editor.doc().children[0], Node::paragraph("/menu"));
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 5));

    assert!(editor.redo());
    assert!(matches!(first_block(&editor).children.first(), Some(Node::Void(_))));
    assert_eq!(first_block(&editor).plain_text(), "");
}

#[test]
fn failing_command_restores_deleted_trigger() {
    let catalog = CommandCatalog::new(vec![CommandItem::new("Half done", |editor, context| {
        editor
            .delete_text_range(&context.range)
            .map_err(|err| CommandError::new(err.to_string()))?;
        Err(CommandError::new("second step failed"))
    })]);
    let mut editor = empty_editor();
    let mut controller = SuggestionController::new(catalog, PaletteConfig::default(), RecordingPopup::default());

    type_text(&mut editor, &mut controller, "/ha");
    controller.handle_key(&mut editor, PaletteKey::Enter);

    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(editor.doc().children[0], Node::paragraph("/ha"));
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 3));

    controller.sync(&editor);
    assert_eq!(controller.state(), SessionState::Idle);
}
