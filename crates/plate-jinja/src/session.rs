use plate_core::{CaretText, Editor, TextRange};

use crate::catalog::{CommandCatalog, CommandContext, CommandItem};
use crate::config::PaletteConfig;
use crate::popup::{
    AnchorSource, CandidateView, PopupAdapter, PopupContent, PopupHandle, Rect, resolve_anchor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteKey {
    ArrowUp,
    ArrowDown,
    Enter,
    Escape,
    Other,
}

/// Whether the palette consumed a key. Ignored keys go back to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Committed,
    Cancelled,
    Superseded,
    TriggerLost,
}

/// A trigger character found before the caret, and the query typed after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    pub range: TextRange,
    pub query: String,
}

/// Looks for an active trigger in the text before the caret.
pub fn find_trigger(caret: &CaretText, config: &PaletteConfig) -> Option<TriggerMatch> {
    let before = caret.before_caret();
    let start = if config.start_of_line {
        if !caret.is_block_start || !before.starts_with(config.trigger) {
            return None;
        }
        0
    } else {
        let ix = before.rfind(config.trigger)?;
        let preceded_by_space = before[..ix]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace);
        if !preceded_by_space {
            return None;
        }
        ix
    };

    let query = &before[start + config.trigger.len_utf8()..];
    if !config.allow_spaces && query.contains(char::is_whitespace) {
        return None;
    }
    Some(TriggerMatch {
        range: TextRange::new(caret.path.clone(), start..caret.offset),
        query: query.to_string(),
    })
}

/// One open palette, from trigger to commit or cancel.
#[derive(Debug)]
pub struct SuggestionSession {
    id: u64,
    trigger_range: TextRange,
    query: String,
    candidates: Vec<CommandItem>,
    selected_index: usize,
    anchor: Rect,
    popup: PopupHandle,
    destroyed: bool,
}

impl SuggestionSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn trigger_range(&self) -> &TextRange {
        &self.trigger_range
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn candidates(&self) -> &[CommandItem] {
        &self.candidates
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn selected(&self) -> Option<&CommandItem> {
        self.candidates.get(self.selected_index)
    }

    pub fn popup(&self) -> PopupHandle {
        self.popup
    }

    fn starts_at(&self, trigger: &TriggerMatch) -> bool {
        self.trigger_range.path == trigger.range.path
            && self.trigger_range.range.start == trigger.range.range.start
    }

    fn content(&self) -> PopupContent {
        content_for(self.anchor, &self.query, &self.candidates, self.selected_index)
    }

    fn move_selection(&mut self, delta: isize) -> bool {
        let len = self.candidates.len();
        if len == 0 {
            return false;
        }
        self.selected_index = (self.selected_index as isize + delta).rem_euclid(len as isize) as usize;
        true
    }

    fn teardown(&mut self, popup: &mut dyn PopupAdapter, reason: ExitReason) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        popup.unmount(self.popup);
        log::debug!("palette session {} closed: {reason:?}", self.id);
    }
}

fn content_for(
    anchor: Rect,
    query: &str,
    candidates: &[CommandItem],
    selected_index: usize,
) -> PopupContent {
    PopupContent {
        anchor,
        query: query.to_string(),
        items: candidates
            .iter()
            .enumerate()
            .map(|(ix, item)| CandidateView {
                title: item.title.clone(),
                description: item.description.clone(),
                selected: ix == selected_index,
            })
            .collect(),
        selected_index,
    }
}

/// Drives the slash palette: watches the caret for a trigger, keeps the
/// popup in sync with the query, routes navigation keys and runs the chosen
/// command.
pub struct SuggestionController<P: PopupAdapter> {
    catalog: CommandCatalog,
    config: PaletteConfig,
    popup: P,
    anchor: Option<Box<dyn AnchorSource>>,
    session: Option<SuggestionSession>,
    dismissed: Option<TriggerMatch>,
    next_id: u64,
}

impl<P: PopupAdapter> SuggestionController<P> {
    pub fn new(catalog: CommandCatalog, config: PaletteConfig, popup: P) -> Self {
        let config = config.with_defaults();
        let catalog = catalog.with_max_results(config.max_results);
        Self {
            catalog,
            config,
            popup,
            anchor: None,
            session: None,
            dismissed: None,
            next_id: 1,
        }
    }

    pub fn with_anchor_source(mut self, anchor: impl AnchorSource + 'static) -> Self {
        self.anchor = Some(Box::new(anchor));
        self
    }

    pub fn state(&self) -> SessionState {
        if self.session.is_some() {
            SessionState::Open
        } else {
            SessionState::Idle
        }
    }

    pub fn session(&self) -> Option<&SuggestionSession> {
        self.session.as_ref()
    }

    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &PaletteConfig {
        &self.config
    }

    pub fn popup(&self) -> &P {
        &self.popup
    }

    pub fn popup_mut(&mut self) -> &mut P {
        &mut self.popup
    }

    /// Call after every document or selection change.
    pub fn sync(&mut self, editor: &Editor) {
        let trigger = editor
            .caret_text()
            .and_then(|caret| find_trigger(&caret, &self.config));

        let Some(trigger) = trigger else {
            self.dismissed = None;
            self.exit(ExitReason::TriggerLost);
            return;
        };

        if self.dismissed.as_ref() == Some(&trigger) {
            return;
        }
        self.dismissed = None;

        match &self.session {
            Some(session) if session.starts_at(&trigger) => self.update(trigger),
            _ => self.open(trigger),
        }
    }

    /// Starts a session for `trigger`, closing any session already open.
    pub fn open(&mut self, trigger: TriggerMatch) {
        self.exit(ExitReason::Superseded);

        let id = self.next_id;
        self.next_id += 1;
        let anchor = resolve_anchor(self.anchor.as_deref());
        let candidates = self.catalog.filter(&trigger.query);
        let content = content_for(anchor, &trigger.query, &candidates, 0);
        let popup = self.popup.mount(&content);
        log::debug!(
            "palette session {id} opened with query {:?} ({} candidates)",
            trigger.query,
            candidates.len()
        );
        self.session = Some(SuggestionSession {
            id,
            trigger_range: trigger.range,
            query: trigger.query,
            candidates,
            selected_index: 0,
            anchor,
            popup,
            destroyed: false,
        });
    }

    fn update(&mut self, trigger: TriggerMatch) {
        let anchor = resolve_anchor(self.anchor.as_deref());
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.query != trigger.query {
            session.candidates = self.catalog.filter(&trigger.query);
            session.selected_index = session
                .selected_index
                .min(session.candidates.len().saturating_sub(1));
        }
        session.trigger_range = trigger.range;
        session.query = trigger.query;
        session.anchor = anchor;
        self.popup.update(session.popup, &session.content());
    }

    pub fn handle_key(&mut self, editor: &mut Editor, key: PaletteKey) -> KeyOutcome {
        let Some(session) = self.session.as_mut() else {
            return KeyOutcome::Ignored;
        };
        match key {
            PaletteKey::ArrowUp | PaletteKey::ArrowDown => {
                let delta = if key == PaletteKey::ArrowUp { -1 } else { 1 };
                if session.move_selection(delta) {
                    self.popup.update(session.popup, &session.content());
                }
                KeyOutcome::Handled
            }
            PaletteKey::Enter => {
                let index = session.selected_index;
                self.commit(editor, index);
                KeyOutcome::Handled
            }
            PaletteKey::Escape => {
                self.cancel();
                KeyOutcome::Handled
            }
            PaletteKey::Other => KeyOutcome::Ignored,
        }
    }

    /// Pointer selection of the candidate at `index`.
    pub fn select(&mut self, editor: &mut Editor, index: usize) -> KeyOutcome {
        if self.session.is_none() {
            return KeyOutcome::Ignored;
        }
        self.commit(editor, index);
        KeyOutcome::Handled
    }

    /// Escape or loss of focus.
    pub fn cancel(&mut self) {
        self.dismiss_current();
        self.exit(ExitReason::Cancelled);
    }

    /// Runs the candidate at `index` against its trigger range, then closes
    /// the session. With no such candidate nothing happens.
    fn commit(&mut self, editor: &mut Editor, index: usize) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(item) = session.candidates.get(index).cloned() else {
            return;
        };
        let context = CommandContext {
            range: session.trigger_range.clone(),
        };
        log::debug!("palette session {} running `{}`", session.id, item.title);
        if let Err(err) = item.execute(editor, &context) {
            log::warn!("palette command `{}` failed: {err}", item.title);
            self.dismiss_current();
        }
        self.exit(ExitReason::Committed);
    }

    /// Keeps `sync` from reopening the same trigger until the text changes.
    fn dismiss_current(&mut self) {
        if let Some(session) = &self.session {
            self.dismissed = Some(TriggerMatch {
                range: session.trigger_range.clone(),
                query: session.query.clone(),
            });
        }
    }

    fn exit(&mut self, reason: ExitReason) {
        if let Some(mut session) = self.session.take() {
            session.teardown(&mut self.popup, reason);
        }
    }
}

impl<P: PopupAdapter> Drop for SuggestionController<P> {
    fn drop(&mut self) {
        self.exit(ExitReason::Cancelled);
    }
}
