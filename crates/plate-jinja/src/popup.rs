use serde::{Deserialize, Serialize};

/// Screen rectangle in host pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Identifies one mounted popup. Issued by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PopupHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateView {
    pub title: String,
    pub description: Option<String>,
    pub selected: bool,
}

/// Everything a popup needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent {
    pub anchor: Rect,
    pub query: String,
    pub items: Vec<CandidateView>,
    pub selected_index: usize,
}

impl PopupContent {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Host-side popup surface. A session mounts exactly once, updates any number
/// of times and unmounts exactly once.
pub trait PopupAdapter {
    fn mount(&mut self, content: &PopupContent) -> PopupHandle;
    fn update(&mut self, handle: PopupHandle, content: &PopupContent);
    fn unmount(&mut self, handle: PopupHandle);
}

/// Supplies the caret's on-screen rectangle, when the host knows it.
pub trait AnchorSource {
    fn caret_rect(&self) -> Option<Rect>;
}

impl<F> AnchorSource for F
where
    F: Fn() -> Option<Rect>,
{
    fn caret_rect(&self) -> Option<Rect> {
        self()
    }
}

/// Falls back to a zero rectangle when no anchor is available.
pub fn resolve_anchor(source: Option<&dyn AnchorSource>) -> Rect {
    source.and_then(|s| s.caret_rect()).unwrap_or_default()
}
