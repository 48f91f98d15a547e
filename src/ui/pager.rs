//! Purpose: Forward-only cursor pagination with a back-history, as pure state.
//! Exports: `PageState`, `PageMarker`, `LoadRequest`, `LoadMode`.
//! Role: Decides which list request each console action issues; commits results.
//! Invariants: Actions only describe a load; state changes happen in `apply` after success.
//! Invariants: After any successful load, `history[index]` produced the displayed page.
//! Invariants: `history[0]` is always `PageMarker::First` once a page has loaded.
use crate::core::paging::{ListQuery, PageSize};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageMarker {
    /// The first page, requested without a cursor.
    First,
    Cursor(String),
}

impl PageMarker {
    fn from_cursor(cursor: Option<&str>) -> Self {
        match cursor {
            Some(cursor) => PageMarker::Cursor(cursor.to_string()),
            None => PageMarker::First,
        }
    }

    pub fn cursor(&self) -> Option<&str> {
        match self {
            PageMarker::First => None,
            PageMarker::Cursor(cursor) => Some(cursor),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    /// Start over at the first page (initial load, search, reset).
    Restart,
    /// Advance to the next page.
    Push,
    /// Step back to the history entry at this index.
    Seek(usize),
    /// Reload the page currently shown.
    Stay,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    pub cursor: Option<String>,
    pub search: String,
    pub mode: LoadMode,
}

#[derive(Clone, Debug)]
pub struct PageState {
    page_size: PageSize,
    search: String,
    current: Option<String>,
    next: Option<String>,
    history: Vec<PageMarker>,
    index: usize,
}

impl PageState {
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page_size,
            search: String::new(),
            current: None,
            next: None,
            history: Vec::new(),
            index: 0,
        }
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn search_term(&self) -> &str {
        &self.search
    }

    pub fn current_cursor(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn next_cursor(&self) -> Option<&str> {
        self.next.as_deref()
    }

    pub fn history(&self) -> &[PageMarker] {
        &self.history
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn can_go_back(&self) -> bool {
        self.index > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.next.is_some()
    }

    pub fn page_label(&self) -> String {
        format!("Page {}", self.index + 1)
    }

    pub fn initial_load(&self) -> LoadRequest {
        self.restart(self.search.clone())
    }

    pub fn search(&self, term: &str) -> LoadRequest {
        self.restart(term.trim().to_string())
    }

    pub fn reset(&self) -> LoadRequest {
        self.restart(String::new())
    }

    pub fn next(&self) -> Option<LoadRequest> {
        let cursor = self.next.clone()?;
        Some(LoadRequest {
            cursor: Some(cursor),
            search: self.search.clone(),
            mode: LoadMode::Push,
        })
    }

    pub fn previous(&self) -> Option<LoadRequest> {
        if !self.can_go_back() {
            return None;
        }
        let target = self.index - 1;
        let cursor = self.history.get(target)?.cursor().map(str::to_string);
        Some(LoadRequest {
            cursor,
            search: self.search.clone(),
            mode: LoadMode::Seek(target),
        })
    }

    pub fn reload(&self) -> LoadRequest {
        if self.history.is_empty() {
            return self.initial_load();
        }
        LoadRequest {
            cursor: self.current.clone(),
            search: self.search.clone(),
            mode: LoadMode::Stay,
        }
    }

    pub fn query_for(&self, request: &LoadRequest) -> ListQuery {
        ListQuery::new(self.page_size)
            .with_search(request.search.clone())
            .with_offset(request.cursor.clone())
    }

    /// Commits a successful load of `request` that returned `next` as its cursor.
    pub fn apply(&mut self, request: &LoadRequest, next: Option<&str>) {
        self.search = request.search.clone();
        self.current = request.cursor.clone();
        self.next = next.filter(|cursor| !cursor.is_empty()).map(str::to_string);
        match request.mode {
            LoadMode::Restart => self.seed_history(),
            LoadMode::Push => {
                if self.history.is_empty() {
                    self.seed_history();
                }
                self.history.truncate(self.index + 1);
                self.history
                    .push(PageMarker::from_cursor(request.cursor.as_deref()));
                self.index = self.history.len() - 1;
            }
            LoadMode::Seek(target) => {
                if self.history.is_empty() {
                    self.seed_history();
                }
                self.index = target.min(self.history.len() - 1);
            }
            LoadMode::Stay => {
                if self.history.is_empty() {
                    self.seed_history();
                }
            }
        }
    }

    fn restart(&self, search: String) -> LoadRequest {
        LoadRequest {
            cursor: None,
            search,
            mode: LoadMode::Restart,
        }
    }

    fn seed_history(&mut self) {
        self.history = vec![PageMarker::First];
        self.index = 0;
    }
}
