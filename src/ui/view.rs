//! Purpose: Display model of the records console, independent of any terminal.
//! Exports: `TableView`, `RowView`, `RowMode`, `EditDraft`, `CreateForm`, `PaginationView`.
//! Role: What the renderer draws; mutated only by `Session`.
//! Invariants: Rows are replaced wholesale on every load, never patched.
//! Invariants: While loading, no rows are held and the empty-state flag is off.
use super::pager::PageState;
use crate::core::record::{Record, RecordFields};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditDraft {
    pub nome: String,
    pub email: String,
    pub telefone: String,
}

impl EditDraft {
    fn from_fields(fields: &RecordFields) -> Self {
        Self {
            nome: fields.nome.clone(),
            email: fields.email.clone(),
            telefone: fields.telefone.clone().unwrap_or_default(),
        }
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut String> {
        match name {
            "nome" => Some(&mut self.nome),
            "email" => Some(&mut self.email),
            "telefone" => Some(&mut self.telefone),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowMode {
    Display,
    Editing(EditDraft),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RowView {
    pub record: Record,
    pub mode: RowMode,
}

impl RowView {
    pub fn is_editing(&self) -> bool {
        matches!(self.mode, RowMode::Editing(_))
    }

    pub fn draft(&self) -> Option<&EditDraft> {
        match &self.mode {
            RowMode::Editing(draft) => Some(draft),
            RowMode::Display => None,
        }
    }
}

/// The "new record" form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateForm {
    pub nome: String,
    pub email: String,
    pub telefone: String,
}

impl CreateForm {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginationView {
    pub label: String,
    pub prev_enabled: bool,
    pub next_enabled: bool,
}

impl Default for PaginationView {
    fn default() -> Self {
        Self {
            label: "Page 1".to_string(),
            prev_enabled: false,
            next_enabled: false,
        }
    }
}

#[derive(Clone, Debug)]
struct Flash {
    message: String,
    expires_at: Instant,
}

#[derive(Clone, Debug, Default)]
pub struct TableView {
    rows: Vec<RowView>,
    loading: bool,
    error: Option<String>,
    empty: bool,
    alert: Option<String>,
    notice: Option<String>,
    form: CreateForm,
    create_status: Option<String>,
    flash: Option<Flash>,
    pagination: PaginationView,
}

impl TableView {
    pub fn rows(&self) -> &[RowView] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&RowView> {
        self.rows.get(index)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn shows_empty_state(&self) -> bool {
        self.empty
    }

    pub fn pagination(&self) -> &PaginationView {
        &self.pagination
    }

    pub fn form(&self) -> &CreateForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut CreateForm {
        &mut self.form
    }

    pub fn create_status(&self) -> Option<&str> {
        self.create_status.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Blocking message for the user (the console prints it once).
    pub fn take_alert(&mut self) -> Option<String> {
        self.alert.take()
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    /// Flash text still visible at `now`.
    pub fn flash(&self, now: Instant) -> Option<&str> {
        self.flash
            .as_ref()
            .filter(|flash| now < flash.expires_at)
            .map(|flash| flash.message.as_str())
    }

    pub(crate) fn begin_loading(&mut self) {
        self.rows.clear();
        self.loading = true;
        self.error = None;
        self.empty = false;
    }

    pub(crate) fn show_page(&mut self, records: Vec<Record>, state: &PageState) {
        self.rows = records
            .into_iter()
            .map(|record| RowView {
                record,
                mode: RowMode::Display,
            })
            .collect();
        self.loading = false;
        self.empty = self.rows.is_empty();
        self.pagination = PaginationView {
            label: state.page_label(),
            prev_enabled: state.can_go_back(),
            next_enabled: state.can_go_forward(),
        };
    }

    pub(crate) fn show_error(&mut self, message: impl Into<String>) {
        self.loading = false;
        self.error = Some(message.into());
    }

    pub(crate) fn set_alert(&mut self, message: impl Into<String>) {
        self.alert = Some(message.into());
    }

    pub(crate) fn set_notice(&mut self, notice: Option<String>) {
        self.notice = notice;
    }

    pub(crate) fn set_create_status(&mut self, status: Option<String>) {
        self.create_status = status;
    }

    pub(crate) fn show_flash(&mut self, message: impl Into<String>, ttl: Duration, now: Instant) {
        self.flash = Some(Flash {
            message: message.into(),
            expires_at: now + ttl,
        });
    }

    /// Drops the flash once it has expired.
    pub fn expire_flash(&mut self, now: Instant) {
        if self
            .flash
            .as_ref()
            .is_some_and(|flash| now >= flash.expires_at)
        {
            self.flash = None;
        }
    }

    pub(crate) fn begin_edit(&mut self, index: usize) -> bool {
        let Some(row) = self.rows.get_mut(index) else {
            return false;
        };
        if !row.is_editing() {
            row.mode = RowMode::Editing(EditDraft::from_fields(&row.record.fields));
        }
        true
    }

    pub(crate) fn draft_mut(&mut self, index: usize) -> Option<&mut EditDraft> {
        match &mut self.rows.get_mut(index)?.mode {
            RowMode::Editing(draft) => Some(draft),
            RowMode::Display => None,
        }
    }
}
