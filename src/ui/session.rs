//! Purpose: Sequence console actions into relay requests and view updates.
//! Exports: `Session`, `RecordsBackend`, `CREATED_FLASH_TTL`.
//! Role: The only component that talks to the backend on behalf of the console.
//! Invariants: Client-side validation failures never reach the backend.
//! Invariants: A failed inline save leaves the row in edit mode with its draft.
//! Invariants: Every failure is logged and also surfaced as user-visible text.
//! Invariants: The loading hook runs after the view enters loading and before the request.
#![allow(clippy::result_large_err)]

use super::pager::{LoadMode, LoadRequest, PageState};
use super::view::TableView;
use crate::api::RelayClient;
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::paging::{ListQuery, PageSize};
use crate::core::record::{DeleteAck, FieldPatch, NewRecord, Record, RecordFields, RecordPage};
use serde_json::Value;
use std::time::{Duration, Instant};

pub const CREATED_FLASH_TTL: Duration = Duration::from_secs(2);

const LOAD_FAILED: &str = "Failed to load records.";
const SAVE_FAILED: &str = "Failed to save.";
const DELETE_FAILED: &str = "Failed to delete.";
const CREATE_FAILED: &str = "Failed to create.";
const EDIT_REQUIRED: &str = "Name and email are required.";
const CREATE_REQUIRED: &str = "Fill in name and email.";
const CREATED: &str = "Created successfully!";
const CURSOR_EXPIRED: &str = "Page cursor expired; restarted from the first page.";

/// Upstream status and error type for an iterator that is no longer available.
const EXPIRED_CURSOR_STATUS: u16 = 422;
const ITERATOR_EXPIRED: &str = "LIST_RECORDS_ITERATOR_NOT_AVAILABLE";

pub trait RecordsBackend {
    fn list(&self, query: &ListQuery) -> ApiResult<RecordPage>;

    fn create(&self, record: &NewRecord) -> ApiResult<Record>;

    fn update(&self, id: &str, patch: &FieldPatch) -> ApiResult<Record>;

    fn delete(&self, id: &str) -> ApiResult<DeleteAck>;
}

impl RecordsBackend for RelayClient {
    fn list(&self, query: &ListQuery) -> ApiResult<RecordPage> {
        RelayClient::list(self, query)
    }

    fn create(&self, record: &NewRecord) -> ApiResult<Record> {
        RelayClient::create(self, record)
    }

    fn update(&self, id: &str, patch: &FieldPatch) -> ApiResult<Record> {
        RelayClient::update(self, id, patch)
    }

    fn delete(&self, id: &str) -> ApiResult<DeleteAck> {
        RelayClient::delete(self, id)
    }
}

type LoadingHook = Box<dyn FnMut(&TableView, &PageState)>;

pub struct Session<B> {
    backend: B,
    state: PageState,
    view: TableView,
    flash_ttl: Duration,
    loading_hook: Option<LoadingHook>,
}

impl<B: RecordsBackend> Session<B> {
    pub fn new(backend: B, page_size: PageSize) -> Self {
        Self {
            backend,
            state: PageState::new(page_size),
            view: TableView::default(),
            flash_ttl: CREATED_FLASH_TTL,
            loading_hook: None,
        }
    }

    pub fn with_flash_ttl(mut self, ttl: Duration) -> Self {
        self.flash_ttl = ttl;
        self
    }

    /// Called with the loading view on every page load, while the request is in flight.
    pub fn set_loading_hook(&mut self, hook: impl FnMut(&TableView, &PageState) + 'static) {
        self.loading_hook = Some(Box::new(hook));
    }

    pub fn clear_loading_hook(&mut self) {
        self.loading_hook = None;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn view(&self) -> &TableView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut TableView {
        &mut self.view
    }

    pub fn start(&mut self) -> bool {
        let request = self.state.initial_load();
        self.load(request)
    }

    /// Returns `false` when there is no next page or the load failed.
    pub fn next(&mut self) -> bool {
        match self.state.next() {
            Some(request) => self.load(request),
            None => false,
        }
    }

    pub fn previous(&mut self) -> bool {
        match self.state.previous() {
            Some(request) => self.load(request),
            None => false,
        }
    }

    pub fn search(&mut self, term: &str) -> bool {
        let request = self.state.search(term);
        self.load(request)
    }

    pub fn reset(&mut self) -> bool {
        let request = self.state.reset();
        self.load(request)
    }

    pub fn reload(&mut self) -> bool {
        let request = self.state.reload();
        self.load(request)
    }

    pub fn begin_edit(&mut self, row: usize) -> ApiResult<()> {
        if self.view.begin_edit(row) {
            Ok(())
        } else {
            Err(no_such_row(row))
        }
    }

    pub fn edit_field(&mut self, row: usize, field: &str, value: &str) -> ApiResult<()> {
        let draft = self.view.draft_mut(row).ok_or_else(|| not_editing(row))?;
        let slot = draft.field_mut(field).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("unknown field: {field}"))
                .with_hint("Editable fields are nome, email, telefone.")
        })?;
        *slot = value.to_string();
        Ok(())
    }

    /// Sends the row's draft; `Ok(false)` means the save was refused or failed.
    pub fn save_edit(&mut self, row: usize) -> ApiResult<bool> {
        let (id, draft) = match self.view.row(row) {
            Some(view_row) => match view_row.draft() {
                Some(draft) => (view_row.record.id.clone(), draft.clone()),
                None => return Err(not_editing(row)),
            },
            None => return Err(no_such_row(row)),
        };
        let fields = RecordFields {
            nome: draft.nome.trim().to_string(),
            email: draft.email.trim().to_string(),
            telefone: Some(draft.telefone.trim().to_string()),
        };
        if fields.nome.is_empty() || fields.email.is_empty() {
            self.view.set_alert(EDIT_REQUIRED);
            return Ok(false);
        }

        match self.backend.update(&id, &FieldPatch::full(&fields)) {
            Ok(_) => {
                self.reload();
                Ok(true)
            }
            Err(err) => {
                tracing::error!(record = %id, error = %err, "failed to save record");
                self.view.set_alert(err.message().unwrap_or(SAVE_FAILED));
                Ok(false)
            }
        }
    }

    /// Discards the draft by reloading the current page.
    pub fn cancel_edit(&mut self, row: usize) -> ApiResult<bool> {
        if self.view.row(row).is_none() {
            return Err(no_such_row(row));
        }
        Ok(self.reload())
    }

    /// Deletes the row if `confirm` agrees; `Ok(false)` when declined or failed.
    pub fn delete<F>(&mut self, row: usize, confirm: F) -> ApiResult<bool>
    where
        F: FnOnce(&Record) -> bool,
    {
        let record = self
            .view
            .row(row)
            .map(|view_row| view_row.record.clone())
            .ok_or_else(|| no_such_row(row))?;
        if !confirm(&record) {
            return Ok(false);
        }
        match self.backend.delete(&record.id) {
            Ok(_) => {
                self.reload();
                Ok(true)
            }
            Err(err) => {
                tracing::error!(record = %record.id, error = %err, "failed to delete record");
                self.view.set_alert(err.message().unwrap_or(DELETE_FAILED));
                Ok(false)
            }
        }
    }

    /// Submits the create form held by the view.
    pub fn create(&mut self) -> bool {
        self.view.set_create_status(None);
        let form = self.view.form().clone();
        let nome = form.nome.trim();
        let email = form.email.trim();
        let telefone = form.telefone.trim();
        let record = match NewRecord::new(
            nome,
            email,
            (!telefone.is_empty()).then(|| telefone.to_string()),
        ) {
            Ok(record) => record,
            Err(_) => {
                self.view
                    .set_create_status(Some(CREATE_REQUIRED.to_string()));
                return false;
            }
        };

        match self.backend.create(&record) {
            Ok(_) => {
                self.view.form_mut().clear();
                self.view.show_flash(CREATED, self.flash_ttl, Instant::now());
                self.reload();
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to create record");
                let message = err.message().unwrap_or(CREATE_FAILED).to_string();
                self.view.set_create_status(Some(message));
                false
            }
        }
    }

    fn load(&mut self, request: LoadRequest) -> bool {
        self.view.begin_loading();
        self.view.set_notice(None);
        if let Some(hook) = self.loading_hook.as_mut() {
            hook(&self.view, &self.state);
        }
        let query = self.state.query_for(&request);
        match self.backend.list(&query) {
            Ok(mut page) => {
                let next = page.next_cursor().map(str::to_string);
                self.state.apply(&request, next.as_deref());
                page.records
                    .truncate(self.state.page_size().get() as usize);
                self.view.show_page(page.records, &self.state);
                true
            }
            Err(err) if cursor_expired(&request, &err) => {
                tracing::warn!(
                    cursor = ?request.cursor,
                    error = %err,
                    "page cursor rejected; restarting from first page"
                );
                let restart = self.state.initial_load();
                let loaded = self.load(restart);
                if loaded {
                    self.view.set_notice(Some(CURSOR_EXPIRED.to_string()));
                }
                loaded
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    detail = ?err.detail(),
                    "failed to load records"
                );
                self.view.show_error(err.message().unwrap_or(LOAD_FAILED));
                false
            }
        }
    }
}

/// Revisiting a stored cursor can fail once the upstream has expired it.
/// Other 422s (a bad formula, say) are ordinary load failures.
fn cursor_expired(request: &LoadRequest, err: &Error) -> bool {
    request.cursor.is_some()
        && matches!(request.mode, LoadMode::Seek(_) | LoadMode::Stay)
        && err.status() == Some(EXPIRED_CURSOR_STATUS)
        && error_type(err) == Some(ITERATOR_EXPIRED)
}

fn error_type(err: &Error) -> Option<&str> {
    err.detail()
        .and_then(|detail| detail.get("error"))
        .and_then(|error| match error {
            Value::String(code) => Some(code.as_str()),
            error => error.get("type").and_then(Value::as_str),
        })
        .or_else(|| err.message())
}

fn no_such_row(row: usize) -> Error {
    Error::new(ErrorKind::Usage).with_message(format!("no row {}", row + 1))
}

fn not_editing(row: usize) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("row {} is not being edited", row + 1))
        .with_hint("Start with `edit <row>`.")
}
