//! Purpose: Records console model: pagination state, view model, request sequencing.
//! Exports: `Session`, `RecordsBackend`, `PageState`, `TableView`, `render`.
//! Role: Terminal-independent core behind `rowrelay ui`.
//! Invariants: Nothing here reads stdin or writes stdout.

mod pager;
mod render;
mod session;
mod view;

pub use pager::{LoadMode, LoadRequest, PageMarker, PageState};
pub use render::{render, render_table};
pub use session::{CREATED_FLASH_TTL, RecordsBackend, Session};
pub use view::{CreateForm, EditDraft, PaginationView, RowMode, RowView, TableView};
