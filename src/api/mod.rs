//! Purpose: Define the public Rust API boundary for rowrelay.
//! Exports: Record types, errors, the store seam, and both HTTP clients.
//! Role: Single import path for the binary, the console, and integration tests.
//! Invariants: HTTP transport details stay inside `upstream` and `relay_client`.

mod relay_client;
mod store;
mod upstream;

pub use crate::core::error::{ApiResult, Error, ErrorKind, to_exit_code};
pub use crate::core::formula::search_formula;
pub use crate::core::paging::{DEFAULT_PAGE_SIZE, ListQuery, MAX_PAGE_SIZE, PageSize};
pub use crate::core::record::{
    DeleteAck, FieldPatch, NewRecord, Record, RecordFields, RecordPage, WRITABLE_FIELDS,
};
pub use relay_client::RelayClient;
pub use store::RecordStore;
pub use upstream::{DEFAULT_API_URL, DEFAULT_TIMEOUT, UpstreamClient, UpstreamConfig};
