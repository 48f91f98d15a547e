//! Purpose: Define the record-store seam the relay forwards through.
//! Exports: `RecordStore`.
//! Role: Implemented by `UpstreamClient`; tests plug in in-memory stores.
//! Invariants: Implementations hold no per-request state and may block.
//! Invariants: Success payloads are returned as the store produced them.
use crate::core::error::ApiResult;
use crate::core::paging::ListQuery;
use crate::core::record::{FieldPatch, NewRecord};
use serde_json::Value;

pub trait RecordStore: Send + Sync + 'static {
    /// Table name reported by the health endpoint.
    fn table(&self) -> &str;

    /// One page of records as `{ "records": [...], "offset"?: "..." }`.
    fn list(&self, query: &ListQuery) -> ApiResult<Value>;

    fn create(&self, record: &NewRecord) -> ApiResult<Value>;

    fn update(&self, id: &str, patch: &FieldPatch) -> ApiResult<Value>;

    fn delete(&self, id: &str) -> ApiResult<Value>;
}
