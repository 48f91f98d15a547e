// Core modules: record shapes, paging rules, search formulas, and errors.
pub mod error;
pub mod formula;
pub mod paging;
pub mod record;
