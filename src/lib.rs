//! Purpose: Library crate behind the `rowrelay` binary and its tests.
//! Exports: `api` (records, errors, HTTP clients), `relay` (router), `ui` (console model).
//! Role: Keeps HTTP handling and console logic testable without the CLI.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod relay;
pub mod ui;
