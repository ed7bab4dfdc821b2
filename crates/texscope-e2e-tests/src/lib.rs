//! End-to-end tests for the texscope workspace.
//!
//! The tests live under `tests/`; this crate has no library code.
