//! Integration tests for the sigil workspace live in `tests/`.
//!
//! This crate intentionally exports nothing.
