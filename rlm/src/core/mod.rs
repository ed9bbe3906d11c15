//! Deterministic logic shared by the session loop.
//!
//! Core modules perform no process or file I/O. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod budget;
pub mod history;
pub mod render;
pub mod script;
pub mod types;
