//! Interpreter, process and file handling for sessions.

pub mod capture;
pub mod completion;
pub mod config;
pub mod executor;
pub mod process;
pub mod prompt;
pub mod sandbox;
