//! Recursive language-model sessions over a sandboxed Lua interpreter.
//!
//! Instead of reading a large context directly, the model writes Lua scripts
//! that inspect the `context` global, print intermediate findings, and may ask
//! fresh sub-sessions about slices of it through `llm_query`. A script that
//! returns a value ends the session with that value as the answer.
//!
//! - **[`core`]**: Pure logic (history, budgets, value rendering, script
//!   extraction). No interpreter or process handling.
//! - **[`io`]**: The sandbox, output capture, completion backends, prompts and
//!   configuration.
//!
//! [`session`] drives the loop and [`bridge`] wires sub-queries into it.

pub mod bridge;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::core::types::{CompletionResponse, MaxIterationsReachedError, Message, Role, Usage};
pub use crate::io::completion::{CommandCompletion, Completion, CompletionConfig};
pub use crate::io::sandbox::SandboxConfig;
pub use crate::session::{CompleteOptions, complete};
