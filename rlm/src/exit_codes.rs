//! Stable exit codes for rlm CLI commands.

/// The query was answered, or the command succeeded.
pub const OK: i32 = 0;
/// Invalid input or config, a failed completion, or any other error.
pub const INVALID: i32 = 1;
/// `rlm query` ran out of iterations without an answer.
pub const MAX_ITERATIONS: i32 = 2;
