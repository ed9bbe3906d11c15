//! Completion abstraction for model invocation.
//!
//! The [`Completion`] trait decouples the session loop from the model provider.
//! Tests use scripted completions that return queued replies; the CLI uses
//! [`CommandCompletion`], which hands the messages to an external program.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{CompletionResponse, Message};
use crate::io::process::run_command_with_timeout;

/// Turns an ordered message list into generated script text.
pub trait Completion {
    fn complete(&self, messages: &[Message]) -> Result<CompletionResponse>;
}

impl<F> Completion for F
where
    F: Fn(&[Message]) -> Result<CompletionResponse>,
{
    fn complete(&self, messages: &[Message]) -> Result<CompletionResponse> {
        self(messages)
    }
}

/// Settings for [`CommandCompletion`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompletionConfig {
    /// Program and arguments (e.g. `["llm-complete", "--model", "gpt-4o"]`).
    pub command: Vec<String>,
    /// Wall-clock budget for a single completion, in seconds.
    pub timeout_secs: u64,
    /// Truncate captured completion stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm-complete".to_string()],
            timeout_secs: 5 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Completion backed by an external program.
///
/// The program receives `{"messages": [...]}` as JSON on stdin and answers on
/// stdout, either with a `{"content": ..., "usage": {...}}` object or with the
/// raw script text.
#[derive(Debug, Clone)]
pub struct CommandCompletion {
    config: CompletionConfig,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [Message],
}

impl CommandCompletion {
    pub fn new(config: CompletionConfig) -> Result<Self> {
        if config.command.first().is_none_or(|p| p.trim().is_empty()) {
            return Err(anyhow!("completion.command must be a non-empty array"));
        }
        Ok(Self { config })
    }
}

impl Completion for CommandCompletion {
    #[instrument(skip_all, fields(messages = messages.len(), timeout_secs = self.config.timeout_secs))]
    fn complete(&self, messages: &[Message]) -> Result<CompletionResponse> {
        let program = &self.config.command[0];
        info!(%program, "requesting completion");

        let payload =
            serde_json::to_vec(&CompletionRequest { messages }).context("serialize messages")?;
        let mut cmd = Command::new(program);
        cmd.args(&self.config.command[1..]);

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = run_command_with_timeout(
            cmd,
            Some(&payload),
            timeout,
            self.config.output_limit_bytes,
        )
        .with_context(|| format!("run completion command {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "completion timed out");
            return Err(anyhow!("completion command timed out after {timeout:?}"));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "completion command failed");
            return Err(anyhow!(
                "completion command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_excerpt(2_000)
            ));
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!(
                "completion output exceeded {} bytes",
                self.config.output_limit_bytes
            ));
        }

        let response = parse_response(&String::from_utf8_lossy(&output.stdout))?;
        debug!(usage = ?response.usage, "completion received");
        Ok(response)
    }
}

/// Accept either a JSON response object or raw script text.
fn parse_response(stdout: &str) -> Result<CompletionResponse> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("completion command produced no output"));
    }
    if trimmed.starts_with('{')
        && let Ok(response) = serde_json::from_str::<CompletionResponse>(trimmed)
    {
        return Ok(response);
    }
    Ok(CompletionResponse::text(trimmed))
}
