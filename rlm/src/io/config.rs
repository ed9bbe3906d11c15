//! `rlm` settings stored in `rlm.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::history::OUTPUT_LIMIT_CHARS;
use crate::io::completion::CompletionConfig;
use crate::io::sandbox::SandboxConfig;
use crate::session::CompleteOptions;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "rlm.toml";

/// Loop, sandbox and completion settings read from `rlm.toml`.
///
/// Missing fields default to the values `complete` uses when called as a library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RlmConfig {
    /// Loop passes allowed per session (top-level and every sub-query).
    pub max_iterations: u32,

    /// Nesting levels allowed, counting the top-level session.
    pub max_depth: u32,

    /// Reject `llm_query` requests whose query plus context exceed this many characters.
    pub max_context_chars: Option<usize>,

    /// Truncate script output in prompts beyond this many characters.
    pub output_limit_chars: usize,

    pub sandbox: SandboxConfig,

    pub completion: CompletionConfig,
}

impl Default for RlmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_depth: 10,
            max_context_chars: None,
            output_limit_chars: OUTPUT_LIMIT_CHARS,
            sandbox: SandboxConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

impl RlmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.max_context_chars == Some(0) {
            return Err(anyhow!("max_context_chars must be > 0 when set"));
        }
        if self.output_limit_chars == 0 {
            return Err(anyhow!("output_limit_chars must be > 0"));
        }
        if self.sandbox.memory_limit_bytes == Some(0) {
            return Err(anyhow!("sandbox.memory_limit_bytes must be > 0 when set"));
        }
        if self.sandbox.instruction_limit == Some(0) {
            return Err(anyhow!("sandbox.instruction_limit must be > 0 when set"));
        }
        if self.completion.command.is_empty() || self.completion.command[0].trim().is_empty() {
            return Err(anyhow!("completion.command must be a non-empty array"));
        }
        if self.completion.timeout_secs == 0 {
            return Err(anyhow!("completion.timeout_secs must be > 0"));
        }
        if self.completion.output_limit_bytes == 0 {
            return Err(anyhow!("completion.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Options for a top-level `complete` call over `context`.
    pub fn complete_options(&self, context: String) -> CompleteOptions {
        CompleteOptions {
            context,
            max_iterations: self.max_iterations,
            max_depth: self.max_depth,
            max_context_chars: self.max_context_chars,
            output_limit_chars: self.output_limit_chars,
            sandbox: self.sandbox.clone(),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RlmConfig::default()`.
pub fn load_config(path: &Path) -> Result<RlmConfig> {
    if !path.exists() {
        let cfg = RlmConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RlmConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RlmConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
