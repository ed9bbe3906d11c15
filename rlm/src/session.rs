//! Session orchestration: the completion/execution loop.
//!
//! A [`Session`] owns one sandbox and one history. Each pass renders a prompt
//! from the query, the history and the remaining budget, asks the completion
//! callback for a script, runs it, and either returns the answer or records the
//! pass and goes again. Sub-queries made through `llm_query` get a brand new
//! session of their own (see [`crate::bridge`]).

use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::bridge::QueryBridge;
use crate::core::budget::Budget;
use crate::core::history::{History, OUTPUT_LIMIT_CHARS};
use crate::core::script::extract_script;
use crate::core::types::{MaxIterationsReachedError, ScriptOutcome};
use crate::io::completion::Completion;
use crate::io::executor::execute;
use crate::io::prompt::{PromptBuilder, PromptInputs};
use crate::io::sandbox::{Sandbox, SandboxConfig};

/// Options for a top-level [`complete`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteOptions {
    /// Text exposed to scripts as the `context` global.
    pub context: String,
    pub max_iterations: u32,
    /// Nesting levels allowed, counting the top-level session.
    pub max_depth: u32,
    pub max_context_chars: Option<usize>,
    pub output_limit_chars: usize,
    pub sandbox: SandboxConfig,
}

impl Default for CompleteOptions {
    fn default() -> Self {
        Self {
            context: String::new(),
            max_iterations: 10,
            max_depth: 10,
            max_context_chars: None,
            output_limit_chars: OUTPUT_LIMIT_CHARS,
            sandbox: SandboxConfig::default(),
        }
    }
}

/// Settings that stay the same at every depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub output_limit_chars: usize,
    pub sandbox: SandboxConfig,
}

/// Answer `query` about `options.context`.
///
/// Fails with [`MaxIterationsReachedError`] when no script returned within the
/// iteration budget, or with the completion callback's own error.
pub fn complete(
    query: &str,
    options: &CompleteOptions,
    completion: Rc<dyn Completion>,
) -> Result<String> {
    let budget = Budget::new(
        options.max_iterations,
        options.max_depth,
        options.max_context_chars,
    );
    let settings = Rc::new(SessionSettings {
        output_limit_chars: options.output_limit_chars,
        sandbox: options.sandbox.clone(),
    });
    Session::new(query, &options.context, completion, budget, settings)?.run()
}

/// One run of the loop with its own interpreter, history and budget.
pub struct Session {
    query: String,
    context_chars: usize,
    sandbox: Sandbox,
    history: History,
    budget: Budget,
    completion: Rc<dyn Completion>,
    settings: Rc<SessionSettings>,
    prompts: PromptBuilder,
}

impl Session {
    pub fn new(
        query: &str,
        context: &str,
        completion: Rc<dyn Completion>,
        budget: Budget,
        settings: Rc<SessionSettings>,
    ) -> Result<Self> {
        let sandbox = Sandbox::new(&settings.sandbox).context("create sandbox")?;
        sandbox
            .set_global("context", context)
            .context("expose context to sandbox")?;
        QueryBridge::new(completion.clone(), budget, settings.clone())
            .install(&sandbox)
            .context("install llm_query")?;

        Ok(Self {
            query: query.to_string(),
            context_chars: context.chars().count(),
            sandbox,
            history: History::new(),
            budget,
            completion,
            settings,
            prompts: PromptBuilder::new()?,
        })
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Drive the loop until a script returns or the iteration budget runs out.
    #[instrument(skip_all, fields(depth = self.budget.depth_remaining, max_iterations = self.budget.max_iterations))]
    pub fn run(&mut self) -> Result<String> {
        info!(
            query_chars = self.query.chars().count(),
            context_chars = self.context_chars,
            "session started"
        );

        while !self.budget.is_exhausted() {
            let messages = self.prompts.build(&PromptInputs {
                query: &self.query,
                context_chars: self.context_chars,
                history: &self.history,
                budget: &self.budget,
                output_limit_chars: self.settings.output_limit_chars,
            })?;

            let response = self
                .completion
                .complete(&messages)
                .context("completion callback failed")?;
            debug!(usage = ?response.usage, "completion received");

            let script = extract_script(&response.content);
            match execute(&self.sandbox, script) {
                ScriptOutcome::Halt(answer) => {
                    info!(
                        iterations_used = self.budget.max_iterations - self.budget.iterations_remaining,
                        "session answered"
                    );
                    return Ok(answer);
                }
                ScriptOutcome::Continue(output) => self.history.record_pass(script, &output),
                ScriptOutcome::Fault(message) => self.history.record_pass(script, &message),
            }

            self.budget.consume_iteration();
            debug!(
                iterations_remaining = self.budget.iterations_remaining,
                history_len = self.history.len(),
                "iteration recorded"
            );
        }

        warn!("iteration budget exhausted without an answer");
        Err(MaxIterationsReachedError {
            max_iterations: self.budget.max_iterations,
        }
        .into())
    }
}
