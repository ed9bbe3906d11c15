//! Prompt builder for completion requests.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::budget::Budget;
use crate::core::history::History;
use crate::core::types::Message;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const USER_TEMPLATE: &str = include_str!("prompts/user.md");

/// Everything one prompt is rendered from.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub query: &'a str,
    /// Size of the `context` global, in characters.
    pub context_chars: usize,
    pub history: &'a History,
    pub budget: &'a Budget,
    pub output_limit_chars: usize,
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        env.add_template("user", USER_TEMPLATE)
            .context("load user template")?;
        Ok(Self { env })
    }

    /// Build the system and user messages for the next iteration.
    pub fn build(&self, input: &PromptInputs<'_>) -> Result<Vec<Message>> {
        let system = self.env.get_template("system")?.render(context! {
            context_chars => input.context_chars,
            output_limit_chars => input.output_limit_chars,
            max_context_chars => input.budget.max_context_chars,
            depth_remaining => input.budget.depth_remaining,
        })?;

        let history = input.history.format_with_limit(input.output_limit_chars);
        let user = self.env.get_template("user")?.render(context! {
            query => input.query.trim(),
            history => (!history.is_empty()).then_some(history),
            iterations_remaining => input.budget.iterations_remaining,
        })?;

        Ok(vec![Message::system(system.trim()), Message::user(user.trim())])
    }
}
