//! The `llm_query` function scripts use to delegate sub-questions.
//!
//! A call checks the depth budget, then the size limit, and only then runs a
//! child [`Session`] with a fresh sandbox and a full iteration budget. Every
//! failure comes back to the script as `nil, message`; nothing raises.

use std::rc::Rc;

use anyhow::Result;
use mlua::{Lua, Value};
use tracing::{info, instrument, warn};

use crate::core::budget::{Budget, MAX_DEPTH_MESSAGE};
use crate::core::types::MaxIterationsReachedError;
use crate::io::completion::Completion;
use crate::io::sandbox::{Sandbox, lua_error};
use crate::session::{Session, SessionSettings};

/// Name of the global installed into every sandbox.
pub const LLM_QUERY: &str = "llm_query";

/// Message a script receives when the child ran out of iterations.
pub const MAX_ITERATIONS_MESSAGE: &str = "max number of iterations reached";

/// Answer or error message, exactly one of which is set.
pub type QueryResult = (Option<String>, Option<String>);

/// Everything a sub-query needs from the session that owns the sandbox.
pub struct QueryBridge {
    completion: Rc<dyn Completion>,
    budget: Budget,
    settings: Rc<SessionSettings>,
}

impl QueryBridge {
    pub fn new(completion: Rc<dyn Completion>, budget: Budget, settings: Rc<SessionSettings>) -> Self {
        Self {
            completion,
            budget,
            settings,
        }
    }

    /// Register `llm_query(query, context?)` in the sandbox.
    pub fn install(self, sandbox: &Sandbox) -> Result<()> {
        let function = sandbox
            .lua()
            .create_function(move |lua, (query, context): (Value, Value)| {
                Ok(self.call(lua, query, context))
            })
            .map_err(lua_error)?;
        sandbox.set_global(LLM_QUERY, function)
    }

    /// Validate raw script arguments, then run the query.
    fn call(&self, lua: &Lua, query: Value, context: Value) -> QueryResult {
        let arguments = text_argument(lua, query, "query").and_then(|query| {
            let context = match context {
                Value::Nil => String::new(),
                other => text_argument(lua, other, "context")?,
            };
            Ok((query, context))
        });
        match arguments {
            Ok((query, context)) => self.query(&query, &context),
            Err(message) => {
                warn!(%message, "sub-query refused: invalid argument");
                (None, Some(message))
            }
        }
    }

    #[instrument(skip_all, fields(depth = self.budget.depth_remaining))]
    pub fn query(&self, query: &str, context: &str) -> QueryResult {
        let Some(child_budget) = self.budget.child() else {
            warn!("sub-query refused: no depth left");
            return (None, Some(MAX_DEPTH_MESSAGE.to_string()));
        };

        let query_chars = query.chars().count();
        let context_chars = context.chars().count();
        if let Err(message) = self.budget.admit(query_chars, context_chars) {
            warn!(query_chars, context_chars, "sub-query refused: context too large");
            return (None, Some(message));
        }

        info!(query_chars, context_chars, "running sub-query");
        let answer = Session::new(
            query,
            context,
            self.completion.clone(),
            child_budget,
            self.settings.clone(),
        )
        .and_then(|mut session| session.run());

        match answer {
            Ok(answer) => (Some(answer), None),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "sub-query failed");
                (None, Some(describe_failure(&err)))
            }
        }
    }
}

/// Strings and numbers are accepted; bytes that are not UTF-8 are replaced.
fn text_argument(lua: &Lua, value: Value, name: &str) -> Result<String, String> {
    let type_name = value.type_name();
    match lua.coerce_string(value) {
        Ok(Some(text)) => Ok(text.to_string_lossy()),
        _ => Err(format!(
            "invalid argument: {name} must be a string, got {type_name}"
        )),
    }
}

fn describe_failure(err: &anyhow::Error) -> String {
    if err.downcast_ref::<MaxIterationsReachedError>().is_some() {
        MAX_ITERATIONS_MESSAGE.to_string()
    } else {
        format!("unexpected error occurred: {err:#}")
    }
}
