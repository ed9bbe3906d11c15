//! Shared deterministic types for the session core.
//!
//! These types define stable contracts between the orchestrator, the script
//! executor and the completion backend. They hold no interpreter state and must
//! remain deterministic across runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Author of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged message sent to the completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Token accounting reported by the provider. Passed through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Reply produced by the completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated script text.
    pub content: String,
    #[serde(default)]
    pub usage: Usage,
}

impl CompletionResponse {
    /// Response with the given content and zero usage.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: Usage::default(),
        }
    }
}

/// Kind of a recorded interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Script,
    Output,
}

/// One immutable history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub kind: InteractionKind,
    pub content: String,
}

/// Terminal classification of one script execution.
///
/// Never stored as-is: the orchestrator converts it into history entries (or an
/// answer) before the loop proceeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// The script returned at least one value; carries the rendered answer.
    Halt(String),
    /// The script returned nothing; carries the captured print output.
    Continue(String),
    /// The script failed to compile or raised at runtime.
    Fault(String),
}

impl ScriptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptOutcome::Halt(_) => "halt",
            ScriptOutcome::Continue(_) => "continue",
            ScriptOutcome::Fault(_) => "fault",
        }
    }

    /// Answer, captured output or fault message.
    pub fn text(&self) -> &str {
        match self {
            ScriptOutcome::Halt(text) | ScriptOutcome::Continue(text) | ScriptOutcome::Fault(text) => {
                text
            }
        }
    }
}

/// The session used its whole iteration allotment without the script halting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxIterationsReachedError {
    pub max_iterations: u32,
}

impl fmt::Display for MaxIterationsReachedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max number of iterations reached ({} iterations)",
            self.max_iterations
        )
    }
}

impl std::error::Error for MaxIterationsReachedError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_without_usage_deserializes_with_zero_usage() {
        let response: CompletionResponse =
            serde_json::from_str(r#"{"content":"return 1"}"#).expect("parse");
        assert_eq!(response, CompletionResponse::text("return 1"));
    }

    #[test]
    fn messages_serialize_lowercase_roles() {
        let json = serde_json::to_string(&Message::system("hi")).expect("serialize");
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }
}
