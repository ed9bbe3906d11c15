//! Test-only completion doubles.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::core::types::{CompletionResponse, Message};
use crate::io::completion::Completion;

/// Completion that replays queued replies and records every request.
///
/// Sub-queries share the same instance, so replies are consumed in call order
/// across depths.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    replies: RefCell<VecDeque<String>>,
    repeat: Option<String>,
    recorded: RefCell<Vec<Vec<Message>>>,
    calls: Cell<usize>,
}

impl ScriptedCompletion {
    /// Return `replies` in order, then fail.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Return `reply` on every call.
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            repeat: Some(reply.into()),
            ..Self::default()
        }
    }

    /// Number of completion requests received so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Message lists of every request, oldest first.
    pub fn recorded(&self) -> Vec<Vec<Message>> {
        self.recorded.borrow().clone()
    }
}

impl Completion for ScriptedCompletion {
    fn complete(&self, messages: &[Message]) -> Result<CompletionResponse> {
        self.calls.set(self.calls.get() + 1);
        self.recorded.borrow_mut().push(messages.to_vec());

        let next = self.replies.borrow_mut().pop_front();
        match next.or_else(|| self.repeat.clone()) {
            Some(reply) => Ok(CompletionResponse::text(reply)),
            None => Err(anyhow!(
                "scripted completion exhausted after {} calls",
                self.calls.get() - 1
            )),
        }
    }
}
