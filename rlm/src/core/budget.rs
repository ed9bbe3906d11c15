//! Resource bounds shared by a session and the sub-queries it spawns.

/// Reply given to `llm_query` when no further nesting is allowed.
pub const MAX_DEPTH_MESSAGE: &str = "max recursion depth reached";

/// Per-session resource bounds.
///
/// `iterations_remaining` is the only field that moves within a session.
/// `depth_remaining` only changes when crossing into a child session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Iteration ceiling the session started with; inherited by children.
    pub max_iterations: u32,
    pub iterations_remaining: u32,
    /// Nesting levels left, counting this session.
    pub depth_remaining: u32,
    /// Admission limit for one `llm_query` request, in characters.
    pub max_context_chars: Option<usize>,
}

impl Budget {
    pub fn new(max_iterations: u32, depth_remaining: u32, max_context_chars: Option<usize>) -> Self {
        Self {
            max_iterations,
            iterations_remaining: max_iterations,
            depth_remaining,
            max_context_chars,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.iterations_remaining == 0
    }

    /// Consume one loop pass.
    pub fn consume_iteration(&mut self) {
        self.iterations_remaining = self.iterations_remaining.saturating_sub(1);
    }

    /// Budget for a sub-query: full iteration ceiling, one level shallower.
    ///
    /// Returns `None` when the child would have no depth left.
    pub fn child(&self) -> Option<Budget> {
        let depth = self.depth_remaining.saturating_sub(1);
        if depth == 0 {
            return None;
        }
        Some(Budget::new(
            self.max_iterations,
            depth,
            self.max_context_chars,
        ))
    }

    /// Admission check for a sub-query of the given sizes.
    ///
    /// Returns the rejection message when the combined size is over the limit.
    pub fn admit(&self, query_chars: usize, context_chars: usize) -> Result<(), String> {
        let Some(limit) = self.max_context_chars else {
            return Ok(());
        };
        let total = query_chars + context_chars;
        if total <= limit {
            return Ok(());
        }
        Err(format!(
            "context too large for llm_query: combined length {total} chars \
             (query: {query_chars} chars, context: {context_chars} chars) exceeds the \
             max_context_chars limit of {limit}. Split the context into chunks of at most \
             {chunk} chars and call llm_query once per chunk.",
            chunk = limit / 2
        ))
    }
}
