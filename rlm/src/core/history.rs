//! Interaction history for one session and its prompt rendering.

use std::collections::VecDeque;

use crate::core::types::{Interaction, InteractionKind};

/// Default truncation threshold for output entries, in characters.
pub const OUTPUT_LIMIT_CHARS: usize = 100_000;

/// Marker appended to truncated output.
pub const TRUNCATION_MARKER: &str = "...";

/// Append-only log of scripts and their outputs.
///
/// Entries are stored newest-first so recording is a constant-time prepend;
/// rendering always walks them oldest-first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: VecDeque<Interaction>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: InteractionKind, content: impl Into<String>) {
        self.entries.push_front(Interaction {
            kind,
            content: content.into(),
        });
    }

    /// Record one completed loop pass: the script, then what it produced.
    pub fn record_pass(&mut self, script: &str, output: &str) {
        self.push(InteractionKind::Script, script);
        self.push(InteractionKind::Output, output);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in execution order.
    pub fn chronological(&self) -> impl Iterator<Item = &Interaction> {
        self.entries.iter().rev()
    }

    /// Render with the default output threshold.
    pub fn format(&self) -> String {
        self.format_with_limit(OUTPUT_LIMIT_CHARS)
    }

    /// Render oldest-first; output entries longer than `output_limit_chars` are cut.
    pub fn format_with_limit(&self, output_limit_chars: usize) -> String {
        self.chronological()
            .map(|entry| match entry.kind {
                InteractionKind::Script => format!("Script:\n```lua\n{}\n```", entry.content),
                InteractionKind::Output => format!(
                    "Output:\n```\n{}\n```",
                    render_output(&entry.content, output_limit_chars)
                ),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn render_output(content: &str, limit: usize) -> String {
    if content.is_empty() {
        return "(no output)".to_string();
    }
    let mut rendered = truncate_chars(content, limit).to_string();
    if rendered.len() < content.len() {
        rendered.push_str(TRUNCATION_MARKER);
    }
    rendered
}

/// Longest prefix of `text` holding at most `limit` characters.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_chronological() {
        let mut history = History::new();
        history.record_pass("print('a')", "out-a");
        history.record_pass("print('b')", "out-b");

        let rendered = history.format();
        let first_script = rendered.find("print('a')").expect("first script");
        let first_output = rendered.find("out-a").expect("first output");
        let second_script = rendered.find("print('b')").expect("second script");
        let second_output = rendered.find("out-b").expect("second output");

        assert!(first_script < first_output);
        assert!(first_output < second_script);
        assert!(second_script < second_output);
    }

    #[test]
    fn chronological_iteration_reverses_storage() {
        let mut history = History::new();
        history.push(InteractionKind::Script, "one");
        history.push(InteractionKind::Output, "two");
        history.push(InteractionKind::Script, "three");

        let contents: Vec<&str> = history
            .chronological()
            .map(|entry| entry.content.as_str())
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn output_at_threshold_is_not_truncated() {
        let mut history = History::new();
        let output = "x".repeat(OUTPUT_LIMIT_CHARS);
        history.push(InteractionKind::Output, output.clone());

        let rendered = history.format();
        assert!(rendered.contains(&output));
        assert!(!rendered.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn output_over_threshold_is_truncated_with_marker() {
        let mut history = History::new();
        let output = format!("{}y", "x".repeat(OUTPUT_LIMIT_CHARS));
        history.push(InteractionKind::Output, output.clone());

        let rendered = history.format();
        let expected = format!("{}{}", "x".repeat(OUTPUT_LIMIT_CHARS), TRUNCATION_MARKER);
        assert!(rendered.contains(&expected));
        assert!(!rendered.contains(&output));
    }

    #[test]
    fn scripts_are_never_truncated() {
        let mut history = History::new();
        let script = "-".repeat(50);
        history.push(InteractionKind::Script, script.clone());

        let rendered = history.format_with_limit(10);
        assert!(rendered.contains(&script));
        assert!(!rendered.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("héllo", 10), "héllo");

        let mut history = History::new();
        history.push(InteractionKind::Output, "ééé");
        assert!(history.format_with_limit(2).contains("éé..."));
    }

    #[test]
    fn empty_output_renders_placeholder() {
        let mut history = History::new();
        history.record_pass("x = 1", "");
        assert!(history.format().contains("(no output)"));
    }
}
