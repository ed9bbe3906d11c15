//! Script extraction from raw completion text.

use std::sync::LazyLock;

use regex::Regex;

static FENCED_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)\A\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*\z").ok());

/// Unwrap a reply that is a single fenced code block; return anything else as-is.
///
/// Models frequently wrap code in Markdown even when told not to. Only a reply
/// that consists of exactly one fence is unwrapped, so scripts that merely
/// contain backticks in strings are left alone.
pub fn extract_script(reply: &str) -> &str {
    let Some(re) = FENCED_RE.as_ref() else {
        return reply;
    };
    match re.captures(reply).and_then(|caps| caps.get(1)) {
        Some(body) if !body.as_str().contains("```") => body.as_str(),
        _ => reply,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_script_is_unchanged() {
        assert_eq!(extract_script("return 2 + 2"), "return 2 + 2");
    }

    #[test]
    fn lua_fence_is_unwrapped() {
        let reply = "```lua\nlocal x = 1\nreturn x\n```";
        assert_eq!(extract_script(reply), "local x = 1\nreturn x");
    }

    #[test]
    fn bare_fence_with_surrounding_whitespace_is_unwrapped() {
        let reply = "\n```\nprint('hi')\n```\n";
        assert_eq!(extract_script(reply), "print('hi')");
    }

    #[test]
    fn prose_around_fence_is_left_alone() {
        let reply = "Here you go:\n```lua\nreturn 1\n```";
        assert_eq!(extract_script(reply), reply);
    }

    #[test]
    fn multiple_fences_are_left_alone() {
        let reply = "```lua\nreturn 1\n```\n```lua\nreturn 2\n```";
        assert_eq!(extract_script(reply), reply);
    }
}
