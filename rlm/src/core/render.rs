//! Deterministic rendering of script return values into answer text.

use std::ffi::c_void;

use mlua::{Table, Value};

/// Tables nested deeper than this render as [`TOO_DEEP`].
pub const MAX_RENDER_DEPTH: usize = 100;

/// Placeholder for tables past [`MAX_RENDER_DEPTH`].
pub const TOO_DEEP: &str = "<...>";

/// Render the values a script returned.
///
/// One value renders on its own; several render as a bracketed list.
pub fn render_values(values: &[Value]) -> String {
    match values {
        [single] => render_value(single),
        many => format!(
            "[{}]",
            many.iter().map(render_value).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Render one value: strings quoted, numbers as Lua prints them, tables structurally.
pub fn render_value(value: &Value) -> String {
    render_inner(value, &mut Vec::new())
}

fn render_inner(value: &Value, seen: &mut Vec<*const c_void>) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => render_float(*n),
        Value::String(s) => {
            format!("{:?}", s.to_string_lossy())
        }
        Value::Table(table) => render_table(table, seen),
        other => format!("<{}>", other.type_name()),
    }
}

fn render_float(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    format!("{n:?}")
}

fn render_table(table: &Table, seen: &mut Vec<*const c_void>) -> String {
    let ptr = table.to_pointer();
    if seen.contains(&ptr) {
        return "<cycle>".to_string();
    }
    // `seen` holds the tables currently open, so its length is the nesting depth.
    if seen.len() >= MAX_RENDER_DEPTH {
        return TOO_DEEP.to_string();
    }
    seen.push(ptr);

    let entries: Vec<(Value, Value)> = table.pairs::<Value, Value>().filter_map(Result::ok).collect();
    let rendered = if entries.is_empty() {
        "{}".to_string()
    } else if let Some(items) = as_sequence(&entries) {
        let parts: Vec<String> = items.iter().map(|v| render_inner(v, seen)).collect();
        format!("[{}]", parts.join(", "))
    } else {
        let mut parts: Vec<String> = entries
            .iter()
            .map(|(k, v)| format!("{} = {}", render_key(k, seen), render_inner(v, seen)))
            .collect();
        parts.sort();
        format!("{{{}}}", parts.join(", "))
    };

    seen.pop();
    rendered
}

/// Values ordered by index when the keys are exactly `1..=n`.
fn as_sequence(entries: &[(Value, Value)]) -> Option<Vec<&Value>> {
    let n = entries.len();
    let mut slots: Vec<Option<&Value>> = vec![None; n];
    for (key, value) in entries {
        let Value::Integer(idx) = key else {
            return None;
        };
        let idx = usize::try_from(*idx).ok()?;
        if idx == 0 || idx > n {
            return None;
        }
        slots[idx - 1] = Some(value);
    }
    slots.into_iter().collect()
}

fn render_key(key: &Value, seen: &mut Vec<*const c_void>) -> String {
    if let Value::String(s) = key {
        let text = s.to_string_lossy();
        if is_identifier(&text) {
            return text;
        }
    }
    format!("[{}]", render_inner(key, seen))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::{Lua, MultiValue};

    /// Evaluate `source` and render its return values while the state is alive.
    fn render(source: &str) -> String {
        let lua = Lua::new();
        let values: MultiValue = lua.load(source).eval().expect("eval");
        render_values(&values.into_iter().collect::<Vec<_>>())
    }

    #[test]
    fn renders_scalars() {
        assert_eq!(render("return 42"), "42");
        assert_eq!(render("return 2 + 2"), "4");
        assert_eq!(render("return 4.0"), "4.0");
        assert_eq!(render("return 0.5"), "0.5");
        assert_eq!(render("return true"), "true");
        assert_eq!(render("return nil"), "nil");
        assert_eq!(render("return 1/0"), "inf");
    }

    #[test]
    fn renders_strings_quoted_and_escaped() {
        assert_eq!(render("return 'hi'"), "\"hi\"");
        assert_eq!(render(r#"return 'a"b\n'"#), r#""a\"b\n""#);
    }

    #[test]
    fn renders_invalid_utf8_lossily() {
        assert_eq!(render(r"return 'h\195'"), "\"h\u{fffd}\"");
    }

    #[test]
    fn renders_multiple_values_as_list() {
        assert_eq!(render("return 1, 'two', nil"), "[1, \"two\", nil]");
    }

    #[test]
    fn renders_sequences_and_maps() {
        assert_eq!(render("return {1, 2, 3}"), "[1, 2, 3]");
        assert_eq!(render("return {}"), "{}");
        assert_eq!(
            render("return {b = 2, a = 'x', ['not ident'] = true}"),
            "{[\"not ident\"] = true, a = \"x\", b = 2}"
        );
        assert_eq!(render("return {[2] = 'b', [5] = 'e'}"), "{[2] = \"b\", [5] = \"e\"}");
        assert_eq!(render("return {{1}, {k = {}}}"), "[[1], {k = {}}]");
    }

    #[test]
    fn renders_cycles_and_opaque_values() {
        assert_eq!(render("local t = {}; t.self = t; return t"), "{self = <cycle>}");
        assert_eq!(render("return print"), "<function>");
    }

    #[test]
    fn deep_nesting_is_cut_off() {
        let rendered = render(
            "local t = {} local c = t for i = 1, 200000 do c[1] = {} c = c[1] end return t",
        );
        assert!(rendered.starts_with(&"[".repeat(MAX_RENDER_DEPTH)));
        assert!(rendered.contains(TOO_DEEP));
        assert_eq!(rendered.matches('[').count(), MAX_RENDER_DEPTH);
    }
}
