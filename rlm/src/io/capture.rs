//! In-memory replacement for the interpreter's `print`.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::{Function, Lua, MultiValue};

/// Registry slot holding the interpreter's own `tostring`, captured before any
/// script can shadow the global.
const TOSTRING_KEY: &str = "rlm.tostring";

/// Accumulates everything scripts print during one execution.
///
/// Cloning shares the same buffer, so the handle installed in the interpreter
/// and the one kept by the executor see the same text.
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    buffer: Rc<RefCell<String>>,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.buffer.borrow_mut().clear();
    }

    /// Take the accumulated text, leaving the buffer empty.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.buffer.borrow_mut())
    }

    fn append_line(&self, parts: &[String]) {
        let mut buffer = self.buffer.borrow_mut();
        buffer.push_str(&parts.join("\t"));
        buffer.push('\n');
    }

    /// Replace the global `print` with one that writes into this buffer.
    pub fn install(&self, lua: &Lua) -> mlua::Result<()> {
        let tostring: Function = lua.globals().get("tostring")?;
        lua.set_named_registry_value(TOSTRING_KEY, tostring)?;

        let capture = self.clone();
        let print = lua.create_function(move |lua, args: MultiValue| {
            let tostring: Function = lua.named_registry_value(TOSTRING_KEY)?;
            let parts = args
                .into_iter()
                .map(|value| {
                    tostring
                        .call::<mlua::String>(value)
                        .map(|text| text.to_string_lossy())
                })
                .collect::<mlua::Result<Vec<String>>>()?;
            capture.append_line(&parts);
            Ok(())
        })?;
        lua.globals().set("print", print)
    }
}
