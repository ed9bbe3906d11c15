//! Capability-restricted Lua interpreter.
//!
//! A [`Sandbox`] wraps one Lua state whose globals persist across evaluations,
//! so scripts can build helpers over several iterations. Capabilities named in
//! the deny-list are replaced by stubs that raise a runtime error, which keeps
//! every blocked call visible to the script author instead of silently doing
//! nothing. The standard libraries scripts may use are reachable only through
//! read-only proxies.
//!
//! A failed evaluation leaves the interpreter as it was before the call: the
//! global table and every script-owned table reachable from it are put back.
//! Locals captured as upvalues by script functions are outside that snapshot.

use std::cell::Cell;
use std::collections::HashSet;
use std::ffi::c_void;
use std::fmt;
use std::rc::Rc;

use anyhow::{Result, anyhow};
use mlua::{Function, HookTriggers, Lua, MultiValue, Table, Value, VmState};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::capture::OutputCapture;

/// Qualified names made unreachable from scripts by default.
pub const DEFAULT_DENYLIST: &[&str] = &[
    // file access
    "io",
    "os.remove",
    "os.rename",
    "os.tmpname",
    // process and environment
    "os.execute",
    "os.exit",
    "os.getenv",
    "os.setlocale",
    // dynamic code loading
    "load",
    "loadstring",
    "loadfile",
    "dofile",
    "require",
    "package",
    "string.dump",
    // introspection and metadata mutation
    "debug",
    "getmetatable",
    "setmetatable",
    "rawget",
    "rawset",
    "rawequal",
    "rawlen",
    // memory management
    "collectgarbage",
    // cooperative multitasking
    "coroutine",
];

/// Library tables scripts can read but not modify.
pub const READ_ONLY_LIBRARIES: &[&str] = &["string", "table", "math", "os", "utf8"];

/// Instructions between two checks of the instruction limit.
const HOOK_INTERVAL: u32 = 1_000;

/// Sandbox settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Qualified names (`name` or `table.field`) to block.
    pub denylist: Vec<String>,
    /// Upper bound for interpreter memory, in bytes.
    pub memory_limit_bytes: Option<usize>,
    /// Upper bound for VM instructions per evaluation.
    pub instruction_limit: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            memory_limit_bytes: None,
            instruction_limit: None,
        }
    }
}

/// A script that could not be compiled or raised while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptFault {
    Syntax(String),
    Runtime(String),
}

impl fmt::Display for ScriptFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptFault::Syntax(msg) => write!(f, "syntax error: {msg}"),
            ScriptFault::Runtime(msg) => write!(f, "runtime error: {msg}"),
        }
    }
}

impl std::error::Error for ScriptFault {}

impl From<mlua::Error> for ScriptFault {
    fn from(err: mlua::Error) -> Self {
        match err {
            mlua::Error::SyntaxError { message, .. } => ScriptFault::Syntax(message),
            mlua::Error::RuntimeError(message) => ScriptFault::Runtime(message),
            other => ScriptFault::Runtime(other.to_string()),
        }
    }
}

/// `mlua::Error` is not `Send`, so it enters `anyhow` as text.
pub(crate) fn lua_error(err: mlua::Error) -> anyhow::Error {
    anyhow!("{err}")
}

/// One interpreter instance, exclusively owned by a session.
pub struct Sandbox {
    lua: Lua,
    capture: OutputCapture,
    instructions: Rc<Cell<u64>>,
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox").finish_non_exhaustive()
    }
}

impl Sandbox {
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        Self::build(config).map_err(lua_error)
    }

    fn build(config: &SandboxConfig) -> mlua::Result<Self> {
        let lua = Lua::new();
        if let Some(limit) = config.memory_limit_bytes {
            lua.set_memory_limit(limit)?;
        }

        let capture = OutputCapture::new();
        capture.install(&lua)?;
        let next: Function = lua.globals().get("next")?;
        for name in &config.denylist {
            deny(&lua, name)?;
        }
        for name in READ_ONLY_LIBRARIES {
            make_read_only(&lua, name, &next)?;
        }

        let instructions = Rc::new(Cell::new(0));
        if let Some(limit) = config.instruction_limit {
            limit_instructions(&lua, limit, instructions.clone())?;
        }
        debug!(denied = config.denylist.len(), "sandbox ready");

        Ok(Self {
            lua,
            capture,
            instructions,
        })
    }

    pub fn capture(&self) -> &OutputCapture {
        &self.capture
    }

    pub(crate) fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn set_global(&self, name: &str, value: impl mlua::IntoLua) -> Result<()> {
        self.lua.globals().set(name, value).map_err(lua_error)
    }

    /// Compile and run `source`, returning whatever it returned.
    ///
    /// On failure the interpreter is put back the way it was before the call.
    pub fn evaluate(&self, source: &str) -> Result<Vec<Value>, ScriptFault> {
        let snapshot = Snapshot::capture(&self.lua.globals())?;
        self.instructions.set(0);

        let result = self
            .lua
            .load(source)
            .set_name("script")
            .eval::<MultiValue>();

        match result {
            Ok(values) => Ok(values.into_iter().collect()),
            Err(err) => {
                snapshot.restore()?;
                Err(ScriptFault::from(err))
            }
        }
    }
}

/// Contents of the global table and of every script-owned table reachable from it.
///
/// Tables with a metatable are sandbox-owned (library proxies, denied stubs)
/// and cannot be written by scripts, so they are not recorded.
struct Snapshot {
    tables: Vec<(Table, Vec<(Value, Value)>)>,
}

impl Snapshot {
    fn capture(globals: &Table) -> mlua::Result<Self> {
        let mut seen: HashSet<*const c_void> = HashSet::from([globals.to_pointer()]);
        let mut pending = vec![globals.clone()];
        let mut tables = Vec::new();

        while let Some(table) = pending.pop() {
            let entries: Vec<(Value, Value)> =
                table.pairs::<Value, Value>().collect::<mlua::Result<_>>()?;
            for (key, value) in &entries {
                for item in [key, value] {
                    if let Value::Table(child) = item
                        && child.metatable().is_none()
                        && seen.insert(child.to_pointer())
                    {
                        pending.push(child.clone());
                    }
                }
            }
            tables.push((table, entries));
        }

        Ok(Self { tables })
    }

    fn restore(self) -> mlua::Result<()> {
        for (table, entries) in self.tables {
            table.clear()?;
            for (key, value) in entries {
                table.raw_set(key, value)?;
            }
        }
        Ok(())
    }
}

/// Replace `name` (`global` or `table.field`) with a stub that raises on use.
fn deny(lua: &Lua, name: &str) -> mlua::Result<()> {
    let globals = lua.globals();
    let (owner, field) = match name.split_once('.') {
        Some((table, field)) => match globals.get::<Value>(table)? {
            Value::Table(owner) => (owner, field),
            // Parent already blocked or absent: nothing reachable to replace.
            _ => return Ok(()),
        },
        None => (globals, name),
    };

    // Functions stay functions; libraries and names absent from this Lua
    // version become a table that raises on index, assignment and call.
    let stub = match owner.get::<Value>(field)? {
        Value::Function(_) => Value::Function(denied_function(lua, name)?),
        _ => Value::Table(denied_table(lua, name)?),
    };
    owner.raw_set(field, stub)
}

fn denied_message(name: &str) -> String {
    format!("'{name}' is not available in this sandbox")
}

fn denied_function(lua: &Lua, name: &str) -> mlua::Result<Function> {
    let message = denied_message(name);
    lua.create_function(move |_, _: MultiValue| -> mlua::Result<()> {
        Err(mlua::Error::runtime(message.clone()))
    })
}

fn denied_table(lua: &Lua, name: &str) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    let metatable = lua.create_table()?;

    let prefix = name.to_string();
    let index = lua.create_function(move |_, (_, key): (Value, Value)| -> mlua::Result<()> {
        Err(mlua::Error::runtime(denied_message(&format!(
            "{prefix}.{}",
            key_label(&key)
        ))))
    })?;
    let call = denied_function(lua, name)?;
    metatable.set("__index", index.clone())?;
    metatable.set("__newindex", index)?;
    metatable.set("__call", call)?;
    metatable.set("__metatable", false)?;
    table.set_metatable(Some(metatable));
    Ok(table)
}

/// Swap the global library `name` for a proxy that reads through to it and
/// raises on assignment. `pairs` still walks the real library.
fn make_read_only(lua: &Lua, name: &str, next: &Function) -> mlua::Result<()> {
    let globals = lua.globals();
    let Value::Table(library) = globals.get::<Value>(name)? else {
        return Ok(());
    };
    if library.metatable().is_some() {
        // Already a denied stub.
        return Ok(());
    }

    let proxy = lua.create_table()?;
    let metatable = lua.create_table()?;

    let prefix = name.to_string();
    let assign = lua.create_function(move |_, (_, key, _): (Value, Value, Value)| -> mlua::Result<()> {
        Err(mlua::Error::runtime(format!(
            "'{prefix}.{}' is read-only in this sandbox",
            key_label(&key)
        )))
    })?;
    let next = next.clone();
    let target = library.clone();
    let iterate = lua.create_function(move |_, _: MultiValue| {
        Ok((next.clone(), target.clone(), Value::Nil))
    })?;

    metatable.set("__index", library)?;
    metatable.set("__newindex", assign)?;
    metatable.set("__pairs", iterate)?;
    metatable.set("__metatable", false)?;
    proxy.set_metatable(Some(metatable));
    globals.raw_set(name, proxy)
}

/// Raise once an evaluation has run more than `limit` VM instructions.
///
/// Every later check raises again, and `pcall`/`xpcall` re-raise once the limit
/// is spent, so a script cannot swallow it.
fn limit_instructions(lua: &Lua, limit: u64, counter: Rc<Cell<u64>>) -> mlua::Result<()> {
    let globals = lua.globals();
    for name in ["pcall", "xpcall"] {
        let Value::Function(protected_call) = globals.get::<Value>(name)? else {
            continue;
        };
        let counter = counter.clone();
        let guarded = lua.create_function(move |_, args: MultiValue| {
            let results = protected_call.call::<MultiValue>(args)?;
            if counter.get() > limit {
                return Err(instruction_limit_error(limit));
            }
            Ok(results)
        })?;
        globals.raw_set(name, guarded)?;
    }

    lua.set_hook(
        HookTriggers::new().every_nth_instruction(HOOK_INTERVAL),
        move |_, _| {
            let used = counter.get() + u64::from(HOOK_INTERVAL);
            counter.set(used);
            if used > limit {
                return Err(instruction_limit_error(limit));
            }
            Ok(VmState::Continue)
        },
    );
    Ok(())
}

fn instruction_limit_error(limit: u64) -> mlua::Error {
    mlua::Error::runtime(format!("instruction limit of {limit} exceeded"))
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.to_string_lossy(),
        Value::Integer(i) => i.to_string(),
        other => other.type_name().to_string(),
    }
}
