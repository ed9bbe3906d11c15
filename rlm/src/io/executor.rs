//! Script executor: runs one script and classifies what happened.
//!
//! Execution never fails from the caller's point of view. Syntax and runtime
//! errors come back as [`ScriptOutcome::Fault`] so the session can show them to
//! the model and keep going.

use tracing::{debug, instrument, warn};

use crate::core::render::render_values;
use crate::core::types::ScriptOutcome;
use crate::io::sandbox::Sandbox;

/// Run `script` in `sandbox`.
///
/// - no return values: [`ScriptOutcome::Continue`] with everything printed
/// - one or more return values: [`ScriptOutcome::Halt`] with the rendered answer
/// - compile or runtime error: [`ScriptOutcome::Fault`] with the error text
#[instrument(skip_all, fields(script_bytes = script.len()))]
pub fn execute(sandbox: &Sandbox, script: &str) -> ScriptOutcome {
    let capture = sandbox.capture();
    capture.clear();

    let outcome = match sandbox.evaluate(script) {
        Ok(values) if values.is_empty() => ScriptOutcome::Continue(capture.take()),
        Ok(values) => ScriptOutcome::Halt(render_values(&values)),
        Err(fault) => {
            warn!(%fault, "script faulted");
            ScriptOutcome::Fault(fault.to_string())
        }
    };
    debug!(outcome = outcome.as_str(), "script finished");
    outcome
}
