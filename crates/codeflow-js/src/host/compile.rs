//! Loading the prelude and an instrumented program into a boa context.

use std::sync::LazyLock;

use boa_engine::{Context, JsError, JsResult, Script, Source};
use codeflow_core::{TraceError, TraceLimits};
use regex::Regex;
use serde_json::{json, Value};

use crate::instrument::InstrumentedProgram;

const PRELUDE: &str = include_str!("../prelude.js");

static ERROR_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"line (\d+)").unwrap());

/// Lines of context shown on each side of a wrapper syntax error.
const EXCERPT_RADIUS: usize = 2;

/// Rejects source that does not parse as written, attributing the error to
/// the user's line.
pub(crate) fn check_user_syntax(context: &mut Context, source: &str) -> Result<(), TraceError> {
    match Script::parse(Source::from_bytes(source), None, context) {
        Ok(_) => Ok(()),
        Err(err) => {
            let message = describe(&err);
            let line = error_line(&message);
            Err(TraceError::runtime(message, line))
        }
    }
}

/// Installs `__cf_config` and the sandbox runtime.
pub(crate) fn load_prelude(context: &mut Context, limits: &TraceLimits) -> Result<(), TraceError> {
    let config = json!({
        "snapshots": limits.capture_snapshots,
        "depth": limits.serialize_depth,
        "maxString": limits.max_string,
        "maxProperties": limits.max_properties,
        "maxLocals": limits.max_locals,
        "maxFrames": limits.max_frames,
    });
    let source = format!("const __cf_config = {};\n{}", config, PRELUDE);
    context
        .eval(Source::from_bytes(&source))
        .map(|_| ())
        .map_err(|err| TraceError::initialization(format!("prelude failed: {}", describe(&err))))
}

/// Parses and evaluates the wrapper, which defines `globalThis.__cf_program`.
///
/// The user's source already parsed, so a failure here is the rewrite's
/// fault and is reported with the offending wrapper lines.
pub(crate) fn load_program(
    context: &mut Context,
    program: &InstrumentedProgram,
) -> Result<(), TraceError> {
    let script = Script::parse(Source::from_bytes(&program.wrapper_source), None, context)
        .map_err(|err| {
            let message = describe(&err);
            let excerpt = error_line(&message)
                .map(|line| excerpt(&program.wrapper_source, line))
                .unwrap_or_default();
            tracing::warn!("instrumented program failed to parse: {}", message);
            TraceError::WrapperSyntax { message, excerpt }
        })?;
    script
        .evaluate(context)
        .map(|_| ())
        .map_err(|err| TraceError::initialization(format!("wrapper failed: {}", describe(&err))))
}

/// Calls the program through the prelude's `__cf_execute`, then drains the
/// promise job queue so `then` callbacks and async functions run to
/// completion. An `Err` here means the sandbox was stopped by a native hook
/// or a runtime limit.
///
/// A stop raised inside a job clears the queue without surfacing here; the
/// caller checks the bridge before [`finish`].
pub(crate) fn invoke(context: &mut Context, args: &[Value]) -> JsResult<()> {
    let args_json = Value::Array(args.to_vec()).to_string();
    let literal = Value::String(args_json).to_string();
    let call = format!("__cf_execute(globalThis.__cf_program, {});", literal);
    context.eval(Source::from_bytes(&call))?;
    context.run_jobs();
    Ok(())
}

/// Emits the `done` event for the outcome `__cf_execute` recorded.
pub(crate) fn finish(context: &mut Context) -> JsResult<()> {
    context.eval(Source::from_bytes("__cf_finish();")).map(|_| ())
}

pub(crate) fn describe(err: &JsError) -> String {
    err.to_string()
}

fn error_line(message: &str) -> Option<u32> {
    ERROR_LINE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn excerpt(source: &str, line: u32) -> String {
    let index = (line as usize).saturating_sub(1);
    let start = index.saturating_sub(EXCERPT_RADIUS);
    source
        .split('\n')
        .enumerate()
        .skip(start)
        .take(index - start + EXCERPT_RADIUS + 1)
        .map(|(i, text)| format!("{:>4} | {}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n")
}
