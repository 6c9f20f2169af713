//! Plain-text rendering of traces for the terminal.

use std::fmt::Write;

use codeflow_core::{diff_steps, Step, TraceResult, Variable};
use codeflow_check::ValidationReport;
use serde_json::Value;

/// One step: position, line, call stack and the top frame's variables.
/// `total` is unknown while a stepped session is still running.
pub fn step(index: usize, total: Option<usize>, step: &Step, prev: Option<&Step>) -> String {
    let mut out = String::new();
    let calls: Vec<&str> = step
        .stack
        .iter()
        .map(|frame| frame.function_name.as_str())
        .collect();
    let _ = match total {
        Some(total) => write!(out, "step {}/{}", index + 1, total),
        None => write!(out, "step {}", index + 1),
    };
    let _ = write!(out, "  line {}", step.line);
    if !calls.is_empty() {
        let _ = write!(out, "  [{}]", calls.join(" > "));
    }
    out.push('\n');

    let changes = diff_steps(prev, step);
    if let Some(frame) = step.top_frame() {
        for var in &frame.variables {
            let touched = changes.added.contains(&var.name)
                || changes.changed.contains(&var.name)
                || var
                    .ref_id
                    .as_ref()
                    .is_some_and(|id| changes.heap_mutated.contains(id));
            let marker = if touched { '*' } else { ' ' };
            let _ = writeln!(out, "  {} {} = {}", marker, var.name, value(step, var, 0));
        }
    }
    out
}

/// A variable's value, expanding heap references one level deep.
fn value(step: &Step, var: &Variable, depth: usize) -> String {
    let Some(id) = var.ref_id.as_deref() else {
        return scalar(&var.value);
    };
    let Some(object) = step.heap_object(id) else {
        return format!("<{}>", id);
    };
    if depth > 0 {
        return format!("{}#{}", object.class_name, id);
    }
    let items: Vec<String> = object
        .properties
        .iter()
        .map(|p| format!("{}: {}", p.name, value(step, p, depth + 1)))
        .collect();
    format!("{}#{} {{{}}}", object.class_name, id, items.join(", "))
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

/// Closing summary of a finished run.
pub fn summary(result: &TraceResult) -> String {
    if result.ok {
        match &result.result {
            Some(value) => format!("ok: {} steps, returned {}", result.steps.len(), value),
            None => format!("ok: {} steps", result.steps.len()),
        }
    } else {
        let error = result.error.as_deref().unwrap_or("unknown error");
        match result.failure_line() {
            Some(line) => format!("error at line {}: {}", line, error),
            None => format!("error: {}", error),
        }
    }
}

pub fn report(report: &ValidationReport) -> String {
    let mut out = String::new();
    for line in &report.messages {
        let _ = writeln!(out, "  {}", line);
    }
    let _ = write!(out, "{}", report.message);
    if let Some(line) = report.error_line {
        let _ = write!(out, " (line {})", line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeflow_core::{HeapObject, StackFrame};
    use serde_json::json;

    fn sample() -> Step {
        Step {
            line: 4,
            stack: vec![StackFrame {
                id: "f1".into(),
                function_name: "<main>".into(),
                line: 4,
                variables: vec![
                    Variable::primitive("name", json!("ada")),
                    Variable::reference("xs", "h1"),
                ],
            }],
            heap: vec![HeapObject {
                id: "h1".into(),
                class_name: "Array".into(),
                properties: vec![Variable::primitive("0", json!(1))],
            }],
        }
    }

    #[test]
    fn renders_variables_and_heap() {
        let text = step(0, Some(3), &sample(), None);
        assert!(text.starts_with("step 1/3  line 4  [<main>]"));
        assert!(text.contains("* name = \"ada\""));
        assert!(text.contains("* xs = Array#h1 {0: 1}"));
    }

    #[test]
    fn unchanged_variables_are_unmarked() {
        let s = sample();
        let text = step(1, None, &s, Some(&s));
        assert!(text.starts_with("step 2  line 4"));
        assert!(text.contains("    name = \"ada\""));
    }

    #[test]
    fn summaries() {
        let ok = TraceResult::success(vec![sample()], Vec::new(), Some(json!(5)));
        assert_eq!(summary(&ok), "ok: 1 steps, returned 5");
        let failed = TraceResult::failure(
            Vec::new(),
            Vec::new(),
            &codeflow_core::TraceError::runtime("Error: boom", Some(2)),
        );
        assert_eq!(summary(&failed), "error at line 2: Error: boom");
    }
}
