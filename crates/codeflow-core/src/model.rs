//! Snapshot model: the serialization contract between runners and visualizers.
//!
//! A full execution produces an ordered, finite sequence of [`Step`]s plus the
//! [`OutputEntry`]s printed along the way, wrapped in a [`TraceResult`]. Steps
//! are built fresh for every line event and never mutated afterwards, so
//! historical steps stay stable for seek and replay.
//!
//! Field names serialize in camelCase (`functionName`, `refId`, `stepIndex`,
//! `errorLine`) to match what UI code consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TraceError, TraceErrorKind};

/// Whether a variable's value is rendered inline or points into the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    Primitive,
    Reference,
}

/// One binding visible in a stack frame, or one property of a heap object.
///
/// For references, `value` repeats the heap id and `ref_id` links to the
/// [`HeapObject`] in the same step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: Value,
    pub kind: VariableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
}

impl Variable {
    pub fn primitive(name: impl Into<String>, value: Value) -> Self {
        Variable {
            name: name.into(),
            value,
            kind: VariableKind::Primitive,
            ref_id: None,
        }
    }

    pub fn reference(name: impl Into<String>, ref_id: impl Into<String>) -> Self {
        let ref_id = ref_id.into();
        Variable {
            name: name.into(),
            value: Value::String(ref_id.clone()),
            kind: VariableKind::Reference,
            ref_id: Some(ref_id),
        }
    }

    pub fn is_reference(&self) -> bool {
        self.kind == VariableKind::Reference
    }
}

/// One active call at the moment of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: String,
    pub function_name: String,
    pub line: u32,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl StackFrame {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// A heap object's member. Same shape as a [`Variable`]: nested composites are
/// references to other heap objects.
pub type HeapProperty = Variable;

/// A composite value (array, object, dict, set, tuple) reachable at a step.
///
/// `id` stays the same across steps for the same underlying object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapObject {
    pub id: String,
    pub class_name: String,
    #[serde(default)]
    pub properties: Vec<HeapProperty>,
}

impl HeapObject {
    pub fn property(&self, name: &str) -> Option<&HeapProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// One captured execution-line moment.
///
/// `stack` lists the outermost call first and the most recent call last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub line: u32,
    #[serde(default)]
    pub stack: Vec<StackFrame>,
    #[serde(default)]
    pub heap: Vec<HeapObject>,
}

impl Step {
    /// A step that only records the line (no frames or heap).
    pub fn line_only(line: u32) -> Self {
        Step {
            line,
            stack: Vec::new(),
            heap: Vec::new(),
        }
    }

    /// The frame of the call that was executing at this step.
    pub fn top_frame(&self) -> Option<&StackFrame> {
        self.stack.last()
    }

    pub fn heap_object(&self, id: &str) -> Option<&HeapObject> {
        self.heap.iter().find(|h| h.id == id)
    }

    /// Resolves a variable of the top frame, following its reference if any.
    pub fn resolve(&self, name: &str) -> Option<(&Variable, Option<&HeapObject>)> {
        let variable = self.top_frame()?.variable(name)?;
        let object = variable
            .ref_id
            .as_deref()
            .and_then(|id| self.heap_object(id));
        Some((variable, object))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Printed output, tagged with the step active when it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEntry {
    pub stream: OutputStream,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default)]
    pub step_index: usize,
}

/// Terminal outcome of one execution.
///
/// Invariant: when `ok` is false, `error` is non-empty. `error_line`, when
/// present, is a line of the user's original source. Steps and output captured
/// before a failure are always kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    pub ok: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub output: Vec<OutputEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<TraceErrorKind>,
}

impl TraceResult {
    pub fn success(steps: Vec<Step>, output: Vec<OutputEntry>, result: Option<Value>) -> Self {
        TraceResult {
            ok: true,
            steps,
            output,
            result,
            error: None,
            error_line: None,
            error_kind: None,
        }
    }

    pub fn failure(steps: Vec<Step>, output: Vec<OutputEntry>, error: &TraceError) -> Self {
        let mut message = error.to_string();
        if message.trim().is_empty() {
            message = format!("{:?}", error.kind());
        }
        TraceResult {
            ok: false,
            steps,
            output,
            result: None,
            error: Some(message),
            error_line: error.line(),
            error_kind: Some(error.kind()),
        }
    }

    /// A failed result with no steps or output, for errors raised before
    /// anything ran.
    pub fn rejected(error: &TraceError) -> Self {
        TraceResult::failure(Vec::new(), Vec::new(), error)
    }

    /// Line of the last captured step.
    pub fn last_line(&self) -> Option<u32> {
        self.steps.last().map(|s| s.line)
    }

    /// The line a code view should highlight for the failure: `error_line`,
    /// else the last successfully traced line.
    pub fn failure_line(&self) -> Option<u32> {
        if self.ok {
            return None;
        }
        self.error_line.or_else(|| self.last_line())
    }

    /// Concatenated text of one output stream.
    pub fn stream_text(&self, stream: OutputStream) -> String {
        self.output
            .iter()
            .filter(|e| e.stream == stream)
            .map(|e| e.text.as_str())
            .collect()
    }

    pub fn stdout(&self) -> String {
        self.stream_text(OutputStream::Stdout)
    }

    /// Output written up to and including step `index`.
    pub fn output_until(&self, index: usize) -> impl Iterator<Item = &OutputEntry> {
        self.output.iter().filter(move |e| e.step_index <= index)
    }
}

/// An input/expected-output pair from an exercise definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub expected: Value,
}
