//! Changes between two consecutive steps.

use serde::Serialize;

use crate::model::{HeapObject, Step, Variable};

/// What changed going from one step to the next.
///
/// Variable changes are reported for the top frame only. When the top frame
/// itself changed (a call or a return), every variable of the new frame counts
/// as added.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
    pub heap_created: Vec<String>,
    pub heap_mutated: Vec<String>,
    pub heap_released: Vec<String>,
    /// Stack depth of `next` minus stack depth of `prev`.
    pub depth_delta: isize,
}

impl StepDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.changed.is_empty()
            && self.removed.is_empty()
            && self.heap_created.is_empty()
            && self.heap_mutated.is_empty()
            && self.heap_released.is_empty()
            && self.depth_delta == 0
    }
}

pub fn diff_steps(prev: Option<&Step>, next: &Step) -> StepDiff {
    let mut diff = StepDiff::default();
    let Some(prev) = prev else {
        if let Some(frame) = next.top_frame() {
            diff.added = frame.variables.iter().map(|v| v.name.clone()).collect();
        }
        diff.heap_created = next.heap.iter().map(|h| h.id.clone()).collect();
        diff.depth_delta = next.stack.len() as isize;
        return diff;
    };

    diff.depth_delta = next.stack.len() as isize - prev.stack.len() as isize;

    let prev_frame = prev.top_frame();
    let next_frame = next.top_frame();
    let same_frame = match (prev_frame, next_frame) {
        (Some(a), Some(b)) => a.id == b.id,
        _ => false,
    };
    let before: &[Variable] = match prev_frame {
        Some(frame) if same_frame => &frame.variables,
        _ => &[],
    };
    let after: &[Variable] = next_frame.map(|f| f.variables.as_slice()).unwrap_or(&[]);

    for var in after {
        match before.iter().find(|v| v.name == var.name) {
            None => diff.added.push(var.name.clone()),
            Some(old) if old.value != var.value || old.kind != var.kind => {
                diff.changed.push(var.name.clone())
            }
            Some(_) => {}
        }
    }
    for var in before {
        if !after.iter().any(|v| v.name == var.name) {
            diff.removed.push(var.name.clone());
        }
    }

    for object in &next.heap {
        match prev.heap_object(&object.id) {
            None => diff.heap_created.push(object.id.clone()),
            Some(old) if !same_contents(old, object) => diff.heap_mutated.push(object.id.clone()),
            Some(_) => {}
        }
    }
    for object in &prev.heap {
        if next.heap_object(&object.id).is_none() {
            diff.heap_released.push(object.id.clone());
        }
    }
    diff
}

fn same_contents(a: &HeapObject, b: &HeapObject) -> bool {
    a.class_name == b.class_name && a.properties == b.properties
}
