//! End-to-end checks over the model: events are collected into a result, the
//! result is played back and diffed, and the wire shape stays stable.

use codeflow_core::{
    diff_steps, Completion, EngineEvent, Envelope, HeapObject, NoopObserver, OutputStream,
    PlaybackController, RunRegistry, StackFrame, Step, TraceCollector, TraceError, TraceResult,
    Variable,
};
use serde_json::json;

fn main_frame(line: u32, variables: Vec<Variable>) -> StackFrame {
    StackFrame {
        id: "f1".into(),
        function_name: "<main>".into(),
        line,
        variables,
    }
}

fn counting_trace() -> TraceResult {
    let registry = RunRegistry::new();
    let token = registry.begin("editor");
    let mut collector = TraceCollector::new(token);

    let events = vec![
        EngineEvent::Line { line: 1 },
        EngineEvent::Snapshot(Step {
            line: 1,
            stack: vec![main_frame(1, vec![Variable::reference("xs", "h1")])],
            heap: vec![HeapObject {
                id: "h1".into(),
                class_name: "Array".into(),
                properties: vec![],
            }],
        }),
        EngineEvent::Output {
            stream: OutputStream::Stdout,
            text: "pushing\n".into(),
        },
        EngineEvent::Line { line: 2 },
        EngineEvent::Snapshot(Step {
            line: 2,
            stack: vec![main_frame(2, vec![Variable::reference("xs", "h1")])],
            heap: vec![HeapObject {
                id: "h1".into(),
                class_name: "Array".into(),
                properties: vec![Variable::primitive("0", json!(1))],
            }],
        }),
        EngineEvent::Finished(Completion::Returned(Some(json!([1])))),
    ];
    for event in events {
        collector.accept(Envelope { token, event }, &mut NoopObserver);
    }
    assert!(registry.finish("editor", token));
    collector.into_result()
}

#[test]
fn collected_trace_plays_back_and_diffs() {
    let result = counting_trace();
    assert!(result.ok);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.output[0].step_index, 1);

    let mut controller = PlaybackController::new(result.steps.len());
    assert_eq!(controller.highlighted_line(&result.steps), Some(1));
    controller.next();
    assert_eq!(controller.highlighted_line(&result.steps), Some(2));
    assert_eq!(result.output_until(controller.current_index()).count(), 1);

    let diff = diff_steps(result.steps.first(), &result.steps[1]);
    assert!(diff.heap_created.is_empty());
    assert_eq!(diff.heap_mutated, vec!["h1"]);
}

#[test]
fn failed_result_serializes_error_fields() {
    let result = TraceResult::failure(
        vec![Step::line_only(3)],
        vec![],
        &TraceError::runtime("ReferenceError: y is not defined", Some(3)),
    );
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["ok"], false);
    assert_eq!(json["errorLine"], 3);
    assert_eq!(json["errorKind"], "runtime");
    assert!(json.get("result").is_none());

    let back: TraceResult = serde_json::from_value(json).unwrap();
    assert_eq!(back, result);
}

#[test]
fn reference_variable_wire_shape() {
    insta::assert_json_snapshot!(Variable::reference("arr", "h1"), @r###"
    {
      "name": "arr",
      "value": "h1",
      "kind": "reference",
      "refId": "h1"
    }
    "###);
}
