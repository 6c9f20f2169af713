//! Runs user code against exercise tests.
//!
//! Each test executes in a fresh sandbox through [`JsHost::run`] with
//! snapshots and the step cutoff disabled, so only the timeout bounds a
//! test. The line hooks still run so a failure can point at the line that
//! threw. The first failing test stops the run.

use codeflow_core::{NoopObserver, Test, TraceLimits};
use codeflow_js::{discover_entry, Entry, JsHost, RunRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::equality::deep_equal;
use crate::error::CheckError;
use crate::shape::arguments;

/// Outcome of a validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub ok: bool,
    pub message: String,
    /// One line per test that ran, in order.
    #[serde(default)]
    pub messages: Vec<String>,
    /// 1-based index of the failing test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_test: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_line: Option<u32>,
}

impl ValidationReport {
    fn passed(messages: Vec<String>) -> Self {
        ValidationReport {
            ok: true,
            message: "All tests passed".to_string(),
            messages,
            failed_test: None,
            expected: None,
            actual: None,
            error_line: None,
        }
    }

    fn failed(message: String, messages: Vec<String>) -> Self {
        ValidationReport {
            ok: false,
            message,
            messages,
            failed_test: None,
            expected: None,
            actual: None,
            error_line: None,
        }
    }
}

/// Validates `user` code against `tests`.
///
/// The function to call is discovered in `starter` (the exercise's template),
/// falling back to `user` when the starter declares none.
pub async fn run_tests(
    starter: &str,
    user: &str,
    tests: &[Test],
    limits: &TraceLimits,
) -> ValidationReport {
    let entry = match discover_entry(starter).or_else(|_| discover_entry(user)) {
        Ok(entry) => entry,
        Err(error) => return ValidationReport::failed(error.to_string(), Vec::new()),
    };
    let host = JsHost::new(limits.clone().for_validation());
    let mut messages = Vec::with_capacity(tests.len());

    for (index, test) in tests.iter().enumerate() {
        let label = label(index, test);
        let request = RunRequest::new(user)
            .with_entry(Entry::named(entry.as_str()))
            .with_args(arguments(&test.input));
        let result = host.run(request, &mut NoopObserver).await;

        if !result.ok {
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| "program raised an exception".to_string());
            let message = format!("{} failed: {}", label, error);
            messages.push(message.clone());
            let mut report = ValidationReport::failed(message, messages);
            report.failed_test = Some(index + 1);
            report.expected = Some(test.expected.clone());
            report.error_line = result.failure_line();
            return report;
        }

        let actual = result.result.unwrap_or(Value::Null);
        if !deep_equal(&actual, &test.expected) {
            let message = format!(
                "{} failed: expected {} but got {}",
                label, test.expected, actual
            );
            messages.push(message.clone());
            let mut report = ValidationReport::failed(message, messages);
            report.failed_test = Some(index + 1);
            report.expected = Some(test.expected.clone());
            report.actual = Some(actual);
            return report;
        }
        messages.push(format!("{} passed", label));
    }

    tracing::debug!("{} tests passed for `{}`", tests.len(), entry);
    ValidationReport::passed(messages)
}

fn label(index: usize, test: &Test) -> String {
    match &test.name {
        Some(name) => format!("Test {} ({})", index + 1, name),
        None => format!("Test {}", index + 1),
    }
}

/// Reads test definitions: either a JSON array of tests or an object with a
/// `tests` array.
pub fn parse_tests(json: &str) -> Result<Vec<Test>, CheckError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Definitions {
        List(Vec<Test>),
        Wrapped { tests: Vec<Test> },
    }

    match serde_json::from_str::<Definitions>(json) {
        Ok(Definitions::List(tests)) | Ok(Definitions::Wrapped { tests }) => Ok(tests),
        Err(err) => Err(CheckError::InvalidTests {
            message: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn labels_include_names() {
        let named = Test {
            name: Some("basic".into()),
            input: json!([1]),
            expected: json!(1),
        };
        let unnamed = Test {
            name: None,
            ..named.clone()
        };
        assert_eq!(label(0, &named), "Test 1 (basic)");
        assert_eq!(label(2, &unnamed), "Test 3");
    }

    #[test]
    fn parses_both_definition_forms() {
        let list = parse_tests(r#"[{"input": [1], "expected": 2}]"#).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].expected, json!(2));

        let json = r#"{"tests": [
            {"name": "a", "input": 1, "expected": 1},
            {"input": 2, "expected": 2}
        ]}"#;
        let wrapped = parse_tests(json).unwrap();
        assert_eq!(wrapped.len(), 2);
        assert_eq!(wrapped[0].name.as_deref(), Some("a"));
    }

    #[test]
    fn rejects_malformed_definitions() {
        let err = parse_tests("{\"cases\": 3}").unwrap_err();
        assert!(matches!(err, CheckError::InvalidTests { .. }));
    }

    #[test]
    fn report_serializes_camel_case() {
        let mut report = ValidationReport::failed("Test 1 failed: boom".into(), Vec::new());
        report.failed_test = Some(1);
        report.error_line = Some(4);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failedTest"], 1);
        assert_eq!(json["errorLine"], 4);
        assert!(json.get("actual").is_none());
    }
}
