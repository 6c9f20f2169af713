//! Validation runner and playground tests against real sandboxes.

use codeflow_check::{run_tests, Language, Playground, RunOutcome};
use codeflow_core::{Test, TraceLimits};
use serde_json::json;

const STARTER: &str = "function twoSum(nums, target) {\n  // your code here\n}";

const CORRECT: &str = "function twoSum(nums, target) {
  const seen = new Map();
  for (let i = 0; i < nums.length; i++) {
    const need = target - nums[i];
    if (seen.has(need)) {
      return [seen.get(need), i];
    }
    seen.set(nums[i], i);
  }
  return [];
}";

const WRONG: &str = "function twoSum(nums, target) {\n  return [1, 0];\n}";

const THROWS: &str = "function twoSum(nums, target) {\n  const x = null;\n  return x.length;\n}";

fn tests() -> Vec<Test> {
    vec![
        Test {
            name: Some("basic".into()),
            input: json!([[2, 7, 11, 15], 9]),
            expected: json!([0, 1]),
        },
        Test {
            name: None,
            input: json!({"input": [3, 2, 4], "target": 6}),
            expected: json!([1, 2]),
        },
    ]
}

#[tokio::test]
async fn correct_solution_passes_every_test() {
    let report = run_tests(STARTER, CORRECT, &tests(), &TraceLimits::default()).await;
    assert!(report.ok, "unexpected failure: {}", report.message);
    assert_eq!(report.message, "All tests passed");
    assert_eq!(report.messages, vec!["Test 1 (basic) passed", "Test 2 passed"]);
}

#[tokio::test]
async fn wrong_answer_stops_at_first_failure() {
    let report = run_tests(STARTER, WRONG, &tests(), &TraceLimits::default()).await;
    assert!(!report.ok);
    assert_eq!(report.failed_test, Some(1));
    assert!(report.message.contains("Test 1"));
    assert!(report.message.contains("basic"));
    assert_eq!(report.expected, Some(json!([0, 1])));
    assert_eq!(report.actual, Some(json!([1, 0])));
    assert_eq!(report.messages.len(), 1);
}

#[tokio::test]
async fn thrown_error_reports_its_line() {
    let report = run_tests(STARTER, THROWS, &tests(), &TraceLimits::default()).await;
    assert!(!report.ok);
    assert_eq!(report.failed_test, Some(1));
    assert_eq!(report.error_line, Some(3));
    assert!(report.message.contains("TypeError"));
}

#[tokio::test]
async fn entry_falls_back_to_user_code() {
    let report = run_tests("", CORRECT, &tests()[..1], &TraceLimits::default()).await;
    assert!(report.ok, "unexpected failure: {}", report.message);
}

#[tokio::test]
async fn playground_runs_javascript() {
    let playground = Playground::new(TraceLimits::default());
    let outcome = playground
        .run("editor", Language::JavaScript, "console.log(1 + 1);")
        .await;
    let result = outcome.into_result().unwrap();
    assert!(result.ok);
    assert_eq!(result.stdout(), "2\n");
    assert_eq!(playground.active_runs(), 0);
}

#[tokio::test]
async fn newer_run_supersedes_older_one() {
    let playground = Playground::new(TraceLimits::default());
    // join! polls the first future first, so both runs begin before either
    // can finish and the second supersedes the first.
    let (first, second) = tokio::join!(
        playground.run("editor", Language::JavaScript, "let a = 1;"),
        playground.run("editor", Language::JavaScript, "let b = 2;"),
    );
    assert_eq!(first, RunOutcome::Superseded);
    assert!(matches!(second, RunOutcome::Completed(ref r) if r.ok));
    assert_eq!(playground.active_runs(), 0);
}

#[tokio::test]
async fn long_running_solution_is_not_cut_off_by_the_step_limit() {
    let brute = "function twoSum(nums, target) {
  for (let i = 0; i < nums.length; i++) {
    for (let j = i + 1; j < nums.length; j++) {
      if (nums[i] + nums[j] === target) {
        return [i, j];
      }
    }
  }
  return [];
}";
    let nums: Vec<u32> = (0..60).collect();
    let tests = vec![Test {
        name: Some("large".into()),
        input: json!([nums, 117]),
        expected: json!([58, 59]),
    }];
    let limits = TraceLimits::default().with_max_steps(2000);
    let report = run_tests(STARTER, brute, &tests, &limits).await;
    assert!(report.ok, "unexpected failure: {}", report.message);
}
