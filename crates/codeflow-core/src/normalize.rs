//! Trace/result normalization.
//!
//! The JavaScript host streams [`EngineEvent`]s while the sandbox runs; the
//! Python driver hands back one JSON blob at the end. Both end up as the same
//! [`TraceResult`] shape here. No business logic beyond shape adaptation and
//! default-filling belongs in this module.

use serde::Deserialize;
use serde_json::Value;

use crate::config::TraceLimits;
use crate::error::TraceError;
use crate::id::RunToken;
use crate::model::{OutputEntry, OutputStream, Step, TraceResult};

/// A raw event emitted by an execution engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// An instrumented line finished executing.
    Line { line: u32 },
    /// A full snapshot for the line just executed.
    Snapshot(Step),
    /// Text printed by the program.
    Output { stream: OutputStream, text: String },
    /// The program finished. Always the last event of a run.
    Finished(Completion),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Returned(Option<Value>),
    Failed(TraceError),
}

/// An event tagged with the run that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub token: RunToken,
    pub event: EngineEvent,
}

/// Progress callbacks fired before the terminal result.
pub trait TraceObserver {
    fn on_step(&mut self, _line: u32) {}
    fn on_snapshot(&mut self, _step: &Step) {}
    fn on_output(&mut self, _entry: &OutputEntry) {}
}

/// Observer that ignores every callback.
pub struct NoopObserver;

impl TraceObserver for NoopObserver {}

/// Folds one run's event stream into a [`TraceResult`].
#[derive(Debug)]
pub struct TraceCollector {
    token: RunToken,
    /// Record a line-only step for every line event (used when snapshots are
    /// disabled).
    line_steps: bool,
    steps: Vec<Step>,
    output: Vec<OutputEntry>,
    last_line: Option<u32>,
    outcome: Option<Completion>,
}

impl TraceCollector {
    pub fn new(token: RunToken) -> Self {
        TraceCollector {
            token,
            line_steps: false,
            steps: Vec::new(),
            output: Vec::new(),
            last_line: None,
            outcome: None,
        }
    }

    pub fn with_line_steps(mut self, line_steps: bool) -> Self {
        self.line_steps = line_steps;
        self
    }

    pub fn token(&self) -> RunToken {
        self.token
    }

    /// Records an envelope. Returns `false` (and records nothing) when the
    /// envelope belongs to another run.
    pub fn accept(&mut self, envelope: Envelope, observer: &mut dyn TraceObserver) -> bool {
        if envelope.token != self.token {
            tracing::debug!(
                "discarding event from stale run {} (current {})",
                envelope.token,
                self.token
            );
            return false;
        }
        self.record(envelope.event, observer);
        true
    }

    pub fn record(&mut self, event: EngineEvent, observer: &mut dyn TraceObserver) {
        if self.outcome.is_some() {
            return;
        }
        match event {
            EngineEvent::Line { line } => {
                self.last_line = Some(line);
                observer.on_step(line);
                if self.line_steps {
                    self.steps.push(Step::line_only(line));
                }
            }
            EngineEvent::Snapshot(step) => {
                observer.on_snapshot(&step);
                self.steps.push(step);
            }
            EngineEvent::Output { stream, text } => {
                // Hooks fire after their line, so output belongs to the step
                // that is about to be recorded.
                let entry = OutputEntry {
                    stream,
                    text,
                    line: None,
                    step_index: self.steps.len(),
                };
                observer.on_output(&entry);
                self.output.push(entry);
            }
            EngineEvent::Finished(completion) => {
                self.outcome = Some(completion);
            }
        }
    }

    /// Ends the run with `error` unless it already finished.
    pub fn fail(&mut self, error: TraceError) {
        if self.outcome.is_none() {
            self.outcome = Some(Completion::Failed(error));
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn last_line(&self) -> Option<u32> {
        self.last_line
    }

    pub fn into_result(self) -> TraceResult {
        let TraceCollector {
            steps,
            mut output,
            outcome,
            ..
        } = self;
        clamp_step_indices(&mut output, steps.len());
        match outcome {
            Some(Completion::Returned(result)) => TraceResult::success(steps, output, result),
            Some(Completion::Failed(error)) => TraceResult::failure(steps, output, &error),
            None => TraceResult::failure(
                steps,
                output,
                &TraceError::runtime("sandbox exited without reporting a result", None),
            ),
        }
    }
}

fn clamp_step_indices(output: &mut [OutputEntry], step_count: usize) {
    let last = step_count.saturating_sub(1);
    for entry in output {
        entry.step_index = entry.step_index.min(last);
    }
}

/// The JSON document produced by the Python trace driver.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonTraceBlob {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub output: Vec<OutputEntry>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_line: Option<u32>,
    /// `"runtime"`, `"syntax"`, `"traceLimit"` or `"timeout"`.
    #[serde(default)]
    pub error_type: Option<String>,
}

impl PythonTraceBlob {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Converts the driver's blob into a [`TraceResult`].
pub fn normalize_python(blob: PythonTraceBlob, limits: &TraceLimits) -> TraceResult {
    let PythonTraceBlob {
        ok,
        steps,
        mut output,
        error,
        error_line,
        error_type,
    } = blob;
    clamp_step_indices(&mut output, steps.len());
    if ok {
        return TraceResult::success(steps, output, None);
    }
    let message = error.unwrap_or_default();
    let error = match error_type.as_deref() {
        Some("traceLimit") => TraceError::TraceLimitExceeded {
            limit: limits.max_steps,
        },
        Some("timeout") => TraceError::Timeout {
            timeout_ms: limits.timeout_ms,
        },
        _ => {
            let message = if message.is_empty() {
                "program raised an exception".to_string()
            } else {
                message
            };
            TraceError::runtime(message, error_line)
        }
    };
    TraceResult::failure(steps, output, &error)
}
