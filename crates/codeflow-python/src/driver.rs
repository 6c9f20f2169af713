//! Async entry point for tracing Python programs.

use std::time::Duration;

use codeflow_core::{normalize_python, PythonTraceBlob, TraceError, TraceLimits, TraceResult};

use crate::runtime::PythonRuntime;

/// Extra time the host waits past the driver's own deadline before giving up
/// on the blocking task.
const GRACE_MS: u64 = 1000;

/// Traces Python programs under the configured [`TraceLimits`].
#[derive(Debug, Clone, Default)]
pub struct PythonDriver {
    limits: TraceLimits,
}

impl PythonDriver {
    pub fn new(limits: TraceLimits) -> Self {
        PythonDriver { limits }
    }

    pub fn limits(&self) -> &TraceLimits {
        &self.limits
    }

    pub async fn run(&self, source: &str) -> TraceResult {
        run_python_trace(source, &self.limits).await
    }
}

/// Runs `source` to completion and returns its trace.
///
/// Like the JavaScript host this never fails: initialization errors,
/// timeouts and driver faults come back inside the [`TraceResult`].
pub async fn run_python_trace(source: &str, limits: &TraceLimits) -> TraceResult {
    let runtime = match PythonRuntime::shared().await {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::warn!("python unavailable: {}", error);
            return TraceResult::rejected(&error);
        }
    };

    let task = {
        let source = source.to_string();
        let limits = limits.clone();
        tokio::task::spawn_blocking(move || runtime.trace_blocking(&source, &limits))
    };
    let budget = Duration::from_millis(limits.timeout_ms.saturating_add(GRACE_MS));
    let json = match tokio::time::timeout(budget, task).await {
        Ok(Ok(Ok(json))) => json,
        Ok(Ok(Err(error))) => return TraceResult::rejected(&error),
        Ok(Err(join)) => {
            let error = TraceError::runtime(format!("trace task failed: {}", join), None);
            return TraceResult::rejected(&error);
        }
        Err(_) => {
            // The driver's cooperative deadline did not fire, most likely
            // because native code held the interpreter.
            tracing::warn!("python run exceeded {} ms", limits.timeout_ms);
            return TraceResult::rejected(&TraceError::Timeout {
                timeout_ms: limits.timeout_ms,
            });
        }
    };

    match PythonTraceBlob::parse(&json) {
        Ok(blob) => normalize_python(blob, limits),
        Err(err) => {
            tracing::warn!("unreadable python trace: {}", err);
            TraceResult::rejected(&TraceError::runtime(
                format!("malformed trace document: {}", err),
                None,
            ))
        }
    }
}
