//! Sandboxed execution of instrumented JavaScript.
//!
//! Each execution gets a fresh `boa_engine` context on a dedicated thread
//! (see [`worker`]). The only globals beyond the ECMAScript builtins are the
//! prelude's `console` and the three hook natives; there is no DOM, network,
//! storage, timer or filesystem access.

mod compile;
mod gate;
mod session;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use codeflow_core::{
    RunToken, TraceCollector, TraceError, TraceLimits, TraceObserver, TraceResult,
};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::instrument::{instrument, Entry, InstrumentMode};

pub use gate::StepGate;
pub use session::SteppedSession;

/// One program to execute.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: String,
    pub entry: Entry,
    pub args: Vec<Value>,
    pub token: RunToken,
}

impl RunRequest {
    pub fn new(source: impl Into<String>) -> Self {
        RunRequest {
            source: source.into(),
            entry: Entry::Script,
            args: Vec::new(),
            token: RunToken::new(),
        }
    }

    pub fn with_entry(mut self, entry: Entry) -> Self {
        self.entry = entry;
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_token(mut self, token: RunToken) -> Self {
        self.token = token;
        self
    }
}

/// Runs JavaScript programs under the configured [`TraceLimits`].
#[derive(Debug, Clone, Default)]
pub struct JsHost {
    limits: TraceLimits,
}

impl JsHost {
    pub fn new(limits: TraceLimits) -> Self {
        JsHost { limits }
    }

    pub fn limits(&self) -> &TraceLimits {
        &self.limits
    }

    /// Runs `request` to completion, streaming progress to `observer`.
    ///
    /// Never fails: every error, including a timeout, comes back inside the
    /// [`TraceResult`] together with the steps and output recorded before it.
    pub async fn run(
        &self,
        request: RunRequest,
        observer: &mut (dyn TraceObserver + Send),
    ) -> TraceResult {
        let program = match instrument(&request.source, &request.entry, InstrumentMode::Auto) {
            Ok(program) => program,
            Err(error) => return TraceResult::rejected(&error),
        };
        let token = request.token;
        let mut collector =
            TraceCollector::new(token).with_line_steps(self.limits.keeps_line_steps());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));

        tracing::debug!(
            "run {}: {} instrumented lines, entry {:?}",
            token,
            program.instrumented_lines.len(),
            program.entry
        );
        let job = worker::Job {
            token,
            program,
            args: request.args,
            limits: self.limits.clone(),
            cancel: Arc::clone(&cancel),
            gate: None,
            events: tx,
        };
        if let Err(error) = worker::spawn(job) {
            tracing::warn!("run {}: {}", token, error);
            collector.fail(error);
            return collector.into_result();
        }

        let timeout_ms = self.limits.timeout_ms;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        while !collector.is_finished() {
            tokio::select! {
                envelope = rx.recv() => match envelope {
                    Some(envelope) => {
                        collector.accept(envelope, &mut *observer);
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!("run {} timed out after {} ms", token, timeout_ms);
                    cancel.store(true, Ordering::SeqCst);
                    collector.fail(TraceError::Timeout { timeout_ms });
                }
            }
        }
        collector.into_result()
    }

    /// Starts `request` in manual mode. The program stops at a gate after
    /// each traced line until the session releases it.
    pub fn start(&self, request: RunRequest) -> Result<SteppedSession, TraceError> {
        let program = instrument(&request.source, &request.entry, InstrumentMode::Stepped)?;
        let token = request.token;
        let collector =
            TraceCollector::new(token).with_line_steps(self.limits.keeps_line_steps());
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(StepGate::new());

        worker::spawn(worker::Job {
            token,
            program,
            args: request.args,
            limits: self.limits.clone(),
            cancel: Arc::clone(&cancel),
            gate: Some(Arc::clone(&gate)),
            events: tx,
        })?;
        tracing::debug!("stepped session {} started", token);
        Ok(SteppedSession::new(
            collector,
            rx,
            gate,
            cancel,
            Duration::from_millis(self.limits.timeout_ms),
        ))
    }
}
