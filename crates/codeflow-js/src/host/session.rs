//! Manual-mode execution: the sandbox pauses at a gate after every snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use codeflow_core::{
    EngineEvent, Envelope, NoopObserver, RunToken, Step, TraceCollector, TraceError,
    TraceResult,
};
use tokio::sync::mpsc::UnboundedReceiver;

use super::gate::StepGate;

/// A program suspended between lines, driven by its owner.
///
/// States: paused at a gate, running (after [`resume`](Self::resume)),
/// completed, or terminated. Dropping the session terminates it.
pub struct SteppedSession {
    token: RunToken,
    collector: TraceCollector,
    events: UnboundedReceiver<Envelope>,
    gate: Arc<StepGate>,
    cancel: Arc<AtomicBool>,
    timeout: Duration,
    terminated: bool,
}

impl SteppedSession {
    pub(crate) fn new(
        collector: TraceCollector,
        events: UnboundedReceiver<Envelope>,
        gate: Arc<StepGate>,
        cancel: Arc<AtomicBool>,
        timeout: Duration,
    ) -> Self {
        SteppedSession {
            token: collector.token(),
            collector,
            events,
            gate,
            cancel,
            timeout,
            terminated: false,
        }
    }

    pub fn token(&self) -> RunToken {
        self.token
    }

    /// Lets the program run to its next gate.
    ///
    /// A step issued while the program is still running toward a gate is
    /// kept, not dropped: calling this `n` times advances the program `n`
    /// lines, whether or not it was paused at the time.
    pub fn step(&self) {
        self.gate.step();
    }

    /// Releases every waiting gate and lets the program run to completion.
    pub fn resume(&self) {
        self.gate.resume();
    }

    /// Stops the program at its next hook. Idempotent.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.cancel.store(true, Ordering::SeqCst);
        self.gate.terminate();
        if !self.collector.is_finished() {
            tracing::warn!("stepped session {} terminated", self.token);
        }
        self.collector.fail(TraceError::Terminated);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn is_finished(&self) -> bool {
        self.collector.is_finished()
    }

    /// Steps recorded so far.
    pub fn steps(&self) -> &[Step] {
        self.collector.steps()
    }

    /// Waits for the next event from the sandbox. Returns `None` once the run
    /// has finished or been terminated.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        if self.terminated || self.collector.is_finished() {
            return None;
        }
        let envelope = self.events.recv().await?;
        let event = envelope.event.clone();
        if self.collector.accept(envelope, &mut NoopObserver) {
            Some(event)
        } else {
            None
        }
    }

    /// Resumes the program and collects the final result. The wait is bounded
    /// by the session's timeout.
    pub async fn finish(mut self) -> TraceResult {
        if !self.terminated {
            self.resume();
            let deadline = tokio::time::Instant::now() + self.timeout;
            while !self.collector.is_finished() {
                tokio::select! {
                    envelope = self.events.recv() => match envelope {
                        Some(envelope) => {
                            self.collector.accept(envelope, &mut NoopObserver);
                        }
                        None => break,
                    },
                    _ = tokio::time::sleep_until(deadline) => {
                        let timeout_ms = self.timeout.as_millis() as u64;
                        tracing::warn!(
                            "stepped session {} timed out after {} ms",
                            self.token,
                            timeout_ms
                        );
                        self.cancel.store(true, Ordering::SeqCst);
                        self.gate.terminate();
                        self.collector.fail(TraceError::Timeout { timeout_ms });
                        break;
                    }
                }
            }
        }
        let collector = std::mem::replace(&mut self.collector, TraceCollector::new(self.token));
        self.terminated = true;
        self.cancel.store(true, Ordering::SeqCst);
        self.gate.terminate();
        collector.into_result()
    }
}

impl Drop for SteppedSession {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.gate.terminate();
    }
}
