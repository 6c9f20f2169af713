//! The sandbox thread: one boa context per execution.
//!
//! The context lives entirely on its own OS thread and reports back only
//! through [`Envelope`]s on an unbounded channel, so the async host never
//! blocks on interpretation and can walk away from a runaway program.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use boa_engine::vm::RuntimeLimits;
use boa_engine::{
    Context, JsArgs, JsError, JsNativeError, JsResult, JsString, JsValue, NativeFunction,
};
use codeflow_core::{
    Completion, EngineEvent, Envelope, OutputStream, RunToken, Step, TraceError, TraceLimits,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use super::compile;
use super::gate::StepGate;
use crate::instrument::InstrumentedProgram;

const THREAD_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Bounds on hook-free work, which neither the line hook nor the block tick
/// can interrupt.
const LOOP_ITERATION_LIMIT: u64 = 50_000_000;
const RECURSION_LIMIT: usize = 2_000;
const STACK_SIZE_LIMIT: usize = 1024 * 1024;

/// Everything a sandbox thread needs to run one program.
pub(crate) struct Job {
    pub token: RunToken,
    pub program: InstrumentedProgram,
    pub args: Vec<Value>,
    pub limits: TraceLimits,
    pub cancel: Arc<AtomicBool>,
    pub gate: Option<Arc<StepGate>>,
    pub events: UnboundedSender<Envelope>,
}

pub(crate) fn spawn(job: Job) -> Result<JoinHandle<()>, TraceError> {
    thread::Builder::new()
        .name(format!("codeflow-js-{}", job.token))
        .stack_size(THREAD_STACK_BYTES)
        .spawn(move || execute(job))
        .map_err(|err| TraceError::initialization(format!("cannot start sandbox thread: {}", err)))
}

/// State the native hooks share with the thread body.
struct Bridge {
    token: RunToken,
    events: UnboundedSender<Envelope>,
    cancel: Arc<AtomicBool>,
    gate: Option<Arc<StepGate>>,
    max_steps: usize,
    lines: Cell<usize>,
    last_line: Cell<Option<u32>>,
    finished: Cell<bool>,
    stop: RefCell<Option<TraceError>>,
}

impl Bridge {
    fn send(&self, event: EngineEvent) -> JsResult<()> {
        let envelope = Envelope {
            token: self.token,
            event,
        };
        if self.events.send(envelope).is_err() {
            // The host stopped listening: timed out, terminated or dropped.
            self.cancel.store(true, Ordering::SeqCst);
            return Err(self.halt(TraceError::Terminated));
        }
        Ok(())
    }

    /// Records why the sandbox is stopping and builds an error user code
    /// cannot catch.
    fn halt(&self, reason: TraceError) -> JsError {
        let message = reason.to_string();
        self.stop.borrow_mut().get_or_insert(reason);
        JsNativeError::runtime_limit().with_message(message).into()
    }

    /// Block entries check only for cancellation.
    fn on_tick(&self) -> JsResult<()> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(self.halt(TraceError::Terminated));
        }
        Ok(())
    }

    fn on_line(&self, line: u32) -> JsResult<()> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(self.halt(TraceError::Terminated));
        }
        let count = self.lines.get() + 1;
        self.lines.set(count);
        if count > self.max_steps {
            return Err(self.halt(TraceError::TraceLimitExceeded {
                limit: self.max_steps,
            }));
        }
        self.last_line.set(Some(line));
        self.send(EngineEvent::Line { line })
    }

    fn on_emit(&self, kind: &str, payload: &str) -> JsResult<()> {
        match kind {
            "snapshot" => match serde_json::from_str::<Step>(payload) {
                Ok(step) => self.send(EngineEvent::Snapshot(step)),
                Err(err) => {
                    tracing::warn!("dropping malformed snapshot: {}", err);
                    Ok(())
                }
            },
            "output" => match serde_json::from_str::<OutputPayload>(payload) {
                Ok(out) => self.send(EngineEvent::Output {
                    stream: out.stream,
                    text: out.text,
                }),
                Err(err) => {
                    tracing::warn!("dropping malformed output: {}", err);
                    Ok(())
                }
            },
            "done" => {
                let completion = match serde_json::from_str::<DonePayload>(payload) {
                    Ok(done) if done.ok => Completion::Returned(done.result),
                    Ok(done) => Completion::Failed(TraceError::runtime(
                        done.error
                            .filter(|message| !message.is_empty())
                            .unwrap_or_else(|| "program raised an exception".to_string()),
                        done.line.or(self.last_line.get()),
                    )),
                    Err(err) => Completion::Failed(TraceError::runtime(
                        format!("unreadable result: {}", err),
                        self.last_line.get(),
                    )),
                };
                self.finished.set(true);
                self.send(EngineEvent::Finished(completion))
            }
            other => {
                tracing::debug!("ignoring sandbox event `{}`", other);
                Ok(())
            }
        }
    }

    fn on_gate(&self) -> JsResult<()> {
        let Some(gate) = &self.gate else {
            return Ok(());
        };
        match gate.wait() {
            Ok(()) if self.cancel.load(Ordering::SeqCst) => Err(self.halt(TraceError::Terminated)),
            Ok(()) => Ok(()),
            Err(reason) => Err(self.halt(reason)),
        }
    }

    fn stopped(&self) -> bool {
        self.stop.borrow().is_some() || self.cancel.load(Ordering::SeqCst)
    }

    /// Failure for a run that ended without a `done` event or an error, as
    /// when a hook stopped a promise job.
    fn interrupted(&self) -> TraceError {
        if let Some(reason) = self.stop.borrow_mut().take() {
            return reason;
        }
        if self.cancel.load(Ordering::SeqCst) {
            return TraceError::Terminated;
        }
        TraceError::runtime("program ended without a result", self.last_line.get())
    }

    /// Failure for a script evaluation that returned `Err`.
    fn failure(&self, err: &JsError) -> TraceError {
        if let Some(reason) = self.stop.borrow_mut().take() {
            return reason;
        }
        if self.cancel.load(Ordering::SeqCst) {
            return TraceError::Terminated;
        }
        match err.as_native().filter(|native| native.is_runtime_limit()) {
            Some(native) if native.message().contains("loop iteration") => {
                TraceError::TraceLimitExceeded {
                    limit: LOOP_ITERATION_LIMIT as usize,
                }
            }
            Some(_) => TraceError::TraceLimitExceeded {
                limit: RECURSION_LIMIT,
            },
            None => TraceError::runtime(compile::describe(err), self.last_line.get()),
        }
    }
}

#[derive(Deserialize)]
struct OutputPayload {
    stream: OutputStream,
    text: String,
}

#[derive(Deserialize)]
struct DonePayload {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    line: Option<u32>,
}

fn execute(job: Job) {
    let Job {
        token,
        program,
        args,
        limits,
        cancel,
        gate,
        events,
    } = job;
    let bridge = Rc::new(Bridge {
        token,
        events,
        cancel,
        gate,
        max_steps: limits.max_steps,
        lines: Cell::new(0),
        last_line: Cell::new(None),
        finished: Cell::new(false),
        stop: RefCell::new(None),
    });

    tracing::debug!("sandbox {} starting", token);
    let mut context = Context::default();
    let mut runtime = RuntimeLimits::default();
    runtime.set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    runtime.set_recursion_limit(RECURSION_LIMIT);
    runtime.set_stack_size_limit(STACK_SIZE_LIMIT);
    context.set_runtime_limits(runtime);

    if let Err(error) = prepare(&mut context, &bridge, &program, &limits) {
        let _ = bridge.send(EngineEvent::Finished(Completion::Failed(error)));
        return;
    }

    // boa panics when a stop raised inside a promise callback reaches the
    // promise machinery; the context is abandoned either way.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        match compile::invoke(&mut context, &args) {
            Ok(()) if !bridge.stopped() => compile::finish(&mut context),
            other => other,
        }
    }));
    if !bridge.finished.get() {
        let error = match outcome {
            Ok(Err(err)) => bridge.failure(&err),
            Ok(Ok(())) => bridge.interrupted(),
            Err(_) => {
                tracing::debug!("sandbox {} unwound from the interpreter", token);
                bridge.interrupted()
            }
        };
        tracing::debug!("sandbox {} stopped: {}", token, error);
        let _ = bridge.send(EngineEvent::Finished(Completion::Failed(error)));
    }
    tracing::debug!("sandbox {} exiting after {} lines", token, bridge.lines.get());
}

fn prepare(
    context: &mut Context,
    bridge: &Rc<Bridge>,
    program: &InstrumentedProgram,
    limits: &TraceLimits,
) -> Result<(), TraceError> {
    compile::check_user_syntax(context, &program.original)?;
    register_natives(context, bridge)?;
    compile::load_prelude(context, limits)?;
    compile::load_program(context, program)
}

fn register_natives(context: &mut Context, bridge: &Rc<Bridge>) -> Result<(), TraceError> {
    // SAFETY: the closures capture only an `Rc<Bridge>`, which holds no
    // garbage-collected values.
    let line = {
        let bridge = Rc::clone(bridge);
        unsafe {
            NativeFunction::from_closure(move |_this, args, ctx| {
                let line = args.get_or_undefined(0).to_number(ctx)?;
                bridge.on_line(line as u32)?;
                Ok(JsValue::undefined())
            })
        }
    };
    let emit = {
        let bridge = Rc::clone(bridge);
        unsafe {
            NativeFunction::from_closure(move |_this, args, ctx| {
                let kind = args.get_or_undefined(0).to_string(ctx)?.to_std_string_escaped();
                let payload = args.get_or_undefined(1).to_string(ctx)?.to_std_string_escaped();
                bridge.on_emit(&kind, &payload)?;
                Ok(JsValue::undefined())
            })
        }
    };
    let gate = {
        let bridge = Rc::clone(bridge);
        unsafe {
            NativeFunction::from_closure(move |_this, _args, _ctx| {
                bridge.on_gate()?;
                Ok(JsValue::undefined())
            })
        }
    };
    let tick = {
        let bridge = Rc::clone(bridge);
        unsafe {
            NativeFunction::from_closure(move |_this, _args, _ctx| {
                bridge.on_tick()?;
                Ok(JsValue::undefined())
            })
        }
    };

    for (name, length, function) in [
        ("__cf_line", 1, line),
        ("__cf_emit", 2, emit),
        ("__cf_gate", 0, gate),
        ("__cf_tick", 0, tick),
    ] {
        context
            .register_global_builtin_callable(JsString::from(name), length, function)
            .map_err(|err| {
                TraceError::initialization(format!(
                    "cannot register `{}`: {}",
                    name,
                    compile::describe(&err)
                ))
            })?;
    }
    Ok(())
}
