//! Shared data model and engine-independent logic for the Code Flow trace engine.
//!
//! Everything the execution engines (`codeflow-js`, `codeflow-python`) and
//! their consumers agree on lives here:
//!
//! - [`model`]: the snapshot model (`Step`, `StackFrame`, `HeapObject`, ...)
//!   and the terminal [`TraceResult`].
//! - [`error`]: the [`TraceError`] taxonomy every engine reports through.
//! - [`normalize`]: folds engine-specific output into a `TraceResult`.
//! - [`playback`]: the step cursor and its animation timer.
//! - [`diff`]: changes between two consecutive steps.
//! - [`runs`]: run tokens used to discard stale executions.

pub mod config;
pub mod diff;
pub mod error;
pub mod id;
pub mod model;
pub mod normalize;
pub mod playback;
pub mod runs;

pub use config::TraceLimits;
pub use diff::{diff_steps, StepDiff};
pub use error::{TraceError, TraceErrorKind};
pub use id::RunToken;
pub use model::{
    HeapObject, HeapProperty, OutputEntry, OutputStream, StackFrame, Step, Test, TraceResult,
    Variable, VariableKind,
};
pub use normalize::{
    normalize_python, Completion, EngineEvent, Envelope, NoopObserver, PythonTraceBlob,
    TraceCollector, TraceObserver,
};
pub use playback::{PlaybackController, PlaybackState, Player};
pub use runs::RunRegistry;
