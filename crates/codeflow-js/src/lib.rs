//! JavaScript path of the Code Flow trace engine.
//!
//! [`instrument`] rewrites user source so it reports each executed line, and
//! [`JsHost`] runs the result inside a fresh `boa_engine` context, either to
//! completion or one gate at a time through a [`SteppedSession`].

pub mod host;
pub mod instrument;

pub use host::{JsHost, RunRequest, StepGate, SteppedSession};
pub use instrument::{discover_entry, instrument, Entry, InstrumentMode, InstrumentedProgram};
