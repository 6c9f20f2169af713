//! Python path of the Code Flow trace engine.
//!
//! CPython is embedded through `pyo3`. A small driver module (`tracer.py`)
//! runs the user's program under `sys.settrace` and hands the whole trace
//! back as one JSON document, which [`codeflow_core::normalize_python`]
//! turns into a `TraceResult`.

pub mod driver;
pub mod runtime;

pub use driver::{run_python_trace, PythonDriver};
pub use runtime::PythonRuntime;
