//! The process-wide embedded interpreter.

use std::ffi::CString;
use std::sync::{Arc, Mutex};

use codeflow_core::{TraceError, TraceLimits};
use pyo3::prelude::*;
use pyo3::types::PyModule;
use tokio::sync::OnceCell;

const TRACER_SOURCE: &str = include_str!("tracer.py");

static SHARED: OnceCell<Arc<PythonRuntime>> = OnceCell::const_new();

/// CPython with the trace driver module compiled.
///
/// Initialization happens once per process. Concurrent first callers await
/// the same initialization; if it fails, the next caller tries again.
pub struct PythonRuntime {
    tracer: Py<PyModule>,
    /// Tracing swaps `sys.stdout` and the thread's trace function, so runs
    /// are serialized.
    run_lock: Mutex<()>,
}

impl PythonRuntime {
    pub async fn shared() -> Result<Arc<PythonRuntime>, TraceError> {
        SHARED
            .get_or_try_init(|| async {
                let runtime = tokio::task::spawn_blocking(PythonRuntime::load)
                    .await
                    .map_err(|err| {
                        TraceError::initialization(format!("interpreter loader panicked: {}", err))
                    })??;
                tracing::info!("python runtime ready");
                Ok::<_, TraceError>(Arc::new(runtime))
            })
            .await
            .cloned()
    }

    fn load() -> Result<PythonRuntime, TraceError> {
        let code = CString::new(TRACER_SOURCE)
            .map_err(|err| TraceError::initialization(format!("driver source: {}", err)))?;
        Python::attach(|py| {
            let module = PyModule::from_code(py, &code, c"codeflow_tracer.py", c"codeflow_tracer")
                .map_err(|err| {
                    tracing::warn!("python driver failed to load: {}", err);
                    TraceError::initialization(err.to_string())
                })?;
            Ok(PythonRuntime {
                tracer: module.unbind(),
                run_lock: Mutex::new(()),
            })
        })
    }

    /// Runs `source` under the driver and returns its JSON document. Blocks
    /// the calling thread for the whole run.
    pub fn trace_blocking(&self, source: &str, limits: &TraceLimits) -> Result<String, TraceError> {
        let _guard = self
            .run_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Python::attach(|py| {
            let run_trace = self.tracer.bind(py).getattr("run_trace")?;
            let args = (
                source,
                limits.max_steps,
                limits.timeout_ms as f64 / 1000.0,
                limits.max_frames,
                limits.max_locals,
                limits.max_string,
                limits.serialize_depth,
                limits.max_properties,
                limits.capture_snapshots,
            );
            run_trace.call1(args)?.extract::<String>()
        })
        .map_err(|err: PyErr| TraceError::runtime(format!("trace driver failed: {}", err), None))
    }
}
