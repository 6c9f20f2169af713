//! Execution limits shared by both engines.

use std::str::FromStr;

/// Bounds applied to one execution.
///
/// The defaults bound worst-case memory for pathological loops while keeping
/// snapshots small enough to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLimits {
    /// Maximum number of steps before tracing aborts. Default: 2000.
    pub max_steps: usize,
    /// Wall-clock budget in milliseconds. Default: 5000.
    pub timeout_ms: u64,
    /// Maximum stack frames captured per step. Default: 10.
    pub max_frames: usize,
    /// Maximum variables captured per frame. Default: 40.
    pub max_locals: usize,
    /// Maximum characters of any rendered string. Default: 200.
    pub max_string: usize,
    /// Nesting depth at which composite values collapse to a type marker.
    /// Default: 2.
    pub serialize_depth: usize,
    /// Maximum properties captured per heap object. Default: 100.
    pub max_properties: usize,
    /// Whether to capture full snapshots or only line events.
    pub capture_snapshots: bool,
    /// With snapshots off, whether to keep a line-only step per executed
    /// line. Default: true.
    pub record_lines: bool,
}

impl Default for TraceLimits {
    fn default() -> Self {
        TraceLimits {
            max_steps: 2000,
            timeout_ms: 5000,
            max_frames: 10,
            max_locals: 40,
            max_string: 200,
            serialize_depth: 2,
            max_properties: 100,
            capture_snapshots: true,
            record_lines: true,
        }
    }
}

impl TraceLimits {
    /// Defaults overlaid with `CODEFLOW_MAX_STEPS`, `CODEFLOW_TIMEOUT_MS` and
    /// `CODEFLOW_MAX_STRING` from the environment.
    pub fn from_env() -> Self {
        let mut limits = TraceLimits::default();
        if let Some(v) = env_value("CODEFLOW_MAX_STEPS") {
            limits.max_steps = v;
        }
        if let Some(v) = env_value("CODEFLOW_TIMEOUT_MS") {
            limits.timeout_ms = v;
        }
        if let Some(v) = env_value("CODEFLOW_MAX_STRING") {
            limits.max_string = v;
        }
        limits
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn without_snapshots(mut self) -> Self {
        self.capture_snapshots = false;
        self
    }

    /// Limits for pass/fail runs: no snapshots, no per-line steps and no step
    /// cutoff, leaving the timeout as the only bound.
    pub fn for_validation(mut self) -> Self {
        self.capture_snapshots = false;
        self.record_lines = false;
        self.max_steps = usize::MAX;
        self
    }

    /// Whether a host should keep one line-only step per line event.
    pub fn keeps_line_steps(&self) -> bool {
        !self.capture_snapshots && self.record_lines
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let limits = TraceLimits::default();
        assert_eq!(limits.max_steps, 2000);
        assert_eq!(limits.timeout_ms, 5000);
        assert_eq!(limits.max_frames, 10);
        assert_eq!(limits.max_locals, 40);
        assert_eq!(limits.max_string, 200);
        assert_eq!(limits.serialize_depth, 2);
        assert!(limits.capture_snapshots);
        assert!(limits.record_lines);
    }

    #[test]
    fn builders_override_fields() {
        let limits = TraceLimits::default()
            .with_timeout_ms(100)
            .with_max_steps(7)
            .without_snapshots();
        assert_eq!(limits.timeout_ms, 100);
        assert_eq!(limits.max_steps, 7);
        assert!(!limits.capture_snapshots);
    }

    #[test]
    fn validation_limits_only_keep_the_timeout() {
        let limits = TraceLimits::default().with_timeout_ms(900).for_validation();
        assert_eq!(limits.max_steps, usize::MAX);
        assert_eq!(limits.timeout_ms, 900);
        assert!(!limits.capture_snapshots);
        assert!(!limits.keeps_line_steps());
        assert!(TraceLimits::default().without_snapshots().keeps_line_steps());
        assert!(!TraceLimits::default().keeps_line_steps());
    }
}
