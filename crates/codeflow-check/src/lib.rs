//! Validation of user code against exercise tests, and the playground facade
//! that dispatches runs to the right engine.

pub mod equality;
pub mod error;
pub mod playground;
pub mod runner;
pub mod shape;

pub use equality::deep_equal;
pub use error::CheckError;
pub use playground::{Language, Playground, RunOutcome};
pub use runner::{parse_tests, run_tests, ValidationReport};
pub use shape::arguments;
