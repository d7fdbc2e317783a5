//! Machine-readable output of a run.
//!
//! Only JSON is produced here; turning the kept → relocated mapping into
//! reports is left to whatever consumes it.

pub mod json;

pub use json::{JsonOutput, JsonOutputError};
