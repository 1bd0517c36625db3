//! # Verification Oracle
//!
//! The partitioner infers imports from a static catalog, so its output can be
//! wrong in ways only a real compiler notices. The oracle runs an external
//! checker (typically `tsc --noEmit`) before and after a write and compares
//! the diagnostic counts.

mod check;

pub use check::{CheckCommand, CheckError, CheckOutcome, Verdict, Verification};
