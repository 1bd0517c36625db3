//! partition - split an oversized source file into domain-scoped modules
//!
//! A profile describes how declarations look (introducer pattern, delimiters),
//! how they group into domains, and which imports each group needs. The
//! original file is rewritten as a thin root that imports the generated
//! modules, and an optional external checker confirms nothing broke.

pub mod domain;
pub mod storage;
pub mod oracle;
pub mod cli;

pub use domain::{DomainKey, PartitionPlan, Partitioner, SourceDocument};
pub use storage::{partition, PartitionOptions, PartitionReport};
