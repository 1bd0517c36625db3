//! # Command-Line Interface
//!
//! User-facing commands and output formatting.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `split` | Partition a file and rewrite it as a composition root |
//! | `scan` | List declarations and their domains, no writes |
//! | `classify` | Show the domain for given names |
//! | `restore` | Copy `<file>.backup` back over the file |
//! | `init` | Write a starter `.partition.toml` |
//! | `profiles` | List available profiles |
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output:
//! ```bash
//! partition --verbose split server/db.ts --out server/repositories
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod split;
mod scan;
mod classify;
mod restore;

pub use app::{run, Cli, Commands, Session};
pub use output::{Output, OutputFormat};
