//! partition - split an oversized source file into domain-scoped modules

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = partition_cli::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
