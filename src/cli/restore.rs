//! The `restore` command

use std::path::Path;

use anyhow::{Context, Result};

use super::output::Output;
use crate::storage::Writer;

pub fn run(output: &Output, source: &Path) -> Result<()> {
    output.verbose_ctx("restore", &format!("Restoring {}", source.display()));

    let backup = Writer::restore(source).with_context(|| format!("Failed to restore {}", source.display()))?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "restored": source.display().to_string(),
            "backup": backup.display().to_string(),
        }));
    } else {
        output.success(&format!("Restored {} from {}", source.display(), backup.display()));
    }

    Ok(())
}
