//! The `classify` command

use anyhow::Result;

use super::app::Session;
use super::output::Output;
use crate::domain::Assignment;

pub fn run(output: &Output, session: &Session, names: &[String]) -> Result<()> {
    let engine = session.engine()?;
    output.verbose_ctx(
        "classify",
        &format!("{} rules in profile '{}'", engine.rules.rules().len(), session.profile_name),
    );

    let rows: Vec<(&str, String, bool)> = names
        .iter()
        .map(|name| match engine.rules.assign(name) {
            Assignment::Domain { key, matched } => (name.as_str(), key.to_string(), matched),
            Assignment::Retained => (name.as_str(), "(root)".to_string(), engine.rules.is_retained(name)),
        })
        .collect();

    if output.is_json() {
        let items: Vec<_> = rows
            .iter()
            .map(|(name, domain, matched)| {
                serde_json::json!({
                    "name": name,
                    "domain": domain,
                    "matched": matched,
                })
            })
            .collect();
        output.data(&items);
    } else {
        for (name, domain, _) in &rows {
            println!("{}\t{}", name, domain);
        }
    }

    Ok(())
}
