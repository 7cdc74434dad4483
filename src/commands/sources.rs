use anyhow::Result;
use hearthcal_core::Store;
use owo_colors::OwoColorize;

use crate::AppSynchronizer;
use crate::render::Render;

pub fn run(synchronizer: &AppSynchronizer) -> Result<()> {
    let store = synchronizer.store();
    let sources = store.sources(None)?;

    if sources.is_empty() {
        println!("{}", "No calendar sources yet".dimmed());
        println!("\nSubscribe to a feed with:\n  hearthcal add <url> --member <id>");
        return Ok(());
    }

    for source in &sources {
        let events = match source.id {
            Some(id) => store.events_for_source(id)?.len(),
            None => 0,
        };
        println!("{}", source.render());

        let detail = format!(
            "{} · member {} · {} events",
            source.kind, source.member_id, events
        );
        println!("   {}", detail.dimmed());
        if let Some(url) = &source.url {
            println!("   {}", url.dimmed());
        }
    }

    Ok(())
}
