use std::collections::HashMap;

use anyhow::Result;
use hearthcal_core::{SourceId, Store};
use owo_colors::OwoColorize;

use crate::AppSynchronizer;
use crate::render::print_by_day;

pub fn run(synchronizer: &AppSynchronizer, source_id: Option<SourceId>, limit: usize) -> Result<()> {
    let store = synchronizer.store();

    let events = match source_id {
        Some(id) => store.events_for_source(id)?,
        None => store.events()?,
    };

    if events.is_empty() {
        println!("{}", "No events found".dimmed());
        return Ok(());
    }

    let labels: HashMap<SourceId, String> = store
        .sources(None)?
        .into_iter()
        .filter_map(|source| Some((source.id?, source.label().to_string())))
        .collect();

    let shown = &events[..limit.min(events.len())];
    print_by_day(shown, synchronizer.floating_timezone(), |event| {
        match event.source_id {
            Some(id) => labels.get(&id).cloned(),
            None => Some("local".to_string()),
        }
    });

    if events.len() > shown.len() {
        println!(
            "\n{}",
            format!("...and {} more", events.len() - shown.len()).dimmed()
        );
    }

    Ok(())
}
