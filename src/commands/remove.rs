use anyhow::Result;
use hearthcal_core::{SourceId, Store};
use owo_colors::OwoColorize;

use crate::AppSynchronizer;
use crate::render::Render;

pub fn run(synchronizer: &AppSynchronizer, source_id: SourceId) -> Result<()> {
    let source = synchronizer.store().source(source_id)?;
    let removed = synchronizer.delete_subscription(source_id)?;

    if let Some(source) = source {
        println!("{}", source.render());
    }
    println!("   {} Removed, {} events deleted", "✓".green(), removed);
    Ok(())
}
