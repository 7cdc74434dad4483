use anyhow::Result;
use hearthcal_core::{SourceId, Store, SyncError};
use owo_colors::OwoColorize;

use crate::AppSynchronizer;
use crate::render::Render;

pub async fn run(synchronizer: &AppSynchronizer, source_id: Option<SourceId>) -> Result<()> {
    let Some(source_id) = source_id else {
        let report = synchronizer.synchronize_all().await;
        for failure in &report.failures {
            println!("{} {}", failure.label.bold(), failure.message.red());
        }
        println!("{}", report.render());
        return Ok(());
    };

    let store = synchronizer.store();
    let source = store
        .source(source_id)?
        .ok_or(SyncError::SourceNotFound(source_id))?;

    println!("{}", source.render());
    let name = synchronizer.synchronize_one(&source).await?;
    if source.name.as_deref() != Some(name.as_str()) {
        store.rename_source(source_id, &name)?;
    }

    let count = store.events_for_source(source_id)?.len();
    println!("   {} {} events", "✓".green(), count);
    Ok(())
}
