use anyhow::Result;
use hearthcal_core::{MemberId, NewSource, Store};
use owo_colors::OwoColorize;

use crate::AppSynchronizer;
use crate::render::Render;

pub async fn run(synchronizer: &AppSynchronizer, url: &str, member: MemberId) -> Result<()> {
    let source = synchronizer
        .add_subscription(NewSource::ical(url, member))
        .await?;

    let count = match source.id {
        Some(id) => synchronizer.store().events_for_source(id)?.len(),
        None => 0,
    };

    println!("{}", source.render());
    println!("   {} {} events imported", "✓".green(), count);
    Ok(())
}
