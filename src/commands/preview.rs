use anyhow::Result;
use owo_colors::OwoColorize;

use crate::AppSynchronizer;
use crate::render::{Render, print_by_day};

pub async fn run(synchronizer: &AppSynchronizer, url: &str, limit: usize) -> Result<()> {
    let calendar = synchronizer.preview(url).await?;

    println!("📅 {}", calendar.name.bold());
    println!(
        "{}",
        format!("{} events in the sync window", calendar.events.len()).dimmed()
    );
    println!();

    if calendar.events.is_empty() {
        println!("{}", "No events found".dimmed());
    } else {
        let shown = &calendar.events[..limit.min(calendar.events.len())];
        print_by_day(shown, synchronizer.floating_timezone(), |_| None);

        if calendar.events.len() > shown.len() {
            println!(
                "\n{}",
                format!("...and {} more", calendar.events.len() - shown.len()).dimmed()
            );
        }
    }

    if !calendar.skipped.is_empty() {
        println!("\nSkipped {} malformed events:", calendar.skipped.len());
        for skipped in &calendar.skipped {
            println!("   {}", skipped.render());
        }
    }

    Ok(())
}
