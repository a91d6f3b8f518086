use crate::{
    ExecutableCommand, api_client::FileRecord, commands::ConnectionArgs,
    format::{display_count, display_file_size},
};
use anyhow::Result;
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use tracing::info;

const TOP_DOWNLOADS_SHOWN: usize = 5;

/// Show aggregate statistics for the account's stored files.
#[derive(Parser)]
pub struct StatsCommand {
    #[clap(flatten)]
    connection: ConnectionArgs,
}

impl ExecutableCommand for StatsCommand {
    async fn run(self) -> Result<()> {
        let client = self.connection.client();
        let files = client.user_files().await?;
        info!("found {} files in account", files.len());

        let totals = Totals::of(&files);
        println!("Total size: {}", display_file_size(totals.size));
        println!("Total views: {}", display_count(totals.views));
        println!("Total downloads: {}", display_count(totals.downloads));
        println!(
            "Total bandwidth used: {}",
            display_file_size(totals.bandwidth)
        );

        let top = top_by_downloads(&files, TOP_DOWNLOADS_SHOWN);
        if !top.is_empty() {
            println!();
            println!("Top {} most downloaded files:", top.len());
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec![
                "#",
                "Name",
                "Size",
                "Downloads",
                "Views",
            ]);
            for (position, record) in top.iter().enumerate() {
                table.add_row(vec![
                    (position + 1).to_string(),
                    record.name.clone(),
                    display_file_size(record.size),
                    record.downloads.to_string(),
                    record.views.to_string(),
                ]);
            }
            println!("{table}");
        }
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Totals {
    size: u64,
    views: u64,
    downloads: u64,
    bandwidth: u64,
}

impl Totals {
    fn of(files: &[FileRecord]) -> Self {
        files.iter().fold(Totals::default(), |totals, file| Totals {
            size: totals.size + file.size,
            views: totals.views + file.views,
            downloads: totals.downloads + file.downloads,
            bandwidth: totals.bandwidth + file.bandwidth_used,
        })
    }
}

/// Top `n` records by download count, descending. The sort is stable so
/// records with equal download counts keep their listing order.
fn top_by_downloads(files: &[FileRecord], n: usize) -> Vec<&FileRecord> {
    let mut sorted: Vec<&FileRecord> = files.iter().collect();
    sorted.sort_by(|a, b| b.downloads.cmp(&a.downloads));
    sorted.truncate(n);
    sorted
}
