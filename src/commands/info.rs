use crate::{
    ExecutableCommand,
    api_client::{ApiError, FileRecord},
    commands::ConnectionArgs,
    file_id::parse_file_id,
    format::{display_count, display_file_size},
};
use anyhow::Result;
use clap::{Parser, ValueHint};
use time::format_description;

/// Show metadata for one or more stored files.
#[derive(Parser)]
pub struct InfoCommand {
    /// File ids or pixeldrain URLs to look up (queried in one request).
    #[clap(required = true, num_args = 1.., value_hint = ValueHint::Other)]
    files: Vec<String>,

    #[clap(flatten)]
    connection: ConnectionArgs,
}

impl ExecutableCommand for InfoCommand {
    async fn run(self) -> Result<()> {
        let client = self.connection.client();
        if !client.has_api_key() {
            return Err(ApiError::MissingApiKey.into());
        }

        let file_ids: Vec<String> = self.files.iter().map(|file| parse_file_id(file)).collect();
        let records = client.file_info(&file_ids).await?.into_records();
        for (position, record) in records.iter().enumerate() {
            if position > 0 {
                println!();
            }
            print_record(record)?;
        }
        Ok(())
    }
}

fn print_record(record: &FileRecord) -> Result<()> {
    println!("File name: {}", record.name);
    println!("File size: {}", display_file_size(record.size));
    println!("Views: {}", display_count(record.views));
    println!("Downloads: {}", display_count(record.downloads));
    let upload_date = match &record.date_upload {
        Some(date) => date.format(&format_description::parse(
            "[year]-[month]-[day] [hour]:[minute]:[second] UTC",
        )?)?,
        None => "unknown".to_owned(),
    };
    println!("Upload date: {upload_date}");
    Ok(())
}
