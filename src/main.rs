mod api_client;
mod commands;
mod file_id;
mod format;

use anyhow::Result;
use clap::Parser;
use commands::{
    DownloadCommand, GenCompletionsCommand, InfoCommand, ReuploadCommand, StatsCommand,
    UploadCommand,
};
use dotenvy::dotenv;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_SERVER_URL: &str = "https://pixeldrain.com/";
pub const PROGRESS_BAR_TICKRATE: Duration = Duration::from_millis(100);

pub trait ExecutableCommand: Parser {
    /// Consume `self` and run the command.
    async fn run(self) -> Result<()>;
}

#[derive(Parser)]
enum Command {
    Upload(UploadCommand),
    Download(DownloadCommand),
    Info(InfoCommand),
    Stats(StatsCommand),
    Reupload(ReuploadCommand),
    GenCompletions(GenCompletionsCommand),
}

#[derive(Parser)]
#[command(author, version, about, long_about)]
pub struct RootCommand {
    #[clap(subcommand)]
    command: Command,
}

impl ExecutableCommand for RootCommand {
    async fn run(self) -> Result<()> {
        match self.command {
            Command::Upload(cmd) => cmd.run().await,
            Command::Download(cmd) => cmd.run().await,
            Command::Info(cmd) => cmd.run().await,
            Command::Stats(cmd) => cmd.run().await,
            Command::Reupload(cmd) => cmd.run().await,
            Command::GenCompletions(cmd) => cmd.run().await,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info")))
        .init();

    if let Err(err) = RootCommand::parse().run().await {
        error!("{err:#}");
        std::process::exit(1);
    }
}
