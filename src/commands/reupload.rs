use crate::{
    ExecutableCommand,
    api_client::{ApiError, PixeldrainClient},
    commands::{ConnectionArgs, download::download_to_dir, upload::upload_path},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

/// Download a file and upload it again as a new file.
#[derive(Parser)]
pub struct ReuploadCommand {
    /// File id or pixeldrain URL of the file to reupload.
    #[clap(value_hint = ValueHint::Other)]
    file: String,

    /// Directory holding the intermediate download.
    #[clap(
        short = 'd',
        long = "dir",
        default_value_os_t = std::env::temp_dir(),
        value_hint = ValueHint::DirPath
    )]
    directory: PathBuf,

    /// Force the download disposition for the download step.
    #[clap(short = 'f', long = "force")]
    force: bool,

    #[clap(flatten)]
    connection: ConnectionArgs,
}

impl ExecutableCommand for ReuploadCommand {
    async fn run(self) -> Result<()> {
        let client = self.connection.client();
        if !client.has_api_key() {
            return Err(ApiError::MissingApiKey.into());
        }
        let share_url = reupload(&client, &self.file, &self.directory, self.force).await?;
        println!("File re-uploaded successfully: {share_url}");
        Ok(())
    }
}

/// Download `file` into `directory`, then upload the saved copy and return
/// its new shareable URL. A failed download aborts before the upload step
/// ever runs.
async fn reupload(
    client: &PixeldrainClient,
    file: &str,
    directory: &Path,
    force: bool,
) -> Result<Url> {
    let saved_path = download_to_dir(client, file, directory, force)
        .await
        .context("download failed, cannot reupload")?;

    let share_url = upload_path(client, &saved_path).await?;
    // The intermediate download is left in place on purpose.
    info!("intermediate file kept at {}", saved_path.display());
    Ok(share_url)
}
