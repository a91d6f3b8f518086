use crate::{
    ExecutableCommand, PROGRESS_BAR_TICKRATE, api_client::PixeldrainClient,
    commands::ConnectionArgs, format::display_file_size,
};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueHint};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;
use url::Url;

/// Upload a file and print its shareable link.
#[derive(Parser)]
pub struct UploadCommand {
    /// Path of the file to upload.
    #[clap(value_hint = ValueHint::FilePath)]
    path: PathBuf,

    #[clap(flatten)]
    connection: ConnectionArgs,
}

impl ExecutableCommand for UploadCommand {
    async fn run(self) -> Result<()> {
        let client = self.connection.client();
        let share_url = upload_path(&client, &self.path).await?;
        println!("File uploaded successfully: {share_url}");
        Ok(())
    }
}

/// Upload the file at `path` and return the shareable URL for it.
///
/// Also the upload half of `reupload`.
pub(super) async fn upload_path(client: &PixeldrainClient, path: &Path) -> Result<Url> {
    if !path.is_file() {
        bail!("file not found: {}", path.display());
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .context("failed to read file name")?;
    let file_size = fs::metadata(path)?.len();
    info!(
        "uploading {} ({})",
        path.display(),
        display_file_size(file_size)
    );

    let prog_bar = ProgressBar::new(file_size).with_message(format!("Uploading {file_name}"));
    prog_bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {bytes}/{total_bytes} @ {bytes_per_sec}")
            .unwrap()
            .progress_chars("##-"),
    );
    prog_bar.enable_steady_tick(PROGRESS_BAR_TICKRATE);

    let observer_bar = prog_bar.clone();
    let file_id = client
        .upload_file(path, move |sent| observer_bar.set_position(sent))
        .await?;
    prog_bar.finish_and_clear();

    info!("upload completed: {file_name}");
    Ok(client.share_url(&file_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PixeldrainClient {
        PixeldrainClient::new(
            Url::parse("http://127.0.0.1:9/").unwrap(),
            Some("key".to_owned()),
        )
    }

    #[tokio::test]
    async fn missing_files_fail_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        let err = upload_path(&client(), &missing).await.unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }

    #[tokio::test]
    async fn directories_are_not_uploadable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(upload_path(&client(), dir.path()).await.is_err());
    }
}
