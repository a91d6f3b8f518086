use crate::{
    ExecutableCommand, PROGRESS_BAR_TICKRATE,
    api_client::{ApiError, PixeldrainClient},
    commands::ConnectionArgs,
    file_id::parse_file_id,
    format::display_file_size,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info, warn};

/// Download a file into a local directory.
#[derive(Parser)]
pub struct DownloadCommand {
    /// File id or pixeldrain URL of the file to download.
    #[clap(value_hint = ValueHint::Other)]
    file: String,

    /// Directory the downloaded file is written into, created if missing.
    #[clap(
        short = 'd',
        long = "dir",
        default_value_os_t = std::env::temp_dir(),
        value_hint = ValueHint::DirPath
    )]
    directory: PathBuf,

    /// Ask the server for a forced-download disposition instead of an
    /// inline-viewable one.
    #[clap(short = 'f', long = "force")]
    force: bool,

    #[clap(flatten)]
    connection: ConnectionArgs,
}

impl ExecutableCommand for DownloadCommand {
    async fn run(self) -> Result<()> {
        let client = self.connection.client();
        let saved_path = download_to_dir(&client, &self.file, &self.directory, self.force).await?;
        let file_size = fs::metadata(&saved_path)?.len();
        println!("File downloaded successfully: {}", saved_path.display());
        println!("File size: {}", display_file_size(file_size));
        Ok(())
    }
}

/// Download `file` (id or URL) into `directory` and return the saved path.
///
/// The filename comes from the remote metadata, so the download fails when
/// the metadata fetch does. Also the download half of `reupload`.
pub(super) async fn download_to_dir(
    client: &PixeldrainClient,
    file: &str,
    directory: &Path,
    force: bool,
) -> Result<PathBuf> {
    let file_id = parse_file_id(file);
    if !client.has_api_key() {
        warn!("no API key configured - downloading as an anonymous user");
    }

    info!("fetching file info for {file_id}");
    let record = client
        .file_info(std::slice::from_ref(&file_id))
        .await
        .context("could not retrieve file information")?
        .into_records()
        .into_iter()
        .next()
        .context("info response contained no records")?;

    let file_name = sanitize_filename(&record.name, &file_id);
    fs::create_dir_all(directory)?;
    let dest_path = directory.join(&file_name);

    let prog_bar = ProgressBar::new(record.size).with_message(format!("Downloading {file_name}"));
    prog_bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {bytes}/{total_bytes} @ {bytes_per_sec}")
            .unwrap()
            .progress_chars("##-"),
    );
    prog_bar.enable_steady_tick(PROGRESS_BAR_TICKRATE);

    let result = client
        .download_file(&file_id, &dest_path, force, |written| {
            prog_bar.set_position(written)
        })
        .await;
    prog_bar.finish_and_clear();

    match result {
        Ok(written) => {
            info!(
                "download completed: {} ({})",
                dest_path.display(),
                display_file_size(written)
            );
            Ok(dest_path)
        }
        Err(err) => {
            // Captcha-gated responses get a remediation hint instead of
            // being reported as a plain forbidden error.
            if let ApiError::RateLimitCaptcha { id, message }
            | ApiError::VirusCaptcha { id, message } = &err
            {
                error!("{message}");
                warn!(
                    "please visit {} to complete the captcha",
                    client.share_url(id)?
                );
            }
            Err(err.into())
        }
    }
}

/// Remote filenames are untrusted input; keep only the final path
/// component and fall back to an id-derived name when nothing safe
/// remains.
fn sanitize_filename(name: &str, file_id: &str) -> String {
    let candidate = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .replace('\0', "");
    if candidate.is_empty() || candidate == "." || candidate == ".." {
        return format!("{file_id}.bin");
    }
    candidate
}
