mod completion;
mod download;
mod info;
mod reupload;
mod stats;
mod upload;

pub use completion::GenCompletionsCommand;
pub use download::DownloadCommand;
pub use info::InfoCommand;
pub use reupload::ReuploadCommand;
pub use stats::StatsCommand;
pub use upload::UploadCommand;

use crate::api_client::PixeldrainClient;
use clap::{Args, ValueHint};
use url::Url;

/// Connection settings shared by every subcommand.
#[derive(Args)]
pub struct ConnectionArgs {
    /// URL (including scheme) of the pixeldrain server to talk to.
    #[clap(
        short = 's',
        long = "server",
        env = "PIXELDRAIN_SERVER",
        default_value = crate::DEFAULT_SERVER_URL,
        value_hint = ValueHint::Url
    )]
    server: Url,

    /// API key used to authenticate with the API.
    ///
    /// Optional for anonymous downloads; required by every other command.
    #[clap(long = "api-key", env = "PIXELDRAIN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl ConnectionArgs {
    pub fn client(&self) -> PixeldrainClient {
        PixeldrainClient::new(self.server.clone(), self.api_key.clone())
    }
}
