use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use futures_util::TryStreamExt;
use reqwest::{Body, StatusCode, header, multipart};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{fs::File, io::AsyncWriteExt};
use tokio_util::io::ReaderStream;
use url::Url;

/// Connect/read ceiling applied through the client to every request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Nominal transfer chunk size; actual chunks follow the HTTP stream.
const CHUNK_SIZE: usize = 8192;

/// The info endpoint accepts at most this many ids per request.
pub const MAX_INFO_IDS: usize = 1000;

const RATE_LIMIT_CAPTCHA_MARKER: &str = "rate_limited_captcha_required";
const VIRUS_CAPTCHA_MARKER: &str = "virus_detected_captcha_required";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("PIXELDRAIN_API_KEY is required for this operation")]
    MissingApiKey,
    #[error("at most {MAX_INFO_IDS} file ids may be queried per request, got {0}")]
    TooManyIds(usize),
    #[error("file has no usable name: {}", .0.display())]
    InvalidPath(PathBuf),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("rate limited: {message}")]
    RateLimitCaptcha { id: String, message: String },
    #[error("virus detected: {message}")]
    VirusCaptcha { id: String, message: String },
    #[error("access forbidden: {0}")]
    Forbidden(String),
    #[error("upload rejected by server: {0}")]
    UploadRejected(String),
    #[error("server returned status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Metadata the service reports for a stored file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub bandwidth_used: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date_upload: Option<OffsetDateTime>,
}

/// Info responses mirror the request shape: one record for a single id,
/// an array when several ids were queried at once.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FileInfo {
    One(FileRecord),
    Many(Vec<FileRecord>),
}

impl FileInfo {
    pub fn into_records(self) -> Vec<FileRecord> {
        match self {
            FileInfo::One(record) => vec![record],
            FileInfo::Many(records) => records,
        }
    }
}

/// The service's JSON envelope, covering both the upload success body and
/// the error bodies attached to non-2xx responses. Every field is optional
/// on the wire.
#[derive(Debug, Default, Deserialize)]
struct ApiResponseBody {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    id: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct UserFilesResponse {
    files: Vec<FileRecord>,
}

pub struct PixeldrainClient {
    base_url: Url,
    api_key: Option<String>,
    inner_client: reqwest::Client,
}

impl PixeldrainClient {
    pub fn new(base_url: Url, api_key: Option<String>) -> Self {
        Self {
            base_url,
            api_key,
            inner_client: reqwest::Client::builder()
                .user_agent(concat!(
                    env!("CARGO_PKG_NAME"),
                    "/",
                    env!("CARGO_PKG_VERSION")
                ))
                .connect_timeout(REQUEST_TIMEOUT)
                .read_timeout(REQUEST_TIMEOUT)
                .build()
                .expect("api inner client should build"),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Shareable page URL for a stored file.
    pub fn share_url(&self, file_id: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(&format!("u/{file_id}"))?)
    }

    /// Basic-auth header with an empty username and the API key as password.
    fn auth_header(&self) -> Result<String, ApiError> {
        let api_key = self.api_key.as_deref().ok_or(ApiError::MissingApiKey)?;
        Ok(format!("Basic {}", BASE64.encode(format!(":{api_key}"))))
    }

    /// GET request builder that attaches the auth header only when an API
    /// key is configured. Anonymous requests are valid for downloads.
    fn get_with_optional_auth(&self, url: Url) -> Result<reqwest::RequestBuilder, ApiError> {
        let mut request = self.inner_client.get(url);
        if self.api_key.is_some() {
            request = request.header(header::AUTHORIZATION, self.auth_header()?);
        }
        Ok(request)
    }

    /// Upload the file at `path` as a streamed multipart request and return
    /// the id the service assigned to it.
    ///
    /// `progress` is invoked with the running total of bytes read from the
    /// file as the body streams out.
    pub async fn upload_file(
        &self,
        path: &Path,
        progress: impl Fn(u64) + Send + 'static,
    ) -> Result<String, ApiError> {
        let auth = self.auth_header()?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ApiError::InvalidPath(path.to_path_buf()))?
            .to_owned();

        let file = File::open(path).await?;
        let file_size = file.metadata().await?.len();

        let mut sent: u64 = 0;
        let reader = ReaderStream::with_capacity(file, CHUNK_SIZE).inspect_ok(move |chunk| {
            sent += chunk.len() as u64;
            progress(sent);
        });
        let part = multipart::Part::stream_with_length(Body::wrap_stream(reader), file_size)
            .file_name(file_name.clone())
            .mime_str(content_type_for(&file_name))?;
        let form = multipart::Form::new().part("file", part);

        let res = self
            .inner_client
            .post(self.base_url.join("api/file")?)
            .header(header::AUTHORIZATION, auth)
            .multipart(form)
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            let body: ApiResponseBody = res.json().await?;
            if body.success {
                return Ok(body.id);
            }
            return Err(ApiError::UploadRejected(fallback(
                body.message,
                "unknown error",
            )));
        }
        let body = res.text().await.unwrap_or_default();
        Err(classify_response(status, &body, None))
    }

    /// Stream the file's content to `dest_path` and return the number of
    /// bytes written. Empty keep-alive chunks are skipped and do not
    /// advance `progress`.
    pub async fn download_file(
        &self,
        file_id: &str,
        dest_path: &Path,
        force_download: bool,
        progress: impl Fn(u64),
    ) -> Result<u64, ApiError> {
        let mut url = self.base_url.join(&format!("api/file/{file_id}"))?;
        if force_download {
            url.set_query(Some("download"));
        }
        let mut res = self.get_with_optional_auth(url)?.send().await?;

        let status = res.status();
        if status != StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_response(status, &body, Some(file_id)));
        }

        let mut file = File::create(dest_path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = res.chunk().await? {
            if chunk.is_empty() {
                continue;
            }
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress(written);
        }
        file.flush().await?;
        Ok(written)
    }

    /// Fetch metadata for one or more files in a single request.
    ///
    /// More than [`MAX_INFO_IDS`] ids fail locally before any request is
    /// issued. The auth header is attached when a key is configured so the
    /// download path can reuse this anonymously.
    pub async fn file_info(&self, file_ids: &[String]) -> Result<FileInfo, ApiError> {
        if file_ids.len() > MAX_INFO_IDS {
            return Err(ApiError::TooManyIds(file_ids.len()));
        }
        let url = self
            .base_url
            .join(&format!("api/file/{}/info", file_ids.join(",")))?;
        let res = self.get_with_optional_auth(url)?.send().await?;

        let status = res.status();
        if status == StatusCode::OK {
            return Ok(res.json().await?);
        }
        let body = res.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            // The info endpoint reports its reason in `value`.
            let parsed: ApiResponseBody = serde_json::from_str(&body).unwrap_or_default();
            return Err(ApiError::NotFound(fallback(parsed.value, "unknown error")));
        }
        Err(classify_response(status, &body, None))
    }

    /// List every file stored in the authenticated account.
    pub async fn user_files(&self) -> Result<Vec<FileRecord>, ApiError> {
        let auth = self.auth_header()?;
        let res = self
            .inner_client
            .get(self.base_url.join("api/user/files")?)
            .header(header::AUTHORIZATION, auth)
            .send()
            .await?;

        let status = res.status();
        if status != StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_response(status, &body, None));
        }
        let body: UserFilesResponse = res.json().await?;
        Ok(body.files)
    }
}

/// Classify a non-2xx response into an [`ApiError`].
///
/// 403 bodies carry a machine-readable `value`; the captcha markers inside
/// it get their own variants (holding `file_id` for the remediation hint)
/// so callers can point the user at the captcha page instead of reporting
/// a generic forbidden error.
fn classify_response(status: StatusCode, body: &str, file_id: Option<&str>) -> ApiError {
    let parsed: ApiResponseBody = serde_json::from_str(body).unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => {
            ApiError::NotFound(fallback(parsed.message, "the file could not be found"))
        }
        StatusCode::FORBIDDEN => {
            let id = file_id.unwrap_or_default().to_owned();
            let message = fallback(parsed.message, "access forbidden");
            if parsed.value.contains(RATE_LIMIT_CAPTCHA_MARKER) {
                ApiError::RateLimitCaptcha { id, message }
            } else if parsed.value.contains(VIRUS_CAPTCHA_MARKER) {
                ApiError::VirusCaptcha { id, message }
            } else {
                ApiError::Forbidden(message)
            }
        }
        _ => ApiError::UnexpectedStatus {
            status,
            body: body.to_owned(),
        },
    }
}

fn fallback(value: String, fixed: &str) -> String {
    if value.is_empty() {
        fixed.to_owned()
    } else {
        value
    }
}

/// Content type derived from the file extension, matching how the service
/// expects uploads to be tagged. Unknown extensions fall back to a generic
/// binary stream.
fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase());
    match extension.as_deref() {
        Some("txt" | "md" | "log") => "text/plain",
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("csv") => "text/csv",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("tar") => "application/x-tar",
        Some("7z") => "application/x-7z-compressed",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{io::AsyncReadExt, net::TcpListener};

    fn client(api_key: Option<&str>) -> PixeldrainClient {
        // Discard port; tests that reach it would fail rather than hang.
        PixeldrainClient::new(
            Url::parse("http://127.0.0.1:9/").unwrap(),
            api_key.map(str::to_owned),
        )
    }

    #[test]
    fn auth_header_is_basic_with_empty_username() {
        // base64(":secret")
        assert_eq!(
            client(Some("secret")).auth_header().unwrap(),
            "Basic OnNlY3JldA=="
        );
    }

    #[test]
    fn share_url_is_built_from_the_file_id() {
        assert_eq!(
            client(None).share_url("abc123").unwrap().as_str(),
            "http://127.0.0.1:9/u/abc123"
        );
    }

    #[tokio::test]
    async fn info_rejects_more_than_the_id_cap_without_a_request() {
        let ids: Vec<String> = (0..MAX_INFO_IDS + 1).map(|i| format!("id{i}")).collect();
        match client(Some("key")).file_info(&ids).await {
            Err(ApiError::TooManyIds(count)) => assert_eq!(count, MAX_INFO_IDS + 1),
            other => panic!("expected TooManyIds, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_requires_an_api_key_before_touching_the_file() {
        let result = client(None)
            .upload_file(Path::new("/does/not/exist"), |_| {})
            .await;
        assert!(matches!(result, Err(ApiError::MissingApiKey)));
    }

    #[tokio::test]
    async fn user_files_requires_an_api_key() {
        let result = client(None).user_files().await;
        assert!(matches!(result, Err(ApiError::MissingApiKey)));
    }

    #[test]
    fn forbidden_with_rate_limit_marker_becomes_a_captcha_error() {
        let body = r#"{"success":false,"value":"file_rate_limited_captcha_required","message":"too many requests"}"#;
        match classify_response(StatusCode::FORBIDDEN, body, Some("abc123")) {
            ApiError::RateLimitCaptcha { id, message } => {
                assert_eq!(id, "abc123");
                assert_eq!(message, "too many requests");
            }
            other => panic!("expected RateLimitCaptcha, got {other:?}"),
        }
    }

    #[test]
    fn forbidden_with_virus_marker_becomes_a_captcha_error() {
        let body =
            r#"{"success":false,"value":"virus_detected_captcha_required","message":"malware"}"#;
        assert!(matches!(
            classify_response(StatusCode::FORBIDDEN, body, Some("abc123")),
            ApiError::VirusCaptcha { .. }
        ));
    }

    #[test]
    fn forbidden_without_marker_is_generic() {
        let body = r#"{"success":false,"value":"no_permission","message":"not yours"}"#;
        match classify_response(StatusCode::FORBIDDEN, body, None) {
            ApiError::Forbidden(message) => assert_eq!(message, "not yours"),
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[test]
    fn non_json_bodies_fall_back_to_fixed_messages() {
        match classify_response(StatusCode::NOT_FOUND, "<html>gone</html>", None) {
            ApiError::NotFound(message) => assert_eq!(message, "the file could not be found"),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(matches!(
            classify_response(StatusCode::FORBIDDEN, "", None),
            ApiError::Forbidden(_)
        ));
    }

    #[test]
    fn unexpected_statuses_keep_the_raw_body() {
        match classify_response(StatusCode::INTERNAL_SERVER_ERROR, "boom", None) {
            ApiError::UnexpectedStatus { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "boom");
            }
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
    }

    #[test]
    fn file_record_deserializes_service_metadata() {
        let record: FileRecord = serde_json::from_str(
            r#"{
                "id": "abc123",
                "name": "demo.png",
                "size": 5694,
                "views": 12,
                "downloads": 3,
                "bandwidth_used": 17082,
                "date_upload": "2024-02-04T18:34:13.466Z"
            }"#,
        )
        .unwrap();
        assert_eq!(record.id, "abc123");
        assert_eq!(record.size, 5694);
        assert_eq!(record.date_upload.unwrap().year(), 2024);
    }

    #[test]
    fn info_response_mirrors_the_request_shape() {
        let single: FileInfo =
            serde_json::from_str(r#"{"id":"a","name":"one.txt","size":1}"#).unwrap();
        assert!(matches!(single, FileInfo::One(_)));

        let many: FileInfo = serde_json::from_str(
            r#"[{"id":"a","name":"one.txt","size":1},{"id":"b","name":"two.txt","size":2}]"#,
        )
        .unwrap();
        assert_eq!(many.into_records().len(), 2);
    }

    /// Serve one canned HTTP response on an ephemeral local listener.
    async fn serve_once(listener: TcpListener, head: String, body: Vec<u8>) {
        let (mut socket, _) = listener.accept().await.unwrap();
        // Drain the request head before responding.
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request.windows(4).any(|window| window == b"\r\n\r\n") {
                break;
            }
        }
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn downloaded_length_matches_the_reported_content_length() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = vec![0xab_u8; 5000];
        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        );
        let server = tokio::spawn(serve_once(listener, head, body));

        let dir = tempfile::tempdir().unwrap();
        let dest_path = dir.path().join("blob.bin");
        let client = PixeldrainClient::new(Url::parse(&format!("http://{addr}/")).unwrap(), None);
        let written = client
            .download_file("abc123", &dest_path, false, |_| {})
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(written, 5000);
        assert_eq!(std::fs::metadata(&dest_path).unwrap().len(), 5000);
    }

    #[tokio::test]
    async fn download_of_a_missing_file_reports_not_found() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = br#"{"success":false,"value":"file_not_found","message":"it is gone"}"#.to_vec();
        let head = format!(
            "HTTP/1.1 404 Not Found\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        );
        let server = tokio::spawn(serve_once(listener, head, body));

        let dir = tempfile::tempdir().unwrap();
        let dest_path = dir.path().join("blob.bin");
        let client = PixeldrainClient::new(Url::parse(&format!("http://{addr}/")).unwrap(), None);
        let result = client.download_file("abc123", &dest_path, false, |_| {}).await;
        server.await.unwrap();

        match result {
            Err(ApiError::NotFound(message)) => assert_eq!(message, "it is gone"),
            other => panic!("expected NotFound, got {other:?}"),
        }
        // Nothing gets written on an error status.
        assert!(!dest_path.exists());
    }

    #[test]
    fn content_type_falls_back_to_octet_stream() {
        assert_eq!(content_type_for("photo.JPG"), "image/jpeg");
        assert_eq!(content_type_for("notes.txt"), "text/plain");
        assert_eq!(content_type_for("mystery.bin"), "application/octet-stream");
        assert_eq!(content_type_for("no_extension"), "application/octet-stream");
    }
}
