use std::io::Write;

use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, info};

use crate::core::error::{RuntimeError, RuntimeResult};
use crate::core::http::build_http_client;

use super::target::RuntimeTarget;

pub const DEFAULT_DISTRIBUTION_HOST: &str =
    "https://github.com/qmlnet/qt-runtimes/releases/download/releases";
pub const DEFAULT_URL_TEMPLATE: &str = "{host}/{version}-{target}-runtime.tar.gz";

/// Builds the archive URL for a toolkit version and target.
pub trait UrlBuilder: Send + Sync {
    fn build_url(&self, toolkit_version: &str, target: RuntimeTarget) -> RuntimeResult<String>;
}

impl<F> UrlBuilder for F
where
    F: Fn(&str, RuntimeTarget) -> RuntimeResult<String> + Send + Sync,
{
    fn build_url(&self, toolkit_version: &str, target: RuntimeTarget) -> RuntimeResult<String> {
        self(toolkit_version, target)
    }
}

/// Expands `{host}`, `{version}` and `{target}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateUrlBuilder {
    template: String,
    host: String,
}

impl TemplateUrlBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            host: DEFAULT_DISTRIBUTION_HOST.to_string(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into().trim_end_matches('/').to_string();
        self
    }
}

impl Default for TemplateUrlBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_URL_TEMPLATE)
    }
}

impl UrlBuilder for TemplateUrlBuilder {
    fn build_url(&self, toolkit_version: &str, target: RuntimeTarget) -> RuntimeResult<String> {
        let target = target.require_supported()?;
        Ok(self
            .template
            .replace("{host}", &self.host)
            .replace("{version}", toolkit_version)
            .replace("{target}", target.as_str()))
    }
}

/// Streams the archive at `url` into `sink`, returning the byte count.
///
/// Callers run this through `detached::run_detached`, so implementations may
/// block and may start their own async runtime.
pub trait ArchiveSource: Send + Sync {
    fn fetch(&self, url: &str, sink: &mut (dyn Write + Send)) -> RuntimeResult<u64>;
}

/// Default source: HTTP(S) GET via reqwest, body streamed chunk by chunk.
#[derive(Debug, Clone)]
pub struct HttpArchiveSource {
    client: Client,
}

impl HttpArchiveSource {
    pub fn new() -> RuntimeResult<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn stream_to(&self, url: &str, sink: &mut (dyn Write + Send)) -> RuntimeResult<u64> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RuntimeError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        info!("Downloading {} ({:?} bytes)", url, total_bytes);

        let mut stream = response.bytes_stream();
        let mut downloaded = 0_u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk)
                .map_err(|source| RuntimeError::Transfer {
                    url: url.to_string(),
                    source,
                })?;
            downloaded = downloaded.saturating_add(chunk.len() as u64);
        }
        sink.flush().map_err(|source| RuntimeError::Transfer {
            url: url.to_string(),
            source,
        })?;

        debug!("Downloaded {} bytes from {}", downloaded, url);
        Ok(downloaded)
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn fetch(&self, url: &str, sink: &mut (dyn Write + Send)) -> RuntimeResult<u64> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| RuntimeError::Transfer {
                url: url.to_string(),
                source,
            })?;
        runtime.block_on(self.stream_to(url, sink))
    }
}
