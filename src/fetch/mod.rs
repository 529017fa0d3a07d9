// src/fetch/mod.rs
use anyhow::{anyhow, Context, Result};
use arrow::record_batch::RecordBatch;
use chrono::Local;
use reqwest::Client;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{info, warn};
use url::Url;

use crate::process::{has_usable_data, load_registry};

pub mod cache;
pub mod portal;
pub mod sample;

pub const DEFAULT_URL: &str = "https://www.boletinconcursal.cl/boletin/procedimientos";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Where the loaded registry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataSource {
    /// Existing cache, no download attempted.
    Cached,
    Downloaded,
    /// Download failed; existing cache used instead.
    CachedFallback,
    /// Nothing usable anywhere; demo rows written.
    Sample,
}

impl DataSource {
    pub fn as_str(&self) -> &str {
        match self {
            DataSource::Cached => "cached",
            DataSource::Downloaded => "downloaded",
            DataSource::CachedFallback => "cached (download failed)",
            DataSource::Sample => "sample data",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub url: String,
    pub data_dir: PathBuf,
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            data_dir: PathBuf::from("data"),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Downloads the registry export and manages the local cache.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(config.timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn cache_path(&self) -> PathBuf {
        cache::cache_path(&self.config.data_dir)
    }

    /// Scrape the procedures page for the CSV export and store it as the cache.
    #[tracing::instrument(level = "info", skip(self), fields(url = %self.config.url))]
    pub async fn download(&self) -> Result<PathBuf> {
        let page_url = Url::parse(&self.config.url)
            .with_context(|| format!("parsing portal URL {}", self.config.url))?;

        let html = portal::fetch_page(&self.client, &page_url)
            .await
            .with_context(|| format!("GET {}", page_url))?;
        let links = portal::find_csv_links(&html, &page_url);
        if links.is_empty() {
            return Err(anyhow!(
                "no direct link behind #{} on {}",
                portal::CSV_BUTTON_ID,
                page_url
            ));
        }

        let dest = self.cache_path();
        for link in &links {
            info!(%link, "downloading CSV");
            match portal::download_csv(&self.client, link).await {
                Ok(bytes) => {
                    cache::write_atomic(&dest, &bytes)?;
                    info!(path = %dest.display(), bytes = bytes.len(), "CSV downloaded");
                    return Ok(dest);
                }
                Err(e) => warn!(%link, "download failed: {:#}", e),
            }
        }
        Err(anyhow!("every CSV link on {} failed", page_url))
    }

    /// Load the registry, downloading it first when forced or when no
    /// usable cache exists. Network trouble falls back to the cache, then
    /// to sample rows; only local filesystem errors are returned.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn update_data(&self, force: bool) -> Result<(RecordBatch, DataSource)> {
        let data_dir = &self.config.data_dir;
        fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        if let Err(e) = cache::adopt_latest_csv(data_dir) {
            warn!("could not adopt newer CSV: {:#}", e);
        }

        let path = self.cache_path();
        if !force && has_usable_data(&path) {
            info!("using existing CSV data");
            return Ok((load_registry(&path)?, DataSource::Cached));
        }

        info!("attempting to download fresh data");
        match self.download().await {
            Ok(path) => match load_registry(&path) {
                Ok(batch) if batch.num_rows() > 0 => return Ok((batch, DataSource::Downloaded)),
                Ok(_) => warn!("downloaded CSV has no rows"),
                Err(e) => warn!("downloaded CSV is unreadable: {:#}", e),
            },
            Err(e) => warn!("download failed: {:#}", e),
        }

        // Still here: the download is no good.
        self.fallback(&path)
    }

    fn fallback(&self, path: &Path) -> Result<(RecordBatch, DataSource)> {
        if has_usable_data(path) {
            info!("using existing CSV data as fallback");
            return Ok((load_registry(path)?, DataSource::CachedFallback));
        }
        warn!("no existing data found; creating sample data");
        sample::write_sample(path, Local::now().date_naive())?;
        Ok((load_registry(path)?, DataSource::Sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // nothing listens on the discard port, so connects fail fast
    const UNREACHABLE: &str = "http://127.0.0.1:9/boletin/procedimientos";

    fn fetcher(dir: &Path) -> Fetcher {
        Fetcher::new(FetchConfig {
            url: UNREACHABLE.to_string(),
            data_dir: dir.to_path_buf(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    const CACHED: &str = "Rol,Procedimiento Concursal,Nombre Publicación,Fecha Publicación\n\
                          C-1-2024,Liquidación Voluntaria,Resolución de Liquidación,15/01/2024\n";

    #[tokio::test]
    async fn test_existing_cache_is_used_without_network() -> Result<()> {
        let dir = tempdir()?;
        fs::write(cache::cache_path(dir.path()), CACHED)?;

        let (batch, source) = fetcher(dir.path()).update_data(false).await?;
        assert_eq!(source, DataSource::Cached);
        assert_eq!(batch.num_rows(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_forced_update_falls_back_to_cache() -> Result<()> {
        let dir = tempdir()?;
        fs::write(cache::cache_path(dir.path()), CACHED)?;

        let (batch, source) = fetcher(dir.path()).update_data(true).await?;
        assert_eq!(source, DataSource::CachedFallback);
        assert_eq!(batch.num_rows(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_cache_and_no_network_writes_sample() -> Result<()> {
        let dir = tempdir()?;
        let data_dir = dir.path().join("data");

        let f = fetcher(&data_dir);
        let (batch, source) = f.update_data(false).await?;
        assert_eq!(source, DataSource::Sample);
        assert!(batch.num_rows() > 0);
        assert!(f.cache_path().exists());

        // next run finds the sample as a regular cache
        let (_, source) = f.update_data(false).await?;
        assert_eq!(source, DataSource::Cached);
        Ok(())
    }
}
