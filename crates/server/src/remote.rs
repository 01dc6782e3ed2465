use std::path::{Path, PathBuf};

use common::is_supported_audio;
use reqwest::{Client, StatusCode, Url};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug)]
pub enum FetchOutcome {
    Downloaded(PathBuf),
    Skipped { reason: String },
    Failed(FetchError),
}

#[derive(Debug)]
pub enum FetchError {
    InvalidUrl(String),
    Http(reqwest::Error),
    Status(StatusCode),
    Io(std::io::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::InvalidUrl(value) => write!(f, "invalid url: {}", value),
            FetchError::Http(err) => write!(f, "http error: {}", err),
            FetchError::Status(status) => write!(f, "http {}", status),
            FetchError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(err)
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err)
    }
}

/// Reads the remote source list: one URL per line, blank lines ignored.
pub async fn read_url_list(path: &Path) -> std::io::Result<Vec<String>> {
    let contents = fs::read_to_string(path).await?;
    Ok(parse_url_list(&contents))
}

pub fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

/// Destination file name for a URL: the last path segment, lowercased.
pub fn file_name_for(url: &Url) -> Option<String> {
    let name = url.path_segments()?.last()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

/// Downloads every URL into `staging_dir`, one at a time. A failure on one
/// URL is recorded in its outcome and never stops the rest.
pub async fn fetch_all(client: &Client, urls: &[String], staging_dir: &Path) -> Vec<FetchOutcome> {
    let mut outcomes = Vec::with_capacity(urls.len());
    if let Err(err) = fs::create_dir_all(staging_dir).await {
        warn!("Failed to create staging dir {:?}: {}", staging_dir, err);
    }
    for url in urls {
        let outcome = fetch_one(client, url, staging_dir).await;
        match &outcome {
            FetchOutcome::Downloaded(path) => info!("Downloaded {} to {:?}", url, path),
            FetchOutcome::Skipped { reason } => info!("Skipping remote file {}: {}", url, reason),
            FetchOutcome::Failed(err) => warn!("Failed to fetch {}: {}", url, err),
        }
        outcomes.push(outcome);
    }
    outcomes
}

async fn fetch_one(client: &Client, raw: &str, staging_dir: &Path) -> FetchOutcome {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => return FetchOutcome::Failed(FetchError::InvalidUrl(raw.to_string())),
    };
    let file_name = match file_name_for(&url) {
        Some(name) => name,
        None => {
            return FetchOutcome::Skipped {
                reason: "no file name in url".to_string(),
            }
        }
    };
    if !is_supported_audio(Path::new(&file_name)) {
        return FetchOutcome::Skipped {
            reason: format!("unsupported file {}", file_name),
        };
    }

    let destination = staging_dir.join(&file_name);
    match download(client, url, &destination).await {
        Ok(_) => FetchOutcome::Downloaded(destination),
        Err(err) => {
            let _ = fs::remove_file(&destination).await;
            FetchOutcome::Failed(err)
        }
    }
}

async fn download(client: &Client, url: Url, destination: &Path) -> Result<u64, FetchError> {
    let mut response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    let mut file = File::create(destination).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
