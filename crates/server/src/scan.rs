use std::path::{Path, PathBuf};

use catalog::{Catalog, IndexOptions};
use reqwest::Client;
use tokio::task::JoinError;
use tracing::{info, warn};

use crate::remote::{fetch_all, read_url_list, FetchOutcome};

/// Where the indexing phase looks for songs.
#[derive(Clone, Debug)]
pub struct ScanSources {
    pub roots: Vec<PathBuf>,
    pub remote_list: PathBuf,
    pub staging_dir: PathBuf,
    pub options: IndexOptions,
}

/// Builds the catalog: local roots first, then remote downloads. Runs to
/// completion before anything is served.
pub async fn build_catalog(sources: ScanSources, client: &Client) -> Result<Catalog, JoinError> {
    let roots = sources.roots.clone();
    let options = sources.options;
    let (catalog, stats) = tokio::task::spawn_blocking(move || {
        let mut catalog = Catalog::new(options);
        let stats = catalog.index_roots(&roots);
        (catalog, stats)
    })
    .await?;
    if sources.roots.is_empty() {
        info!("No local music folders configured.");
    } else {
        info!(
            "Local indexing finished: {} songs from {} folders ({} unreadable entries skipped)",
            stats.songs,
            sources.roots.len(),
            stats.skipped_dirs
        );
    }

    let downloads = fetch_remote(&sources.remote_list, &sources.staging_dir, client).await;
    if downloads.is_empty() {
        return Ok(catalog);
    }

    let catalog = tokio::task::spawn_blocking(move || {
        let mut catalog = catalog;
        for path in &downloads {
            let id = catalog.index_file(path);
            info!("Indexed remote file ({}): {:?}", id, path);
        }
        catalog
    })
    .await?;
    Ok(catalog)
}

/// Downloads everything in the remote list and returns the staged files,
/// each at most once even if several URLs map to the same name.
async fn fetch_remote(list_path: &Path, staging_dir: &Path, client: &Client) -> Vec<PathBuf> {
    if !list_path.exists() {
        info!("{:?} not found; skipping remote sources.", list_path);
        return Vec::new();
    }
    let urls = match read_url_list(list_path).await {
        Ok(urls) => urls,
        Err(err) => {
            warn!("Failed to read remote list {:?}: {}", list_path, err);
            return Vec::new();
        }
    };
    info!("Processing {} remote urls from {:?}", urls.len(), list_path);

    let mut staged: Vec<PathBuf> = Vec::new();
    let mut failed = 0usize;
    let mut skipped = 0usize;
    for outcome in fetch_all(client, &urls, staging_dir).await {
        match outcome {
            FetchOutcome::Downloaded(path) => {
                if !staged.contains(&path) {
                    staged.push(path);
                }
            }
            FetchOutcome::Skipped { .. } => skipped += 1,
            FetchOutcome::Failed(_) => failed += 1,
        }
    }
    info!(
        "Remote fetch finished: {} staged, {} skipped, {} failed",
        staged.len(),
        skipped,
        failed
    );
    staged
}
