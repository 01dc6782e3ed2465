mod config;
mod handler;
mod listener;
mod remote;
mod scan;

use std::sync::Arc;

use catalog::IndexOptions;
use config::{config_path_from_env, load_or_create_config, resolve_music_roots, resolve_path};
use listener::{serve, ServeOptions};
use reqwest::Client;
use scan::{build_catalog, ScanSources};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let roots = resolve_music_roots(&config_path, &config, &args);
    for root in &roots {
        info!("Music folder: {:?}", root);
    }

    let client = Client::builder()
        .user_agent("music-catalog-server/0.1")
        .connect_timeout(config.connect_timeout())
        .read_timeout(config.read_timeout())
        .build()?;

    let sources = ScanSources {
        roots,
        remote_list: resolve_path(&config_path, &config.remote_list_path),
        staging_dir: resolve_path(&config_path, &config.staging_dir),
        options: IndexOptions {
            include_cover_art: config.include_cover_art,
        },
    };
    let catalog = build_catalog(sources, &client).await?;
    info!("Catalog ready: {} songs", catalog.len());

    let catalog_path = resolve_path(&config_path, &config.catalog_path);
    match catalog.write_json(&catalog_path) {
        Ok(()) => info!("Catalog saved to {:?}", catalog_path),
        Err(err) => warn!("Failed to save catalog to {:?}: {}", catalog_path, err),
    }

    let bind_addr = config.listen_addr();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(
        "Listening on {} (up to {} concurrent clients)",
        bind_addr,
        config.connection_limit()
    );

    let options = ServeOptions {
        max_connections: config.connection_limit(),
        reject_when_busy: config.reject_when_busy,
    };
    tokio::select! {
        _ = serve(listener, Arc::new(catalog), options) => {},
        _ = shutdown_signal() => {},
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                std::future::pending::<()>().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    }

    info!("Shutdown signal received.");
}
