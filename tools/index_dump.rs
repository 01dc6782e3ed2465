use std::env;
use std::path::PathBuf;

use catalog::{Catalog, IndexOptions};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut roots = Vec::new();
    let mut out = PathBuf::from("indexed_music.json");
    let mut options = IndexOptions::default();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => {
                out = args.next().map(PathBuf::from).ok_or("--out needs a path")?;
            }
            "--covers" => options.include_cover_art = true,
            _ => roots.push(PathBuf::from(arg)),
        }
    }
    if roots.is_empty() {
        match env::var("MUSIC_ROOT") {
            Ok(root) if !root.trim().is_empty() => roots.push(PathBuf::from(root)),
            _ => return Err("usage: index_dump [--out PATH] [--covers] ROOT...".into()),
        }
    }

    let mut catalog = Catalog::new(options);
    let stats = catalog.index_roots(&roots);
    catalog.write_json(&out)?;

    println!(
        "Indexed {} songs ({} unreadable entries skipped) into {}",
        stats.songs,
        stats.skipped_dirs,
        out.display()
    );

    Ok(())
}
