use std::env;
use std::path::{Path, PathBuf};

use common::playback::PlaybackStrategy;
use common::protocol::{error_sentinel, Command, TransferKind};
use common::{Song, SongId, DEFAULT_PORT};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: music_client HOST[:PORT] list | stream ID | download ID DEST";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let addr = match args.first() {
        Some(host) if host.contains(':') => host.clone(),
        Some(host) => format!("{}:{}", host, DEFAULT_PORT),
        None => return Err(USAGE.into()),
    };

    match args.get(1).map(String::as_str) {
        Some("list") => {
            let songs = fetch_list(&addr).await?;
            for song in &songs {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}s",
                    song.id, song.title, song.artist, song.album, song.genre, song.track_length
                );
            }
            println!("{} songs", songs.len());
        }
        Some("stream") => {
            let id = parse_id(args.get(2))?;
            let song = find_song(&addr, id).await?;
            let strategy = PlaybackStrategy::for_path(Path::new(&song.file_path));
            let mut stream = open(&addr, TransferKind::Stream, id).await?;
            let mut payload = Vec::new();
            stream.read_to_end(&mut payload).await?;
            if let Some(sentinel) = error_sentinel(&payload) {
                return Err(format!("server refused song {}: {}", id, sentinel.trim_end()).into());
            }
            println!(
                "Received {} bytes of '{}' (playback: {})",
                payload.len(),
                song.title,
                strategy.label()
            );
        }
        Some("download") => {
            let id = parse_id(args.get(2))?;
            let dest = args.get(3).map(PathBuf::from).ok_or(USAGE)?;
            let mut stream = open(&addr, TransferKind::Download, id).await?;
            let mut file = File::create(&dest).await?;
            let written = tokio::io::copy(&mut stream, &mut file).await?;
            file.flush().await?;
            drop(file);
            if written < 32 {
                let head = fs::read(&dest).await?;
                if let Some(sentinel) = error_sentinel(&head) {
                    fs::remove_file(&dest).await?;
                    return Err(format!("server refused song {}: {}", id, sentinel.trim_end()).into());
                }
            }
            println!("Saved {} bytes to {}", written, dest.display());
        }
        _ => return Err(USAGE.into()),
    }

    Ok(())
}

fn parse_id(value: Option<&String>) -> Result<SongId, Box<dyn std::error::Error>> {
    let value = value.ok_or(USAGE)?;
    Ok(value.parse::<SongId>()?)
}

async fn send(addr: &str, command: &Command) -> std::io::Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    info!("Sending {} to {}", command, addr);
    stream.write_all(command.to_line().as_bytes()).await?;
    Ok(stream)
}

async fn open(addr: &str, kind: TransferKind, id: SongId) -> std::io::Result<TcpStream> {
    send(addr, &Command::Transfer { kind, id: Some(id) }).await
}

async fn fetch_list(addr: &str) -> Result<Vec<Song>, Box<dyn std::error::Error>> {
    let stream = send(addr, &Command::List).await?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.trim().is_empty() {
        return Err("server sent an empty catalog response".into());
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

async fn find_song(addr: &str, id: SongId) -> Result<Song, Box<dyn std::error::Error>> {
    fetch_list(addr)
        .await?
        .into_iter()
        .find(|song| song.id == id)
        .ok_or_else(|| format!("song {} is not in the catalog", id).into())
}
