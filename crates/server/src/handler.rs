use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use catalog::Catalog;
use common::protocol::{Command, TransferKind, ERR_NOT_FOUND, ERR_UNAVAILABLE, MAX_COMMAND_LINE};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// Serves exactly one command on `stream`, then closes it.
pub async fn handle_connection<S>(stream: S, catalog: Arc<Catalog>, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    if let Err(err) = respond(reader, &mut writer, &catalog, peer).await {
        warn!("Error handling client {}: {}", peer, err);
    }
    if let Err(err) = writer.shutdown().await {
        debug!("Failed to close connection to {}: {}", peer, err);
    }
}

async fn respond<R, W>(reader: R, writer: &mut W, catalog: &Catalog, peer: SocketAddr) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let line = match read_command_line(reader).await? {
        Some(line) => line,
        None => {
            debug!("Client {} sent no command", peer);
            return Ok(());
        }
    };
    info!("Received request from {}: {}", peer, line.trim_end());

    match Command::parse(&line) {
        None => {
            debug!("Ignoring unknown request from {}", peer);
            Ok(())
        }
        Some(Command::List) => {
            let json = catalog
                .to_json_line()
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            info!("Sent {} songs to {}", catalog.len(), peer);
            Ok(())
        }
        Some(Command::Transfer { kind, id }) => {
            let song = match id.and_then(|id| catalog.get(id)) {
                Some(song) => song,
                None => {
                    info!("{} {:?} from {}: not found", kind.keyword(), id, peer);
                    writer.write_all(ERR_NOT_FOUND.as_bytes()).await?;
                    return Ok(());
                }
            };
            let mut file = match File::open(&song.file_path).await {
                Ok(file) => file,
                Err(err) => {
                    warn!("Cannot open {:?} for song {}: {}", song.file_path, song.id, err);
                    writer.write_all(ERR_UNAVAILABLE.as_bytes()).await?;
                    return Ok(());
                }
            };
            match kind {
                TransferKind::Stream => info!("Streaming song {} to {}: {}", song.id, peer, song.title),
                TransferKind::Download => info!("Sending file for song {} to {}: {}", song.id, peer, song.title),
            }
            let sent = tokio::io::copy(&mut file, writer).await?;
            writer.flush().await?;
            info!("Finished sending song {} to {} ({} bytes)", song.id, peer, sent);
            Ok(())
        }
    }
}

/// Reads one `\n`-terminated line (or everything up to EOF). Returns `None`
/// when the peer sent nothing or the line exceeds `MAX_COMMAND_LINE`.
async fn read_command_line<R>(reader: R) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut limited = BufReader::new(reader).take(MAX_COMMAND_LINE as u64 + 1);
    let mut buf = Vec::new();
    limited.read_until(b'\n', &mut buf).await?;
    if buf.is_empty() {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') && buf.len() > MAX_COMMAND_LINE {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::{handle_connection, read_command_line};
    use catalog::Catalog;
    use common::protocol::{ERR_NOT_FOUND, ERR_UNAVAILABLE, MAX_COMMAND_LINE};
    use common::Song;
    use std::fs;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    async fn exchange(catalog: Arc<Catalog>, request: &[u8]) -> Vec<u8> {
        let (mut client, server) = duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(server, catalog, peer()));
        client.write_all(request).await.unwrap();
        client.shutdown().await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        task.await.unwrap();
        response
    }

    /// Indexes a scratch directory holding `names`; each file contains its
    /// own name.
    fn catalog_with(names: &[&str]) -> (tempfile::TempDir, Arc<Catalog>) {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }
        let mut catalog = Catalog::default();
        catalog.index_dir(dir.path());
        (dir, Arc::new(catalog))
    }

    fn catalog_with_payload(name: &str, payload: &[u8]) -> (tempfile::TempDir, Arc<Catalog>) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(name), payload).unwrap();
        let mut catalog = Catalog::default();
        catalog.index_dir(dir.path());
        (dir, Arc::new(catalog))
    }

    #[tokio::test]
    async fn reads_line_and_strips_crlf() {
        let line = read_command_line(&b"STREAM 4\r\nextra"[..]).await.unwrap();
        assert_eq!(line.as_deref(), Some("STREAM 4"));
        let eof = read_command_line(&b"LIST"[..]).await.unwrap();
        assert_eq!(eof.as_deref(), Some("LIST"));
        assert_eq!(read_command_line(&b""[..]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_oversized_line() {
        let long = vec![b'A'; MAX_COMMAND_LINE + 10];
        assert_eq!(read_command_line(&long[..]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_returns_every_song() {
        let (_dir, catalog) = catalog_with(&["a.mp3", "b.ogg", "c.txt"]);
        let response = exchange(Arc::clone(&catalog), b"LIST\n").await;
        assert_eq!(response.last(), Some(&b'\n'));
        assert_eq!(response.iter().filter(|b| **b == b'\n').count(), 1);
        let songs: Vec<Song> = serde_json::from_slice(&response).unwrap();
        let expected: Vec<Song> = catalog.songs().cloned().collect();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs, expected);
    }

    #[tokio::test]
    async fn stream_and_download_send_file_bytes() {
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let (_dir, catalog) = catalog_with_payload("big.flac", &payload);

        let streamed = exchange(Arc::clone(&catalog), b"STREAM 1\n").await;
        assert_eq!(streamed, payload);
        let downloaded = exchange(Arc::clone(&catalog), b"download 1\r\n").await;
        assert_eq!(downloaded, payload);
    }

    #[tokio::test]
    async fn unknown_ids_get_not_found() {
        let (_dir, catalog) = catalog_with(&["a.mp3"]);
        let requests: [&[u8]; 4] = [b"STREAM 99\n", b"DOWNLOAD\n", b"STREAM x\n", b"STREAM 0\n"];
        for request in requests {
            let response = exchange(Arc::clone(&catalog), request).await;
            assert_eq!(response, ERR_NOT_FOUND.as_bytes());
        }
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let (dir, catalog) = catalog_with(&["gone.wav"]);
        fs::remove_file(dir.path().join("gone.wav")).unwrap();
        let response = exchange(catalog, b"STREAM 1\n").await;
        assert_eq!(response, ERR_UNAVAILABLE.as_bytes());
    }

    #[tokio::test]
    async fn unknown_or_empty_requests_close_silently() {
        let (_dir, catalog) = catalog_with(&["a.mp3"]);
        assert!(exchange(Arc::clone(&catalog), b"PLAY 1\n").await.is_empty());
        assert!(exchange(Arc::clone(&catalog), b"\n").await.is_empty());
        assert!(exchange(Arc::clone(&catalog), b"").await.is_empty());
    }

    #[tokio::test]
    async fn client_hangup_mid_transfer_ends_quietly() {
        let payload = vec![7u8; 4 * 1024 * 1024];
        let (_dir, catalog) = catalog_with_payload("long.wav", &payload);
        let (mut client, server) = duplex(1024);
        let task = tokio::spawn(handle_connection(server, catalog, peer()));
        client.write_all(b"STREAM 1\n").await.unwrap();
        let mut first = [0u8; 512];
        client.read_exact(&mut first).await.unwrap();
        drop(client);
        task.await.unwrap();
    }
}
