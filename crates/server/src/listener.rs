use std::sync::Arc;
use std::time::Duration;

use catalog::Catalog;
use common::protocol::ERR_BUSY;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::handler::handle_connection;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
pub struct ServeOptions {
    pub max_connections: usize,
    /// Answer `ERR busy` instead of waiting when every worker slot is taken.
    pub reject_when_busy: bool,
}

/// Accepts connections forever, handing each one to its own task. At most
/// `max_connections` handlers run at once; further clients either wait in
/// the listen backlog or are turned away, depending on `reject_when_busy`.
pub async fn serve(listener: TcpListener, catalog: Arc<Catalog>, options: ServeOptions) {
    let slots = Arc::new(Semaphore::new(options.max_connections.clamp(1, Semaphore::MAX_PERMITS)));
    loop {
        let waited = if options.reject_when_busy {
            None
        } else {
            match Arc::clone(&slots).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return,
            }
        };

        let (mut stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!("Failed to accept connection: {}", err);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };
        info!("Client connected from {}", peer);

        let permit = match waited {
            Some(permit) => permit,
            None => match Arc::clone(&slots).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    info!("Turning away {}: all {} slots busy", peer, options.max_connections);
                    tokio::spawn(async move {
                        if let Err(err) = stream.write_all(ERR_BUSY.as_bytes()).await {
                            debug!("Failed to send busy reply to {}: {}", peer, err);
                        }
                        if let Err(err) = stream.shutdown().await {
                            debug!("Failed to close connection to {}: {}", peer, err);
                        }
                    });
                    continue;
                }
            },
        };
        debug!("{} handler slots free", slots.available_permits());

        let catalog = Arc::clone(&catalog);
        tokio::spawn(async move {
            let _permit = permit;
            handle_connection(stream, catalog, peer).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{serve, ServeOptions};
    use catalog::Catalog;
    use common::protocol::ERR_BUSY;
    use common::Song;
    use std::fs;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    async fn start(catalog: Catalog, options: ServeOptions) -> (SocketAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(serve(listener, Arc::new(catalog), options));
        (addr, handle)
    }

    async fn request(addr: SocketAddr, line: &str) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(line.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    }

    fn indexed(dir: &tempfile::TempDir, files: Vec<(String, Vec<u8>)>) -> Catalog {
        for (name, bytes) in files {
            fs::write(dir.path().join(name), bytes).unwrap();
        }
        let mut catalog = Catalog::default();
        catalog.index_dir(dir.path());
        catalog
    }

    const OPTIONS: ServeOptions = ServeOptions {
        max_connections: 8,
        reject_when_busy: false,
    };

    #[tokio::test]
    async fn concurrent_lists_are_complete() {
        let dir = tempfile::tempdir().unwrap();
        let files = (0..40)
            .map(|i| (format!("song{:02}.mp3", i), vec![i as u8; 16]))
            .collect();
        let catalog = indexed(&dir, files);
        let expected: Vec<Song> = catalog.songs().cloned().collect();
        let (addr, server) = start(catalog, OPTIONS).await;

        let first = tokio::spawn(request(addr, "LIST\n"));
        let second = tokio::spawn(request(addr, "LIST\n"));
        for response in [first.await.unwrap(), second.await.unwrap()] {
            let songs: Vec<Song> = serde_json::from_slice(&response).unwrap();
            assert_eq!(songs, expected);
        }
        server.abort();
    }

    #[tokio::test]
    async fn stream_round_trips_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..1_000_000u32).map(|i| (i * 7 % 256) as u8).collect();
        let catalog = indexed(&dir, vec![("large.wav".to_string(), payload.clone())]);
        let (addr, server) = start(catalog, OPTIONS).await;

        let streams: Vec<_> = (0..4)
            .map(|i| {
                let line = if i % 2 == 0 { "STREAM 1\n" } else { "DOWNLOAD 1\n" };
                tokio::spawn(request(addr, line))
            })
            .collect();
        for stream in streams {
            assert_eq!(stream.await.unwrap(), payload);
        }
        server.abort();
    }

    #[tokio::test]
    async fn busy_server_rejects_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = indexed(&dir, vec![("a.mp3".to_string(), b"a".to_vec())]);
        let (addr, server) = start(
            catalog,
            ServeOptions {
                max_connections: 1,
                reject_when_busy: true,
            },
        )
        .await;

        // Holds the only slot: connected but never sends a command.
        let idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut turned_away = TcpStream::connect(addr).await.unwrap();
        let mut response = Vec::new();
        turned_away.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, ERR_BUSY.as_bytes());

        drop(idle);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let response = request(addr, "LIST\n").await;
        let songs: Vec<Song> = serde_json::from_slice(&response).unwrap();
        assert_eq!(songs.len(), 1);
        server.abort();
    }

    #[tokio::test]
    async fn busy_server_queues_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = indexed(&dir, vec![("a.mp3".to_string(), b"a".to_vec())]);
        let (addr, server) = start(
            catalog,
            ServeOptions {
                max_connections: 1,
                reject_when_busy: false,
            },
        )
        .await;

        let idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let queued = tokio::spawn(request(addr, "LIST\n"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!queued.is_finished());

        drop(idle);
        let response = queued.await.unwrap();
        let songs: Vec<Song> = serde_json::from_slice(&response).unwrap();
        assert_eq!(songs.len(), 1);
        server.abort();
    }
}
