//! Line sources for the storage watcher.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum TailError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A source of lines delivered over a channel. The channel closes when the
/// source ends.
#[async_trait]
pub trait Tailer: Send + Sync {
    async fn tail(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<String>, TailError>;
}

/// Follows an append-only file from its beginning, polling for new lines at
/// end of file. Blank lines are dropped and a trailing partial line is held
/// back until its newline arrives.
pub struct FileTailer {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileTailer {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
        }
    }
}

#[async_trait]
impl Tailer for FileTailer {
    async fn tail(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<String>, TailError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|source| TailError::Open {
                path: self.path.display().to_string(),
                source,
            })?;

        let (tx, rx) = mpsc::channel(1024);
        let poll_interval = self.poll_interval;
        let path = self.path.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(file);
            let mut buf = String::new();

            loop {
                let read = tokio::select! {
                    _ = cancel.cancelled() => break,
                    read = reader.read_line(&mut buf) => read,
                };

                match read {
                    Ok(0) => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                    Ok(_) if !buf.ends_with('\n') => {}
                    Ok(_) => {
                        let line = buf.trim_end_matches(['\n', '\r']).to_string();
                        buf.clear();
                        if line.trim().is_empty() {
                            continue;
                        }
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading {}: {}", path.display(), e);
                        break;
                    }
                }
            }

            tracing::debug!("Stopped tailing {}", path.display());
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("chain-indexer-{}-{}", std::process::id(), name))
    }

    async fn next(rx: &mut mpsc::Receiver<String>) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for line")
    }

    #[tokio::test]
    async fn test_follows_appended_lines() {
        let path = temp_path("follow");
        std::fs::write(&path, "first\n\nsecond\r\npart").unwrap();

        let tailer = FileTailer::new(&path, Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let mut rx = tailer.tail(cancel.clone()).await.unwrap();

        assert_eq!(next(&mut rx).await.as_deref(), Some("first"));
        assert_eq!(next(&mut rx).await.as_deref(), Some("second"));

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"ial\nthird\n").unwrap();

        assert_eq!(next(&mut rx).await.as_deref(), Some("partial"));
        assert_eq!(next(&mut rx).await.as_deref(), Some("third"));

        cancel.cancel();
        assert_eq!(next(&mut rx).await, None);
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file() {
        let tailer = FileTailer::new(temp_path("missing"), Duration::from_millis(10));
        let result = tailer.tail(CancellationToken::new()).await;
        assert!(matches!(result, Err(TailError::Open { .. })));
    }
}
