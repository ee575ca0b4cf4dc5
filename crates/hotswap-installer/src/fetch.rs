use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;

/// Size of each read from the response body.
pub const DOWNLOAD_CHUNK_SIZE: usize = 16 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The response arrived but could not be written to disk.
#[derive(Debug, thiserror::Error)]
#[error("cannot save download to {}", path.display())]
pub struct SaveError {
    pub path: PathBuf,
    pub source: io::Error,
}

fn save_error(path: &Path) -> impl FnOnce(io::Error) -> SaveError + '_ {
    move |source| SaveError {
        path: path.to_path_buf(),
        source,
    }
}

pub fn build_download_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent.to_string())
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("failed to build HTTP client for package download")
}

/// Streams `url` into `dest`, replacing any previous (possibly partial) file.
///
/// `on_progress` receives the bytes written so far and the declared length,
/// if the server sent one, after every chunk.
/// Local file failures are reported as [`SaveError`] so callers can tell
/// them apart from network failures.
pub fn download_to_path<F>(
    client: &Client,
    url: &str,
    dest: &Path,
    mut on_progress: F,
) -> Result<u64>
where
    F: FnMut(u64, Option<u64>),
{
    tracing::info!(url, dest = %dest.display(), "downloading package");
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("download request failed: {url}"))?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("download returned status {status}: {url}"));
    }
    let declared = response.content_length();

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(save_error(parent))?;
    }
    let mut file = File::create(dest).map_err(save_error(dest))?;

    let mut buffer = vec![0_u8; DOWNLOAD_CHUNK_SIZE];
    let mut transferred = 0_u64;
    loop {
        let read = response
            .read(&mut buffer)
            .with_context(|| format!("failed reading download stream: {url}"))?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read]).map_err(save_error(dest))?;
        transferred += read as u64;
        on_progress(transferred, declared);
    }
    file.flush().map_err(save_error(dest))?;

    if transferred == 0 {
        return Err(anyhow!("downloaded file is empty: {url}"));
    }
    if let Some(expected) = declared {
        if expected != transferred {
            return Err(anyhow!(
                "download truncated: expected {expected} bytes, received {transferred}"
            ));
        }
    }

    tracing::debug!(bytes = transferred, "download complete");
    Ok(transferred)
}

#[derive(Debug)]
pub enum DownloadEvent {
    Progress {
        transferred: u64,
        total: Option<u64>,
    },
    Finished(Result<u64>),
}

/// A download running on a background thread.
#[derive(Debug)]
pub struct DownloadTask {
    events: Receiver<DownloadEvent>,
    handle: Option<JoinHandle<()>>,
}

impl DownloadTask {
    /// Forwards progress until the worker reports its result.
    pub fn wait<F>(mut self, mut on_progress: F) -> Result<u64>
    where
        F: FnMut(u64, Option<u64>),
    {
        let mut outcome = None;
        for event in self.events.iter() {
            match event {
                DownloadEvent::Progress { transferred, total } => on_progress(transferred, total),
                DownloadEvent::Finished(result) => {
                    outcome = Some(result);
                    break;
                }
            }
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() && outcome.is_none() {
                return Err(anyhow!("download worker panicked"));
            }
        }
        outcome.unwrap_or_else(|| Err(anyhow!("download worker exited without a result")))
    }
}

pub fn spawn_download(client: Client, url: String, dest: PathBuf) -> DownloadTask {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || run_download(&client, &url, &dest, &tx));
    DownloadTask {
        events: rx,
        handle: Some(handle),
    }
}

fn run_download(client: &Client, url: &str, dest: &Path, tx: &Sender<DownloadEvent>) {
    let progress_tx = tx.clone();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        download_to_path(client, url, dest, |transferred, total| {
            let _ = progress_tx.send(DownloadEvent::Progress { transferred, total });
        })
    }))
    .unwrap_or_else(|_| Err(anyhow!("download worker panicked: {url}")));

    if let Err(err) = &result {
        tracing::warn!("download failed: {err:#}");
    }
    let _ = tx.send(DownloadEvent::Finished(result));
}
