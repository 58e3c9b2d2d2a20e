//! Download a tool archive and extract it over the install directory.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use futures_util::StreamExt;
use reqwest::Client;
use tokio::{io::AsyncWriteExt, sync::watch};
use tracing::{debug, info};
use uuid::Uuid;
use zip::ZipArchive;

use crate::cancel::{cancel_requested, cancelled};
use crate::error::UpdateError;
use crate::http::CONNECT_TIMEOUT;
use crate::progress::TransferProgress;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallSummary {
    pub bytes: u64,
    pub entries: Vec<PathBuf>,
}

/// Removes the wrapped path when dropped.
struct ScopedPath {
    path: PathBuf,
    is_dir: bool,
}

impl ScopedPath {
    fn file(path: PathBuf) -> Self {
        Self {
            path,
            is_dir: false,
        }
    }

    fn dir(path: PathBuf) -> Self {
        Self { path, is_dir: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedPath {
    fn drop(&mut self) {
        let result = if self.is_dir {
            fs::remove_dir_all(&self.path)
        } else {
            fs::remove_file(&self.path)
        };
        if let Err(e) = result {
            if e.kind() != io::ErrorKind::NotFound {
                debug!("Failed to clean up {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Streams `url` into a temp file inside `install_dir`, then extracts every
/// entry over `install_dir`. The temp archive is removed on every path out.
/// `read_timeout` bounds the wait for the response head and for each chunk.
pub async fn install_archive(
    client: &Client,
    url: &str,
    install_dir: &Path,
    read_timeout: Duration,
    progress: &dyn TransferProgress,
    cancel_rx: Option<&watch::Receiver<bool>>,
) -> Result<InstallSummary, UpdateError> {
    tokio::fs::create_dir_all(install_dir).await?;

    let archive = ScopedPath::file(install_dir.join(format!(
        ".{}.download-{}",
        archive_file_name(url),
        Uuid::new_v4()
    )));

    info!("Downloading {}", url);
    let bytes = download_archive(
        client,
        url,
        archive.path(),
        read_timeout,
        progress,
        cancel_rx,
    )
    .await?;

    if cancel_requested(cancel_rx) {
        return Err(UpdateError::Cancelled);
    }

    let archive_path = archive.path().to_path_buf();
    let dest = install_dir.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || extract_archive(&archive_path, &dest))
        .await
        .map_err(|e| UpdateError::Extraction(format!("extraction task failed: {e}")))??;

    info!(
        "Installed {} entries from {} into {}",
        entries.len(),
        url,
        install_dir.display()
    );
    Ok(InstallSummary { bytes, entries })
}

/// Writes the response body to `dest` and returns the byte count. A declared
/// Content-Length that does not match what arrived is `IncompleteDownload`.
pub async fn download_archive(
    client: &Client,
    url: &str,
    dest: &Path,
    read_timeout: Duration,
    progress: &dyn TransferProgress,
    cancel_rx: Option<&watch::Receiver<bool>>,
) -> Result<u64, UpdateError> {
    let resp = tokio::select! {
        biased;
        _ = cancelled(cancel_rx.cloned()) => return Err(UpdateError::Cancelled),
        resp = tokio::time::timeout(read_timeout, client.get(url).send()) => {
            resp.map_err(|_| UpdateError::Timeout(read_timeout))?
                .map_err(|e| UpdateError::from_reqwest(e, CONNECT_TIMEOUT))?
        }
    };

    if !resp.status().is_success() {
        return Err(UpdateError::HttpStatus {
            url: url.to_string(),
            status: resp.status().as_u16(),
        });
    }

    let declared = resp.content_length().filter(|len| *len > 0);
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = resp.bytes_stream();
    let mut received = 0u64;

    progress.begin(&archive_file_name(url), declared);
    let outcome: Result<(), UpdateError> = async {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel_rx.cloned()) => return Err(UpdateError::Cancelled),
                next = tokio::time::timeout(read_timeout, stream.next()) => {
                    next.map_err(|_| UpdateError::Timeout(read_timeout))?
                }
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    if let Some(expected) = declared.filter(|expected| received < *expected) {
                        debug!("Body of {} ended early: {}", url, err);
                        return Err(UpdateError::IncompleteDownload { expected, received });
                    }
                    return Err(UpdateError::from_reqwest(err, read_timeout));
                }
            };
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            progress.advance(chunk.len() as u64);
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
    .await;
    progress.finish();
    drop(file);
    outcome?;

    if let Some(expected) = declared {
        if expected != received {
            return Err(UpdateError::IncompleteDownload { expected, received });
        }
    }
    debug!("Downloaded {} bytes from {}", received, url);
    Ok(received)
}

/// Extracts every entry of the zip at `archive` over `dest`.
///
/// Entries are decompressed into a staging directory first and promoted with
/// renames only once all of them succeeded, so a corrupt archive leaves the
/// existing files alone. A failure while promoting can leave some files
/// replaced and others not.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, UpdateError> {
    let file = fs::File::open(archive)
        .map_err(|e| UpdateError::Extraction(format!("cannot open {}: {e}", archive.display())))?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| UpdateError::Extraction(format!("not a valid archive: {e}")))?;

    fs::create_dir_all(dest)?;
    let staging = ScopedPath::dir(dest.join(format!(".staging-{}", Uuid::new_v4())));
    fs::create_dir_all(staging.path())?;

    let mut files = Vec::new();
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| UpdateError::Extraction(format!("entry {index}: {e}")))?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(UpdateError::Extraction(format!(
                "entry '{}' escapes the install directory",
                entry.name()
            )));
        };
        let staged = staging.path().join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&staged).map_err(|e| extraction_io(&relative, e))?;
            continue;
        }
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).map_err(|e| extraction_io(&relative, e))?;
        }
        let mut out = fs::File::create(&staged).map_err(|e| extraction_io(&relative, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| extraction_io(&relative, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&staged, fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(|e| extraction_io(&relative, e))?;
            }
        }
        files.push(relative);
    }

    for relative in &files {
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| extraction_io(relative, e))?;
        }
        fs::rename(staging.path().join(relative), &target)
            .map_err(|e| extraction_io(relative, e))?;
    }

    Ok(files)
}

fn extraction_io(relative: &Path, err: io::Error) -> UpdateError {
    UpdateError::Extraction(format!("{}: {err}", relative.display()))
}

pub fn archive_file_name(url: &str) -> String {
    let name = url.rsplit('/').next().unwrap_or("");
    let name = name.split(['?', '#']).next().unwrap_or(name);
    if name.is_empty() {
        "archive.zip".into()
    } else {
        name.to_string()
    }
}
