use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::{
    error::{VisageError, VisageResult},
    layout::ensure_parent_dir,
};

/// One binary artifact a backend needs on disk. Fetched at most once; the
/// pipeline never mutates or deletes it.
#[derive(Clone, Debug)]
pub struct ModelAsset {
    pub name: String,
    pub url: String,
    pub dest: PathBuf,
    pub archive: ArchiveKind,
}

#[derive(Clone, Debug)]
pub enum ArchiveKind {
    None,
    /// Zip payload extracted into the destination's parent directory.
    /// `unpack_marker` is a path the archive is known to contain; its
    /// presence on disk means extraction already happened. A missing marker
    /// only costs a re-extraction, which is safe to repeat.
    Zip { unpack_marker: PathBuf },
}

pub struct Provisioner {
    client: reqwest::blocking::Client,
}

impl Provisioner {
    pub fn new() -> VisageResult<Self> {
        // Weight files run to multiple GB; the default timeout would cut
        // them off mid-transfer.
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(3600))
            .build()
            .map_err(|e| VisageError::provision(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }

    /// Ensure `asset` exists locally, downloading and unpacking if absent.
    ///
    /// The destination existing is trusted as "already provisioned":
    /// downloads land in a `.part` file and are renamed into place only
    /// after the size check passes, so a visible destination is a complete
    /// one.
    pub fn ensure(&self, asset: &ModelAsset) -> VisageResult<PathBuf> {
        if asset.dest.exists() {
            debug!(asset = %asset.name, "already provisioned");
        } else {
            self.download(asset)?;
        }
        self.ensure_unpacked(asset)?;
        Ok(asset.dest.clone())
    }

    fn download(&self, asset: &ModelAsset) -> VisageResult<()> {
        ensure_parent_dir(&asset.dest)?;
        info!(asset = %asset.name, url = %asset.url, "downloading");

        let mut response = self
            .client
            .get(&asset.url)
            .send()
            .map_err(|e| VisageError::provision(format!("request for '{}' failed: {e}", asset.url)))?;
        if !response.status().is_success() {
            return Err(VisageError::provision(format!(
                "HTTP {} for '{}'",
                response.status(),
                asset.url
            )));
        }

        let total = response.content_length();
        let pb = progress_bar(&asset.name, total);

        let part_path = asset.dest.with_extension("part");
        let mut file = fs::File::create(&part_path).map_err(|e| {
            VisageError::provision(format!("create '{}' failed: {e}", part_path.display()))
        })?;

        let mut buf = [0u8; 8192];
        let mut received: u64 = 0;
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| VisageError::provision(format!("read from '{}' failed: {e}", asset.url)))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).map_err(|e| {
                VisageError::provision(format!("write '{}' failed: {e}", part_path.display()))
            })?;
            received += n as u64;
            pb.set_position(received);
        }
        file.flush()
            .map_err(|e| VisageError::provision(format!("flush '{}' failed: {e}", part_path.display())))?;
        drop(file);
        pb.finish_and_clear();

        // A short read would otherwise be indistinguishable from a complete
        // file on the next run.
        if let Some(expected) = total
            && received != expected
        {
            fs::remove_file(&part_path).ok();
            return Err(VisageError::provision(format!(
                "download of '{}' incomplete: expected {expected} bytes, got {received}",
                asset.url
            )));
        }

        fs::rename(&part_path, &asset.dest).map_err(|e| {
            VisageError::provision(format!(
                "rename '{}' -> '{}' failed: {e}",
                part_path.display(),
                asset.dest.display()
            ))
        })?;

        info!(asset = %asset.name, bytes = received, "downloaded");
        Ok(())
    }

    fn ensure_unpacked(&self, asset: &ModelAsset) -> VisageResult<()> {
        let ArchiveKind::Zip { unpack_marker } = &asset.archive else {
            return Ok(());
        };
        if unpack_marker.exists() {
            debug!(asset = %asset.name, "already unpacked");
            return Ok(());
        }

        let into = asset
            .dest
            .parent()
            .ok_or_else(|| {
                VisageError::provision(format!(
                    "archive destination '{}' has no parent directory",
                    asset.dest.display()
                ))
            })?
            .to_path_buf();
        extract_zip(&asset.dest, &into)
    }
}

fn progress_bar(name: &str, total: Option<u64>) -> ProgressBar {
    let pb = match total {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg:24} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .unwrap()
                    .progress_chars("=> "),
            );
            pb
        }
        None => {
            // No Content-Length from the server: indeterminate progress.
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg:24} {bytes}")
                    .unwrap(),
            );
            pb
        }
    };
    pb.set_message(name.to_string());
    pb
}

fn extract_zip(archive_path: &Path, into: &Path) -> VisageResult<()> {
    info!(archive = %archive_path.display(), "extracting");
    let file = fs::File::open(archive_path).map_err(|e| {
        VisageError::provision(format!("open archive '{}' failed: {e}", archive_path.display()))
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        VisageError::provision(format!("read archive '{}' failed: {e}", archive_path.display()))
    })?;
    archive.extract(into).map_err(|e| {
        VisageError::provision(format!(
            "extract '{}' into '{}' failed: {e}",
            archive_path.display(),
            into.display()
        ))
    })?;
    Ok(())
}
