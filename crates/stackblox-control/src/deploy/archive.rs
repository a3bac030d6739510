// Copyright (C) 2025 The Stackblox Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archive extraction and build-context packaging.
//!
//! Both directions are blocking filesystem work and run on the blocking pool.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, Builder};

use crate::error::{Error, Result};

/// Extract a gzip-compressed tar archive into `dest_dir`.
///
/// Entries that would escape `dest_dir` are rejected by `tar` itself.
pub async fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive_path, &dest_dir))
        .await
        .map_err(|e| Error::Archive(format!("extraction task failed: {}", e)))?
}

fn extract_blocking(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dest_dir)?;
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(false);
    archive.unpack(dest_dir).map_err(|e| {
        Error::Archive(format!(
            "failed to extract {}: {}",
            archive_path.display(),
            e
        ))
    })
}

/// Package a directory as an uncompressed tar build context.
pub async fn pack_build_context(dir: &Path) -> Result<Vec<u8>> {
    let dir: PathBuf = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut builder = Builder::new(Vec::new());
        builder.follow_symlinks(false);
        builder.append_dir_all(".", &dir)?;
        builder.into_inner().map_err(Error::from)
    })
    .await
    .map_err(|e| Error::Archive(format!("packaging task failed: {}", e)))?
}
