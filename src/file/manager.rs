// Hoerbuch - Narrated audiobooks from text documents
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! File operations and partial-output ownership
//!
//! # Key Operations
//! - Existence checks right before a destructive write
//! - Safe deletes (retry, missing file is not an error)
//! - Replacing a file with a rewritten copy (rename)
//! - [`PartialOutput`]: removes an output unless it was committed

use crate::error::{HoerbuchError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Maximum retry attempts for file operations
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// File helpers shared by the pipeline
pub struct FileManager;

impl FileManager {
    /// Check if file exists
    pub async fn file_exists(path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Fail with `FileAlreadyExists` if `path` is taken
    pub async fn ensure_absent(path: &Path) -> Result<()> {
        if Self::file_exists(path).await {
            return Err(HoerbuchError::FileAlreadyExists(
                path.to_string_lossy().to_string(),
            ));
        }
        Ok(())
    }

    /// Safe delete operation with retry
    pub async fn safe_delete(path: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match Self::safe_delete_once(path).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                    return Err(HoerbuchError::FileIoError(format!(
                        "Failed to delete file after {} attempts: {}: {}",
                        MAX_RETRY_ATTEMPTS,
                        path.display(),
                        e
                    )));
                }
                Err(_) => {
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            }
        }
    }

    /// Try to delete file once
    async fn safe_delete_once(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HoerbuchError::file_io("Delete failed", path, e)),
        }
    }

    /// Move `replacement` over `target`
    ///
    /// Both must be on the same filesystem, which holds for sibling temp
    /// files.
    pub async fn replace(replacement: &Path, target: &Path) -> Result<()> {
        fs::rename(replacement, target).await.map_err(|e| {
            HoerbuchError::FileIoError(format!(
                "Move failed: {} -> {}: {}",
                replacement.display(),
                target.display(),
                e
            ))
        })
    }
}

/// An output file this run is creating
///
/// Until [`PartialOutput::commit`] is called the file is considered
/// incomplete: [`PartialOutput::discard`] removes it, and so does dropping
/// the guard.
#[derive(Debug)]
pub struct PartialOutput {
    path: PathBuf,
    armed: bool,
}

impl PartialOutput {
    /// Claim `path`, failing if something already lives there
    pub async fn claim(path: &Path) -> Result<Self> {
        FileManager::ensure_absent(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            armed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand the file over to the filesystem
    pub fn commit(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Drop the claim without touching the file
    ///
    /// For when creating the file failed because someone else got there
    /// first: whatever is at the path now is not ours to delete.
    pub fn release(mut self) {
        self.armed = false;
    }

    /// Remove the incomplete file
    pub async fn discard(mut self) {
        self.armed = false;
        match FileManager::safe_delete(&self.path).await {
            Ok(()) => debug!("Removed partial output {}", self.path.display()),
            Err(e) => warn!("{}", e),
        }
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if self.armed {
            match std::fs::remove_file(&self.path) {
                Ok(()) => debug!("Removed abandoned output {}", self.path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove {}: {}", self.path.display(), e),
            }
        }
    }
}
