//! Commits a partition plan to disk
//!
//! Order matters: the backup is written and verified first, then every group
//! file, and the original is replaced last. A failure at any step stops the
//! run, so the original is never rewritten unless all group files landed.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::domain::GeneratedFile;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to back up {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Backup {path} does not match the original")]
    BackupMismatch { path: PathBuf },

    #[error("Backup {path} already exists and differs from the original (use --force to replace it)")]
    BackupExists { path: PathBuf },

    #[error("No backup found at {path}")]
    MissingBackup { path: PathBuf },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Generated file {path} would overwrite {target}")]
    Collision { path: PathBuf, target: PathBuf },

    #[error("Failed to resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A write failure together with what had already been written
#[derive(Debug, Error)]
#[error("Partition aborted; already written: [{}]", display_paths(.written))]
pub struct CommitError {
    #[source]
    pub error: WriteError,
    pub written: Vec<PathBuf>,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// What a successful commit wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub backup: PathBuf,
    /// Group files, in write order
    pub written: Vec<PathBuf>,
    pub root: PathBuf,
}

/// Persists generated files next to a verified backup
#[derive(Debug, Clone, Copy, Default)]
pub struct Writer {
    overwrite_backup: bool,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow replacing a backup that differs from the current original
    pub fn overwrite_backup(mut self, overwrite: bool) -> Self {
        self.overwrite_backup = overwrite;
        self
    }

    /// `<original>.backup`
    pub fn backup_path(original: &Path) -> PathBuf {
        let mut name = original.as_os_str().to_os_string();
        name.push(".backup");
        PathBuf::from(name)
    }

    /// Backs up the original, writes every group file, then replaces the original
    pub fn commit(
        &self,
        original: &Path,
        out_dir: &Path,
        files: &[GeneratedFile],
        root_content: &str,
    ) -> Result<CommitReport, CommitError> {
        Self::check_targets(original, out_dir, files).map_err(|error| CommitError {
            error,
            written: Vec::new(),
        })?;

        let backup = self.backup(original).map_err(|error| CommitError {
            error,
            written: Vec::new(),
        })?;

        let mut written = Vec::new();

        for file in files {
            let path = out_dir.join(&file.relative_path);
            if let Err(error) = write_atomic(&path, file.content.as_bytes()) {
                return Err(CommitError { error, written });
            }
            written.push(path);
        }

        if let Err(error) = write_atomic(original, root_content.as_bytes()) {
            return Err(CommitError { error, written });
        }

        Ok(CommitReport {
            backup,
            written,
            root: original.to_path_buf(),
        })
    }

    /// Rejects group files that land on the original, its backup or each other
    pub fn check_targets(original: &Path, out_dir: &Path, files: &[GeneratedFile]) -> Result<(), WriteError> {
        let original_abs = resolve(original)?;
        let backup_abs = resolve(&Self::backup_path(original))?;
        let mut seen: Vec<PathBuf> = Vec::with_capacity(files.len());

        for file in files {
            let path = out_dir.join(&file.relative_path);
            let target = resolve(&path)?;
            let clash = if target == original_abs {
                Some(original.to_path_buf())
            } else if target == backup_abs {
                Some(Self::backup_path(original))
            } else if seen.contains(&target) {
                Some(target.clone())
            } else {
                None
            };
            if let Some(target) = clash {
                return Err(WriteError::Collision { path, target });
            }
            seen.push(target);
        }

        Ok(())
    }

    /// Copies the original to its backup path and verifies the copy
    pub fn backup(&self, original: &Path) -> Result<PathBuf, WriteError> {
        let backup = Self::backup_path(original);
        let bytes = fs::read(original).map_err(|source| WriteError::Backup {
            path: original.to_path_buf(),
            source,
        })?;
        let expected = blake3::hash(&bytes);

        if backup.exists() {
            let existing = fs::read(&backup).map_err(|source| WriteError::Backup {
                path: backup.clone(),
                source,
            })?;
            if blake3::hash(&existing) == expected {
                return Ok(backup);
            }
            if !self.overwrite_backup {
                return Err(WriteError::BackupExists { path: backup });
            }
        }

        fs::copy(original, &backup).map_err(|source| WriteError::Backup {
            path: backup.clone(),
            source,
        })?;

        let copied = fs::read(&backup).map_err(|source| WriteError::Backup {
            path: backup.clone(),
            source,
        })?;
        if blake3::hash(&copied) != expected {
            return Err(WriteError::BackupMismatch { path: backup });
        }

        Ok(backup)
    }

    /// Puts the backup back in place of the original
    pub fn restore(original: &Path) -> Result<PathBuf, WriteError> {
        let backup = Self::backup_path(original);
        if !backup.is_file() {
            return Err(WriteError::MissingBackup { path: backup });
        }

        let bytes = fs::read(&backup).map_err(|source| WriteError::Backup {
            path: backup.clone(),
            source,
        })?;
        write_atomic(original, &bytes)?;

        Ok(backup)
    }
}

/// Absolute form of `path` with `.` and `..` folded away, without touching the filesystem
fn resolve(path: &Path) -> Result<PathBuf, WriteError> {
    let absolute = std::path::absolute(path).map_err(|source| WriteError::Resolve {
        path: path.to_path_buf(),
        source,
    })?;

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    Ok(resolved)
}

/// Writes to a sibling temp file, then renames it over the target
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), WriteError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| WriteError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut temp = path.as_os_str().to_os_string();
    temp.push(".tmp");
    let temp_path = PathBuf::from(temp);

    if let Err(source) = fs::write(&temp_path, content) {
        let _ = fs::remove_file(&temp_path);
        return Err(WriteError::Write {
            path: temp_path,
            source,
        });
    }

    if let Err(source) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(WriteError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}
