//! Archive-then-clear step run before every recording.
//!
//! Whatever the previous recording left in the save directory is moved aside
//! into a staging directory, which is then zipped into
//! `<archive>/<YYYYMMDDhhmmss>.zip` on a blocking task. The move is quick, so the
//! save directory is empty by the time the recorder starts while the
//! compression keeps running in the background.
//!
//! Entries are named `<save dir basename>/<relative path>`, directories end in
//! `/` and files are deflated.

use chrono::Local;
use log::{debug, error, info, warn};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error_handling::types::JobError;

/// A zip being written in the background.
#[derive(Debug)]
pub struct ArchiveTask {
    pub target: PathBuf,
    pub(crate) handle: Option<JoinHandle<Result<PathBuf, JobError>>>,
}

impl ArchiveTask {
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Waits for the zip to be complete and returns its path.
    pub async fn wait(self) -> Result<PathBuf, JobError> {
        match self.handle {
            Some(handle) => handle
                .await
                .map_err(|e| JobError::ArchiveFailed(e.to_string()))?,
            None => Ok(self.target),
        }
    }
}

/// Entries of `save_dir` to archive. The archive directory is skipped when it
/// lives inside the save directory.
fn archivable_entries(save_dir: &Path, archive_dir: &Path) -> Result<Vec<PathBuf>, JobError> {
    let archive_dir = archive_dir
        .canonicalize()
        .unwrap_or_else(|_| archive_dir.to_path_buf());
    let mut entries = Vec::new();
    for entry in fs::read_dir(save_dir)? {
        let path = entry?.path();
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if canonical == archive_dir || path.file_name().map(is_staging_name).unwrap_or(false) {
            continue;
        }
        entries.push(path);
    }
    entries.sort();
    Ok(entries)
}

fn is_staging_name(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with(".voxgate-staging-")
}

/// Moves the content of `save_dir` aside and zips it into `archive_dir`.
///
/// Returns `Ok(None)` when there is nothing to archive. Both directories are
/// created if needed.
pub fn archive_and_clear(save_dir: &Path, archive_dir: &Path) -> Result<Option<ArchiveTask>, JobError> {
    fs::create_dir_all(save_dir)?;
    fs::create_dir_all(archive_dir)?;

    let entries = archivable_entries(save_dir, archive_dir)?;
    if entries.is_empty() {
        debug!("Audio recording folder is empty, no old files to archive");
        return Ok(None);
    }

    let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
    let target = archive_dir.join(format!("{}.zip", stamp));
    let base = save_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recordings".to_string());
    info!("Archiving old audio files to {}", target.display());

    let staging = archive_dir.join(format!(".voxgate-staging-{}", stamp));
    fs::create_dir_all(&staging)?;

    let mut moved = Vec::new();
    for entry in &entries {
        let name = match entry.file_name() {
            Some(name) => name.to_owned(),
            None => continue,
        };
        match fs::rename(entry, staging.join(&name)) {
            Ok(()) => moved.push(name),
            Err(e) => {
                warn!(
                    "Unable to move {} aside ({}), archiving in place",
                    entry.display(),
                    e
                );
                // Put back what was already moved and zip the save dir directly.
                let restored = unstage(&staging, save_dir, &moved);
                debug!("Restored {} of {} staged entries", restored, moved.len());
                write_zip(save_dir, &base, &target, Some(archive_dir))?;
                for entry in entries.iter().filter(|entry| entry.exists()) {
                    remove_entry(entry)?;
                }
                return Ok(Some(ArchiveTask {
                    target,
                    handle: None,
                }));
            }
        }
    }

    let task_target = target.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let result = write_zip(&staging, &base, &task_target, None);
        if let Err(e) = fs::remove_dir_all(&staging) {
            warn!("Unable to remove staging folder {}: {}", staging.display(), e);
        }
        match &result {
            Ok(()) => info!("Archive {} complete", task_target.display()),
            Err(e) => error!("Archive {} failed: {}", task_target.display(), e),
        }
        result.map(|_| task_target)
    });

    Ok(Some(ArchiveTask {
        target,
        handle: Some(handle),
    }))
}

/// Moves staged entries back into the save directory and drops the staging
/// folder. Failures are logged and skipped. Returns how many came back.
fn unstage(staging: &Path, save_dir: &Path, names: &[std::ffi::OsString]) -> usize {
    let mut restored = 0;
    for name in names {
        match fs::rename(staging.join(name), save_dir.join(name)) {
            Ok(()) => restored += 1,
            Err(e) => warn!(
                "Unable to restore {} from {}: {}",
                Path::new(name).display(),
                staging.display(),
                e
            ),
        }
    }
    if let Err(e) = fs::remove_dir_all(staging) {
        warn!("Unable to remove staging folder {}: {}", staging.display(), e);
    }
    restored
}

fn remove_entry(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Writes every file and directory under `source` into a new zip at `target`.
fn write_zip(source: &Path, base: &str, target: &Path, skip: Option<&Path>) -> Result<(), JobError> {
    let file = File::create(target)?;
    let mut zip = ZipWriter::new(file);
    let dir_options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let file_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.add_directory(format!("{}/", base), dir_options)?;

    let skip = skip.map(|p| p.canonicalize().unwrap_or_else(|_| p.to_path_buf()));
    let mut pending = vec![source.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for path in entries {
            if let Some(skip) = &skip {
                let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
                if &canonical == skip {
                    continue;
                }
            }
            if path.file_name().map(is_staging_name).unwrap_or(false) {
                continue;
            }

            let relative = path
                .strip_prefix(source)
                .map_err(|e| JobError::ArchiveFailed(e.to_string()))?;
            let name = format!("{}/{}", base, relative.to_string_lossy().replace('\\', "/"));

            if path.is_dir() {
                zip.add_directory(format!("{}/", name), dir_options)?;
                pending.push(path);
            } else {
                zip.start_file(name, file_options)?;
                let mut input = File::open(&path)?;
                io::copy(&mut input, &mut zip)?;
            }
        }
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn zip_names(path: &Path) -> BTreeSet<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        archive.file_names().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_save_dir_produces_no_archive() {
        let root = TempDir::new().unwrap();
        let save = root.path().join("avrec");
        let archive = root.path().join("archive");

        let task = archive_and_clear(&save, &archive).unwrap();

        assert!(task.is_none());
        assert!(save.is_dir());
        assert_eq!(fs::read_dir(&archive).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn archive_holds_prior_files_and_save_dir_is_cleared() {
        let root = TempDir::new().unwrap();
        let save = root.path().join("avrec");
        let archive = root.path().join("archive");
        fs::create_dir_all(save.join("old")).unwrap();
        fs::write(save.join("20240101120000.mp3"), b"first chunk").unwrap();
        fs::write(save.join("old/20231231235959.mp3"), b"older").unwrap();

        let task = archive_and_clear(&save, &archive).unwrap().unwrap();

        assert_eq!(fs::read_dir(&save).unwrap().count(), 0);

        let zip_path = task.wait().await.unwrap();
        let expected: BTreeSet<String> = [
            "avrec/",
            "avrec/20240101120000.mp3",
            "avrec/old/",
            "avrec/old/20231231235959.mp3",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(zip_names(&zip_path), expected);

        let mut reader = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let entry = reader.by_name("avrec/20240101120000.mp3").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);

        let leftovers: Vec<_> = fs::read_dir(&archive)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != zip_path)
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn nested_archive_dir_is_left_alone() {
        let root = TempDir::new().unwrap();
        let save = root.path().join("avrec");
        let archive = save.join("archive");
        fs::create_dir_all(&archive).unwrap();
        fs::write(archive.join("19990101000000.zip"), b"previous").unwrap();
        fs::write(save.join("take.wav"), b"audio").unwrap();

        let task = archive_and_clear(&save, &archive).unwrap().unwrap();
        let zip_path = task.wait().await.unwrap();

        let remaining: Vec<_> = fs::read_dir(&save)
            .unwrap()
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        assert_eq!(remaining, vec![archive.clone()]);
        assert!(archive.join("19990101000000.zip").exists());

        let names = zip_names(&zip_path);
        assert!(names.contains("avrec/take.wav"));
        assert!(!names.iter().any(|n| n.contains("archive")));
    }

    #[test]
    fn unstaging_skips_entries_it_cannot_restore() {
        let save = TempDir::new().unwrap();
        let staging = save.path().join(".voxgate-staging-20240101120000");
        fs::create_dir(&staging).unwrap();
        fs::write(staging.join("a.mp3"), b"a").unwrap();
        fs::write(staging.join("c.mp3"), b"c").unwrap();
        let names = ["a.mp3", "gone.mp3", "c.mp3"].map(std::ffi::OsString::from);

        let restored = unstage(&staging, save.path(), &names);

        assert_eq!(restored, 2);
        assert!(save.path().join("a.mp3").is_file());
        assert!(save.path().join("c.mp3").is_file());
        assert!(!staging.exists());
    }
}
