use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Move a file from `src` to `dst`. Uses `rename` first and falls back to
/// copy + delete for cross-device moves.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn remove_dir(dir: PathBuf) -> Result<(), StorageError> {
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Remove {
            path: dir,
            source: e,
        }),
    }
}

/// Reduces an uploaded filename to a safe basename.
pub fn safe_filename(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original)
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

/// On-disk layout:
///
/// ```text
/// <root>/uploads/<job_id>/<filename>
/// <root>/artifacts/<job_id>/report.<ext>
/// ```
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self, job_id: &str) -> PathBuf {
        self.root.join("uploads").join(job_id)
    }

    pub fn artifacts_dir(&self, job_id: &str) -> PathBuf {
        self.root.join("artifacts").join(job_id)
    }

    /// Stores an uploaded document. Name clashes within the job get a
    /// numeric suffix; files are never overwritten.
    pub fn store_upload(
        &self,
        job_id: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let dir_path = self.uploads_dir(job_id);
        self.ensure_directory(&dir_path)?;
        self.store_with_atomic_creation(&dir_path, &safe_filename(filename), content)
    }

    /// Writes `report.<extension>` for a job via a temporary file, so a
    /// reader never sees a partial artifact.
    pub fn store_artifact(
        &self,
        job_id: &str,
        extension: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let dir_path = self.artifacts_dir(job_id);
        self.ensure_directory(&dir_path)?;

        let final_path = dir_path.join(format!("report.{}", extension));
        let tmp_path = dir_path.join(format!(".report.{}.tmp", extension));

        std::fs::write(&tmp_path, content).map_err(|e| StorageError::WriteFile {
            path: tmp_path.clone(),
            source: e,
        })?;
        move_file(&tmp_path, &final_path)?;

        Ok(final_path)
    }

    pub fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        std::fs::read(path).map_err(|e| StorageError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Deletes a file; a missing file is not an error.
    pub fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Remove {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Deletes every artifact of a job.
    pub fn remove_artifacts(&self, job_id: &str) -> Result<(), StorageError> {
        remove_dir(self.artifacts_dir(job_id))
    }

    /// Deletes the uploaded documents of a job.
    pub fn remove_uploads(&self, job_id: &str) -> Result<(), StorageError> {
        remove_dir(self.uploads_dir(job_id))
    }

    fn store_with_atomic_creation(
        &self,
        dir_path: &Path,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            _ => (filename, None),
        };

        for counter in 1..=1000 {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };

            let try_path = dir_path.join(&try_filename);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .map_err(|e| StorageError::WriteFile {
                            path: try_path.clone(),
                            source: e,
                        })?;
                    return Ok(try_path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    });
                }
            }
        }

        Err(StorageError::FileExists(dir_path.join(filename)))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}
