use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;
use crate::storage::{FileStorage, StoredFile};

const MAX_CONFLICT_ATTEMPTS: u32 = 1000;

/// Stores files below a root directory. Identifiers are `/`-separated
/// paths relative to that root.
pub struct LocalFileStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalFileStorage {
    pub fn new<P: AsRef<Path>>(root: P, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an identifier onto a path under the root, rejecting anything
    /// that could escape it.
    fn path_for(&self, identifier: &str) -> Result<PathBuf, StorageError> {
        let invalid = || StorageError::InvalidIdentifier(identifier.to_string());

        if identifier.is_empty() || identifier.contains('\\') || identifier.starts_with('/') {
            return Err(invalid());
        }

        let mut path = self.root.clone();
        for component in Path::new(identifier).components() {
            match component {
                Component::Normal(part) => path.push(part),
                _ => return Err(invalid()),
            }
        }
        Ok(path)
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

    /// Copies `source` into `dir_path` under `filename`, or `name_2.ext`,
    /// `name_3.ext`, ... if taken. Creation uses `create_new` so two
    /// concurrent writers never share a file.
    fn copy_with_atomic_creation(
        &self,
        source: &Path,
        dir_path: &Path,
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            _ => (filename, None),
        };

        for counter in 1..=MAX_CONFLICT_ATTEMPTS {
            let try_filename = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };
            let try_path = dir_path.join(&try_filename);

            match OpenOptions::new().write(true).create_new(true).open(&try_path) {
                Ok(mut target) => {
                    let copy_err = |e| StorageError::CopyFile {
                        from: source.to_path_buf(),
                        to: try_path.clone(),
                        source: e,
                    };
                    let result = File::open(source)
                        .and_then(|mut input| std::io::copy(&mut input, &mut target));
                    if let Err(e) = result {
                        drop(target);
                        let _ = std::fs::remove_file(&try_path);
                        return Err(copy_err(e));
                    }
                    return Ok(try_path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    })
                }
            }
        }

        Err(StorageError::FileExists(dir_path.join(filename)))
    }

    fn identifier_for(&self, path: &Path) -> Result<String, StorageError> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidIdentifier(path.display().to_string()))?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }

    /// Removes now-empty parent folders up to, not including, the root.
    fn prune_empty_folders(&self, file_path: &Path) {
        let mut current = file_path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            if std::fs::remove_dir(dir).is_err() {
                break;
            }
            tracing::debug!("Removed empty storage folder {}", dir.display());
            current = dir.parent();
        }
    }
}

impl FileStorage for LocalFileStorage {
    fn store(&self, local_path: &Path, folder: &str, filename: &str) -> Result<StoredFile, StorageError> {
        let folder = sanitize_folder(folder);
        let filename = sanitize_filename(filename);
        if filename.is_empty() {
            return Err(StorageError::InvalidIdentifier(filename));
        }

        let dir_path = if folder.is_empty() {
            self.root.clone()
        } else {
            self.path_for(&folder)?
        };
        self.ensure_directory(&dir_path)?;

        let stored_path = self.copy_with_atomic_creation(local_path, &dir_path, &filename)?;
        let size = std::fs::metadata(&stored_path)
            .map(|m| m.len())
            .map_err(|e| StorageError::WriteFile {
                path: stored_path.clone(),
                source: e,
            })?;
        let identifier = self.identifier_for(&stored_path)?;

        Ok(StoredFile {
            public_url: self.public_url(&identifier),
            identifier,
            size,
        })
    }

    fn delete(&self, identifier: &str) -> Result<bool, StorageError> {
        let path = self.path_for(identifier)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                self.prune_empty_folders(&path);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::DeleteFile {
                identifier: identifier.to_string(),
                source: e,
            }),
        }
    }

    fn exists(&self, identifier: &str) -> bool {
        self.path_for(identifier)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    fn resolve(&self, identifier: &str) -> Option<PathBuf> {
        self.path_for(identifier).ok().filter(|p| p.is_file())
    }

    fn public_url(&self, identifier: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), identifier)
    }
}

fn sanitize_component(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn sanitize_filename(name: &str) -> String {
    let cleaned = sanitize_component(name.rsplit(['/', '\\']).next().unwrap_or(name));
    cleaned.trim_start_matches('.').to_string()
}

fn sanitize_folder(folder: &str) -> String {
    folder
        .split(['/', '\\'])
        .map(sanitize_component)
        .filter(|part| !part.is_empty() && part != "." && part != "..")
        .collect::<Vec<_>>()
        .join("/")
}
