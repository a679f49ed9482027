use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use tuf_trust_common::constants::METADATA_EXTENSION;
use tuf_trust_common::remote::{TransportError, TufTransport};
use tuf_trust_common::storage::TufStorage;
use tuf_trust_common::{TufError, Version};

const ROOT_HISTORY_DIR: &str = "root_history";
const TARGETS_DIR: &str = "targets";

/// Role names become file names, everything except `[A-Za-z0-9._-]` is percent-encoded.
fn escape_role(role: &str) -> String {
    let mut escaped = String::with_capacity(role.len());
    for byte in role.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                escaped.push(byte as char)
            }
            _ => escaped.push_str(&format!("%{byte:02X}")),
        }
    }
    escaped
}

fn storage_error(path: &Path, err: io::Error) -> TufError {
    TufError::Storage(format!("{}: {err}", path.display()))
}

/// Persists metadata as `<dir>/<role>.der` and every accepted root as
/// `<dir>/root_history/<version>.root.der`.
///
/// Files are written to a temporary file first and then renamed.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    dir: PathBuf,
}

impl FilesystemStorage {
    /// Uses `dir` for storage, creating it if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, TufError> {
        let dir = dir.into();
        let history = dir.join(ROOT_HISTORY_DIR);
        fs::create_dir_all(&history).map_err(|err| storage_error(&history, err))?;
        Ok(FilesystemStorage { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn metadata_path(&self, role: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{METADATA_EXTENSION}", escape_role(role)))
    }

    fn write_atomically(path: &Path, data: &[u8]) -> Result<(), TufError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data).map_err(|err| storage_error(&tmp, err))?;
        fs::rename(&tmp, path).map_err(|err| storage_error(path, err))
    }
}

impl TufStorage for FilesystemStorage {
    fn load_metadata(&self, role: &str) -> Result<Option<Vec<u8>>, TufError> {
        let path = self.metadata_path(role);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(storage_error(&path, err)),
        }
    }

    fn persist_metadata(&mut self, role: &str, data: &[u8]) -> Result<(), TufError> {
        Self::write_atomically(&self.metadata_path(role), data)
    }

    fn delete_metadata(&mut self, role: &str) -> Result<(), TufError> {
        let path = self.metadata_path(role);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error(&path, err)),
        }
    }

    fn persist_root_history(&mut self, version: Version, data: &[u8]) -> Result<(), TufError> {
        let path = self
            .dir
            .join(ROOT_HISTORY_DIR)
            .join(format!("{version}.root.{METADATA_EXTENSION}"));
        Self::write_atomically(&path, data)
    }

    fn root_history(&self) -> Result<Vec<Version>, TufError> {
        let dir = self.dir.join(ROOT_HISTORY_DIR);
        let suffix = format!(".root.{METADATA_EXTENSION}");
        let mut versions = vec![];
        for entry in fs::read_dir(&dir).map_err(|err| storage_error(&dir, err))? {
            let entry = entry.map_err(|err| storage_error(&dir, err))?;
            let name = entry.file_name();
            let Some(version) = name
                .to_str()
                .and_then(|name| name.strip_suffix(&suffix))
                .and_then(|version| version.parse::<Version>().ok())
            else {
                continue;
            };
            versions.push(version);
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

/// Serves a repository from a local directory, e.g. a mounted update medium.
///
/// Metadata is read from `<dir>/<role>.der` and `<dir>/<version>.<role>.der`,
/// targets from `<dir>/targets/<path>`.
#[derive(Debug, Clone)]
pub struct FilesystemTransport {
    dir: PathBuf,
}

impl FilesystemTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, TufError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(TufError::InvalidConfig(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(FilesystemTransport { dir })
    }

    /// Joins `path` to `base`, refusing anything that could leave `base`.
    fn join(base: &Path, path: &str) -> Result<PathBuf, TransportError> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(TransportError::Io(format!("refusing to read {path}")));
        }
        Ok(base.join(relative))
    }

    fn read(path: &Path, max_length: u64) -> Result<Vec<u8>, TransportError> {
        let file = File::open(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => TransportError::NotFound,
            _ => TransportError::Io(err.to_string()),
        })?;
        let mut data = vec![];
        file.take(max_length.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|err| TransportError::Io(err.to_string()))?;
        if data.len() as u64 > max_length {
            return Err(TransportError::TooLarge { max: max_length });
        }
        debug!(path = %path.display(), length = data.len(), "read file");
        Ok(data)
    }
}

impl TufTransport for FilesystemTransport {
    fn fetch_metadata(
        &self,
        role: &str,
        version: Option<Version>,
        max_length: u64,
    ) -> Result<Vec<u8>, TransportError> {
        let name = match version {
            Some(version) => format!("{version}.{}.{METADATA_EXTENSION}", escape_role(role)),
            None => format!("{}.{METADATA_EXTENSION}", escape_role(role)),
        };
        Self::read(&Self::join(&self.dir, &name)?, max_length)
    }

    fn fetch_target(&self, path: &str, max_length: u64) -> Result<Vec<u8>, TransportError> {
        Self::read(
            &Self::join(&self.dir.join(TARGETS_DIR), path)?,
            max_length,
        )
    }
}
