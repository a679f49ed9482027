use thiserror::Error;

use crate::Version;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The requested file is not present on the remote.
    #[error("file not found")]
    NotFound,
    /// The remote did not answer in time.
    #[error("request timed out")]
    Timeout,
    /// Failed to connect to the remote host.
    #[error("failed to connect to the remote")]
    ConnectError,
    /// The file is larger than the caller allowed.
    #[error("file exceeds the maximum length of {max} bytes")]
    TooLarge { max: u64 },
    #[error("{0}")]
    Io(String),
}

/// Trait that is used represent the communication with a remote TUF repository.
///
/// Implementations must not return more than `max_length` bytes. They report
/// [`TransportError::TooLarge`] instead.
pub trait TufTransport {
    /// Fetches the metadata of `role`.
    ///
    /// With `version` set the versioned file (`<version>.<role>`) is requested,
    /// otherwise the most recent one the remote provides.
    fn fetch_metadata(
        &self,
        role: &str,
        version: Option<Version>,
        max_length: u64,
    ) -> Result<Vec<u8>, TransportError>;

    /// Fetches the target file that is stored under `path`.
    fn fetch_target(&self, path: &str, max_length: u64) -> Result<Vec<u8>, TransportError>;
}

impl<T: TufTransport + ?Sized> TufTransport for &T {
    fn fetch_metadata(
        &self,
        role: &str,
        version: Option<Version>,
        max_length: u64,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).fetch_metadata(role, version, max_length)
    }

    fn fetch_target(&self, path: &str, max_length: u64) -> Result<Vec<u8>, TransportError> {
        (**self).fetch_target(path, max_length)
    }
}

/// Rejects `data` if it is longer than `max_length`.
pub fn check_length(data: Vec<u8>, max_length: u64) -> Result<Vec<u8>, TransportError> {
    if data.len() as u64 > max_length {
        Err(TransportError::TooLarge { max: max_length })
    } else {
        Ok(data)
    }
}
