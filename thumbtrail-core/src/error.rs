use std::path::PathBuf;
use thiserror::Error;

/// The error type returned by every fallible operation of this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A required input, key or playlist file does not exist.
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Malformed key-info, playlist or other structured input.
    #[error("invalid format: {0}")]
    Format(String),

    /// A key or IV file does not hold exactly 16 bytes.
    #[error("invalid key size in {}: expected 16 bytes, got {len} bytes", path.display())]
    InvalidKeyLength { path: PathBuf, len: usize },

    /// Padding check failed after decryption (wrong key, wrong IV or not ciphertext).
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// External transcoder failed.
    #[error("transcoder failed: {0}")]
    Transcode(String),

    /// External transcoder ran past its deadline and was killed.
    #[error("{program} timed out after {secs} seconds")]
    TranscodeTimeout { program: String, secs: u64 },

    /// Required decryption material is missing for the declared method.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failure while processing segment `index` of a playlist.
    #[error("segment {index} ({uri}): {source}")]
    Segment {
        index: usize,
        uri: String,
        #[source]
        source: Box<Error>,
    },

    /// Failure while producing thumbnail sample `index`.
    #[error("sample {index} at {timestamp:.3}s: {source}")]
    Sample {
        index: usize,
        timestamp: f64,
        #[source]
        source: Box<Error>,
    },

    /// Work stopped because cancellation was requested.
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid hex string: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Maps an [`std::io::Error`] raised while touching `path`, turning
    /// `ErrorKind::NotFound` into [`Error::NotFound`].
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        let path = path.into();

        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub(crate) fn segment(index: usize, uri: &str, source: Error) -> Self {
        Self::Segment {
            index,
            uri: uri.to_owned(),
            source: Box::new(source),
        }
    }

    pub(crate) fn sample(index: usize, timestamp: f64, source: Error) -> Self {
        Self::Sample {
            index,
            timestamp,
            source: Box::new(source),
        }
    }

    /// Returns true if this error, or the error it wraps, is a configuration error.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Configuration(_) => true,
            Self::Segment { source, .. } | Self::Sample { source, .. } => {
                source.is_configuration()
            }
            _ => false,
        }
    }

    /// Returns true if this error, or the error it wraps, is an integrity error.
    pub fn is_integrity(&self) -> bool {
        match self {
            Self::Integrity(_) => true,
            Self::Segment { source, .. } | Self::Sample { source, .. } => source.is_integrity(),
            _ => false,
        }
    }
}

/// A `Result` alias where the `Err` case is `thumbtrail_core::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Adds file path context to raw [`std::io::Result`] values.
pub(crate) trait IoContext<T> {
    fn at<P: Into<PathBuf>>(self, path: P) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at<P: Into<PathBuf>>(self, path: P) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
