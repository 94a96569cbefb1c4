use crate::{
    CancelFlag, Error, KeyInfo, KeyMaterial, Location, Result, cipher, engine,
    error::IoContext, keys::read_raw, transcoder::Transcoder,
};
use log::{info, warn};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// How the scrubber turns its video reference into clear media.
///
/// Always supplied by the caller, never guessed from file contents. Key
/// fields are optional so a missing key can be reported as a
/// configuration error instead of surfacing later as garbage frames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Decryption {
    #[default]
    None,
    /// The whole file was encrypted with AES-128-CBC. Without an IV file the
    /// zero IV is used.
    WholeFileAes {
        key: Option<PathBuf>,
        iv: Option<PathBuf>,
    },
    /// AES-128 segmented HLS. The IV comes from the key-info file when given,
    /// otherwise from the playlist.
    Hls {
        key: Option<PathBuf>,
        key_info: Option<PathBuf>,
    },
}

impl Decryption {
    pub fn method(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::WholeFileAes { .. } => "whole-file AES",
            Self::Hls { .. } => "HLS",
        }
    }

    /// Checks that everything the method needs is present. Runs before any
    /// transcoder call.
    pub fn validate(&self, reference: &Location) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::WholeFileAes { key, .. } => {
                require_key(self, key.as_deref())?;

                if reference.is_playlist() {
                    return Err(Error::Configuration(format!(
                        "{reference} is an HLS playlist, use HLS decryption"
                    )));
                }

                Ok(())
            }
            Self::Hls { key, key_info } => {
                if key.is_none() && key_info.is_none() {
                    require_key(self, None)?;
                }

                if !reference.is_playlist() {
                    return Err(Error::Configuration(format!(
                        "{reference} is not an HLS playlist"
                    )));
                }

                Ok(())
            }
        }
    }

    /// Produces a clear, locally playable source. Decrypted copies live in
    /// temporary files that are removed when the returned value is dropped.
    pub(crate) fn materialize<T: Transcoder + ?Sized>(
        &self,
        reference: &Location,
        transcoder: &T,
        cancel: &CancelFlag,
    ) -> Result<ClearSource> {
        self.validate(reference)?;

        match self {
            Self::None => Ok(ClearSource::Direct(reference.clone())),
            Self::WholeFileAes { key, iv } => {
                let input = reference.as_path().ok_or_else(|| {
                    Error::Configuration(format!(
                        "{reference} must be a local file for whole-file AES decryption"
                    ))
                })?;
                let key = require_key(self, key.as_deref())?;
                let material = KeyMaterial::load(key, iv.as_deref())?;
                let temp = temp_path(reference.extension().as_deref().unwrap_or("mp4"))?;

                info!("Decrypting {} into a temporary file", input.display());
                cipher::decrypt_file(input, &temp, &material)?;
                Ok(ClearSource::temp(temp))
            }
            Self::Hls { key, key_info } => {
                let info = key_info.as_deref().map(KeyInfo::read).transpose()?;
                let key = match (key, &info) {
                    (Some(key), _) => read_raw(key)?,
                    (None, Some(info)) => info.read_key()?,
                    (None, None) => read_raw(require_key(self, None)?)?,
                };
                let iv = info.and_then(|x| x.iv);

                if iv.is_none() {
                    warn!("No IV given for {reference}, using the playlist's IV or sequence numbers");
                }

                let temp = temp_path("mp4")?;
                info!("Decrypting {reference} into a temporary file");
                engine::decrypt_hls_with(transcoder, reference, &temp, &key, iv, cancel)?;
                Ok(ClearSource::temp(temp))
            }
        }
    }
}

fn require_key<'a>(decryption: &Decryption, key: Option<&'a Path>) -> Result<&'a Path> {
    key.ok_or_else(|| {
        Error::Configuration(format!(
            "{} decryption requires a key file",
            decryption.method()
        ))
    })
}

fn temp_path(extension: &str) -> Result<TempPath> {
    Ok(tempfile::Builder::new()
        .prefix(".thumbtrail-clear-")
        .suffix(&format!(".{extension}"))
        .tempfile()
        .at(std::env::temp_dir())?
        .into_temp_path())
}

/// A clear source ready for probing and frame extraction.
pub(crate) enum ClearSource {
    Direct(Location),
    Temp {
        /// Removes the decrypted file when dropped.
        _guard: TempPath,
        location: Location,
    },
}

impl ClearSource {
    fn temp(path: TempPath) -> Self {
        let location = Location::from(path.to_path_buf());
        Self::Temp {
            _guard: path,
            location,
        }
    }

    pub(crate) fn location(&self) -> &Location {
        match self {
            Self::Direct(location) | Self::Temp { location, .. } => location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let video = Location::from("video.mp4");
        let playlist = Location::from("stream/output.m3u8");

        assert!(Decryption::None.validate(&playlist).is_ok());

        let missing = Decryption::WholeFileAes { key: None, iv: None };
        assert!(missing.validate(&video).unwrap_err().is_configuration());

        let whole = Decryption::WholeFileAes {
            key: Some("k.key".into()),
            iv: None,
        };
        assert!(whole.validate(&video).is_ok());
        assert!(whole.validate(&playlist).unwrap_err().is_configuration());

        let missing = Decryption::Hls {
            key: None,
            key_info: None,
        };
        assert!(missing.validate(&playlist).unwrap_err().is_configuration());

        let hls = Decryption::Hls {
            key: None,
            key_info: Some("hls_key_info.txt".into()),
        };
        assert!(hls.validate(&playlist).is_ok());
        assert!(hls.validate(&video).unwrap_err().is_configuration());
    }
}
