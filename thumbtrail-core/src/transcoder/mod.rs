//! The external transcoder collaborator.
//!
//! Everything that touches media containers goes through [`Transcoder`] so
//! the crypto and thumbnail pipelines can be driven by ffmpeg in production
//! and by a fake in tests.

mod ffmpeg;

pub use ffmpeg::{Ffmpeg, find_binary};

use crate::{Location, Result};
use std::path::{Path, PathBuf};

/// Thumbnail dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::str::FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let w = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
        let h = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
        Ok(Self::new(w, h))
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Segmenting options passed along with every HLS conversion.
#[derive(Clone, Debug)]
pub struct HlsOptions {
    /// Target segment duration in seconds.
    pub segment_duration: u32,
    pub playlist_name: String,
    /// printf style pattern, `%03d` is replaced by the segment number.
    pub segment_pattern: String,
}

impl Default for HlsOptions {
    fn default() -> Self {
        Self {
            segment_duration: 10,
            playlist_name: "output.m3u8".to_owned(),
            segment_pattern: "segment_%03d.ts".to_owned(),
        }
    }
}

pub trait Transcoder: Send + Sync {
    /// Segments `input` into an HLS playlist under `output_dir`, encrypting
    /// segments as they are written when `key_info` is given. Returns the
    /// playlist path.
    fn to_hls(
        &self,
        input: &Location,
        output_dir: &Path,
        key_info: Option<&Path>,
        options: &HlsOptions,
    ) -> Result<PathBuf>;

    /// Rewraps `input` into the container implied by `output`'s extension
    /// without re-encoding.
    fn remux(&self, input: &Path, output: &Path) -> Result<()>;

    /// Duration of `input` in seconds.
    fn duration(&self, input: &Location) -> Result<f64>;

    /// Writes one frame at `timestamp` seconds, scaled to `size`, to `output`.
    /// The image format follows `output`'s extension.
    fn extract_frame(&self, input: &Location, timestamp: f64, size: Size, output: &Path)
    -> Result<()>;
}

impl<T: Transcoder + ?Sized> Transcoder for &T {
    fn to_hls(
        &self,
        input: &Location,
        output_dir: &Path,
        key_info: Option<&Path>,
        options: &HlsOptions,
    ) -> Result<PathBuf> {
        (**self).to_hls(input, output_dir, key_info, options)
    }

    fn remux(&self, input: &Path, output: &Path) -> Result<()> {
        (**self).remux(input, output)
    }

    fn duration(&self, input: &Location) -> Result<f64> {
        (**self).duration(input)
    }

    fn extract_frame(
        &self,
        input: &Location,
        timestamp: f64,
        size: Size,
        output: &Path,
    ) -> Result<()> {
        (**self).extract_frame(input, timestamp, size, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_parse() {
        assert_eq!("160x90".parse::<Size>().unwrap(), Size::new(160, 90));
        assert_eq!("320X180".parse::<Size>().unwrap().to_string(), "320x180");
        assert!("160".parse::<Size>().is_err());
        assert!("ax90".parse::<Size>().is_err());
    }
}
