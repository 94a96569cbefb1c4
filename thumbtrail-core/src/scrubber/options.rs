use crate::{Error, Result, transcoder::Size};
use serde::Serialize;
use std::fmt;

/// Image encoding used for extracted thumbnails and sprite sheets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    pub(crate) fn as_image_format(&self) -> image::ImageFormat {
        match self {
            Self::Jpg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Webp => image::ImageFormat::WebP,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            x => Err(format!("unsupported image format '{x}'")),
        }
    }
}

/// Options for [`Scrubber::generate_thumbnails_and_webvtt`](super::Scrubber::generate_thumbnails_and_webvtt).
///
/// ```
/// use thumbtrail_core::{ImageFormat, Size, ThumbnailOptions};
///
/// let options = ThumbnailOptions::new(2.0, Size::new(160, 90))
///     .format(ImageFormat::Png)
///     .merge(true)
///     .absolute_paths("https://cdn.example.com/thumbs");
///
/// assert!(options.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ThumbnailOptions {
    /// Seconds between two samples.
    pub interval: f64,
    pub size: Size,
    pub format: ImageFormat,
    /// Tile samples into sprite sheets instead of one image per sample.
    pub merge: bool,
    pub absolute_paths: bool,
    pub url_prefix: Option<String>,
    pub max_sheet_width: u32,
    pub max_sheet_height: u32,
}

impl ThumbnailOptions {
    pub const DEFAULT_MAX_SHEET: u32 = 4096;
    /// Largest sheet side any supported format can encode (WebP).
    pub const MAX_SHEET_SIDE: u32 = 16383;

    pub fn new(interval: f64, size: Size) -> Self {
        Self {
            interval,
            size,
            format: ImageFormat::default(),
            merge: false,
            absolute_paths: false,
            url_prefix: None,
            max_sheet_width: Self::DEFAULT_MAX_SHEET,
            max_sheet_height: Self::DEFAULT_MAX_SHEET,
        }
    }

    pub fn format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    /// Reference images in the cue file as `<prefix>/<name>`.
    pub fn absolute_paths<S: Into<String>>(mut self, url_prefix: S) -> Self {
        self.absolute_paths = true;
        self.url_prefix = Some(url_prefix.into());
        self
    }

    pub fn max_sheet_size(mut self, width: u32, height: u32) -> Self {
        self.max_sheet_width = width;
        self.max_sheet_height = height;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.interval.is_finite() && self.interval > 0.0) {
            return Err(Error::Configuration(format!(
                "interval must be a positive number of seconds, got {}",
                self.interval
            )));
        }

        if self.size.width == 0 || self.size.height == 0 {
            return Err(Error::Configuration(format!(
                "thumbnail size {} has a zero dimension",
                self.size
            )));
        }

        let prefix = self.url_prefix.as_deref().filter(|x| !x.is_empty());

        if self.absolute_paths && prefix.is_none() {
            return Err(Error::Configuration(
                "absolute paths require a thumbnail url prefix".into(),
            ));
        }

        if !self.absolute_paths && prefix.is_some() {
            return Err(Error::Configuration(
                "a thumbnail url prefix is only used with absolute paths".into(),
            ));
        }

        if self.merge
            && (self.max_sheet_width > Self::MAX_SHEET_SIDE
                || self.max_sheet_height > Self::MAX_SHEET_SIDE)
        {
            return Err(Error::Configuration(format!(
                "sprite sheet size {}x{} exceeds {}x{}",
                self.max_sheet_width,
                self.max_sheet_height,
                Self::MAX_SHEET_SIDE,
                Self::MAX_SHEET_SIDE
            )));
        }

        if self.merge
            && (self.size.width > self.max_sheet_width || self.size.height > self.max_sheet_height)
        {
            return Err(Error::Configuration(format!(
                "thumbnail size {} does not fit in a {}x{} sprite sheet",
                self.size, self.max_sheet_width, self.max_sheet_height
            )));
        }

        Ok(())
    }

    /// Image reference written into a cue for `name`.
    pub(crate) fn reference(&self, name: &str) -> String {
        match (&self.url_prefix, self.absolute_paths) {
            (Some(prefix), true) => format!("{}/{}", prefix.trim_end_matches('/'), name),
            _ => name.to_owned(),
        }
    }
}
