use super::TranscoderArgs;
use anyhow::Result;
use clap::{Args, ValueEnum};
use log::info;
use std::path::PathBuf;
use thumbtrail_core::{
    CancelFlag, Decryption, ImageFormat, Location, Scrubber, Size, ThumbnailOptions,
};

/// Generate thumbnails, sprite sheets and a WebVTT scrubbing track from a video.
/// Encrypted sources are decrypted into a temporary file first.
#[derive(Debug, Clone, Args)]
pub struct Thumbs {
    /// Video file, .m3u8 file or http(s):// url.
    #[arg(required = true)]
    pub input: String,

    /// Directory for thumbnails, sprite sheets and thumbnails.vtt.
    #[arg(short, long, required = true)]
    pub directory: PathBuf,

    /// Seconds between two thumbnails.
    #[arg(short, long, default_value_t = 10.0)]
    pub interval: f64,

    /// Thumbnail size.
    #[arg(short, long, value_name = "WIDTHxHEIGHT", default_value = "160x90")]
    pub size: Size,

    /// Image format of thumbnails and sprite sheets.
    #[arg(short, long, value_name = "jpg|png|webp", default_value = "jpg")]
    pub format: ImageFormat,

    /// Tile thumbnails into sprite sheets and reference regions with #xywh= in the cue file.
    #[arg(short, long)]
    pub merge: bool,

    /// Maximum sprite sheet size, thumbnails that do not fit start a new sheet.
    #[arg(long, value_name = "WIDTHxHEIGHT", default_value = "4096x4096")]
    pub max_sheet: Size,

    /// Reference images in the cue file as <URL_PREFIX>/<name> instead of relative paths.
    #[arg(long)]
    pub url_prefix: Option<String>,

    /// Print the generated thumbnail set in json format.
    #[arg(long)]
    pub json: bool,

    /// How the input is encrypted.
    #[arg(long, help_heading = "Decrypt Options", value_enum, default_value_t = Method::None)]
    pub decrypt: Method,

    /// Raw key file.
    #[arg(short, long, help_heading = "Decrypt Options")]
    pub key: Option<PathBuf>,

    /// Raw IV file for --decrypt aes.
    /// Without it the all zero IV is used.
    #[arg(long, help_heading = "Decrypt Options")]
    pub iv: Option<PathBuf>,

    /// Key-info file for --decrypt hls, supplies the key file and IV when --key is not given.
    #[arg(long, help_heading = "Decrypt Options")]
    pub key_info: Option<PathBuf>,

    #[command(flatten)]
    pub transcoder: TranscoderArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Method {
    None,
    Aes,
    Hls,
}

impl Thumbs {
    pub fn execute(self, cancel: CancelFlag) -> Result<()> {
        let decryption = match self.decrypt {
            Method::None => Decryption::None,
            Method::Aes => Decryption::WholeFileAes {
                key: self.key,
                iv: self.iv,
            },
            Method::Hls => Decryption::Hls {
                key: self.key,
                key_info: self.key_info,
            },
        };

        let mut options = ThumbnailOptions::new(self.interval, self.size)
            .format(self.format)
            .merge(self.merge)
            .max_sheet_size(self.max_sheet.width, self.max_sheet.height);

        if let Some(url_prefix) = self.url_prefix {
            options = options.absolute_paths(url_prefix);
        }

        let set = Scrubber::new(
            Location::parse(&self.input),
            &self.directory,
            self.transcoder.ffmpeg()?,
        )
        .decryption(decryption)
        .cancel_flag(cancel)
        .generate_thumbnails_and_webvtt(&options)?;

        if self.json {
            serde_json::to_writer_pretty(std::io::stdout(), &set)?;
            println!();
        } else {
            info!(
                "{} thumbnails in {} file(s), track written to {}",
                set.thumbnails.len(),
                if set.sheets.is_empty() {
                    set.thumbnails.len()
                } else {
                    set.sheets.len()
                },
                set.vtt.display()
            );
        }

        Ok(())
    }
}
