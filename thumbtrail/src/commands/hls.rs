use super::TranscoderArgs;
use anyhow::Result;
use clap::Args;
use log::info;
use std::path::PathBuf;
use thumbtrail_core::{CancelFlag, CryptoEngine, HlsOptions, Location};

/// Convert a video into an HLS playlist, optionally encrypting segments with AES-128.
#[derive(Debug, Clone, Args)]
pub struct Hls {
    /// Video file or http(s):// url.
    #[arg(required = true)]
    pub input: String,

    /// Directory for the playlist, segments and key files.
    #[arg(short, long, required = true)]
    pub directory: PathBuf,

    /// Encrypt segments while writing them.
    /// A fresh key, IV and key-info file are written into the output directory.
    #[arg(short, long)]
    pub encrypt: bool,

    /// Prefix for the key uri written into the playlist, e.g. https://keys.example.com/stream1.
    /// By default the bare key file name is used.
    #[arg(long, requires = "encrypt")]
    pub key_url: Option<String>,

    /// Name of the playlist file.
    #[arg(long, help_heading = "Segment Options", default_value = "output.m3u8")]
    pub playlist_name: String,

    /// Target duration of each segment in seconds.
    #[arg(long, help_heading = "Segment Options", default_value_t = 10)]
    pub segment_duration: u32,

    /// File name pattern of segments, %03d is replaced by the segment number.
    #[arg(long, help_heading = "Segment Options", default_value = "segment_%03d.ts")]
    pub segment_pattern: String,

    #[command(flatten)]
    pub transcoder: TranscoderArgs,
}

impl Hls {
    pub fn execute(self, cancel: CancelFlag) -> Result<()> {
        let mut engine = CryptoEngine::new(self.transcoder.ffmpeg()?)
            .hls_options(HlsOptions {
                segment_duration: self.segment_duration,
                playlist_name: self.playlist_name,
                segment_pattern: self.segment_pattern,
            })
            .cancel_flag(cancel);

        if let Some(key_url) = self.key_url {
            engine = engine.key_url(key_url);
        }

        let input = Location::parse(&self.input);

        let playlist = if self.encrypt {
            let key = engine.generate_key_info(&self.directory)?;
            info!("Key {} IV {}", key.material.key_hex(), key.iv_hex());
            engine.convert_to_hls(&input, &self.directory, Some(key.key_info_path.as_path()))?
        } else {
            engine.convert_to_hls(&input, &self.directory, None)?
        };

        info!("Playlist written to {}", playlist.display());
        Ok(())
    }
}
