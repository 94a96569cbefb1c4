use super::TranscoderArgs;
use anyhow::Result;
use clap::Args;
use log::info;
use std::path::PathBuf;
use thumbtrail_core::{CancelFlag, CryptoEngine, Location};

/// Encrypt the segments of an existing clear HLS playlist with a fresh AES-128 key.
/// The source playlist and segments are left untouched.
#[derive(Debug, Clone, Args)]
pub struct HlsEncrypt {
    /// .m3u8 file or http(s):// url of a media playlist.
    #[arg(required = true)]
    pub input: String,

    /// Directory for the encrypted playlist, segments and key files.
    /// Must differ from the directory of the source playlist.
    #[arg(short, long, required = true)]
    pub directory: PathBuf,

    /// Prefix for the key uri written into the playlist, e.g. https://keys.example.com/stream1.
    /// By default the bare key file name is used.
    #[arg(long)]
    pub key_url: Option<String>,

    #[command(flatten)]
    pub transcoder: TranscoderArgs,
}

impl HlsEncrypt {
    pub fn execute(self, cancel: CancelFlag) -> Result<()> {
        let mut engine = CryptoEngine::new(self.transcoder.ffmpeg()?).cancel_flag(cancel);

        if let Some(key_url) = self.key_url {
            engine = engine.key_url(key_url);
        }

        let encrypted = engine.encrypt_existing_hls(&Location::parse(&self.input), &self.directory)?;

        info!(
            "Key {} IV {}",
            encrypted.key.material.key_hex(),
            encrypted.key.iv_hex()
        );
        info!("Playlist written to {}", encrypted.playlist.display());
        Ok(())
    }
}
