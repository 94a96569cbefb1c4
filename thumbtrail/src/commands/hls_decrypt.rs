use super::{TranscoderArgs, hex_or_file};
use anyhow::Result;
use clap::Args;
use log::info;
use std::path::PathBuf;
use thumbtrail_core::{CancelFlag, CryptoEngine, KeyInfo, Location};

/// Decrypt an AES-128 HLS playlist into a single video file.
#[derive(Debug, Clone, Args)]
pub struct HlsDecrypt {
    /// .m3u8 file or http(s):// url of a media playlist.
    #[arg(required = true)]
    pub input: String,

    /// Path for the output video (.mp4, .mkv, .ts etc.).
    #[arg(short, long, required = true)]
    pub output: PathBuf,

    /// Key as 32 hex characters or as path of a raw key file.
    #[arg(short, long, value_name = "HEX | FILE", required_unless_present = "key_info")]
    pub key: Option<String>,

    /// IV as 32 hex characters or as path of a raw IV file.
    /// By default the playlist's IV is used, then the segment sequence number.
    #[arg(long, value_name = "HEX | FILE")]
    pub iv: Option<String>,

    /// Key-info file, its key file and IV are used where --key and --iv are not given.
    #[arg(long)]
    pub key_info: Option<PathBuf>,

    #[command(flatten)]
    pub transcoder: TranscoderArgs,
}

impl HlsDecrypt {
    pub fn execute(self, cancel: CancelFlag) -> Result<()> {
        let info = self.key_info.as_deref().map(KeyInfo::read).transpose()?;

        let key = match (&self.key, &info) {
            (Some(key), _) => hex_or_file(key)?,
            (None, Some(info)) => hex::encode(info.read_key()?),
            (None, None) => anyhow::bail!("Either --key or --key-info is required."),
        };
        let iv = match (&self.iv, &info) {
            (Some(iv), _) => Some(hex_or_file(iv)?),
            (None, Some(info)) => info.iv_hex(),
            (None, None) => None,
        };

        let engine = CryptoEngine::new(self.transcoder.ffmpeg()?).cancel_flag(cancel);
        engine.decrypt_hls(&Location::parse(&self.input), &self.output, &key, iv.as_deref())?;

        info!("Decrypted video written to {}", self.output.display());
        Ok(())
    }
}
