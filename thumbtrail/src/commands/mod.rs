mod decrypt;
mod encrypt;
mod hls;
mod hls_decrypt;
mod hls_encrypt;
mod keygen;
mod thumbs;

pub use decrypt::Decrypt;
pub use encrypt::Encrypt;
pub use hls::Hls;
pub use hls_decrypt::HlsDecrypt;
pub use hls_encrypt::HlsEncrypt;
pub use keygen::Keygen;
pub use thumbs::Thumbs;

use anyhow::{Result, bail};
use clap::{ArgAction, ColorChoice, Parser, Subcommand};
use log::LevelFilter;
use std::{path::PathBuf, time::Duration};
use thumbtrail_core::{CancelFlag, Ffmpeg, KEY_LEN, read_raw};

/// Encrypt and decrypt videos and HLS playlists, and generate thumbnail scrubbing tracks.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// When to output colored text.
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Only print warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print more details, use twice for even more.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Decrypt(Decrypt),
    Encrypt(Encrypt),
    Hls(Hls),
    HlsDecrypt(HlsDecrypt),
    HlsEncrypt(HlsEncrypt),
    Keygen(Keygen),
    Thumbs(Thumbs),
}

impl Args {
    pub fn log_level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => LevelFilter::Warn,
            (false, 0) => LevelFilter::Info,
            (false, 1) => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn execute(self, cancel: CancelFlag) -> Result<()> {
        match self.command {
            Commands::Decrypt(args) => args.execute(),
            Commands::Encrypt(args) => args.execute(),
            Commands::Hls(args) => args.execute(cancel),
            Commands::HlsDecrypt(args) => args.execute(cancel),
            Commands::HlsEncrypt(args) => args.execute(cancel),
            Commands::Keygen(args) => args.execute(),
            Commands::Thumbs(args) => args.execute(cancel),
        }
    }
}

/// Options shared by every command that runs ffmpeg.
#[derive(Debug, Clone, clap::Args)]
pub struct TranscoderArgs {
    /// Path of ffmpeg binary.
    /// By default it is searched in the current directory and then in PATH.
    #[arg(long, help_heading = "Transcoder Options")]
    pub ffmpeg: Option<PathBuf>,

    /// Path of ffprobe binary.
    /// By default it is searched in the current directory and then in PATH.
    #[arg(long, help_heading = "Transcoder Options")]
    pub ffprobe: Option<PathBuf>,

    /// Seconds after which a single ffmpeg or ffprobe run is killed.
    #[arg(long, help_heading = "Transcoder Options", default_value_t = 600)]
    pub timeout: u64,
}

impl TranscoderArgs {
    pub fn ffmpeg(&self) -> Result<Ffmpeg> {
        Ok(Ffmpeg::discover(self.ffmpeg.clone(), self.ffprobe.clone())?
            .timeout(Duration::from_secs(self.timeout)))
    }
}

/// Accepts either a path of a raw 16 byte file or 32 hex characters.
pub fn hex_or_file(value: &str) -> Result<String> {
    let path = PathBuf::from(value);

    if path.is_file() {
        return Ok(hex::encode(read_raw(&path)?));
    }

    let trimmed = value.trim_start_matches("0x");

    if trimmed.len() != KEY_LEN * 2 || hex::decode(trimmed).is_err() {
        bail!("'{value}' is neither a key file nor {} hex characters.", KEY_LEN * 2);
    }

    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_thumbs() {
        let args = Args::try_parse_from([
            "thumbtrail",
            "-v",
            "thumbs",
            "stream/output.m3u8",
            "-d",
            "thumbs",
            "--interval",
            "2",
            "--size",
            "320x180",
            "--merge",
            "--decrypt",
            "hls",
            "--key-info",
            "hls_key_info.txt",
        ])
        .unwrap();

        assert_eq!(args.log_level(), LevelFilter::Debug);

        let Commands::Thumbs(thumbs) = args.command else {
            panic!("expected thumbs");
        };
        assert_eq!(thumbs.interval, 2.0);
        assert_eq!(thumbs.size, thumbtrail_core::Size::new(320, 180));
        assert!(thumbs.merge);
        assert_eq!(thumbs.key_info, Some(PathBuf::from("hls_key_info.txt")));
    }

    #[test]
    fn test_parse_quiet() {
        let args = Args::try_parse_from(["thumbtrail", "--quiet", "keygen"]).unwrap();
        assert_eq!(args.log_level(), LevelFilter::Warn);
        assert!(Args::try_parse_from(["thumbtrail", "-q", "-v", "keygen"]).is_err());
    }

    #[test]
    fn test_hex_or_file() {
        let key = "000102030405060708090a0b0c0d0e0f";
        assert_eq!(hex_or_file(key).unwrap(), key);
        assert_eq!(hex_or_file(&format!("0x{key}")).unwrap(), key);
        assert!(hex_or_file("abcd").is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.bin");
        std::fs::write(&path, [0xab_u8; 16]).unwrap();
        assert_eq!(hex_or_file(path.to_str().unwrap()).unwrap(), "ab".repeat(16));
    }
}
