use anyhow::{Result, bail};
use clap::Args;
use log::info;
use std::path::PathBuf;
use thumbtrail_core::{KeyMaterial, Location};

/// Decrypt a whole video file encrypted with AES-128-CBC.
#[derive(Debug, Clone, Args)]
pub struct Decrypt {
    /// Encrypted video file.
    #[arg(required = true)]
    pub input: PathBuf,

    /// Path for the decrypted output file.
    /// Nothing is written when decryption fails.
    #[arg(short, long, required = true)]
    pub output: PathBuf,

    /// Raw key file.
    #[arg(short, long, required = true)]
    pub key: PathBuf,

    /// Raw IV file.
    /// Without it the all zero IV is used.
    #[arg(long)]
    pub iv: Option<PathBuf>,
}

impl Decrypt {
    pub fn execute(self) -> Result<()> {
        if Location::from(self.input.as_path()).is_playlist() {
            bail!("Use hls-decrypt for HLS playlists.");
        }

        let material = KeyMaterial::load(&self.key, self.iv.as_deref())?;
        let bytes = thumbtrail_core::cipher::decrypt_file(&self.input, &self.output, &material)?;
        info!("Decrypted {} bytes into {}", bytes, self.output.display());
        Ok(())
    }
}
