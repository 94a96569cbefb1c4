use anyhow::Result;
use clap::Args;
use colored::Colorize;
use log::info;
use std::path::PathBuf;
use thumbtrail_core::KeyMaterial;

/// Generate a random AES-128 key and IV as raw 16 byte files.
#[derive(Debug, Clone, Args)]
pub struct Keygen {
    /// Path for the raw key file.
    #[arg(short, long, default_value = "video.key")]
    pub key: PathBuf,

    /// Path for the raw IV file.
    #[arg(short, long, default_value = "video.iv")]
    pub iv: PathBuf,
}

impl Keygen {
    pub fn execute(self) -> Result<()> {
        let material = KeyMaterial::generate(&mut rand::rng());
        material.save(&self.key, &self.iv)?;

        info!(
            "Key {} written to {}",
            material.key_hex().bold(),
            self.key.display()
        );
        info!(
            "IV  {} written to {}",
            material.iv_hex().bold(),
            self.iv.display()
        );
        Ok(())
    }
}
