use anyhow::{Result, bail};
use clap::Args;
use log::{info, warn};
use std::path::PathBuf;
use thumbtrail_core::{KeyMaterial, Location};

/// Encrypt a whole video file with AES-128-CBC.
#[derive(Debug, Clone, Args)]
pub struct Encrypt {
    /// Video file to encrypt.
    #[arg(required = true)]
    pub input: PathBuf,

    /// Path for the encrypted output file.
    #[arg(short, long, required = true)]
    pub output: PathBuf,

    /// Existing raw key file to encrypt with.
    /// By default a fresh key is generated and saved as <OUTPUT>.key.
    #[arg(short, long)]
    pub key: Option<PathBuf>,

    /// Raw IV file used together with --key.
    /// Without it the all zero IV is used.
    #[arg(long, requires = "key")]
    pub iv: Option<PathBuf>,

    /// Also generate a random IV and save it as <OUTPUT>.iv.
    /// Decrypting then needs both files.
    #[arg(long, conflicts_with = "key")]
    pub random_iv: bool,
}

impl Encrypt {
    pub fn execute(self) -> Result<()> {
        if Location::from(self.input.as_path()).is_playlist() {
            bail!("Use hls-encrypt for HLS playlists.");
        }

        if self.input == self.output {
            bail!("Input and output must be different files.");
        }

        let material = match &self.key {
            Some(key) => KeyMaterial::load(key, self.iv.as_deref())?,
            None if self.random_iv => {
                let material = KeyMaterial::generate(&mut rand::rng());
                let key = sibling(&self.output, "key");
                let iv = sibling(&self.output, "iv");
                material.save(&key, &iv)?;
                warn!(
                    "Keep {} and {} to decrypt {} later",
                    key.display(),
                    iv.display(),
                    self.output.display()
                );
                material
            }
            None => {
                let material = KeyMaterial::generate_key(&mut rand::rng());
                let key = sibling(&self.output, "key");
                material.save_key(&key)?;
                warn!(
                    "Keep {} to decrypt {} later",
                    key.display(),
                    self.output.display()
                );
                material
            }
        };

        let bytes = thumbtrail_core::cipher::encrypt_file(&self.input, &self.output, &material)?;
        info!("Encrypted {} bytes into {}", bytes, self.output.display());
        Ok(())
    }
}

fn sibling(path: &std::path::Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Decrypt;
    use std::fs;

    fn encrypt(dir: &std::path::Path, random_iv: bool) -> (PathBuf, Vec<u8>) {
        let input = dir.join("video.mp4");
        let data = (0..5000_u32).map(|x| (x % 251) as u8).collect::<Vec<_>>();
        fs::write(&input, &data).unwrap();

        let output = dir.join("video.enc");
        Encrypt {
            input,
            output: output.clone(),
            key: None,
            iv: None,
            random_iv,
        }
        .execute()
        .unwrap();

        (output, data)
    }

    #[test]
    fn test_generated_key_decrypts_without_iv() {
        let dir = tempfile::tempdir().unwrap();
        let (output, data) = encrypt(dir.path(), false);

        assert!(dir.path().join("video.enc.key").exists());
        assert!(!dir.path().join("video.enc.iv").exists());

        let decrypted = dir.path().join("video.dec.mp4");
        Decrypt {
            input: output,
            output: decrypted.clone(),
            key: dir.path().join("video.enc.key"),
            iv: None,
        }
        .execute()
        .unwrap();

        assert_eq!(fs::read(decrypted).unwrap(), data);
    }

    #[test]
    fn test_random_iv_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let (output, data) = encrypt(dir.path(), true);

        let decrypted = dir.path().join("video.dec.mp4");
        Decrypt {
            input: output,
            output: decrypted.clone(),
            key: dir.path().join("video.enc.key"),
            iv: Some(dir.path().join("video.enc.iv")),
        }
        .execute()
        .unwrap();

        assert_eq!(fs::read(decrypted).unwrap(), data);
    }
}
