use crate::{
    CancelFlag, Error, KEY_LEN, KeyInfo, KeyMaterial, Location, Result,
    cipher,
    error::IoContext,
    hls::{self, Playlist},
    keys::parse_hex_16,
    transcoder::{HlsOptions, Transcoder},
};
use log::info;
use rand::{CryptoRng, RngCore, rngs::ThreadRng};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const HLS_KEY_FILE: &str = "hls_key.key";
pub const HLS_IV_FILE: &str = "hls_iv.key";
pub const HLS_KEY_INFO_FILE: &str = "hls_key_info.txt";

/// Files written by [`CryptoEngine::generate_key_info`].
#[derive(Clone, Debug)]
pub struct HlsKey {
    pub material: KeyMaterial,
    pub key_path: PathBuf,
    pub iv_path: PathBuf,
    pub key_info_path: PathBuf,
    pub key_info: KeyInfo,
}

impl HlsKey {
    pub fn iv_hex(&self) -> String {
        self.material.iv_hex()
    }
}

/// Result of [`CryptoEngine::encrypt_existing_hls`].
#[derive(Clone, Debug)]
pub struct EncryptedHls {
    pub playlist: PathBuf,
    pub key: HlsKey,
}

/// Generates keys, encrypts and decrypts whole files and HLS streams.
///
/// The random source is injected: [`CryptoEngine::new`] uses the thread
/// local CSPRNG, [`CryptoEngine::with_rng`] takes any other (seeded ones in
/// tests).
pub struct CryptoEngine<T, R = ThreadRng> {
    transcoder: T,
    rng: R,
    hls: HlsOptions,
    key_url: Option<String>,
    cancel: CancelFlag,
}

impl<T: Transcoder> CryptoEngine<T> {
    pub fn new(transcoder: T) -> Self {
        Self::with_rng(transcoder, rand::rng())
    }
}

impl<T: Transcoder, R: RngCore + CryptoRng> CryptoEngine<T, R> {
    pub fn with_rng(transcoder: T, rng: R) -> Self {
        Self {
            transcoder,
            rng,
            hls: HlsOptions::default(),
            key_url: None,
            cancel: CancelFlag::new(),
        }
    }

    pub fn hls_options(mut self, options: HlsOptions) -> Self {
        self.hls = options;
        self
    }

    /// Prefix for the key uri written into playlists, e.g.
    /// `https://keys.example.com/stream1`. Without it the bare key file name
    /// is used, which players resolve next to the playlist.
    pub fn key_url<S: Into<String>>(mut self, key_url: S) -> Self {
        self.key_url = Some(key_url.into());
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transcoder(&self) -> &T {
        &self.transcoder
    }

    pub fn generate_key_material(&mut self) -> KeyMaterial {
        KeyMaterial::generate(&mut self.rng)
    }

    /// Fresh key with [`crate::DEFAULT_IV`], for files decrypted from the key
    /// file alone.
    pub fn generate_key(&mut self) -> KeyMaterial {
        KeyMaterial::generate_key(&mut self.rng)
    }

    pub fn save_key_material<K: AsRef<Path>, I: AsRef<Path>>(
        &self,
        material: &KeyMaterial,
        key_path: K,
        iv_path: I,
    ) -> Result<()> {
        material.save(key_path, iv_path)
    }

    pub fn load_key_material<K: AsRef<Path>>(
        &self,
        key_path: K,
        iv_path: Option<&Path>,
    ) -> Result<KeyMaterial> {
        KeyMaterial::load(key_path, iv_path)
    }

    pub fn encrypt_file<I: AsRef<Path>, O: AsRef<Path>>(
        &self,
        input: I,
        output: O,
        material: &KeyMaterial,
    ) -> Result<()> {
        let (input, output) = (input.as_ref(), output.as_ref());
        reject_playlist(input, "whole file encryption")?;
        info!("Encrypting {} -> {}", input.display(), output.display());
        cipher::encrypt_file(input, output, material)?;
        Ok(())
    }

    pub fn decrypt_file<I: AsRef<Path>, O: AsRef<Path>>(
        &self,
        input: I,
        output: O,
        material: &KeyMaterial,
    ) -> Result<()> {
        let (input, output) = (input.as_ref(), output.as_ref());
        reject_playlist(input, "whole file decryption")?;
        info!("Decrypting {} -> {}", input.display(), output.display());
        cipher::decrypt_file(input, output, material)?;
        Ok(())
    }

    /// Generates fresh key material for one HLS encryption session and
    /// writes the raw key, raw IV and the key-info file into `output_dir`.
    pub fn generate_key_info<P: AsRef<Path>>(&mut self, output_dir: P) -> Result<HlsKey> {
        let material = self.generate_key_material();
        self.persist_key_info(material, output_dir.as_ref())
    }

    fn persist_key_info(&self, material: KeyMaterial, output_dir: &Path) -> Result<HlsKey> {
        fs::create_dir_all(output_dir).at(output_dir)?;

        let key_path = output_dir.join(HLS_KEY_FILE);
        let iv_path = output_dir.join(HLS_IV_FILE);
        let key_info_path = output_dir.join(HLS_KEY_INFO_FILE);

        material.save(&key_path, &iv_path)?;

        let key_info = KeyInfo {
            uri: self.key_uri(),
            key_path: key_path.clone(),
            iv: Some(*material.iv()),
        };
        key_info.write(&key_info_path)?;
        info!("Key info written to {}", key_info_path.display());

        Ok(HlsKey {
            material,
            key_path,
            iv_path,
            key_info_path,
            key_info,
        })
    }

    /// Segments `input` into HLS under `output_dir`. With `key_info` the
    /// transcoder encrypts segments while writing them.
    pub fn convert_to_hls<P: AsRef<Path>>(
        &self,
        input: &Location,
        output_dir: P,
        key_info: Option<&Path>,
    ) -> Result<PathBuf> {
        let output_dir = output_dir.as_ref();

        if !input.exists() {
            return Err(Error::NotFound {
                path: PathBuf::from(input.to_string()),
            });
        }

        if let Some(key_info) = key_info {
            // Validate before handing it to the transcoder.
            KeyInfo::read(key_info)?.read_key()?;
        }

        fs::create_dir_all(output_dir).at(output_dir)?;
        info!(
            "Converting {} to {}HLS in {}",
            input,
            if key_info.is_some() { "encrypted " } else { "" },
            output_dir.display()
        );

        self.transcoder
            .to_hls(input, output_dir, key_info, &self.hls)
    }

    /// Encrypts an existing clear HLS stream into `output_dir` with a fresh
    /// key. The source playlist and segments are left untouched.
    pub fn encrypt_existing_hls<P: AsRef<Path>>(
        &mut self,
        playlist: &Location,
        output_dir: P,
    ) -> Result<EncryptedHls> {
        let output_dir = output_dir.as_ref();
        let source = Playlist::read(playlist)?;

        if source.is_encrypted() {
            return Err(Error::Format(format!("{playlist} is already encrypted")));
        }

        fs::create_dir_all(output_dir).at(output_dir)?;

        if let Some(path) = playlist.as_path()
            && let Some(name) = path.file_name()
            && hls::same_file(path, &output_dir.join(name))
        {
            return Err(Error::Configuration(format!(
                "output directory {} would overwrite the source playlist",
                output_dir.display()
            )));
        }

        let material = self.generate_key_material();
        let key = self.persist_key_info(material, output_dir)?;
        let playlist = hls::encrypt_playlist(
            &source,
            output_dir,
            &key.material,
            &key.key_info.uri,
            &self.cancel,
        )?;

        Ok(EncryptedHls { playlist, key })
    }

    /// Decrypts an AES-128 HLS stream into a single container at `output`.
    ///
    /// IV precedence per segment: `iv_hex`, then the key tag's IV, then the
    /// segment's media sequence number.
    pub fn decrypt_hls<P: AsRef<Path>>(
        &self,
        playlist: &Location,
        output: P,
        key_hex: &str,
        iv_hex: Option<&str>,
    ) -> Result<()> {
        let key = parse_hex_16(key_hex)?;
        let iv = iv_hex.map(parse_hex_16).transpose()?;
        decrypt_hls_with(
            &self.transcoder,
            playlist,
            output.as_ref(),
            &key,
            iv,
            &self.cancel,
        )
    }

    fn key_uri(&self) -> String {
        match &self.key_url {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), HLS_KEY_FILE),
            None => HLS_KEY_FILE.to_owned(),
        }
    }
}

/// Shared by [`CryptoEngine::decrypt_hls`] and the thumbnail scrubber.
pub(crate) fn decrypt_hls_with<T: Transcoder + ?Sized>(
    transcoder: &T,
    playlist: &Location,
    output: &Path,
    key: &[u8; KEY_LEN],
    iv: Option<[u8; KEY_LEN]>,
    cancel: &CancelFlag,
) -> Result<()> {
    let source = Playlist::read(playlist)?;

    let joined = tempfile::Builder::new()
        .prefix(".thumbtrail-joined-")
        .suffix(".ts")
        .tempfile()
        .at(std::env::temp_dir())?
        .into_temp_path();

    hls::decrypt_playlist(&source, key, iv, &joined, cancel)?;

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).at(parent)?;
    }

    info!("Remuxing into {}", output.display());
    transcoder.remux(&joined, output)
}

fn reject_playlist(input: &Path, operation: &str) -> Result<()> {
    if Location::from(input).is_playlist() {
        return Err(Error::Configuration(format!(
            "{} is an HLS playlist, {} applies to single files only",
            input.display(),
            operation
        )));
    }

    Ok(())
}
