use crate::{Error, Result, error::IoContext};
use log::warn;
use rand::{CryptoRng, RngCore};
use std::{fmt, fs, path::Path};

/// Size in bytes of an AES-128 key and of a CBC initialization vector.
pub const KEY_LEN: usize = 16;

/// IV used for whole-file AES when no IV file is supplied.
pub const DEFAULT_IV: [u8; KEY_LEN] = [0; KEY_LEN];

/// AES-128 key and CBC initialization vector.
///
/// Immutable once created. The [`fmt::Debug`] output never prints key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    key: [u8; KEY_LEN],
    iv: [u8; KEY_LEN],
}

impl KeyMaterial {
    pub fn new(key: [u8; KEY_LEN], iv: [u8; KEY_LEN]) -> Self {
        Self { key, iv }
    }

    /// Key with the documented default IV ([`DEFAULT_IV`]).
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self::new(key, DEFAULT_IV)
    }

    /// Draws a fresh key from `rng` and pairs it with [`DEFAULT_IV`], for
    /// files that are decrypted without an IV file.
    pub fn generate_key<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut key = [0; KEY_LEN];
        rng.fill_bytes(&mut key);
        Self::from_key(key)
    }

    /// Draws a fresh key and IV from `rng`.
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let mut key = [0; KEY_LEN];
        let mut iv = [0; KEY_LEN];
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; KEY_LEN] {
        &self.iv
    }

    pub fn key_hex(&self) -> String {
        hex::encode(self.key)
    }

    pub fn iv_hex(&self) -> String {
        hex::encode(self.iv)
    }

    /// Writes the raw key and IV bytes to two separate files.
    pub fn save<K: AsRef<Path>, I: AsRef<Path>>(&self, key_path: K, iv_path: I) -> Result<()> {
        self.save_key(key_path)?;
        write_raw(iv_path.as_ref(), &self.iv)
    }

    /// Writes only the raw key bytes.
    pub fn save_key<K: AsRef<Path>>(&self, key_path: K) -> Result<()> {
        write_raw(key_path.as_ref(), &self.key)
    }

    /// Reads a raw key and, when `iv_path` is given, a raw IV.
    ///
    /// Without `iv_path` the IV is [`DEFAULT_IV`]. A given path that does
    /// not exist is an error, it never falls back to the default.
    pub fn load<K: AsRef<Path>>(key_path: K, iv_path: Option<&Path>) -> Result<Self> {
        let key = read_raw(key_path.as_ref())?;

        let iv = match iv_path {
            Some(iv_path) => read_raw(iv_path)?,
            None => {
                warn!(
                    "No IV file given for {}, using zero IV",
                    key_path.as_ref().display()
                );
                DEFAULT_IV
            }
        };

        Ok(Self { key, iv })
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"<redacted>")
            .field("iv", &self.iv_hex())
            .finish()
    }
}

fn write_raw(path: &Path, bytes: &[u8; KEY_LEN]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).at(parent)?;
    }

    fs::write(path, bytes).at(path)
}

/// Reads a file that must hold exactly [`KEY_LEN`] bytes.
pub fn read_raw(path: &Path) -> Result<[u8; KEY_LEN]> {
    let bytes = fs::read(path).at(path)?;

    bytes.as_slice().try_into().map_err(|_| Error::InvalidKeyLength {
        path: path.to_owned(),
        len: bytes.len(),
    })
}

/// Parses a 16-byte hex string, an optional `0x` prefix is accepted.
pub fn parse_hex_16(input: &str) -> Result<[u8; KEY_LEN]> {
    let input = input.trim();
    let input = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    let bytes = hex::decode(input)?;

    bytes.as_slice().try_into().map_err(|_| {
        Error::Format(format!(
            "expected 16 bytes (32 hex chars), got {} bytes",
            bytes.len()
        ))
    })
}
