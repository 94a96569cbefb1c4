use crate::{Error, KEY_LEN, Result, error::IoContext, keys::parse_hex_16};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

/// HLS key-info descriptor in the three line layout understood by ffmpeg's
/// `-hls_key_info_file`:
///
/// ```text
/// <key uri written into EXT-X-KEY>
/// <path of the raw key file>
/// <iv as hex> (optional)
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyInfo {
    pub uri: String,
    pub key_path: PathBuf,
    pub iv: Option<[u8; KEY_LEN]>,
}

impl KeyInfo {
    pub fn iv_hex(&self) -> Option<String> {
        self.iv.map(hex::encode)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().map(str::trim).filter(|x| !x.is_empty());

        let uri = lines
            .next()
            .ok_or_else(|| Error::Format("key-info is empty".into()))?;
        let key_path = lines
            .next()
            .ok_or_else(|| Error::Format("key-info has no key file path line".into()))?;
        let iv = lines
            .next()
            .map(|x| {
                parse_hex_16(x)
                    .map_err(|e| Error::Format(format!("key-info IV line '{x}': {e}")))
            })
            .transpose()?;

        if lines.next().is_some() {
            return Err(Error::Format(
                "key-info has more than three lines".into(),
            ));
        }

        Ok(Self {
            uri: uri.to_owned(),
            key_path: PathBuf::from(key_path),
            iv,
        })
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).at(path)?;

        Self::parse(&text).map_err(|e| match e {
            Error::Format(reason) => Error::Format(format!("{}: {}", path.display(), reason)),
            e => e,
        })
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_string()).at(path)
    }

    /// Reads the raw key file referenced by the second line.
    pub fn read_key(&self) -> Result<[u8; KEY_LEN]> {
        crate::keys::read_raw(&self.key_path)
    }
}

impl fmt::Display for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.uri)?;
        writeln!(f, "{}", self.key_path.display())?;

        if let Some(iv) = self.iv_hex() {
            writeln!(f, "{iv}")?;
        }

        Ok(())
    }
}
