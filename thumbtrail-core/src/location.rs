use crate::{Error, Result, error::IoContext};
use reqwest::{Url, blocking::Client};
use std::{
    ffi::OsString,
    fmt, fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

/// A video, playlist or segment reference: a local path or an http(s) url.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    Path(PathBuf),
    Url(Url),
}

impl Location {
    pub fn parse(input: &str) -> Self {
        if (input.starts_with("http://") || input.starts_with("https://"))
            && let Ok(url) = input.parse::<Url>()
        {
            return Self::Url(url);
        }

        Self::Path(PathBuf::from(input))
    }

    /// Resolves `uri` relative to this location, like a player resolves
    /// segment uris relative to their playlist.
    pub fn join(&self, uri: &str) -> Result<Self> {
        if let Self::Url(url) = Self::parse(uri) {
            return Ok(Self::Url(url));
        }

        match self {
            Self::Path(path) => Ok(Self::Path(
                path.parent().unwrap_or(Path::new("")).join(uri),
            )),
            Self::Url(base) => base
                .join(uri)
                .map(Self::Url)
                .map_err(|e| Error::Format(format!("cannot resolve '{uri}' against {base}: {e}"))),
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Url(_) => None,
        }
    }

    /// Last path component, query and fragment excluded.
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Path(path) => path.file_name().map(|x| x.to_string_lossy().into_owned()),
            Self::Url(url) => url
                .path_segments()
                .and_then(|mut x| x.next_back())
                .filter(|x| !x.is_empty())
                .map(str::to_owned),
        }
    }

    pub fn extension(&self) -> Option<String> {
        self.file_name()
            .and_then(|x| x.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()))
    }

    pub fn is_playlist(&self) -> bool {
        matches!(self.extension().as_deref(), Some("m3u8" | "m3u"))
    }

    /// Value handed to the transcoder as its input argument.
    pub fn as_arg(&self) -> OsString {
        match self {
            Self::Path(path) => path.as_os_str().to_owned(),
            Self::Url(url) => OsString::from(url.as_str()),
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            Self::Path(path) => path.exists(),
            Self::Url(_) => true,
        }
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            Self::Path(path) => fs::read(path).at(path),
            Self::Url(url) => {
                let response = client()?.get(url.clone()).send()?.error_for_status()?;
                Ok(response.bytes()?.to_vec())
            }
        }
    }
}

impl From<PathBuf> for Location {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for Location {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_owned())
    }
}

impl From<&str> for Location {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

fn client() -> Result<&'static Client> {
    static CLIENT: OnceLock<Client> = OnceLock::new();

    if let Some(client) = CLIENT.get() {
        return Ok(client);
    }

    let client = Client::builder()
        .user_agent(concat!("thumbtrail/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(CLIENT.get_or_init(|| client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_join_paths() {
        let playlist = Location::parse("output/test1/output.m3u8");
        assert!(playlist.is_playlist());
        assert_eq!(
            playlist.join("segment_000.ts").unwrap(),
            Location::Path(PathBuf::from("output/test1/segment_000.ts"))
        );
        assert_eq!(
            Location::parse("output.m3u8").join("a.ts").unwrap(),
            Location::Path(PathBuf::from("a.ts"))
        );
    }

    #[test]
    fn test_parse_and_join_urls() {
        let playlist = Location::parse("https://cdn.test/live/index.m3u8?token=1");
        assert!(playlist.is_playlist());
        assert_eq!(playlist.file_name().as_deref(), Some("index.m3u8"));
        assert_eq!(
            playlist.join("seg/1.ts").unwrap().to_string(),
            "https://cdn.test/live/seg/1.ts"
        );
        assert_eq!(
            Location::parse("local/index.m3u8")
                .join("https://other.test/1.ts")
                .unwrap()
                .to_string(),
            "https://other.test/1.ts"
        );
    }

    #[test]
    fn test_extension() {
        assert_eq!(
            Location::parse("a/b/Video.MP4").extension().as_deref(),
            Some("mp4")
        );
        assert!(!Location::parse("video.mp4").is_playlist());
        assert_eq!(Location::parse("noext").extension(), None);
    }
}
