use crate::{Error, KEY_LEN, Location, Result, cipher::write_atomic, keys::parse_hex_16};
use m3u8_rs::{KeyMethod, MediaPlaylist};
use std::path::Path;

/// A parsed media playlist together with the location it was read from.
#[derive(Clone, Debug)]
pub struct Playlist {
    pub location: Location,
    pub media: MediaPlaylist,
}

/// How a single segment is protected, resolved from the key tags in effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegmentCipher {
    Clear,
    Aes128 {
        /// IV attribute of the key tag, if any.
        iv: Option<[u8; KEY_LEN]>,
        /// Media sequence number of the segment.
        sequence: u64,
    },
}

impl SegmentCipher {
    /// IV to use for this segment: `explicit`, else the key tag's IV, else
    /// the media sequence number as a big endian 128-bit value.
    pub fn iv(&self, explicit: Option<[u8; KEY_LEN]>) -> Option<[u8; KEY_LEN]> {
        match self {
            Self::Clear => None,
            Self::Aes128 { iv, sequence } => Some(
                explicit
                    .or(*iv)
                    .unwrap_or_else(|| (*sequence as u128).to_be_bytes()),
            ),
        }
    }
}

impl Playlist {
    pub fn read(location: &Location) -> Result<Self> {
        let bytes = location.read()?;

        match m3u8_rs::parse_playlist_res(&bytes) {
            Ok(m3u8_rs::Playlist::MediaPlaylist(media)) => Ok(Self {
                location: location.clone(),
                media,
            }),
            Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => Err(Error::Format(format!(
                "{location} is a master playlist, pass one of its media playlists"
            ))),
            Err(_) => Err(Error::Format(format!(
                "{location} is not a valid m3u8 playlist"
            ))),
        }
    }

    pub fn segment_location(&self, index: usize) -> Result<Location> {
        let segment = self.media.segments.get(index).ok_or_else(|| {
            Error::Format(format!("{} has no segment {}", self.location, index))
        })?;
        self.location.join(&segment.uri)
    }

    /// True when any segment carries a key tag with a method other than `NONE`.
    pub fn is_encrypted(&self) -> bool {
        self.media
            .segments
            .iter()
            .filter_map(|x| x.key.as_ref())
            .any(|x| x.method != KeyMethod::None)
    }

    /// Resolves the key tag in effect for every segment, in playlist order.
    ///
    /// Fails on `SAMPLE-AES` and unknown methods, which cannot be handled by
    /// whole segment AES-128-CBC.
    pub fn segment_ciphers(&self) -> Result<Vec<SegmentCipher>> {
        let mut current = SegmentCipher::Clear;
        let mut ciphers = Vec::with_capacity(self.media.segments.len());

        for (i, segment) in self.media.segments.iter().enumerate() {
            let sequence = self.media.media_sequence + i as u64;

            if let Some(key) = &segment.key {
                current = match &key.method {
                    KeyMethod::None => SegmentCipher::Clear,
                    KeyMethod::AES128 => SegmentCipher::Aes128 {
                        iv: key
                            .iv
                            .as_deref()
                            .map(|x| {
                                parse_hex_16(x).map_err(|e| {
                                    Error::Format(format!(
                                        "{}: segment {} ({}) has IV {}: {}",
                                        self.location, i, segment.uri, x, e
                                    ))
                                })
                            })
                            .transpose()?,
                        sequence,
                    },
                    KeyMethod::SampleAES => {
                        return Err(Error::Format(
                            "SAMPLE-AES playlists are not supported".into(),
                        ));
                    }
                    KeyMethod::Other(method) => {
                        return Err(Error::Format(format!(
                            "unsupported encryption method {method}"
                        )));
                    }
                };
            } else if let SegmentCipher::Aes128 { sequence: x, .. } = &mut current {
                *x = sequence;
            }

            ciphers.push(current.clone());
        }

        Ok(ciphers)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        write_atomic(path, |writer| {
            self.media
                .write_to(writer)
                .map_err(|e| Error::io(path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, path::PathBuf};

    const ENCRYPTED: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:5
#EXT-X-KEY:METHOD=AES-128,URI=\"hls_key.key\"
#EXTINF:10.0,
segment_000.ts
#EXTINF:10.0,
segment_001.ts
#EXT-X-KEY:METHOD=AES-128,URI=\"hls_key.key\",IV=0x000102030405060708090a0b0c0d0e0f
#EXTINF:4.0,
segment_002.ts
#EXT-X-KEY:METHOD=NONE
#EXTINF:2.0,
segment_003.ts
#EXT-X-ENDLIST
";

    fn playlist(text: &str) -> (tempfile::TempDir, Playlist) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.m3u8");
        fs::write(&path, text).unwrap();
        let playlist = Playlist::read(&Location::from(path)).unwrap();
        (dir, playlist)
    }

    #[test]
    fn test_segment_ciphers() {
        let (_dir, playlist) = playlist(ENCRYPTED);
        assert!(playlist.is_encrypted());

        let ciphers = playlist.segment_ciphers().unwrap();
        assert_eq!(
            ciphers,
            vec![
                SegmentCipher::Aes128 {
                    iv: None,
                    sequence: 5
                },
                SegmentCipher::Aes128 {
                    iv: None,
                    sequence: 6
                },
                SegmentCipher::Aes128 {
                    iv: Some(std::array::from_fn(|i| i as u8)),
                    sequence: 7
                },
                SegmentCipher::Clear,
            ]
        );

        let mut six = [0; KEY_LEN];
        six[15] = 6;
        assert_eq!(ciphers[1].iv(None), Some(six));
        assert_eq!(ciphers[1].iv(Some([1; KEY_LEN])), Some([1; KEY_LEN]));
        assert_eq!(ciphers[3].iv(Some([1; KEY_LEN])), None);
    }

    #[test]
    fn test_segment_location() {
        let (dir, playlist) = playlist(ENCRYPTED);
        assert_eq!(
            playlist.segment_location(2).unwrap(),
            Location::Path(dir.path().join("segment_002.ts"))
        );
        assert!(playlist.segment_location(4).is_err());
    }

    #[test]
    fn test_rejects_master_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("master.m3u8");
        fs::write(
            &master,
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1280000\nlow/index.m3u8\n",
        )
        .unwrap();
        assert!(matches!(
            Playlist::read(&Location::from(master)),
            Err(Error::Format(_))
        ));

        let garbage = dir.path().join("garbage.m3u8");
        fs::write(&garbage, [0_u8, 159, 146, 150]).unwrap();
        assert!(matches!(
            Playlist::read(&Location::from(garbage)),
            Err(Error::Format(_))
        ));

        let missing = Location::from(PathBuf::from("does/not/exist.m3u8"));
        assert!(matches!(
            Playlist::read(&missing),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_rejects_sample_aes() {
        let (_dir, playlist) = playlist(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"k\"\n#EXTINF:10.0,\na.ts\n#EXT-X-ENDLIST\n",
        );
        assert!(matches!(
            playlist.segment_ciphers(),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_malformed_iv_is_format_error() {
        let (_dir, playlist) = playlist(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-KEY:METHOD=AES-128,URI=\"k\",IV=0xnothex\n#EXTINF:10.0,\na.ts\n#EXT-X-ENDLIST\n",
        );

        match playlist.segment_ciphers() {
            Err(Error::Format(reason)) => assert!(reason.contains("a.ts")),
            x => panic!("unexpected {x:?}"),
        }
    }
}
