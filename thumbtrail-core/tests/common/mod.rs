#![allow(dead_code)]

use image::{Rgb, RgbImage};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use thumbtrail_core::{
    Error, HlsOptions, KeyInfo, KeyMaterial, Location, Result, Size, Transcoder, cipher,
};

/// In-process stand-in for ffmpeg.
///
/// `to_hls` cuts the input into fixed size segments (encrypting them the way
/// ffmpeg does when a key-info file is given), `remux` copies, `duration`
/// returns a configured value and `extract_frame` paints a solid image.
pub struct FakeTranscoder {
    pub duration: f64,
    pub segment_size: usize,
    pub fail_at: Option<f64>,
    calls: AtomicUsize,
    probed: Mutex<Vec<(PathBuf, Vec<u8>)>>,
}

impl FakeTranscoder {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            segment_size: 1000,
            fail_at: None,
            calls: AtomicUsize::new(0),
            probed: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_at(mut self, timestamp: f64) -> Self {
        self.fail_at = Some(timestamp);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Path and content of every local source passed to `duration`.
    pub fn probed(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.probed.lock().unwrap().clone()
    }

    fn called(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Transcoder for FakeTranscoder {
    fn to_hls(
        &self,
        input: &Location,
        output_dir: &Path,
        key_info: Option<&Path>,
        options: &HlsOptions,
    ) -> Result<PathBuf> {
        self.called();

        let data = input.read()?;
        let key_info = key_info.map(KeyInfo::read).transpose()?;
        let key = key_info.as_ref().map(|x| x.read_key()).transpose()?;

        let mut playlist = format!(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{}\n#EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-PLAYLIST-TYPE:VOD\n",
            options.segment_duration
        );

        if let Some(info) = &key_info {
            playlist.push_str(&format!("#EXT-X-KEY:METHOD=AES-128,URI=\"{}\"", info.uri));

            if let Some(iv) = info.iv_hex() {
                playlist.push_str(&format!(",IV=0x{iv}"));
            }

            playlist.push('\n');
        }

        for (i, chunk) in data.chunks(self.segment_size).enumerate() {
            let name = options.segment_pattern.replace("%03d", &format!("{i:03}"));
            let bytes = match (&key_info, key) {
                (Some(info), Some(key)) => {
                    let iv = info.iv.unwrap_or((i as u128).to_be_bytes());
                    cipher::encrypt_bytes(&KeyMaterial::new(key, iv), chunk)
                }
                _ => chunk.to_vec(),
            };

            fs::write(output_dir.join(&name), bytes).map_err(|e| Error::io(&name, e))?;
            playlist.push_str(&format!("#EXTINF:{}.000000,\n{}\n", options.segment_duration, name));
        }

        playlist.push_str("#EXT-X-ENDLIST\n");

        let path = output_dir.join(&options.playlist_name);
        fs::write(&path, playlist).map_err(|e| Error::io(&path, e))?;
        Ok(path)
    }

    fn remux(&self, input: &Path, output: &Path) -> Result<()> {
        self.called();
        fs::copy(input, output).map_err(|e| Error::io(input, e))?;
        Ok(())
    }

    fn duration(&self, input: &Location) -> Result<f64> {
        self.called();

        if let Some(path) = input.as_path() {
            let data = fs::read(path).map_err(|e| Error::io(path, e))?;
            self.probed.lock().unwrap().push((path.to_owned(), data));
        }

        Ok(self.duration)
    }

    fn extract_frame(
        &self,
        _input: &Location,
        timestamp: f64,
        size: Size,
        output: &Path,
    ) -> Result<()> {
        self.called();

        // Nothing decodes within the last frame (25 fps) like with ffmpeg.
        if self.fail_at == Some(timestamp) || timestamp > self.duration - 0.04 {
            return Err(Error::Transcode(format!("no frame at {timestamp}")));
        }

        let shade = (timestamp * 10.0) as u8;
        RgbImage::from_pixel(size.width, size.height, Rgb([shade, shade, shade])).save(output)?;
        Ok(())
    }
}

/// Deterministic pseudo video bytes.
pub fn video_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
