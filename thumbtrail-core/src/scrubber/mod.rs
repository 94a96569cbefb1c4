//! Thumbnail scrubbing tracks: frame sampling, sprite sheets and the WebVTT
//! file that maps time ranges to them.

mod options;
mod source;
mod sprite;
mod vtt;

pub use options::{ImageFormat, ThumbnailOptions};
pub use source::Decryption;
pub use sprite::Region;

use crate::{
    CancelFlag, Error, Location, Result, cipher::write_atomic, error::IoContext,
    transcoder::Transcoder,
};
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use sprite::Layout;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use vtt::{Cue, WebVtt};

pub const VTT_FILE: &str = "thumbnails.vtt";

/// Seeks closer than this to the end can land past the last decodable frame.
const END_MARGIN: f64 = 0.25;

/// One sampled frame and where it ended up.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Thumbnail {
    pub index: usize,
    /// Sample timestamp and cue start, in seconds.
    pub start: f64,
    pub end: f64,
    /// Image file holding the frame, a sprite sheet when merged.
    pub path: PathBuf,
    /// Payload written into the cue.
    pub reference: String,
    pub region: Option<Region>,
}

/// Everything written by [`Scrubber::generate_thumbnails_and_webvtt`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThumbnailSet {
    pub duration: f64,
    pub thumbnails: Vec<Thumbnail>,
    pub sheets: Vec<PathBuf>,
    pub vtt: PathBuf,
}

/// Generates thumbnails and a WebVTT track for one video reference.
pub struct Scrubber<T> {
    reference: Location,
    output_dir: PathBuf,
    decryption: Decryption,
    transcoder: T,
    cancel: CancelFlag,
}

impl<T: Transcoder> Scrubber<T> {
    pub fn new<L: Into<Location>, P: Into<PathBuf>>(
        reference: L,
        output_dir: P,
        transcoder: T,
    ) -> Self {
        Self {
            reference: reference.into(),
            output_dir: output_dir.into(),
            decryption: Decryption::None,
            transcoder,
            cancel: CancelFlag::new(),
        }
    }

    pub fn decryption(mut self, decryption: Decryption) -> Self {
        self.decryption = decryption;
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transcoder(&self) -> &T {
        &self.transcoder
    }

    /// Samples a frame every `options.interval` seconds, optionally tiles them
    /// into sprite sheets and writes [`VTT_FILE`] into the output directory.
    ///
    /// A failing sample aborts the whole run. Images already written are
    /// left behind and must be treated as invalid.
    pub fn generate_thumbnails_and_webvtt(&self, options: &ThumbnailOptions) -> Result<ThumbnailSet> {
        options.validate()?;
        self.decryption.validate(&self.reference)?;

        if !self.reference.exists() {
            return Err(Error::NotFound {
                path: PathBuf::from(self.reference.to_string()),
            });
        }

        fs::create_dir_all(&self.output_dir).at(&self.output_dir)?;

        let source = self
            .decryption
            .materialize(&self.reference, &self.transcoder, &self.cancel)?;
        let duration = self.transcoder.duration(source.location())?;

        if !(duration.is_finite() && duration > 0.0) {
            return Err(Error::Transcode(format!(
                "{} has no usable duration ({duration})",
                self.reference
            )));
        }

        let timestamps = sample_timestamps(options.interval, duration);
        info!(
            "Sampling {} frames from {} ({:.3}s every {}s)",
            timestamps.len(),
            self.reference,
            duration,
            options.interval
        );

        // Merged runs keep single frames out of the output directory.
        let scratch = if options.merge {
            Some(tempfile::tempdir().at(std::env::temp_dir())?)
        } else {
            None
        };
        let frames_dir = scratch
            .as_ref()
            .map(|x| x.path())
            .unwrap_or(self.output_dir.as_path());

        let frames = timestamps
            .iter()
            .enumerate()
            .map(|(i, _)| frames_dir.join(frame_name(i, options)))
            .collect::<Vec<_>>();

        timestamps
            .par_iter()
            .zip(&frames)
            .enumerate()
            .try_for_each(|(i, (timestamp, path))| {
                self.cancel.check()?;
                debug!("Extracting sample {i} at {timestamp:.3}s");
                self.transcoder
                    .extract_frame(
                        source.location(),
                        seek_time(*timestamp, duration),
                        options.size,
                        path,
                    )
                    .map_err(|e| Error::sample(i, *timestamp, e))
            })?;

        let mut thumbnails = Vec::with_capacity(timestamps.len());
        let mut sheets = Vec::new();

        if options.merge {
            let layout = Layout::new(
                options.size,
                options.max_sheet_width,
                options.max_sheet_height,
            )?;
            let count = layout.sheets(frames.len());

            sheets = (0..count)
                .map(|k| self.output_dir.join(sprite::sheet_name(k, count, options.format)))
                .collect();

            frames
                .par_chunks(layout.per_sheet())
                .zip(&sheets)
                .enumerate()
                .try_for_each(|(k, (chunk, sheet))| {
                    self.cancel.check()?;
                    info!("Writing sprite sheet {}", sheet.display());
                    sprite::compose(&layout, chunk, k * layout.per_sheet(), options.format, sheet)
                })?;

            for (i, &start) in timestamps.iter().enumerate() {
                let (k, region) = layout.place(i);
                let name = sprite::sheet_name(k, count, options.format);

                thumbnails.push(Thumbnail {
                    index: i,
                    start,
                    end: cue_end(start, options.interval, duration),
                    path: sheets[k].clone(),
                    reference: format!("{}{}", options.reference(&name), region.fragment()),
                    region: Some(region),
                });
            }
        } else {
            for (i, (&start, path)) in timestamps.iter().zip(&frames).enumerate() {
                thumbnails.push(Thumbnail {
                    index: i,
                    start,
                    end: cue_end(start, options.interval, duration),
                    path: path.clone(),
                    reference: options.reference(&frame_name(i, options)),
                    region: None,
                });
            }
        }

        let vtt = self.output_dir.join(VTT_FILE);
        write_vtt(&vtt, &thumbnails)?;
        info!("Thumbnail track written to {}", vtt.display());

        Ok(ThumbnailSet {
            duration,
            thumbnails,
            sheets,
            vtt,
        })
    }
}

/// Sample times `0, I, 2I, ..` strictly before `duration`.
pub fn sample_timestamps(interval: f64, duration: f64) -> Vec<f64> {
    if !(interval > 0.0 && duration > 0.0) {
        return Vec::new();
    }

    // Absorbs float noise, 0.9 / 0.3 is slightly above 3.
    let count = (duration / interval - 1e-9).ceil().max(1.0) as usize;
    (0..count).map(|n| n as f64 * interval).collect()
}

/// Frame position for a sample. A sample in the last [`END_MARGIN`] seconds
/// shows the frame shortly before the end, its cue still starts at the sample
/// time.
fn seek_time(timestamp: f64, duration: f64) -> f64 {
    timestamp.min(duration - END_MARGIN).max(0.0)
}

fn cue_end(start: f64, interval: f64, duration: f64) -> f64 {
    (start + interval).min(duration)
}

fn frame_name(index: usize, options: &ThumbnailOptions) -> String {
    format!("thumb_{:04}.{}", index, options.format.extension())
}

fn write_vtt(path: &Path, thumbnails: &[Thumbnail]) -> Result<()> {
    let mut vtt = WebVtt::new();

    for thumbnail in thumbnails {
        vtt.push(Cue {
            start_time: thumbnail.start,
            end_time: thumbnail.end,
            payload: thumbnail.reference.clone(),
        });
    }

    let text = vtt.as_vtt();
    write_atomic(path, |writer| writer.write_all(text.as_bytes()).at(path))
}
