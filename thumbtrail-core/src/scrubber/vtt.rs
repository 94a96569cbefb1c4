/*
    REFERENCES
    ----------

    1. https://www.w3.org/TR/webvtt1/
    2. https://www.w3.org/TR/media-frags/#naming-space

*/

use std::fmt::Write;

pub(crate) struct Cue {
    pub(crate) start_time: f64,
    pub(crate) end_time: f64,
    pub(crate) payload: String,
}

/// WebVTT builder for thumbnail tracks.
#[derive(Default)]
pub(crate) struct WebVtt {
    cues: Vec<Cue>,
}

impl WebVtt {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, cue: Cue) {
        self.cues.push(cue);
    }

    pub(crate) fn as_vtt(&self) -> String {
        let mut vtt = "WEBVTT\n\n".to_owned();

        for cue in &self.cues {
            let _ = write!(
                vtt,
                "{} --> {}\n{}\n\n",
                timestamp(cue.start_time),
                timestamp(cue.end_time),
                cue.payload
            );
        }

        vtt
    }
}

pub(crate) fn timestamp(seconds: f64) -> String {
    let divmod = |x, y| (x / y, x % y);
    let (s, ms) = divmod((seconds.max(0.0) * 1000.0).round() as u64, 1000);
    let (m, s) = divmod(s, 60);
    let (h, m) = divmod(m, 60);
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}
