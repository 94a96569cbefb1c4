use super::{HlsOptions, Size, Transcoder};
use crate::{Error, Location, Result, error::IoContext};
use log::debug;
use serde::Deserialize;
use std::{
    env,
    ffi::{OsStr, OsString},
    fs,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// [`Transcoder`] backed by the `ffmpeg` and `ffprobe` binaries.
///
/// Every invocation is a blocking subprocess bounded by `timeout`. A
/// process that outlives its deadline is killed and reported as
/// [`Error::TranscodeTimeout`], it is never retried.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub timeout: Duration,
}

impl Ffmpeg {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(ffmpeg: P, ffprobe: Q) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Uses the given binaries and locates the missing ones in the working
    /// directory or on `PATH`.
    pub fn discover(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Result<Self> {
        let locate = |path: Option<PathBuf>, name: &str| {
            path.or_else(|| find_binary(name)).ok_or_else(|| {
                Error::Transcode(format!(
                    "{name} couldn't be found, it is required to continue further"
                ))
            })
        };

        Ok(Self::new(
            locate(ffmpeg, "ffmpeg")?,
            locate(ffprobe, "ffprobe")?,
        ))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, program: &Path, args: &[OsString]) -> Result<String> {
        let name = program
            .file_stem()
            .unwrap_or(program.as_os_str())
            .to_string_lossy()
            .into_owned();

        debug!(
            "Executing {} {}",
            name,
            args.iter()
                .map(|x| x.to_string_lossy())
                .map(|x| if x.contains(' ') {
                    format!("\"{x}\"")
                } else {
                    x.into_owned()
                })
                .collect::<Vec<_>>()
                .join(" ")
        );

        // Files instead of pipes so a chatty process never blocks on a full pipe.
        let mut stdout = tempfile::tempfile().at(env::temp_dir())?;
        let mut stderr = tempfile::tempfile().at(env::temp_dir())?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout.try_clone().at(program)?)
            .stderr(stderr.try_clone().at(program)?)
            .spawn()
            .map_err(|e| Error::Transcode(format!("cannot start {}: {}", program.display(), e)))?;

        let mut child = ChildGuard(child);
        let deadline = Instant::now() + self.timeout;

        let status = loop {
            if let Some(status) = child.0.try_wait().at(program)? {
                break status;
            }

            if Instant::now() >= deadline {
                return Err(Error::TranscodeTimeout {
                    program: name,
                    secs: self.timeout.as_secs(),
                });
            }

            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let mut message = String::new();
            stderr.seek(SeekFrom::Start(0)).at(program)?;
            stderr.read_to_string(&mut message).at(program)?;

            return Err(Error::Transcode(format!(
                "{} exited with code {}: {}",
                name,
                status.code().unwrap_or(1),
                message.lines().last().unwrap_or_default().trim()
            )));
        }

        let mut output = String::new();
        stdout.seek(SeekFrom::Start(0)).at(program)?;
        stdout.read_to_string(&mut output).at(program)?;
        Ok(output)
    }
}

impl Transcoder for Ffmpeg {
    fn to_hls(
        &self,
        input: &Location,
        output_dir: &Path,
        key_info: Option<&Path>,
        options: &HlsOptions,
    ) -> Result<PathBuf> {
        fs::create_dir_all(output_dir).at(output_dir)?;
        let playlist = output_dir.join(&options.playlist_name);

        let mut args = os_args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-i",
        ]);
        args.push(input.as_arg());
        args.extend(os_args([
            "-codec",
            "copy",
            "-start_number",
            "0",
            "-hls_time",
            &options.segment_duration.to_string(),
            "-hls_list_size",
            "0",
            "-hls_playlist_type",
            "vod",
            "-hls_segment_filename",
        ]));
        args.push(output_dir.join(&options.segment_pattern).into_os_string());

        if let Some(key_info) = key_info {
            args.push("-hls_key_info_file".into());
            args.push(key_info.as_os_str().to_owned());
        }

        args.extend(os_args(["-f", "hls"]));
        args.push(playlist.clone().into_os_string());

        self.run(&self.ffmpeg, &args)?;
        Ok(playlist)
    }

    fn remux(&self, input: &Path, output: &Path) -> Result<()> {
        let mut args = os_args(["-hide_banner", "-loglevel", "error", "-y", "-i"]);
        args.push(input.as_os_str().to_owned());
        args.extend(os_args(["-map", "0", "-c", "copy"]));
        args.push(output.as_os_str().to_owned());
        self.run(&self.ffmpeg, &args)?;
        Ok(())
    }

    fn duration(&self, input: &Location) -> Result<f64> {
        #[derive(Deserialize)]
        struct Probe {
            format: ProbeFormat,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
        }

        let mut args = os_args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ]);
        args.push(input.as_arg());

        let output = self.run(&self.ffprobe, &args)?;
        let probe = serde_json::from_str::<Probe>(&output)
            .map_err(|e| Error::Transcode(format!("cannot parse ffprobe output: {e}")))?;

        probe
            .format
            .duration
            .and_then(|x| x.parse::<f64>().ok())
            .filter(|x| x.is_finite() && *x > 0.0)
            .ok_or_else(|| Error::Transcode(format!("ffprobe reported no duration for {input}")))
    }

    fn extract_frame(
        &self,
        input: &Location,
        timestamp: f64,
        size: Size,
        output: &Path,
    ) -> Result<()> {
        let mut args = os_args(["-hide_banner", "-loglevel", "error", "-y", "-ss"]);
        args.push(format!("{timestamp:.3}").into());
        args.push("-i".into());
        args.push(input.as_arg());
        args.extend(os_args([
            "-frames:v",
            "1",
            "-vf",
            &format!("scale={}:{}", size.width, size.height),
        ]));

        if output.extension() == Some(OsStr::new("jpg")) {
            args.extend(os_args(["-q:v", "2"]));
        }

        args.push(output.as_os_str().to_owned());
        self.run(&self.ffmpeg, &args)?;

        if !output.exists() {
            return Err(Error::Transcode(format!(
                "ffmpeg produced no frame at {timestamp:.3}s"
            )));
        }

        Ok(())
    }
}

/// Kills the child process if it is still running when dropped.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            let _ = self.0.kill();
            let _ = self.0.wait();
        }
    }
}

fn os_args<const N: usize>(values: [&str; N]) -> Vec<OsString> {
    values.into_iter().map(OsString::from).collect()
}

/// Looks for `name` (with `.exe` on windows) in the working directory, then on `PATH`.
pub fn find_binary(name: &str) -> Option<PathBuf> {
    let bin = if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_owned()
    };

    if Path::new(&bin).exists() {
        return Some(PathBuf::from(bin));
    }

    env::split_paths(&env::var_os("PATH")?).find_map(|dir| {
        let path = dir.join(&bin);
        path.is_file().then_some(path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_keeps_given_binaries() {
        let ffmpeg = Ffmpeg::discover(
            Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            Some(PathBuf::from("/opt/ffmpeg/bin/ffprobe")),
        )
        .unwrap();

        assert_eq!(ffmpeg.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(ffmpeg.ffprobe, PathBuf::from("/opt/ffmpeg/bin/ffprobe"));
        assert_eq!(ffmpeg.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_find_binary_missing() {
        assert_eq!(find_binary("thumbtrail-no-such-binary"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_process() {
        let Some(sleep) = find_binary("sleep") else {
            return;
        };
        let ffmpeg = Ffmpeg::new(&sleep, &sleep).timeout(Duration::from_millis(200));
        let started = Instant::now();

        let result = ffmpeg.run(&sleep, &os_args(["5"]));
        assert!(matches!(result, Err(Error::TranscodeTimeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit() {
        let Some(f) = find_binary("false") else {
            return;
        };
        let ffmpeg = Ffmpeg::new(&f, &f);
        assert!(matches!(
            ffmpeg.run(&f, &[]),
            Err(Error::Transcode(_))
        ));
    }
}
