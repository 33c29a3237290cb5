//! Encoder seam and the ffmpeg-backed implementation.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use rewind_common::config::{ExportDefaults, ExportFormat};
use rewind_common::error::{ReplayError, ReplayResult};
use rewind_common::NSEC_PER_SEC;
use rewind_media_model::{TimestampNs, VideoFormat, VideoFrame};

/// Properties of the encoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
}

impl OutputDescriptor {
    pub fn from_config(config: &ExportDefaults) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps.max(1),
            audio_sample_rate: config.audio_sample_rate,
            audio_channels: config.audio_channels.max(1),
        }
    }

    /// Output timestamp of frame `k`, relative to the start of the export.
    pub fn frame_time_ns(&self, k: u64) -> u64 {
        (k as u128 * NSEC_PER_SEC as u128 / self.fps.max(1) as u128) as u64
    }

    /// Index of the first audio sample belonging to output frame `k`.
    pub fn frame_sample_offset(&self, k: u64) -> u64 {
        (k as u128 * self.audio_sample_rate as u128 / self.fps.max(1) as u128) as u64
    }
}

impl Default for OutputDescriptor {
    fn default() -> Self {
        Self::from_config(&ExportDefaults::default())
    }
}

/// Everything an encoder needs to open an output.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub output_path: PathBuf,
    pub format: ExportFormat,
    pub lossless: bool,

    /// Layout of the frames that will be written.
    pub source_format: VideoFormat,
    pub source_width: u32,
    pub source_height: u32,

    pub output: OutputDescriptor,
}

/// Opens encoder sessions. Implementations must be callable from any thread.
pub trait EncoderService: Send + Sync {
    fn open(&self, config: &EncoderConfig) -> ReplayResult<Box<dyn EncoderSession>>;

    /// Check if this encoder is available on the system.
    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

/// One open output file.
pub trait EncoderSession: Send {
    /// Write one video frame at `timestamp` ns from the start of the output.
    fn write_video(&mut self, frame: &VideoFrame, timestamp: TimestampNs) -> ReplayResult<()>;

    /// Write `frames` samples of planar audio starting at `timestamp`.
    fn write_audio(
        &mut self,
        planes: &[Vec<f32>],
        frames: usize,
        timestamp: TimestampNs,
    ) -> ReplayResult<()>;

    /// Flush and finalize the output.
    fn close(&mut self) -> ReplayResult<()>;
}

/// Encodes through the `ffmpeg` binary.
///
/// Raw video is piped to an ffmpeg process writing an intermediate
/// video-only file, audio goes to an `f32le` sidecar, and both are remuxed
/// into the final container on close.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderService for FfmpegEncoder {
    fn open(&self, config: &EncoderConfig) -> ReplayResult<Box<dyn EncoderSession>> {
        if let Some(parent) = config.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let video_path = sidecar_path(&config.output_path, "video.mkv");
        let audio_path = sidecar_path(&config.output_path, "audio.f32");
        let audio = BufWriter::new(File::create(&audio_path)?);

        let args = video_args(config, &video_path);
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReplayError::export(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = child.id(),
            output = %config.output_path.display(),
            "ffmpeg process started"
        );

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReplayError::export("Failed to capture ffmpeg stdin"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReplayError::export("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        Ok(Box::new(FfmpegSession {
            binary: self.binary.clone(),
            config: config.clone(),
            child: Some(child),
            stdin: Some(BufWriter::new(stdin)),
            stderr_task: Some(stderr_task),
            video_path,
            audio_path,
            audio: Some(audio),
            audio_samples: 0,
            interleaved: Vec::new(),
            last_input: None,
        }))
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

struct FfmpegSession {
    binary: String,
    config: EncoderConfig,
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr_task: Option<JoinHandle<String>>,
    video_path: PathBuf,
    audio_path: PathBuf,
    audio: Option<BufWriter<File>>,
    audio_samples: u64,
    interleaved: Vec<u8>,
    /// Raw bytes of the last frame sent to ffmpeg.
    last_input: Option<Vec<u8>>,
}

impl EncoderSession for FfmpegSession {
    fn write_video(&mut self, frame: &VideoFrame, _timestamp: TimestampNs) -> ReplayResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ReplayError::export("ffmpeg session already closed"))?;
        let input = next_input(&self.config, frame, self.last_input.take())?;
        stdin
            .write_all(&input)
            .map_err(|e| ReplayError::export(format!("Failed writing to ffmpeg: {e}")))?;
        self.last_input = Some(input);
        Ok(())
    }

    fn write_audio(
        &mut self,
        planes: &[Vec<f32>],
        frames: usize,
        _timestamp: TimestampNs,
    ) -> ReplayResult<()> {
        let Some(audio) = self.audio.as_mut() else {
            return Err(ReplayError::export("ffmpeg session already closed"));
        };
        if planes.is_empty() {
            return Ok(());
        }
        let channels = self.config.output.audio_channels as usize;
        let last = planes.len() - 1;
        let frames = planes.iter().map(Vec::len).min().unwrap_or(0).min(frames);

        self.interleaved.clear();
        self.interleaved.reserve(frames * channels * 4);
        for i in 0..frames {
            for c in 0..channels {
                self.interleaved
                    .extend_from_slice(&planes[c.min(last)][i].to_le_bytes());
            }
        }
        audio.write_all(&self.interleaved)?;
        self.audio_samples += frames as u64;
        Ok(())
    }

    fn close(&mut self) -> ReplayResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.flush() {
                tracing::warn!(error = %e, "Failed to flush ffmpeg stdin");
            }
        }

        let status = child
            .wait()
            .map_err(|e| ReplayError::export(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = self
            .stderr_task
            .take()
            .and_then(|task| task.join().ok())
            .unwrap_or_else(|| "<failed to join stderr reader>".to_string());
        if !status.success() {
            self.remove_sidecars();
            return Err(ReplayError::export(format!(
                "ffmpeg encode failed (status {}): {}",
                status,
                stderr_output.trim()
            )));
        }

        if let Some(mut audio) = self.audio.take() {
            audio.flush()?;
        }
        let audio_input = (self.audio_samples > 0).then_some(self.audio_path.as_path());
        let args = remux_args(&self.config, &self.video_path, audio_input);
        tracing::debug!(args = ?args, "Remuxing export");
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|e| ReplayError::export(format!("Failed to start ffmpeg remux: {e}")));
        self.remove_sidecars();
        let output = output?;
        if !output.status.success() {
            return Err(ReplayError::export(format!(
                "ffmpeg remux failed (status {}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tracing::info!(
            output = %self.config.output_path.display(),
            audio_samples = self.audio_samples,
            "Export file written"
        );
        Ok(())
    }
}

impl FfmpegSession {
    fn remove_sidecars(&self) {
        for path in [&self.video_path, &self.audio_path] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove sidecar");
                }
            }
        }
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            self.stdin.take();
            let _ = child.kill();
            let _ = child.wait();
            self.audio.take();
            self.remove_sidecars();
        }
    }
}

/// `<dir>/<stem>.<suffix>` next to the final output.
fn sidecar_path(output: &Path, suffix: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "replay".to_string());
    output.with_file_name(format!(".{stem}.{suffix}"))
}

fn video_args(config: &EncoderConfig, video_path: &Path) -> Vec<String> {
    let out = &config.output;
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        config.source_format.ffmpeg_pix_fmt().into(),
        "-s".into(),
        format!("{}x{}", config.source_width, config.source_height),
        "-r".into(),
        out.fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
    ];
    if (out.width, out.height) != (config.source_width, config.source_height) {
        args.push("-vf".into());
        args.push(format!("scale={}:{}", out.width, out.height));
    }
    args.extend(video_codec_args(config.lossless));
    args.push("-an".into());
    args.push(video_path.to_string_lossy().into_owned());
    args
}

fn video_codec_args(lossless: bool) -> Vec<String> {
    let (quality, value, pix_fmt) = if lossless {
        ("-qp", "0", "yuv444p")
    } else {
        ("-crf", "20", "yuv420p")
    };
    vec![
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        quality.into(),
        value.into(),
        "-pix_fmt".into(),
        pix_fmt.into(),
    ]
}

fn audio_codec(format: ExportFormat, lossless: bool) -> &'static str {
    match (format, lossless) {
        (ExportFormat::Mkv, true) => "flac",
        (ExportFormat::Mp4 | ExportFormat::Mov, true) => "alac",
        _ => "aac",
    }
}

fn remux_args(config: &EncoderConfig, video_path: &Path, audio_path: Option<&Path>) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        video_path.to_string_lossy().into_owned(),
    ];
    if let Some(audio_path) = audio_path {
        args.extend([
            "-f".into(),
            "f32le".into(),
            "-ar".into(),
            config.output.audio_sample_rate.to_string(),
            "-ac".into(),
            config.output.audio_channels.to_string(),
            "-i".into(),
            audio_path.to_string_lossy().into_owned(),
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "1:a".into(),
            "-c:a".into(),
            audio_codec(config.format, config.lossless).into(),
        ]);
    }
    args.push("-c:v".into());
    args.push("copy".into());
    if matches!(config.format, ExportFormat::Mp4 | ExportFormat::Mov) {
        args.push("-movflags".into());
        args.push("+faststart".into());
    }
    args.push(config.output_path.to_string_lossy().into_owned());
    args
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Raw input bytes for one output frame.
///
/// ffmpeg reads a fixed layout, so a frame that does not match it repeats
/// the previous frame (or a blank one) to keep the frame count in step with
/// the audio.
fn next_input(
    config: &EncoderConfig,
    frame: &VideoFrame,
    last: Option<Vec<u8>>,
) -> ReplayResult<Vec<u8>> {
    if frame.format != config.source_format
        || frame.width != config.source_width
        || frame.height != config.source_height
    {
        tracing::warn!(
            width = frame.width,
            height = frame.height,
            "Frame does not match the export input layout, repeating the previous frame"
        );
        return Ok(last.unwrap_or_else(|| {
            let blank = VideoFrame::new(
                config.source_format,
                config.source_width,
                config.source_height,
                0,
            );
            concat_planes(&blank)
        }));
    }

    let packed = frame
        .planes
        .iter()
        .enumerate()
        .all(|(i, p)| p.linesize == frame.format.min_linesize(i, frame.width));
    if packed {
        Ok(concat_planes(frame))
    } else {
        Ok(concat_planes(&frame.to_packed()?))
    }
}

fn concat_planes(frame: &VideoFrame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frame.byte_len());
    for plane in &frame.planes {
        bytes.extend_from_slice(&plane.data);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(format: ExportFormat, lossless: bool) -> EncoderConfig {
        EncoderConfig {
            output_path: PathBuf::from("/tmp/out/Replay.mkv"),
            format,
            lossless,
            source_format: VideoFormat::I420,
            source_width: 1280,
            source_height: 720,
            output: OutputDescriptor::default(),
        }
    }

    #[test]
    fn test_frame_pacing_helpers() {
        let out = OutputDescriptor {
            fps: 30,
            audio_sample_rate: 48_000,
            ..OutputDescriptor::default()
        };
        assert_eq!(out.frame_time_ns(0), 0);
        assert_eq!(out.frame_time_ns(30), NSEC_PER_SEC);
        assert_eq!(out.frame_sample_offset(1), 1600);
        assert_eq!(out.frame_sample_offset(30), 48_000);
    }

    #[test]
    fn test_video_args_scale_when_sizes_differ() {
        let cfg = config(ExportFormat::Mkv, false);
        let args = video_args(&cfg, Path::new("/tmp/out/.Replay.video.mkv"));
        assert!(args.windows(2).any(|w| w[0] == "-pix_fmt" && w[1] == "yuv420p"));
        assert!(args.windows(2).any(|w| w[0] == "-s" && w[1] == "1280x720"));
        assert!(args.contains(&"scale=1920:1080".to_string()));
        assert!(args.contains(&"-crf".to_string()));

        let mut same = config(ExportFormat::Mkv, true);
        same.source_width = 1920;
        same.source_height = 1080;
        let args = video_args(&same, Path::new("v.mkv"));
        assert!(!args.iter().any(|a| a.starts_with("scale=")));
        assert!(args.windows(2).any(|w| w[0] == "-qp" && w[1] == "0"));
    }

    #[test]
    fn test_remux_args_with_and_without_audio() {
        let cfg = config(ExportFormat::Mp4, false);
        let args = remux_args(&cfg, Path::new("v.mkv"), Some(Path::new("a.f32")));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "f32le"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "aac"));
        assert!(args.contains(&"+faststart".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out/Replay.mkv"));

        let args = remux_args(&cfg, Path::new("v.mkv"), None);
        assert!(!args.contains(&"f32le".to_string()));
    }

    #[test]
    fn test_lossless_audio_codec_per_container() {
        assert_eq!(audio_codec(ExportFormat::Mkv, true), "flac");
        assert_eq!(audio_codec(ExportFormat::Mov, true), "alac");
        assert_eq!(audio_codec(ExportFormat::Flv, true), "aac");
        assert_eq!(audio_codec(ExportFormat::Mkv, false), "aac");
    }

    #[test]
    fn test_sidecar_paths_are_hidden_siblings() {
        let path = sidecar_path(Path::new("/tmp/out/Replay 1.mp4"), "audio.f32");
        assert_eq!(path, PathBuf::from("/tmp/out/.Replay 1.audio.f32"));
    }

    #[test]
    fn test_mismatched_frame_repeats_previous_input() {
        let mut cfg = config(ExportFormat::Mkv, false);
        cfg.source_width = 4;
        cfg.source_height = 2;
        let wrong = VideoFrame::new(VideoFormat::I420, 8, 8, 0);

        // Nothing written yet: a blank frame of the input size.
        let blank = next_input(&cfg, &wrong, None).unwrap();
        assert_eq!(blank.len(), 4 * 2 + 2 * 2 * 1);

        let mut good = VideoFrame::new(VideoFormat::I420, 4, 2, 0);
        good.planes[0].data.fill(200);
        let first = next_input(&cfg, &good, Some(blank)).unwrap();
        assert_eq!(&first[..8], &[200; 8]);

        let repeated = next_input(&cfg, &wrong, Some(first.clone())).unwrap();
        assert_eq!(repeated, first);
    }

    #[test]
    fn test_padded_frame_is_packed_for_ffmpeg() {
        let mut cfg = config(ExportFormat::Mkv, false);
        cfg.source_format = VideoFormat::Y800;
        cfg.source_width = 4;
        cfg.source_height = 2;
        let padded = VideoFrame::new(VideoFormat::Y800, 4, 2, 0)
            .copy_with_linesizes(&[8])
            .unwrap();
        assert_eq!(next_input(&cfg, &padded, None).unwrap().len(), 8);
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let encoder = FfmpegEncoder::with_binary("rewind-no-such-encoder-binary");
        assert!(!encoder.is_available());
    }
}
