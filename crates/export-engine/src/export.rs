//! Export job management.
//!
//! An export runs alongside playback: the caller drives it with
//! [`ExportPipeline::tick`] from whatever thread it likes, and every tick
//! writes the output frames that became due since the export started. The
//! job lock is released while the encoder runs.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;

use rewind_common::config::{ExportDefaults, ExportFormat};
use rewind_common::error::{ReplayError, ReplayResult};
use rewind_common::NSEC_PER_SEC;
use rewind_media_model::{frames_to_ns, ns_to_frames, Snapshot, TimestampNs};

use crate::encoder::{EncoderConfig, EncoderService, EncoderSession, OutputDescriptor};
use crate::mixer::mix_into;

const DEFAULT_FILENAME_PATTERN: &str = "Replay %Y-%m-%d %H-%M-%S";

/// Progress callback for exports.
pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Output frames written so far.
    pub frames_written: u64,

    /// Output frames the trimmed replay spans.
    pub total_frames: u64,

    /// Estimated time remaining in seconds. Exports run in real time.
    pub eta_secs: f64,

    pub stage: ExportStage,
}

impl ExportProgress {
    fn at_stage(stage: ExportStage) -> Self {
        Self {
            progress: 0.0,
            frames_written: 0,
            total_frames: 0,
            eta_secs: 0.0,
            stage,
        }
    }
}

impl Default for ExportProgress {
    fn default() -> Self {
        Self::at_stage(ExportStage::Idle)
    }
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Idle,
    Preparing,
    Encoding,
    Finalizing,
    Complete,
    Failed,
}

/// Lifecycle of the export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Where and how a replay is exported.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub directory: PathBuf,
    pub format: ExportFormat,
    pub lossless: bool,

    /// chrono format pattern for the file stem, applied to the capture time.
    pub filename_pattern: String,

    pub output: OutputDescriptor,
}

impl ExportSettings {
    pub fn from_config(config: &ExportDefaults) -> Self {
        Self {
            directory: config.directory.clone(),
            format: config.format,
            lossless: config.lossless,
            filename_pattern: config.filename_pattern.clone(),
            output: OutputDescriptor::from_config(config),
        }
    }

    /// Output file for a replay captured at `captured_at`.
    ///
    /// Existing files are never overwritten; a counter is appended instead.
    pub fn output_path(&self, captured_at: DateTime<Utc>) -> PathBuf {
        let stem = file_stem(&self.filename_pattern, captured_at);
        let ext = self.format.extension();
        let mut path = self.directory.join(format!("{stem}.{ext}"));
        let mut n = 2;
        while path.exists() {
            path = self.directory.join(format!("{stem} ({n}).{ext}"));
            n += 1;
        }
        path
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from_config(&ExportDefaults::default())
    }
}

fn file_stem(pattern: &str, captured_at: DateTime<Utc>) -> String {
    let local = captured_at.with_timezone(&Local);
    let mut stem = String::new();
    if write!(stem, "{}", local.format(pattern)).is_err() || stem.trim().is_empty() {
        tracing::warn!(pattern, "Invalid filename pattern, using the default");
        stem = local.format(DEFAULT_FILENAME_PATTERN).to_string();
    }
    stem.replace(['/', '\\'], "-")
}

/// A running export.
struct ExportJob {
    snapshot: Snapshot,
    output: OutputDescriptor,
    output_path: PathBuf,
    /// `None` while a tick is writing.
    session: Option<Box<dyn EncoderSession>>,
    start_export_timestamp: TimestampNs,
    /// Next output frame to write.
    video_position: u64,
    total_frames: u64,
}

impl ExportJob {
    fn progress(&self, stage: ExportStage) -> ExportProgress {
        let progress = if self.total_frames == 0 {
            0.0
        } else {
            (self.video_position as f64 / self.total_frames as f64).clamp(0.0, 1.0)
        };
        let remaining = self.total_frames.saturating_sub(self.video_position);
        ExportProgress {
            progress,
            frames_written: self.video_position,
            total_frames: self.total_frames,
            eta_secs: remaining as f64 / self.output.fps.max(1) as f64,
            stage,
        }
    }
}

#[derive(Default)]
struct ExportInner {
    state: ExportState,
    stop_requested: bool,
    job: Option<ExportJob>,
    progress: ExportProgress,
}

/// Single-job export pipeline.
#[derive(Default)]
pub struct ExportPipeline {
    inner: Mutex<ExportInner>,
    progress_callback: Option<ProgressCallback>,
}

impl ExportPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(callback: ProgressCallback) -> Self {
        Self {
            inner: Mutex::new(ExportInner::default()),
            progress_callback: Some(callback),
        }
    }

    pub fn state(&self) -> ExportState {
        self.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() != ExportState::Idle
    }

    pub fn progress(&self) -> ExportProgress {
        self.inner.lock().progress.clone()
    }

    /// Output file of the running export.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.inner.lock().job.as_ref().map(|j| j.output_path.clone())
    }

    /// Start exporting `snapshot` with the trim it carries.
    ///
    /// Fails with [`ReplayError::ResourceExhaustion`] if the encoder cannot
    /// be opened; the pipeline is back to idle in that case.
    pub fn start(
        &self,
        snapshot: Snapshot,
        settings: &ExportSettings,
        encoder: &dyn EncoderService,
        now: TimestampNs,
    ) -> ReplayResult<PathBuf> {
        {
            let mut inner = self.inner.lock();
            if inner.state != ExportState::Idle {
                return Err(ReplayError::export("An export is already running"));
            }
            inner.state = ExportState::Starting;
            inner.stop_requested = false;
            inner.progress = ExportProgress::at_stage(ExportStage::Preparing);
        }
        self.notify(ExportProgress::at_stage(ExportStage::Preparing));

        let opened = encoder_config(&snapshot, settings).and_then(|config| {
            encoder
                .open(&config)
                .map(|session| (config, session))
                .map_err(|e| {
                    ReplayError::resource_exhaustion(format!(
                        "{} encoder could not be opened: {e}",
                        encoder.name()
                    ))
                })
        });
        let (config, session) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(error = %e, "Export failed to start");
                self.finish(ExportProgress::at_stage(ExportStage::Failed));
                return Err(e);
            }
        };

        let output = config.output;
        let total_frames = (snapshot.range_len() as u128 * output.fps as u128
            / NSEC_PER_SEC as u128) as u64
            + 1;
        let job = ExportJob {
            snapshot,
            output,
            output_path: config.output_path.clone(),
            session: Some(session),
            start_export_timestamp: now,
            video_position: 0,
            total_frames,
        };
        let progress = job.progress(ExportStage::Encoding);
        {
            let mut inner = self.inner.lock();
            inner.job = Some(job);
            inner.state = ExportState::Running;
            inner.progress = progress.clone();
        }

        tracing::info!(
            output = %config.output_path.display(),
            format = ?config.format,
            lossless = config.lossless,
            total_frames,
            fps = output.fps,
            "Export started"
        );
        self.notify(progress);
        Ok(config.output_path)
    }

    /// Write every output frame due by `now`.
    ///
    /// Reaching the trimmed end, or a pending [`stop`](Self::stop), closes
    /// the encoder and returns the pipeline to idle. A tick that finds
    /// another tick still writing does nothing.
    pub fn tick(&self, now: TimestampNs) -> ReplayResult<ExportState> {
        let (snapshot, output, mut session, from, to) = {
            let mut inner = self.inner.lock();
            let state = inner.state;
            let stop = inner.stop_requested;
            if state != ExportState::Running {
                return Ok(state);
            }
            let Some(job) = inner.job.as_mut() else {
                return Ok(state);
            };
            let Some(session) = job.session.take() else {
                return Ok(state);
            };
            let to = if stop {
                job.video_position
            } else {
                let elapsed = now.saturating_sub(job.start_export_timestamp);
                let due = (elapsed as u128 * job.output.fps as u128 / NSEC_PER_SEC as u128) as u64
                    + 1;
                due.min(job.total_frames)
            };
            (
                job.snapshot.clone(),
                job.output,
                session,
                job.video_position,
                to,
            )
        };

        let mut position = from;
        let written = write_frames(&snapshot, &output, session.as_mut(), &mut position, to);

        let mut inner = self.inner.lock();
        let stop = inner.stop_requested;
        let state = inner.state;
        let Some(job) = inner.job.as_mut() else {
            return Ok(state);
        };
        job.video_position = position;
        let done = stop || position >= job.total_frames || written.is_err();
        if !done {
            job.session = Some(session);
            let progress = job.progress(ExportStage::Encoding);
            inner.progress = progress.clone();
            drop(inner);
            self.notify(progress);
            return Ok(ExportState::Running);
        }

        let finalizing = job.progress(ExportStage::Finalizing);
        inner.state = ExportState::Stopping;
        inner.progress = finalizing.clone();
        drop(inner);
        self.notify(finalizing);

        let outcome = written.and_then(|()| session.close());
        let mut inner = self.inner.lock();
        let job = inner.job.take();
        drop(inner);

        let stage = if outcome.is_ok() {
            ExportStage::Complete
        } else {
            ExportStage::Failed
        };
        let progress = job
            .as_ref()
            .map(|j| j.progress(stage))
            .unwrap_or_else(|| ExportProgress::at_stage(stage));
        match &outcome {
            Ok(()) => tracing::info!(
                frames = position,
                stopped = stop,
                output = ?job.as_ref().map(|j| j.output_path.display().to_string()),
                "Export finished"
            ),
            Err(e) => tracing::error!(error = %e, frames = position, "Export failed"),
        }
        self.finish(progress);
        outcome.map(|()| ExportState::Idle)
    }

    /// Ask the running export to stop. Takes effect on its next tick.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, ExportState::Starting | ExportState::Running)
            && !inner.stop_requested
        {
            inner.stop_requested = true;
            tracing::info!("Export stop requested");
        }
    }

    /// Mix the exported replay's audio for `[start, end)` into `out`.
    ///
    /// Times are offsets from the start of the trimmed replay, at the
    /// export's output sample rate. Returns how many packets were mixed.
    pub fn pull_audio(
        &self,
        start: TimestampNs,
        end: TimestampNs,
        out: &mut [Vec<f32>],
    ) -> ReplayResult<usize> {
        let (snapshot, rate) = {
            let inner = self.inner.lock();
            let job = inner.job.as_ref().ok_or(ReplayError::EmptySnapshot)?;
            (job.snapshot.clone(), job.output.audio_sample_rate)
        };
        if end <= start {
            return Ok(0);
        }
        let count = ns_to_frames(rate, end - start) as usize;
        let origin = snapshot.range_start() + start as i128;
        Ok(mix_into(snapshot.media().audio(), origin, rate, out, count))
    }

    fn finish(&self, progress: ExportProgress) {
        {
            let mut inner = self.inner.lock();
            inner.state = ExportState::Idle;
            inner.stop_requested = false;
            inner.job = None;
            inner.progress = progress.clone();
        }
        self.notify(progress);
    }

    fn notify(&self, progress: ExportProgress) {
        if let Some(cb) = &self.progress_callback {
            cb(progress);
        }
    }
}

fn encoder_config(snapshot: &Snapshot, settings: &ExportSettings) -> ReplayResult<EncoderConfig> {
    let media = snapshot.media();
    let first = media.first_frame_at_or_after(snapshot.range_start());
    let frame = media
        .video()
        .get(first)
        .or_else(|| media.video().first())
        .ok_or_else(|| ReplayError::unsupported("Exporting a replay without video"))?;
    Ok(EncoderConfig {
        output_path: settings.output_path(snapshot.captured_at()),
        format: settings.format,
        lossless: settings.lossless,
        source_format: frame.format,
        source_width: frame.width,
        source_height: frame.height,
        output: settings.output,
    })
}

/// Write output frames `position..to` and the audio under each of them.
///
/// Output frame `k` shows the last replay frame at or before
/// `range_start + k / fps`, or the first frame of the range while the
/// range starts before the media.
fn write_frames(
    snapshot: &Snapshot,
    output: &OutputDescriptor,
    session: &mut dyn EncoderSession,
    position: &mut u64,
    to: u64,
) -> ReplayResult<()> {
    let media = snapshot.media();
    let range_start = snapshot.range_start();
    let fallback = media.first_frame_at_or_after(range_start);
    let rate = output.audio_sample_rate;
    let mut planes = vec![Vec::new(); output.audio_channels.max(1) as usize];

    while *position < to {
        let k = *position;
        let offset = output.frame_time_ns(k);
        let index = media
            .last_frame_at_or_before(range_start + offset as i128)
            .unwrap_or(fallback);
        if let Some(frame) = media.video().get(index) {
            session.write_video(frame, offset)?;
        }

        let first_sample = output.frame_sample_offset(k);
        let count = (output.frame_sample_offset(k + 1) - first_sample) as usize;
        if count > 0 && !media.audio().is_empty() {
            for plane in &mut planes {
                plane.clear();
                plane.resize(count, 0.0);
            }
            let audio_offset = frames_to_ns(rate, first_sample);
            mix_into(
                media.audio(),
                range_start + audio_offset as i128,
                rate,
                &mut planes,
                count,
            );
            session.write_audio(&planes, count, audio_offset)?;
        }
        *position += 1;
    }
    Ok(())
}
