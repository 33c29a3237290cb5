//! The replay engine facade.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use rewind_capture_engine::{extract, CaptureRegistry, CaptureWindow, ExtractOptions, WindowConfig};
use rewind_common::clock::{Clock, MonotonicClock, NSEC_PER_MSEC};
use rewind_common::config::{AppConfig, Direction, EndAction, ExportFormat, VisibilityAction};
use rewind_common::error::{ReplayError, ReplayResult};
use rewind_export_engine::{
    EncoderService, ExportPipeline, ExportProgress, ExportSettings, ExportState, FfmpegEncoder,
    ProgressCallback,
};
use rewind_media_model::{AudioPacket, Snapshot, SnapshotId, TimestampNs};
use rewind_playback_core::{
    PlaybackState, Player, PlayerSettings, SceneSwitcher, Selection, TickOutput,
};

/// Collaborators the engine talks to.
pub struct EngineServices {
    pub clock: Arc<dyn Clock>,
    pub encoder: Arc<dyn EncoderService>,
    pub scene_switcher: Option<Arc<dyn SceneSwitcher>>,
    pub export_progress: Option<ProgressCallback>,
}

impl Default for EngineServices {
    fn default() -> Self {
        Self {
            clock: Arc::new(MonotonicClock::start()),
            encoder: Arc::new(FfmpegEncoder::new()),
            scene_switcher: None,
            export_progress: None,
        }
    }
}

/// Instant replay engine.
///
/// Every method is callable from any thread. Playback is driven by
/// [`advance`](Self::advance), exports by [`export_tick`](Self::export_tick);
/// the two never block each other beyond a short lock on shared state.
pub struct ReplayEngine {
    clock: Arc<dyn Clock>,
    captures: CaptureRegistry,
    /// Producer whose window a trigger captures.
    source: RwLock<Option<String>>,
    start_delay_ns: RwLock<i64>,
    player: Player,
    export: ExportPipeline,
    export_settings: RwLock<ExportSettings>,
    encoder: Arc<dyn EncoderService>,
}

impl ReplayEngine {
    pub fn new(config: &AppConfig, services: EngineServices) -> Self {
        let replay = &config.replay;
        let window = WindowConfig {
            duration_ns: replay.duration_ns(),
            ..WindowConfig::default()
        };
        let export = match services.export_progress {
            Some(cb) => ExportPipeline::with_progress(cb),
            None => ExportPipeline::new(),
        };
        tracing::debug!(
            duration_ms = replay.duration_ms,
            max_replays = replay.max_replays,
            end_action = ?replay.end_action,
            encoder = services.encoder.name(),
            "Replay engine created"
        );
        Self {
            captures: CaptureRegistry::new(services.clock.clone(), window),
            clock: services.clock,
            source: RwLock::new(None),
            start_delay_ns: RwLock::new(replay.start_delay_ns()),
            player: Player::new(PlayerSettings::from_config(replay), services.scene_switcher),
            export,
            export_settings: RwLock::new(ExportSettings::from_config(&config.export)),
            encoder: services.encoder,
        }
    }

    /// An engine on the monotonic clock exporting through ffmpeg.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config, EngineServices::default())
    }

    pub fn now(&self) -> TimestampNs {
        self.clock.now_ns()
    }

    // --- producers ---

    /// Attach a producer and return the window it pushes into.
    ///
    /// The first producer attached becomes the capture source.
    pub fn attach(&self, producer: &str) -> Arc<CaptureWindow> {
        let window = self.captures.attach(producer);
        let mut source = self.source.write();
        if source.is_none() {
            *source = Some(producer.to_string());
        }
        window
    }

    /// Detach a producer, discarding whatever its window held.
    pub fn detach(&self, producer: &str) -> bool {
        let detached = self.captures.detach(producer);
        let mut source = self.source.write();
        if source.as_deref() == Some(producer) {
            *source = self.captures.producers().into_iter().next();
        }
        detached
    }

    /// Capture from `producer` on the next trigger.
    pub fn set_source(&self, producer: &str) -> ReplayResult<()> {
        if self.captures.get(producer).is_none() {
            return Err(ReplayError::capture(format!("producer '{producer}' is not attached")));
        }
        *self.source.write() = Some(producer.to_string());
        Ok(())
    }

    pub fn source(&self) -> Option<String> {
        self.source.read().clone()
    }

    pub fn producers(&self) -> Vec<String> {
        self.captures.producers()
    }

    /// Change how much history every window keeps. Shortening clears them.
    pub fn set_duration(&self, duration_ns: u64) {
        self.captures.set_duration(duration_ns);
        tracing::info!(duration_ms = duration_ns / NSEC_PER_MSEC, "Replay duration changed");
    }

    pub fn duration_ns(&self) -> u64 {
        self.captures.duration_ns()
    }

    /// Delay applied as the default trim of future captures.
    pub fn set_start_delay(&self, delay_ns: i64) {
        *self.start_delay_ns.write() = delay_ns;
    }

    /// Freeze the source window into a new replay and show it.
    ///
    /// Fails with [`ReplayError::EmptySnapshot`] if the window holds nothing.
    pub fn trigger_capture(&self) -> ReplayResult<SnapshotId> {
        let producer = self
            .source()
            .ok_or_else(|| ReplayError::capture("no producer attached"))?;
        let window = self
            .captures
            .get(&producer)
            .ok_or_else(|| ReplayError::capture(format!("producer '{producer}' is not attached")))?;
        let options = ExtractOptions {
            start_delay_ns: *self.start_delay_ns.read(),
            direction: self.player.direction(),
        };
        let snapshot = extract(&window, &options).ok_or(ReplayError::EmptySnapshot)?;
        let id = snapshot.id();
        self.player.push_snapshot(snapshot);
        tracing::info!(
            snapshot = id,
            replays = self.player.snapshot_count(),
            "Replay stored"
        );
        Ok(id)
    }

    // --- store ---

    pub fn select(&self, selection: Selection) -> bool {
        self.player.select(selection)
    }

    pub fn remove(&self, index: usize) -> bool {
        self.player.remove(index)
    }

    pub fn clear(&self) -> bool {
        self.player.clear()
    }

    pub fn set_max_replays(&self, max: usize) -> bool {
        self.player.set_max_replays(max)
    }

    pub fn snapshot_count(&self) -> usize {
        self.player.snapshot_count()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.player.current_index()
    }

    pub fn current_snapshot(&self) -> Option<Snapshot> {
        self.player.current_snapshot()
    }

    // --- transport ---

    pub fn play(&self) -> ReplayResult<()> {
        self.player.play(self.now())
    }

    pub fn pause(&self) -> ReplayResult<()> {
        self.player.pause(self.now())
    }

    pub fn toggle_pause(&self) -> ReplayResult<()> {
        self.player.toggle_pause(self.now())
    }

    pub fn restart(&self) -> ReplayResult<()> {
        self.player.restart()
    }

    pub fn reverse(&self) -> ReplayResult<()> {
        self.player.reverse(self.now())
    }

    pub fn set_direction(&self, direction: Direction) {
        self.player.set_direction(direction, self.now());
    }

    pub fn step(&self, n: usize, later: bool) -> ReplayResult<()> {
        self.player.step(n, later, self.now())
    }

    pub fn set_speed(&self, percent: f64) {
        self.player.set_speed(percent, self.now());
    }

    pub fn faster(&self) {
        self.player.faster(self.now());
    }

    pub fn slower(&self) {
        self.player.slower(self.now());
    }

    pub fn normal_speed(&self) {
        self.player.normal_speed(self.now());
    }

    pub fn half_speed(&self) {
        self.player.half_speed(self.now());
    }

    pub fn trim_front(&self) -> ReplayResult<()> {
        self.player.trim_front(self.now())
    }

    pub fn trim_end(&self) -> ReplayResult<()> {
        self.player.trim_end(self.now())
    }

    pub fn trim_reset(&self) -> ReplayResult<()> {
        self.player.trim_reset()
    }

    pub fn set_end_action(&self, action: EndAction) {
        self.player.set_end_action(action);
    }

    pub fn set_visibility_action(&self, action: VisibilityAction) {
        self.player.set_visibility_action(action);
    }

    pub fn set_next_scene(&self, scene: Option<String>) {
        self.player.set_next_scene(scene);
    }

    pub fn activate(&self) {
        self.player.activate(self.now());
    }

    pub fn deactivate(&self) {
        self.player.deactivate(self.now());
    }

    pub fn state(&self) -> PlaybackState {
        self.player.state()
    }

    pub fn speed_percent(&self) -> f64 {
        self.player.speed_percent()
    }

    pub fn direction(&self) -> Direction {
        self.player.direction()
    }

    /// The frame and audio due now.
    pub fn advance(&self) -> TickOutput {
        self.player.advance(self.now())
    }

    /// Audio due now, for hosts that pull audio on their own schedule.
    pub fn pull_audio(&self) -> Vec<AudioPacket> {
        self.player.pull_audio(self.now())
    }

    // --- export ---

    /// Export the current replay with its current trim.
    pub fn start_export(
        &self,
        directory: &Path,
        format: ExportFormat,
        lossless: bool,
    ) -> ReplayResult<PathBuf> {
        let settings = ExportSettings {
            directory: directory.to_path_buf(),
            format,
            lossless,
            ..self.export_settings.read().clone()
        };
        self.start_export_with(&settings)
    }

    /// Export the current replay with the configured export settings.
    pub fn start_export_default(&self) -> ReplayResult<PathBuf> {
        let settings = self.export_settings.read().clone();
        self.start_export_with(&settings)
    }

    fn start_export_with(&self, settings: &ExportSettings) -> ReplayResult<PathBuf> {
        let snapshot = self.current_snapshot().ok_or(ReplayError::EmptySnapshot)?;
        self.export
            .start(snapshot, settings, self.encoder.as_ref(), self.now())
    }

    pub fn set_export_settings(&self, settings: ExportSettings) {
        *self.export_settings.write() = settings;
    }

    pub fn export_settings(&self) -> ExportSettings {
        self.export_settings.read().clone()
    }

    /// Write the export frames due now.
    pub fn export_tick(&self) -> ReplayResult<ExportState> {
        self.export.tick(self.now())
    }

    pub fn stop_export(&self) {
        self.export.stop();
    }

    /// Mix the exported replay's audio for `[start, end)` into `out`.
    pub fn pull_export_audio(
        &self,
        start: TimestampNs,
        end: TimestampNs,
        out: &mut [Vec<f32>],
    ) -> ReplayResult<usize> {
        self.export.pull_audio(start, end, out)
    }

    pub fn export_state(&self) -> ExportState {
        self.export.state()
    }

    pub fn export_progress(&self) -> ExportProgress {
        self.export.progress()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_common::clock::ManualClock;
    use rewind_media_model::{VideoFormat, VideoFrame};

    const MS: u64 = NSEC_PER_MSEC;

    fn engine(clock: Arc<ManualClock>) -> ReplayEngine {
        ReplayEngine::new(
            &AppConfig::default(),
            EngineServices {
                clock,
                ..EngineServices::default()
            },
        )
    }

    #[test]
    fn test_first_attached_producer_is_source() {
        let engine = engine(Arc::new(ManualClock::new(MS)));
        engine.attach("camera");
        engine.attach("screen");
        assert_eq!(engine.source().as_deref(), Some("camera"));

        assert!(engine.detach("camera"));
        assert_eq!(engine.source().as_deref(), Some("screen"));
        assert!(engine.set_source("camera").is_err());
    }

    #[test]
    fn test_trigger_without_source_or_media() {
        let engine = engine(Arc::new(ManualClock::new(MS)));
        assert!(matches!(
            engine.trigger_capture(),
            Err(ReplayError::Capture { .. })
        ));
        engine.attach("camera");
        assert!(matches!(
            engine.trigger_capture(),
            Err(ReplayError::EmptySnapshot)
        ));
    }

    #[test]
    fn test_trigger_stores_and_plays() {
        let clock = Arc::new(ManualClock::new(1_000 * MS));
        let engine = engine(clock.clone());
        let window = engine.attach("camera");
        for _ in 0..10 {
            let ts = clock.advance(100 * MS);
            window.push_video_frame(VideoFrame::new(VideoFormat::Y800, 2, 2, ts));
        }
        let id = engine.trigger_capture().unwrap();
        assert_eq!(engine.current_snapshot().map(|s| s.id()), Some(id));
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(engine.advance().video.frame().is_some());
        assert_eq!(window.stats().video_frames, 0);
    }

    #[test]
    fn test_export_without_replay_is_empty() {
        let engine = engine(Arc::new(ManualClock::new(MS)));
        let dir = std::env::temp_dir();
        assert!(matches!(
            engine.start_export(&dir, ExportFormat::Mkv, false),
            Err(ReplayError::EmptySnapshot)
        ));
        assert_eq!(engine.export_state(), ExportState::Idle);
    }
}
