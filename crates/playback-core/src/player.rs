//! Replay player: the snapshot store, the playback cursor and audio
//! scheduling behind the locks the host calls into.
//!
//! Lock order is store, then video, then audio. Store changes re-arm the
//! cursor while the store lock is still held, so a tick never mixes frames
//! from two snapshots. Scene switching runs after every lock is released.

use std::sync::Arc;

use parking_lot::Mutex;
use rewind_common::clock::NSEC_PER_MSEC;
use rewind_common::{
    Direction, EndAction, ReplayDefaults, ReplayError, ReplayResult, VisibilityAction,
};
use rewind_media_model::{AudioPacket, SharedFrame, Snapshot, SnapshotId, TimestampNs};

use crate::audio::AudioScheduler;
use crate::cursor::{PlaybackCursor, PlaybackState};
use crate::scene::{SceneDispatcher, SceneSwitcher};
use crate::speed::Speed;
use crate::store::{Selection, SnapshotStore};

/// Player behaviour.
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub speed: Speed,
    pub direction: Direction,
    pub end_action: EndAction,
    pub visibility_action: VisibilityAction,
    /// Scene activated when playback ends on a Hide or Pause action.
    pub next_scene: Option<String>,
    /// Number of snapshots retained.
    pub max_replays: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self::from_config(&ReplayDefaults::default())
    }
}

impl PlayerSettings {
    pub fn from_config(config: &ReplayDefaults) -> Self {
        Self {
            speed: Speed::from_percent(config.speed_percent),
            direction: config.direction,
            end_action: config.end_action,
            visibility_action: config.visibility_action,
            next_scene: config.next_scene.clone().filter(|s| !s.is_empty()),
            max_replays: config.max_replays,
        }
    }
}

/// What the consumer should show after a tick.
#[derive(Debug, Clone, Default)]
pub enum FrameOutput {
    /// Keep showing whatever is on screen.
    #[default]
    None,
    /// Present `frame` at `timestamp`.
    Frame {
        frame: SharedFrame,
        timestamp: TimestampNs,
    },
    /// Blank the output.
    Clear,
}

impl FrameOutput {
    pub fn frame(&self) -> Option<(&SharedFrame, TimestampNs)> {
        match self {
            Self::Frame { frame, timestamp } => Some((frame, *timestamp)),
            _ => None,
        }
    }
}

/// Everything produced by one [`Player::advance`].
#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    pub video: FrameOutput,
    pub audio: Vec<AudioPacket>,
}

#[derive(Debug, Clone, Copy)]
enum TrimSide {
    Front,
    End,
}

/// Work left over once the video and audio locks are released.
enum EndFollowUp {
    Scene(String),
    Switch { from: SnapshotId, forward: bool },
}

struct VideoChannel {
    active: Option<Snapshot>,
    cursor: PlaybackCursor,
    end_action: EndAction,
    visibility_action: VisibilityAction,
    next_scene: Option<String>,
    visible: bool,
    clear_pending: bool,
}

impl VideoChannel {
    /// Point the cursor at the store's current snapshot.
    fn rearm(&mut self, store: &SnapshotStore) {
        self.active = store.current().cloned();
        match &self.active {
            Some(snapshot) => {
                let autoplay = self.visible
                    || matches!(
                        self.visibility_action,
                        VisibilityAction::Continue | VisibilityAction::None
                    );
                if autoplay {
                    self.cursor.restart(snapshot);
                } else {
                    self.cursor.stop(snapshot);
                }
                tracing::debug!(snapshot = snapshot.id(), autoplay, "Player armed");
            }
            None => {
                self.cursor = PlaybackCursor::new(self.cursor.speed(), self.cursor.direction());
                self.clear_pending = true;
                tracing::debug!("Player emptied");
            }
        }
    }

    fn on_end(&mut self, snapshot: &Snapshot) -> Option<EndFollowUp> {
        if self.end_action.spans_store() {
            self.cursor.finish();
            return Some(EndFollowUp::Switch {
                from: snapshot.id(),
                forward: self.cursor.direction().is_forward(),
            });
        }
        self.apply_end(self.end_action, snapshot)
    }

    /// Apply the single-snapshot form of `action`.
    fn apply_end(&mut self, action: EndAction, snapshot: &Snapshot) -> Option<EndFollowUp> {
        match action {
            EndAction::Hide | EndAction::HideAll => {
                self.cursor.finish();
                self.clear_pending = true;
                tracing::info!(snapshot = snapshot.id(), "Replay ended, hiding");
                self.scene_follow_up()
            }
            EndAction::Pause | EndAction::PauseAll => {
                self.cursor.finish();
                tracing::info!(snapshot = snapshot.id(), "Replay ended, holding last frame");
                self.scene_follow_up()
            }
            EndAction::Loop | EndAction::LoopAll => {
                self.cursor.restart(snapshot);
                None
            }
            EndAction::Reverse | EndAction::ReverseAll => {
                self.cursor.bounce(snapshot);
                None
            }
        }
    }

    fn scene_follow_up(&self) -> Option<EndFollowUp> {
        if !self.visible {
            return None;
        }
        self.next_scene.clone().map(EndFollowUp::Scene)
    }
}

/// Plays the snapshots of a store to one consumer.
pub struct Player {
    store: Mutex<SnapshotStore>,
    video: Mutex<VideoChannel>,
    audio: Mutex<AudioScheduler>,
    scenes: Option<SceneDispatcher>,
}

impl Player {
    pub fn new(settings: PlayerSettings, switcher: Option<Arc<dyn SceneSwitcher>>) -> Self {
        Self {
            store: Mutex::new(SnapshotStore::new(settings.max_replays)),
            video: Mutex::new(VideoChannel {
                active: None,
                cursor: PlaybackCursor::new(settings.speed, settings.direction),
                end_action: settings.end_action,
                visibility_action: settings.visibility_action,
                next_scene: settings.next_scene,
                visible: true,
                clear_pending: false,
            }),
            audio: Mutex::new(AudioScheduler::default()),
            scenes: switcher.map(SceneDispatcher::new),
        }
    }

    /// Run `f` on the store, re-arming the cursor if the current snapshot
    /// changed.
    fn with_store(&self, f: impl FnOnce(&mut SnapshotStore) -> bool) -> bool {
        let mut store = self.store.lock();
        let changed = f(&mut store);
        if changed {
            self.video.lock().rearm(&store);
        }
        changed
    }

    /// Run `f` on the cursor and the active snapshot.
    fn with_cursor<R>(
        &self,
        f: impl FnOnce(&mut PlaybackCursor, &Snapshot, EndAction) -> R,
    ) -> ReplayResult<R> {
        let mut video = self.video.lock();
        let VideoChannel {
            active,
            cursor,
            end_action,
            ..
        } = &mut *video;
        let snapshot = active.as_ref().ok_or(ReplayError::EmptySnapshot)?;
        Ok(f(cursor, snapshot, *end_action))
    }

    // --- store ---

    /// Retain a new snapshot and make it current.
    pub fn push_snapshot(&self, snapshot: Snapshot) -> bool {
        self.with_store(|store| {
            let pushed = store.push(snapshot);
            store.last() || pushed
        })
    }

    pub fn select(&self, selection: Selection) -> bool {
        self.with_store(|store| store.select(selection))
    }

    pub fn remove(&self, index: usize) -> bool {
        self.with_store(|store| store.remove(index))
    }

    pub fn clear(&self) -> bool {
        self.with_store(SnapshotStore::clear)
    }

    pub fn set_max_replays(&self, max: usize) -> bool {
        self.with_store(|store| store.set_capacity(max))
    }

    pub fn snapshot_count(&self) -> usize {
        self.store.lock().len()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.store.lock().current_index()
    }

    /// The current snapshot with the trim the store holds for it.
    pub fn current_snapshot(&self) -> Option<Snapshot> {
        self.store.lock().current().cloned()
    }

    // --- transport ---

    pub fn play(&self, now: TimestampNs) -> ReplayResult<()> {
        self.with_cursor(|cursor, snapshot, _| cursor.play(snapshot, now))
    }

    pub fn pause(&self, now: TimestampNs) -> ReplayResult<()> {
        self.with_cursor(|cursor, _, _| cursor.pause(now))
    }

    pub fn toggle_pause(&self, now: TimestampNs) -> ReplayResult<()> {
        self.with_cursor(|cursor, snapshot, _| cursor.toggle_pause(snapshot, now))
    }

    pub fn restart(&self) -> ReplayResult<()> {
        self.with_cursor(|cursor, snapshot, _| cursor.restart(snapshot))
    }

    pub fn reverse(&self, now: TimestampNs) -> ReplayResult<()> {
        self.with_cursor(|cursor, snapshot, _| cursor.reverse(snapshot, now))
    }

    pub fn set_direction(&self, direction: Direction, now: TimestampNs) {
        let mut video = self.video.lock();
        let VideoChannel { active, cursor, .. } = &mut *video;
        match active {
            Some(snapshot) => cursor.set_direction(direction, snapshot, now),
            None => *cursor = PlaybackCursor::new(cursor.speed(), direction),
        }
    }

    /// Step `n` frames; wraps around when the end action loops.
    pub fn step(&self, n: usize, later: bool, now: TimestampNs) -> ReplayResult<()> {
        let stepped = self.with_cursor(|cursor, snapshot, end_action| {
            cursor.step(snapshot, n, later, end_action.wraps(), now)
        })?;
        if stepped {
            Ok(())
        } else {
            Err(ReplayError::playback("no frame inside the trimmed range"))
        }
    }

    /// Set the speed in percent, clamped to `[0.01, 400]`.
    pub fn set_speed(&self, percent: f64, now: TimestampNs) {
        self.update_speed(now, |_| Speed::from_percent(percent));
    }

    pub fn faster(&self, now: TimestampNs) {
        self.update_speed(now, Speed::faster);
    }

    pub fn slower(&self, now: TimestampNs) {
        self.update_speed(now, Speed::slower);
    }

    pub fn normal_speed(&self, now: TimestampNs) {
        self.update_speed(now, |_| Speed::NORMAL);
    }

    pub fn half_speed(&self, now: TimestampNs) {
        self.update_speed(now, |_| Speed::HALF);
    }

    fn update_speed(&self, now: TimestampNs, f: impl FnOnce(Speed) -> Speed) {
        let mut video = self.video.lock();
        let speed = f(video.cursor.speed());
        video.cursor.set_speed(speed, now);
        tracing::debug!(speed_percent = speed.percent(), "Playback speed changed");
    }

    // --- trim ---

    /// Start the replay at the frame on screen.
    pub fn trim_front(&self, now: TimestampNs) -> ReplayResult<()> {
        self.trim_at(TrimSide::Front, now)
    }

    /// End the replay at the frame on screen.
    pub fn trim_end(&self, now: TimestampNs) -> ReplayResult<()> {
        self.trim_at(TrimSide::End, now)
    }

    /// Restore the trim the snapshot was captured with.
    pub fn trim_reset(&self) -> ReplayResult<()> {
        let mut store = self.store.lock();
        let mut video = self.video.lock();
        let VideoChannel { active, cursor, .. } = &mut *video;
        let snapshot = active.as_mut().ok_or(ReplayError::EmptySnapshot)?;
        snapshot.reset_trim();
        store.set_trim(snapshot.trim())?;
        cursor.restart(snapshot);
        Ok(())
    }

    fn trim_at(&self, side: TrimSide, now: TimestampNs) -> ReplayResult<()> {
        let mut store = self.store.lock();
        let mut video = self.video.lock();
        let VideoChannel { active, cursor, .. } = &mut *video;
        let snapshot = active.as_mut().ok_or(ReplayError::EmptySnapshot)?;
        if store.current().map(Snapshot::id) != Some(snapshot.id()) {
            return Err(ReplayError::playback("active replay is not the current store slot"));
        }

        let marker = match cursor.displayed() {
            Some(index) => snapshot.media().video()[index].timestamp as i128,
            None => {
                let playhead = cursor.playhead(snapshot, now);
                match cursor.direction() {
                    Direction::Forward => snapshot.range_start() + playhead,
                    Direction::Backward => snapshot.range_end() - playhead,
                }
            }
        };
        let media = snapshot.media();
        let mut trim = snapshot.trim();
        match side {
            TrimSide::Front => trim.front = clamp_i64(marker - media.first_timestamp() as i128),
            TrimSide::End => trim.end = clamp_i64(media.last_timestamp() as i128 - marker),
        }

        snapshot.set_trim(trim)?;
        store.set_trim(trim)?;
        cursor.restart(snapshot);
        tracing::info!(
            snapshot = snapshot.id(),
            trim_front_ms = trim.front / NSEC_PER_MSEC as i64,
            trim_end_ms = trim.end / NSEC_PER_MSEC as i64,
            "Replay trimmed"
        );
        Ok(())
    }

    // --- settings and visibility ---

    pub fn set_end_action(&self, action: EndAction) {
        self.video.lock().end_action = action;
    }

    pub fn set_visibility_action(&self, action: VisibilityAction) {
        self.video.lock().visibility_action = action;
    }

    pub fn set_next_scene(&self, scene: Option<String>) {
        self.video.lock().next_scene = scene.filter(|s| !s.is_empty());
    }

    /// The consumer became visible.
    pub fn activate(&self, now: TimestampNs) {
        let mut video = self.video.lock();
        video.visible = true;
        let VideoChannel {
            active,
            cursor,
            visibility_action,
            ..
        } = &mut *video;
        if let Some(snapshot) = active {
            cursor.activate(*visibility_action, snapshot, now);
        }
    }

    /// The consumer was hidden.
    pub fn deactivate(&self, now: TimestampNs) {
        let mut video = self.video.lock();
        video.visible = false;
        let VideoChannel {
            active,
            cursor,
            visibility_action,
            ..
        } = &mut *video;
        if let Some(snapshot) = active {
            cursor.deactivate(*visibility_action, snapshot, now);
        }
    }

    // --- queries ---

    pub fn state(&self) -> PlaybackState {
        self.video.lock().cursor.state()
    }

    pub fn speed_percent(&self) -> f64 {
        self.video.lock().cursor.speed().percent()
    }

    pub fn direction(&self) -> Direction {
        self.video.lock().cursor.direction()
    }

    pub fn end_action(&self) -> EndAction {
        self.video.lock().end_action
    }

    /// Index of the frame on screen within the active snapshot.
    pub fn displayed_frame(&self) -> Option<usize> {
        self.video.lock().cursor.displayed()
    }

    // --- ticking ---

    /// Produce the frame and audio due at `now` and run the end policy.
    pub fn advance(&self, now: TimestampNs) -> TickOutput {
        let mut output = TickOutput::default();
        let follow_up = {
            let mut video = self.video.lock();
            let mut audio = self.audio.lock();

            if std::mem::take(&mut video.clear_pending) {
                output.video = FrameOutput::Clear;
            }
            let Some(snapshot) = video.active.clone() else {
                return output;
            };

            let tick = video.cursor.tick(&snapshot, now);
            if let Some((index, timestamp)) = tick.frame {
                output.video = FrameOutput::Frame {
                    frame: snapshot.media().video()[index].clone(),
                    timestamp,
                };
            }
            output.audio = audio.drain(&snapshot, video.cursor.audio_timing(), now);

            if tick.reached_end {
                video.on_end(&snapshot)
            } else {
                None
            }
        };

        match follow_up {
            Some(EndFollowUp::Scene(scene)) => self.dispatch_scene(&scene),
            Some(EndFollowUp::Switch { from, forward }) => self.switch_after_end(from, forward),
            None => {}
        }
        output
    }

    /// Audio due at `now`, for hosts that pull audio separately from video.
    pub fn pull_audio(&self, now: TimestampNs) -> Vec<AudioPacket> {
        let (snapshot, timing) = {
            let video = self.video.lock();
            (video.active.clone(), video.cursor.audio_timing())
        };
        match snapshot {
            Some(snapshot) => self.audio.lock().drain(&snapshot, timing, now),
            None => Vec::new(),
        }
    }

    /// Move to the neighbouring snapshot after `from` ended, unless something
    /// else changed the player in between.
    fn switch_after_end(&self, from: SnapshotId, forward: bool) {
        let follow_up = {
            let mut store = self.store.lock();
            let mut video = self.video.lock();
            let untouched = video.active.as_ref().map(Snapshot::id) == Some(from)
                && video.cursor.state() == PlaybackState::Ended
                && store.current().map(Snapshot::id) == Some(from);
            if !untouched {
                return;
            }

            let single = video.end_action.single();
            let mut moved = if forward { store.next() } else { store.previous() };
            if !moved && single == EndAction::Loop {
                moved = if forward { store.first() } else { store.last() };
            }

            if moved {
                video.active = store.current().cloned();
                let VideoChannel { active, cursor, .. } = &mut *video;
                if let Some(snapshot) = active {
                    cursor.restart(snapshot);
                    tracing::info!(snapshot = snapshot.id(), "Continuing with next replay");
                }
                None
            } else {
                let snapshot = video.active.clone();
                snapshot.and_then(|snapshot| video.apply_end(single, &snapshot))
            }
        };

        if let Some(EndFollowUp::Scene(scene)) = follow_up {
            self.dispatch_scene(&scene);
        }
    }

    fn dispatch_scene(&self, scene: &str) {
        match &self.scenes {
            Some(scenes) => scenes.dispatch(scene),
            None => tracing::debug!(scene, "No scene switcher configured"),
        }
    }
}

fn clamp_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_media_model::{AudioFormat, ReplayMedia, Trim, VideoFormat, VideoFrame};

    const MS: u64 = 1_000_000;
    const SEC: u64 = 1_000 * MS;

    /// 1s at 10fps with matching audio, starting at `base`.
    fn snapshot(base: u64) -> Snapshot {
        let format = AudioFormat {
            sample_rate: 1000,
            channels: 1,
        };
        let video: Vec<SharedFrame> = (0..=10)
            .map(|i| Arc::new(VideoFrame::new(VideoFormat::Y800, 2, 2, base + i * 100 * MS)))
            .collect();
        let audio = (0..10)
            .map(|i| AudioPacket::new(base + i * 100 * MS, format, vec![vec![0.5; 100]]))
            .collect();
        Snapshot::new(ReplayMedia::new(video, audio, base, base + SEC), Trim::ZERO)
    }

    fn player(end_action: EndAction, max_replays: usize) -> Player {
        Player::new(
            PlayerSettings {
                end_action,
                max_replays,
                ..PlayerSettings::default()
            },
            None,
        )
    }

    fn frame_ts(output: &TickOutput) -> Option<u64> {
        output.video.frame().map(|(frame, _)| frame.timestamp)
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl SceneSwitcher for Recorder {
        fn activate(&self, scene: &str) {
            self.0.lock().push(scene.to_string());
        }
    }

    #[test]
    fn test_push_arms_and_plays() {
        let player = player(EndAction::Loop, 1);
        assert!(player.push_snapshot(snapshot(100 * SEC)));
        assert_eq!(player.state(), PlaybackState::Playing);
        let out = player.advance(SEC);
        assert_eq!(frame_ts(&out), Some(100 * SEC));
        assert_eq!(out.audio.len(), 1);
    }

    #[test]
    fn test_empty_player_is_a_no_op() {
        let player = player(EndAction::Loop, 1);
        assert!(matches!(player.advance(SEC).video, FrameOutput::None));
        assert!(matches!(player.play(SEC), Err(ReplayError::EmptySnapshot)));
        assert!(matches!(player.trim_front(SEC), Err(ReplayError::EmptySnapshot)));
    }

    #[test]
    fn test_loop_restarts_at_next_tick() {
        let player = player(EndAction::Loop, 1);
        player.push_snapshot(snapshot(100 * SEC));
        player.advance(SEC);
        let out = player.advance(2 * SEC);
        assert_eq!(frame_ts(&out), Some(101 * SEC));
        assert_eq!(player.state(), PlaybackState::Playing);

        let out = player.advance(2 * SEC + 10 * MS);
        assert_eq!(frame_ts(&out), Some(100 * SEC));
        assert_eq!(out.video.frame().map(|(_, ts)| ts), Some(2 * SEC + 10 * MS));
    }

    #[test]
    fn test_hide_clears_once_and_switches_scene() {
        let recorder = Arc::new(Recorder::default());
        let player = Player::new(
            PlayerSettings {
                end_action: EndAction::Hide,
                next_scene: Some("Live".to_string()),
                ..PlayerSettings::default()
            },
            Some(recorder.clone()),
        );
        player.push_snapshot(snapshot(100 * SEC));
        player.advance(SEC);
        player.advance(2 * SEC);
        assert_eq!(player.state(), PlaybackState::Ended);
        assert!(matches!(player.advance(3 * SEC).video, FrameOutput::Clear));
        assert!(matches!(player.advance(4 * SEC).video, FrameOutput::None));

        drop(player);
        assert_eq!(*recorder.0.lock(), vec!["Live"]);
    }

    #[test]
    fn test_pause_all_walks_store_then_pauses() {
        let player = player(EndAction::PauseAll, 3);
        player.push_snapshot(snapshot(100 * SEC));
        player.push_snapshot(snapshot(200 * SEC));
        player.select(Selection::First);

        player.advance(SEC);
        player.advance(2 * SEC);
        assert_eq!(player.current_index(), Some(1));
        assert_eq!(player.state(), PlaybackState::Playing);

        let out = player.advance(2 * SEC + MS);
        assert_eq!(frame_ts(&out), Some(200 * SEC));
        player.advance(4 * SEC);
        assert_eq!(player.current_index(), Some(1));
        assert_eq!(player.state(), PlaybackState::Ended);
    }

    #[test]
    fn test_loop_all_wraps_to_first() {
        let player = player(EndAction::LoopAll, 2);
        player.push_snapshot(snapshot(100 * SEC));
        player.push_snapshot(snapshot(200 * SEC));
        assert_eq!(player.current_index(), Some(1));
        player.advance(SEC);
        player.advance(2 * SEC);
        assert_eq!(player.current_index(), Some(0));
        assert_eq!(player.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_reverse_end_action_bounces() {
        let player = player(EndAction::Reverse, 1);
        player.push_snapshot(snapshot(100 * SEC));
        player.advance(SEC);
        player.advance(2 * SEC);
        assert_eq!(player.direction(), Direction::Backward);
        let out = player.advance(2 * SEC + MS);
        assert_eq!(frame_ts(&out), Some(101 * SEC));
        assert!(out.audio.is_empty());
    }

    #[test]
    fn test_trim_front_at_displayed_frame_and_reset() {
        let player = player(EndAction::Loop, 1);
        player.push_snapshot(snapshot(100 * SEC));
        player.advance(SEC);
        player.advance(SEC + 300 * MS);
        player.trim_front(SEC + 300 * MS).unwrap();

        let current = player.current_snapshot().unwrap();
        assert_eq!(current.trim().front, 300 * MS as i64);
        let out = player.advance(2 * SEC);
        assert_eq!(frame_ts(&out), Some(100 * SEC + 300 * MS));

        player.trim_reset().unwrap();
        assert_eq!(player.current_snapshot().unwrap().trim(), Trim::ZERO);
    }

    #[test]
    fn test_trim_end_before_front_is_rejected() {
        let player = player(EndAction::Loop, 1);
        player.push_snapshot(snapshot(100 * SEC));
        player.advance(SEC);
        player.advance(SEC + 600 * MS);
        player.trim_front(SEC + 600 * MS).unwrap();
        // Restarted at the new front; trimming the end here would empty the range.
        player.advance(2 * SEC);
        let err = player.trim_end(2 * SEC).unwrap_err();
        assert!(matches!(err, ReplayError::InvalidRange { .. }));
    }

    #[test]
    fn test_store_change_rearms_cursor() {
        let player = player(EndAction::Loop, 2);
        player.push_snapshot(snapshot(100 * SEC));
        player.advance(SEC);
        player.advance(SEC + 500 * MS);
        player.push_snapshot(snapshot(200 * SEC));
        let out = player.advance(SEC + 600 * MS);
        assert_eq!(frame_ts(&out), Some(200 * SEC));
    }

    #[test]
    fn test_clear_emits_clear() {
        let player = player(EndAction::Loop, 1);
        player.push_snapshot(snapshot(100 * SEC));
        player.advance(SEC);
        assert!(player.clear());
        assert!(matches!(player.advance(SEC + MS).video, FrameOutput::Clear));
        assert_eq!(player.snapshot_count(), 0);
    }

    #[test]
    fn test_hidden_with_restart_action_waits_for_activation() {
        let player = Player::new(
            PlayerSettings {
                visibility_action: VisibilityAction::Restart,
                ..PlayerSettings::default()
            },
            None,
        );
        player.deactivate(0);
        player.push_snapshot(snapshot(100 * SEC));
        assert_eq!(player.state(), PlaybackState::Idle);
        player.activate(SEC);
        assert_eq!(player.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_pull_audio_matches_advance_timing() {
        let player = player(EndAction::Loop, 1);
        player.push_snapshot(snapshot(100 * SEC));
        player.advance(SEC);
        let audio = player.pull_audio(SEC + 200 * MS);
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[1].timestamp, SEC + 200 * MS);
    }
}
