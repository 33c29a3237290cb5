//! Playback cursor: maps wall-clock time to a position inside a snapshot.
//!
//! The cursor is a plain state machine. Every transition is a method taking
//! the snapshot being played and the current time, so it can be driven and
//! tested without threads or clocks.
//!
//! Offsets are measured from the origin of the playback direction: the
//! trimmed start when playing forward, the trimmed end when playing
//! backward. A frame at offset `o` is due once `o <= elapsed * speed / 100`
//! and is presented at `start + o * 100 / speed`.

use rewind_common::{Direction, VisibilityAction};
use rewind_media_model::{Snapshot, TimestampNs};

use crate::speed::Speed;

/// Lifecycle of a playback cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing scheduled.
    Idle,
    /// Frames are emitted as they become due.
    Playing,
    /// Time is frozen at `pause_timestamp`.
    Paused,
    /// The trimmed boundary was reached and the end policy stopped playback.
    Ended,
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorTick {
    /// Index of the frame to present and its output timestamp.
    pub frame: Option<(usize, TimestampNs)>,
    /// The trimmed boundary was crossed; the end policy must run before the
    /// next tick.
    pub reached_end: bool,
}

/// What the audio side needs to schedule packets against the video clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTiming {
    pub start: TimestampNs,
    pub speed: Speed,
    /// Changes whenever the playhead jumps, invalidating audio positions.
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    state: PlaybackState,
    /// Wall-clock time at which offset 0 is presented. `None` anchors on the
    /// next tick.
    start_timestamp: Option<TimestampNs>,
    pause_timestamp: Option<TimestampNs>,
    speed: Speed,
    direction: Direction,
    /// Forward: index of the next candidate frame. Backward: one past it.
    video_position: usize,
    displayed: Option<usize>,
    /// Re-emit the displayed frame while paused.
    refresh: bool,
    generation: u64,
    /// Latest output timestamp; presented timestamps never go below it.
    last_output: TimestampNs,
}

impl PlaybackCursor {
    pub fn new(speed: Speed, direction: Direction) -> Self {
        Self {
            state: PlaybackState::Idle,
            start_timestamp: None,
            pause_timestamp: None,
            speed,
            direction,
            video_position: 0,
            displayed: None,
            refresh: false,
            generation: 0,
            last_output: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Current playback speed.
    pub fn speed(&self) -> Speed {
        self.speed
    }

    /// Direction frames are walked in.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Index of the frame most recently emitted.
    pub fn displayed(&self) -> Option<usize> {
        self.displayed
    }

    /// Wall-clock anchor, `None` until the next tick.
    pub fn start_timestamp(&self) -> Option<TimestampNs> {
        self.start_timestamp
    }

    /// When the cursor was paused, if it is.
    pub fn pause_timestamp(&self) -> Option<TimestampNs> {
        self.pause_timestamp
    }

    /// Next candidate frame (one past it when playing backward).
    pub fn video_position(&self) -> usize {
        self.video_position
    }

    /// Timing for audio scheduling, present only while playing forward on
    /// an anchored clock.
    pub fn audio_timing(&self) -> Option<AudioTiming> {
        if self.state != PlaybackState::Playing || !self.direction.is_forward() {
            return None;
        }
        Some(AudioTiming {
            start: self.start_timestamp?,
            speed: self.speed,
            generation: self.generation,
        })
    }

    /// Reset to the direction's origin without changing the state.
    fn rewind(&mut self, snapshot: &Snapshot) {
        self.start_timestamp = None;
        self.pause_timestamp = None;
        self.displayed = None;
        self.refresh = false;
        self.video_position = match self.direction {
            Direction::Forward => snapshot.media().first_frame_at_or_after(snapshot.range_start()),
            Direction::Backward => snapshot
                .media()
                .last_frame_at_or_before(snapshot.range_end())
                .map_or(0, |i| i + 1),
        };
        self.generation += 1;
    }

    /// Stop and forget the position.
    pub fn stop(&mut self, snapshot: &Snapshot) {
        self.rewind(snapshot);
        self.state = PlaybackState::Idle;
    }

    /// Play from the origin, anchoring on the next tick.
    pub fn restart(&mut self, snapshot: &Snapshot) {
        self.rewind(snapshot);
        self.state = PlaybackState::Playing;
    }

    /// Resume a paused cursor, or restart an idle or ended one.
    pub fn play(&mut self, snapshot: &Snapshot, now: TimestampNs) {
        match self.state {
            PlaybackState::Paused => self.resume(now),
            PlaybackState::Idle | PlaybackState::Ended => self.restart(snapshot),
            PlaybackState::Playing => {}
        }
    }

    pub fn pause(&mut self, now: TimestampNs) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            self.pause_timestamp = Some(now);
        }
    }

    /// Continue from where `pause` froze time.
    pub fn resume(&mut self, now: TimestampNs) {
        if self.state != PlaybackState::Paused {
            return;
        }
        if let (Some(start), Some(paused)) = (self.start_timestamp, self.pause_timestamp) {
            self.start_timestamp = Some(start + now.saturating_sub(paused));
        }
        self.pause_timestamp = None;
        self.refresh = false;
        self.state = PlaybackState::Playing;
    }

    pub fn toggle_pause(&mut self, snapshot: &Snapshot, now: TimestampNs) {
        match self.state {
            PlaybackState::Playing => self.pause(now),
            _ => self.play(snapshot, now),
        }
    }

    /// Stop at the boundary.
    pub fn finish(&mut self) {
        self.state = PlaybackState::Ended;
        self.refresh = false;
    }

    /// Turn around at the boundary and play back the way we came.
    pub fn bounce(&mut self, snapshot: &Snapshot) {
        self.direction = self.direction.flipped();
        self.restart(snapshot);
    }

    /// Current offset from the direction's origin, within `[0, range_len]`.
    pub fn playhead(&self, snapshot: &Snapshot, now: TimestampNs) -> i128 {
        let len = snapshot.range_len() as i128;
        match self.state {
            PlaybackState::Idle => 0,
            PlaybackState::Ended => len,
            PlaybackState::Playing | PlaybackState::Paused => match self.start_timestamp {
                Some(start) => {
                    let reference = self.reference_time(now);
                    self.speed
                        .to_snapshot(reference as i128 - start as i128)
                        .clamp(0, len)
                }
                None => 0,
            },
        }
    }

    /// Change speed keeping the playhead where it is.
    pub fn set_speed(&mut self, speed: Speed, now: TimestampNs) {
        if speed == self.speed {
            return;
        }
        if matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            if let Some(start) = self.start_timestamp {
                let reference = self.reference_time(now) as i128;
                let offset = self.speed.to_snapshot(reference - start as i128);
                self.start_timestamp = Some(clamp_ts(reference - speed.to_real(offset)));
            }
        }
        self.speed = speed;
    }

    /// Change direction. The playhead at offset `t` continues at `len - t`.
    pub fn set_direction(&mut self, direction: Direction, snapshot: &Snapshot, now: TimestampNs) {
        if direction == self.direction {
            return;
        }
        match self.state {
            PlaybackState::Idle => {
                self.direction = direction;
                self.rewind(snapshot);
            }
            PlaybackState::Ended => {
                self.direction = direction;
                self.restart(snapshot);
            }
            PlaybackState::Playing | PlaybackState::Paused => {
                let len = snapshot.range_len() as i128;
                let mirrored = len - self.playhead(snapshot, now);
                let reference = self.reference_time(now);
                self.direction = direction;
                self.seek(snapshot, mirrored, reference);
            }
        }
    }

    pub fn reverse(&mut self, snapshot: &Snapshot, now: TimestampNs) {
        self.set_direction(self.direction.flipped(), snapshot, now);
    }

    /// Move `n` frames towards later (`later = true`) or earlier timestamps,
    /// staying inside the trimmed range. Pauses on the new frame and
    /// re-emits it on the next tick.
    ///
    /// Returns false when the trimmed range holds no frame.
    pub fn step(
        &mut self,
        snapshot: &Snapshot,
        n: usize,
        later: bool,
        wrap: bool,
        now: TimestampNs,
    ) -> bool {
        let Some((lo, hi)) = snapshot.trimmed_frames() else {
            return false;
        };
        let target = match self.displayed.filter(|i| (lo..=hi).contains(i)) {
            None => match self.direction {
                Direction::Forward => lo,
                Direction::Backward => hi,
            },
            Some(base) => {
                let delta = if later { n as i128 } else { -(n as i128) };
                let moved = base as i128 + delta;
                if wrap {
                    let count = (hi - lo + 1) as i128;
                    lo + (moved - lo as i128).rem_euclid(count) as usize
                } else {
                    moved.clamp(lo as i128, hi as i128) as usize
                }
            }
        };

        let frames = snapshot.media().video();
        let offset = snapshot.offset_of(frames[target].timestamp, self.direction);
        self.start_timestamp = Some(clamp_ts(now as i128 - self.speed.to_real(offset)));
        self.pause_timestamp = Some(now);
        self.video_position = match self.direction {
            Direction::Forward => target + 1,
            Direction::Backward => target,
        };
        self.displayed = Some(target);
        self.refresh = true;
        self.state = PlaybackState::Paused;
        self.generation += 1;
        true
    }

    /// Apply the visibility action for the consumer becoming visible.
    pub fn activate(&mut self, action: VisibilityAction, snapshot: &Snapshot, now: TimestampNs) {
        match action {
            VisibilityAction::Restart => self.restart(snapshot),
            VisibilityAction::Pause | VisibilityAction::Continue => match self.state {
                PlaybackState::Paused => self.resume(now),
                PlaybackState::Idle => self.restart(snapshot),
                _ => {}
            },
            VisibilityAction::None => {}
        }
    }

    /// Apply the visibility action for the consumer being hidden.
    pub fn deactivate(&mut self, action: VisibilityAction, snapshot: &Snapshot, now: TimestampNs) {
        match action {
            VisibilityAction::Restart => self.stop(snapshot),
            VisibilityAction::Pause => self.pause(now),
            VisibilityAction::Continue | VisibilityAction::None => {}
        }
    }

    /// Advance to `now`, returning the last due frame.
    pub fn tick(&mut self, snapshot: &Snapshot, now: TimestampNs) -> CursorTick {
        match self.state {
            PlaybackState::Idle | PlaybackState::Ended => return CursorTick::default(),
            PlaybackState::Paused => return self.refresh_tick(snapshot),
            PlaybackState::Playing => {}
        }

        let start = *self.start_timestamp.get_or_insert(now);
        let len = snapshot.range_len() as i128;
        let target = self.speed.to_snapshot(now as i128 - start as i128);
        let frames = snapshot.media().video();
        let mut tick = CursorTick::default();

        loop {
            let candidate = match self.direction {
                Direction::Forward => (self.video_position < frames.len()).then_some(self.video_position),
                Direction::Backward => self.video_position.checked_sub(1),
            };
            let Some(index) = candidate else {
                tick.reached_end = target >= len;
                break;
            };

            let offset = snapshot.offset_of(frames[index].timestamp, self.direction);
            if offset > len {
                tick.reached_end = target >= len;
                break;
            }
            if offset > target {
                break;
            }

            tick.frame = Some((index, self.present(start, offset)));
            self.displayed = Some(index);
            self.video_position = match self.direction {
                Direction::Forward => index + 1,
                Direction::Backward => index,
            };
            if offset >= len {
                tick.reached_end = true;
                break;
            }
        }
        tick
    }

    fn refresh_tick(&mut self, snapshot: &Snapshot) -> CursorTick {
        if !std::mem::take(&mut self.refresh) {
            return CursorTick::default();
        }
        let (Some(index), Some(start)) = (self.displayed, self.start_timestamp) else {
            return CursorTick::default();
        };
        let Some(frame) = snapshot.media().video().get(index) else {
            return CursorTick::default();
        };
        let offset = snapshot.offset_of(frame.timestamp, self.direction);
        CursorTick {
            frame: Some((index, self.present(start, offset))),
            reached_end: false,
        }
    }

    /// Place the playhead at `offset` as of `reference`.
    fn seek(&mut self, snapshot: &Snapshot, offset: i128, reference: TimestampNs) {
        self.start_timestamp = Some(clamp_ts(reference as i128 - self.speed.to_real(offset)));
        let media = snapshot.media();
        self.video_position = match self.direction {
            Direction::Forward => media.first_frame_at_or_after(snapshot.range_start() + offset),
            Direction::Backward => media
                .last_frame_at_or_before(snapshot.range_end() - offset)
                .map_or(0, |i| i + 1),
        };
        self.generation += 1;
    }

    fn reference_time(&self, now: TimestampNs) -> TimestampNs {
        match (self.state, self.pause_timestamp) {
            (PlaybackState::Paused, Some(paused)) => paused,
            _ => now,
        }
    }

    /// Output timestamp for the frame at `offset`.
    fn present(&mut self, start: TimestampNs, offset: i128) -> TimestampNs {
        let ts = clamp_ts(start as i128 + self.speed.to_real(offset)).max(self.last_output);
        self.last_output = ts;
        ts
    }
}

fn clamp_ts(value: i128) -> TimestampNs {
    value.clamp(0, u64::MAX as i128) as u64
}
