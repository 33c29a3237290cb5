//! Bounded capture window with timestamp resynchronization.
//!
//! Each producer feeds one window. Video and audio live behind separate
//! locks so a producer pushing audio never waits on a video push. When both
//! are needed (extraction, clearing) the video lock is taken first.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rewind_common::clock::{Clock, DriftMeasurement, NSEC_PER_MSEC, NSEC_PER_SEC};
use rewind_media_model::{AudioPacket, SharedFrame, TimestampNs, VideoFrame};

/// Largest accepted gap between a producer timestamp and the clock before
/// the stream is resynchronized.
pub const DRIFT_TOLERANCE_NS: u64 = 2 * NSEC_PER_SEC;

/// Extra span audio may keep beyond the window duration.
pub const AUDIO_EVICTION_SLACK_NS: u64 = 50 * NSEC_PER_MSEC;

/// Window settings.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// Maximum span between the oldest and newest video frame (ns).
    pub duration_ns: u64,
    /// Store frames with tightly packed planes, dropping producer padding.
    pub pack_frames: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            duration_ns: 5 * NSEC_PER_SEC,
            pack_frames: false,
        }
    }
}

/// Counters describing what a window currently holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub video_frames: usize,
    pub audio_packets: usize,
    /// `newest - oldest` video timestamp.
    pub video_span_ns: u64,
    /// `newest - oldest` audio packet start.
    pub audio_span_ns: u64,
}

/// Everything moved out of a window in one step.
#[derive(Debug, Default)]
pub struct WindowContents {
    pub video: Vec<SharedFrame>,
    pub audio: Vec<AudioPacket>,
}

#[derive(Debug, Default)]
struct VideoTrack {
    frames: VecDeque<SharedFrame>,
    timing_adjust: i64,
}

#[derive(Debug, Default)]
struct AudioTrack {
    packets: VecDeque<AudioPacket>,
    timing_adjust: i64,
}

/// A producer's rolling window of recent frames and audio packets.
pub struct CaptureWindow {
    producer: String,
    clock: Arc<dyn Clock>,
    duration_ns: AtomicU64,
    pack_frames: bool,
    video: Mutex<VideoTrack>,
    audio: Mutex<AudioTrack>,
}

impl std::fmt::Debug for CaptureWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureWindow")
            .field("producer", &self.producer)
            .field("duration_ns", &self.duration_ns())
            .field("stats", &self.stats())
            .finish()
    }
}

impl CaptureWindow {
    pub fn new(producer: impl Into<String>, clock: Arc<dyn Clock>, config: WindowConfig) -> Self {
        Self {
            producer: producer.into(),
            clock,
            duration_ns: AtomicU64::new(config.duration_ns),
            pack_frames: config.pack_frames,
            video: Mutex::new(VideoTrack::default()),
            audio: Mutex::new(AudioTrack::default()),
        }
    }

    /// Name of the producer feeding this window.
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Maximum video span kept (ns).
    pub fn duration_ns(&self) -> u64 {
        self.duration_ns.load(Ordering::Acquire)
    }

    /// Change the window duration. Shortening it discards everything held.
    pub fn set_duration(&self, duration_ns: u64) {
        let previous = self.duration_ns.swap(duration_ns, Ordering::AcqRel);
        if duration_ns < previous {
            tracing::debug!(
                producer = %self.producer,
                previous_ms = previous / NSEC_PER_MSEC,
                duration_ms = duration_ns / NSEC_PER_MSEC,
                "Window shortened, clearing"
            );
            self.clear();
        }
    }

    /// Store a video frame. Malformed frames are dropped.
    ///
    /// Returns whether the frame was stored.
    pub fn push_video_frame(&self, mut frame: VideoFrame) -> bool {
        if frame.is_malformed() {
            tracing::trace!(producer = %self.producer, "Dropping malformed video frame");
            return false;
        }
        if self.pack_frames {
            match frame.to_packed() {
                Ok(packed) => frame = packed,
                Err(e) => {
                    tracing::trace!(producer = %self.producer, error = %e, "Dropping unpackable frame");
                    return false;
                }
            }
        }

        let now = self.clock.now_ns();
        let duration = self.duration_ns();
        let mut video = self.video.lock();

        let newest = video.frames.back().map(|f| f.timestamp);
        frame.timestamp = resync(
            &self.producer,
            "video",
            frame.timestamp,
            now,
            &mut video.timing_adjust,
            newest,
        );
        video.frames.push_back(Arc::new(frame));

        let newest = video.frames.back().map_or(0, |f| f.timestamp);
        while let Some(head) = video.frames.front() {
            if newest - head.timestamp <= duration {
                break;
            }
            video.frames.pop_front();
        }
        true
    }

    /// Store an audio packet. Empty packets are dropped.
    ///
    /// Returns whether the packet was stored.
    pub fn push_audio_packet(&self, mut packet: AudioPacket) -> bool {
        if packet.is_empty() {
            tracing::trace!(producer = %self.producer, "Dropping empty audio packet");
            return false;
        }

        let now = self.clock.now_ns();
        let limit = self.duration_ns().saturating_add(AUDIO_EVICTION_SLACK_NS);
        let mut audio = self.audio.lock();

        let newest = audio.packets.back().map(|p| p.timestamp);
        packet.timestamp = resync(
            &self.producer,
            "audio",
            packet.timestamp,
            now,
            &mut audio.timing_adjust,
            newest,
        );
        let newest = packet.timestamp;
        audio.packets.push_back(packet);

        while let Some(head) = audio.packets.front() {
            if newest - head.timestamp <= limit {
                break;
            }
            audio.packets.pop_front();
        }
        true
    }

    /// Discard all frames and packets and forget any timing adjustment.
    pub fn clear(&self) {
        let mut video = self.video.lock();
        let mut audio = self.audio.lock();
        *video = VideoTrack::default();
        *audio = AudioTrack::default();
    }

    /// Move everything out, leaving the window empty.
    ///
    /// Both locks are held for the whole move so no producer push can land
    /// between the video and audio halves.
    pub fn drain(&self) -> WindowContents {
        let mut video = self.video.lock();
        let mut audio = self.audio.lock();
        WindowContents {
            video: std::mem::take(&mut video.frames).into(),
            audio: std::mem::take(&mut audio.packets).into(),
        }
    }

    pub fn stats(&self) -> WindowStats {
        let video = self.video.lock();
        let audio = self.audio.lock();
        WindowStats {
            video_frames: video.frames.len(),
            audio_packets: audio.packets.len(),
            video_span_ns: span(
                video.frames.front().map(|f| f.timestamp),
                video.frames.back().map(|f| f.timestamp),
            ),
            audio_span_ns: span(
                audio.packets.front().map(|p| p.timestamp),
                audio.packets.back().map(|p| p.timestamp),
            ),
        }
    }
}

fn span(oldest: Option<TimestampNs>, newest: Option<TimestampNs>) -> u64 {
    match (oldest, newest) {
        (Some(oldest), Some(newest)) => newest.saturating_sub(oldest),
        _ => 0,
    }
}

/// Map a producer timestamp into the clock's domain.
///
/// A zero timestamp means "now". An active adjustment is dropped once the
/// producer is back within tolerance of the clock; a timestamp still outside
/// tolerance after adjustment re-anchors the stream at `now`. The result is
/// never older than `newest`.
fn resync(
    producer: &str,
    stream: &'static str,
    timestamp: TimestampNs,
    now: TimestampNs,
    timing_adjust: &mut i64,
    newest: Option<TimestampNs>,
) -> TimestampNs {
    let ts = if timestamp == 0 { now } else { timestamp };

    let raw = DriftMeasurement {
        reference_ns: now,
        measured_ns: ts,
    };
    if *timing_adjust != 0 && raw.within_ns(DRIFT_TOLERANCE_NS) {
        tracing::debug!(producer, stream, "Producer back in sync, dropping timing adjustment");
        *timing_adjust = 0;
    }

    let mut adjusted = (ts as i128 + *timing_adjust as i128).max(0) as u64;
    let drift = DriftMeasurement {
        reference_ns: now,
        measured_ns: adjusted,
    };
    if drift.exceeds_ns(DRIFT_TOLERANCE_NS) {
        tracing::debug!(
            producer,
            stream,
            drift_ms = drift.drift_ms(),
            "Timestamp drift exceeds tolerance, resynchronizing"
        );
        *timing_adjust = raw.drift_ns().saturating_neg();
        adjusted = now;
    }

    match newest {
        Some(newest) => adjusted.max(newest),
        None => adjusted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rewind_common::clock::ManualClock;
    use rewind_media_model::{AudioFormat, VideoFormat};

    const MS: u64 = NSEC_PER_MSEC;
    const SEC: u64 = NSEC_PER_SEC;

    fn window(duration_ns: u64) -> (Arc<ManualClock>, CaptureWindow) {
        let clock = Arc::new(ManualClock::new(100 * SEC));
        let window = CaptureWindow::new(
            "camera",
            clock.clone(),
            WindowConfig {
                duration_ns,
                pack_frames: false,
            },
        );
        (clock, window)
    }

    fn frame(ts: u64) -> VideoFrame {
        VideoFrame::new(VideoFormat::Y800, 4, 4, ts)
    }

    fn packet(ts: u64, frames: usize) -> AudioPacket {
        AudioPacket::new(ts, AudioFormat::default(), vec![vec![0.0; frames]; 2])
    }

    #[test]
    fn test_eviction_keeps_span_within_duration() {
        let (clock, window) = window(SEC);
        for i in 0..60u64 {
            let ts = 100 * SEC + i * 33 * MS;
            clock.set(ts);
            assert!(window.push_video_frame(frame(ts)));
        }
        let stats = window.stats();
        assert!(stats.video_span_ns <= SEC);
        assert_eq!(stats.video_frames, 31);
    }

    #[test]
    fn test_zero_timestamp_uses_clock() {
        let (_clock, window) = window(SEC);
        window.push_video_frame(frame(0));
        let contents = window.drain();
        assert_eq!(contents.video[0].timestamp, 100 * SEC);
    }

    #[test]
    fn test_drifted_producer_is_resynchronized() {
        let (clock, window) = window(10 * SEC);
        // Producer clock is 50s behind the host.
        window.push_video_frame(frame(50 * SEC));
        clock.advance(100 * MS);
        window.push_video_frame(frame(50 * SEC + 100 * MS));

        let contents = window.drain();
        assert_eq!(contents.video[0].timestamp, 100 * SEC);
        assert_eq!(contents.video[1].timestamp, 100 * SEC + 100 * MS);
    }

    #[test]
    fn test_adjustment_dropped_when_producer_recovers() {
        let (clock, window) = window(10 * SEC);
        window.push_video_frame(frame(50 * SEC));
        clock.advance(100 * MS);
        // Producer jumps back onto the host clock.
        window.push_video_frame(frame(100 * SEC + 100 * MS));
        clock.advance(100 * MS);
        window.push_video_frame(frame(100 * SEC + 200 * MS));

        let contents = window.drain();
        let ts: Vec<u64> = contents.video.iter().map(|f| f.timestamp).collect();
        assert_eq!(ts, vec![100 * SEC, 100 * SEC + 100 * MS, 100 * SEC + 200 * MS]);
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let (_clock, window) = window(10 * SEC);
        window.push_video_frame(frame(100 * SEC + 500 * MS));
        window.push_video_frame(frame(100 * SEC + 200 * MS));
        let contents = window.drain();
        assert_eq!(contents.video[1].timestamp, 100 * SEC + 500 * MS);
    }

    #[test]
    fn test_audio_keeps_slack_beyond_duration() {
        let (clock, window) = window(SEC);
        for i in 0..=21u64 {
            let ts = 100 * SEC + i * 50 * MS;
            clock.set(ts);
            window.push_audio_packet(packet(ts, 480));
        }
        let stats = window.stats();
        assert_eq!(stats.audio_span_ns, SEC + 50 * MS);
        assert_eq!(stats.audio_packets, 22);
    }

    #[test]
    fn test_malformed_and_empty_input_dropped() {
        let (_clock, window) = window(SEC);
        let mut bad = frame(100 * SEC);
        bad.planes.clear();
        assert!(!window.push_video_frame(bad));
        assert!(!window.push_audio_packet(packet(100 * SEC, 0)));
        assert_eq!(window.stats(), WindowStats::default());
    }

    #[test]
    fn test_shorter_duration_clears() {
        let (_clock, window) = window(5 * SEC);
        window.push_video_frame(frame(100 * SEC));
        window.push_audio_packet(packet(100 * SEC, 480));

        window.set_duration(10 * SEC);
        assert_eq!(window.stats().video_frames, 1);

        window.set_duration(SEC);
        assert_eq!(window.stats(), WindowStats::default());
    }

    #[test]
    fn test_pack_frames_strips_padding() {
        let clock = Arc::new(ManualClock::new(100 * SEC));
        let window = CaptureWindow::new(
            "padded",
            clock,
            WindowConfig {
                duration_ns: SEC,
                pack_frames: true,
            },
        );
        let mut padded = frame(100 * SEC);
        padded = padded.copy_with_linesizes(&[8]).unwrap();
        window.push_video_frame(padded);
        let contents = window.drain();
        assert_eq!(contents.video[0].planes[0].linesize, 4);
    }

    proptest! {
        #[test]
        fn prop_window_span_and_order(
            steps in proptest::collection::vec((0u64..200, -3_000i64..3_000), 1..200),
            duration_ms in 100u64..3_000,
        ) {
            let (clock, window) = window(duration_ms * MS);
            let mut producer_ts = 100 * SEC;
            for (advance_ms, jitter_ms) in steps {
                clock.advance(advance_ms * MS);
                producer_ts = (producer_ts as i64 + jitter_ms * MS as i64).max(1) as u64;
                window.push_video_frame(frame(producer_ts));
                window.push_audio_packet(packet(producer_ts, 480));
            }
            let stats = window.stats();
            prop_assert!(stats.video_span_ns <= duration_ms * MS);
            prop_assert!(stats.audio_span_ns <= duration_ms * MS + AUDIO_EVICTION_SLACK_NS);

            let contents = window.drain();
            prop_assert!(contents.video.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
            prop_assert!(contents.audio.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }
}
