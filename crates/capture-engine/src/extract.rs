//! Snapshot extraction from a capture window.

use rewind_common::clock::NSEC_PER_MSEC;
use rewind_common::Direction;
use rewind_media_model::{
    ns_to_frames, AudioPacket, ReplayMedia, SharedFrame, Snapshot, TimestampNs, Trim,
};

use crate::window::CaptureWindow;

/// Settings applied to a freshly extracted snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Configured start delay (ns). Seeds the default trim.
    pub start_delay_ns: i64,
    /// Playback direction the default trim is computed for.
    pub direction: Direction,
}

/// Freeze the window's contents into a snapshot, leaving the window empty.
///
/// Returns `None` when the window holds neither video nor audio.
pub fn extract(window: &CaptureWindow, options: &ExtractOptions) -> Option<Snapshot> {
    let contents = window.drain();
    let media = build_media(contents.video, contents.audio);
    let Some(media) = media else {
        tracing::info!(producer = window.producer(), "Capture window empty, no replay taken");
        return None;
    };

    let snapshot = Snapshot::new(
        media,
        Trim::from_start_delay(options.start_delay_ns, options.direction),
    );
    tracing::info!(
        producer = window.producer(),
        snapshot = snapshot.id(),
        frames = snapshot.media().frame_count(),
        audio_packets = snapshot.media().audio().len(),
        duration_ms = snapshot.media().duration_ns() / NSEC_PER_MSEC,
        "Replay captured"
    );
    Some(snapshot)
}

/// Compute bounds and clip audio to the video span.
///
/// Bounds come from video when present, otherwise from audio (first packet
/// start to last packet end).
pub fn build_media(video: Vec<SharedFrame>, audio: Vec<AudioPacket>) -> Option<ReplayMedia> {
    match (video.first(), video.last()) {
        (Some(first), Some(last)) => {
            let (first, last) = (first.timestamp, last.timestamp);
            let audio = clip_audio(audio, first, last);
            Some(ReplayMedia::new(video, audio, first, last))
        }
        _ => {
            let first = audio.first()?.timestamp;
            let last = audio.iter().map(AudioPacket::end_timestamp).max()?;
            Some(ReplayMedia::new(video, audio, first, last))
        }
    }
}

/// Drop packets outside `[first, last]` and cut the one crossing `last`.
fn clip_audio(audio: Vec<AudioPacket>, first: TimestampNs, last: TimestampNs) -> Vec<AudioPacket> {
    audio
        .into_iter()
        .filter(|p| p.end_timestamp() >= first && p.timestamp <= last)
        .filter_map(|p| {
            if p.end_timestamp() <= last {
                return Some(p);
            }
            let keep = ns_to_frames(p.format.sample_rate, last - p.timestamp) as u32;
            (keep > 0).then(|| p.slice(0, keep))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowConfig;
    use rewind_common::clock::{ManualClock, NSEC_PER_SEC};
    use rewind_media_model::{AudioFormat, VideoFormat, VideoFrame};
    use std::sync::Arc;

    const SEC: u64 = NSEC_PER_SEC;
    const MS: u64 = NSEC_PER_MSEC;

    fn filled_window(video: bool, audio: bool) -> (Arc<ManualClock>, CaptureWindow) {
        let clock = Arc::new(ManualClock::new(100 * SEC));
        let window = CaptureWindow::new("game", clock.clone(), WindowConfig::default());
        for i in 0..10u64 {
            let ts = 100 * SEC + i * 100 * MS;
            clock.set(ts);
            if video {
                window.push_video_frame(VideoFrame::new(VideoFormat::Y800, 2, 2, ts));
            }
            if audio {
                // 100ms per packet at 1kHz, starting 50ms before the frame.
                let format = AudioFormat {
                    sample_rate: 1000,
                    channels: 1,
                };
                let packet = AudioPacket::new(ts - 50 * MS, format, vec![vec![1.0; 100]]);
                window.push_audio_packet(packet);
            }
        }
        (clock, window)
    }

    #[test]
    fn test_extract_moves_contents_out() {
        let (_clock, window) = filled_window(true, false);
        let snapshot = extract(&window, &ExtractOptions::default()).unwrap();
        assert_eq!(snapshot.media().frame_count(), 10);
        assert_eq!(snapshot.media().first_timestamp(), 100 * SEC);
        assert_eq!(snapshot.media().duration_ns(), 900 * MS);
        assert_eq!(window.stats().video_frames, 0);
    }

    #[test]
    fn test_extract_empty_window_is_none() {
        let (_clock, window) = filled_window(false, false);
        assert!(extract(&window, &ExtractOptions::default()).is_none());
    }

    #[test]
    fn test_audio_only_bounds() {
        let (_clock, window) = filled_window(false, true);
        let snapshot = extract(&window, &ExtractOptions::default()).unwrap();
        assert_eq!(snapshot.media().first_timestamp(), 100 * SEC - 50 * MS);
        assert_eq!(snapshot.media().last_timestamp(), 100 * SEC + 950 * MS);
        assert_eq!(snapshot.media().audio().len(), 10);
    }

    #[test]
    fn test_audio_clipped_to_video_span() {
        let (_clock, window) = filled_window(true, true);
        let snapshot = extract(&window, &ExtractOptions::default()).unwrap();
        let audio = snapshot.media().audio();
        // The packet crossing the last frame is cut at sample granularity.
        assert_eq!(audio.len(), 10);
        let last = audio.last().unwrap();
        assert_eq!(last.timestamp, 100 * SEC + 850 * MS);
        assert_eq!(last.frames, 50);
        assert_eq!(last.end_timestamp(), snapshot.media().last_timestamp());
    }

    #[test]
    fn test_clip_drops_packets_before_first_frame() {
        let format = AudioFormat {
            sample_rate: 1000,
            channels: 1,
        };
        let early = AudioPacket::new(SEC, format, vec![vec![0.0; 10]]);
        let late = AudioPacket::new(3 * SEC, format, vec![vec![0.0; 10]]);
        let inside = AudioPacket::new(2 * SEC, format, vec![vec![0.0; 10]]);
        let clipped = clip_audio(vec![early, inside, late], 2 * SEC, 2 * SEC + 500 * MS);
        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped[0].timestamp, 2 * SEC);
    }

    #[test]
    fn test_default_trim_from_delay() {
        let (_clock, window) = filled_window(true, false);
        let options = ExtractOptions {
            start_delay_ns: 200 * MS as i64,
            direction: Direction::Forward,
        };
        let snapshot = extract(&window, &options).unwrap();
        assert_eq!(snapshot.trim().front, -(200 * MS as i64));
        assert_eq!(snapshot.default_trim(), snapshot.trim());
    }
}
