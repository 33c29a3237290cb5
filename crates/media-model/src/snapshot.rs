//! Snapshots: immutable replay media plus a per-holder trim.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rewind_common::{Direction, ReplayError, ReplayResult};
use serde::{Deserialize, Serialize};

use crate::frame::{AudioFormat, AudioPacket, SharedFrame, TimestampNs};

/// Process-unique snapshot identifier.
pub type SnapshotId = u64;

static NEXT_SNAPSHOT_ID: AtomicU64 = AtomicU64::new(1);

/// Media extracted from a capture window. Never mutated after construction.
#[derive(Debug, Default)]
pub struct ReplayMedia {
    video: Vec<SharedFrame>,
    audio: Vec<AudioPacket>,
    first_timestamp: TimestampNs,
    last_timestamp: TimestampNs,
    audio_format: Option<AudioFormat>,
}

impl ReplayMedia {
    /// Build replay media. `first` and `last` bound the playable content;
    /// video frames must be sorted by timestamp.
    pub fn new(
        video: Vec<SharedFrame>,
        audio: Vec<AudioPacket>,
        first_timestamp: TimestampNs,
        last_timestamp: TimestampNs,
    ) -> Self {
        let audio_format = audio.first().map(|p| p.format);
        Self {
            video,
            audio,
            first_timestamp,
            last_timestamp: last_timestamp.max(first_timestamp),
            audio_format,
        }
    }

    pub fn video(&self) -> &[SharedFrame] {
        &self.video
    }

    pub fn audio(&self) -> &[AudioPacket] {
        &self.audio
    }

    pub fn first_timestamp(&self) -> TimestampNs {
        self.first_timestamp
    }

    pub fn last_timestamp(&self) -> TimestampNs {
        self.last_timestamp
    }

    /// `last - first`.
    pub fn duration_ns(&self) -> u64 {
        self.last_timestamp - self.first_timestamp
    }

    pub fn frame_count(&self) -> usize {
        self.video.len()
    }

    /// Audio format recorded at capture, if the replay has audio.
    pub fn audio_format(&self) -> Option<AudioFormat> {
        self.audio_format
    }

    /// Average spacing between video frames, or 0 without video.
    pub fn frame_duration_ns(&self) -> u64 {
        match self.video.len() {
            0 => 0,
            n => self.duration_ns() / n as u64,
        }
    }

    /// Index of the first frame with `timestamp >= ts`.
    pub fn first_frame_at_or_after(&self, ts: i128) -> usize {
        self.video
            .partition_point(|f| (f.timestamp as i128) < ts)
    }

    /// Index of the last frame with `timestamp <= ts`.
    pub fn last_frame_at_or_before(&self, ts: i128) -> Option<usize> {
        self.video
            .partition_point(|f| (f.timestamp as i128) <= ts)
            .checked_sub(1)
    }
}

/// Signed offsets narrowing a snapshot's playable range.
///
/// `front` moves the start later, `end` moves the end earlier. Negative
/// values extend the range past the media, which holds the first or last
/// frame for that long.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trim {
    pub front: i64,
    pub end: i64,
}

impl Trim {
    pub const ZERO: Trim = Trim { front: 0, end: 0 };

    /// Default trim for a configured start delay.
    ///
    /// A positive delay holds the first frame (`-delay`), a negative delay
    /// skips into the replay (`|delay|`). Backward playback starts at the
    /// end, so the value goes to `end` instead.
    pub fn from_start_delay(delay_ns: i64, direction: Direction) -> Self {
        let offset = if delay_ns > 0 {
            -delay_ns
        } else {
            delay_ns.saturating_abs()
        };
        match direction {
            Direction::Forward => Self {
                front: offset,
                end: 0,
            },
            Direction::Backward => Self {
                front: 0,
                end: offset,
            },
        }
    }
}

/// An immutable replay with this holder's trim.
///
/// Cloning is cheap: media is shared, trims are copied.
#[derive(Debug, Clone)]
pub struct Snapshot {
    media: Arc<ReplayMedia>,
    trim: Trim,
    default_trim: Trim,
    id: SnapshotId,
    captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Wrap media with a default trim. An invalid default falls back to
    /// no trim.
    pub fn new(media: ReplayMedia, default_trim: Trim) -> Self {
        let media = Arc::new(media);
        let default_trim = if trim_is_valid(&media, default_trim) {
            default_trim
        } else {
            Trim::ZERO
        };
        Self {
            media,
            trim: default_trim,
            default_trim,
            id: NEXT_SNAPSHOT_ID.fetch_add(1, Ordering::Relaxed),
            captured_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn media(&self) -> &ReplayMedia {
        &self.media
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn trim(&self) -> Trim {
        self.trim
    }

    pub fn default_trim(&self) -> Trim {
        self.default_trim
    }

    /// Replace the trim, rejecting one that empties the range.
    pub fn set_trim(&mut self, trim: Trim) -> ReplayResult<()> {
        if !trim_is_valid(&self.media, trim) {
            return Err(ReplayError::InvalidRange {
                trim_front_ns: trim.front,
                trim_end_ns: trim.end,
            });
        }
        self.trim = trim;
        Ok(())
    }

    pub fn reset_trim(&mut self) {
        self.trim = self.default_trim;
    }

    /// `first + trim.front`. May precede the first frame.
    pub fn range_start(&self) -> i128 {
        self.media.first_timestamp as i128 + self.trim.front as i128
    }

    /// `last - trim.end`. May follow the last frame.
    pub fn range_end(&self) -> i128 {
        self.media.last_timestamp as i128 - self.trim.end as i128
    }

    /// Length of the playable range (ns).
    pub fn range_len(&self) -> u64 {
        (self.range_end() - self.range_start()).max(0) as u64
    }

    /// Where playback starts in `direction`.
    pub fn origin(&self, direction: Direction) -> i128 {
        match direction {
            Direction::Forward => self.range_start(),
            Direction::Backward => self.range_end(),
        }
    }

    /// Offset of `ts` from the origin of `direction`, measured along it.
    pub fn offset_of(&self, ts: TimestampNs, direction: Direction) -> i128 {
        match direction {
            Direction::Forward => ts as i128 - self.range_start(),
            Direction::Backward => self.range_end() - ts as i128,
        }
    }

    /// Indices of the frames inside the trimmed range, inclusive.
    pub fn trimmed_frames(&self) -> Option<(usize, usize)> {
        let first = self.media.first_frame_at_or_after(self.range_start());
        let last = self.media.last_frame_at_or_before(self.range_end())?;
        (first <= last).then_some((first, last))
    }

    /// Same replay media, independent trim.
    pub fn shares_media_with(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.media, &other.media)
    }
}

fn trim_is_valid(media: &ReplayMedia, trim: Trim) -> bool {
    let start = media.first_timestamp as i128 + trim.front as i128;
    let end = media.last_timestamp as i128 - trim.end as i128;
    start < end
}
