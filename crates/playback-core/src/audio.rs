//! Audio scheduling against the video cursor's clock.

use rewind_common::clock::NSEC_PER_SEC;
use rewind_media_model::{AudioPacket, Snapshot, SnapshotId, TimestampNs};

use crate::cursor::AudioTiming;

/// Tracks which audio packet of the active snapshot plays next.
///
/// The position is rebuilt from the playhead whenever the snapshot or the
/// cursor's seek generation changes.
#[derive(Debug, Default)]
pub struct AudioScheduler {
    snapshot: Option<SnapshotId>,
    generation: u64,
    position: usize,
}

impl AudioScheduler {
    /// Index of the next packet to play.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Packets due by `now`, retimed for output.
    ///
    /// A packet is due once its offset from the trimmed start is within one
    /// video frame of the playhead. A packet straddling the trimmed start is
    /// cut at it, and packets starting at or after the trimmed end are never
    /// played. Output timestamps follow the video mapping and
    /// the sample rate is scaled by the speed.
    pub fn drain(
        &mut self,
        snapshot: &Snapshot,
        timing: Option<AudioTiming>,
        now: TimestampNs,
    ) -> Vec<AudioPacket> {
        let Some(timing) = timing else {
            return Vec::new();
        };
        let media = snapshot.media();
        let packets = media.audio();
        let range_start = snapshot.range_start();
        let range_end = snapshot.range_end();
        let target = timing.speed.to_snapshot(now as i128 - timing.start as i128);

        if self.snapshot != Some(snapshot.id()) || self.generation != timing.generation {
            let playhead = range_start + target.max(0);
            self.position = packets.partition_point(|p| (p.end_timestamp() as i128) <= playhead);
            self.snapshot = Some(snapshot.id());
            self.generation = timing.generation;
        }

        let lookahead = target + media.frame_duration_ns() as i128;
        let mut out = Vec::new();
        while let Some(packet) = packets.get(self.position) {
            if packet.timestamp as i128 >= range_end {
                break;
            }
            let offset = packet.timestamp as i128 - range_start;
            if offset > lookahead {
                break;
            }
            self.position += 1;

            let mut retimed = if offset < 0 {
                let skip = samples_covering(packet.format.sample_rate, -offset);
                if skip >= packet.frames {
                    continue;
                }
                packet.slice(skip, packet.frames - skip)
            } else {
                packet.clone()
            };
            let offset = retimed.timestamp as i128 - range_start;
            let timestamp = timing.start as i128 + timing.speed.to_real(offset);
            retimed.timestamp = timestamp.clamp(0, u64::MAX as i128) as u64;
            retimed.format.sample_rate = timing.speed.scale_rate(packet.format.sample_rate);
            out.push(retimed);
        }
        out
    }
}

/// Samples needed to cover at least `ns` at `sample_rate`.
fn samples_covering(sample_rate: u32, ns: i128) -> u32 {
    let per_sec = NSEC_PER_SEC as i128;
    ((ns * sample_rate as i128 + per_sec - 1) / per_sec).clamp(0, u32::MAX as i128) as u32
}
