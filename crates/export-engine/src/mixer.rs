//! Additive mixing of snapshot audio into planar output buffers.

use rewind_common::clock::NSEC_PER_SEC;
use rewind_media_model::AudioPacket;

/// Mix every packet overlapping `[start, start + count / sample_rate)` into
/// the first `count` samples of each plane of `out`.
///
/// Packets are matched sample by sample, so a packet that only partially
/// overlaps contributes just its overlapping samples. Mono packets feed every
/// output channel; extra packet channels are ignored. `packets` must be
/// ordered by timestamp. Returns the number of packets mixed.
pub fn mix_into(
    packets: &[AudioPacket],
    start: i128,
    sample_rate: u32,
    out: &mut [Vec<f32>],
    count: usize,
) -> usize {
    let count = out.iter().map(Vec::len).min().unwrap_or(0).min(count);
    if count == 0 || sample_rate == 0 {
        return 0;
    }
    let ns = NSEC_PER_SEC as i128;
    let rate = sample_rate as i128;
    let end = start + count as i128 * ns / rate;

    let first = packets.partition_point(|p| (p.end_timestamp() as i128) <= start);
    let mut mixed = 0;
    for packet in &packets[first..] {
        let p_start = packet.timestamp as i128;
        if p_start >= end {
            break;
        }
        if packet.is_empty() || packet.format.sample_rate == 0 {
            continue;
        }
        let p_end = packet.end_timestamp() as i128;
        let from = ceil_index(p_start - start, rate).max(0) as usize;
        let to = (ceil_index(p_end - start, rate).max(0) as usize).min(count);
        if from >= to {
            continue;
        }

        let p_rate = packet.format.sample_rate as i128;
        let last_plane = packet.planes.len() - 1;
        for i in from..to {
            let t = start + i as i128 * ns / rate;
            let j = ((t - p_start) * p_rate / ns) as usize;
            if j >= packet.frames as usize {
                break;
            }
            for (c, plane) in out.iter_mut().enumerate() {
                plane[i] += packet.planes[c.min(last_plane)][j];
            }
        }
        mixed += 1;
    }
    mixed
}

/// First output sample index at or after `offset_ns`.
fn ceil_index(offset_ns: i128, rate: i128) -> i128 {
    let scaled = offset_ns * rate;
    let ns = NSEC_PER_SEC as i128;
    scaled.div_euclid(ns) + i128::from(scaled.rem_euclid(ns) != 0)
}
