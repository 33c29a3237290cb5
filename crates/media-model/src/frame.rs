//! Video frames and audio packets.
//!
//! Frames are immutable once captured and travel as [`SharedFrame`] handles:
//! the capture window, every snapshot holding them and the playback output all
//! share the same allocation. Audio packets own their samples.

use std::sync::Arc;

use rewind_common::{ReplayError, ReplayResult, NSEC_PER_SEC};
use serde::{Deserialize, Serialize};

/// Monotonic timestamp in nanoseconds.
pub type TimestampNs = u64;

/// Pixel layout of a video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// Planar 4:2:0 YUV.
    I420,
    /// Semi-planar 4:2:0 YUV, interleaved chroma.
    Nv12,
    /// Planar 4:4:4 YUV.
    I444,
    Yvyu,
    Yuy2,
    Uyvy,
    Rgba,
    Bgra,
    Bgrx,
    /// Luma only.
    Y800,
}

impl VideoFormat {
    /// Number of planes a frame of this format carries.
    pub fn plane_count(self) -> usize {
        match self {
            Self::I420 | Self::I444 => 3,
            Self::Nv12 => 2,
            _ => 1,
        }
    }

    /// Number of rows in `plane` for a frame of `height` rows.
    pub fn plane_rows(self, plane: usize, height: u32) -> usize {
        let chroma_rows = (height as usize).div_ceil(2);
        match (self, plane) {
            (Self::I420, 1 | 2) | (Self::Nv12, 1) => chroma_rows,
            _ => height as usize,
        }
    }

    /// Minimum bytes per row in `plane` for a frame of `width` pixels.
    pub fn min_linesize(self, plane: usize, width: u32) -> usize {
        let w = width as usize;
        match (self, plane) {
            (Self::I420, 1 | 2) => w.div_ceil(2),
            (Self::Nv12, 1) => w.div_ceil(2) * 2,
            (Self::Yvyu | Self::Yuy2 | Self::Uyvy, _) => w * 2,
            (Self::Rgba | Self::Bgra | Self::Bgrx, _) => w * 4,
            _ => w,
        }
    }

    /// Name used by ffmpeg's `-pix_fmt`.
    pub fn ffmpeg_pix_fmt(self) -> &'static str {
        match self {
            Self::I420 => "yuv420p",
            Self::Nv12 => "nv12",
            Self::I444 => "yuv444p",
            Self::Yvyu => "yvyu422",
            Self::Yuy2 => "yuyv422",
            Self::Uyvy => "uyvy422",
            Self::Rgba => "rgba",
            Self::Bgra => "bgra",
            Self::Bgrx => "bgr0",
            Self::Y800 => "gray",
        }
    }
}

/// One plane of pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    /// Row-major bytes, `linesize * rows` long.
    pub data: Vec<u8>,
    /// Bytes per row, including padding.
    pub linesize: usize,
}

/// A decoded video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Plane>,
    /// Capture timestamp (ns). Adjusted once by the capture window.
    pub timestamp: TimestampNs,
}

/// A frame shared between the capture window, snapshots and outputs.
pub type SharedFrame = Arc<VideoFrame>;

impl VideoFrame {
    /// Allocate a zeroed frame with tightly packed planes.
    pub fn new(format: VideoFormat, width: u32, height: u32, timestamp: TimestampNs) -> Self {
        let planes = (0..format.plane_count())
            .map(|plane| {
                let linesize = format.min_linesize(plane, width);
                Plane {
                    data: vec![0; linesize * format.plane_rows(plane, height)],
                    linesize,
                }
            })
            .collect();
        Self {
            format,
            width,
            height,
            planes,
            timestamp,
        }
    }

    /// Whether the frame cannot be stored or displayed.
    ///
    /// A frame is malformed when it has no pixels, the wrong number of
    /// planes, or a plane shorter than its declared layout.
    pub fn is_malformed(&self) -> bool {
        if self.width == 0 || self.height == 0 || self.planes.is_empty() {
            return true;
        }
        if self.planes.len() != self.format.plane_count() {
            return true;
        }
        self.planes.iter().enumerate().any(|(i, plane)| {
            plane.linesize < self.format.min_linesize(i, self.width)
                || plane.data.len() < plane.linesize * self.format.plane_rows(i, self.height)
        })
    }

    /// Total bytes held by the frame.
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }

    /// Copy the frame into a new layout with the given per-plane linesizes.
    ///
    /// Rows are copied up to the shorter of the two linesizes; padding in the
    /// destination is zeroed.
    pub fn copy_with_linesizes(&self, linesizes: &[usize]) -> ReplayResult<Self> {
        if linesizes.len() != self.planes.len() {
            return Err(ReplayError::capture(format!(
                "expected {} linesizes, got {}",
                self.planes.len(),
                linesizes.len()
            )));
        }

        let mut planes = Vec::with_capacity(self.planes.len());
        for (i, (src, &dst_linesize)) in self.planes.iter().zip(linesizes).enumerate() {
            let rows = self.format.plane_rows(i, self.height);
            let row_bytes = self
                .format
                .min_linesize(i, self.width)
                .min(src.linesize)
                .min(dst_linesize);
            let mut data = vec![0u8; dst_linesize * rows];
            for row in 0..rows {
                let s = row * src.linesize;
                let d = row * dst_linesize;
                let Some(src_row) = src.data.get(s..s + row_bytes) else {
                    return Err(ReplayError::capture(format!(
                        "plane {i} truncated at row {row}"
                    )));
                };
                data[d..d + row_bytes].copy_from_slice(src_row);
            }
            planes.push(Plane {
                data,
                linesize: dst_linesize,
            });
        }

        Ok(Self {
            format: self.format,
            width: self.width,
            height: self.height,
            planes,
            timestamp: self.timestamp,
        })
    }

    /// Copy the frame with tightly packed planes.
    pub fn to_packed(&self) -> ReplayResult<Self> {
        let linesizes: Vec<usize> = (0..self.planes.len())
            .map(|i| self.format.min_linesize(i, self.width))
            .collect();
        self.copy_with_linesizes(&linesizes)
    }
}

/// Audio stream parameters recorded alongside captured packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Samples per second, per channel.
    pub sample_rate: u32,
    /// Number of planar channels.
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

/// Convert a sample count to nanoseconds at `sample_rate`.
pub fn frames_to_ns(sample_rate: u32, frames: u64) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (frames as u128 * NSEC_PER_SEC as u128 / sample_rate as u128) as u64
}

/// Convert nanoseconds to a sample count at `sample_rate`, rounding down.
pub fn ns_to_frames(sample_rate: u32, ns: u64) -> u64 {
    (ns as u128 * sample_rate as u128 / NSEC_PER_SEC as u128) as u64
}

/// A packet of planar `f32` audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPacket {
    /// Timestamp of the first sample (ns).
    pub timestamp: TimestampNs,
    /// Samples per channel.
    pub frames: u32,
    /// One buffer of `frames` samples per channel.
    pub planes: Vec<Vec<f32>>,
    pub format: AudioFormat,
}

impl AudioPacket {
    pub fn new(timestamp: TimestampNs, format: AudioFormat, planes: Vec<Vec<f32>>) -> Self {
        let frames = planes.iter().map(Vec::len).min().unwrap_or(0) as u32;
        Self {
            timestamp,
            frames,
            planes,
            format,
        }
    }

    /// A packet of silence.
    pub fn silent(timestamp: TimestampNs, format: AudioFormat, frames: u32) -> Self {
        Self {
            timestamp,
            frames,
            planes: vec![vec![0.0; frames as usize]; format.channels as usize],
            format,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0 || self.planes.is_empty()
    }

    pub fn duration_ns(&self) -> u64 {
        frames_to_ns(self.format.sample_rate, self.frames as u64)
    }

    /// Timestamp just past the last sample.
    pub fn end_timestamp(&self) -> TimestampNs {
        self.timestamp.saturating_add(self.duration_ns())
    }

    /// Copy `count` samples starting at sample `offset`, clamped to the packet.
    pub fn slice(&self, offset: u32, count: u32) -> Self {
        let start = offset.min(self.frames);
        let end = start.saturating_add(count).min(self.frames);
        let planes = self
            .planes
            .iter()
            .map(|p| p[start as usize..end as usize].to_vec())
            .collect();
        Self {
            timestamp: self.timestamp + frames_to_ns(self.format.sample_rate, start as u64),
            frames: end - start,
            planes,
            format: self.format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_i420_layout() {
        let frame = VideoFrame::new(VideoFormat::I420, 5, 3, 0);
        assert_eq!(frame.planes.len(), 3);
        assert_eq!(frame.planes[0].linesize, 5);
        assert_eq!(frame.planes[0].data.len(), 15);
        assert_eq!(frame.planes[1].linesize, 3);
        assert_eq!(frame.planes[1].data.len(), 6);
        assert!(!frame.is_malformed());
    }

    #[test]
    fn test_packed_formats_single_plane() {
        for format in [VideoFormat::Bgra, VideoFormat::Yuy2, VideoFormat::Y800] {
            let frame = VideoFrame::new(format, 4, 2, 0);
            assert_eq!(frame.planes.len(), 1);
            assert!(!frame.is_malformed());
        }
        assert_eq!(VideoFormat::Bgra.min_linesize(0, 4), 16);
        assert_eq!(VideoFormat::Nv12.plane_rows(1, 5), 3);
    }

    #[test]
    fn test_malformed_frames() {
        let mut frame = VideoFrame::new(VideoFormat::Rgba, 2, 2, 0);
        frame.planes.clear();
        assert!(frame.is_malformed());

        let empty = VideoFrame::new(VideoFormat::Rgba, 0, 2, 0);
        assert!(empty.is_malformed());

        let mut short = VideoFrame::new(VideoFormat::Rgba, 2, 2, 0);
        short.planes[0].data.truncate(4);
        assert!(short.is_malformed());
    }

    #[test]
    fn test_copy_with_linesizes_preserves_rows() {
        let mut frame = VideoFrame::new(VideoFormat::Y800, 3, 2, 42);
        frame.planes[0] = Plane {
            data: vec![1, 2, 3, 9, 4, 5, 6, 9],
            linesize: 4,
        };

        let packed = frame.to_packed().unwrap();
        assert_eq!(packed.planes[0].linesize, 3);
        assert_eq!(packed.planes[0].data, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(packed.timestamp, 42);

        let padded = packed.copy_with_linesizes(&[5]).unwrap();
        assert_eq!(padded.planes[0].data, vec![1, 2, 3, 0, 0, 4, 5, 6, 0, 0]);
    }

    #[test]
    fn test_copy_with_wrong_plane_count_fails() {
        let frame = VideoFrame::new(VideoFormat::I420, 2, 2, 0);
        assert!(frame.copy_with_linesizes(&[2]).is_err());
    }

    #[test]
    fn test_audio_duration_and_slice() {
        let format = AudioFormat {
            sample_rate: 1000,
            channels: 2,
        };
        let packet = AudioPacket::new(
            1_000_000_000,
            format,
            vec![(0..10).map(|i| i as f32).collect(), vec![0.5; 10]],
        );
        assert_eq!(packet.frames, 10);
        assert_eq!(packet.duration_ns(), 10_000_000);
        assert_eq!(packet.end_timestamp(), 1_010_000_000);

        let slice = packet.slice(4, 3);
        assert_eq!(slice.frames, 3);
        assert_eq!(slice.timestamp, 1_004_000_000);
        assert_eq!(slice.planes[0], vec![4.0, 5.0, 6.0]);

        let clamped = packet.slice(8, 10);
        assert_eq!(clamped.frames, 2);
    }

    #[test]
    fn test_frame_conversions() {
        assert_eq!(frames_to_ns(48_000, 48_000), NSEC_PER_SEC);
        assert_eq!(ns_to_frames(48_000, 500_000_000), 24_000);
        assert_eq!(frames_to_ns(0, 10), 0);
    }

    proptest! {
        #[test]
        fn prop_slice_stays_inside_packet(
            rate in 8_000u32..192_000,
            frames in 1usize..2_000,
            offset in 0u32..2_500,
            count in 0u32..2_500,
        ) {
            let format = AudioFormat { sample_rate: rate, channels: 1 };
            let samples: Vec<f32> = (0..frames).map(|i| i as f32).collect();
            let packet = AudioPacket::new(NSEC_PER_SEC, format, vec![samples]);
            let slice = packet.slice(offset, count);

            let start = offset.min(packet.frames);
            prop_assert_eq!(slice.frames, count.min(packet.frames - start));
            prop_assert!(slice.timestamp >= packet.timestamp);
            prop_assert!(slice.end_timestamp() <= packet.end_timestamp());
            if slice.frames > 0 {
                prop_assert_eq!(slice.planes[0][0], start as f32);
            }
        }

        #[test]
        fn prop_sample_conversion_loses_at_most_one_sample(
            rate in 1u32..192_000,
            frames in 0u64..10_000_000,
        ) {
            let back = ns_to_frames(rate, frames_to_ns(rate, frames));
            prop_assert!(back == frames || back + 1 == frames);
        }
    }
}
