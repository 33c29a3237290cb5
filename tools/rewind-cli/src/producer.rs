//! Synthetic test source: a moving luma bar over a 440Hz tone.

use std::f32::consts::TAU;

use rewind_common::clock::RateController;
use rewind_media_model::{AudioFormat, AudioPacket, TimestampNs, VideoFormat, VideoFrame};
use rewind_replay_engine::CaptureWindow;

use crate::sim_clock::SimClock;

const TONE_HZ: f32 = 440.0;

pub struct SyntheticProducer {
    width: u32,
    height: u32,
    fps: u32,
    audio: AudioFormat,
    frame_index: u64,
    sample_index: u64,
}

impl SyntheticProducer {
    pub fn new(width: u32, height: u32, fps: u32, audio: AudioFormat) -> Self {
        Self {
            width: width.max(2) & !1,
            height: height.max(2) & !1,
            fps: fps.max(1),
            audio,
            frame_index: 0,
            sample_index: 0,
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Next I420 frame: mid-grey with a white bar sweeping left to right.
    pub fn next_frame(&mut self, timestamp: TimestampNs) -> VideoFrame {
        let mut frame = VideoFrame::new(VideoFormat::I420, self.width, self.height, timestamp);
        let luma = &mut frame.planes[0];
        luma.data.fill(128);
        let bar = (self.frame_index * 8 % self.width as u64) as usize;
        let bar_width = (self.width as usize / 32).max(1);
        for row in luma.data.chunks_mut(luma.linesize) {
            let end = (bar + bar_width).min(row.len());
            row[bar..end].fill(235);
        }
        for plane in frame.planes.iter_mut().skip(1) {
            plane.data.fill(128);
        }
        self.frame_index += 1;
        frame
    }

    /// One frame's worth of tone.
    pub fn next_packet(&mut self, timestamp: TimestampNs) -> AudioPacket {
        let samples = (self.audio.sample_rate / self.fps).max(1) as usize;
        let rate = self.audio.sample_rate.max(1) as f32;
        let tone: Vec<f32> = (0..samples as u64)
            .map(|i| {
                let t = (self.sample_index + i) as f32 / rate;
                0.2 * (TAU * TONE_HZ * t).sin()
            })
            .collect();
        self.sample_index += samples as u64;
        let planes = vec![tone; self.audio.channels.max(1) as usize];
        AudioPacket::new(timestamp, self.audio, planes)
    }

    /// Push `seconds` of media into `window` at the source frame rate.
    ///
    /// Returns the number of frames pushed.
    pub async fn feed(&mut self, window: &CaptureWindow, clock: &SimClock, seconds: f64) -> u64 {
        let mut rate = RateController::new(self.fps);
        let total = (seconds.max(0.0) * self.fps as f64).round() as u64;
        let mut pushed = 0;
        while pushed < total {
            let now = clock.now_ns();
            if rate.should_tick(now) {
                let frame = self.next_frame(now);
                let packet = self.next_packet(now);
                window.push_video_frame(frame);
                window.push_audio_packet(packet);
                pushed += 1;
            }
            clock.poll().await;
        }
        tracing::debug!(frames = pushed, "Synthetic source fed");
        pushed
    }
}
