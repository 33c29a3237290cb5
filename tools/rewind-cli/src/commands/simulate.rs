//! Capture a synthetic source and play the replay back.

use anyhow::Context;
use rewind_common::clock::{RateController, NSEC_PER_SEC};
use rewind_common::config::{AppConfig, Direction, EndAction};
use rewind_media_model::AudioFormat;
use rewind_replay_engine::{EngineServices, FrameOutput, PlaybackState, ReplayEngine};

use crate::producer::SyntheticProducer;
use crate::sim_clock::SimClock;

pub const PRODUCER: &str = "synthetic";
const WIDTH: u32 = 320;
const HEIGHT: u32 = 180;

pub struct SimulateOptions {
    pub seconds: f64,
    pub fps: u32,
    pub captures: usize,
    pub speed: Option<f64>,
    pub end_action: Option<String>,
    pub reverse: bool,
    pub play_secs: Option<f64>,
    pub realtime: bool,
}

/// Parse an end action by its config name.
pub fn parse_end_action(name: &str) -> anyhow::Result<EndAction> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .with_context(|| format!("Unknown end action '{name}'"))
}

/// Feed `seconds` of synthetic media and trigger a capture.
pub async fn capture_synthetic(
    engine: &ReplayEngine,
    producer: &mut SyntheticProducer,
    clock: &SimClock,
    seconds: f64,
) -> anyhow::Result<()> {
    let window = engine.attach(PRODUCER);
    let pushed = producer.feed(&window, clock, seconds).await;
    let stats = window.stats();
    let id = engine
        .trigger_capture()
        .context("Capture produced no replay")?;
    println!(
        "  Captured replay #{id}: {pushed} frames fed, {} kept ({:.2}s)",
        stats.video_frames,
        stats.video_span_ns as f64 / NSEC_PER_SEC as f64
    );
    Ok(())
}

pub async fn run(mut config: AppConfig, options: SimulateOptions) -> anyhow::Result<()> {
    if let Some(speed) = options.speed {
        config.replay.speed_percent = speed;
    }
    if let Some(name) = options.end_action.as_deref() {
        config.replay.end_action = parse_end_action(name)?;
    }
    if options.reverse {
        config.replay.direction = Direction::Backward;
    }
    config.replay.max_replays = options.captures.max(1);

    println!("Simulating instant replay");
    println!("  Source: {WIDTH}x{HEIGHT} @ {} fps", options.fps);
    println!("  Window: {} ms", config.replay.duration_ms);
    println!("  Captures: {}", options.captures.max(1));
    println!("  Speed: {}%", config.replay.speed_percent);
    println!("  End action: {:?}", config.replay.end_action);
    println!("  Direction: {:?}", config.replay.direction);
    println!();

    let clock = SimClock::new(options.realtime);
    let engine = ReplayEngine::new(
        &config,
        EngineServices {
            clock: clock.shared(),
            ..EngineServices::default()
        },
    );
    let mut producer = SyntheticProducer::new(WIDTH, HEIGHT, options.fps, AudioFormat::default());

    for _ in 0..options.captures.max(1) {
        capture_synthetic(&engine, &mut producer, &clock, options.seconds).await?;
    }

    let replay_secs = engine
        .current_snapshot()
        .map(|s| s.range_len() as f64 / NSEC_PER_SEC as f64)
        .unwrap_or_default();
    let speed = engine.speed_percent().max(0.01);
    let play_secs = options
        .play_secs
        .unwrap_or(replay_secs * 100.0 / speed + 1.0);

    println!();
    println!(
        "Playing replay {} of {} for {play_secs:.1}s",
        engine.current_index().map(|i| i + 1).unwrap_or(0),
        engine.snapshot_count()
    );

    let summary = play(&engine, &clock, options.fps, play_secs).await;

    println!();
    println!("Playback summary");
    println!("  Frames shown: {}", summary.frames);
    println!("  Audio packets: {}", summary.audio_packets);
    println!("  Clears: {}", summary.clears);
    if let Some((first, last)) = summary.first_last {
        println!(
            "  Output timestamps: {:.3}s .. {:.3}s",
            first as f64 / NSEC_PER_SEC as f64,
            last as f64 / NSEC_PER_SEC as f64
        );
    }
    println!("  Final state: {:?}", engine.state());

    Ok(())
}

#[derive(Debug, Default)]
struct PlaybackSummary {
    frames: u64,
    audio_packets: u64,
    clears: u64,
    first_last: Option<(u64, u64)>,
}

async fn play(
    engine: &ReplayEngine,
    clock: &SimClock,
    fps: u32,
    seconds: f64,
) -> PlaybackSummary {
    let mut summary = PlaybackSummary::default();
    let mut rate = RateController::new(fps.max(1));
    let start = clock.now_ns();
    let end = start + (seconds.max(0.0) * NSEC_PER_SEC as f64) as u64;
    let mut last_state = engine.state();

    while clock.now_ns() < end {
        let now = clock.now_ns();
        if rate.should_tick(now) {
            let tick = engine.advance();
            summary.audio_packets += tick.audio.len() as u64;
            match tick.video {
                FrameOutput::Frame { timestamp, .. } => {
                    summary.frames += 1;
                    summary.first_last = Some(match summary.first_last {
                        Some((first, _)) => (first, timestamp),
                        None => (timestamp, timestamp),
                    });
                }
                FrameOutput::Clear => summary.clears += 1,
                FrameOutput::None => {}
            }
            let state = engine.state();
            if state != last_state {
                tracing::info!(
                    from = ?last_state,
                    to = ?state,
                    elapsed_ms = (now - start) / 1_000_000,
                    "Playback state changed"
                );
                last_state = state;
            }
            if state == PlaybackState::Idle && engine.snapshot_count() == 0 {
                break;
            }
        }
        clock.poll().await;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_end_action_by_config_name() {
        assert_eq!(parse_end_action("loop").unwrap(), EndAction::Loop);
        assert_eq!(parse_end_action("hide_all").unwrap(), EndAction::HideAll);
        assert!(parse_end_action("sideways").is_err());
    }

    #[tokio::test]
    async fn test_capture_then_play_fast_forwarded() {
        let mut config = AppConfig::default();
        config.replay.duration_ms = 2_000;
        config.replay.start_delay_ms = 0;
        config.replay.end_action = EndAction::Pause;
        let clock = SimClock::new(false);
        let engine = ReplayEngine::new(
            &config,
            EngineServices {
                clock: clock.shared(),
                ..EngineServices::default()
            },
        );
        let mut producer = SyntheticProducer::new(32, 18, 30, AudioFormat::default());
        capture_synthetic(&engine, &mut producer, &clock, 1.0)
            .await
            .unwrap();
        assert_eq!(engine.snapshot_count(), 1);

        let summary = play(&engine, &clock, 30, 2.0).await;
        assert!(summary.frames >= 20, "frames = {}", summary.frames);
        assert_eq!(engine.state(), PlaybackState::Ended);
    }
}
