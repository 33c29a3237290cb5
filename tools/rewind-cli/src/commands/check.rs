//! Check system capabilities.

use std::path::Path;

use rewind_common::config::AppConfig;
use rewind_replay_engine::{EncoderService, FfmpegEncoder};

pub fn run(config: &AppConfig, config_path: &Path) -> anyhow::Result<()> {
    println!("Rewind System Check");
    println!("{}", "=".repeat(50));

    let encoder = FfmpegEncoder::new();
    let encoder_ok = encoder.is_available();
    if encoder_ok {
        println!("[OK] Encoder: {} found on PATH", encoder.name());
    } else {
        println!("[WARN] Encoder: {} not found on PATH", encoder.name());
        println!("       Install ffmpeg to enable exports");
    }

    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!(
            "[WARN] Config: {} missing, using defaults (`rewind config init` creates it)",
            config_path.display()
        );
    }

    let export_dir = &config.export.directory;
    if export_dir.is_dir() {
        println!("[OK] Export directory: {}", export_dir.display());
    } else {
        println!(
            "[WARN] Export directory: {} does not exist yet (created on first export)",
            export_dir.display()
        );
    }

    println!(
        "[OK] Replay window: {} ms, {} replays kept",
        config.replay.duration_ms, config.replay.max_replays
    );

    println!();
    if encoder_ok {
        println!("Capture, playback and export are available.");
    } else {
        println!("Capture and playback are available. Export needs ffmpeg.");
    }

    Ok(())
}
