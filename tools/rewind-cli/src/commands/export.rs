//! Capture a synthetic source and export the replay.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use rewind_common::config::{AppConfig, ExportFormat};
use rewind_media_model::AudioFormat;
use rewind_replay_engine::{
    EncoderService, EngineServices, ExportProgress, ExportStage, ExportState, FfmpegEncoder,
    ReplayEngine,
};

use crate::commands::simulate::capture_synthetic;
use crate::producer::SyntheticProducer;
use crate::sim_clock::SimClock;

pub async fn run(
    config: AppConfig,
    output: Option<PathBuf>,
    format: Option<String>,
    lossless: bool,
    seconds: f64,
    fps: u32,
    realtime: bool,
) -> anyhow::Result<()> {
    let encoder = Arc::new(FfmpegEncoder::new());
    if !encoder.is_available() {
        anyhow::bail!("ffmpeg not found on PATH; run `rewind check` for details");
    }

    let directory = output.unwrap_or_else(|| config.export.directory.clone());
    let format = match format {
        Some(name) => name.parse::<ExportFormat>()?,
        None => config.export.format,
    };
    let lossless = lossless || config.export.lossless;
    std::fs::create_dir_all(&directory)?;

    println!("Exporting synthetic replay");
    println!("  Directory: {}", directory.display());
    println!("  Format: {format:?}");
    println!("  Lossless: {lossless}");
    println!(
        "  Output: {}x{} @ {} fps",
        config.export.width, config.export.height, config.export.fps
    );
    println!();

    let progress_cb: Arc<dyn Fn(ExportProgress) + Send + Sync> = Arc::new(|p: ExportProgress| {
        print!(
            "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
            p.progress * 100.0,
            p.frames_written,
            p.total_frames,
            p.eta_secs
        );
        let _ = std::io::stdout().flush();
    });

    let clock = SimClock::new(realtime);
    let engine = ReplayEngine::new(
        &config,
        EngineServices {
            clock: clock.shared(),
            encoder,
            export_progress: Some(progress_cb),
            ..EngineServices::default()
        },
    );

    let mut producer = SyntheticProducer::new(
        config.export.width,
        config.export.height,
        fps,
        AudioFormat::default(),
    );
    capture_synthetic(&engine, &mut producer, &clock, seconds).await?;

    let output_path = engine.start_export(&directory, format, lossless)?;
    println!("  Writing: {}", output_path.display());

    loop {
        match engine.export_tick() {
            Ok(ExportState::Idle) => break,
            Ok(_) => clock.poll().await,
            Err(e) => {
                println!("\nExport failed: {e}");
                return Err(e.into());
            }
        }
    }

    let progress = engine.export_progress();
    match progress.stage {
        ExportStage::Complete => {
            println!("\nExport complete: {}", output_path.display());
            Ok(())
        }
        stage => {
            println!("\nExport ended in stage {stage:?}");
            anyhow::bail!("export did not complete")
        }
    }
}
