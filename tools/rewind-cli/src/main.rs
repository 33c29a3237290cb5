//! Rewind CLI: drive the instant replay engine from the command line.
//!
//! Usage:
//!   rewind simulate [OPTIONS]   Capture a synthetic source and play it back
//!   rewind export [OPTIONS]     Capture a synthetic source and export the replay
//!   rewind config <ACTION>      Show or initialize the configuration
//!   rewind check                Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rewind_common::config::AppConfig;

mod commands;
mod producer;
mod sim_clock;

#[derive(Parser)]
#[command(
    name = "rewind",
    about = "Instant replay capture, playback and export",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the standard location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a synthetic source and play the replay back
    Simulate {
        /// Seconds of source fed before each capture
        #[arg(long, default_value = "10")]
        seconds: f64,

        /// Source and output frame rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Number of captures to take
        #[arg(long, default_value = "1")]
        captures: usize,

        /// Playback speed in percent
        #[arg(long)]
        speed: Option<f64>,

        /// End action: hide|pause|loop|reverse|hide_all|pause_all|loop_all|reverse_all
        #[arg(long)]
        end_action: Option<String>,

        /// Play backward
        #[arg(long)]
        reverse: bool,

        /// Seconds of playback to run (defaults to one pass plus a second)
        #[arg(long)]
        play_secs: Option<f64>,

        /// Run against the wall clock instead of fast-forwarding
        #[arg(long)]
        realtime: bool,
    },

    /// Capture a synthetic source and export the replay
    Export {
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Container format: mkv|mp4|mov|flv
        #[arg(long)]
        format: Option<String>,

        /// Encode losslessly
        #[arg(long)]
        lossless: bool,

        /// Seconds of source to capture
        #[arg(long, default_value = "5")]
        seconds: f64,

        /// Source frame rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Run against the wall clock instead of fast-forwarding
        #[arg(long)]
        realtime: bool,
    },

    /// Show or initialize the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check system capabilities
    Check,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,

    /// Print the config file location
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(rewind_common::config::config_file_path);
    let config = AppConfig::load_from(&config_path);

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    rewind_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Simulate {
            seconds,
            fps,
            captures,
            speed,
            end_action,
            reverse,
            play_secs,
            realtime,
        } => {
            commands::simulate::run(
                config,
                commands::simulate::SimulateOptions {
                    seconds,
                    fps,
                    captures,
                    speed,
                    end_action,
                    reverse,
                    play_secs,
                    realtime,
                },
            )
            .await
        }
        Commands::Export {
            output,
            format,
            lossless,
            seconds,
            fps,
            realtime,
        } => {
            commands::export::run(config, output, format, lossless, seconds, fps, realtime).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&config),
            ConfigAction::Path => commands::config::path(&config_path),
            ConfigAction::Init { force } => commands::config::init(&config_path, force),
        },
        Commands::Check => commands::check::run(&config, &config_path),
    }
}
