//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::clock::NSEC_PER_MSEC;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture and playback defaults.
    pub replay: ReplayDefaults,

    /// Export defaults.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// What playback does on reaching the trimmed boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndAction {
    Hide,
    Pause,
    #[default]
    Loop,
    Reverse,
    HideAll,
    PauseAll,
    LoopAll,
    ReverseAll,
}

impl EndAction {
    /// Whether the action moves through the whole store.
    pub fn spans_store(self) -> bool {
        matches!(
            self,
            Self::HideAll | Self::PauseAll | Self::LoopAll | Self::ReverseAll
        )
    }

    /// The action applied once the store is exhausted.
    pub fn single(self) -> Self {
        match self {
            Self::HideAll => Self::Hide,
            Self::PauseAll => Self::Pause,
            Self::LoopAll => Self::Loop,
            Self::ReverseAll => Self::Reverse,
            other => other,
        }
    }

    /// Whether stepping past the range wraps instead of clamping.
    pub fn wraps(self) -> bool {
        matches!(self, Self::Loop | Self::LoopAll)
    }
}

/// What playback does when the consumer becomes visible or hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityAction {
    Restart,
    Pause,
    #[default]
    Continue,
    None,
}

/// Playback direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn is_forward(self) -> bool {
        self == Self::Forward
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

/// Container format for exported replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Mkv,
    Mp4,
    Mov,
    Flv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mkv => "mkv",
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Flv => "flv",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = crate::error::ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mkv" => Ok(Self::Mkv),
            "mp4" => Ok(Self::Mp4),
            "mov" => Ok(Self::Mov),
            "flv" => Ok(Self::Flv),
            other => Err(crate::error::ReplayError::config(format!(
                "unknown export format '{other}'"
            ))),
        }
    }
}

/// Capture and playback defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayDefaults {
    /// Capture window length in milliseconds.
    pub duration_ms: u64,

    /// Number of replays retained by the store.
    pub max_replays: usize,

    /// Playback speed percentage, in `[0.01, 400]`.
    pub speed_percent: f64,

    /// Delay before the first frame, in milliseconds. Negative values skip
    /// into the replay instead.
    pub start_delay_ms: i64,

    pub end_action: EndAction,

    pub visibility_action: VisibilityAction,

    pub direction: Direction,

    /// Scene activated when playback ends on a Hide or Pause action.
    pub next_scene: Option<String>,
}

impl ReplayDefaults {
    pub fn duration_ns(&self) -> u64 {
        self.duration_ms.saturating_mul(NSEC_PER_MSEC)
    }

    pub fn start_delay_ns(&self) -> i64 {
        self.start_delay_ms.saturating_mul(NSEC_PER_MSEC as i64)
    }
}

impl Default for ReplayDefaults {
    fn default() -> Self {
        Self {
            duration_ms: 5_000,
            max_replays: 1,
            speed_percent: 100.0,
            start_delay_ms: 0,
            end_action: EndAction::default(),
            visibility_action: VisibilityAction::default(),
            direction: Direction::default(),
            next_scene: None,
        }
    }
}

/// Export defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Directory exported files are written to.
    pub directory: PathBuf,

    pub format: ExportFormat,

    /// Encode losslessly instead of with the default quality preset.
    pub lossless: bool,

    /// chrono format pattern for the output file stem.
    pub filename_pattern: String,

    pub width: u32,
    pub height: u32,
    pub fps: u32,

    pub audio_sample_rate: u32,
    pub audio_channels: u16,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            directory: default_export_dir(),
            format: ExportFormat::default(),
            lossless: false,
            filename_pattern: "Replay %Y-%m-%d %H-%M-%S".to_string(),
            width: 1920,
            height: 1080,
            fps: 30,
            audio_sample_rate: 48_000,
            audio_channels: 2,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "rewind=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config");
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &std::path::Path) -> crate::error::ReplayResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("rewind").join("config.json")
}

/// Default export directory.
fn default_export_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join("Videos").join("rewind")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.replay.duration_ns(), 5_000_000_000);
        assert_eq!(config.replay.max_replays, 1);
        assert_eq!(config.replay.end_action, EndAction::Loop);
        assert_eq!(config.replay.visibility_action, VisibilityAction::Continue);
        assert!(config.replay.next_scene.is_none());
        assert_eq!(config.export.format, ExportFormat::Mkv);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "replay": { "max_replays": 3, "end_action": "loop_all" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.replay.max_replays, 3);
        assert_eq!(config.replay.end_action, EndAction::LoopAll);
        assert_eq!(config.replay.duration_ms, 5_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("rewind-config-{}", std::process::id()));
        let path = dir.join("config.json");
        let mut config = AppConfig::default();
        config.replay.start_delay_ms = -250;
        config.export.format = ExportFormat::Mp4;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.replay.start_delay_ns(), -250_000_000);
        assert_eq!(loaded.export.format, ExportFormat::Mp4);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let config = AppConfig::load_from(std::path::Path::new("/nonexistent/rewind.json"));
        assert_eq!(config.replay.max_replays, 1);
    }

    #[test]
    fn test_end_action_helpers() {
        assert!(EndAction::LoopAll.spans_store());
        assert_eq!(EndAction::ReverseAll.single(), EndAction::Reverse);
        assert!(EndAction::Loop.wraps());
        assert!(!EndAction::Pause.wraps());
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!("MOV".parse::<ExportFormat>().unwrap(), ExportFormat::Mov);
        assert!("avi".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Flv.extension(), "flv");
    }
}
