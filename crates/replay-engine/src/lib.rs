//! Rewind Replay Engine
//!
//! The surface a host talks to. Producers attach and push frames into their
//! capture window; a trigger freezes the source window into a replay that the
//! player shows and the export pipeline can write out at the same time.
//!
//! ```text
//! producer ──► CaptureWindow ──(trigger)──► SnapshotStore ──► Player ──► consumer
//!                                                │
//!                                                └──► ExportPipeline ──► file
//! ```

pub mod engine;

pub use engine::*;

pub use rewind_capture_engine::{CaptureWindow, WindowStats};
pub use rewind_export_engine::{
    EncoderConfig, EncoderService, EncoderSession, ExportProgress, ExportStage, ExportState,
    FfmpegEncoder, OutputDescriptor,
};
pub use rewind_playback_core::{FrameOutput, PlaybackState, SceneSwitcher, Selection, TickOutput};
