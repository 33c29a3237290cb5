//! Rewind Export Engine
//!
//! Streams a snapshot to an encoder at the output's native frame rate while
//! playback continues on the same replay.
//!
//! # Pipeline Architecture
//!
//! ```text
//! Snapshot ──┬── frame pacing (k / fps) ──► write_video ──┐
//!            │                                           ├── EncoderSession ──► file
//!            └── audio mixer (per output frame) ► write_audio ┘
//! ```
//!
//! The job holds its own clone of the snapshot, so trimming or removing the
//! replay in the store does not affect a running export.

pub mod encoder;
pub mod export;
pub mod mixer;

pub use encoder::*;
pub use export::*;
pub use mixer::*;
