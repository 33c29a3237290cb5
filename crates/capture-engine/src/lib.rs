//! Rewind Capture Engine
//!
//! Keeps a rolling window of each producer's most recent frames and audio
//! packets, and freezes a window into a [`Snapshot`](rewind_media_model::Snapshot)
//! on demand.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               CaptureRegistry                │
//! │  ┌─────────────────┐   ┌─────────────────┐   │
//! │  │ CaptureWindow   │   │ CaptureWindow   │   │
//! │  │ video │ audio   │   │ video │ audio   │   │
//! │  └────────┬────────┘   └─────────────────┘   │
//! │           │ extract()                        │
//! │           ▼                                  │
//! │      Snapshot (immutable media + trim)       │
//! └──────────────────────────────────────────────┘
//! ```

pub mod extract;
pub mod registry;
pub mod window;

pub use extract::*;
pub use registry::*;
pub use window::*;
