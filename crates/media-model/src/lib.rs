//! Rewind Media Model
//!
//! Defines the data that flows through the replay engine:
//! - **Frames:** Decoded video frames with per-plane strides, shared by `Arc`
//! - **Audio:** Planar `f32` audio packets with the format they were captured in
//! - **Snapshots:** Immutable media extracted from a capture window plus the
//!   per-holder trim that narrows its playable range
//!
//! All timestamps are nanoseconds in the host's monotonic time domain.

pub mod frame;
pub mod snapshot;

pub use frame::*;
pub use snapshot::*;
