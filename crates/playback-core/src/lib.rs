//! Rewind Playback Core
//!
//! Plays retained snapshots back to a consumer:
//! - **Store:** Bounded list of snapshots with a current selection
//! - **Cursor:** State machine mapping wall-clock time to snapshot time
//!   under variable speed, direction and trim
//! - **Audio:** Packet scheduling against the cursor's clock
//! - **Player:** The locked, host-facing combination of the above, including
//!   end-of-replay policies and scene switching
//!
//! All operations take `now` explicitly; nothing here reads a clock.

pub mod audio;
pub mod cursor;
pub mod player;
pub mod scene;
pub mod speed;
pub mod store;

pub use audio::*;
pub use cursor::*;
pub use player::*;
pub use scene::*;
pub use speed::*;
pub use store::*;
