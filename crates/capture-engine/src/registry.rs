//! Producer registry: one capture window per attached producer.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rewind_common::clock::{Clock, NSEC_PER_MSEC};

use crate::window::{CaptureWindow, WindowConfig};

/// Tracks the capture windows of every attached producer.
pub struct CaptureRegistry {
    clock: Arc<dyn Clock>,
    config: RwLock<WindowConfig>,
    windows: RwLock<HashMap<String, Arc<CaptureWindow>>>,
}

impl CaptureRegistry {
    pub fn new(clock: Arc<dyn Clock>, config: WindowConfig) -> Self {
        Self {
            clock,
            config: RwLock::new(config),
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a producer, returning its window handle.
    ///
    /// Attaching an already attached producer returns the existing window.
    pub fn attach(&self, producer: &str) -> Arc<CaptureWindow> {
        if let Some(window) = self.windows.read().get(producer) {
            return window.clone();
        }
        let config = *self.config.read();
        let mut windows = self.windows.write();
        windows
            .entry(producer.to_string())
            .or_insert_with(|| {
                tracing::info!(
                    producer,
                    duration_ms = config.duration_ns / NSEC_PER_MSEC,
                    "Producer attached"
                );
                Arc::new(CaptureWindow::new(producer, self.clock.clone(), config))
            })
            .clone()
    }

    /// Detach a producer and discard its window's contents.
    ///
    /// Returns whether the producer was attached.
    pub fn detach(&self, producer: &str) -> bool {
        let removed = self.windows.write().remove(producer);
        match removed {
            Some(window) => {
                window.clear();
                tracing::info!(producer, "Producer detached");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, producer: &str) -> Option<Arc<CaptureWindow>> {
        self.windows.read().get(producer).cloned()
    }

    /// Names of attached producers, sorted.
    pub fn producers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.windows.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Apply a new duration to every window and to windows attached later.
    pub fn set_duration(&self, duration_ns: u64) {
        self.config.write().duration_ns = duration_ns;
        for window in self.windows.read().values() {
            window.set_duration(duration_ns);
        }
    }

    pub fn duration_ns(&self) -> u64 {
        self.config.read().duration_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_common::clock::{ManualClock, NSEC_PER_SEC};
    use rewind_media_model::{VideoFormat, VideoFrame};

    fn registry() -> CaptureRegistry {
        CaptureRegistry::new(Arc::new(ManualClock::new(NSEC_PER_SEC)), WindowConfig::default())
    }

    #[test]
    fn test_attach_is_idempotent() {
        let registry = registry();
        let a = registry.attach("cam");
        let b = registry.attach("cam");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.producers(), vec!["cam".to_string()]);
    }

    #[test]
    fn test_detach_clears_window() {
        let registry = registry();
        let window = registry.attach("cam");
        window.push_video_frame(VideoFrame::new(VideoFormat::Y800, 2, 2, NSEC_PER_SEC));
        assert!(registry.detach("cam"));
        assert_eq!(window.stats().video_frames, 0);
        assert!(registry.get("cam").is_none());
        assert!(!registry.detach("cam"));
    }

    #[test]
    fn test_set_duration_applies_to_all_windows() {
        let registry = registry();
        let window = registry.attach("cam");
        registry.set_duration(2 * NSEC_PER_SEC);
        assert_eq!(window.duration_ns(), 2 * NSEC_PER_SEC);
        assert_eq!(registry.attach("mic").duration_ns(), 2 * NSEC_PER_SEC);
    }
}
