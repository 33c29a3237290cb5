//! Scene switching after playback ends.
//!
//! The switch itself is a host side effect and may block, so it runs on a
//! dedicated worker thread fed through a channel. The worker is spawned on
//! first use and joined on drop.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

/// Host collaborator that changes the active scene.
pub trait SceneSwitcher: Send + Sync {
    fn activate(&self, scene: &str);
}

/// Forwards scene requests to a [`SceneSwitcher`] off the caller's thread.
pub struct SceneDispatcher {
    switcher: Arc<dyn SceneSwitcher>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    sender: Sender<String>,
    handle: JoinHandle<()>,
}

impl SceneDispatcher {
    pub fn new(switcher: Arc<dyn SceneSwitcher>) -> Self {
        Self {
            switcher,
            worker: Mutex::new(None),
        }
    }

    /// Queue a switch to `scene`.
    pub fn dispatch(&self, scene: &str) {
        let mut worker = self.worker.lock();
        if worker.is_none() {
            match self.spawn() {
                Ok(spawned) => *worker = Some(spawned),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to start scene switch worker");
                    return;
                }
            }
        }
        if let Some(w) = worker.as_ref() {
            if w.sender.send(scene.to_string()).is_err() {
                tracing::warn!(scene, "Scene switch worker has exited");
            }
        }
    }

    fn spawn(&self) -> std::io::Result<Worker> {
        let (sender, receiver) = mpsc::channel::<String>();
        let switcher = self.switcher.clone();
        let handle = std::thread::Builder::new()
            .name("rewind-scene-switch".to_string())
            .spawn(move || {
                for scene in receiver {
                    tracing::info!(scene = %scene, "Switching scene");
                    switcher.activate(&scene);
                }
            })?;
        Ok(Worker { sender, handle })
    }
}

impl Drop for SceneDispatcher {
    fn drop(&mut self) {
        if let Some(Worker { sender, handle }) = self.worker.get_mut().take() {
            drop(sender);
            if handle.join().is_err() {
                tracing::warn!("Scene switch worker panicked");
            }
        }
    }
}
