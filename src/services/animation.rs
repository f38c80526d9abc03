//! Idle animation shown while the recognition call is outstanding
//!
//! The recognition service blocks for several seconds; the eyes keep moving
//! on the head screen so the robot does not look stuck. The animation runs
//! as its own task and is cancelled through a watch channel the moment the
//! foreground call returns. Cancellation is cooperative: the flag is checked
//! before each frame, so a frame in flight finishes before the task stops.

use crate::io::display::{DisplayImage, HeadDisplay};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// The fixed frame sequence: focus, then glance right/left twice.
const FRAMES: [DisplayImage; 5] = [
    DisplayImage::EyesFocusing,
    DisplayImage::EyesFocusingRight,
    DisplayImage::EyesFocusingLeft,
    DisplayImage::EyesFocusingRight,
    DisplayImage::EyesFocusingLeft,
];

/// Cancellable eye animation, one instance per recognition attempt.
pub struct IdleAnimation {
    display: Arc<dyn HeadDisplay>,
    frame_delay: Duration,
}

impl IdleAnimation {
    pub fn new(display: Arc<dyn HeadDisplay>, frame_delay: Duration) -> Self {
        Self { display, frame_delay }
    }

    /// Spawn the animation task and return its cancellation handle.
    ///
    /// Fire-and-forget: the caller never joins the task, it only flips the
    /// handle to `true` once the blocking foreground call has returned.
    pub fn spawn(self) -> watch::Sender<bool> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            self.run(cancel_rx).await;
        });
        cancel_tx
    }

    async fn run(self, cancel: watch::Receiver<bool>) {
        for frame in FRAMES {
            if *cancel.borrow() {
                debug!("idle_animation_cancelled");
                return;
            }
            self.display.show(frame).await;
            tokio::time::sleep(self.frame_delay).await;
        }
        debug!("idle_animation_finished");
    }
}
