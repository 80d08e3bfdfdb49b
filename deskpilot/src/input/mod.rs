//! Exclusive owner of synthetic mouse/keyboard state.
//!
//! The actor is the only component allowed to post input events or touch
//! the pressed-key/button sets. A cloneable [`InputActor`] handle sends
//! commands over a channel to a single worker task, so concurrent callers
//! can never interleave inside a down/up pair.

mod backend;

pub use backend::{BackendError, EnigoBackend, InputBackend};

use crate::action::{Key, MouseButton};
use crate::errors::AutomationError;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Poll interval for interpolated mouse movement. Actual OS scheduling
/// granularity may be coarser; the worker just loops as fast as it can.
const SMOOTH_MOVE_TICK: Duration = Duration::from_millis(1);

/// Settle time between the steps of the paste chord, so the modifier is
/// registered before the `v` goes down.
const PASTE_CHORD_SETTLE: Duration = Duration::from_millis(50);

/// Used when the backend cannot report the primary display size.
const FALLBACK_DISPLAY: (i32, i32) = (1920, 1080);

/// Point-in-time view of the actor's state, mainly for diagnostics and
/// tests.
#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    pub pressed_keys: Vec<Key>,
    pub pressed_buttons: Vec<MouseButton>,
    pub cursor: (i32, i32),
}

enum Command {
    Move {
        x: i32,
        y: i32,
        done: oneshot::Sender<()>,
    },
    SmoothMove {
        x: i32,
        y: i32,
        duration_ms: u64,
        done: oneshot::Sender<()>,
    },
    ButtonDown {
        button: MouseButton,
        done: oneshot::Sender<()>,
    },
    ButtonUp {
        button: MouseButton,
        done: oneshot::Sender<()>,
    },
    KeyDown {
        key: Key,
        done: oneshot::Sender<()>,
    },
    KeyUp {
        key: Key,
        done: oneshot::Sender<()>,
    },
    Paste {
        text: String,
        done: oneshot::Sender<()>,
    },
    Scroll {
        dx: i32,
        dy: i32,
        done: oneshot::Sender<()>,
    },
    ReleaseAll {
        done: oneshot::Sender<()>,
    },
    Snapshot {
        done: oneshot::Sender<InputSnapshot>,
    },
    DisplaySize {
        done: oneshot::Sender<(i32, i32)>,
    },
}

/// Handle to the serialized input worker.
///
/// Every call suspends the caller until the worker has finished the
/// corresponding device operation. Device failures are soft: they are
/// logged and never surfaced to the caller, because the typical cause is
/// a missing input-injection permission that must be granted out of band.
#[derive(Clone)]
pub struct InputActor {
    tx: mpsc::UnboundedSender<Command>,
}

impl InputActor {
    /// Spawn a worker around the given backend.
    pub fn spawn(backend: Box<dyn InputBackend>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = InputWorker {
            backend,
            pressed_keys: HashSet::new(),
            pressed_buttons: HashSet::new(),
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// Spawn a worker over the real mouse/keyboard.
    pub fn native() -> Result<Self, AutomationError> {
        let backend = EnigoBackend::new()
            .map_err(|e| AutomationError::Resource(format!("input backend unavailable: {e}")))?;
        Ok(Self::spawn(Box::new(backend)))
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (done, ack) = oneshot::channel();
        if self.tx.send(build(done)).is_err() {
            error!("input worker is gone; dropping input request");
            return None;
        }
        ack.await.ok()
    }

    /// Post an absolute cursor move.
    pub async fn move_mouse(&self, x: i32, y: i32) {
        let _ = self.request(|done| Command::Move { x, y, done }).await;
    }

    /// Linearly interpolate the cursor to `(x, y)` over `duration_ms`.
    /// Suspends the caller for the full duration. Degrades to a single
    /// immediate move for very short durations.
    pub async fn smooth_move(&self, x: i32, y: i32, duration_ms: u64) {
        let _ = self
            .request(|done| Command::SmoothMove {
                x,
                y,
                duration_ms,
                done,
            })
            .await;
    }

    pub async fn mouse_down(&self, button: MouseButton) {
        let _ = self
            .request(|done| Command::ButtonDown { button, done })
            .await;
    }

    /// Releasing a button that is not pressed is a no-op.
    pub async fn mouse_up(&self, button: MouseButton) {
        let _ = self
            .request(|done| Command::ButtonUp { button, done })
            .await;
    }

    pub async fn key_press(&self, key: Key) {
        let _ = self.request(|done| Command::KeyDown { key, done }).await;
    }

    /// Releasing a key that is not pressed is a no-op.
    pub async fn key_release(&self, key: Key) {
        let _ = self.request(|done| Command::KeyUp { key, done }).await;
    }

    /// Enter literal text: set the clipboard, then send the platform paste
    /// chord (Cmd+V on macOS, Ctrl+V elsewhere). This is the only
    /// sanctioned text-entry mechanism; per-character key synthesis is
    /// unreliable for non-Latin text. The target input focus must already
    /// be correct, and prior clipboard contents are not restored.
    pub async fn paste_text(&self, text: &str) {
        let _ = self
            .request(|done| Command::Paste {
                text: text.to_owned(),
                done,
            })
            .await;
    }

    /// Scroll by pixel deltas at the current cursor position.
    pub async fn scroll(&self, dx: i32, dy: i32) {
        let _ = self.request(|done| Command::Scroll { dx, dy, done }).await;
    }

    /// Suspend the caller. Runs handle-side so it never occupies the
    /// worker and other callers are not blocked.
    pub async fn delay(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    /// Release every pressed key and button. Total and idempotent: a
    /// second call in a row posts no events at all, and this never fails.
    pub async fn release_all(&self) {
        let _ = self.request(|done| Command::ReleaseAll { done }).await;
    }

    /// Current pressed sets and cursor position.
    pub async fn snapshot(&self) -> InputSnapshot {
        self.request(|done| Command::Snapshot { done })
            .await
            .unwrap_or_default()
    }

    /// Primary display size in pixels, with a fixed fallback when the
    /// backend cannot report it.
    pub async fn display_size(&self) -> (i32, i32) {
        self.request(|done| Command::DisplaySize { done })
            .await
            .unwrap_or(FALLBACK_DISPLAY)
    }
}

struct InputWorker {
    backend: Box<dyn InputBackend>,
    pressed_keys: HashSet<Key>,
    pressed_buttons: HashSet<MouseButton>,
}

impl InputWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Move { x, y, done } => {
                    self.post_move(x, y);
                    let _ = done.send(());
                }
                Command::SmoothMove {
                    x,
                    y,
                    duration_ms,
                    done,
                } => {
                    self.smooth_move(x, y, duration_ms).await;
                    let _ = done.send(());
                }
                Command::ButtonDown { button, done } => {
                    self.button_down(button);
                    let _ = done.send(());
                }
                Command::ButtonUp { button, done } => {
                    self.button_up(button);
                    let _ = done.send(());
                }
                Command::KeyDown { key, done } => {
                    self.key_down(key);
                    let _ = done.send(());
                }
                Command::KeyUp { key, done } => {
                    self.key_up(key);
                    let _ = done.send(());
                }
                Command::Paste { text, done } => {
                    self.paste(&text).await;
                    let _ = done.send(());
                }
                Command::Scroll { dx, dy, done } => {
                    if let Err(e) = self.backend.scroll(dx, dy) {
                        warn!("scroll failed: {e}");
                    }
                    let _ = done.send(());
                }
                Command::ReleaseAll { done } => {
                    self.release_all();
                    let _ = done.send(());
                }
                Command::Snapshot { done } => {
                    let _ = done.send(self.snapshot());
                }
                Command::DisplaySize { done } => {
                    let size = match self.backend.display_size() {
                        Ok(size) => size,
                        Err(e) => {
                            warn!("display size unavailable ({e}), using fallback");
                            FALLBACK_DISPLAY
                        }
                    };
                    let _ = done.send(size);
                }
            }
        }
        // All handles dropped; leave nothing half pressed.
        self.release_all();
    }

    fn post_move(&mut self, x: i32, y: i32) {
        if let Err(e) = self.backend.move_mouse(x, y) {
            warn!("mouse move failed: {e}");
        }
    }

    fn button_down(&mut self, button: MouseButton) {
        match self.backend.button(button, true) {
            Ok(()) => {
                self.pressed_buttons.insert(button);
            }
            Err(e) => warn!("button down failed: {e}"),
        }
    }

    fn button_up(&mut self, button: MouseButton) {
        if !self.pressed_buttons.remove(&button) {
            debug!(?button, "ignoring release of button that is not pressed");
            return;
        }
        if let Err(e) = self.backend.button(button, false) {
            warn!("button up failed: {e}");
        }
    }

    fn key_down(&mut self, key: Key) {
        match self.backend.key(key, true) {
            Ok(()) => {
                self.pressed_keys.insert(key);
            }
            Err(e) => warn!("key down failed: {e}"),
        }
    }

    fn key_up(&mut self, key: Key) {
        if !self.pressed_keys.remove(&key) {
            debug!(%key, "ignoring release of key that is not pressed");
            return;
        }
        if let Err(e) = self.backend.key(key, false) {
            warn!("key up failed: {e}");
        }
    }

    async fn smooth_move(&mut self, x: i32, y: i32, duration_ms: u64) {
        if duration_ms <= 1 {
            self.post_move(x, y);
            return;
        }

        let start = match self.backend.cursor_position() {
            Ok(pos) => pos,
            Err(e) => {
                warn!("cursor position unavailable ({e}), moving directly");
                self.post_move(x, y);
                return;
            }
        };

        let started = Instant::now();
        let duration = Duration::from_millis(duration_ms);
        loop {
            let elapsed = started.elapsed();
            if elapsed >= duration {
                self.post_move(x, y);
                break;
            }
            let t = elapsed.as_secs_f64() / duration.as_secs_f64();
            let cx = start.0 as f64 + (x - start.0) as f64 * t;
            let cy = start.1 as f64 + (y - start.1) as f64 * t;
            self.post_move(cx.round() as i32, cy.round() as i32);
            tokio::time::sleep(SMOOTH_MOVE_TICK).await;
        }
    }

    async fn paste(&mut self, text: &str) {
        if let Err(e) = self.backend.set_clipboard(text) {
            // Sending the chord anyway would paste whatever stale text was
            // on the clipboard into the focused field.
            warn!("clipboard set failed, skipping paste chord: {e}");
            return;
        }

        let modifier = if cfg!(target_os = "macos") {
            Key::Meta
        } else {
            Key::Control
        };

        self.key_down(modifier);
        tokio::time::sleep(PASTE_CHORD_SETTLE).await;
        self.key_down(Key::Char('v'));
        tokio::time::sleep(PASTE_CHORD_SETTLE).await;
        self.key_up(Key::Char('v'));
        self.key_up(modifier);
    }

    fn release_all(&mut self) {
        for button in self.pressed_buttons.drain() {
            if let Err(e) = self.backend.button(button, false) {
                warn!("release of {button:?} failed: {e}");
            }
        }
        for key in self.pressed_keys.drain() {
            if let Err(e) = self.backend.key(key, false) {
                warn!("release of {key} failed: {e}");
            }
        }
    }

    fn snapshot(&mut self) -> InputSnapshot {
        let cursor = self.backend.cursor_position().unwrap_or((0, 0));
        InputSnapshot {
            pressed_keys: self.pressed_keys.iter().copied().collect(),
            pressed_buttons: self.pressed_buttons.iter().copied().collect(),
            cursor,
        }
    }
}
