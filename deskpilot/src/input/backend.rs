//! OS-level synthetic input backends.

use crate::action::{Key, MouseButton};
use arboard::Clipboard;
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use thiserror::Error;

/// Failure of a single backend call. These are soft: the actor logs them
/// and keeps going, since the usual cause is a missing Accessibility
/// permission the engine cannot grant itself.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// Raw device operations behind the input actor.
///
/// Implementations do not track pressed state; the actor owns that. All
/// calls are synchronous and serialized by the actor's worker task.
pub trait InputBackend: Send {
    fn move_mouse(&mut self, x: i32, y: i32) -> Result<(), BackendError>;
    fn button(&mut self, button: MouseButton, down: bool) -> Result<(), BackendError>;
    fn key(&mut self, key: Key, down: bool) -> Result<(), BackendError>;
    fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), BackendError>;
    fn set_clipboard(&mut self, text: &str) -> Result<(), BackendError>;
    fn cursor_position(&mut self) -> Result<(i32, i32), BackendError>;
    fn display_size(&mut self) -> Result<(i32, i32), BackendError>;
}

/// Production backend: `enigo` for synthetic events, `arboard` for the
/// clipboard.
pub struct EnigoBackend {
    enigo: Enigo,
    clipboard: Clipboard,
}

impl EnigoBackend {
    pub fn new() -> Result<Self, BackendError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| BackendError(format!("failed to initialize enigo: {e:?}")))?;
        let clipboard = Clipboard::new()
            .map_err(|e| BackendError(format!("failed to open clipboard: {e:?}")))?;
        Ok(Self { enigo, clipboard })
    }
}

fn map_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Center => Button::Middle,
    }
}

fn map_key(key: Key) -> enigo::Key {
    use enigo::Key as K;
    match key {
        Key::Return => K::Return,
        Key::Tab => K::Tab,
        Key::Space => K::Space,
        Key::Escape => K::Escape,
        Key::Backspace => K::Backspace,
        Key::Delete => K::Delete,
        Key::Meta => K::Meta,
        Key::Shift => K::Shift,
        Key::Alt => K::Alt,
        Key::Control => K::Control,
        Key::Up => K::UpArrow,
        Key::Down => K::DownArrow,
        Key::Left => K::LeftArrow,
        Key::Right => K::RightArrow,
        Key::F(n) => match n {
            1 => K::F1,
            2 => K::F2,
            3 => K::F3,
            4 => K::F4,
            5 => K::F5,
            6 => K::F6,
            7 => K::F7,
            8 => K::F8,
            9 => K::F9,
            10 => K::F10,
            11 => K::F11,
            _ => K::F12,
        },
        Key::Char(c) => K::Unicode(c),
    }
}

impl InputBackend for EnigoBackend {
    fn move_mouse(&mut self, x: i32, y: i32) -> Result<(), BackendError> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| BackendError(format!("move_mouse: {e:?}")))
    }

    fn button(&mut self, button: MouseButton, down: bool) -> Result<(), BackendError> {
        let direction = if down {
            Direction::Press
        } else {
            Direction::Release
        };
        self.enigo
            .button(map_button(button), direction)
            .map_err(|e| BackendError(format!("button: {e:?}")))
    }

    fn key(&mut self, key: Key, down: bool) -> Result<(), BackendError> {
        let direction = if down {
            Direction::Press
        } else {
            Direction::Release
        };
        self.enigo
            .key(map_key(key), direction)
            .map_err(|e| BackendError(format!("key: {e:?}")))
    }

    fn scroll(&mut self, dx: i32, dy: i32) -> Result<(), BackendError> {
        if dy != 0 {
            self.enigo
                .scroll(dy, Axis::Vertical)
                .map_err(|e| BackendError(format!("scroll: {e:?}")))?;
        }
        if dx != 0 {
            self.enigo
                .scroll(dx, Axis::Horizontal)
                .map_err(|e| BackendError(format!("scroll: {e:?}")))?;
        }
        Ok(())
    }

    fn set_clipboard(&mut self, text: &str) -> Result<(), BackendError> {
        self.clipboard
            .set_text(text.to_owned())
            .map_err(|e| BackendError(format!("set_clipboard: {e:?}")))
    }

    fn cursor_position(&mut self) -> Result<(i32, i32), BackendError> {
        self.enigo
            .location()
            .map_err(|e| BackendError(format!("cursor_position: {e:?}")))
    }

    fn display_size(&mut self) -> Result<(i32, i32), BackendError> {
        self.enigo
            .main_display()
            .map_err(|e| BackendError(format!("display_size: {e:?}")))
    }
}
