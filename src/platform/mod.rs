// Window/Input provider contract
//
// The loop pulls a batch of discrete events once per iteration. Window
// lifecycle events drive the loop's flags; `Input` is forwarded to layers
// untouched.

pub mod window;

pub use window::WinitPlatform;

use crate::rhi::Extent;

#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    CloseRequested,
    Resized(Extent),
    /// Client area in pixels changed without a logical resize (DPI change).
    PixelSizeChanged(Extent),
    Minimized,
    Restored,
    Input(InputEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// `key` is the physical key name, e.g. "Escape", "F11", "KeyW".
    Key {
        key: String,
        pressed: bool,
        repeat: bool,
    },
    PointerMoved {
        x: f32,
        y: f32,
    },
    PointerButton {
        button: u16,
        pressed: bool,
    },
    Wheel {
        dx: f32,
        dy: f32,
    },
    Focused(bool),
    Text(String),
}

impl InputEvent {
    /// True for the initial press of `name`, ignoring auto-repeat.
    pub fn is_key_press(&self, name: &str) -> bool {
        matches!(self, InputEvent::Key { key, pressed: true, repeat: false } if key == name)
    }
}

pub trait Platform {
    /// Append every event that arrived since the last call.
    fn poll_events(&mut self, events: &mut Vec<PlatformEvent>);

    /// Current client area in pixels.
    fn pixel_size(&self) -> Extent;

    fn set_title(&mut self, title: &str);

    fn set_fullscreen(&mut self, fullscreen: bool);
}
