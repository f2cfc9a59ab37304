//! Platform capability boundary. The simulation only ever talks to OS windows
//! through [`WindowAdapter`], so it runs unchanged against the in-memory
//! [`VirtualDesktop`] in tests and headless runs.

use serde::Serialize;
use thiserror::Error;

use crate::types::{EntityKind, Rect};

mod virtual_desktop;
#[cfg(feature = "desktop")]
mod winit_desktop;

pub use virtual_desktop::VirtualDesktop;
#[cfg(feature = "desktop")]
pub use winit_desktop::{WindowTable, WinitDesktop};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WindowHandle(pub u64);

/// Integer screen geometry as the window manager reports it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl ScreenRect {
    pub fn from_rect(rect: &Rect) -> Self {
        Self {
            x: rect.x.round() as i32,
            y: rect.y.round() as i32,
            w: rect.w.round().max(1.0) as u32,
            h: rect.h.round().max(1.0) as u32,
        }
    }

    pub fn to_rect(self) -> Rect {
        Rect::new(self.x as f32, self.y as f32, self.w as f32, self.h as f32)
    }
}

#[derive(Clone, Debug)]
pub struct WindowSpec {
    pub title: String,
    pub bounds: ScreenRect,
    pub kind: EntityKind,
}

impl WindowSpec {
    pub fn always_on_top(&self) -> bool {
        self.kind.is_player()
    }

    pub fn takes_focus(&self) -> bool {
        self.kind.is_player()
    }
}

#[derive(Debug, Clone, Error)]
pub enum WindowError {
    #[error("window manager refused a new window: resources exhausted")]
    Exhausted,
    #[error("window {0:?} is not open")]
    NotOpen(WindowHandle),
    #[error("platform window error: {0}")]
    Platform(String),
}

pub trait WindowAdapter {
    fn create(&mut self, spec: &WindowSpec) -> Result<WindowHandle, WindowError>;

    fn move_to(&mut self, handle: WindowHandle, x: i32, y: i32) -> Result<(), WindowError>;

    fn resize(&mut self, handle: WindowHandle, w: u32, h: u32) -> Result<(), WindowError>;

    /// Closing a window that is already gone must succeed.
    fn close(&mut self, handle: WindowHandle) -> Result<(), WindowError>;

    fn query_bounds(&self, handle: WindowHandle) -> Result<ScreenRect, WindowError>;

    /// Usable screen area that windows are kept inside.
    fn screen(&self) -> Rect;
}
