use std::collections::HashMap;

use tracing::debug;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId, WindowLevel};

use super::{ScreenRect, WindowAdapter, WindowError, WindowHandle, WindowSpec};
use crate::constants::{DEFAULT_ARENA_HEIGHT, DEFAULT_ARENA_WIDTH};
use crate::types::Rect;

struct OsWindow {
    window: Window,
    requested: ScreenRect,
}

/// Owns the real OS windows across ticks. Dropping a [`Window`] closes it, so
/// dropping the table tears down every window it still holds.
pub struct WindowTable {
    windows: HashMap<WindowHandle, OsWindow>,
    by_id: HashMap<WindowId, WindowHandle>,
    next_handle: u64,
    screen: Rect,
}

impl WindowTable {
    pub fn new(event_loop: &ActiveEventLoop) -> Self {
        let screen = event_loop
            .primary_monitor()
            .map(|monitor| {
                let origin = monitor.position();
                let size = monitor.size();
                Rect::new(
                    origin.x as f32,
                    origin.y as f32,
                    size.width as f32,
                    size.height as f32,
                )
            })
            .unwrap_or(Rect::new(0.0, 0.0, DEFAULT_ARENA_WIDTH, DEFAULT_ARENA_HEIGHT));
        Self {
            windows: HashMap::new(),
            by_id: HashMap::new(),
            next_handle: 1,
            screen,
        }
    }

    pub fn handle_of(&self, id: WindowId) -> Option<WindowHandle> {
        self.by_id.get(&id).copied()
    }

    pub fn set_title(&self, handle: WindowHandle, title: &str) {
        if let Some(os) = self.windows.get(&handle) {
            os.window.set_title(title);
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn close_all(&mut self) {
        self.by_id.clear();
        self.windows.clear();
    }
}

/// Per-tick view that lets the engine create windows; winit only hands out
/// an [`ActiveEventLoop`] inside its callbacks.
pub struct WinitDesktop<'a> {
    event_loop: &'a ActiveEventLoop,
    table: &'a mut WindowTable,
}

impl<'a> WinitDesktop<'a> {
    pub fn new(event_loop: &'a ActiveEventLoop, table: &'a mut WindowTable) -> Self {
        Self { event_loop, table }
    }
}

impl WindowAdapter for WinitDesktop<'_> {
    fn create(&mut self, spec: &WindowSpec) -> Result<WindowHandle, WindowError> {
        let mut attributes = Window::default_attributes()
            .with_title(spec.title.clone())
            .with_inner_size(PhysicalSize::new(spec.bounds.w, spec.bounds.h))
            .with_position(PhysicalPosition::new(spec.bounds.x, spec.bounds.y))
            .with_decorations(false)
            .with_resizable(false)
            .with_active(spec.takes_focus());
        if spec.always_on_top() {
            attributes = attributes.with_window_level(WindowLevel::AlwaysOnTop);
        }
        let window = self
            .event_loop
            .create_window(attributes)
            .map_err(|error| WindowError::Platform(error.to_string()))?;

        let handle = WindowHandle(self.table.next_handle);
        self.table.next_handle += 1;
        debug!(?handle, title = %spec.title, "os window created");
        self.table.by_id.insert(window.id(), handle);
        self.table.windows.insert(
            handle,
            OsWindow {
                window,
                requested: spec.bounds,
            },
        );
        Ok(handle)
    }

    fn move_to(&mut self, handle: WindowHandle, x: i32, y: i32) -> Result<(), WindowError> {
        let os = self
            .table
            .windows
            .get_mut(&handle)
            .ok_or(WindowError::NotOpen(handle))?;
        os.window.set_outer_position(PhysicalPosition::new(x, y));
        os.requested.x = x;
        os.requested.y = y;
        Ok(())
    }

    fn resize(&mut self, handle: WindowHandle, w: u32, h: u32) -> Result<(), WindowError> {
        let os = self
            .table
            .windows
            .get_mut(&handle)
            .ok_or(WindowError::NotOpen(handle))?;
        let _ = os.window.request_inner_size(PhysicalSize::new(w, h));
        os.requested.w = w;
        os.requested.h = h;
        Ok(())
    }

    fn close(&mut self, handle: WindowHandle) -> Result<(), WindowError> {
        if let Some(os) = self.table.windows.remove(&handle) {
            self.table.by_id.remove(&os.window.id());
        }
        Ok(())
    }

    fn query_bounds(&self, handle: WindowHandle) -> Result<ScreenRect, WindowError> {
        let os = self
            .table
            .windows
            .get(&handle)
            .ok_or(WindowError::NotOpen(handle))?;
        // Some platforms (Wayland) never report positions; fall back to what
        // was last requested.
        let (x, y) = match os.window.outer_position() {
            Ok(position) => (position.x, position.y),
            Err(_) => (os.requested.x, os.requested.y),
        };
        let size = os.window.outer_size();
        let (w, h) = if size.width == 0 || size.height == 0 {
            // not mapped yet
            (os.requested.w, os.requested.h)
        } else {
            (size.width, size.height)
        };
        Ok(ScreenRect { x, y, w, h })
    }

    fn screen(&self) -> Rect {
        self.table.screen
    }
}
