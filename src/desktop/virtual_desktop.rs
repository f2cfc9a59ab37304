use std::collections::BTreeMap;

use super::{ScreenRect, WindowAdapter, WindowError, WindowHandle, WindowSpec};
use crate::constants::{DEFAULT_ARENA_HEIGHT, DEFAULT_ARENA_WIDTH};
use crate::types::Rect;

#[derive(Clone, Debug)]
struct VirtualWindow {
    title: String,
    bounds: ScreenRect,
}

/// In-memory window manager. It clamps windows to the screen like a real
/// one does, and can be told to refuse windows to exercise failure paths.
#[derive(Clone, Debug)]
pub struct VirtualDesktop {
    screen: ScreenRect,
    windows: BTreeMap<WindowHandle, VirtualWindow>,
    next_handle: u64,
    max_windows: Option<usize>,
    fail_next_creates: usize,
    fail_all_creates: bool,
    fail_moves: bool,
    lagging_moves: bool,
    queued_moves: BTreeMap<WindowHandle, (i32, i32)>,
    pub create_calls: u64,
    pub move_calls: u64,
    pub resize_calls: u64,
    pub close_calls: u64,
}

impl VirtualDesktop {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen: ScreenRect {
                x: 0,
                y: 0,
                w: width,
                h: height,
            },
            windows: BTreeMap::new(),
            next_handle: 1,
            max_windows: None,
            fail_next_creates: 0,
            fail_all_creates: false,
            fail_moves: false,
            lagging_moves: false,
            queued_moves: BTreeMap::new(),
            create_calls: 0,
            move_calls: 0,
            resize_calls: 0,
            close_calls: 0,
        }
    }

    pub fn with_max_windows(mut self, max: usize) -> Self {
        self.max_windows = Some(max);
        self
    }

    pub fn fail_next_creates(&mut self, count: usize) {
        self.fail_next_creates = count;
    }

    pub fn set_fail_all_creates(&mut self, fail: bool) {
        self.fail_all_creates = fail;
    }

    pub fn set_fail_moves(&mut self, fail: bool) {
        self.fail_moves = fail;
    }

    /// Each move lands only when the next move for the same window is
    /// requested, like a window manager that applies requests a batch late.
    pub fn set_lagging_moves(&mut self, lagging: bool) {
        self.lagging_moves = lagging;
        if !lagging {
            self.settle();
        }
    }

    /// Applies every move still queued by a lagging window manager.
    pub fn settle(&mut self) {
        let queued = std::mem::take(&mut self.queued_moves);
        for (handle, (x, y)) in queued {
            self.place(handle, x, y);
        }
    }

    pub fn open_count(&self) -> usize {
        self.windows.len()
    }

    pub fn title(&self, handle: WindowHandle) -> Option<&str> {
        self.windows.get(&handle).map(|w| w.title.as_str())
    }

    /// Moves a window behind the engine's back, like a user dragging it.
    pub fn drag(&mut self, handle: WindowHandle, x: i32, y: i32) {
        self.queued_moves.remove(&handle);
        self.place(handle, x, y);
    }

    fn place(&mut self, handle: WindowHandle, x: i32, y: i32) {
        let screen = self.screen;
        if let Some(window) = self.windows.get_mut(&handle) {
            window.bounds = clamp_to_screen(
                ScreenRect {
                    x,
                    y,
                    ..window.bounds
                },
                screen,
            );
        }
    }

    fn window_mut(&mut self, handle: WindowHandle) -> Result<&mut VirtualWindow, WindowError> {
        self.windows
            .get_mut(&handle)
            .ok_or(WindowError::NotOpen(handle))
    }
}

impl Default for VirtualDesktop {
    fn default() -> Self {
        Self::new(DEFAULT_ARENA_WIDTH as u32, DEFAULT_ARENA_HEIGHT as u32)
    }
}

fn clamp_to_screen(bounds: ScreenRect, screen: ScreenRect) -> ScreenRect {
    let w = bounds.w.min(screen.w);
    let h = bounds.h.min(screen.h);
    let max_x = screen.x + (screen.w - w) as i32;
    let max_y = screen.y + (screen.h - h) as i32;
    ScreenRect {
        x: bounds.x.clamp(screen.x, max_x),
        y: bounds.y.clamp(screen.y, max_y),
        w,
        h,
    }
}

impl WindowAdapter for VirtualDesktop {
    fn create(&mut self, spec: &WindowSpec) -> Result<WindowHandle, WindowError> {
        self.create_calls += 1;
        if self.fail_all_creates {
            return Err(WindowError::Exhausted);
        }
        if self.fail_next_creates > 0 {
            self.fail_next_creates -= 1;
            return Err(WindowError::Exhausted);
        }
        if let Some(max) = self.max_windows {
            if self.windows.len() >= max {
                return Err(WindowError::Exhausted);
            }
        }
        let handle = WindowHandle(self.next_handle);
        self.next_handle += 1;
        self.windows.insert(
            handle,
            VirtualWindow {
                title: spec.title.clone(),
                bounds: clamp_to_screen(spec.bounds, self.screen),
            },
        );
        Ok(handle)
    }

    fn move_to(&mut self, handle: WindowHandle, x: i32, y: i32) -> Result<(), WindowError> {
        self.move_calls += 1;
        self.window_mut(handle)?;
        if self.fail_moves {
            return Err(WindowError::Platform("move refused".to_string()));
        }
        if self.lagging_moves {
            if let Some((qx, qy)) = self.queued_moves.insert(handle, (x, y)) {
                self.place(handle, qx, qy);
            }
            return Ok(());
        }
        self.place(handle, x, y);
        Ok(())
    }

    fn resize(&mut self, handle: WindowHandle, w: u32, h: u32) -> Result<(), WindowError> {
        self.resize_calls += 1;
        let screen = self.screen;
        let window = self.window_mut(handle)?;
        window.bounds = clamp_to_screen(
            ScreenRect {
                w,
                h,
                ..window.bounds
            },
            screen,
        );
        Ok(())
    }

    fn close(&mut self, handle: WindowHandle) -> Result<(), WindowError> {
        self.close_calls += 1;
        self.queued_moves.remove(&handle);
        self.windows.remove(&handle);
        Ok(())
    }

    fn query_bounds(&self, handle: WindowHandle) -> Result<ScreenRect, WindowError> {
        self.windows
            .get(&handle)
            .map(|w| w.bounds)
            .ok_or(WindowError::NotOpen(handle))
    }

    fn screen(&self) -> Rect {
        self.screen.to_rect()
    }
}
