// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Result};
use std::time::Duration;
use tracing::{info, warn};

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowId},
};

/// What the renderer side may observe about the window after a pump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowState {
    pub running: bool,
    pub size: PhysicalSize<u32>,
    pub resized: bool,
    pub ticks: u64,
}

impl WindowState {
    fn new(size: PhysicalSize<u32>) -> Self {
        Self {
            running: true,
            size,
            resized: false,
            ticks: 0,
        }
    }

    fn begin_pump(&mut self) {
        self.resized = false;
    }

    fn apply(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.running = false;
            }
            WindowEvent::Resized(new_size) => {
                self.size = *new_size;
                self.resized = true;
            }
            _ => {}
        }
    }

    fn end_pump(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
    }
}

struct Handler {
    title: String,
    requested: PhysicalSize<u32>,
    window_id: Option<WindowId>,
    created: Option<Window>,
    create_error: Option<OsError>,
    state: WindowState,
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window_id.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(self.requested)
            .with_resizable(true);
        match event_loop.create_window(attrs) {
            Ok(window) => {
                self.state.size = window.inner_size();
                info!(
                    "window: created \"{}\" ({}x{})",
                    self.title, self.state.size.width, self.state.size.height
                );
                self.window_id = Some(window.id());
                self.created = Some(window);
            }
            Err(e) => self.create_error = Some(e),
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window_id != Some(window_id) {
            return;
        }
        if let WindowEvent::CloseRequested = event {
            info!("window: close requested");
        }
        self.state.apply(&event);
    }
}

/// A single resizable window whose events are drained on demand, so the
/// caller owns the main loop.
pub struct PlatformWindow {
    window: Window,
    handler: Handler,
    event_loop: EventLoop<()>,
}

impl PlatformWindow {
    /// Pumps the loop this many times waiting for the platform to hand us a
    /// window before giving up.
    const OPEN_ATTEMPTS: usize = 64;

    pub fn open(title: &str, width: u32, height: u32) -> Result<Self> {
        let mut event_loop = EventLoop::new()?;
        let requested = PhysicalSize::new(width.max(1), height.max(1));
        let mut handler = Handler {
            title: title.to_owned(),
            requested,
            window_id: None,
            created: None,
            create_error: None,
            state: WindowState::new(requested),
        };

        for _ in 0..Self::OPEN_ATTEMPTS {
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(Duration::ZERO), &mut handler)
            {
                return Err(anyhow!("event loop exited ({code}) before a window was created"));
            }
            if let Some(e) = handler.create_error.take() {
                return Err(anyhow!("create_window: {e}"));
            }
            if let Some(window) = handler.created.take() {
                handler.state.resized = false;
                handler.state.ticks = 0;
                return Ok(Self {
                    window,
                    handler,
                    event_loop,
                });
            }
        }
        Err(anyhow!("window was not created by the platform event loop"))
    }

    /// Event pump. Call once per loop iteration before rendering.
    /// `None` blocks until the platform delivers an event; `Some(ZERO)`
    /// drains what is queued and returns.
    pub fn pump(&mut self, timeout: Option<Duration>) {
        self.handler.state.begin_pump();
        let status = self.event_loop.pump_app_events(timeout, &mut self.handler);
        if let PumpStatus::Exit(code) = status {
            if code != 0 {
                warn!("window: event loop exited with code {code}");
            }
            self.handler.state.running = false;
        }
        self.handler.state.end_pump();
    }

    pub fn state(&self) -> &WindowState {
        &self.handler.state
    }

    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl Drop for PlatformWindow {
    fn drop(&mut self) {
        info!("window: destroying");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_sets_flag_until_next_pump() {
        let mut s = WindowState::new(PhysicalSize::new(1280, 720));
        s.begin_pump();
        s.apply(&WindowEvent::Resized(PhysicalSize::new(800, 600)));
        s.end_pump();
        assert!(s.resized);
        assert_eq!(s.size, PhysicalSize::new(800, 600));
        assert_eq!(s.ticks, 1);

        s.begin_pump();
        s.end_pump();
        assert!(!s.resized);
        assert_eq!(s.size, PhysicalSize::new(800, 600));
        assert_eq!(s.ticks, 2);
    }

    #[test]
    fn close_stops_running() {
        let mut s = WindowState::new(PhysicalSize::new(640, 480));
        assert!(s.running);
        s.apply(&WindowEvent::CloseRequested);
        assert!(!s.running);
    }

    #[test]
    fn unrelated_events_leave_state_alone() {
        let mut s = WindowState::new(PhysicalSize::new(640, 480));
        let before = s;
        s.apply(&WindowEvent::Focused(false));
        assert_eq!(s, before);
    }
}
