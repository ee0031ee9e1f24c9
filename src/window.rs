// =============================================================================
// WINDOW - winit window driven by pumped events
// =============================================================================
//
// The frame loop owns the control flow, so instead of handing it to
// `EventLoop::run_app` the events are pumped once per frame (or blocked on
// while the window has no drawable area).

use anyhow::{bail, Context, Result};
use ash::vk;
use std::time::Duration;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

/// Upper bound on pumps while waiting for the platform to create the window
const WINDOW_CREATION_PUMPS: usize = 100;

/// What the renderer needs from a window
pub trait FrameWindow {
    /// Drawable size in pixels; zero while minimized
    fn extent(&self) -> vk::Extent2D;
    fn should_close(&self) -> bool;
    /// Set when the window was resized since the flag was last reset
    fn was_resized(&self) -> bool;
    fn reset_resized_flag(&mut self);
    /// Handle pending events without blocking
    fn poll_events(&mut self);
    /// Block until at least one event arrives
    fn wait_events(&mut self);
    fn set_title(&mut self, title: &str);
}

/// Event handler state shared with winit
struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    created: bool,
    creation_error: Option<String>,
    close_requested: bool,
    resized: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.created {
            return;
        }

        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                self.window = Some(window);
                self.created = true;
            }
            Err(e) => {
                self.creation_error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.resized = true;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                log::info!("ESC pressed, exiting...");
                self.close_requested = true;
            }
            _ => {}
        }
    }
}

/// The application window
pub struct AppWindow {
    window: Window,
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl AppWindow {
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        let mut event_loop = EventLoop::new().context("Failed to create event loop")?;
        let mut state = WindowState {
            attributes: Window::default_attributes()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height)),
            window: None,
            created: false,
            creation_error: None,
            close_requested: false,
            resized: false,
        };

        // Windows are created from inside the event loop
        for _ in 0..WINDOW_CREATION_PUMPS {
            let status = event_loop.pump_app_events(Some(Duration::from_millis(10)), &mut state);
            if let Some(e) = state.creation_error.take() {
                bail!("Failed to create window: {}", e);
            }
            if state.created || matches!(status, PumpStatus::Exit(_)) {
                break;
            }
        }

        let window = state
            .window
            .take()
            .context("Event loop never created the window")?;
        log::info!("Created window '{}' ({}x{})", title, width, height);

        Ok(Self {
            window,
            state,
            event_loop,
        })
    }

    /// The winit window, for surface creation
    pub fn handle(&self) -> &Window {
        &self.window
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            log::debug!("Event loop exited with code {}", code);
            self.state.close_requested = true;
        }
    }
}

impl FrameWindow for AppWindow {
    fn extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn was_resized(&self) -> bool {
        self.state.resized
    }

    fn reset_resized_flag(&mut self) {
        self.state.resized = false;
    }

    fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }
}
