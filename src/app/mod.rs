//! Desktop shell: a winit event loop feeding the interactor and presenting
//! the software rendered frames through `pixels`.

mod egui_host;
mod input;
mod timing;

use crate::interactor::Interactor;
use egui_host::EguiHost;
use input::{key_name, Drag, InputState};
use timing::FrameTiming;

use pixels::{Pixels, SurfaceTexture};
use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Icon, Window, WindowAttributes, WindowId};

/// Wheel pixels per zoom step for touchpads.
const PIXELS_PER_WHEEL_STEP: f32 = 50.0;
/// Drag pixels per zoom step with the right button.
const PIXELS_PER_DRAG_STEP: f32 = 20.0;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("event loop failure")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("cannot create the window")]
    Window(#[from] winit::error::OsError),
    #[error("cannot create the presentation surface")]
    Surface(#[from] pixels::Error),
}

struct Presentation {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    egui: EguiHost,
}

pub struct App {
    interactor: Interactor,
    presentation: Option<Presentation>,
    input: InputState,
    timing: FrameTiming,
    failure: Option<AppError>,
}

impl App {
    fn new(interactor: Interactor) -> Self {
        Self {
            interactor,
            presentation: None,
            input: InputState::default(),
            timing: FrameTiming::new(Instant::now()),
            failure: None,
        }
    }

    fn create_presentation(&mut self, event_loop: &ActiveEventLoop) -> Result<Presentation, AppError> {
        let viewer = self.interactor.window();
        let [width, height] = viewer.size();
        let mut attributes = WindowAttributes::default()
            .with_title(viewer.window_name())
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);
        if let Some(icon) = viewer.icon() {
            match Icon::from_rgba(icon.as_raw().clone(), icon.width(), icon.height()) {
                Ok(icon) => attributes = attributes.with_window_icon(Some(icon)),
                Err(err) => log::warn!("Ignoring window icon: {err}"),
            }
        }

        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));
        let surface = SurfaceTexture::new(width, height, window.clone());
        let pixels = Pixels::new(width, height, surface)?;
        let egui = EguiHost::new(self.interactor.window().ui_context(), &window);
        self.interactor.window_mut().set_size(width, height);
        Ok(Presentation {
            window,
            pixels,
            egui,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let Some(presentation) = self.presentation.as_mut() else {
            return;
        };
        let (width, height) = (size.width.max(1), size.height.max(1));
        if let Err(err) = presentation.pixels.resize_surface(width, height) {
            log::error!("Cannot resize the surface: {err}");
            return;
        }
        if let Err(err) = presentation.pixels.resize_buffer(width, height) {
            log::error!("Cannot resize the frame buffer: {err}");
            return;
        }
        self.interactor.window_mut().set_size(width, height);
        presentation.window.request_redraw();
    }

    fn drag(&mut self, drag: Drag) {
        match drag {
            Drag::None => {}
            Drag::Rotate(dx, dy) => self.interactor.rotate_camera(dx, dy),
            Drag::Pan(dx, dy) => self.interactor.pan_camera(dx, dy),
            Drag::Zoom(dy) => self.interactor.zoom_camera(dy / PIXELS_PER_DRAG_STEP),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(presentation) = self.presentation.as_mut() else {
            return;
        };
        let input = presentation.egui.take_input(&presentation.window);
        self.interactor.render_with_input(input);

        let frame = self.interactor.window().frame();
        let target = presentation.pixels.frame_mut();
        if target.len() == frame.as_raw().len() {
            target.copy_from_slice(frame.as_raw());
        } else {
            log::debug!("Frame size does not match the surface yet, skipping copy");
        }
        if let Err(err) = presentation.pixels.render() {
            log::error!("Presentation failed: {err}");
            self.failure = Some(AppError::Surface(err));
            event_loop.exit();
            return;
        }

        if self.timing.update(Instant::now()) {
            let fps = self.timing.fps();
            self.interactor.window_mut().set_fps(fps);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.presentation.is_some() {
            return;
        }
        match self.create_presentation(event_loop) {
            Ok(presentation) => {
                presentation.window.request_redraw();
                self.presentation = Some(presentation);
            }
            Err(err) => {
                log::error!("{err}");
                self.failure = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let Some(presentation) = self.presentation.as_mut() {
            presentation.egui.on_window_event(&presentation.window, &event);
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => self.resize(size),
            WindowEvent::Focused(false) => self.input.release_all(),
            WindowEvent::ModifiersChanged(modifiers) => self.input.set_modifiers(modifiers.state()),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                if let Some(name) = key_name(event.physical_key) {
                    self.interactor.trigger_key(self.input.modifier_keys(), name);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.input.handle_button(button, state == ElementState::Pressed);
            }
            WindowEvent::CursorMoved { position, .. } => {
                let drag = self.input.handle_cursor(position.x as f32, position.y as f32);
                self.drag(drag);
            }
            WindowEvent::CursorLeft { .. } => self.input.cursor_left(),
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_WHEEL_STEP,
                };
                self.interactor.zoom_camera(steps);
            }
            WindowEvent::DroppedFile(path) => self.interactor.drop_files(&[path]),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        self.interactor.tick(now);
        if self.interactor.is_stopped() {
            event_loop.exit();
            return;
        }
        if self.interactor.window_mut().take_render_request() {
            if let Some(presentation) = &self.presentation {
                presentation.window.request_redraw();
            }
        }
        match self.interactor.window().next_animation_deadline(now) {
            Some(deadline) => event_loop.set_control_flow(ControlFlow::WaitUntil(deadline)),
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }
}

/// Opens the desktop window and runs until the interactor stops or the window closes.
pub fn run(interactor: Interactor) -> Result<(), AppError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(interactor);
    event_loop.run_app(&mut app)?;
    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
