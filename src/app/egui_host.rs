use winit::event::WindowEvent;
use winit::window::Window;

/// Translates winit events into egui input for the HUD overlay.
pub struct EguiHost {
    winit_state: egui_winit::State,
}

impl EguiHost {
    pub fn new(context: &egui::Context, window: &Window) -> Self {
        let winit_state = egui_winit::State::new(
            context.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        Self { winit_state }
    }

    /// Whether egui wants the event for itself.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.winit_state.on_window_event(window, event).consumed
    }

    pub fn take_input(&mut self, window: &Window) -> egui::RawInput {
        self.winit_state.take_egui_input(window)
    }
}
