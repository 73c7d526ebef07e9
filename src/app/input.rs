use crate::interactor::ModifierKeys;
use winit::event::MouseButton;
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};

/// Camera gesture produced by a cursor move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Drag {
    None,
    Rotate(f32, f32),
    Pan(f32, f32),
    /// Vertical motion in pixels, upward zooms in.
    Zoom(f32),
}

#[derive(Default, Debug, Clone, Copy)]
pub struct InputState {
    ctrl: bool,
    shift: bool,
    left: bool,
    middle: bool,
    right: bool,
    cursor: Option<(f32, f32)>,
}

impl InputState {
    pub fn set_modifiers(&mut self, state: ModifiersState) {
        self.ctrl = state.control_key();
        self.shift = state.shift_key();
    }

    pub fn modifier_keys(&self) -> ModifierKeys {
        ModifierKeys::from_state(self.ctrl, self.shift)
    }

    pub fn handle_button(&mut self, button: MouseButton, pressed: bool) {
        match button {
            MouseButton::Left => self.left = pressed,
            MouseButton::Middle => self.middle = pressed,
            MouseButton::Right => self.right = pressed,
            _ => {}
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = None;
    }

    pub fn release_all(&mut self) {
        self.left = false;
        self.middle = false;
        self.right = false;
        self.cursor = None;
    }

    /// Records the cursor position and returns the gesture of the held buttons.
    pub fn handle_cursor(&mut self, x: f32, y: f32) -> Drag {
        let previous = self.cursor.replace((x, y));
        let Some((px, py)) = previous else {
            return Drag::None;
        };
        let (dx, dy) = (x - px, y - py);
        if self.middle || (self.left && self.shift) {
            Drag::Pan(dx, dy)
        } else if self.right || (self.left && self.ctrl) {
            Drag::Zoom(-dy)
        } else if self.left {
            Drag::Rotate(dx, dy)
        } else {
            Drag::None
        }
    }
}

/// Binding name of a physical key: `A`..`Z`, `0`..`9`, `Return`, `Space`, `Escape`.
pub fn key_name(key: PhysicalKey) -> Option<&'static str> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    let name = match code {
        KeyCode::KeyA => "A",
        KeyCode::KeyB => "B",
        KeyCode::KeyC => "C",
        KeyCode::KeyD => "D",
        KeyCode::KeyE => "E",
        KeyCode::KeyF => "F",
        KeyCode::KeyG => "G",
        KeyCode::KeyH => "H",
        KeyCode::KeyI => "I",
        KeyCode::KeyJ => "J",
        KeyCode::KeyK => "K",
        KeyCode::KeyL => "L",
        KeyCode::KeyM => "M",
        KeyCode::KeyN => "N",
        KeyCode::KeyO => "O",
        KeyCode::KeyP => "P",
        KeyCode::KeyQ => "Q",
        KeyCode::KeyR => "R",
        KeyCode::KeyS => "S",
        KeyCode::KeyT => "T",
        KeyCode::KeyU => "U",
        KeyCode::KeyV => "V",
        KeyCode::KeyW => "W",
        KeyCode::KeyX => "X",
        KeyCode::KeyY => "Y",
        KeyCode::KeyZ => "Z",
        KeyCode::Digit0 | KeyCode::Numpad0 => "0",
        KeyCode::Digit1 | KeyCode::Numpad1 => "1",
        KeyCode::Digit2 | KeyCode::Numpad2 => "2",
        KeyCode::Digit3 | KeyCode::Numpad3 => "3",
        KeyCode::Digit4 | KeyCode::Numpad4 => "4",
        KeyCode::Digit5 | KeyCode::Numpad5 => "5",
        KeyCode::Digit6 | KeyCode::Numpad6 => "6",
        KeyCode::Digit7 | KeyCode::Numpad7 => "7",
        KeyCode::Digit8 | KeyCode::Numpad8 => "8",
        KeyCode::Digit9 | KeyCode::Numpad9 => "9",
        KeyCode::Enter | KeyCode::NumpadEnter => "Return",
        KeyCode::Space => "Space",
        KeyCode::Escape => "Escape",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::{key_name, Drag, InputState};
    use crate::interactor::ModifierKeys;
    use winit::event::MouseButton;
    use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};

    #[test]
    fn physical_keys_map_to_binding_names() {
        assert_eq!(key_name(PhysicalKey::Code(KeyCode::KeyP)), Some("P"));
        assert_eq!(key_name(PhysicalKey::Code(KeyCode::Numpad5)), Some("5"));
        assert_eq!(key_name(PhysicalKey::Code(KeyCode::NumpadEnter)), Some("Return"));
        assert_eq!(key_name(PhysicalKey::Code(KeyCode::F5)), None);
    }

    #[test]
    fn held_buttons_select_the_gesture() {
        let mut input = InputState::default();
        assert_eq!(input.handle_cursor(10.0, 10.0), Drag::None);
        input.handle_button(MouseButton::Left, true);
        assert_eq!(input.handle_cursor(14.0, 8.0), Drag::Rotate(4.0, -2.0));
        input.set_modifiers(ModifiersState::SHIFT);
        assert_eq!(input.modifier_keys(), ModifierKeys::Shift);
        assert_eq!(input.handle_cursor(15.0, 8.0), Drag::Pan(1.0, 0.0));
        input.release_all();
        input.handle_button(MouseButton::Right, true);
        assert_eq!(input.handle_cursor(0.0, 0.0), Drag::None);
        assert_eq!(input.handle_cursor(0.0, -3.0), Drag::Zoom(3.0));
    }
}
