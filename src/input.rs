use std::{collections::HashSet, hash::Hash};

use deref_derive::{Deref, DerefMut};
use glam::Vec2;
use winit::{
    event::{DeviceEvent, ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    keyboard::PhysicalKey,
};

/// `pressed` and `released` only hold the transitions since the last update.
#[derive(Clone, Debug)]
pub struct ButtonState<T> {
    held: HashSet<T>,
    pressed: HashSet<T>,
    released: HashSet<T>,
}

impl<T> Default for ButtonState<T> {
    fn default() -> Self {
        Self {
            held: HashSet::new(),
            pressed: HashSet::new(),
            released: HashSet::new(),
        }
    }
}

impl<T: Copy + Eq + Hash> ButtonState<T> {
    pub fn update(&mut self) {
        self.pressed.clear();
        self.released.clear();
    }

    pub fn set(&mut self, button: T, state: ElementState) {
        match state {
            ElementState::Pressed => self.press(button),
            ElementState::Released => self.release(button),
        }
    }

    /// Key repeat does not count as a new press.
    pub fn press(&mut self, button: T) {
        if self.held.insert(button) {
            self.pressed.insert(button);
        }
    }

    pub fn release(&mut self, button: T) {
        if self.held.remove(&button) {
            self.released.insert(button);
        }
    }

    pub fn is_held(&self, button: T) -> bool {
        self.held.contains(&button)
    }

    pub fn is_pressed(&self, button: T) -> bool {
        self.pressed.contains(&button)
    }

    pub fn is_released(&self, button: T) -> bool {
        self.released.contains(&button)
    }

    pub fn release_all(&mut self) {
        self.released.extend(self.held.drain());
    }
}

#[derive(Clone, Debug, Default, Deref, DerefMut)]
pub struct Mouse {
    pub position: Vec2,
    pub delta: Vec2,
    pub scroll: Vec2,

    #[deref]
    pub buttons: ButtonState<MouseButton>,
}

impl Mouse {
    pub fn update(&mut self) {
        self.delta = Vec2::ZERO;
        self.scroll = Vec2::ZERO;
        self.buttons.update();
    }

    pub fn device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.delta += Vec2::new(delta.0 as f32, delta.1 as f32);
        }
    }

    pub fn window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::MouseInput { state, button, .. } => self.buttons.set(*button, *state),
            WindowEvent::CursorMoved { position, .. } => {
                self.position = Vec2::new(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll += match delta {
                    MouseScrollDelta::LineDelta(x, y) => Vec2::new(*x, *y),
                    MouseScrollDelta::PixelDelta(pos) => {
                        Vec2::new(pos.x as f32, pos.y as f32) / 20.0
                    }
                };
            }
            WindowEvent::Focused(false) => self.buttons.release_all(),
            _ => {}
        }
    }
}

pub type Key = winit::keyboard::KeyCode;

#[derive(Clone, Debug, Default, Deref, DerefMut)]
pub struct Keyboard {
    #[deref]
    pub keys: ButtonState<Key>,
}

impl Keyboard {
    pub fn update(&mut self) {
        self.keys.update();
    }

    pub fn window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => self.keys.set(*key, *state),
            WindowEvent::Focused(false) => self.keys.release_all(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_and_release() {
        let mut keys = ButtonState::default();

        keys.press(Key::KeyW);
        assert!(keys.is_pressed(Key::KeyW));
        assert!(keys.is_held(Key::KeyW));

        keys.update();
        assert!(!keys.is_pressed(Key::KeyW));
        assert!(keys.is_held(Key::KeyW));

        keys.release(Key::KeyW);
        assert!(keys.is_released(Key::KeyW));
        assert!(!keys.is_held(Key::KeyW));
    }

    #[test]
    fn repeat_is_not_a_press() {
        let mut keys = ButtonState::default();

        keys.press(Key::F1);
        keys.update();
        keys.press(Key::F1);

        assert!(!keys.is_pressed(Key::F1));
        assert!(keys.is_held(Key::F1));
    }

    #[test]
    fn release_all_on_focus_loss() {
        let mut mouse = Mouse::default();
        mouse.press(MouseButton::Right);
        mouse.press(MouseButton::Left);

        mouse.window_event(&WindowEvent::Focused(false));

        assert!(!mouse.is_held(MouseButton::Right));
        assert!(mouse.is_released(MouseButton::Left));
    }

    #[test]
    fn mouse_update_clears_motion() {
        let mut mouse = Mouse::default();
        mouse.device_event(&DeviceEvent::MouseMotion { delta: (3.0, -2.0) });
        mouse.device_event(&DeviceEvent::MouseMotion { delta: (1.0, 0.0) });
        assert_eq!(mouse.delta, Vec2::new(4.0, -2.0));

        mouse.update();
        assert_eq!(mouse.delta, Vec2::ZERO);
    }
}
