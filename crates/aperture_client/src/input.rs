use std::collections::HashSet;

use glam::Vec2;
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

/// Portal a mouse click asks to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementRequest {
    Blue,
    Orange,
}

impl PlacementRequest {
    pub fn for_button(button: MouseButton) -> Option<Self> {
        match button {
            MouseButton::Left => Some(Self::Blue),
            MouseButton::Right => Some(Self::Orange),
            _ => None,
        }
    }
}

/// Keyboard and mouse state gathered between two frames.
#[derive(Debug, Default)]
pub struct InputState {
    pub(crate) held_keys: HashSet<KeyCode>,
    /// Raw mouse motion since the last frame, in device units.
    pub look_delta: Vec2,
    pub(crate) place_blue: bool,
    pub(crate) place_orange: bool,
}

impl InputState {
    pub fn press_key(&mut self, key: KeyCode) {
        self.held_keys.insert(key);
    }

    pub fn release_key(&mut self, key: KeyCode) {
        self.held_keys.remove(&key);
    }

    pub fn is_held(&self, key: KeyCode) -> bool {
        self.held_keys.contains(&key)
    }

    pub fn add_look_delta(&mut self, delta: Vec2) {
        self.look_delta += delta;
    }

    pub fn click(&mut self, button: MouseButton) {
        match PlacementRequest::for_button(button) {
            Some(PlacementRequest::Blue) => self.place_blue = true,
            Some(PlacementRequest::Orange) => self.place_orange = true,
            None => {}
        }
    }

    /// Pending placements, blue first. Each click is reported once.
    pub fn take_placements(&mut self) -> [Option<PlacementRequest>; 2] {
        let blue = std::mem::take(&mut self.place_blue).then_some(PlacementRequest::Blue);
        let orange = std::mem::take(&mut self.place_orange).then_some(PlacementRequest::Orange);
        [blue, orange]
    }

    pub fn end_frame(&mut self) {
        self.look_delta = Vec2::ZERO;
    }

    /// Forgets everything held or pending, for when the cursor is released.
    pub fn release_all(&mut self) {
        self.held_keys.clear();
        self.look_delta = Vec2::ZERO;
        self.place_blue = false;
        self.place_orange = false;
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;
    use winit::event::MouseButton;
    use winit::keyboard::KeyCode;

    use super::{InputState, PlacementRequest};

    #[test]
    fn buttons_map_to_portals() {
        assert_eq!(
            PlacementRequest::for_button(MouseButton::Left),
            Some(PlacementRequest::Blue)
        );
        assert_eq!(
            PlacementRequest::for_button(MouseButton::Right),
            Some(PlacementRequest::Orange)
        );
        assert_eq!(PlacementRequest::for_button(MouseButton::Middle), None);
    }

    #[test]
    fn placements_are_taken_once() {
        let mut input = InputState::default();
        input.click(MouseButton::Right);
        input.click(MouseButton::Left);
        input.click(MouseButton::Middle);

        assert_eq!(
            input.take_placements(),
            [Some(PlacementRequest::Blue), Some(PlacementRequest::Orange)]
        );
        assert_eq!(input.take_placements(), [None, None]);
    }

    #[test]
    fn look_delta_accumulates_until_frame_end() {
        let mut input = InputState::default();
        input.add_look_delta(Vec2::new(1.0, 2.0));
        input.add_look_delta(Vec2::new(3.0, -1.0));
        assert_eq!(input.look_delta, Vec2::new(4.0, 1.0));
        input.end_frame();
        assert_eq!(input.look_delta, Vec2::ZERO);
    }

    #[test]
    fn release_all_drops_keys_and_pending_clicks() {
        let mut input = InputState::default();
        input.press_key(KeyCode::KeyW);
        input.click(MouseButton::Left);
        input.release_all();
        assert!(!input.is_held(KeyCode::KeyW));
        assert_eq!(input.take_placements(), [None, None]);
    }
}
