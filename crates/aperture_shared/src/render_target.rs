use std::ops::{Deref, DerefMut};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::portal::PortalId;
use crate::projection::ViewProjection;
use crate::visibility::VisibilityFlags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RenderFlags: u8 {
        const XR_ENABLED         = 0b0000_0001;
        const SHADOW_AUTO_UPDATE = 0b0000_0010;
        const DEPTH_WRITE        = 0b0000_0100;
        const AUTO_CLEAR         = 0b0000_1000;
    }
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self::SHADOW_AUTO_UPDATE | Self::DEPTH_WRITE | Self::AUTO_CLEAR
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderTarget {
    #[default]
    Screen,
    Portal(PortalId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Renderer-wide state a portal pass has to borrow and give back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderState {
    pub target: RenderTarget,
    pub flags: RenderFlags,
    pub viewport: Option<Viewport>,
}

pub trait RenderBackend {
    fn render_state(&self) -> RenderState;

    fn set_render_state(&mut self, state: RenderState);

    /// Clears color and depth of the current target.
    fn clear(&mut self);

    /// Draws the whole scene into the current target.
    fn render_scene(&mut self, camera: &ViewProjection, visibility: &VisibilityFlags);

    fn set_portal_noise_rotation(&mut self, portal: PortalId, radians: f32);
}

/// Binds an offscreen target for as long as it lives; the previous state comes
/// back on drop, whichever way the scope is left.
pub struct RenderTargetScope<'a, B: RenderBackend + ?Sized> {
    backend: &'a mut B,
    saved: RenderState,
}

impl<'a, B: RenderBackend + ?Sized> RenderTargetScope<'a, B> {
    pub fn bind(backend: &'a mut B, target: RenderTarget) -> Self {
        let saved = backend.render_state();
        let mut flags = saved.flags;
        flags.remove(RenderFlags::XR_ENABLED | RenderFlags::SHADOW_AUTO_UPDATE);
        flags.insert(RenderFlags::DEPTH_WRITE);
        backend.set_render_state(RenderState {
            target,
            flags,
            viewport: None,
        });
        Self { backend, saved }
    }

    pub fn saved_state(&self) -> RenderState {
        self.saved
    }
}

impl<B: RenderBackend + ?Sized> Deref for RenderTargetScope<'_, B> {
    type Target = B;

    fn deref(&self) -> &Self::Target {
        self.backend
    }
}

impl<B: RenderBackend + ?Sized> DerefMut for RenderTargetScope<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.backend
    }
}

impl<B: RenderBackend + ?Sized> Drop for RenderTargetScope<'_, B> {
    fn drop(&mut self) {
        self.backend.set_render_state(self.saved);
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::{RenderBackend, RenderState};
    use crate::portal::PortalId;
    use crate::projection::ViewProjection;
    use crate::visibility::VisibilityFlags;

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedDraw {
        pub state: RenderState,
        pub camera: ViewProjection,
        pub visibility: VisibilityFlags,
    }

    /// Backend that keeps a log instead of touching a GPU.
    #[derive(Debug, Default)]
    pub struct RecordingBackend {
        pub state: RenderState,
        pub draws: Vec<RecordedDraw>,
        pub clears: Vec<RenderState>,
        pub noise_rotations: Vec<(PortalId, f32)>,
        pub state_changes: usize,
    }

    impl RenderBackend for RecordingBackend {
        fn render_state(&self) -> RenderState {
            self.state
        }

        fn set_render_state(&mut self, state: RenderState) {
            self.state = state;
            self.state_changes += 1;
        }

        fn clear(&mut self) {
            self.clears.push(self.state);
        }

        fn render_scene(&mut self, camera: &ViewProjection, visibility: &VisibilityFlags) {
            self.draws.push(RecordedDraw {
                state: self.state,
                camera: *camera,
                visibility: visibility.clone(),
            });
        }

        fn set_portal_noise_rotation(&mut self, portal: PortalId, radians: f32) {
            self.noise_rotations.push((portal, radians));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recording::RecordingBackend;
    use super::{RenderBackend, RenderFlags, RenderState, RenderTarget, RenderTargetScope, Viewport};
    use crate::portal::PortalId;

    fn screen_state() -> RenderState {
        RenderState {
            target: RenderTarget::Screen,
            flags: RenderFlags::XR_ENABLED | RenderFlags::SHADOW_AUTO_UPDATE | RenderFlags::AUTO_CLEAR,
            viewport: Some(Viewport {
                x: 0,
                y: 0,
                width: 1280,
                height: 720,
            }),
        }
    }

    #[test]
    fn scope_binds_target_and_suspends_xr_and_shadows() {
        let mut backend = RecordingBackend {
            state: screen_state(),
            ..Default::default()
        };

        {
            let scope = RenderTargetScope::bind(&mut backend, RenderTarget::Portal(PortalId(1)));
            let state = scope.render_state();
            assert_eq!(state.target, RenderTarget::Portal(PortalId(1)));
            assert!(!state.flags.contains(RenderFlags::XR_ENABLED));
            assert!(!state.flags.contains(RenderFlags::SHADOW_AUTO_UPDATE));
            assert!(state.flags.contains(RenderFlags::DEPTH_WRITE));
            assert!(state.flags.contains(RenderFlags::AUTO_CLEAR));
            assert_eq!(state.viewport, None);
            assert_eq!(scope.saved_state(), screen_state());
        }

        assert_eq!(backend.state, screen_state());
    }

    #[test]
    fn scope_restores_state_on_early_return() {
        fn pass_that_bails(backend: &mut RecordingBackend) -> Option<()> {
            let mut scope = RenderTargetScope::bind(backend, RenderTarget::Portal(PortalId(0)));
            scope.clear();
            let missing: Option<()> = None;
            missing?;
            scope.clear();
            Some(())
        }

        let mut backend = RecordingBackend {
            state: screen_state(),
            ..Default::default()
        };
        assert_eq!(pass_that_bails(&mut backend), None);
        assert_eq!(backend.state, screen_state());
        assert_eq!(backend.clears.len(), 1);
        assert_eq!(backend.clears[0].target, RenderTarget::Portal(PortalId(0)));
    }

    #[test]
    fn nested_scopes_unwind_in_order() {
        let mut backend = RecordingBackend::default();
        {
            let mut outer = RenderTargetScope::bind(&mut backend, RenderTarget::Portal(PortalId(0)));
            {
                let inner = RenderTargetScope::bind(&mut *outer, RenderTarget::Portal(PortalId(1)));
                assert_eq!(inner.render_state().target, RenderTarget::Portal(PortalId(1)));
            }
            assert_eq!(outer.render_state().target, RenderTarget::Portal(PortalId(0)));
        }
        assert_eq!(backend.state, RenderState::default());
        assert_eq!(backend.state_changes, 4);
    }
}
