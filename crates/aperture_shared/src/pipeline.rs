use tracing::debug;

use crate::frame::FrameTick;
use crate::portal::{PortalId, PortalRegistry};
use crate::projection::{ProjectionSolver, VirtualCamera};
use crate::render_target::{RenderBackend, RenderFlags, RenderTarget, RenderTargetScope};
use crate::viewer::Viewer;
use crate::visibility::{VisibilityFlags, VisibilityScope};

/// Noise rotation speed of portal surfaces, radians per second.
pub const PORTAL_NOISE_SPEED: f32 = 0.5;

/// Renders the view through `source` into its offscreen target.
///
/// Returns the camera used, or `None` when the portal has no destination.
pub fn render_portal<B: RenderBackend + ?Sized>(
    backend: &mut B,
    solver: &ProjectionSolver,
    registry: &mut PortalRegistry,
    source: PortalId,
    visibility: &mut VisibilityFlags,
    viewer: &Viewer,
    frame: FrameTick,
) -> Option<VirtualCamera> {
    let Some((portal, destination)) = registry.linked_pair(source) else {
        debug!("skipping pass for {source}: no destination");
        return None;
    };
    let destination_id = portal.linked_to?;
    let camera = solver.solve(portal, destination, viewer.position);

    if let Some(portal) = registry.get_mut(source) {
        portal.camera = Some(camera);
    }

    {
        let visibility = VisibilityScope::enter(visibility, source, destination_id);
        let mut target = RenderTargetScope::bind(backend, RenderTarget::Portal(source));
        if !target.render_state().flags.contains(RenderFlags::AUTO_CLEAR) {
            target.clear();
        }
        target.render_scene(&camera.view_projection(), &visibility);
    }

    backend.set_portal_noise_rotation(source, frame.elapsed * PORTAL_NOISE_SPEED);
    Some(camera)
}

/// One pass per portal, in id order. Returns how many passes ran.
pub fn render_portals<B: RenderBackend + ?Sized>(
    backend: &mut B,
    solver: &ProjectionSolver,
    registry: &mut PortalRegistry,
    visibility: &mut VisibilityFlags,
    viewer: &Viewer,
    frame: FrameTick,
) -> u32 {
    let mut passes = 0;
    for index in 0..registry.len() {
        let id = PortalId(index);
        if render_portal(backend, solver, registry, id, visibility, viewer, frame).is_some() {
            passes += 1;
        }
    }
    passes
}

#[cfg(test)]
mod tests {
    use std::alloc::{GlobalAlloc, Layout, System};
    use std::cell::Cell;
    use std::f32::consts::PI;

    use glam::Vec3;

    use super::{render_portal, render_portals};
    use crate::frame::FrameTick;
    use crate::portal::{Portal, PortalId, PortalRegistry, PORTAL_BLUE, PORTAL_ORANGE};
    use crate::projection::{ProjectionSolver, ViewProjection};
    use crate::render_target::recording::RecordingBackend;
    use crate::render_target::{RenderBackend, RenderFlags, RenderState, RenderTarget};
    use crate::scene::Scene;
    use crate::transform::Pose;
    use crate::viewer::Viewer;
    use crate::visibility::VisibilityFlags;

    thread_local! {
        static COUNTING: Cell<bool> = const { Cell::new(false) };
        static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
    }

    /// System allocator that counts allocations made on a thread while enabled.
    struct CountingAllocator;

    fn note_allocation() {
        let _ = COUNTING.try_with(|counting| {
            if counting.get() {
                let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
            }
        });
    }

    unsafe impl GlobalAlloc for CountingAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            note_allocation();
            unsafe { System.alloc(layout) }
        }

        unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
            note_allocation();
            unsafe { System.alloc_zeroed(layout) }
        }

        unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
            note_allocation();
            unsafe { System.realloc(ptr, layout, new_size) }
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            unsafe { System.dealloc(ptr, layout) }
        }
    }

    #[global_allocator]
    static ALLOCATOR: CountingAllocator = CountingAllocator;

    fn count_allocations(run: impl FnOnce()) -> usize {
        ALLOCATIONS.with(|count| count.set(0));
        COUNTING.with(|counting| counting.set(true));
        run();
        COUNTING.with(|counting| counting.set(false));
        ALLOCATIONS.with(Cell::get)
    }

    /// Backend that only counts, so any allocation comes from the pipeline.
    #[derive(Default)]
    struct TallyBackend {
        state: RenderState,
        draws: usize,
        rotations: usize,
    }

    impl RenderBackend for TallyBackend {
        fn render_state(&self) -> RenderState {
            self.state
        }

        fn set_render_state(&mut self, state: RenderState) {
            self.state = state;
        }

        fn clear(&mut self) {}

        fn render_scene(&mut self, _camera: &ViewProjection, _visibility: &VisibilityFlags) {
            self.draws += 1;
        }

        fn set_portal_noise_rotation(&mut self, _portal: PortalId, _radians: f32) {
            self.rotations += 1;
        }
    }

    fn linked_pair() -> (PortalRegistry, PortalId, PortalId) {
        let mut registry = PortalRegistry::default();
        let blue = registry.insert(Portal::new(
            Pose::from_yaw(Vec3::new(0.0, 2.0, -15.99), 0.0),
            PORTAL_BLUE,
        ));
        let orange = registry.insert(Portal::new(
            Pose::from_yaw(Vec3::new(0.0, 2.0, 17.99), PI),
            PORTAL_ORANGE,
        ));
        registry.link(blue, orange);
        (registry, blue, orange)
    }

    fn frame(elapsed: f32) -> FrameTick {
        FrameTick {
            delta: 1.0 / 60.0,
            elapsed,
        }
    }

    #[test]
    fn pass_hides_both_ends_and_shows_avatar() {
        let (mut registry, blue, orange) = linked_pair();
        let mut visibility = VisibilityFlags::new(registry.len());
        let mut backend = RecordingBackend::default();
        let viewer = Viewer::new(Vec3::new(0.0, 1.6, 10.0));

        render_portal(
            &mut backend,
            &ProjectionSolver::default(),
            &mut registry,
            blue,
            &mut visibility,
            &viewer,
            frame(1.0),
        )
        .expect("linked portal renders");

        assert_eq!(backend.draws.len(), 1);
        let draw = &backend.draws[0];
        assert_eq!(draw.state.target, RenderTarget::Portal(blue));
        assert!(draw.visibility.avatar);
        assert!(!draw.visibility.is_portal_visible(blue));
        assert!(!draw.visibility.is_portal_visible(orange));
        assert!(!draw.state.flags.contains(RenderFlags::SHADOW_AUTO_UPDATE));
    }

    #[test]
    fn pass_restores_state_and_visibility() {
        let (mut registry, blue, _) = linked_pair();
        let mut visibility = VisibilityFlags::new(registry.len());
        let before = visibility.clone();
        let screen = RenderState {
            flags: RenderFlags::XR_ENABLED | RenderFlags::SHADOW_AUTO_UPDATE,
            ..RenderState::default()
        };
        let mut backend = RecordingBackend {
            state: screen,
            ..Default::default()
        };

        render_portal(
            &mut backend,
            &ProjectionSolver::default(),
            &mut registry,
            blue,
            &mut visibility,
            &Viewer::new(Vec3::new(1.0, 1.6, 4.0)),
            frame(0.0),
        );

        assert_eq!(backend.state, screen);
        assert_eq!(visibility, before);
        // Auto-clear was off, so the pass cleared its target itself.
        assert_eq!(backend.clears.len(), 1);
        assert_eq!(backend.clears[0].target, RenderTarget::Portal(blue));
    }

    #[test]
    fn pass_stores_camera_and_rotates_noise() {
        let (mut registry, blue, _) = linked_pair();
        let mut visibility = VisibilityFlags::new(registry.len());
        let mut backend = RecordingBackend::default();

        let camera = render_portal(
            &mut backend,
            &ProjectionSolver::default(),
            &mut registry,
            blue,
            &mut visibility,
            &Viewer::new(Vec3::new(0.0, 1.6, 10.0)),
            frame(3.0),
        )
        .unwrap();

        assert_eq!(registry.get(blue).unwrap().camera, Some(camera));
        assert_eq!(backend.draws[0].camera, camera.view_projection());
        assert_eq!(backend.noise_rotations, vec![(blue, 1.5)]);
        assert!(backend.clears.is_empty());
    }

    #[test]
    fn unlinked_portal_is_skipped() {
        let mut registry = PortalRegistry::default();
        let lonely = registry.insert(Portal::new(Pose::IDENTITY, PORTAL_BLUE));
        let mut visibility = VisibilityFlags::new(1);
        let mut backend = RecordingBackend::default();

        let camera = render_portal(
            &mut backend,
            &ProjectionSolver::default(),
            &mut registry,
            lonely,
            &mut visibility,
            &Viewer::default(),
            frame(1.0),
        );

        assert!(camera.is_none());
        assert!(backend.draws.is_empty());
        assert!(backend.noise_rotations.is_empty());
        assert_eq!(backend.state_changes, 0);
    }

    #[test]
    fn every_portal_gets_one_pass_without_seeing_itself() {
        let (mut registry, blue, orange) = linked_pair();
        let mut visibility = VisibilityFlags::new(registry.len());
        let mut backend = RecordingBackend::default();

        let passes = render_portals(
            &mut backend,
            &ProjectionSolver::default(),
            &mut registry,
            &mut visibility,
            &Viewer::new(Vec3::new(0.0, 1.6, 10.0)),
            frame(2.0),
        );

        assert_eq!(passes, 2);
        let targets: Vec<_> = backend.draws.iter().map(|draw| draw.state.target).collect();
        assert_eq!(
            targets,
            vec![RenderTarget::Portal(blue), RenderTarget::Portal(orange)]
        );
        for draw in &backend.draws {
            assert_eq!(draw.visibility.visible_portals().count(), 0);
        }
        assert!(visibility.is_portal_visible(blue) && visibility.is_portal_visible(orange));
        assert!(!visibility.avatar);
    }

    #[test]
    fn portal_passes_do_not_allocate() {
        let mut scene = Scene::showcase().unwrap();
        let mut backend = TallyBackend::default();
        scene.render_portals(&mut backend, frame(0.0));

        let allocations = count_allocations(|| {
            for step in 1..=100 {
                scene.render_portals(&mut backend, frame(step as f32 / 60.0));
            }
        });

        assert_eq!(allocations, 0);
        assert_eq!(backend.draws, 202);
        assert_eq!(backend.rotations, 202);
    }
}
