use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use aperture_shared::frame::FrameClock;
use aperture_shared::scene::Scene;
use aperture_shared::surface::Ray;
use glam::Vec2;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

use crate::camera::{movement_direction, update_look, Lens};
use crate::input::{InputState, PlacementRequest};
use crate::renderer::Renderer;
use crate::settings::{load_or_create_settings, ClientSettings, SETTINGS_PATH};

const WINDOW_TITLE: &str = "Aperture";
const FPS_SAMPLE_SECONDS: f32 = 1.0;

/// Frames per second, averaged over roughly one-second windows.
#[derive(Debug, Default)]
struct FpsCounter {
    sample_start: Option<Instant>,
    frame_count: u32,
    fps: f32,
}

impl FpsCounter {
    /// Counts a frame. Returns the new average when a sample window closes.
    fn record(&mut self, now: Instant) -> Option<f32> {
        let Some(sample_start) = self.sample_start else {
            self.sample_start = Some(now);
            self.frame_count = 0;
            return None;
        };

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(sample_start).as_secs_f32();
        if elapsed < FPS_SAMPLE_SECONDS {
            return None;
        }

        self.fps = self.frame_count as f32 / elapsed;
        self.frame_count = 0;
        self.sample_start = Some(now);
        Some(self.fps)
    }
}

fn window_title(fps: Option<f32>) -> String {
    match fps {
        Some(fps) => format!("{WINDOW_TITLE} - {fps:.0} fps"),
        None => WINDOW_TITLE.to_string(),
    }
}

struct PortalApp {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    scene: Option<Scene>,
    input: InputState,
    lens: Lens,
    clock: FrameClock,
    fps: FpsCounter,
    settings: ClientSettings,
    cursor_grabbed: bool,
}

impl PortalApp {
    fn new(settings: ClientSettings) -> Self {
        Self {
            window: None,
            renderer: None,
            scene: None,
            input: InputState::default(),
            lens: Lens::with_fov_degrees(settings.fov),
            clock: FrameClock::new(),
            fps: FpsCounter::default(),
            settings,
            cursor_grabbed: false,
        }
    }

    fn set_cursor_grab(&mut self, enabled: bool) {
        let Some(window) = self.window.as_ref() else {
            self.cursor_grabbed = false;
            return;
        };

        let grabbed = if enabled {
            window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
                .is_ok()
        } else {
            let _ = window.set_cursor_grab(CursorGrabMode::None);
            false
        };

        if !enabled {
            self.input.release_all();
        }

        window.set_cursor_visible(!grabbed);
        self.cursor_grabbed = grabbed;
    }

    /// Primary click places blue, secondary places orange, both along the gaze.
    fn place_portals(&mut self) {
        let Some(scene) = self.scene.as_mut() else {
            return;
        };
        let ray = Ray::new(scene.viewer.position, scene.viewer.forward());

        for request in self.input.take_placements().into_iter().flatten() {
            let id = match request {
                PlacementRequest::Blue => scene.blue,
                PlacementRequest::Orange => scene.orange,
            };
            match scene.place_portal(id, &ray) {
                Some(hit) => info!(
                    "placed {id} at ({:.2}, {:.2}, {:.2})",
                    hit.point.x, hit.point.y, hit.point.z
                ),
                None => debug!("nothing to place {id} on"),
            }
        }
    }

    fn update_and_render(&mut self, event_loop: &ActiveEventLoop) {
        let frame = self.clock.tick();

        if let Some(scene) = self.scene.as_mut() {
            if self.cursor_grabbed {
                update_look(&mut scene.viewer, &self.input, self.settings.mouse_sensitivity);
            }
            let velocity = movement_direction(&scene.viewer, &self.input) * self.settings.move_speed;
            scene.tick(frame, velocity);
        }
        self.place_portals();
        self.input.end_frame();

        let (Some(window), Some(renderer), Some(scene)) = (
            self.window.as_ref(),
            self.renderer.as_mut(),
            self.scene.as_mut(),
        ) else {
            return;
        };

        let screen_camera = self.lens.view_projection(&scene.viewer);
        let size = window.inner_size();
        match renderer.render_frame(scene, &screen_camera, frame) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                renderer.resize(size.width, size.height);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("Out of GPU memory; shutting down");
                event_loop.exit();
            }
            Err(wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other) => {}
        }

        if let Some(fps) = self.fps.record(Instant::now()) {
            if self.settings.show_fps {
                window.set_title(&window_title(Some(fps)));
            }
            let stats = renderer.last_frame_stats();
            debug!(
                "{fps:.1} fps, {} scene draws, {} portal draws, {} portal passes",
                stats.scene_draw_calls, stats.portal_draw_calls, stats.portal_view_passes
            );
        }
    }
}

impl ApplicationHandler for PortalApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let scene = match Scene::showcase() {
            Ok(scene) => scene,
            Err(err) => {
                error!("failed to build scene: {err}");
                event_loop.exit();
                return;
            }
        };

        let attrs = Window::default_attributes().with_title(window_title(None));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                match Renderer::new(window.clone(), &scene, &self.settings) {
                    Ok(renderer) => {
                        let size = window.inner_size();
                        self.lens.set_viewport(size.width, size.height);

                        info!("Window and renderer initialized");
                        self.window = Some(window);
                        self.renderer = Some(renderer);
                        self.scene = Some(scene);
                        self.clock = FrameClock::new();
                        self.fps = FpsCounter::default();
                    }
                    Err(err) => {
                        error!("failed to initialize renderer: {err}");
                        event_loop.exit();
                    }
                }
            }
            Err(err) => {
                error!("failed to create window: {err}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested; shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                match event.state {
                    ElementState::Pressed => {
                        if code == KeyCode::Escape {
                            self.set_cursor_grab(false);
                            return;
                        }
                        self.input.press_key(code);
                    }
                    ElementState::Released => self.input.release_key(code),
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state != ElementState::Pressed {
                    return;
                }
                // The first click only captures the cursor.
                if !self.cursor_grabbed {
                    self.set_cursor_grab(true);
                    return;
                }
                self.input.click(button);
            }
            WindowEvent::Focused(false) => {
                self.set_cursor_grab(false);
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
                self.lens.set_viewport(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                self.update_and_render(event_loop);
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if !self.cursor_grabbed {
            return;
        }

        if let DeviceEvent::MouseMotion { delta } = event {
            self.input
                .add_look_delta(Vec2::new(delta.0 as f32, delta.1 as f32));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

pub fn run() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
    info!("Aperture starting...");

    let settings = load_or_create_settings(&PathBuf::from(SETTINGS_PATH));

    let event_loop = match EventLoop::new() {
        Ok(loop_handle) => loop_handle,
        Err(err) => {
            error!("Failed to create event loop: {err}");
            return;
        }
    };

    let mut app = PortalApp::new(settings);
    if let Err(err) = event_loop.run_app(&mut app) {
        error!("Event loop exited with error: {err}");
    }
}
