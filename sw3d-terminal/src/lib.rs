//! Terminal front end: drives a [`Scene`] each frame and rasterizes it as ASCII
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute, queue, terminal,
};
use nalgebra::{Point3, Vector3};
use std::io::{stdout, Write};
use std::time::{Duration, Instant};
use sw3d_core::{Camera, Matrix4Ext, Mesh, NodeHandle, Scene, SceneError};

pub mod config;
pub mod error;
pub mod renderer;
pub mod starfield;

pub use config::AppConfig;
pub use error::{AppError, ConfigError, Result};
pub use renderer::AsciiRenderer;
pub use starfield::Starfield;

/// World direction shown at the top of the viewport
const SCREEN_UP: Vector3<f32> = Vector3::new(0.0, -1.0, 0.0);

/// Degrees per key press
const ROTATE_STEP: f32 = 6.0;

/// Main application struct for terminal 3D rendering
pub struct TerminalApp {
    config: AppConfig,
    scene: Scene,
    camera: NodeHandle,
    pivot: NodeHandle,
    model: NodeHandle,
    starfield: Option<Starfield>,
    renderer: AsciiRenderer,
    spinning: bool,
    wireframe: bool,
    show_probe: bool,
    running: bool,
    last_frame: Instant,
    frame_count: u32,
    fps: f32,
}

impl TerminalApp {
    pub fn new(mesh: Mesh, config: AppConfig) -> Result<Self> {
        let (width, height) = terminal::size()?;
        Self::with_size(mesh, config, u32::from(width), u32::from(height))
    }

    /// Build the scene for a `width` x `height` character viewport.
    ///
    /// The model hangs under a pivot node so it can be centred and scaled
    /// once while the pivot carries the interactive rotation.
    pub fn with_size(mesh: Mesh, config: AppConfig, width: u32, height: u32) -> Result<Self> {
        let mut scene = Scene::new();

        let starfield = match config.stars {
            0 => None,
            n => Some(Starfield::new(&mut scene, width, height, n, config.star_depth)?),
        };

        let camera = scene.create_camera(Camera::new(width, height));
        let pivot = scene.create_node();
        let fit = fit_to_unit(&mesh);
        let model = scene.create_mesh(mesh);
        name(&mut scene, camera, "camera");
        name(&mut scene, pivot, "pivot");
        name(&mut scene, model, "model");

        scene.add_child(pivot, model)?;
        if let Some((offset, scale)) = fit {
            scene.set_scale_uniform(model, scale)?;
            scene.set_position(model, offset)?;
        }
        // Models are authored y-up; the viewport grows downwards
        scene.set_rotation(pivot, Vector3::new(180.0, 0.0, 0.0))?;

        let mut app = Self {
            config,
            scene,
            camera,
            pivot,
            model,
            starfield,
            renderer: AsciiRenderer::new(width as usize, height as usize),
            spinning: true,
            wireframe: false,
            show_probe: false,
            running: true,
            last_frame: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        };
        app.configure_camera(width, height)?;
        app.scene
            .set_position(camera, Vector3::new(0.0, 0.0, app.config.camera_distance))?;
        Ok(app)
    }

    fn configure_camera(&mut self, width: u32, height: u32) -> Result<()> {
        let component = self
            .scene
            .camera_mut(self.camera)
            .ok_or(SceneError::NotACamera(self.camera))?;
        component.set_fov(self.config.fov);
        component.set_viewport(sw3d_core::Viewport::new(0, 0, width, height));
        // Cells are taller than wide; squeeze x so shapes keep their proportions
        let aspect = component.aspect_ratio() / self.config.cell_aspect;
        component.set_aspect_ratio(aspect);
        component.set_viewport_depth(0.1, 1000.0);
        Ok(())
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> NodeHandle {
        self.camera
    }

    pub fn model(&self) -> NodeHandle {
        self.model
    }

    pub fn renderer(&self) -> &AsciiRenderer {
        &self.renderer
    }

    pub fn run(&mut self) -> Result<()> {
        terminal::enable_raw_mode()?;
        execute!(stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;

        let result = self.main_loop();

        // Cleanup
        terminal::disable_raw_mode()?;
        execute!(stdout(), terminal::LeaveAlternateScreen, cursor::Show)?;

        result
    }

    fn main_loop(&mut self) -> Result<()> {
        let target_frame_time = Duration::from_secs(1) / self.config.target_fps;
        let mut previous = Instant::now();

        while self.running {
            let frame_start = Instant::now();
            let delta = (frame_start - previous).as_secs_f32();
            previous = frame_start;

            while event::poll(Duration::from_millis(0))? {
                match event::read()? {
                    Event::Key(key) if key.kind != KeyEventKind::Release => self.handle_key(key)?,
                    Event::Resize(width, height) => self.resize(u32::from(width), u32::from(height))?,
                    _ => {}
                }
            }

            self.update(delta)?;
            self.render()?;
            self.present()?;

            self.frame_count += 1;
            let elapsed = frame_start.elapsed();
            if elapsed < target_frame_time {
                std::thread::sleep(target_frame_time - elapsed);
            }

            let now = Instant::now();
            if (now - self.last_frame).as_secs() >= 1 {
                self.fps = self.frame_count as f32 / (now - self.last_frame).as_secs_f32();
                self.frame_count = 0;
                self.last_frame = now;
            }
        }

        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        log::debug!("terminal resized to {width}x{height}");
        self.renderer.resize(width as usize, height as usize);
        self.configure_camera(width, height)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Result<()> {
        let pivot = self.pivot;
        let camera = self.camera;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Up => self.scene.rotate(pivot, Vector3::new(ROTATE_STEP, 0.0, 0.0))?,
            KeyCode::Down => self.scene.rotate(pivot, Vector3::new(-ROTATE_STEP, 0.0, 0.0))?,
            KeyCode::Left => self.scene.rotate(pivot, Vector3::new(0.0, -ROTATE_STEP, 0.0))?,
            KeyCode::Right => self.scene.rotate(pivot, Vector3::new(0.0, ROTATE_STEP, 0.0))?,
            KeyCode::Char('e') => self.scene.rotate(pivot, Vector3::new(0.0, 0.0, ROTATE_STEP))?,
            KeyCode::Char('r') => self.scene.rotate(pivot, Vector3::new(0.0, 0.0, -ROTATE_STEP))?,
            KeyCode::Char('w') => self.scene.translate(camera, SCREEN_UP * -0.1)?,
            KeyCode::Char('s') => self.scene.translate(camera, SCREEN_UP * 0.1)?,
            KeyCode::Char('a') => self.scene.translate(camera, Vector3::new(-0.1, 0.0, 0.0))?,
            KeyCode::Char('d') => self.scene.translate(camera, Vector3::new(0.1, 0.0, 0.0))?,
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.scene.translate(camera, Vector3::new(0.0, 0.0, -0.25))?
            }
            KeyCode::Char('-') => self.scene.translate(camera, Vector3::new(0.0, 0.0, 0.25))?,
            KeyCode::Char('l') => self.scene.look_at(camera, &Vector3::zeros(), &SCREEN_UP)?,
            KeyCode::Char('0') => {
                self.scene.set_rotation(camera, Vector3::zeros())?;
                self.scene
                    .set_position(camera, Vector3::new(0.0, 0.0, self.config.camera_distance))?;
            }
            KeyCode::Char('f') => self.wireframe = !self.wireframe,
            KeyCode::Char('p') => self.show_probe = !self.show_probe,
            KeyCode::Char(' ') => self.spinning = !self.spinning,
            _ => {}
        }
        Ok(())
    }

    /// Advance the animation by `delta_seconds`
    pub fn update(&mut self, delta_seconds: f32) -> Result<()> {
        if self.spinning {
            let [x, y, z] = self.config.spin;
            self.scene
                .rotate(self.pivot, Vector3::new(x, y, z) * delta_seconds)?;
        }
        if let Some(starfield) = &mut self.starfield {
            starfield.update(&mut self.scene, delta_seconds);
        }
        Ok(())
    }

    /// Rasterize the current frame into the character buffer
    pub fn render(&mut self) -> Result<()> {
        self.renderer.clear();

        self.scene.transform_mesh(self.model, self.camera)?;
        let world = self.scene.matrix_world(self.model)?;
        let eye = self.scene.matrix_world(self.camera)?.translation();
        let normal_matrix = world.upper_3x3();

        if let Some(mesh) = self.scene.mesh(self.model) {
            let screen = mesh.transformed();
            if self.wireframe || mesh.indices.is_empty() {
                for edge in &mesh.edges {
                    if let (Some(a), Some(b)) =
                        (screen.get(edge.a as usize), screen.get(edge.b as usize))
                    {
                        self.renderer.draw_line(a, b, '#');
                    }
                }
                for point in screen {
                    self.renderer.plot(point, '@');
                }
            } else {
                for face in mesh.faces() {
                    let Some(triangle) = mesh.triangle(face) else {
                        continue;
                    };
                    let Some(normal) = triangle.face_normal() else {
                        continue;
                    };
                    let normal = (normal_matrix * normal).normalize();
                    let centre = world.transform_point(&triangle.vertices[0]);
                    let Some(to_eye) = (eye - centre.coords).try_normalize(1e-6) else {
                        continue;
                    };

                    // Back faces and faces seen edge-on are skipped
                    let facing = normal.dot(&to_eye);
                    if facing <= 0.0 {
                        continue;
                    }
                    let vertices = face.map(|i| screen[i as usize]);
                    self.renderer
                        .fill_triangle(&vertices, renderer::shade(0.15 + 0.85 * facing));
                }
            }
        }

        if let Some(starfield) = &mut self.starfield {
            starfield.render(&mut self.scene, &mut self.renderer)?;
        }

        self.draw_overlay()
    }

    fn draw_overlay(&mut self) -> Result<()> {
        self.renderer.print(
            0,
            0,
            &format!(
                "SW3D Terminal | FPS: {:.1} | Arrows/E/R=Rotate WASD/+-=Move L=Look 0=Reset F=Wire P=Probe Space=Spin Q=Quit",
                self.fps
            ),
        );

        if self.show_probe {
            let origin = Point3::origin();
            let screen = self.scene.project(self.camera, &origin)?;
            let back = self.scene.unproject(self.camera, &screen)?;
            let text = match back {
                Some(p) => format!(
                    "origin -> ({:.2}, {:.2}, {:.4}) -> ({:.3}, {:.3}, {:.3})",
                    screen.x, screen.y, screen.z, p.x, p.y, p.z
                ),
                None => format!("origin -> ({:.2}, {:.2}, {}) -> not invertible", screen.x, screen.y, screen.z),
            };
            self.renderer.print(0, 1, &text);
        }
        Ok(())
    }

    fn present(&self) -> Result<()> {
        let mut stdout = stdout();
        queue!(stdout, cursor::MoveTo(0, 0))?;
        self.renderer.draw(&mut stdout)?;
        stdout.flush()?;
        Ok(())
    }
}

fn name(scene: &mut Scene, handle: NodeHandle, name: &str) {
    if let Some(node) = scene.node_mut(handle) {
        node.set_name(name);
    }
}

/// Offset and uniform scale that centre the mesh and fit it in a unit sphere
fn fit_to_unit(mesh: &Mesh) -> Option<(Vector3<f32>, f32)> {
    let (lo, hi) = mesh.bounds()?;
    let centre = nalgebra::center(&lo, &hi).coords;
    let radius = mesh
        .positions
        .iter()
        .map(|p| (p.coords - centre).norm())
        .fold(0.0f32, f32::max);
    if radius <= f32::EPSILON {
        return None;
    }
    let scale = 1.0 / radius;
    Some((-centre * scale, scale))
}
