//! Headless scene demo
//!
//! Builds a small solar system (a spinning sun with an orbiting planet and
//! moon), a camera and a light, then renders it on every configured window
//! through the recording headless backend. Pass a `.toml` or `.ron` engine
//! config as the first argument to change windows and frame counts.

use scene_engine::assets::ObjLoader;
use scene_engine::events::KeyAction;
use scene_engine::foundation::logging;
use scene_engine::prelude::*;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_CONFIG: &str = "scene_demo.toml";

/// Spins its node about a fixed axis
struct Spinner {
    axis: Vec3,
    speed: f32,
}

impl NodeBehavior for Spinner {
    fn ready(&mut self, node: &NodeRef<'_>) {
        log::info!("{} starts spinning at {:.2} rad/s", node.name(), self.speed);
    }

    fn update(&mut self, node: &NodeRef<'_>, delta_time: f32) {
        node.rotate(&self.axis, self.speed * delta_time);
    }
}

/// Logs keyboard and window events
struct InputLogger;

impl EventListener for InputLogger {
    fn on_event(&self, event: &Event) -> bool {
        match event.kind {
            EventKind::Key { key, action: KeyAction::Press } => log::info!("{}: key {key} pressed", event.context),
            EventKind::WindowResize { width, height } => log::info!("{}: resized to {width}x{height}", event.context),
            other => log::debug!("{}: {other:?}", event.context),
        }
        false
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = demo_config(&config_path)?;
    logging::init_with_level(config.log_level()?);

    let mut engine = Engine::new(config)?;
    let input_logger = Arc::new(InputLogger);
    engine.events().subscribe(&input_logger, EventMask::INPUT | EventMask::WINDOW);

    let moon = build_scene(&engine)?;

    for (index, window) in engine.config().windows.clone().into_iter().enumerate() {
        let backend = HeadlessBackend::new();
        let injector = backend.event_sender();
        injector.send(EventKind::WindowResize { width: window.width, height: window.height })?;
        injector.send(EventKind::Key { key: 32, action: KeyAction::Press })?;

        // Secondary views skip the moon from their first frame
        let id = ContextId::next();
        if index > 0 {
            engine.scene().try_node(moon)?.exclude_draw(id);
        }
        engine.spawn_context_with_id(id, window, move |_| Ok(Box::new(backend) as BoxedBackend))?;
    }

    for report in engine.wait()? {
        match report.error {
            Some(e) => log::error!("{} '{}' failed after {} frames: {e}", report.id, report.title, report.frames),
            None => log::info!("{} '{}' rendered {} frames", report.id, report.title, report.frames),
        }
    }

    let scene = engine.scene();
    let position = scene.try_node(moon)?.global_position();
    log::info!("Moon ended at ({:.3}, {:.3}, {:.3})", position.x, position.y, position.z);

    engine.shutdown()?;
    Ok(())
}

fn demo_config(path: &str) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    if Path::new(path).exists() {
        return Ok(EngineConfig::load_from_file(path)?);
    }

    Ok(EngineConfig {
        windows: vec![
            WindowConfig {
                title: "main".to_string(),
                max_frames: Some(120),
                ..WindowConfig::default()
            },
            WindowConfig {
                title: "overview".to_string(),
                width: 320,
                height: 240,
                drive_updates: false,
                max_frames: Some(60),
                ..WindowConfig::default()
            },
        ],
        ..EngineConfig::default()
    })
}

/// Populate the scene and return the moon's id
fn build_scene(engine: &Engine) -> Result<NodeId, Box<dyn std::error::Error>> {
    let scene = engine.scene();
    let root = scene.root_id();
    let body = load_body(engine);

    let camera = scene.create_node_with("camera", CameraNode::perspective(1.0, 16.0 / 9.0, 0.1, 100.0));
    scene.add_child(root, camera)?;
    scene.try_node(camera)?.set_position(Vec3::new(0.0, 2.0, 12.0));

    let light = scene.create_node_with("key_light", LightNode::directional(Vec3::new(1.0, 0.95, 0.9), 3.0));
    scene.add_child(root, light)?;
    scene.try_node(light)?.rotate_euler(-0.6, 0.4, 0.0, EulerOrder::YawPitchRoll);

    let sun = scene.create_node_with("sun", Spinner { axis: Vec3::y(), speed: 0.3 });
    scene.add_child(root, sun)?;
    let sun_body = scene.create_node_with("sun_body", MeshDrawable::new(body.clone(), Material::opaque()));
    scene.add_child(sun, sun_body)?;
    scene.try_node(sun_body)?.set_scale(Vec3::new(2.0, 2.0, 2.0));

    let orbit = scene.create_node_with("planet_orbit", Spinner { axis: Vec3::y(), speed: 1.2 });
    scene.add_child(sun, orbit)?;
    let planet = scene.create_node_with("planet", MeshDrawable::new(body.clone(), Material::opaque()));
    scene.add_child(orbit, planet)?;
    scene.try_node(planet)?.set_position(Vec3::new(5.0, 0.0, 0.0));

    let texture = Arc::new(ImageData::solid_color(4, 4, [200, 200, 210, 128]));
    let moon = scene.create_node_with("moon", MeshDrawable::new(body, Material::transparent().with_texture(texture)));
    scene.add_child(planet, moon)?;
    let moon_ref = scene.try_node(moon)?;
    moon_ref.set_position(Vec3::new(1.5, 0.0, 0.0));
    moon_ref.set_scale(Vec3::new(0.3, 0.3, 0.3));

    log::info!("Scene built with {} nodes", scene.len());
    Ok(moon)
}

/// Body mesh from `cube.obj` under the asset root, or a generated cube
fn load_body(engine: &Engine) -> Vec<Triangle> {
    match engine.loader().load_triangles(Path::new("cube.obj")) {
        Ok(triangles) => triangles,
        Err(e) => {
            log::info!("Using generated cube ({e})");
            ObjLoader::parse(CUBE_OBJ.as_bytes()).unwrap_or_default()
        }
    }
}

const CUBE_OBJ: &str = "\
v -0.5 -0.5 -0.5
v 0.5 -0.5 -0.5
v 0.5 0.5 -0.5
v -0.5 0.5 -0.5
v -0.5 -0.5 0.5
v 0.5 -0.5 0.5
v 0.5 0.5 0.5
v -0.5 0.5 0.5
f 5 6 7 8
f 2 1 4 3
f 1 5 8 4
f 6 2 3 7
f 8 7 3 4
f 1 2 6 5
";
