//! Built-in node behaviors that draw
//!
//! Drawables never touch the GPU from `register_draw`: they capture what
//! they need from the node (world matrices) and queue a [`RenderTask`] that
//! does the actual work on the context thread.

use super::{
    priority, BufferHandle, ContextId, GpuContext, GpuResource, LightData, LightKind, RenderContext, RenderError,
    RenderTask, ResourceReleaser, ShaderHandle, TextureHandle,
};
use crate::assets::ImageData;
use crate::foundation::geometry::{triangles_as_bytes, Triangle};
use crate::foundation::math::{ortho_projection, perspective_fov, utils::safe_normalize, Mat4, Vec3, Vec4};
use crate::scene::{NodeBehavior, NodeRef};
use parking_lot::Mutex;
use std::collections::hash_map::{Entry, HashMap};
use std::sync::Arc;

const DEFAULT_VERTEX_SHADER: &str = r"#version 330 core
layout(location = 0) in vec3 a_position;
layout(location = 1) in vec3 a_normal;
layout(location = 2) in vec2 a_tex_coord;
uniform mat4 u_model;
uniform mat4 u_view_projection;
out vec3 v_normal;
out vec2 v_tex_coord;
void main() {
    v_normal = mat3(u_model) * a_normal;
    v_tex_coord = a_tex_coord;
    gl_Position = u_view_projection * u_model * vec4(a_position, 1.0);
}
";

const DEFAULT_FRAGMENT_SHADER: &str = r"#version 330 core
in vec3 v_normal;
in vec2 v_tex_coord;
uniform sampler2D u_albedo;
out vec4 frag_color;
void main() {
    frag_color = texture(u_albedo, v_tex_coord);
}
";

/// Shader, texture and draw order of a mesh
#[derive(Debug, Clone)]
pub struct Material {
    /// Task priority; [`priority::TRANSPARENT`] for blended materials
    pub priority: f32,
    /// Vertex stage source
    pub vertex_shader: Arc<str>,
    /// Fragment stage source
    pub fragment_shader: Arc<str>,
    /// Optional albedo texture
    pub texture: Option<Arc<ImageData>>,
}

impl Material {
    /// Opaque material with the default shaders
    pub fn opaque() -> Self {
        Self {
            priority: priority::OPAQUE,
            vertex_shader: Arc::from(DEFAULT_VERTEX_SHADER),
            fragment_shader: Arc::from(DEFAULT_FRAGMENT_SHADER),
            texture: None,
        }
    }

    /// Blended material drawn after opaque geometry and lights
    pub fn transparent() -> Self {
        Self {
            priority: priority::TRANSPARENT,
            ..Self::opaque()
        }
    }

    /// Attach an albedo texture
    pub fn with_texture(mut self, texture: Arc<ImageData>) -> Self {
        self.texture = Some(texture);
        self
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::opaque()
    }
}

/// GPU copy of a mesh in one context
///
/// Dropping it queues the frees on the owning context.
#[derive(Debug)]
struct GpuMesh {
    buffer: BufferHandle,
    shader: ShaderHandle,
    texture: Option<TextureHandle>,
    vertex_count: u32,
    releaser: ResourceReleaser,
}

impl GpuMesh {
    fn upload(gpu: &mut GpuContext, triangles: &[Triangle], material: &Material) -> Result<Self, RenderError> {
        let vertex_count = u32::try_from(triangles.len() * 3)
            .map_err(|_| RenderError::InvalidData(format!("{} triangles", triangles.len())))?;

        let buffer = gpu.create_buffer(triangles_as_bytes(triangles))?;
        let shader = match gpu.compile_shader(&material.vertex_shader, &material.fragment_shader) {
            Ok(shader) => shader,
            Err(e) => {
                discard(gpu, &[GpuResource::Buffer(buffer)]);
                return Err(e);
            }
        };
        let texture = match &material.texture {
            Some(image) => match gpu.create_texture(image.width, image.height, image.channels, &image.data) {
                Ok(texture) => Some(texture),
                Err(e) => {
                    discard(gpu, &[GpuResource::Buffer(buffer), GpuResource::Shader(shader)]);
                    return Err(e);
                }
            },
            None => None,
        };

        log::debug!(
            "{}: uploaded mesh ({vertex_count} vertices, textured: {})",
            gpu.context_id(),
            texture.is_some()
        );
        Ok(Self {
            buffer,
            shader,
            texture,
            vertex_count,
            releaser: gpu.releaser(),
        })
    }
}

/// Free resources of a partially failed upload, keeping the original error
fn discard(gpu: &mut GpuContext, resources: &[GpuResource]) {
    for &resource in resources {
        if let Err(e) = gpu.destroy(resource) {
            log::warn!("{}: failed to free {resource:?} after upload error: {e}", gpu.context_id());
        }
    }
}

impl Drop for GpuMesh {
    fn drop(&mut self) {
        self.releaser.release(GpuResource::Buffer(self.buffer));
        self.releaser.release(GpuResource::Shader(self.shader));
        if let Some(texture) = self.texture {
            self.releaser.release(GpuResource::Texture(texture));
        }
    }
}

type UploadCache = Arc<Mutex<HashMap<ContextId, GpuMesh>>>;

/// Triangle mesh drawn with a [`Material`]
///
/// Uploads lazily: each context gets its own buffers the first time the
/// mesh is drawn there.
#[derive(Debug)]
pub struct MeshDrawable {
    triangles: Arc<[Triangle]>,
    material: Arc<Material>,
    uploads: UploadCache,
}

impl MeshDrawable {
    /// Mesh from triangles
    pub fn new(triangles: impl Into<Arc<[Triangle]>>, material: Material) -> Self {
        Self {
            triangles: triangles.into(),
            material: Arc::new(material),
            uploads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Triangle count
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Whether the mesh has been uploaded to `context`
    pub fn is_uploaded(&self, context: ContextId) -> bool {
        self.uploads.lock().contains_key(&context)
    }
}

impl NodeBehavior for MeshDrawable {
    fn register_draw(&mut self, node: &NodeRef<'_>, context: &mut RenderContext) {
        if self.triangles.is_empty() {
            return;
        }

        let model = node.world_matrix();
        let triangles = Arc::clone(&self.triangles);
        let material = Arc::clone(&self.material);
        let uploads = Arc::clone(&self.uploads);

        let task = RenderTask::new(material.priority, move |gpu| {
            let mut uploads = uploads.lock();
            let mesh = match uploads.entry(gpu.context_id()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    entry.insert(GpuMesh::upload(gpu, &triangles, &material)?)
                }
            };

            gpu.set_model_matrix(&model)?;
            if let Some(texture) = mesh.texture {
                gpu.bind_texture(texture)?;
            }
            gpu.draw_arrays(mesh.shader, mesh.buffer, 0, mesh.vertex_count)
        });
        context.add_render_task(task.with_label("mesh"));
    }
}

/// Light color and type; placement comes from the node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightNode {
    /// Directional or point
    pub kind: LightKind,
    /// Linear RGB color
    pub color: Vec3,
    /// Scalar intensity
    pub intensity: f32,
}

impl LightNode {
    /// Light shining along the node's local -Z axis
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self { kind: LightKind::Directional, color, intensity }
    }

    /// Light at the node's origin
    pub fn point(color: Vec3, intensity: f32) -> Self {
        Self { kind: LightKind::Point, color, intensity }
    }

    fn light_data(&self, world: &Mat4) -> LightData {
        let position = world.column(3).xyz();
        let forward = world * Vec4::new(0.0, 0.0, -1.0, 0.0);
        LightData {
            kind: self.kind,
            position,
            direction: safe_normalize(&forward.xyz()),
            color: self.color,
            intensity: self.intensity,
        }
    }
}

impl NodeBehavior for LightNode {
    fn register_draw(&mut self, node: &NodeRef<'_>, context: &mut RenderContext) {
        let light = self.light_data(&node.world_matrix());
        context.add_render_task(RenderTask::new(priority::LIGHTS, move |gpu| gpu.apply_light(&light)).with_label("light"));
    }
}

/// Camera projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Symmetric perspective frustum
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
        /// Width over height
        aspect: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
    /// Centered orthographic box
    Orthographic {
        /// Box width
        width: f32,
        /// Box height
        height: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
}

impl Projection {
    /// Projection matrix
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Self::Perspective { fov_y, aspect, near, far } => perspective_fov(fov_y, aspect, near, far),
            Self::Orthographic { width, height, near, far } => {
                let (half_w, half_h) = (width * 0.5, height * 0.5);
                ortho_projection(half_w, -half_w, half_h, -half_h, near, far)
            }
        }
    }
}

/// Camera looking down the node's local -Z axis
///
/// The view matrix is the node's cached world inverse, so moving the node
/// or any ancestor moves the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraNode {
    /// Projection parameters
    pub projection: Projection,
}

impl CameraNode {
    /// Camera with the given projection
    pub fn new(projection: Projection) -> Self {
        Self { projection }
    }

    /// Perspective camera
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Perspective { fov_y, aspect, near, far })
    }
}

impl NodeBehavior for CameraNode {
    fn register_draw(&mut self, node: &NodeRef<'_>, context: &mut RenderContext) {
        let view = node.world_inverse_matrix();
        let projection = self.projection.matrix();
        context.add_render_task(
            RenderTask::new(priority::CAMERA, move |gpu| gpu.set_view_projection(&view, &projection)).with_label("camera"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::geometry::Vertex;
    use crate::render::{BackendCall, HeadlessBackend};
    use crate::scene::SceneGraph;
    use approx::assert_relative_eq;

    fn quad() -> Vec<Triangle> {
        let v = |x: f32, y: f32| Vertex::from_position([x, y, 0.0]);
        vec![
            Triangle::new(v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0)),
            Triangle::new(v(0.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)),
        ]
    }

    fn call_name(call: &BackendCall) -> &'static str {
        match call {
            BackendCall::CreateBuffer { .. } => "create_buffer",
            BackendCall::DeleteBuffer(_) => "delete_buffer",
            BackendCall::CreateTexture { .. } => "create_texture",
            BackendCall::DeleteTexture(_) => "delete_texture",
            BackendCall::CompileShader(_) => "compile_shader",
            BackendCall::DeleteShader(_) => "delete_shader",
            BackendCall::Clear(_) => "clear",
            BackendCall::SetViewProjection { .. } => "view_projection",
            BackendCall::SetModelMatrix(_) => "model",
            BackendCall::BindTexture { .. } => "bind_texture",
            BackendCall::ApplyLight(_) => "light",
            BackendCall::DrawArrays { .. } => "draw",
            BackendCall::Present => "present",
        }
    }

    #[test]
    fn test_frame_orders_camera_geometry_lights() {
        let graph = SceneGraph::new();
        let root = graph.root_id();
        // Registered in the opposite of execution order
        let light = graph.create_node_with("sun", LightNode::directional(Vec3::new(1.0, 1.0, 1.0), 2.0));
        let mesh = graph.create_node_with("quad", MeshDrawable::new(quad(), Material::opaque()));
        let camera = graph.create_node_with("camera", CameraNode::perspective(1.0, 1.5, 0.1, 100.0));
        for id in [light, mesh, camera] {
            graph.add_child(root, id).unwrap();
        }

        let backend = HeadlessBackend::new();
        let calls = backend.call_log();
        let mut context = RenderContext::new("main", Box::new(backend));

        assert!(graph.register_draw(&mut context));
        assert_eq!(context.render().unwrap(), 3);

        let names: Vec<_> = calls.lock().iter().map(call_name).collect();
        assert_eq!(names, vec!["view_projection", "create_buffer", "compile_shader", "model", "draw", "light"]);

        match calls.lock().iter().find(|call| matches!(call, BackendCall::DrawArrays { .. })) {
            Some(BackendCall::DrawArrays { first, count, .. }) => {
                assert_eq!(*first, 0);
                assert_eq!(*count, 6);
            }
            other => panic!("no draw call: {other:?}"),
        };
    }

    #[test]
    fn test_mesh_uploads_once_per_context() {
        let graph = SceneGraph::new();
        graph.set_behavior(graph.root_id(), MeshDrawable::new(quad(), Material::opaque())).unwrap();

        let backend = HeadlessBackend::new();
        let calls = backend.call_log();
        let mut context = RenderContext::new("main", Box::new(backend));

        for _ in 0..3 {
            graph.register_draw(&mut context);
            context.render().unwrap();
            context.refresh();
        }

        let log = calls.lock();
        let uploads = log.iter().filter(|call| matches!(call, BackendCall::CreateBuffer { .. })).count();
        let draws = log.iter().filter(|call| matches!(call, BackendCall::DrawArrays { .. })).count();
        assert_eq!(uploads, 1);
        assert_eq!(draws, 3);
    }

    #[test]
    fn test_destroyed_mesh_releases_gpu_resources() {
        let graph = SceneGraph::new();
        let texture = Arc::new(ImageData::solid_color(2, 2, [255, 0, 0, 255]));
        let mesh = graph.create_node_with("quad", MeshDrawable::new(quad(), Material::opaque().with_texture(texture)));
        graph.add_child(graph.root_id(), mesh).unwrap();

        let backend = HeadlessBackend::new();
        let calls = backend.call_log();
        let mut context = RenderContext::new("main", Box::new(backend));

        graph.register_draw(&mut context);
        context.render().unwrap();
        context.refresh();
        assert!(calls.lock().iter().any(|call| matches!(call, BackendCall::BindTexture { slot: 0, .. })));

        graph.destroy_node(mesh).unwrap();
        assert_eq!(context.collect_garbage().unwrap(), 3);

        let log = calls.lock();
        assert!(log.iter().any(|call| matches!(call, BackendCall::DeleteBuffer(_))));
        assert!(log.iter().any(|call| matches!(call, BackendCall::DeleteShader(_))));
        assert!(log.iter().any(|call| matches!(call, BackendCall::DeleteTexture(_))));
    }

    #[test]
    fn test_camera_view_is_world_inverse() {
        let graph = SceneGraph::new();
        let rig = graph.spawn_child(graph.root_id(), "rig").unwrap();
        let camera = graph.create_node_with("camera", CameraNode::perspective(1.0, 1.0, 0.1, 10.0));
        graph.add_child(rig, camera).unwrap();
        graph.node(rig).unwrap().set_position(Vec3::new(0.0, 0.0, 5.0));

        let backend = HeadlessBackend::new();
        let calls = backend.call_log();
        let mut context = RenderContext::new("main", Box::new(backend));
        graph.register_draw(&mut context);
        context.render().unwrap();

        let log = calls.lock();
        let Some(BackendCall::SetViewProjection { view, .. }) = log.first() else {
            panic!("camera did not set matrices");
        };
        let eye_space = view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(eye_space, Vec4::new(0.0, 0.0, -5.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_light_direction_follows_rotation() {
        let graph = SceneGraph::new();
        let light = LightNode::directional(Vec3::new(1.0, 1.0, 1.0), 1.0);
        graph.set_behavior(graph.root_id(), light).unwrap();
        let root = graph.root();
        root.rotate(&Vec3::y(), std::f32::consts::FRAC_PI_2);
        root.set_position(Vec3::new(3.0, 0.0, 0.0));

        let data = light.light_data(&root.world_matrix());
        assert_relative_eq!(data.position, Vec3::new(3.0, 0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(data.direction, Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-5);
    }
}
