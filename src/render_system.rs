// Simple render system - one pipeline, per-object push constants

use crate::backend::pipeline::{Pipeline, PipelineConfig, PipelineLayout};
use crate::backend::GpuDevice;
use crate::camera::Camera;
use crate::error::Result;
use crate::model::Vertex;
use crate::scene::Scene;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::mem::size_of;
use std::path::Path;
use std::sync::Arc;

/// Stages that read the push constant block
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

/// Per-object data, laid out like the shader's push block (std430)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PushConstantData {
    /// projection * view * model
    pub transform: Mat4,
    pub color: Vec3,
    _padding: f32,
}

impl PushConstantData {
    pub fn new(transform: Mat4, color: Vec3) -> Self {
        Self {
            transform,
            color,
            _padding: 0.0,
        }
    }
}

pub struct RenderSystem<D: GpuDevice> {
    pipeline: Pipeline<D>,
    layout: PipelineLayout<D>,
    device: Arc<D>,
}

impl<D: GpuDevice> RenderSystem<D> {
    /// Build the pipeline against `render_pass`. Swapchain recreation keeps
    /// formats fixed, so the pipeline stays valid for later render passes.
    pub fn new(
        device: &Arc<D>,
        render_pass: vk::RenderPass,
        vertex_shader: &Path,
        fragment_shader: &Path,
    ) -> Result<Self> {
        let layout = PipelineLayout::new(
            device,
            size_of::<PushConstantData>() as u32,
            PUSH_CONSTANT_STAGES,
        )?;

        let config = PipelineConfig {
            vertex_bindings: Vertex::binding_descriptions(),
            vertex_attributes: Vertex::attribute_descriptions(),
            ..Default::default()
        };

        let pipeline = Pipeline::new(
            device,
            vertex_shader,
            fragment_shader,
            layout.handle(),
            render_pass,
            &config,
        )?;

        Ok(Self {
            pipeline,
            layout,
            device: device.clone(),
        })
    }

    /// Record every object in scene order inside the open render pass
    pub fn render_objects(&self, cmd: vk::CommandBuffer, scene: &Scene, camera: &Camera) {
        self.pipeline.bind(cmd);

        let projection_view = camera.projection_view();
        for object in scene.objects() {
            let push = PushConstantData::new(projection_view * object.transform.mat4(), object.color);
            self.device.cmd_push_constants(
                cmd,
                self.layout.handle(),
                PUSH_CONSTANT_STAGES,
                bytemuck::bytes_of(&push),
            );

            object.model.bind(&*self.device, cmd);
            object.model.draw(&*self.device, cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SwapchainStatus;
    use crate::renderer::Renderer;
    use crate::scene::Transform;
    use crate::testing::{write_spirv, Call, FakeDevice, FakeMesh, FakeWindow};
    use ash::vk::Handle;

    fn render_system(device: &Arc<FakeDevice>, render_pass: vk::RenderPass) -> RenderSystem<FakeDevice> {
        let vert = write_spirv("render_system.vert.spv");
        let frag = write_spirv("render_system.frag.spv");
        RenderSystem::new(device, render_pass, &vert, &frag).unwrap()
    }

    #[test]
    fn test_push_constant_layout() {
        assert_eq!(size_of::<PushConstantData>(), 80);
        assert!(PUSH_CONSTANT_STAGES.contains(vk::ShaderStageFlags::VERTEX));
        assert!(PUSH_CONSTANT_STAGES.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_objects_drawn_in_scene_order() {
        let device = FakeDevice::new();
        let system = render_system(&device, vk::RenderPass::from_raw(7));

        let mut scene = Scene::new();
        scene.spawn(Arc::new(FakeMesh::new(11, 3)), Vec3::X, Transform::default());
        scene.spawn(Arc::new(FakeMesh::new(12, 36)), Vec3::Y, Transform::default());
        scene.spawn(Arc::new(FakeMesh::new(13, 6)), Vec3::Z, Transform::default());

        device.clear_calls();
        system.render_objects(vk::CommandBuffer::from_raw(1), &scene, &Camera::default());

        let calls = device.calls();
        assert_eq!(calls[0], Call::BindPipeline(system.pipeline.handle()));
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::BindPipeline(_))).count(),
            1
        );

        let draws: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::BindVertexBuffer(buffer) => Some(buffer.as_raw() as u32),
                Call::Draw(count) => Some(1000 + count),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![11, 1003, 12, 1036, 13, 1006]);

        let colors: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::PushConstants(data) => {
                    Some(bytemuck::pod_read_unaligned::<PushConstantData>(data).color)
                }
                _ => None,
            })
            .collect();
        assert_eq!(colors, vec![Vec3::X, Vec3::Y, Vec3::Z]);
    }

    #[test]
    fn test_push_transform_is_projection_view_model() {
        let device = FakeDevice::new();
        let system = render_system(&device, vk::RenderPass::from_raw(7));

        let mut camera = Camera::default();
        camera.set_perspective_projection(1.0, 1.5, 0.1, 10.0);
        camera.set_view_target(Vec3::new(-1.0, -2.0, -2.0), Vec3::new(0.0, 0.0, 2.5), Vec3::Y);

        let transform = Transform {
            translation: Vec3::new(0.0, 0.0, 2.5),
            scale: Vec3::splat(0.5),
            ..Default::default()
        };
        let mut scene = Scene::new();
        scene.spawn(Arc::new(FakeMesh::new(1, 36)), Vec3::ONE, transform);

        device.clear_calls();
        system.render_objects(vk::CommandBuffer::from_raw(1), &scene, &camera);

        let pushed = device
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::PushConstants(data) => Some(bytemuck::pod_read_unaligned::<PushConstantData>(&data)),
                _ => None,
            })
            .unwrap();
        let expected = camera.projection() * camera.view() * transform.mat4();
        assert!(pushed.transform.abs_diff_eq(expected, 1e-5));
        assert_eq!(pushed.color, Vec3::ONE);
    }

    #[test]
    fn test_empty_scene_only_binds_pipeline() {
        let device = FakeDevice::new();
        let system = render_system(&device, vk::RenderPass::from_raw(7));

        device.clear_calls();
        system.render_objects(vk::CommandBuffer::from_raw(1), &Scene::new(), &Camera::default());

        assert_eq!(device.calls(), vec![Call::BindPipeline(system.pipeline.handle())]);
    }

    #[test]
    fn test_pipeline_survives_swapchain_recreation() {
        let device = FakeDevice::new();
        let mut window = FakeWindow::new(800, 600);
        let mut renderer = Renderer::new(device.clone(), &mut window, [0.0; 4]).unwrap();
        let system = render_system(&device, renderer.render_pass());
        let pipeline = system.pipeline.handle();

        let mut scene = Scene::new();
        scene.spawn(Arc::new(FakeMesh::new(1, 3)), Vec3::ONE, Transform::default());

        device.script_submit([Ok(SwapchainStatus::OutOfDate)]);
        for _ in 0..3 {
            if let Some(cmd) = renderer.begin_frame(&mut window).unwrap() {
                renderer.begin_render_pass(cmd);
                system.render_objects(cmd, &scene, &Camera::default());
                renderer.end_render_pass(cmd);
                renderer.end_frame(&mut window).unwrap();
            }
        }

        assert_eq!(renderer.swapchain_recreations(), 1);
        let calls = device.calls();
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::CreatePipeline(_))).count(),
            1
        );
        assert!(calls
            .iter()
            .filter_map(|c| match c {
                Call::BindPipeline(p) => Some(*p),
                _ => None,
            })
            .all(|p| p == pipeline));
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Draw(3))).count(),
            3
        );
    }

    #[test]
    fn test_resources_released_pipeline_first() {
        let device = FakeDevice::new();
        let system = render_system(&device, vk::RenderPass::from_raw(7));
        let pipeline = system.pipeline.handle();
        let layout = system.layout.handle();

        device.clear_calls();
        drop(system);

        assert_eq!(
            device.calls(),
            vec![Call::DestroyPipeline(pipeline), Call::DestroyPipelineLayout(layout)]
        );
    }

    #[test]
    fn test_missing_shader_is_reported() {
        let device = FakeDevice::new();
        let result = RenderSystem::new(
            &device,
            vk::RenderPass::from_raw(7),
            Path::new("shaders/nope.vert.spv"),
            Path::new("shaders/nope.frag.spv"),
        );
        assert!(matches!(result, Err(crate::error::GpuError::ShaderLoad { .. })));
    }
}
