// Meshes - vertex layout, CPU-side model data and GPU models

use crate::backend::buffer::GpuBuffer;
use crate::backend::{CommandRecorder, VulkanDevice};
use crate::error::{GpuError, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::mem::{offset_of, size_of};
use std::sync::Arc;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(position: Vec3, color: Vec3) -> Self {
        Self { position, color }
    }

    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

/// Mesh data before upload. An empty index list means non-indexed drawing.
#[derive(Debug, Clone, Default)]
pub struct ModelData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

const WHITE: Vec3 = Vec3::new(0.9, 0.9, 0.9);
const YELLOW: Vec3 = Vec3::new(0.8, 0.8, 0.1);
const ORANGE: Vec3 = Vec3::new(0.9, 0.6, 0.1);
const RED: Vec3 = Vec3::new(0.8, 0.1, 0.1);
const BLUE: Vec3 = Vec3::new(0.1, 0.1, 0.8);
const GREEN: Vec3 = Vec3::new(0.1, 0.8, 0.1);

/// Cube faces as (color, corners). Each face becomes triangles 0-1-2 and 0-3-1.
/// y points down, so the -y face is the top.
const CUBE_FACES: [(Vec3, [[f32; 3]; 4]); 6] = [
    // left
    (WHITE, [[-0.5, -0.5, -0.5], [-0.5, 0.5, 0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, -0.5]]),
    // right
    (YELLOW, [[0.5, -0.5, -0.5], [0.5, 0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, -0.5]]),
    // top
    (ORANGE, [[-0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5], [0.5, -0.5, -0.5]]),
    // bottom
    (RED, [[-0.5, 0.5, -0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5], [0.5, 0.5, -0.5]]),
    // nose
    (BLUE, [[-0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5], [0.5, -0.5, 0.5]]),
    // tail
    (GREEN, [[-0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, -0.5, -0.5]]),
];

impl ModelData {
    /// Unit cube centred on `offset`, one color per face, 36 vertices
    pub fn cube(offset: Vec3) -> Self {
        let vertices = CUBE_FACES
            .iter()
            .flat_map(|(color, corners)| {
                [0, 1, 2, 0, 3, 1]
                    .into_iter()
                    .map(move |i| Vertex::new(Vec3::from(corners[i]) + offset, *color))
            })
            .collect();

        Self {
            vertices,
            indices: Vec::new(),
        }
    }

    /// A single red/green/blue triangle in the z = 0 plane
    pub fn triangle() -> Self {
        Self {
            vertices: vec![
                Vertex::new(Vec3::new(0.0, -0.5, 0.0), Vec3::X),
                Vertex::new(Vec3::new(0.5, 0.5, 0.0), Vec3::Y),
                Vertex::new(Vec3::new(-0.5, 0.5, 0.0), Vec3::Z),
            ],
            indices: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.vertices.len() < 3 {
            return Err(GpuError::InvalidModel(format!(
                "vertex count must be at least 3, got {}",
                self.vertices.len()
            )));
        }

        let vertex_count = self.vertices.len() as u32;
        if let Some(&index) = self.indices.iter().find(|&&index| index >= vertex_count) {
            return Err(GpuError::InvalidModel(format!(
                "index {} out of range for {} vertices",
                index, vertex_count
            )));
        }

        Ok(())
    }
}

/// Something that can record its own geometry into a command buffer
pub trait Drawable {
    fn bind(&self, recorder: &dyn CommandRecorder, cmd: vk::CommandBuffer);
    fn draw(&self, recorder: &dyn CommandRecorder, cmd: vk::CommandBuffer);
}

/// A mesh uploaded to host-visible GPU memory
pub struct Model {
    vertex_buffer: GpuBuffer,
    index_buffer: Option<GpuBuffer>,
    vertex_count: u32,
    index_count: u32,
}

impl Model {
    pub fn new(device: &Arc<VulkanDevice>, data: &ModelData) -> Result<Self> {
        data.validate()?;

        let vertex_buffer = GpuBuffer::with_data(
            device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &data.vertices,
            "model vertices",
        )?;

        let index_buffer = if data.indices.is_empty() {
            None
        } else {
            Some(GpuBuffer::with_data(
                device,
                vk::BufferUsageFlags::INDEX_BUFFER,
                &data.indices,
                "model indices",
            )?)
        };

        log::debug!(
            "Uploaded model: {} vertices, {} indices ({} bytes)",
            data.vertices.len(),
            data.indices.len(),
            vertex_buffer.size() + index_buffer.as_ref().map_or(0, GpuBuffer::size)
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
        })
    }
}

impl Drawable for Model {
    fn bind(&self, recorder: &dyn CommandRecorder, cmd: vk::CommandBuffer) {
        recorder.cmd_bind_vertex_buffer(cmd, self.vertex_buffer.handle());
        if let Some(index_buffer) = &self.index_buffer {
            recorder.cmd_bind_index_buffer(cmd, index_buffer.handle());
        }
    }

    fn draw(&self, recorder: &dyn CommandRecorder, cmd: vk::CommandBuffer) {
        if self.index_buffer.is_some() {
            recorder.cmd_draw_indexed(cmd, self.index_count);
        } else {
            recorder.cmd_draw(cmd, self.vertex_count);
        }
    }
}
