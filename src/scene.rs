// Scene - objects and their transforms

use crate::model::Drawable;
use glam::{EulerRot, Mat4, Quat, Vec3};
use std::sync::Arc;

/// Translation, rotation and scale of an object
///
/// `rotation` holds Tait-Bryan angles in radians, applied Y, then X, then Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Model matrix: translate * Ry * Rx * Rz * scale
    pub fn mat4(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::YXZ,
            self.rotation.y,
            self.rotation.x,
            self.rotation.z,
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.translation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

/// A drawable placed in the world
pub struct SceneObject {
    id: ObjectId,
    pub model: Arc<dyn Drawable>,
    pub color: Vec3,
    pub transform: Transform,
}

impl SceneObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

/// Objects in insertion order, which is also draw order
#[derive(Default)]
pub struct Scene {
    objects: Vec<SceneObject>,
    next_id: u32,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, model: Arc<dyn Drawable>, color: Vec3, transform: Transform) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.push(SceneObject {
            id,
            model,
            color,
            transform,
        });
        id
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|object| object.id == id)
    }

    /// Remove an object, keeping the order of the rest
    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        let index = self.objects.iter().position(|object| object.id == id)?;
        Some(self.objects.remove(index))
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
