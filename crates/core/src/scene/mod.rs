use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Base geometry shared by every instance of an animated object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub name: String,
    pub instance_count: usize,
    /// Vertices of one instance, drawn as a line strip.
    pub vertices: Vec<Vec3>,
}

impl SceneDescriptor {
    /// Equilateral triangle outline, closed by repeating the first vertex.
    pub fn triangles(instance_count: usize) -> Self {
        let top = Vec3::new(0.0, 0.866, 0.0);
        Self {
            name: "Triangles".to_string(),
            instance_count,
            vertices: vec![
                top,
                Vec3::new(-1.0, -0.866, 0.0),
                Vec3::new(1.0, -0.866, 0.0),
                top,
            ],
        }
    }

    pub fn vertices_per_instance(&self) -> usize {
        self.vertices.len()
    }

    /// Outline repeated once per instance, ready for a single vertex buffer.
    pub fn vertex_buffer(&self) -> Vec<Vec3> {
        self.vertices
            .iter()
            .copied()
            .cycle()
            .take(self.vertices.len() * self.instance_count)
            .collect()
    }
}
