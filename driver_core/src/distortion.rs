//! Distortion meshes handed to the host compositor.

use crate::host_interfaces::{XrtDistortionMesh, XrtDistortionModel, XrtHmdParts};

pub const DEFAULT_MESH_RESOLUTION: u32 = 64;

/// Red, green and blue.
pub const NUM_UV_CHANNELS: u32 = 3;

/// Floats per vertex: position followed by one UV pair per channel.
pub const VERTEX_STRIDE: u32 = 2 + 2 * NUM_UV_CHANNELS;

/// Maps a point of a view, in `[0, 1]` on both axes, to the sample position of each channel.
pub type ComputeDistortion = fn(view: usize, u: f32, v: f32) -> [[f32; 2]; NUM_UV_CHANNELS as usize];

/// No lens correction.
pub fn compute_distortion_none(_view: usize, u: f32, v: f32) -> [[f32; 2]; NUM_UV_CHANNELS as usize] {
    [[u, v]; NUM_UV_CHANNELS as usize]
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistortionMesh {
    vertices: Vec<f32>,
    indices: Vec<u32>,
    index_counts: [u32; 2],
    index_offsets: [u32; 2],
}

impl DistortionMesh {
    /// Samples `compute` on a `resolution`×`resolution` grid of cells for both views. Each view
    /// is one triangle strip, rows joined by degenerate triangles.
    pub fn fill_in_compute(resolution: u32, compute: ComputeDistortion) -> Self {
        let resolution = resolution.max(1);
        let side = resolution + 1;
        let per_view = side * side;

        let mut mesh = DistortionMesh {
            vertices: Vec::with_capacity((2 * per_view * VERTEX_STRIDE) as usize),
            ..Default::default()
        };

        for view in 0..2usize {
            for row in 0..side {
                for col in 0..side {
                    let u = col as f32 / resolution as f32;
                    let v = row as f32 / resolution as f32;
                    mesh.vertices.push(u * 2.0 - 1.0);
                    mesh.vertices.push(v * 2.0 - 1.0);
                    for [cu, cv] in compute(view, u, v) {
                        mesh.vertices.push(cu);
                        mesh.vertices.push(cv);
                    }
                }
            }

            let base = view as u32 * per_view;
            mesh.index_offsets[view] = mesh.indices.len() as u32;
            for row in 0..resolution {
                if row > 0 {
                    // Degenerate link from the previous row.
                    let last = *mesh.indices.last().unwrap_or(&base);
                    mesh.indices.push(last);
                    mesh.indices.push(base + row * side);
                }
                for col in 0..side {
                    mesh.indices.push(base + row * side + col);
                    mesh.indices.push(base + (row + 1) * side + col);
                }
            }
            mesh.index_counts[view] = mesh.indices.len() as u32 - mesh.index_offsets[view];
        }

        mesh
    }

    pub fn none() -> Self {
        Self::fill_in_compute(DEFAULT_MESH_RESOLUTION, compute_distortion_none)
    }

    pub fn num_vertices(&self) -> u32 {
        self.vertices.len() as u32 / VERTEX_STRIDE
    }

    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Borrowed layout for the host. Valid while `self` is alive and unmodified.
    pub fn as_raw(&self) -> XrtDistortionMesh {
        XrtDistortionMesh {
            vertices: self.vertices.as_ptr(),
            stride: VERTEX_STRIDE * std::mem::size_of::<f32>() as u32,
            num_vertices: self.num_vertices(),
            num_uv_channels: NUM_UV_CHANNELS,
            indices: self.indices.as_ptr(),
            index_counts: self.index_counts,
            index_offsets: self.index_offsets,
            index_count_total: self.indices.len() as u32,
        }
    }
}

/// Gives `parts` a pass-through mesh when it prefers no distortion model. Returns the mesh that
/// backs the pointers now stored in `parts`.
pub fn setup_mesh_none(parts: &mut XrtHmdParts) -> Option<DistortionMesh> {
    if parts.distortion.preferred != XrtDistortionModel::NONE {
        return None;
    }
    let mesh = DistortionMesh::none();
    parts.distortion.models |= XrtDistortionModel::MESHUV;
    parts.distortion.mesh = mesh.as_raw();
    Some(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_uvs_match_positions() {
        let mesh = DistortionMesh::fill_in_compute(2, compute_distortion_none);
        assert_eq!(mesh.num_vertices(), 2 * 9);

        for vertex in mesh.vertices().chunks(VERTEX_STRIDE as usize) {
            let (x, y) = (vertex[0], vertex[1]);
            for uv in vertex[2..].chunks(2) {
                assert_eq!(uv[0] * 2.0 - 1.0, x);
                assert_eq!(uv[1] * 2.0 - 1.0, y);
            }
        }
    }

    #[test]
    fn strips_cover_both_views() {
        let mesh = DistortionMesh::fill_in_compute(2, compute_distortion_none);
        // Two rows of three columns (12 indices) plus one degenerate link, per view.
        assert_eq!(mesh.index_counts, [14, 14]);
        assert_eq!(mesh.index_offsets, [0, 14]);

        let right = &mesh.indices()[14..];
        assert!(right.iter().all(|&i| (9..18).contains(&i)));
        assert_eq!(&mesh.indices()[..4], &[0, 3, 1, 4]);
    }

    #[test]
    fn mesh_only_set_up_without_preferred_model() {
        let mut parts = XrtHmdParts::default();
        parts.distortion.preferred = XrtDistortionModel::NONE;
        let mesh = setup_mesh_none(&mut parts).unwrap();
        assert_eq!(parts.distortion.mesh.num_vertices, mesh.num_vertices());
        assert_eq!(parts.distortion.mesh.vertices, mesh.vertices().as_ptr());
        assert!(parts.distortion.models.contains(XrtDistortionModel::MESHUV));

        let mut parts = XrtHmdParts::default();
        parts.distortion.preferred = XrtDistortionModel::COMPUTE;
        assert!(setup_mesh_none(&mut parts).is_none());
    }
}
