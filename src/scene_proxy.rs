// Frame-local, render-thread-owned snapshot of the Scene.

use crate::gpu_scene::GPUSceneCommandLists;
use crate::math::{Mat4, Vec3};
use crate::scene::Scene;
use crate::texture::TextureAsset;

pub struct StaticMeshProxy {
    pub local_to_world: Mat4,
    pub prev_local_to_world: Mat4,
    pub b_transform_dirty: bool,
    pub b_lod_dirty: bool,
    pub num_sections_lod0: usize,
}

pub struct SceneProxy {
    pub static_meshes: Vec<StaticMeshProxy>,
    pub sun_direction: Vec3,
    pub sun_illuminance: f32,
    pub skybox_texture: Option<TextureAsset>,
    pub b_rebuild_gpu_scene: bool,
    pub b_rebuild_raytracing_scene: bool,
    pub total_mesh_sections_lod0: usize,
    pub gpu_scene_commands: GPUSceneCommandLists,
}

impl SceneProxy {
    /// Builds the frame-local snapshot: walks every static mesh,
    /// computing its residency phase transition and collecting the
    /// resulting GPU Scene Commands (§4.6 step 1), and records whether
    /// the mesh population itself changed since the last snapshot.
    pub fn capture(scene: &mut Scene, b_mesh_population_changed: bool) -> Self {
        let gpu_scene_commands = scene.update_gpu_scene_residency();

        let mut static_meshes = Vec::with_capacity(scene.static_meshes.len());
        let mut total_mesh_sections_lod0 = 0;
        for mesh in &scene.static_meshes {
            let num_sections_lod0 = mesh.sections(0).len();
            total_mesh_sections_lod0 += num_sections_lod0;
            static_meshes.push(StaticMeshProxy {
                local_to_world: mesh.transform,
                prev_local_to_world: mesh.prev_transform,
                b_transform_dirty: mesh.was_transform_dirty_last_update(),
                b_lod_dirty: mesh.b_lod_dirty,
                num_sections_lod0,
            });
        }

        Self {
            static_meshes,
            sun_direction: scene.sun_direction,
            sun_illuminance: scene.sun_illuminance,
            skybox_texture: scene.skybox_texture.clone(),
            b_rebuild_gpu_scene: b_mesh_population_changed,
            b_rebuild_raytracing_scene: b_mesh_population_changed,
            total_mesh_sections_lod0,
            gpu_scene_commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::identity;
    use crate::scene::{StaticMesh, StaticMeshSection};

    #[test]
    fn proxy_totals_lod0_sections_across_meshes() {
        let mut scene = Scene::new(64);
        let mut mesh = StaticMesh::new(identity());
        mesh.add_section(
            0,
            StaticMeshSection {
                position_buffer_offset: 0,
                non_position_buffer_offset: 0,
                index_buffer_offset: 0,
                material: None,
                local_bounds: crate::math::Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)),
            },
        );
        scene.add_static_mesh(mesh);

        let proxy = SceneProxy::capture(&mut scene, true);
        assert_eq!(proxy.total_mesh_sections_lod0, 1);
        assert!(proxy.b_rebuild_gpu_scene);
        assert_eq!(proxy.gpu_scene_commands.allocs.len(), 1);
    }

    #[test]
    fn proxy_reports_transform_dirty_for_the_frame_that_moved_it() {
        let mut scene = Scene::new(64);
        let mut mesh = StaticMesh::new(identity());
        mesh.add_section(0, section_at_origin());
        let ix = scene.add_static_mesh(mesh);

        // First capture allocates; a freshly-allocated mesh has no prior
        // transform write so it is not reported dirty.
        let proxy1 = SceneProxy::capture(&mut scene, true);
        assert!(!proxy1.static_meshes[0].b_transform_dirty);

        scene.static_meshes[ix].set_transform(cgmath::Matrix4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        let proxy2 = SceneProxy::capture(&mut scene, false);
        assert!(proxy2.static_meshes[0].b_transform_dirty);

        // The dirty flag does not stick around past the frame it was set.
        let proxy3 = SceneProxy::capture(&mut scene, false);
        assert!(!proxy3.static_meshes[0].b_transform_dirty);
    }

    fn section_at_origin() -> StaticMeshSection {
        StaticMeshSection {
            position_buffer_offset: 0,
            non_position_buffer_offset: 0,
            index_buffer_offset: 0,
            material: None,
            local_bounds: crate::math::Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)),
        }
    }
}
