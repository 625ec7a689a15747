// Scene, Static Mesh, and the per-mesh GPU residency state machine.
//
// The residency phase transition is ported from the original's
// `StaticMesh::updateGPUSceneResidency`: phases are recomputed once per
// frame and drive which GPU Scene Commands (§4.6) get emitted.

use crate::gpu_scene::{GPUSceneCommandLists, SceneItem};
use crate::free_list::FreeNumberList;
use crate::material::MaterialAsset;
use crate::math::{Aabb, Mat4};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GPUResidencyPhase {
    NotAllocated,
    Allocated,
    NeedToEvict,
    NeedToReallocate,
    NeedToUpdate,
}

impl Default for GPUResidencyPhase {
    fn default() -> Self {
        GPUResidencyPhase::NotAllocated
    }
}

#[derive(Debug, Default)]
pub struct GPUResidencyRecord {
    pub phase: GPUResidencyPhase,
    pub item_indices: Vec<u32>,
}

#[derive(Clone)]
pub struct StaticMeshSection {
    pub position_buffer_offset: u32,
    pub non_position_buffer_offset: u32,
    pub index_buffer_offset: u32,
    pub material: Option<Arc<MaterialAsset>>,
    pub local_bounds: Aabb,
}

pub struct StaticMesh {
    pub transform: Mat4,
    pub prev_transform: Mat4,
    pub active_lod: usize,
    pub lods: Vec<Vec<StaticMeshSection>>,
    pub b_lod_dirty: bool,
    transform_dirty_counter: u32,
    pub residency: GPUResidencyRecord,
    /// Snapshot of `is_transform_dirty()` taken at the top of the most
    /// recent `update_gpu_scene_residency()` call, before it clears the
    /// dirty state. Lets a `SceneProxy` built from the same frame report
    /// whether this mesh moved without racing the residency update.
    was_transform_dirty_last_update: bool,
}

impl StaticMesh {
    pub fn new(transform: Mat4) -> Self {
        Self {
            transform,
            prev_transform: transform,
            active_lod: 0,
            lods: vec![Vec::new()],
            b_lod_dirty: false,
            transform_dirty_counter: 0,
            residency: GPUResidencyRecord::default(),
            was_transform_dirty_last_update: false,
        }
    }

    pub fn add_section(&mut self, lod: usize, section: StaticMeshSection) {
        if self.lods.len() <= lod {
            self.lods.resize_with(lod + 1, Vec::new);
        }
        self.lods[lod].push(section);
    }

    pub fn sections(&self, lod: usize) -> &[StaticMeshSection] {
        &self.lods[lod]
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
        self.transform_dirty_counter += 1;
    }

    pub fn is_transform_dirty(&self) -> bool {
        self.transform_dirty_counter > 0 || self.prev_transform != self.transform
    }

    /// Whether this mesh's transform was dirty as of the start of its
    /// last `update_gpu_scene_residency()` call.
    pub fn was_transform_dirty_last_update(&self) -> bool {
        self.was_transform_dirty_last_update
    }

    fn mark_transform_clean(&mut self) {
        self.prev_transform = self.transform;
        self.transform_dirty_counter = 0;
    }

    /// Recomputes the residency phase and emits Alloc/Update/Evict
    /// commands into `commands`. Mirrors the original's pre-check
    /// (`bLodDirty` / `isTransformDirty` escalate an `Allocated` mesh
    /// before the switch runs) and its per-phase command emission.
    pub fn update_gpu_scene_residency(
        &mut self,
        allocator: &mut FreeNumberList,
        commands: &mut GPUSceneCommandLists,
    ) {
        let num_sections = self.lods[self.active_lod].len();
        self.was_transform_dirty_last_update = self.is_transform_dirty();

        if self.residency.phase == GPUResidencyPhase::Allocated {
            if self.b_lod_dirty {
                self.residency.phase = GPUResidencyPhase::NeedToReallocate;
            } else if self.is_transform_dirty() {
                self.residency.phase = GPUResidencyPhase::NeedToUpdate;
            }
        }

        match self.residency.phase {
            GPUResidencyPhase::NotAllocated => {
                self.residency.item_indices = Vec::with_capacity(num_sections);
                for i in 0..num_sections {
                    let item_ix = allocator.allocate() - 1;
                    self.residency.item_indices.push(item_ix);
                    commands.allocs.push(crate::gpu_scene::GPUSceneAllocCommand {
                        scene_item_index: item_ix,
                        scene_item: self.build_scene_item(i),
                    });
                }
                self.residency.phase = GPUResidencyPhase::Allocated;
            }
            GPUResidencyPhase::Allocated => {
                // Nothing to do: already resident and unchanged.
            }
            GPUResidencyPhase::NeedToEvict => {
                for &item_ix in &self.residency.item_indices {
                    allocator.deallocate(item_ix + 1);
                    commands.evicts.push(crate::gpu_scene::GPUSceneEvictCommand {
                        scene_item_index: item_ix,
                    });
                }
                self.residency.phase = GPUResidencyPhase::NotAllocated;
                self.residency.item_indices.clear();
            }
            GPUResidencyPhase::NeedToReallocate => {
                for &item_ix in &self.residency.item_indices {
                    allocator.deallocate(item_ix + 1);
                    commands.evicts.push(crate::gpu_scene::GPUSceneEvictCommand {
                        scene_item_index: item_ix,
                    });
                }
                self.residency.item_indices = Vec::with_capacity(num_sections);
                for i in 0..num_sections {
                    let item_ix = allocator.allocate() - 1;
                    self.residency.item_indices.push(item_ix);
                    commands.allocs.push(crate::gpu_scene::GPUSceneAllocCommand {
                        scene_item_index: item_ix,
                        scene_item: self.build_scene_item(i),
                    });
                }
                self.residency.phase = GPUResidencyPhase::Allocated;
                self.b_lod_dirty = false;
            }
            GPUResidencyPhase::NeedToUpdate => {
                for &item_ix in &self.residency.item_indices {
                    commands.updates.push(crate::gpu_scene::GPUSceneUpdateCommand {
                        scene_item_index: item_ix,
                        local_to_world: self.transform,
                        prev_local_to_world: self.prev_transform,
                    });
                }
                self.residency.phase = GPUResidencyPhase::Allocated;
            }
        }

        self.mark_transform_clean();
    }

    fn build_scene_item(&self, section_ix: usize) -> SceneItem {
        let section = &self.lods[self.active_lod][section_ix];
        SceneItem::new(
            self.transform,
            self.prev_transform,
            section.local_bounds,
            section.position_buffer_offset,
            section.non_position_buffer_offset,
            section.index_buffer_offset,
        )
    }
}

/// The application-owned world: static meshes plus lighting/sky state.
/// Mutated only by the application thread; a `SceneProxy` snapshot is
/// produced once per frame for the render thread to consume.
pub struct Scene {
    pub static_meshes: Vec<StaticMesh>,
    pub sun_direction: crate::math::Vec3,
    pub sun_illuminance: f32,
    pub skybox_texture: Option<crate::texture::TextureAsset>,
    item_allocator: FreeNumberList,
}

impl Scene {
    pub fn new(max_scene_items: u32) -> Self {
        Self {
            static_meshes: Vec::new(),
            sun_direction: crate::math::Vec3::new(0.0, -1.0, 0.0),
            sun_illuminance: 1.0,
            skybox_texture: None,
            item_allocator: FreeNumberList::new(max_scene_items),
        }
    }

    pub fn add_static_mesh(&mut self, mesh: StaticMesh) -> usize {
        self.static_meshes.push(mesh);
        self.static_meshes.len() - 1
    }

    /// Advances every mesh's residency phase and collects the frame's
    /// GPU Scene Commands, per §4.6 step 1.
    pub fn update_gpu_scene_residency(&mut self) -> GPUSceneCommandLists {
        let mut commands = GPUSceneCommandLists::default();
        for mesh in self.static_meshes.iter_mut() {
            mesh.update_gpu_scene_residency(&mut self.item_allocator, &mut commands);
        }
        commands
    }
}
