// Material assets and the per-frame bindless material table.

use crate::descriptor::{DescriptorHeap, DescriptorHeapDesc, DescriptorHeapType};
use crate::texture::TextureAsset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialId {
    DefaultLit,
    Transparent,
}

#[derive(Clone)]
pub struct MaterialAsset {
    pub material_id: MaterialId,
    pub albedo_multiplier: [f32; 3],
    pub roughness: f32,
    pub emission: [f32; 3],
    pub metalness: f32,
    pub index_of_refraction: f32,
    pub transmittance: [f32; 3],
    pub double_sided: bool,
    pub albedo_texture: Option<TextureAsset>,
}

impl Default for MaterialAsset {
    fn default() -> Self {
        Self {
            material_id: MaterialId::DefaultLit,
            albedo_multiplier: [1.0, 1.0, 1.0],
            roughness: 1.0,
            emission: [0.0, 0.0, 0.0],
            metalness: 0.0,
            index_of_refraction: 1.5,
            transmittance: [0.0, 0.0, 0.0],
            double_sided: false,
            albedo_texture: None,
        }
    }
}

/// Shader-visible per-material record, produced fresh every frame for
/// every material currently in use. Bit-exact layout per the external
/// interfaces contract; aligned to 256 bytes for constant-buffer use.
#[repr(C, align(256))]
#[derive(Debug, Clone, Copy)]
pub struct MaterialConstants {
    pub albedo_multiplier: [f32; 3],
    pub roughness: f32,
    pub albedo_texture_index: u32,
    pub emission: [f32; 3],
    pub metal_mask: f32,
    pub material_id: u32,
    pub index_of_refraction: f32,
    pub _pad0: u32,
    pub transmittance: [f32; 3],
    pub _pad1: u32,
}

impl MaterialConstants {
    fn from_material(material: Option<&MaterialAsset>, albedo_texture_index: u32) -> Self {
        let m = material.cloned().unwrap_or_default();
        Self {
            albedo_multiplier: m.albedo_multiplier,
            roughness: m.roughness,
            albedo_texture_index,
            emission: m.emission,
            metal_mask: m.metalness,
            material_id: m.material_id as u32,
            index_of_refraction: m.index_of_refraction,
            _pad0: 0,
            transmittance: m.transmittance,
            _pad1: 0,
        }
    }
}

/// Two parallel per-frame heaps: one CBV per material in use, one SRV
/// per distinct albedo texture slot in use. Rebuilt from scratch every
/// frame; duplicate materials produce duplicate entries (see §4.7).
pub struct BindlessMaterialTable {
    cbv_heap: DescriptorHeap,
    srv_heap: DescriptorHeap,
    constants: Vec<MaterialConstants>,
    /// Source SRV descriptor index copied into `srv_heap` at each slot,
    /// in upload order; `srv_sources[i]` is the source for slot `i`.
    srv_sources: Vec<u32>,
    srv_count: u32,
}

impl BindlessMaterialTable {
    pub fn new(max_cbv_count: u32, max_srv_count: u32) -> Self {
        Self {
            cbv_heap: DescriptorHeap::new(
                "MaterialCBVHeap",
                DescriptorHeapDesc {
                    heap_type: DescriptorHeapType::CbvSrvUav,
                    num_descriptors: max_cbv_count,
                    shader_visible: false,
                    node_mask: 0,
                },
            ),
            srv_heap: DescriptorHeap::new(
                "MaterialSRVHeap",
                DescriptorHeapDesc {
                    heap_type: DescriptorHeapType::CbvSrvUav,
                    num_descriptors: max_srv_count,
                    shader_visible: false,
                    node_mask: 0,
                },
            ),
            constants: Vec::new(),
            srv_sources: Vec::new(),
            srv_count: 0,
        }
    }

    /// Resets the running counters and uploads one CBV + SRV pair per
    /// `(material, albedo srv slot in the source heap)` entry, in the
    /// order given. `fallback_srv_slot` stands in for the system-grey
    /// texture when a section has no material or albedo texture.
    pub fn upload_frame(&mut self, sections: &[Option<&MaterialAsset>], fallback_srv_slot: u32) {
        self.constants.clear();
        self.srv_sources.clear();
        self.srv_count = 0;

        for material in sections {
            let albedo_slot = material
                .and_then(|m| m.albedo_texture.as_ref())
                .map(|t| t.get_srv_descriptor_index())
                .unwrap_or(fallback_srv_slot);

            let slot_in_table = self.srv_count;
            self.srv_sources.push(albedo_slot);
            self.constants
                .push(MaterialConstants::from_material(*material, slot_in_table));
            self.srv_count += 1;
        }
    }

    pub fn material_constants(&self) -> &[MaterialConstants] {
        &self.constants
    }

    pub fn cbv_count(&self) -> u32 {
        self.constants.len() as u32
    }

    pub fn srv_count(&self) -> u32 {
        self.srv_count
    }

    /// The source SRV descriptor index copied into `srv_heap` at each
    /// slot this frame, in upload order (§4.7 step 2): `srv_sources()[i]`
    /// is the descriptor a command recorder must copy into `srv_heap`'s
    /// slot `i` via `RenderDevice::copy_descriptors`.
    pub fn srv_sources(&self) -> &[u32] {
        &self.srv_sources
    }

    /// Lays out [CBVs | SRVs] contiguously starting at `dest_base` in a
    /// pass's volatile heap, returning (cbv_base, srv_base, next_free).
    pub fn copy_material_descriptors(&self, dest_base: u32) -> (u32, u32, u32, u32, u32) {
        let cbv_base = dest_base;
        let cbv_count = self.cbv_count();
        let srv_base = cbv_base + cbv_count;
        let srv_count = self.srv_count();
        let next_available = srv_base + srv_count;
        (cbv_base, cbv_count, srv_base, srv_count, next_available)
    }

    pub fn cbv_heap(&self) -> &DescriptorHeap {
        &self.cbv_heap
    }

    pub fn srv_heap(&self) -> &DescriptorHeap {
        &self.srv_heap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Scenario 6: two sections, each with a distinct albedo texture.
    #[test]
    fn bindless_layout_matches_upload_order() {
        let mut table = BindlessMaterialTable::new(16, 16);
        let mat_a = MaterialAsset::default();
        let mat_b = MaterialAsset::default();

        table.upload_frame(&[Some(&mat_a), Some(&mat_b)], 0);

        assert_eq!(table.cbv_count(), 2);
        assert_eq!(table.srv_count(), 2);
        assert_eq!(table.material_constants()[0].albedo_texture_index, 0);
        assert_eq!(table.material_constants()[1].albedo_texture_index, 1);

        let (cbv_base, cbv_count, srv_base, srv_count, next) = table.copy_material_descriptors(100);
        assert_eq!(cbv_base, 100);
        assert_eq!(cbv_count, 2);
        assert_eq!(srv_base, 102);
        assert_eq!(srv_count, 2);
        assert_eq!(next, 104);
    }

    #[test]
    fn srv_sources_records_the_copied_descriptor_per_slot() {
        let mut next = 10u32;
        let texture_manager = crate::texture::TextureManager::new(|_, _| {
            let slot = next;
            next += 1;
            Ok(slot)
        })
        .unwrap();

        let mut mat_a = MaterialAsset::default();
        mat_a.albedo_texture = Some(texture_manager.get_system_texture_white_2d().clone());
        let mut mat_b = MaterialAsset::default();
        mat_b.albedo_texture = Some(texture_manager.get_system_texture_black_2d().clone());

        let mut table = BindlessMaterialTable::new(16, 16);
        table.upload_frame(&[Some(&mat_a), Some(&mat_b), None], 999);

        let white_ix = texture_manager.get_system_texture_white_2d().get_srv_descriptor_index();
        let black_ix = texture_manager.get_system_texture_black_2d().get_srv_descriptor_index();
        assert_eq!(table.srv_sources(), &[white_ix, black_ix, 999]);
    }

    #[test]
    fn missing_material_falls_back_to_defaults() {
        let mut table = BindlessMaterialTable::new(4, 4);
        table.upload_frame(&[None], 7);
        assert_eq!(table.material_constants()[0].roughness, 1.0);
    }

    #[test]
    fn material_constants_size_is_256_aligned() {
        assert_eq!(std::mem::align_of::<MaterialConstants>(), 256);
    }
}
