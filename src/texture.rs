// Textures and the texture manager that owns system fallback textures
// and the global SRV/RTV/DSV/UAV heaps.

use crate::descriptor::{DescriptorHeap, DescriptorHeapDesc, DescriptorHeapType};
use crate::error::CysealResult;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    R32Float,
    D32Float,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureCreateParams {
    pub dimension: TextureDimension,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub array_layers: u32,
}

/// A GPU texture resource plus its descriptor-table slot, the part
/// shaders actually consume when addressing it bindlessly.
pub struct Texture {
    params: TextureCreateParams,
    srv_descriptor_index: u32,
    debug_name: String,
}

impl Texture {
    fn new(params: TextureCreateParams, srv_descriptor_index: u32, debug_name: impl Into<String>) -> Self {
        Self {
            params,
            srv_descriptor_index,
            debug_name: debug_name.into(),
        }
    }

    pub fn get_srv_descriptor_index(&self) -> u32 {
        self.srv_descriptor_index
    }

    pub fn width(&self) -> u32 {
        self.params.width
    }

    pub fn height(&self) -> u32 {
        self.params.height
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

/// Handles shared between the Scene and the render passes. Aliases the
/// `GPUResourceAsset<T>` pattern: an app-facing reference-counted handle
/// distinct from the raw RHI resource it wraps.
pub type TextureAsset = Arc<Texture>;

/// Owns the global SRV heap, the system fallback textures (used when a
/// material has no albedo texture bound), and the blue-noise texture.
pub struct TextureManager {
    global_srv_heap: DescriptorHeap,
    system_grey_2d: TextureAsset,
    system_white_2d: TextureAsset,
    system_black_2d: TextureAsset,
    system_red_2d: TextureAsset,
    system_green_2d: TextureAsset,
    system_blue_2d: TextureAsset,
    system_black_cube: TextureAsset,
    blue_noise_3d: TextureAsset,
}

const SYSTEM_TEXTURE_HEAP_CAPACITY: u32 = 4096;
const BLUE_NOISE_WIDTH: u32 = 128;
const BLUE_NOISE_HEIGHT: u32 = 128;
const BLUE_NOISE_DEPTH: u32 = 64;

impl TextureManager {
    /// `allocate_solid_srv` is the only GPU-touching callback needed to
    /// build the system textures; it is injected so this constructor
    /// stays testable without a live device (see CommandList's role in
    /// the real upload path).
    pub fn new(mut allocate_solid_srv: impl FnMut(&'static str, TextureCreateParams) -> CysealResult<u32>) -> CysealResult<Self> {
        let global_srv_heap = DescriptorHeap::new(
            "GlobalSRVHeap",
            DescriptorHeapDesc {
                heap_type: DescriptorHeapType::CbvSrvUav,
                num_descriptors: SYSTEM_TEXTURE_HEAP_CAPACITY,
                shader_visible: false,
                node_mask: 0,
            },
        );

        let solid_2d = TextureCreateParams {
            dimension: TextureDimension::D2,
            format: PixelFormat::Rgba8Unorm,
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            sample_count: 1,
            array_layers: 1,
        };

        let make = |name: &'static str,
                    params: TextureCreateParams,
                    allocate_solid_srv: &mut dyn FnMut(&'static str, TextureCreateParams) -> CysealResult<u32>|
         -> CysealResult<TextureAsset> {
            let srv = allocate_solid_srv(name, params)?;
            Ok(Arc::new(Texture::new(params, srv, name)))
        };

        let system_grey_2d = make("SystemTexture_Grey", solid_2d, &mut allocate_solid_srv)?;
        let system_white_2d = make("SystemTexture_White", solid_2d, &mut allocate_solid_srv)?;
        let system_black_2d = make("SystemTexture_Black", solid_2d, &mut allocate_solid_srv)?;
        let system_red_2d = make("SystemTexture_Red", solid_2d, &mut allocate_solid_srv)?;
        let system_green_2d = make("SystemTexture_Green", solid_2d, &mut allocate_solid_srv)?;
        let system_blue_2d = make("SystemTexture_Blue", solid_2d, &mut allocate_solid_srv)?;

        let cube = TextureCreateParams {
            dimension: TextureDimension::Cube,
            array_layers: 6,
            ..solid_2d
        };
        let system_black_cube = make("SystemTexture_BlackCube", cube, &mut allocate_solid_srv)?;

        let blue_noise_params = TextureCreateParams {
            dimension: TextureDimension::D3,
            format: PixelFormat::R32Float,
            width: BLUE_NOISE_WIDTH,
            height: BLUE_NOISE_HEIGHT,
            depth: BLUE_NOISE_DEPTH,
            mip_levels: 1,
            sample_count: 1,
            array_layers: 1,
        };
        let blue_noise_3d = make("BlueNoise3D", blue_noise_params, &mut allocate_solid_srv)?;

        Ok(Self {
            global_srv_heap,
            system_grey_2d,
            system_white_2d,
            system_black_2d,
            system_red_2d,
            system_green_2d,
            system_blue_2d,
            system_black_cube,
            blue_noise_3d,
        })
    }

    pub fn get_system_texture_grey_2d(&self) -> &TextureAsset {
        &self.system_grey_2d
    }

    pub fn get_system_texture_white_2d(&self) -> &TextureAsset {
        &self.system_white_2d
    }

    pub fn get_system_texture_black_2d(&self) -> &TextureAsset {
        &self.system_black_2d
    }

    pub fn get_system_texture_red_2d(&self) -> &TextureAsset {
        &self.system_red_2d
    }

    pub fn get_system_texture_green_2d(&self) -> &TextureAsset {
        &self.system_green_2d
    }

    pub fn get_system_texture_blue_2d(&self) -> &TextureAsset {
        &self.system_blue_2d
    }

    pub fn get_system_texture_black_cube(&self) -> &TextureAsset {
        &self.system_black_cube
    }

    pub fn get_blue_noise_3d(&self) -> &TextureAsset {
        &self.blue_noise_3d
    }

    pub fn global_srv_heap(&self) -> &DescriptorHeap {
        &self.global_srv_heap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_textures_get_distinct_srv_slots() {
        let mut next = 0u32;
        let mgr = TextureManager::new(|_, _| {
            let slot = next;
            next += 1;
            Ok(slot)
        })
        .unwrap();

        let slots = [
            mgr.get_system_texture_grey_2d().get_srv_descriptor_index(),
            mgr.get_system_texture_white_2d().get_srv_descriptor_index(),
            mgr.get_system_texture_black_2d().get_srv_descriptor_index(),
            mgr.get_system_texture_red_2d().get_srv_descriptor_index(),
            mgr.get_system_texture_green_2d().get_srv_descriptor_index(),
            mgr.get_system_texture_blue_2d().get_srv_descriptor_index(),
            mgr.get_system_texture_black_cube().get_srv_descriptor_index(),
            mgr.get_blue_noise_3d().get_srv_descriptor_index(),
        ];
        let mut sorted = slots.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), slots.len());
    }

    #[test]
    fn blue_noise_is_128x128x64() {
        let mgr = TextureManager::new(|_, _| Ok(0)).unwrap();
        let bn = mgr.get_blue_noise_3d();
        assert_eq!(bn.width(), 128);
        assert_eq!(bn.height(), 128);
    }
}
