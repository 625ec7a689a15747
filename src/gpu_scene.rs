// The GPU scene: a single structured buffer of per-draw-section scene
// items, kept resident by a free-number-allocated index and updated
// through a per-frame stream of Alloc/Update/Evict commands consumed by
// a compute dispatch.

use crate::math::{Aabb, Mat4};
use memoffset::offset_of;

pub const DEFAULT_MAX_SCENE_ELEMENTS: u32 = 256;

/// Shader-visible per-section record. Bit-exact per the external
/// interfaces contract (§6): this layout is authoritative over any
/// disagreeing field order seen in older revisions of the renderer this
/// was ported from.
#[repr(C)]
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct SceneItem {
    pub local_to_world: [f32; 16],
    pub prev_local_to_world: [f32; 16],
    pub local_min_bounds: [f32; 3],
    pub position_buffer_offset: u32,
    pub local_max_bounds: [f32; 3],
    pub non_position_buffer_offset: u32,
    pub index_buffer_offset: u32,
    pub flags: u32,
    pub pad: [u32; 2],
}

bitflags::bitflags! {
    pub struct SceneItemFlags: u32 {
        const IS_VALID = 0b0000_0001;
    }
}

impl SceneItem {
    pub fn new(
        local_to_world: Mat4,
        prev_local_to_world: Mat4,
        local_bounds: Aabb,
        position_buffer_offset: u32,
        non_position_buffer_offset: u32,
        index_buffer_offset: u32,
    ) -> Self {
        Self {
            local_to_world: mat4_to_array(local_to_world),
            prev_local_to_world: mat4_to_array(prev_local_to_world),
            local_min_bounds: [local_bounds.min.x, local_bounds.min.y, local_bounds.min.z],
            position_buffer_offset,
            local_max_bounds: [local_bounds.max.x, local_bounds.max.y, local_bounds.max.z],
            non_position_buffer_offset,
            index_buffer_offset,
            flags: SceneItemFlags::IS_VALID.bits(),
            pad: [0, 0],
        }
    }

    pub fn cleared() -> Self {
        Self {
            local_to_world: [0.0; 16],
            prev_local_to_world: [0.0; 16],
            local_min_bounds: [0.0; 3],
            position_buffer_offset: 0,
            local_max_bounds: [0.0; 3],
            non_position_buffer_offset: 0,
            index_buffer_offset: 0,
            flags: 0,
            pad: [0, 0],
        }
    }
}

fn mat4_to_array(m: Mat4) -> [f32; 16] {
    let cols: [[f32; 4]; 4] = m.into();
    let mut out = [0.0f32; 16];
    for c in 0..4 {
        for r in 0..4 {
            out[c * 4 + r] = cols[c][r];
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GPUSceneCommandType {
    Alloc = 0,
    Update = 1,
    Evict = 2,
}

/// Wire-format command consumed by the GPU scene compute shader. The
/// CPU-side pipeline works with the typed `GPUSceneAllocCommand` /
/// `GPUSceneUpdateCommand` / `GPUSceneEvictCommand` and packs them into
/// this shape just before upload.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GPUSceneCommand {
    pub command_type: u32,
    pub scene_item_index: u32,
    pub _pad: [u32; 2],
    pub payload: SceneItem,
}

pub struct GPUSceneAllocCommand {
    pub scene_item_index: u32,
    pub scene_item: SceneItem,
}

pub struct GPUSceneUpdateCommand {
    pub scene_item_index: u32,
    pub local_to_world: Mat4,
    pub prev_local_to_world: Mat4,
}

pub struct GPUSceneEvictCommand {
    pub scene_item_index: u32,
}

/// The three command vectors produced by walking the scene proxy's
/// static-mesh proxies once per frame (§4.6 step 1).
#[derive(Default)]
pub struct GPUSceneCommandLists {
    pub allocs: Vec<GPUSceneAllocCommand>,
    pub updates: Vec<GPUSceneUpdateCommand>,
    pub evicts: Vec<GPUSceneEvictCommand>,
}

impl GPUSceneCommandLists {
    pub fn len(&self) -> usize {
        self.allocs.len() + self.updates.len() + self.evicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Packs the three typed command vectors into the wire format the
    /// compute shader consumes, in Alloc, then Update, then Evict order.
    pub fn pack(&self) -> Vec<GPUSceneCommand> {
        let mut packed = Vec::with_capacity(self.len());
        for cmd in &self.allocs {
            packed.push(GPUSceneCommand {
                command_type: GPUSceneCommandType::Alloc as u32,
                scene_item_index: cmd.scene_item_index,
                _pad: [0, 0],
                payload: cmd.scene_item,
            });
        }
        for cmd in &self.updates {
            packed.push(GPUSceneCommand {
                command_type: GPUSceneCommandType::Update as u32,
                scene_item_index: cmd.scene_item_index,
                _pad: [0, 0],
                payload: SceneItem {
                    local_to_world: mat4_to_array(cmd.local_to_world),
                    prev_local_to_world: mat4_to_array(cmd.prev_local_to_world),
                    ..SceneItem::cleared()
                },
            });
        }
        for cmd in &self.evicts {
            packed.push(GPUSceneCommand {
                command_type: GPUSceneCommandType::Evict as u32,
                scene_item_index: cmd.scene_item_index,
                _pad: [0, 0],
                payload: SceneItem::cleared(),
            });
        }
        packed
    }
}

fn next_power_of_two(n: u32) -> u32 {
    if n <= 1 {
        1
    } else {
        n.next_power_of_two()
    }
}

/// CPU-side mirror of `gpuSceneBuffer`: applying a frame's commands to
/// this buffer is the pure-logic equivalent of the compute dispatch in
/// `renderGPUScene` step 5. The real render path performs this on the
/// GPU; this representation exists so the emission/apply contract is
/// directly testable (see the idempotence property in the testable
/// properties section).
pub struct GPUScene {
    items: Vec<SceneItem>,
    max_elements: u32,
}

impl GPUScene {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SCENE_ELEMENTS)
    }

    pub fn with_capacity(max_elements: u32) -> Self {
        Self {
            items: vec![SceneItem::cleared(); max_elements as usize],
            max_elements,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.max_elements
    }

    /// Grows the scene buffer to at least `required_elements`, rounding
    /// up to the next power of two, per §4.6 step 2's growth policy.
    pub fn ensure_capacity(&mut self, required_elements: u32) {
        if required_elements <= self.max_elements {
            return;
        }
        let new_capacity = next_power_of_two(required_elements);
        self.items.resize(new_capacity as usize, SceneItem::cleared());
        self.max_elements = new_capacity;
    }

    /// Applies a packed command stream to the scene buffer: the
    /// CPU-side equivalent of the GPU-scene compute shader's per-thread
    /// write (§4.6 step 5).
    pub fn apply_commands(&mut self, commands: &[GPUSceneCommand]) {
        for cmd in commands {
            let required = cmd.scene_item_index + 1;
            self.ensure_capacity(required);
            self.items[cmd.scene_item_index as usize] = cmd.payload;
        }
    }

    pub fn item(&self, index: u32) -> &SceneItem {
        &self.items[index as usize]
    }

    pub fn items(&self) -> &[SceneItem] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_item_layout_is_bit_exact() {
        assert_eq!(offset_of!(SceneItem, local_to_world), 0);
        assert_eq!(offset_of!(SceneItem, prev_local_to_world), 64);
        assert_eq!(offset_of!(SceneItem, local_min_bounds), 128);
        assert_eq!(offset_of!(SceneItem, position_buffer_offset), 140);
        assert_eq!(offset_of!(SceneItem, local_max_bounds), 144);
        assert_eq!(offset_of!(SceneItem, non_position_buffer_offset), 156);
        assert_eq!(offset_of!(SceneItem, index_buffer_offset), 160);
        assert_eq!(offset_of!(SceneItem, flags), 164);
        assert_eq!(offset_of!(SceneItem, pad), 168);
        assert_eq!(std::mem::size_of::<SceneItem>(), 176);
    }

    #[test]
    fn gpu_scene_command_layout_matches_contract() {
        assert_eq!(offset_of!(GPUSceneCommand, command_type), 0);
        assert_eq!(offset_of!(GPUSceneCommand, scene_item_index), 4);
        assert_eq!(offset_of!(GPUSceneCommand, payload), 16);
    }

    #[test]
    fn apply_commands_grows_buffer_to_power_of_two() {
        let mut scene = GPUScene::with_capacity(4);
        let cmd = GPUSceneCommand {
            command_type: GPUSceneCommandType::Alloc as u32,
            scene_item_index: 10,
            _pad: [0, 0],
            payload: SceneItem::cleared(),
        };
        scene.apply_commands(&[cmd]);
        assert_eq!(scene.capacity(), 16);
    }

    // Round trip named in the testable properties: encoding a transform
    // into a Scene Item and reading it back yields identical bits.
    #[test]
    fn scene_item_bincode_round_trip_is_bit_exact() {
        let aabb = Aabb::new(cgmath::Vector3::new(-1.0, -2.0, -3.0), cgmath::Vector3::new(1.0, 2.0, 3.0));
        let transform = cgmath::Matrix4::from_translation(cgmath::Vector3::new(5.0, 6.0, 7.0));
        let item = SceneItem::new(transform, transform, aabb, 10, 20, 30);

        let encoded = bincode::serialize(&item).unwrap();
        let decoded: SceneItem = bincode::deserialize(&encoded).unwrap();

        assert_eq!(decoded.local_to_world, item.local_to_world);
        assert_eq!(decoded.local_min_bounds, item.local_min_bounds);
        assert_eq!(decoded.position_buffer_offset, item.position_buffer_offset);
        assert_eq!(decoded.flags, item.flags);
    }

    #[test]
    fn idempotent_reapplication_is_a_no_op() {
        let mut scene = GPUScene::new();
        let cmd = GPUSceneCommand {
            command_type: GPUSceneCommandType::Alloc as u32,
            scene_item_index: 2,
            _pad: [0, 0],
            payload: SceneItem::cleared(),
        };
        scene.apply_commands(&[cmd]);
        let before: Vec<u8> = scene
            .items()
            .iter()
            .flat_map(|i| unsafe {
                std::slice::from_raw_parts(i as *const SceneItem as *const u8, std::mem::size_of::<SceneItem>())
                    .to_vec()
            })
            .collect();
        scene.apply_commands(&[cmd]);
        let after: Vec<u8> = scene
            .items()
            .iter()
            .flat_map(|i| unsafe {
                std::slice::from_raw_parts(i as *const SceneItem as *const u8, std::mem::size_of::<SceneItem>())
                    .to_vec()
            })
            .collect();
        assert_eq!(before, after);
    }
}
