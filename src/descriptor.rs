// Descriptor heaps and the volatile descriptor helper used by render
// passes to bind a fresh, per-frame-recycled set of descriptor tables.

use crate::error::{CysealError, CysealResult};
use crate::free_list::FreeNumberList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorHeapType {
    CbvSrvUav,
    Sampler,
    Rtv,
    Dsv,
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorHeapDesc {
    pub heap_type: DescriptorHeapType,
    pub num_descriptors: u32,
    pub shader_visible: bool,
    pub node_mask: u32,
}

/// A CPU-addressable (and, if `shader_visible`, GPU-addressable) array
/// of descriptor slots, backed by a Free-Number Allocator so individual
/// slots can be released and reused.
pub struct DescriptorHeap {
    name: &'static str,
    desc: DescriptorHeapDesc,
    allocator: FreeNumberList,
}

impl DescriptorHeap {
    pub fn new(name: &'static str, desc: DescriptorHeapDesc) -> Self {
        Self {
            name,
            allocator: FreeNumberList::new(desc.num_descriptors),
            desc,
        }
    }

    pub fn allocate_descriptor_index(&mut self) -> CysealResult<u32> {
        let index = self.allocator.allocate();
        if index == 0 {
            return Err(CysealError::DescriptorHeapOverflow {
                name: self.name,
                used: self.desc.num_descriptors,
                capacity: self.desc.num_descriptors,
            });
        }
        // Allocator indices are 1-based; descriptor slots are 0-based.
        Ok(index - 1)
    }

    pub fn free_descriptor_index(&mut self, index: u32) -> bool {
        self.allocator.deallocate(index + 1)
    }

    pub fn capacity(&self) -> u32 {
        self.desc.num_descriptors
    }

    pub fn desc(&self) -> DescriptorHeapDesc {
        self.desc
    }
}

/// Monotonically assigns slot offsets within a single volatile heap
/// during one render pass's recording. Reset at the start of every pass.
pub struct DescriptorIndexTracker {
    next: u32,
    capacity: u32,
}

impl DescriptorIndexTracker {
    pub fn new(capacity: u32) -> Self {
        Self { next: 0, capacity }
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }

    pub fn allocate(&mut self, count: u32) -> CysealResult<u32> {
        if self.next + count > self.capacity {
            return Err(CysealError::DescriptorHeapOverflow {
                name: "volatile",
                used: self.next,
                capacity: self.capacity,
            });
        }
        let base = self.next;
        self.next += count;
        Ok(base)
    }
}

/// Per-render-pass facility holding one shader-visible heap per
/// swap-chain frame, grown on demand as passes request more slots.
pub struct VolatileDescriptorHelper {
    heaps: Vec<DescriptorHeap>,
    trackers: Vec<DescriptorIndexTracker>,
}

impl VolatileDescriptorHelper {
    pub fn new(frame_count: u32, initial_slots: u32) -> Self {
        let heaps = (0..frame_count)
            .map(|_| {
                DescriptorHeap::new(
                    "VolatileViewHeap",
                    DescriptorHeapDesc {
                        heap_type: DescriptorHeapType::CbvSrvUav,
                        num_descriptors: initial_slots,
                        shader_visible: true,
                        node_mask: 0,
                    },
                )
            })
            .collect();
        let trackers = (0..frame_count)
            .map(|_| DescriptorIndexTracker::new(initial_slots))
            .collect();
        Self { heaps, trackers }
    }

    /// Grows the frame's heap (and its slot tracker) if it does not
    /// already have room for `required_slots`.
    pub fn resize_descriptor_heap(&mut self, frame_ix: usize, required_slots: u32) {
        if self.heaps[frame_ix].capacity() >= required_slots {
            return;
        }
        self.heaps[frame_ix] = DescriptorHeap::new(
            "VolatileViewHeap",
            DescriptorHeapDesc {
                heap_type: DescriptorHeapType::CbvSrvUav,
                num_descriptors: required_slots,
                shader_visible: true,
                node_mask: 0,
            },
        );
        self.trackers[frame_ix] = DescriptorIndexTracker::new(required_slots);
    }

    pub fn get_descriptor_heap(&self, frame_ix: usize) -> &DescriptorHeap {
        &self.heaps[frame_ix]
    }

    pub fn get_tracker(&mut self, frame_ix: usize) -> &mut DescriptorIndexTracker {
        &mut self.trackers[frame_ix]
    }

    pub fn begin_pass(&mut self, frame_ix: usize) {
        self.trackers[frame_ix].reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_two_live_allocations_share_a_slot() {
        let mut heap = DescriptorHeap::new(
            "test",
            DescriptorHeapDesc {
                heap_type: DescriptorHeapType::CbvSrvUav,
                num_descriptors: 4,
                shader_visible: false,
                node_mask: 0,
            },
        );
        let a = heap.allocate_descriptor_index().unwrap();
        let b = heap.allocate_descriptor_index().unwrap();
        assert_ne!(a, b);

        assert!(heap.free_descriptor_index(a));
        let c = heap.allocate_descriptor_index().unwrap();
        assert_eq!(a, c);
        let _ = b;
    }

    #[test]
    fn overflow_is_reported() {
        let mut heap = DescriptorHeap::new(
            "test",
            DescriptorHeapDesc {
                heap_type: DescriptorHeapType::CbvSrvUav,
                num_descriptors: 1,
                shader_visible: false,
                node_mask: 0,
            },
        );
        assert!(heap.allocate_descriptor_index().is_ok());
        assert!(heap.allocate_descriptor_index().is_err());
    }

    #[test]
    fn volatile_helper_grows_on_demand() {
        let mut helper = VolatileDescriptorHelper::new(2, 4);
        helper.resize_descriptor_heap(0, 16);
        assert_eq!(helper.get_descriptor_heap(0).capacity(), 16);
        assert_eq!(helper.get_descriptor_heap(1).capacity(), 4);
    }
}
