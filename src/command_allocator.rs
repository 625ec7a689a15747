// Render command allocator lifecycle: one allocator per swap-chain buffer,
// marked Invalid on reset until the command list built from it has closed
// and its frame's fence has signaled.
//
// Instead of a binary fence per allocator, every allocator is stamped with
// the monotonic timeline point it was last submitted against, and
// `reset()` consults a single injected "has this point signaled" query.

use crate::error::{CysealError, CysealResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllocatorState {
    Valid,
    Invalid { awaited_point: u64 },
}

/// One slot of the N-deep frame ring. `frame_index` identifies its place
/// in the ring (`frame_index` mod `BufferCount` selects it each frame);
/// the allocator itself holds no GPU handle here, leaving that to the
/// owning `RenderDevice` backend.
pub struct RenderCommandAllocator {
    frame_index: u32,
    state: AllocatorState,
}

impl RenderCommandAllocator {
    pub fn new(frame_index: u32) -> Self {
        Self {
            frame_index,
            state: AllocatorState::Valid,
        }
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.state, AllocatorState::Valid)
    }

    /// Marks the allocator Invalid pending the device's observation that
    /// `submitted_point` has signaled on the timeline semaphore.
    pub fn mark_submitted(&mut self, submitted_point: u64) {
        self.state = AllocatorState::Invalid {
            awaited_point: submitted_point,
        };
    }

    /// Refuses to reset an Invalid allocator whose awaited timeline point
    /// has not yet been observed signaled by `last_signaled_point`.
    /// Matches the invariant in §3: "the render device refuses reset() on
    /// an Invalid allocator whose fence has not signaled."
    pub fn reset(&mut self, last_signaled_point: u64) -> CysealResult<()> {
        if let AllocatorState::Invalid { awaited_point } = self.state {
            if awaited_point > last_signaled_point {
                return Err(CysealError::AllocatorInFlight(self.frame_index));
            }
        }
        self.state = AllocatorState::Valid;
        Ok(())
    }
}

/// The full N-deep ring of command allocators, one per swap-chain buffer.
pub struct CommandAllocatorRing {
    allocators: Vec<RenderCommandAllocator>,
}

impl CommandAllocatorRing {
    pub fn new(buffer_count: u32) -> Self {
        Self {
            allocators: (0..buffer_count).map(RenderCommandAllocator::new).collect(),
        }
    }

    pub fn get_mut(&mut self, frame_ix: usize) -> &mut RenderCommandAllocator {
        &mut self.allocators[frame_ix]
    }

    pub fn get(&self, frame_ix: usize) -> &RenderCommandAllocator {
        &self.allocators[frame_ix]
    }

    pub fn buffer_count(&self) -> u32 {
        self.allocators.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_refuses_while_awaited_point_unsignaled() {
        let mut alloc = RenderCommandAllocator::new(0);
        alloc.mark_submitted(5);
        let result = alloc.reset(4);
        assert!(matches!(result, Err(CysealError::AllocatorInFlight(0))));
        assert!(!alloc.is_valid());
    }

    #[test]
    fn reset_succeeds_once_point_has_signaled() {
        let mut alloc = RenderCommandAllocator::new(1);
        alloc.mark_submitted(5);
        alloc.reset(5).unwrap();
        assert!(alloc.is_valid());
    }

    #[test]
    fn fresh_allocator_is_valid_and_resettable() {
        let mut alloc = RenderCommandAllocator::new(0);
        assert!(alloc.is_valid());
        alloc.reset(0).unwrap();
        assert!(alloc.is_valid());
    }

    #[test]
    fn ring_indexes_by_frame_mod_buffer_count() {
        let mut ring = CommandAllocatorRing::new(3);
        assert_eq!(ring.buffer_count(), 3);
        ring.get_mut(1).mark_submitted(10);
        assert!(!ring.get(1).is_valid());
        assert!(ring.get(0).is_valid());
    }
}
