// Buffers, and the vertex/index buffer pools suballocated out of them.
//
// A Buffer is a thin handle over a committed GPU resource; pool-backed
// buffers are views over a slice of the pool's single committed buffer
// rather than owning a resource of their own (see DESIGN.md).

use bitflags::bitflags;

bitflags! {
    pub struct BufferAccessFlags: u32 {
        const CBV         = 0b0000_0001;
        const SRV         = 0b0000_0010;
        const UAV         = 0b0000_0100;
        const CPU_WRITE   = 0b0000_1000;
        const COPY_SRC    = 0b0001_0000;
        const COPY_DST    = 0b0010_0000;
        const UAV_COUNTER = 0b0100_0000;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferCreateParams {
    pub size_in_bytes: u64,
    pub alignment: u64,
    pub access_flags: BufferAccessFlags,
}

/// A half-open byte range `[offset, offset + size)` inside a pool's
/// single committed buffer. Lives for the pool's entire lifetime: there
/// is no deallocation path (see the pool `#todo` below).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolItem {
    pub offset: u64,
    pub size: u64,
}

/// Shared suballocation logic for the vertex and index pools: a single
/// committed buffer with a monotonically increasing append cursor.
struct SuballocPool {
    name: &'static str,
    pool_size: u64,
    current_offset: u64,
    items: Vec<BufferPoolItem>,
}

impl SuballocPool {
    fn new(name: &'static str, pool_size: u64) -> Self {
        Self {
            name,
            pool_size,
            current_offset: 0,
            items: Vec::new(),
        }
    }

    /// Matches the original's exact out-of-memory check: a suballocation
    /// that would land exactly on the final byte of the pool is
    /// rejected, not just one that overflows it (`>=`, not `>`).
    fn suballocate(&mut self, size_in_bytes: u64) -> crate::error::CysealResult<BufferPoolItem> {
        if self.current_offset + size_in_bytes >= self.pool_size {
            return Err(crate::error::CysealError::PoolExhausted {
                name: self.name,
                requested: size_in_bytes,
                remaining: self.pool_size.saturating_sub(self.current_offset),
            });
        }

        let item = BufferPoolItem {
            offset: self.current_offset,
            size: size_in_bytes,
        };
        self.current_offset += size_in_bytes;
        self.items.push(item);
        Ok(item)
    }
}

/// Singleton pool backing every vertex buffer view in the scene.
// #todo: VertexBufferPoolItem implies a free list (see deallocate-less
// suballocate below) but none is implemented; the source this was
// ported from never built one either.
pub struct VertexBufferPool {
    inner: SuballocPool,
}

impl VertexBufferPool {
    pub fn new(pool_size: u64) -> Self {
        Self {
            inner: SuballocPool::new("VertexBufferPool", pool_size),
        }
    }

    pub fn suballocate(&mut self, size_in_bytes: u64) -> crate::error::CysealResult<BufferPoolItem> {
        self.inner.suballocate(size_in_bytes)
    }

    pub fn current_offset(&self) -> u64 {
        self.inner.current_offset
    }
}

/// Singleton pool backing every index buffer view in the scene.
pub struct IndexBufferPool {
    inner: SuballocPool,
}

impl IndexBufferPool {
    pub fn new(pool_size: u64) -> Self {
        Self {
            inner: SuballocPool::new("IndexBufferPool", pool_size),
        }
    }

    pub fn suballocate(&mut self, size_in_bytes: u64) -> crate::error::CysealResult<BufferPoolItem> {
        self.inner.suballocate(size_in_bytes)
    }

    pub fn current_offset(&self) -> u64 {
        self.inner.current_offset
    }
}
