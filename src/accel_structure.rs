// Acceleration structure manager: BLAS-per-mesh, one TLAS rebuilt from the
// active scene's instance transforms each frame a raytraced pass needs it.
//
// Feature-gated behind `raytracing`: the original targets hardware where
// `VK_KHR_acceleration_structure`/`VK_KHR_ray_tracing_pipeline` support is
// not guaranteed, so the trait surface is always defined (higher layers
// compile regardless of the feature) but the Vulkan implementation below
// only exists when the feature is enabled, per the capability-centric
// design in §9.

use crate::error::CysealResult;
use crate::math::Mat4;
use crate::render_device::ResourceHandle;

#[derive(Debug, Clone, Copy)]
pub struct BlasBuildParams {
    pub vertex_buffer: ResourceHandle,
    pub vertex_count: u32,
    pub index_buffer: ResourceHandle,
    pub index_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct TlasInstance {
    pub blas: ResourceHandle,
    pub transform: Mat4,
    pub instance_id: u32,
}

/// Capability surface every backend implements, mirroring `RenderDevice`'s
/// shape: a trait so higher layers (the scene renderer) never depend on a
/// concrete backend, compiled unconditionally so the rest of the crate
/// type-checks whether or not `raytracing` hardware support exists.
pub trait AccelerationStructureBackend {
    fn build_blas(&mut self, params: BlasBuildParams) -> CysealResult<ResourceHandle>;

    /// Rebuilds the TLAS from this frame's instance list. Called once per
    /// frame when any raytraced pass is active; a static scene with no
    /// raytraced passes never calls this.
    fn build_tlas(&mut self, instances: &[TlasInstance]) -> CysealResult<ResourceHandle>;

    fn destroy_blas(&mut self, handle: ResourceHandle);

    fn destroy_tlas(&mut self, handle: ResourceHandle);
}

/// Tracks one BLAS handle per static mesh and the most recently built TLAS
/// handle, rebuilding the TLAS lazily the first time a frame asks for it.
pub struct AccelerationStructureManager<B: AccelerationStructureBackend> {
    backend: B,
    blas_by_mesh: std::collections::HashMap<usize, ResourceHandle>,
    tlas: Option<ResourceHandle>,
}

impl<B: AccelerationStructureBackend> AccelerationStructureManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            blas_by_mesh: std::collections::HashMap::new(),
            tlas: None,
        }
    }

    pub fn blas_for_mesh(&mut self, mesh_index: usize, params: BlasBuildParams) -> CysealResult<ResourceHandle> {
        if let Some(&handle) = self.blas_by_mesh.get(&mesh_index) {
            return Ok(handle);
        }
        let handle = self.backend.build_blas(params)?;
        self.blas_by_mesh.insert(mesh_index, handle);
        Ok(handle)
    }

    /// Forces the next `rebuild_tlas_if_needed` call to rebuild, e.g.
    /// after the scene's mesh population changes (`bRebuildRaytracingScene`
    /// in the scene proxy).
    pub fn invalidate_tlas(&mut self) {
        self.tlas = None;
    }

    pub fn rebuild_tlas_if_needed(&mut self, instances: &[TlasInstance]) -> CysealResult<ResourceHandle> {
        if let Some(handle) = self.tlas {
            return Ok(handle);
        }
        let handle = self.backend.build_tlas(instances)?;
        self.tlas = Some(handle);
        Ok(handle)
    }

    pub fn remove_mesh(&mut self, mesh_index: usize) {
        if let Some(handle) = self.blas_by_mesh.remove(&mesh_index) {
            self.backend.destroy_blas(handle);
        }
    }
}

#[cfg(feature = "raytracing")]
pub mod vulkan {
    //! Vulkan `VK_KHR_acceleration_structure` backend. Requires the device
    //! capability probe (`VulkanCapabilityProbe::supports_acceleration_structure`,
    //! see `render_device::vulkan`) to have reported support; callers are
    //! expected to check `DeviceCapabilities::raytracing_tier` before
    //! constructing this.

    use super::*;
    use crate::error::CysealError;

    /// #todo-raytracing: BLAS/TLAS build via
    /// `ash::extensions::khr::AccelerationStructure` is not yet wired up;
    /// this defines the trait surface and a device handle to build against.
    pub struct VulkanAccelerationStructureBackend {
        device: ash::Device,
    }

    impl VulkanAccelerationStructureBackend {
        pub fn new(device: ash::Device) -> Self {
            Self { device }
        }
    }

    impl AccelerationStructureBackend for VulkanAccelerationStructureBackend {
        fn build_blas(&mut self, _params: BlasBuildParams) -> CysealResult<ResourceHandle> {
            let _ = &self.device;
            Err(CysealError::Other(anyhow::anyhow!(
                "BLAS build not yet implemented for the Vulkan acceleration structure backend"
            )))
        }

        fn build_tlas(&mut self, _instances: &[TlasInstance]) -> CysealResult<ResourceHandle> {
            Err(CysealError::Other(anyhow::anyhow!(
                "TLAS build not yet implemented for the Vulkan acceleration structure backend"
            )))
        }

        fn destroy_blas(&mut self, _handle: ResourceHandle) {}

        fn destroy_tlas(&mut self, _handle: ResourceHandle) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeBackend {
        next_handle: u64,
        build_blas_calls: Rc<RefCell<u32>>,
        build_tlas_calls: Rc<RefCell<u32>>,
    }

    impl AccelerationStructureBackend for FakeBackend {
        fn build_blas(&mut self, _params: BlasBuildParams) -> CysealResult<ResourceHandle> {
            *self.build_blas_calls.borrow_mut() += 1;
            self.next_handle += 1;
            Ok(ResourceHandle(self.next_handle))
        }

        fn build_tlas(&mut self, _instances: &[TlasInstance]) -> CysealResult<ResourceHandle> {
            *self.build_tlas_calls.borrow_mut() += 1;
            self.next_handle += 1;
            Ok(ResourceHandle(self.next_handle))
        }

        fn destroy_blas(&mut self, _handle: ResourceHandle) {}
        fn destroy_tlas(&mut self, _handle: ResourceHandle) {}
    }

    fn blas_params() -> BlasBuildParams {
        BlasBuildParams {
            vertex_buffer: ResourceHandle(1),
            vertex_count: 3,
            index_buffer: ResourceHandle(2),
            index_count: 3,
        }
    }

    #[test]
    fn blas_is_built_once_per_mesh_and_cached() {
        let calls = Rc::new(RefCell::new(0));
        let backend = FakeBackend {
            build_blas_calls: calls.clone(),
            ..Default::default()
        };
        let mut mgr = AccelerationStructureManager::new(backend);

        let first = mgr.blas_for_mesh(0, blas_params()).unwrap();
        let second = mgr.blas_for_mesh(0, blas_params()).unwrap();
        assert_eq!(first, second);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn tlas_rebuilds_only_after_invalidation() {
        let calls = Rc::new(RefCell::new(0));
        let backend = FakeBackend {
            build_tlas_calls: calls.clone(),
            ..Default::default()
        };
        let mut mgr = AccelerationStructureManager::new(backend);

        let instances = vec![TlasInstance {
            blas: ResourceHandle(1),
            transform: crate::math::identity(),
            instance_id: 0,
        }];

        mgr.rebuild_tlas_if_needed(&instances).unwrap();
        mgr.rebuild_tlas_if_needed(&instances).unwrap();
        assert_eq!(*calls.borrow(), 1);

        mgr.invalidate_tlas();
        mgr.rebuild_tlas_if_needed(&instances).unwrap();
        assert_eq!(*calls.borrow(), 2);
    }
}
