// Application-scope configuration, built with the same builder shape the
// rest of the crate's call sites expect: `CreateInfo::builder()...build()`.

/// Which native graphics API a `RenderDevice` should bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsApi {
    Vulkan,
    Dx12,
}

impl Default for GraphicsApi {
    fn default() -> Self {
        GraphicsApi::Vulkan
    }
}

/// Capability tiers a caller may require up front. A device that cannot
/// satisfy a `required` tier fails initialization with
/// `CysealError::MissingFeatureTier` rather than silently degrading.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureTiers {
    pub raytracing: bool,
    pub variable_rate_shading: bool,
    pub mesh_shaders: bool,
    pub sampler_feedback: bool,
}

/// Opaque handle to a native window, supplied by the embedding
/// application. Window creation and event pumping are out of scope for
/// this crate; it only needs a handle to build a swap chain against.
#[derive(Debug, Clone, Copy)]
pub enum WindowHandle {
    /// No window is attached; the device renders off-screen only.
    Headless,
    /// A raw platform window handle, opaque to this crate.
    Raw(std::num::NonZeroUsize),
}

#[derive(Debug, Clone)]
pub struct CreateInfo {
    pub api: GraphicsApi,
    pub window: WindowHandle,
    pub width: u32,
    pub height: u32,
    pub swapchain_buffer_count: u32,
    pub feature_tiers: FeatureTiers,
    pub debug_layer: bool,
}

impl Default for CreateInfo {
    fn default() -> Self {
        Self {
            api: GraphicsApi::default(),
            window: WindowHandle::Headless,
            width: 1920,
            height: 1080,
            swapchain_buffer_count: 2,
            feature_tiers: FeatureTiers::default(),
            debug_layer: cfg!(debug_assertions),
        }
    }
}

impl CreateInfo {
    pub fn builder() -> CreateInfoBuilder {
        CreateInfoBuilder {
            info: CreateInfo::default(),
        }
    }
}

/// Builder for `CreateInfo`. Mirrors the fluent style used throughout
/// this crate's call sites (`.enable_x().y(value).build()`).
pub struct CreateInfoBuilder {
    info: CreateInfo,
}

impl CreateInfoBuilder {
    pub fn api(mut self, api: GraphicsApi) -> Self {
        self.info.api = api;
        self
    }

    pub fn window(mut self, window: WindowHandle) -> Self {
        self.info.window = window;
        self
    }

    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.info.width = width;
        self.info.height = height;
        self
    }

    pub fn swapchain_buffer_count(mut self, count: u32) -> Self {
        self.info.swapchain_buffer_count = count;
        self
    }

    pub fn require_raytracing(mut self) -> Self {
        self.info.feature_tiers.raytracing = true;
        self
    }

    pub fn debug_layer(mut self, enable: bool) -> Self {
        self.info.debug_layer = enable;
        self
    }

    pub fn build(self) -> CreateInfo {
        self.info
    }
}
