//! Surface-dependent state and its rebuild.
//!
//! The swapchain, the depth buffer sized to it and the graphics pipeline
//! targeting its format are built and destroyed as one group, together with
//! one render-finished semaphore per swapchain image. Only
//! [`SwapchainManager::rebuild`] touches them, and it drains the GPU first.

use std::sync::Arc;

use tracing::{debug, info};

use renderer_rhi::backend::tag;
use renderer_rhi::{
    Backend, CullMode, DEPTH_FORMAT, Extent2D, GpuImage, ImageDesc, ImageId, Owned,
    PipelineDesc, PipelineId, RenderTarget, SemaphoreId, ShaderCode, SwapchainId,
    SwapchainInfo,
};

use crate::error::RendererResult;

/// Result of a rebuild request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// The surface has no area. Nothing was touched; retry with a real extent.
    Deferred,
    Rebuilt,
}

/// One generation of surface-sized objects.
///
/// Fields drop in declaration order: pipeline, depth buffer, swapchain.
struct SurfaceState<B: Backend> {
    pipeline: Owned<B, tag::Pipeline>,
    depth: GpuImage<B>,
    swapchain: Owned<B, tag::Swapchain>,
    /// Indexed by swapchain image. The presentation engine may still hold an
    /// image's semaphore when another frame slot comes round.
    render_finished: Vec<Owned<B, tag::Semaphore>>,
    info: SwapchainInfo,
}

pub struct SwapchainManager<B: Backend> {
    backend: Arc<B>,
    vertex: ShaderCode,
    fragment: ShaderCode,
    cull_mode: CullMode,
    state: Option<SurfaceState<B>>,
    generation: u64,
}

impl<B: Backend> SwapchainManager<B> {
    /// A manager with nothing built yet. Call [`SwapchainManager::rebuild`].
    pub fn new(backend: &Arc<B>, vertex: ShaderCode, fragment: ShaderCode, cull_mode: CullMode) -> Self {
        Self {
            backend: Arc::clone(backend),
            vertex,
            fragment,
            cull_mode,
            state: None,
            generation: 0,
        }
    }

    /// Tear down and recreate every surface-dependent object for `extent`.
    pub fn rebuild(&mut self, extent: Extent2D) -> RendererResult<RebuildOutcome> {
        if extent.is_zero() {
            debug!("Surface has zero extent, deferring rebuild");
            return Ok(RebuildOutcome::Deferred);
        }

        self.backend.wait_idle()?;
        self.destroy();

        let (swapchain, info) = self.backend.create_swapchain(extent)?;
        let swapchain = Owned::new(&self.backend, swapchain);
        let depth = GpuImage::allocate(&self.backend, ImageDesc::depth(info.extent))?;
        let pipeline = self.backend.create_pipeline(&PipelineDesc {
            vertex: self.vertex.clone(),
            fragment: self.fragment.clone(),
            color_format: info.format,
            depth_format: DEPTH_FORMAT,
            cull_mode: self.cull_mode,
        })?;
        let pipeline = Owned::new(&self.backend, pipeline);
        let render_finished = (0..info.image_count)
            .map(|_| {
                self.backend
                    .create_semaphore()
                    .map(|semaphore| Owned::new(&self.backend, semaphore))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.generation += 1;
        info!(
            "Surface built: {}x{}, {} images, {:?} (generation {})",
            info.extent.width, info.extent.height, info.image_count, info.format, self.generation
        );
        self.state = Some(SurfaceState {
            pipeline,
            depth,
            swapchain,
            render_finished,
            info,
        });
        Ok(RebuildOutcome::Rebuilt)
    }

    fn destroy(&mut self) {
        if let Some(SurfaceState {
            pipeline,
            depth,
            swapchain,
            render_finished,
            ..
        }) = self.state.take()
        {
            drop(pipeline);
            drop(depth);
            drop(swapchain);
            drop(render_finished);
            debug!("Destroyed surface generation {}", self.generation);
        }
    }

    /// Number of completed builds.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn is_built(&self) -> bool {
        self.state.is_some()
    }

    /// Extent of the current swapchain, zero if none is built.
    pub fn extent(&self) -> Extent2D {
        self.state
            .as_ref()
            .map_or(Extent2D::new(0, 0), |s| s.info.extent)
    }

    pub fn info(&self) -> Option<SwapchainInfo> {
        self.state.as_ref().map(|s| s.info)
    }

    pub fn swapchain(&self) -> Option<SwapchainId> {
        self.state.as_ref().map(|s| s.swapchain.handle())
    }

    pub fn pipeline(&self) -> Option<PipelineId> {
        self.state.as_ref().map(|s| s.pipeline.handle())
    }

    pub fn depth(&self) -> Option<ImageId> {
        self.state.as_ref().map(|s| s.depth.id())
    }

    /// Semaphore the frame rendering into `image_index` signals and its
    /// present waits on.
    pub fn render_finished(&self, image_index: u32) -> Option<SemaphoreId> {
        self.state
            .as_ref()?
            .render_finished
            .get(image_index as usize)
            .map(Owned::handle)
    }

    /// Render target description for one swapchain image.
    pub fn target(&self, image_index: u32, clear_color: [f32; 4]) -> Option<RenderTarget> {
        self.state.as_ref().map(|s| RenderTarget {
            swapchain: s.swapchain.handle(),
            image_index,
            depth: s.depth.id(),
            extent: s.info.extent,
            clear_color,
        })
    }
}

impl<B: Backend> Drop for SwapchainManager<B> {
    fn drop(&mut self) {
        if self.state.is_some() {
            if let Err(e) = self.backend.wait_idle() {
                tracing::error!("Failed to wait for device idle: {}", e);
            }
            self.destroy();
        }
    }
}
