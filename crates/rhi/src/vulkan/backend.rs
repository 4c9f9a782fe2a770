//! [`Backend`] implementation on a real Vulkan device.

use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{info, warn};

use super::command::{
    CommandContext, FrameAttachments, ResolvedCommand, UploadContext, record_frame,
    transition_image,
};
use super::descriptor::{DescriptorWrite, Descriptors};
use super::device::Device;
use super::instance::{Instance, Surface};
use super::memory::{self, VkBuffer, VkImage};
use super::physical_device::select_physical_device;
use super::pipeline::{create_mesh_pipeline, create_pipeline_layout};
use super::swapchain::{PresentMode, Swapchain, create_swapchain, destroy_swapchain};
use crate::backend::{
    Backend, BindingSetId, BufferId, CommandContextId, FenceId, ImageId, PipelineId, SamplerId,
    SemaphoreId, SubmitDesc, SwapchainId, tag,
};
use crate::desc::{
    AcquireOutcome, Binding, BindingLayout, BufferDesc, DrawCommand, Extent2D, ImageDesc,
    PipelineDesc, PresentOutcome, RenderTarget, SwapchainInfo,
};
use crate::error::{RhiError, RhiResult};
use crate::handle::{Handle, ResourceArena};

/// Device-level settings chosen once at startup.
#[derive(Clone, Copy, Debug)]
pub struct VulkanBackendDesc {
    pub validation: bool,
    pub present_mode: PresentMode,
    /// Capacity of the shared descriptor pool.
    pub max_binding_sets: u32,
}

impl Default for VulkanBackendDesc {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            present_mode: PresentMode::Mailbox,
            max_binding_sets: 1024,
        }
    }
}

#[derive(Default)]
struct Objects {
    buffers: ResourceArena<tag::Buffer, VkBuffer>,
    images: ResourceArena<tag::Image, VkImage>,
    samplers: ResourceArena<tag::Sampler, vk::Sampler>,
    binding_sets: ResourceArena<tag::BindingSet, vk::DescriptorSet>,
    fences: ResourceArena<tag::Fence, vk::Fence>,
    semaphores: ResourceArena<tag::Semaphore, vk::Semaphore>,
    contexts: ResourceArena<tag::CommandContext, CommandContext>,
    swapchains: ResourceArena<tag::Swapchain, Swapchain>,
    pipelines: ResourceArena<tag::Pipeline, vk::Pipeline>,
}

fn stale<T>(kind: &'static str, handle: Handle<T>) -> RhiError {
    RhiError::StaleHandle {
        kind,
        handle: handle.to_string(),
    }
}

/// The Vulkan device behind the frame engine.
///
/// Fields drop in declaration order after [`Drop::drop`] has released every
/// object, so the device goes before the surface and the surface before the
/// instance.
pub struct VulkanBackend {
    objects: Mutex<Objects>,
    descriptors: Mutex<Option<Descriptors>>,
    upload: Mutex<Option<UploadContext>>,
    /// Serializes access to the graphics and present queues.
    queue: Mutex<()>,
    pipeline_layout: vk::PipelineLayout,
    swapchain_loader: ash::khr::swapchain::Device,
    present_mode: PresentMode,
    max_anisotropy: f32,
    device: Device,
    surface: Surface,
    instance: Instance,
}

// Safety: command buffers and queues are raw dispatchable handles, which is
// what keeps the auto traits off. Every use of them goes through the locks
// above.
unsafe impl Send for VulkanBackend {}
unsafe impl Sync for VulkanBackend {}

impl VulkanBackend {
    /// Bring up instance, surface, device and the fixed pipeline layout.
    ///
    /// The window behind `display` and `window` must outlive the backend.
    pub fn new(
        desc: &VulkanBackendDesc,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> RhiResult<Self> {
        let instance = Instance::new(desc.validation, display)?;
        let surface = Surface::new(&instance, display, window)?;
        let physical = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical)?;
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let descriptors = Descriptors::new(&device, desc.max_binding_sets)?;
        let pipeline_layout = match create_pipeline_layout(&device, descriptors.layouts()) {
            Ok(layout) => layout,
            Err(e) => {
                descriptors.destroy(&device);
                return Err(e);
            }
        };
        let upload = match UploadContext::new(&device) {
            Ok(upload) => upload,
            Err(e) => {
                unsafe { device.handle().destroy_pipeline_layout(pipeline_layout, None) };
                descriptors.destroy(&device);
                return Err(e);
            }
        };

        info!("Vulkan backend ready on '{}'", physical.device_name());
        Ok(Self {
            objects: Mutex::new(Objects::default()),
            descriptors: Mutex::new(Some(descriptors)),
            upload: Mutex::new(Some(upload)),
            queue: Mutex::new(()),
            pipeline_layout,
            swapchain_loader,
            present_mode: desc.present_mode,
            max_anisotropy: physical.properties.limits.max_sampler_anisotropy.min(16.0),
            device,
            surface,
            instance,
        })
    }

    pub fn has_validation(&self) -> bool {
        self.instance.has_validation()
    }

    fn submit_once(
        &self,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer) -> RhiResult<()>,
    ) -> RhiResult<()> {
        let upload = self.upload.lock();
        let upload = upload
            .as_ref()
            .ok_or_else(|| RhiError::InvalidAccess("backend is shutting down".to_string()))?;
        let _queue = self.queue.lock();
        upload.submit_once(&self.device, record)
    }
}

impl Backend for VulkanBackend {
    fn name(&self) -> &'static str {
        "vulkan"
    }

    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<BufferId> {
        let buffer = memory::create_buffer(&self.device, desc)?;
        Ok(self.objects.lock().buffers.insert(buffer))
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        if let Some(buffer) = self.objects.lock().buffers.remove(buffer) {
            memory::destroy_buffer(&self.device, buffer);
        }
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> RhiResult<()> {
        let mut objects = self.objects.lock();
        let target = objects
            .buffers
            .get_mut(buffer)
            .ok_or_else(|| stale("buffer", buffer))?;
        memory::write_buffer(target, offset, data)
    }

    fn copy_buffer(&self, src: BufferId, dst: BufferId, size: u64) -> RhiResult<()> {
        let (src, dst) = {
            let objects = self.objects.lock();
            (
                objects.buffers.get(src).ok_or_else(|| stale("buffer", src))?.buffer,
                objects.buffers.get(dst).ok_or_else(|| stale("buffer", dst))?.buffer,
            )
        };
        self.submit_once(|device, cb| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { device.cmd_copy_buffer(cb, src, dst, &[region]) };
            Ok(())
        })
    }

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<ImageId> {
        let image = memory::create_image(&self.device, desc)?;
        Ok(self.objects.lock().images.insert(image))
    }

    fn destroy_image(&self, image: ImageId) {
        if let Some(image) = self.objects.lock().images.remove(image) {
            memory::destroy_image(&self.device, image);
        }
    }

    fn copy_buffer_to_image(
        &self,
        src: BufferId,
        dst: ImageId,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        let (src, image, aspect) = {
            let objects = self.objects.lock();
            let src = objects.buffers.get(src).ok_or_else(|| stale("buffer", src))?.buffer;
            let image = objects.images.get(dst).ok_or_else(|| stale("image", dst))?;
            (src, image.image, image.aspect())
        };

        self.submit_once(|device, cb| {
            transition_image(
                device,
                cb,
                image,
                aspect,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: aspect,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                },
            };
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cb,
                    src,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            transition_image(
                device,
                cb,
                image,
                aspect,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })
    }

    fn create_sampler(&self) -> RhiResult<SamplerId> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(self.max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .max_lod(vk::LOD_CLAMP_NONE);
        let sampler = unsafe { self.device.handle().create_sampler(&create_info, None)? };
        Ok(self.objects.lock().samplers.insert(sampler))
    }

    fn destroy_sampler(&self, sampler: SamplerId) {
        if let Some(sampler) = self.objects.lock().samplers.remove(sampler) {
            unsafe { self.device.handle().destroy_sampler(sampler, None) };
        }
    }

    fn create_binding_set(
        &self,
        layout: BindingLayout,
        bindings: &[Binding],
    ) -> RhiResult<BindingSetId> {
        layout.validate(bindings)?;

        let writes = {
            let objects = self.objects.lock();
            bindings
                .iter()
                .map(|binding| match *binding {
                    Binding::Uniform(buffer) => objects
                        .buffers
                        .get(buffer)
                        .map(|b| DescriptorWrite::Uniform(b.buffer))
                        .ok_or_else(|| stale("buffer", buffer)),
                    Binding::Texture { image, sampler } => {
                        let view = objects
                            .images
                            .get(image)
                            .ok_or_else(|| stale("image", image))?
                            .view;
                        let sampler = *objects
                            .samplers
                            .get(sampler)
                            .ok_or_else(|| stale("sampler", sampler))?;
                        Ok(DescriptorWrite::Texture { view, sampler })
                    }
                })
                .collect::<RhiResult<Vec<_>>>()?
        };

        let set = {
            let descriptors = self.descriptors.lock();
            let descriptors = descriptors
                .as_ref()
                .ok_or_else(|| RhiError::InvalidAccess("backend is shutting down".to_string()))?;
            descriptors.allocate(&self.device, layout, &writes)?
        };
        Ok(self.objects.lock().binding_sets.insert(set))
    }

    fn destroy_binding_set(&self, set: BindingSetId) {
        let Some(set) = self.objects.lock().binding_sets.remove(set) else {
            return;
        };
        if let Some(descriptors) = self.descriptors.lock().as_ref()
            && let Err(e) = descriptors.free(&self.device, set)
        {
            warn!("Failed to free descriptor set: {}", e);
        }
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<FenceId> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            self.device
                .handle()
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?
        };
        Ok(self.objects.lock().fences.insert(fence))
    }

    fn destroy_fence(&self, fence: FenceId) {
        if let Some(fence) = self.objects.lock().fences.remove(fence) {
            unsafe { self.device.handle().destroy_fence(fence, None) };
        }
    }

    fn wait_fence(&self, fence: FenceId, timeout_ns: u64) -> RhiResult<()> {
        let fence = *self
            .objects
            .lock()
            .fences
            .get(fence)
            .ok_or_else(|| stale("fence", fence))?;
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[fence], true, timeout_ns)?
        };
        Ok(())
    }

    fn reset_fence(&self, fence: FenceId) -> RhiResult<()> {
        let fence = *self
            .objects
            .lock()
            .fences
            .get(fence)
            .ok_or_else(|| stale("fence", fence))?;
        unsafe { self.device.handle().reset_fences(&[fence])? };
        Ok(())
    }

    fn create_semaphore(&self) -> RhiResult<SemaphoreId> {
        let semaphore = unsafe {
            self.device
                .handle()
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        Ok(self.objects.lock().semaphores.insert(semaphore))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreId) {
        if let Some(semaphore) = self.objects.lock().semaphores.remove(semaphore) {
            unsafe { self.device.handle().destroy_semaphore(semaphore, None) };
        }
    }

    fn create_command_context(&self) -> RhiResult<CommandContextId> {
        let context = CommandContext::new(&self.device)?;
        Ok(self.objects.lock().contexts.insert(context))
    }

    fn destroy_command_context(&self, context: CommandContextId) {
        if let Some(context) = self.objects.lock().contexts.remove(context) {
            context.destroy(&self.device);
        }
    }

    fn record(
        &self,
        context: CommandContextId,
        target: &RenderTarget,
        commands: &[DrawCommand],
    ) -> RhiResult<()> {
        let (cb, attachments, resolved) = {
            let objects = self.objects.lock();
            let cb = objects
                .contexts
                .get(context)
                .ok_or_else(|| stale("command context", context))?
                .buffer();
            let swapchain = objects
                .swapchains
                .get(target.swapchain)
                .ok_or_else(|| stale("swapchain", target.swapchain))?;
            let index = target.image_index as usize;
            let (Some(&color_image), Some(&color_view)) =
                (swapchain.images.get(index), swapchain.views.get(index))
            else {
                return Err(RhiError::InvalidAccess(format!(
                    "image index {} out of range for swapchain {}",
                    target.image_index, target.swapchain
                )));
            };
            let depth = objects
                .images
                .get(target.depth)
                .ok_or_else(|| stale("image", target.depth))?;

            let attachments = FrameAttachments {
                color_image,
                color_view,
                depth_image: depth.image,
                depth_view: depth.view,
                extent: vk::Extent2D {
                    width: target.extent.width,
                    height: target.extent.height,
                },
                clear_color: target.clear_color,
            };

            let resolved = commands
                .iter()
                .map(|command| {
                    Ok(match *command {
                        DrawCommand::BindPipeline(pipeline) => ResolvedCommand::BindPipeline(
                            *objects
                                .pipelines
                                .get(pipeline)
                                .ok_or_else(|| stale("pipeline", pipeline))?,
                        ),
                        DrawCommand::BindSet { layout, set } => ResolvedCommand::BindSet {
                            layout,
                            set: *objects
                                .binding_sets
                                .get(set)
                                .ok_or_else(|| stale("binding set", set))?,
                        },
                        DrawCommand::BindVertexBuffer(buffer) => ResolvedCommand::BindVertexBuffer(
                            objects
                                .buffers
                                .get(buffer)
                                .ok_or_else(|| stale("buffer", buffer))?
                                .buffer,
                        ),
                        DrawCommand::BindIndexBuffer(buffer) => ResolvedCommand::BindIndexBuffer(
                            objects
                                .buffers
                                .get(buffer)
                                .ok_or_else(|| stale("buffer", buffer))?
                                .buffer,
                        ),
                        DrawCommand::DrawIndexed {
                            index_count,
                            first_index,
                        } => ResolvedCommand::DrawIndexed {
                            index_count,
                            first_index,
                        },
                    })
                })
                .collect::<RhiResult<Vec<_>>>()?;
            (cb, attachments, resolved)
        };

        record_frame(
            self.device.handle(),
            cb,
            &attachments,
            self.pipeline_layout,
            &resolved,
        )
    }

    fn submit(&self, submit: &SubmitDesc) -> RhiResult<()> {
        let (cb, wait, signal, fence) = {
            let objects = self.objects.lock();
            (
                objects
                    .contexts
                    .get(submit.context)
                    .ok_or_else(|| stale("command context", submit.context))?
                    .buffer(),
                *objects
                    .semaphores
                    .get(submit.wait)
                    .ok_or_else(|| stale("semaphore", submit.wait))?,
                *objects
                    .semaphores
                    .get(submit.signal)
                    .ok_or_else(|| stale("semaphore", submit.signal))?,
                *objects
                    .fences
                    .get(submit.fence)
                    .ok_or_else(|| stale("fence", submit.fence))?,
            )
        };

        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cb];
        let signal_semaphores = [signal];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let _queue = self.queue.lock();
        unsafe {
            self.device
                .handle()
                .queue_submit(self.device.graphics_queue(), &[submit_info], fence)?
        };
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        let _queue = self.queue.lock();
        self.device.wait_idle()
    }

    fn create_swapchain(&self, extent: Extent2D) -> RhiResult<(SwapchainId, SwapchainInfo)> {
        let swapchain = create_swapchain(
            &self.device,
            &self.swapchain_loader,
            &self.surface,
            extent,
            self.present_mode,
        )?;
        let info = swapchain.info;
        Ok((self.objects.lock().swapchains.insert(swapchain), info))
    }

    fn destroy_swapchain(&self, swapchain: SwapchainId) {
        if let Some(swapchain) = self.objects.lock().swapchains.remove(swapchain) {
            destroy_swapchain(&self.device, &self.swapchain_loader, swapchain);
        }
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> RhiResult<PipelineId> {
        let pipeline = create_mesh_pipeline(&self.device, self.pipeline_layout, desc)?;
        Ok(self.objects.lock().pipelines.insert(pipeline))
    }

    fn destroy_pipeline(&self, pipeline: PipelineId) {
        if let Some(pipeline) = self.objects.lock().pipelines.remove(pipeline) {
            unsafe { self.device.handle().destroy_pipeline(pipeline, None) };
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainId,
        signal: SemaphoreId,
    ) -> RhiResult<AcquireOutcome> {
        let (handle, semaphore) = {
            let objects = self.objects.lock();
            (
                objects
                    .swapchains
                    .get(swapchain)
                    .ok_or_else(|| stale("swapchain", swapchain))?
                    .handle,
                *objects
                    .semaphores
                    .get(signal)
                    .ok_or_else(|| stale("semaphore", signal))?,
            )
        };

        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(handle, u64::MAX, semaphore, vk::Fence::null())
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn present(
        &self,
        swapchain: SwapchainId,
        image_index: u32,
        wait: SemaphoreId,
    ) -> RhiResult<PresentOutcome> {
        let (handle, semaphore) = {
            let objects = self.objects.lock();
            (
                objects
                    .swapchains
                    .get(swapchain)
                    .ok_or_else(|| stale("swapchain", swapchain))?
                    .handle,
                *objects
                    .semaphores
                    .get(wait)
                    .ok_or_else(|| stale("semaphore", wait))?,
            )
        };

        let swapchains = [handle];
        let image_indices = [image_index];
        let wait_semaphores = [semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let _queue = self.queue.lock();
        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        };
        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle during shutdown: {}", e);
        }

        let device = &self.device;
        let objects = self.objects.get_mut();
        let live = objects.buffers.len()
            + objects.images.len()
            + objects.binding_sets.len()
            + objects.pipelines.len()
            + objects.swapchains.len();
        if live > 0 {
            warn!("{} GPU object(s) still alive at shutdown", live);
        }

        for pipeline in objects.pipelines.drain() {
            unsafe { device.handle().destroy_pipeline(pipeline, None) };
        }
        for swapchain in objects.swapchains.drain() {
            destroy_swapchain(device, &self.swapchain_loader, swapchain);
        }
        for context in objects.contexts.drain() {
            context.destroy(device);
        }
        for semaphore in objects.semaphores.drain() {
            unsafe { device.handle().destroy_semaphore(semaphore, None) };
        }
        for fence in objects.fences.drain() {
            unsafe { device.handle().destroy_fence(fence, None) };
        }
        // Sets go back with the pool.
        objects.binding_sets.drain();
        for sampler in objects.samplers.drain() {
            unsafe { device.handle().destroy_sampler(sampler, None) };
        }
        for image in objects.images.drain() {
            memory::destroy_image(device, image);
        }
        for buffer in objects.buffers.drain() {
            memory::destroy_buffer(device, buffer);
        }

        if let Some(upload) = self.upload.get_mut().take() {
            upload.destroy(device);
        }
        unsafe { device.handle().destroy_pipeline_layout(self.pipeline_layout, None) };
        if let Some(descriptors) = self.descriptors.get_mut().take() {
            descriptors.destroy(device);
        }
        info!("Vulkan backend destroyed");
    }
}
