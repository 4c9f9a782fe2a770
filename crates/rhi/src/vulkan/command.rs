//! Command pools, one-shot transfers and frame recording.

use ash::vk;
use tracing::debug;

use super::device::Device;
use super::memory::subresource_range;
use crate::desc::BindingLayout;
use crate::error::{RhiError, RhiResult};

/// A command pool with the single primary buffer a frame slot records into.
pub struct CommandContext {
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
}

impl CommandContext {
    pub fn new(device: &Device) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_family())
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffer = match unsafe { device.handle().allocate_command_buffers(&allocate_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.handle().destroy_command_pool(pool, None) };
                return Err(e.into());
            }
        };

        Ok(Self { pool, buffer })
    }

    #[inline]
    pub fn buffer(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Destroying the pool frees its buffer.
    pub fn destroy(self, device: &Device) {
        unsafe { device.handle().destroy_command_pool(self.pool, None) };
    }
}

/// Records, submits and waits for blocking transfer work.
pub struct UploadContext {
    context: CommandContext,
    fence: vk::Fence,
}

impl UploadContext {
    pub fn new(device: &Device) -> RhiResult<Self> {
        let context = CommandContext::new(device)?;
        let fence = unsafe {
            device
                .handle()
                .create_fence(&vk::FenceCreateInfo::default(), None)
        };
        let fence = match fence {
            Ok(fence) => fence,
            Err(e) => {
                context.destroy(device);
                return Err(e.into());
            }
        };
        Ok(Self { context, fence })
    }

    /// Record `record` into a one-time buffer, submit it on the graphics
    /// queue and block until it completes.
    pub fn submit_once(
        &self,
        device: &Device,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer) -> RhiResult<()>,
    ) -> RhiResult<()> {
        let cb = self.context.buffer();
        let handle = device.handle();
        unsafe {
            handle.reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())?;
            handle.begin_command_buffer(
                cb,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
        }
        record(handle, cb)?;

        let buffers = [cb];
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);
        unsafe {
            handle.end_command_buffer(cb)?;
            // Frames still sampling the destination must finish first.
            handle.queue_wait_idle(device.graphics_queue())?;
            handle.queue_submit(device.graphics_queue(), &[submit], self.fence)?;
            handle.wait_for_fences(&[self.fence], true, u64::MAX)?;
            handle.reset_fences(&[self.fence])?;
        }
        Ok(())
    }

    pub fn destroy(self, device: &Device) {
        unsafe { device.handle().destroy_fence(self.fence, None) };
        self.context.destroy(device);
    }
}

/// Stage and access masks for a supported layout transition.
struct BarrierMasks {
    src_stage: vk::PipelineStageFlags,
    src_access: vk::AccessFlags,
    dst_stage: vk::PipelineStageFlags,
    dst_access: vk::AccessFlags,
}

fn barrier_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Option<BarrierMasks> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let depth_stages = S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS;
    let masks = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => BarrierMasks {
            src_stage: S::TOP_OF_PIPE,
            src_access: A::empty(),
            dst_stage: S::TRANSFER,
            dst_access: A::TRANSFER_WRITE,
        },
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => BarrierMasks {
            src_stage: S::TRANSFER,
            src_access: A::TRANSFER_WRITE,
            dst_stage: S::FRAGMENT_SHADER,
            dst_access: A::SHADER_READ,
        },
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => BarrierMasks {
            src_stage: S::COLOR_ATTACHMENT_OUTPUT,
            src_access: A::empty(),
            dst_stage: S::COLOR_ATTACHMENT_OUTPUT,
            dst_access: A::COLOR_ATTACHMENT_WRITE,
        },
        (L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL) => BarrierMasks {
            src_stage: depth_stages,
            src_access: A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_stage: depth_stages,
            dst_access: A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
        },
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => BarrierMasks {
            src_stage: S::COLOR_ATTACHMENT_OUTPUT,
            src_access: A::COLOR_ATTACHMENT_WRITE,
            dst_stage: S::BOTTOM_OF_PIPE,
            dst_access: A::empty(),
        },
        _ => return None,
    };
    Some(masks)
}

/// Record a layout transition for a single-level, single-layer image.
pub fn transition_image(
    device: &ash::Device,
    cb: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<()> {
    let masks = barrier_masks(old, new).ok_or_else(|| {
        RhiError::InvalidAccess(format!("unsupported layout transition {:?} -> {:?}", old, new))
    })?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(aspect))
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cb,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
    Ok(())
}

/// Everything a frame renders into, resolved to raw handles.
pub struct FrameAttachments {
    pub color_image: vk::Image,
    pub color_view: vk::ImageView,
    pub depth_image: vk::Image,
    pub depth_view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

/// A draw command with its handles resolved.
#[derive(Clone, Copy, Debug)]
pub enum ResolvedCommand {
    BindPipeline(vk::Pipeline),
    BindSet {
        layout: BindingLayout,
        set: vk::DescriptorSet,
    },
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    DrawIndexed {
        index_count: u32,
        first_index: u32,
    },
}

/// Reset `cb` and record one frame with dynamic rendering.
pub fn record_frame(
    device: &ash::Device,
    cb: vk::CommandBuffer,
    attachments: &FrameAttachments,
    pipeline_layout: vk::PipelineLayout,
    commands: &[ResolvedCommand],
) -> RhiResult<()> {
    unsafe {
        device.reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())?;
        device.begin_command_buffer(cb, &vk::CommandBufferBeginInfo::default())?;
    }

    transition_image(
        device,
        cb,
        attachments.color_image,
        vk::ImageAspectFlags::COLOR,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    )?;
    transition_image(
        device,
        cb,
        attachments.depth_image,
        vk::ImageAspectFlags::DEPTH,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
    )?;

    let color_attachments = [vk::RenderingAttachmentInfo::default()
        .image_view(attachments.color_view)
        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(vk::ClearValue {
            color: vk::ClearColorValue {
                float32: attachments.clear_color,
            },
        })];
    let depth_attachment = vk::RenderingAttachmentInfo::default()
        .image_view(attachments.depth_view)
        .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .clear_value(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        });

    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: attachments.extent,
    };
    let rendering_info = vk::RenderingInfo::default()
        .render_area(render_area)
        .layer_count(1)
        .color_attachments(&color_attachments)
        .depth_attachment(&depth_attachment);

    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: attachments.extent.width as f32,
        height: attachments.extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };

    unsafe {
        device.cmd_begin_rendering(cb, &rendering_info);
        device.cmd_set_viewport(cb, 0, &[viewport]);
        device.cmd_set_scissor(cb, 0, &[render_area]);

        for command in commands {
            match *command {
                ResolvedCommand::BindPipeline(pipeline) => {
                    device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline);
                }
                ResolvedCommand::BindSet { layout, set } => {
                    device.cmd_bind_descriptor_sets(
                        cb,
                        vk::PipelineBindPoint::GRAPHICS,
                        pipeline_layout,
                        layout.set_index(),
                        &[set],
                        &[],
                    );
                }
                ResolvedCommand::BindVertexBuffer(buffer) => {
                    device.cmd_bind_vertex_buffers(cb, 0, &[buffer], &[0]);
                }
                ResolvedCommand::BindIndexBuffer(buffer) => {
                    device.cmd_bind_index_buffer(cb, buffer, 0, vk::IndexType::UINT32);
                }
                ResolvedCommand::DrawIndexed {
                    index_count,
                    first_index,
                } => {
                    device.cmd_draw_indexed(cb, index_count, 1, first_index, 0, 0);
                }
            }
        }

        device.cmd_end_rendering(cb);
    }

    transition_image(
        device,
        cb,
        attachments.color_image,
        vk::ImageAspectFlags::COLOR,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
    )?;

    unsafe { device.end_command_buffer(cb)? };
    debug!("Recorded frame with {} command(s)", commands.len());
    Ok(())
}
