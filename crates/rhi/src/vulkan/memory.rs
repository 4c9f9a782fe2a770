//! Buffers and images backed by gpu-allocator.

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use super::device::Device;
use crate::desc::{BufferDesc, BufferUsage, Format, ImageDesc, ImageUsage, MemoryVisibility};
use crate::error::{RhiError, RhiResult};

fn buffer_usage_flags(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        BufferUsage::Uniform => {
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        }
        BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
    }
}

fn memory_location(visibility: MemoryVisibility) -> MemoryLocation {
    match visibility {
        MemoryVisibility::HostVisible => MemoryLocation::CpuToGpu,
        MemoryVisibility::DeviceLocal => MemoryLocation::GpuOnly,
    }
}

/// Tag the allocator error with what was being allocated.
fn allocation_error(error: gpu_allocator::AllocationError, what: &'static str, size: u64) -> RhiError {
    match RhiError::from(error) {
        RhiError::OutOfDeviceMemory { .. } => RhiError::OutOfDeviceMemory { what, size },
        other => other,
    }
}

pub struct VkBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub desc: BufferDesc,
}

pub fn create_buffer(device: &Device, desc: &BufferDesc) -> RhiResult<VkBuffer> {
    let buffer_info = vk::BufferCreateInfo::default()
        .size(desc.size)
        .usage(buffer_usage_flags(desc.usage))
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
    let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

    let allocation = device.allocator().lock().allocate(&AllocationCreateDesc {
        name: desc.usage.name(),
        requirements,
        location: memory_location(desc.visibility),
        linear: true,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    });
    let allocation = match allocation {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { device.handle().destroy_buffer(buffer, None) };
            return Err(allocation_error(e, desc.usage.name(), desc.size));
        }
    };

    if let Err(e) = unsafe {
        device
            .handle()
            .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
    } {
        free_allocation(device, allocation);
        unsafe { device.handle().destroy_buffer(buffer, None) };
        return Err(e.into());
    }

    debug!("Created {} buffer: {} bytes", desc.usage.name(), desc.size);
    Ok(VkBuffer {
        buffer,
        allocation: Some(allocation),
        desc: *desc,
    })
}

pub fn destroy_buffer(device: &Device, mut buffer: VkBuffer) {
    if let Some(allocation) = buffer.allocation.take() {
        free_allocation(device, allocation);
    }
    unsafe { device.handle().destroy_buffer(buffer.buffer, None) };
}

/// Copy `data` into a mapped buffer at `offset`.
pub fn write_buffer(buffer: &mut VkBuffer, offset: u64, data: &[u8]) -> RhiResult<()> {
    let mapped = buffer
        .allocation
        .as_mut()
        .and_then(|allocation| allocation.mapped_slice_mut())
        .ok_or_else(|| {
            RhiError::InvalidAccess(format!(
                "{} buffer is not host-visible",
                buffer.desc.usage.name()
            ))
        })?;

    let start = offset as usize;
    let target = mapped
        .get_mut(start..start + data.len())
        .ok_or_else(|| RhiError::InvalidAccess("write past end of mapping".to_string()))?;
    target.copy_from_slice(data);
    Ok(())
}

pub struct VkImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub allocation: Option<Allocation>,
    pub desc: ImageDesc,
}

impl VkImage {
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_for(self.desc.format)
    }
}

pub fn aspect_for(format: Format) -> vk::ImageAspectFlags {
    if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub fn create_image(device: &Device, desc: &ImageDesc) -> RhiResult<VkImage> {
    let usage = match desc.usage {
        ImageUsage::Sampled => vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        ImageUsage::DepthAttachment => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
    };
    let format = desc.format.to_vk();

    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: desc.extent.width,
            height: desc.extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = unsafe { device.handle().create_image(&image_info, None)? };
    let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

    let allocation = device.allocator().lock().allocate(&AllocationCreateDesc {
        name: "image",
        requirements,
        location: MemoryLocation::GpuOnly,
        linear: false,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    });
    let allocation = match allocation {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { device.handle().destroy_image(image, None) };
            return Err(allocation_error(e, "image", desc.byte_size()));
        }
    };

    let bound = unsafe {
        device
            .handle()
            .bind_image_memory(image, allocation.memory(), allocation.offset())
    };
    if let Err(e) = bound {
        free_allocation(device, allocation);
        unsafe { device.handle().destroy_image(image, None) };
        return Err(e.into());
    }

    let view = match create_view(device, image, format, aspect_for(desc.format)) {
        Ok(view) => view,
        Err(e) => {
            free_allocation(device, allocation);
            unsafe { device.handle().destroy_image(image, None) };
            return Err(e);
        }
    };

    debug!(
        "Created image {}x{} ({:?})",
        desc.extent.width, desc.extent.height, desc.format
    );
    Ok(VkImage {
        image,
        view,
        allocation: Some(allocation),
        desc: *desc,
    })
}

pub fn destroy_image(device: &Device, mut image: VkImage) {
    unsafe { device.handle().destroy_image_view(image.view, None) };
    if let Some(allocation) = image.allocation.take() {
        free_allocation(device, allocation);
    }
    unsafe { device.handle().destroy_image(image.image, None) };
}

pub fn create_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(subresource_range(aspect));
    Ok(unsafe { device.handle().create_image_view(&create_info, None)? })
}

pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn free_allocation(device: &Device, allocation: Allocation) {
    if let Err(e) = device.allocator().lock().free(allocation) {
        error!("Failed to free allocation: {:?}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_is_transfer_source_only() {
        assert_eq!(
            buffer_usage_flags(BufferUsage::Staging),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
        assert!(buffer_usage_flags(BufferUsage::Vertex).contains(vk::BufferUsageFlags::TRANSFER_DST));
    }

    #[test]
    fn test_visibility_maps_to_location() {
        assert_eq!(
            memory_location(MemoryVisibility::HostVisible),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            memory_location(MemoryVisibility::DeviceLocal),
            MemoryLocation::GpuOnly
        );
    }

    #[test]
    fn test_allocation_error_names_resource() {
        let err = allocation_error(gpu_allocator::AllocationError::OutOfMemory, "image", 64);
        assert!(matches!(
            err,
            RhiError::OutOfDeviceMemory {
                what: "image",
                size: 64
            }
        ));
    }
}
