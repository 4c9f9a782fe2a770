//! Swapchain creation and the surface-format choices behind it.

use ash::vk;
use tracing::{debug, info, warn};

use super::device::Device;
use super::instance::Surface;
use super::memory::create_view;
use crate::desc::{Extent2D, Format, SwapchainInfo};
use crate::error::{RhiError, RhiResult};

/// Preferred presentation mode. FIFO is the fallback when the preference is
/// unavailable, since every surface supports it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentMode {
    #[default]
    Mailbox,
    Fifo,
    Immediate,
}

impl PresentMode {
    fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// A swapchain with one view per image.
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub info: SwapchainInfo,
}

pub fn create_swapchain(
    device: &Device,
    loader: &ash::khr::swapchain::Device,
    surface: &Surface,
    requested: Extent2D,
    preference: PresentMode,
) -> RhiResult<Swapchain> {
    let physical_device = device.physical_device();
    let (capabilities, formats, present_modes) = unsafe {
        let surface_loader = surface.loader();
        (
            surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface.handle())?,
            surface_loader.get_physical_device_surface_formats(physical_device, surface.handle())?,
            surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface.handle())?,
        )
    };

    let surface_format = choose_surface_format(&formats)
        .ok_or_else(|| RhiError::Swapchain("surface reports no formats".to_string()))?;
    let format = Format::from_vk(surface_format.format).ok_or_else(|| {
        RhiError::Swapchain(format!(
            "unsupported surface format {:?}",
            surface_format.format
        ))
    })?;
    let present_mode = choose_present_mode(&present_modes, preference);
    let extent = choose_extent(&capabilities, requested);
    if extent.width == 0 || extent.height == 0 {
        return Err(RhiError::Swapchain(format!(
            "surface extent is {}x{}",
            extent.width, extent.height
        )));
    }
    let image_count = determine_image_count(&capabilities);

    let queue_family_indices = [device.graphics_family(), device.present_family()];
    let (sharing_mode, family_indices) = if device.graphics_family() != device.present_family() {
        (vk::SharingMode::CONCURRENT, &queue_family_indices[..])
    } else {
        (vk::SharingMode::EXCLUSIVE, &[][..])
    };

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface.handle())
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(family_indices)
        .pre_transform(capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true);

    let handle = unsafe { loader.create_swapchain(&create_info, None)? };
    let images = match unsafe { loader.get_swapchain_images(handle) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { loader.destroy_swapchain(handle, None) };
            return Err(e.into());
        }
    };

    let mut views = Vec::with_capacity(images.len());
    for &image in &images {
        match create_view(device, image, surface_format.format, vk::ImageAspectFlags::COLOR) {
            Ok(view) => views.push(view),
            Err(e) => {
                let partial = Swapchain {
                    handle,
                    images,
                    views,
                    info: SwapchainInfo {
                        extent: Extent2D::new(extent.width, extent.height),
                        format,
                        image_count: 0,
                    },
                };
                destroy_swapchain(device, loader, partial);
                return Err(e);
            }
        }
    }

    info!(
        "Swapchain created: {}x{}, {:?}, {:?}, {} images",
        extent.width,
        extent.height,
        surface_format.format,
        present_mode,
        images.len()
    );

    let image_count = images.len() as u32;
    Ok(Swapchain {
        handle,
        images,
        views,
        info: SwapchainInfo {
            extent: Extent2D::new(extent.width, extent.height),
            format,
            image_count,
        },
    })
}

/// Views first, then the swapchain, which owns its images.
pub fn destroy_swapchain(device: &Device, loader: &ash::khr::swapchain::Device, swapchain: Swapchain) {
    for view in swapchain.views {
        unsafe { device.handle().destroy_image_view(view, None) };
    }
    unsafe { loader.destroy_swapchain(swapchain.handle, None) };
    debug!(
        "Swapchain destroyed (was {}x{})",
        swapchain.info.extent.width, swapchain.info.extent.height
    );
}

/// B8G8R8A8_SRGB, then B8G8R8A8_UNORM, then whatever comes first.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let find = |format: vk::Format| {
        formats
            .iter()
            .copied()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        return Some(format);
    }
    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format: B8G8R8A8_UNORM");
        return Some(format);
    }
    let first = formats.first().copied();
    if let Some(format) = first {
        warn!("Using first available surface format: {:?}", format.format);
    }
    first
}

fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preference: PresentMode,
) -> vk::PresentModeKHR {
    let preferred = preference.to_vk();
    if present_modes.contains(&preferred) {
        return preferred;
    }
    debug!("{:?} unavailable, using FIFO", preference);
    vk::PresentModeKHR::FIFO
}

/// The surface's current extent when it defines one, otherwise the request
/// clamped to the surface limits.
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when there is one.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}
