//! Owned GPU resources.
//!
//! [`GpuBuffer`] and [`GpuImage`] pair one allocation with one buffer or
//! image handle and release both together when dropped. [`Owned`] does the
//! same for the backend objects that carry no memory of their own (samplers,
//! binding sets, fences, ...).
//!
//! Dropping any of these destroys the object immediately. Owners must make
//! sure no in-flight frame still references it; the frame scheduler does this
//! by waiting for the device to go idle before tearing anything down.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::backend::{Backend, BufferId, ImageId, tag};
use crate::desc::{BufferDesc, BufferUsage, ImageDesc, MemoryVisibility};
use crate::error::{RhiError, RhiResult};
use crate::handle::Handle;

/// A buffer plus its memory.
pub struct GpuBuffer<B: Backend> {
    backend: Arc<B>,
    id: BufferId,
    desc: BufferDesc,
}

impl<B: Backend> GpuBuffer<B> {
    /// Allocate `size` bytes.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidAccess`] for a zero size
    /// - [`RhiError::OutOfDeviceMemory`] when the device cannot satisfy the request
    pub fn allocate(
        backend: &Arc<B>,
        size: u64,
        usage: BufferUsage,
        visibility: MemoryVisibility,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidAccess(format!(
                "cannot allocate an empty {} buffer",
                usage.name()
            )));
        }

        let desc = BufferDesc {
            size,
            usage,
            visibility,
        };
        let id = backend.create_buffer(&desc)?;
        debug!("Allocated {} buffer {} ({} bytes, {:?})", usage.name(), id, size, visibility);

        Ok(Self {
            backend: Arc::clone(backend),
            id,
            desc,
        })
    }

    /// Allocate a host-visible buffer holding `data`.
    pub fn with_data(backend: &Arc<B>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::allocate(
            backend,
            data.len() as u64,
            usage,
            MemoryVisibility::HostVisible,
        )?;
        buffer.upload(data)?;
        Ok(buffer)
    }

    /// Allocate a device-local buffer and fill it through a temporary staging buffer.
    pub fn device_local_with_data(
        backend: &Arc<B>,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let staging = Self::with_data(backend, BufferUsage::Staging, data)?;
        let buffer = Self::allocate(
            backend,
            data.len() as u64,
            usage,
            MemoryVisibility::DeviceLocal,
        )?;
        buffer.device_copy(&staging, data.len() as u64)?;
        Ok(buffer)
    }

    /// Host write at offset zero.
    pub fn upload(&self, data: &[u8]) -> RhiResult<()> {
        self.upload_at(0, data)
    }

    /// Host write at `offset`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidAccess`] if the buffer is not host-visible or the
    /// write would run past its end.
    pub fn upload_at(&self, offset: u64, data: &[u8]) -> RhiResult<()> {
        if !self.desc.visibility.is_host_visible() {
            return Err(RhiError::InvalidAccess(format!(
                "{} buffer {} is not host-visible",
                self.desc.usage.name(),
                self.id
            )));
        }
        let end = offset.checked_add(data.len() as u64);
        if end.is_none_or(|end| end > self.desc.size) {
            return Err(RhiError::InvalidAccess(format!(
                "write of {} bytes at offset {} exceeds buffer {} of {} bytes",
                data.len(),
                offset,
                self.id,
                self.desc.size
            )));
        }
        self.backend.write_buffer(self.id, offset, data)
    }

    /// Copy `size` bytes from `source` into this buffer on the device.
    ///
    /// Records and submits a one-shot transfer and blocks until it finishes.
    pub fn device_copy(&self, source: &GpuBuffer<B>, size: u64) -> RhiResult<()> {
        if size > source.size() || size > self.size() {
            return Err(RhiError::InvalidAccess(format!(
                "copy of {} bytes from {} ({} bytes) into {} ({} bytes)",
                size,
                source.id,
                source.size(),
                self.id,
                self.size()
            )));
        }
        self.backend.copy_buffer(source.id, self.id, size)
    }

    /// Copy this buffer into `target` as a `width`×`height` image.
    ///
    /// Transitions the image for transfer and back to shader-read, then blocks
    /// until the copy finishes.
    pub fn as_image_copy(&self, target: &GpuImage<B>, width: u32, height: u32) -> RhiResult<()> {
        let needed = width as u64 * height as u64 * target.desc().format.bytes_per_pixel() as u64;
        if needed > self.size() {
            return Err(RhiError::InvalidAccess(format!(
                "{}x{} image needs {} bytes, buffer {} holds {}",
                width,
                height,
                needed,
                self.id,
                self.size()
            )));
        }
        self.backend
            .copy_buffer_to_image(self.id, target.id(), width, height)
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.desc.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.desc.usage
    }

    #[inline]
    pub fn visibility(&self) -> MemoryVisibility {
        self.desc.visibility
    }
}

impl<B: Backend> Drop for GpuBuffer<B> {
    fn drop(&mut self) {
        self.backend.destroy_buffer(self.id);
    }
}

impl<B: Backend> fmt::Debug for GpuBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish()
    }
}

/// An image plus its memory and view.
pub struct GpuImage<B: Backend> {
    backend: Arc<B>,
    id: ImageId,
    desc: ImageDesc,
}

impl<B: Backend> GpuImage<B> {
    pub fn allocate(backend: &Arc<B>, desc: ImageDesc) -> RhiResult<Self> {
        if desc.extent.is_zero() {
            return Err(RhiError::InvalidAccess(format!(
                "cannot allocate a {}x{} image",
                desc.extent.width, desc.extent.height
            )));
        }
        let id = backend.create_image(&desc)?;
        debug!(
            "Allocated image {} ({}x{}, {:?})",
            id, desc.extent.width, desc.extent.height, desc.format
        );
        Ok(Self {
            backend: Arc::clone(backend),
            id,
            desc,
        })
    }

    #[inline]
    pub fn id(&self) -> ImageId {
        self.id
    }

    #[inline]
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }
}

impl<B: Backend> Drop for GpuImage<B> {
    fn drop(&mut self) {
        self.backend.destroy_image(self.id);
    }
}

impl<B: Backend> fmt::Debug for GpuImage<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuImage")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish()
    }
}

/// Backend object kinds that [`Owned`] knows how to destroy.
pub trait BackendObject: Sized {
    fn destroy<B: Backend>(backend: &B, handle: Handle<Self>);
}

macro_rules! backend_object {
    ($($tag:ident => $destroy:ident),* $(,)?) => {
        $(
            impl BackendObject for tag::$tag {
                fn destroy<B: Backend>(backend: &B, handle: Handle<Self>) {
                    backend.$destroy(handle);
                }
            }
        )*
    };
}

backend_object! {
    Sampler => destroy_sampler,
    BindingSet => destroy_binding_set,
    Fence => destroy_fence,
    Semaphore => destroy_semaphore,
    CommandContext => destroy_command_context,
    Swapchain => destroy_swapchain,
    Pipeline => destroy_pipeline,
}

/// Destroys a backend object when dropped.
pub struct Owned<B: Backend, T: BackendObject> {
    backend: Arc<B>,
    handle: Handle<T>,
}

impl<B: Backend, T: BackendObject> Owned<B, T> {
    /// Take ownership of `handle`, which must have been created by `backend`.
    pub fn new(backend: &Arc<B>, handle: Handle<T>) -> Self {
        Self {
            backend: Arc::clone(backend),
            handle,
        }
    }

    #[inline]
    pub fn handle(&self) -> Handle<T> {
        self.handle
    }
}

impl<B: Backend, T: BackendObject> Drop for Owned<B, T> {
    fn drop(&mut self) {
        T::destroy(&*self.backend, self.handle);
    }
}

impl<B: Backend, T: BackendObject> fmt::Debug for Owned<B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Owned({})", self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::ImageLayout;
    use crate::headless::HeadlessBackend;

    #[test]
    fn test_upload_to_device_local_is_invalid_access() {
        let backend = Arc::new(HeadlessBackend::new());
        let buffer = GpuBuffer::allocate(
            &backend,
            64,
            BufferUsage::Vertex,
            MemoryVisibility::DeviceLocal,
        )
        .unwrap();

        let err = buffer.upload(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, RhiError::InvalidAccess(_)));
    }

    #[test]
    fn test_upload_out_of_bounds_is_invalid_access() {
        let backend = Arc::new(HeadlessBackend::new());
        let buffer = GpuBuffer::allocate(
            &backend,
            8,
            BufferUsage::Uniform,
            MemoryVisibility::HostVisible,
        )
        .unwrap();

        assert!(buffer.upload_at(4, &[1, 2, 3, 4]).is_ok());
        assert!(matches!(
            buffer.upload_at(5, &[1, 2, 3, 4]),
            Err(RhiError::InvalidAccess(_))
        ));
    }

    #[test]
    fn test_zero_size_rejected() {
        let backend = Arc::new(HeadlessBackend::new());
        let result = GpuBuffer::allocate(
            &backend,
            0,
            BufferUsage::Uniform,
            MemoryVisibility::HostVisible,
        );
        assert!(matches!(result, Err(RhiError::InvalidAccess(_))));
    }

    #[test]
    fn test_allocation_failure_is_out_of_device_memory() {
        let backend = Arc::new(HeadlessBackend::with_memory_budget(1024));
        let result = GpuBuffer::allocate(
            &backend,
            4096,
            BufferUsage::Vertex,
            MemoryVisibility::DeviceLocal,
        );
        assert!(matches!(result, Err(RhiError::OutOfDeviceMemory { .. })));
    }

    #[test]
    fn test_device_copy_moves_bytes() {
        let backend = Arc::new(HeadlessBackend::new());
        let data: Vec<u8> = (0..32).collect();
        let buffer =
            GpuBuffer::device_local_with_data(&backend, BufferUsage::Vertex, &data).unwrap();

        assert_eq!(buffer.visibility(), MemoryVisibility::DeviceLocal);
        assert_eq!(backend.buffer_contents(buffer.id()).unwrap(), data);
        assert_eq!(backend.stats().one_shot_submits, 1);
    }

    #[test]
    fn test_as_image_copy_transitions_layouts() {
        let backend = Arc::new(HeadlessBackend::new());
        let staging = GpuBuffer::with_data(&backend, BufferUsage::Staging, &[7u8; 16]).unwrap();
        let image = GpuImage::allocate(&backend, ImageDesc::sampled_rgba(2, 2)).unwrap();

        staging.as_image_copy(&image, 2, 2).unwrap();

        assert_eq!(backend.image_pixels(image.id()).unwrap(), vec![7u8; 16]);
        assert_eq!(
            backend.image_layout_history(image.id()).unwrap(),
            vec![
                ImageLayout::Undefined,
                ImageLayout::TransferDst,
                ImageLayout::ShaderReadOnly
            ]
        );
    }

    #[test]
    fn test_drop_releases_handle_and_memory() {
        let backend = Arc::new(HeadlessBackend::new());
        let id = {
            let buffer = GpuBuffer::with_data(&backend, BufferUsage::Uniform, &[0u8; 64]).unwrap();
            assert_eq!(backend.stats().bytes_allocated, 64);
            buffer.id()
        };
        assert!(!backend.is_buffer_live(id));
        assert_eq!(backend.stats().bytes_allocated, 0);
    }

    #[test]
    fn test_owned_destroys_on_drop() {
        let backend = Arc::new(HeadlessBackend::new());
        let fence = Owned::new(&backend, backend.create_fence(true).unwrap());
        let handle = fence.handle();
        assert!(backend.is_fence_live(handle));
        drop(fence);
        assert!(!backend.is_fence_live(handle));
    }
}
