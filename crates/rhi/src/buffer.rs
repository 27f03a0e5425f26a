//! Host-visible GPU buffers.
//!
//! Buffers live in `CpuToGpu` memory and stay mapped, so uploading is a
//! plain copy into the mapped range with no staging or transfer commands.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// A mapped buffer with its gpu-allocator allocation.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    name: &'static str,
}

impl Buffer {
    /// Creates an uninitialized buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// [`RhiError::BufferCreation`] if `size` is 0 or creation, allocation or binding fails.
    pub fn new(
        device: Arc<Device>,
        usage: vk::BufferUsageFlags,
        size: vk::DeviceSize,
        name: &'static str,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::BufferCreation(format!(
                "{} buffer size must be greater than 0",
                name
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .handle()
                .create_buffer(&buffer_info, None)
                .map_err(|e| RhiError::BufferCreation(format!("{} buffer: {}", name, e)))?
        };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = match device.allocator().lock() {
            Ok(mut allocator) => allocator
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::CpuToGpu,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| RhiError::BufferCreation(format!("{} buffer memory: {}", name, e))),
            Err(_) => Err(RhiError::BufferCreation("allocator lock poisoned".to_string())),
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // From here on Drop releases the buffer and its memory.
        let created = Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            name,
        };

        if let Some(allocation) = &created.allocation {
            unsafe {
                created
                    .device
                    .handle()
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                    .map_err(|e| RhiError::BufferCreation(format!("{} bind: {}", name, e)))?;
            }
        }

        debug!("Created {} buffer: {} bytes", name, size);
        Ok(created)
    }

    /// Creates a vertex buffer holding `data`.
    pub fn new_vertex(device: Arc<Device>, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(
            device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            data.len() as vk::DeviceSize,
            "vertex",
        )?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Copies `data` into the mapped memory at `offset`.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        check_write_range(self.size, offset, data.len())
            .map_err(|msg| RhiError::BufferCreation(format!("{} buffer: {}", self.name, msg)))?;

        let mapped_ptr = self
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| {
                RhiError::BufferCreation(format!("{} buffer memory is not mapped", self.name))
            })?;

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator().lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        tracing::error!("Failed to free {} buffer allocation: {:?}", self.name, e);
                    }
                }
                Err(_) => tracing::error!("Allocator lock poisoned, leaking {} buffer", self.name),
            }
        }

        debug!("Destroyed {} buffer", self.name);
    }
}

fn check_write_range(size: vk::DeviceSize, offset: vk::DeviceSize, len: usize) -> Result<(), String> {
    let end = offset
        .checked_add(len as vk::DeviceSize)
        .ok_or_else(|| "write range overflows".to_string())?;
    if end > size {
        return Err(format!(
            "write exceeds buffer size: offset {} + data {} > buffer {}",
            offset, len, size
        ));
    }
    Ok(())
}
