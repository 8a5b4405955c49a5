//! Raw device buffers.

use std::sync::Arc;

use super::Device;
use crate::ops::cpu::HostBuffer;

/// Backend memory behind a [`Storage`].
#[derive(Debug)]
pub(crate) enum Buffer {
    Host(HostBuffer),
    #[cfg(feature = "wgpu")]
    Wgpu(crate::ops::wgpu::WgpuBuffer),
}

impl Buffer {
    pub fn as_host(&self) -> Option<&HostBuffer> {
        match self {
            Self::Host(buffer) => Some(buffer),
            #[cfg(feature = "wgpu")]
            Self::Wgpu(_) => None,
        }
    }

    #[cfg(feature = "wgpu")]
    pub fn as_wgpu(&self) -> Option<&crate::ops::wgpu::WgpuBuffer> {
        match self {
            Self::Wgpu(buffer) => Some(buffer),
            Self::Host(_) => None,
        }
    }
}

/// A device buffer.
///
/// Storage is move-only: one owner holds the handle. Two storages only ever
/// refer to the same memory after an explicit [`Storage::share`], and then a
/// write through either is visible through both.
///
/// If allocation fails the error is reported through
/// [`Device::error`](Device::error) and the storage is left without a buffer;
/// operations touching it report again and do nothing.
#[derive(Debug, Default)]
pub struct Storage {
    buffer: Option<Arc<Buffer>>,
    size: usize,
}

impl Storage {
    /// Allocates `size` bytes of zeroed device memory.
    pub fn new(device: &Device, size: usize) -> Self {
        Self::allocate(device, size, None)
    }

    /// Allocates a buffer initialized with `data`.
    pub fn with_data(device: &Device, data: &[u8]) -> Self {
        Self::allocate(device, data.len(), Some(data))
    }

    fn allocate(device: &Device, size: usize, data: Option<&[u8]>) -> Self {
        match device.create_buffer(size, data) {
            Ok(buffer) => Self {
                buffer: Some(Arc::new(buffer)),
                size,
            },
            Err(err) => {
                device.error(err);
                Self { buffer: None, size }
            }
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the storage has a live buffer.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.buffer.is_some()
    }

    /// Replaces this storage's buffer with a reference-counted alias of
    /// `source`'s buffer.
    pub fn share(&mut self, source: &Storage) {
        self.buffer.clone_from(&source.buffer);
        self.size = source.size;
    }

    /// Whether both storages refer to the same buffer.
    #[must_use]
    pub fn is_shared_with(&self, other: &Storage) -> bool {
        match (&self.buffer, &other.buffer) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// A non-owning reference starting `offset` bytes into the buffer.
    #[must_use]
    pub fn at(&self, offset: usize) -> StorageRef<'_> {
        assert!(offset <= self.size, "storage offset {offset} beyond {} bytes", self.size);
        StorageRef {
            storage: self,
            offset,
        }
    }

    pub(crate) fn buffer(&self) -> Option<&Arc<Buffer>> {
        self.buffer.as_ref()
    }
}

/// A borrowed position inside a [`Storage`].
#[derive(Debug, Clone, Copy)]
pub struct StorageRef<'a> {
    storage: &'a Storage,
    offset: usize,
}

impl<'a> StorageRef<'a> {
    #[must_use]
    pub fn storage(&self) -> &'a Storage {
        self.storage
    }

    /// Offset in bytes.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes available from the offset to the end of the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.storage.size - self.offset
    }
}

impl<'a> From<&'a Storage> for StorageRef<'a> {
    fn from(storage: &'a Storage) -> Self {
        storage.at(0)
    }
}
