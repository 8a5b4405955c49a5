//! Typed device vectors and slices.

use super::storage::{Storage, StorageRef};
use super::value_type::{Element, ValueType};
use super::{CommandQueue, Device};

/// A device buffer of `len` elements of one [`ValueType`].
///
/// Vectors are move-only. Operations that change the contents on the device
/// take `&self`; operations that change the shape or the buffer identity take
/// `&mut self`, so no slice can outlive a resize.
#[derive(Debug)]
pub struct Vector {
    device: Device,
    storage: Storage,
    len: usize,
    vtype: ValueType,
}

impl Vector {
    /// A zero-initialized vector.
    pub fn new(device: &Device, len: usize, vtype: ValueType) -> Self {
        Self {
            device: device.clone(),
            storage: Storage::new(device, len * vtype.size()),
            len,
            vtype,
        }
    }

    /// A zero-initialized float vector.
    pub fn zeroed(device: &Device, len: usize) -> Self {
        Self::new(device, len, ValueType::Float)
    }

    /// An empty vector of the given type.
    pub fn empty(device: &Device, vtype: ValueType) -> Self {
        Self::new(device, 0, vtype)
    }

    /// A vector initialized from host data; the element type follows `T`.
    pub fn from_slice<T: Element>(device: &Device, data: &[T]) -> Self {
        Self {
            device: device.clone(),
            storage: Storage::with_data(device, bytemuck::cast_slice(data)),
            len: data.len(),
            vtype: T::TYPE,
        }
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.vtype
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Size of the contents in bytes.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.len * self.vtype.size()
    }

    /// Elements `from..to` as a borrowed window.
    ///
    /// # Panics
    ///
    /// If the range is reversed or runs past the end.
    #[must_use]
    pub fn slice(&self, from: usize, to: usize) -> VectorSlice<'_> {
        assert!(from <= to, "slice start {from} after end {to}");
        assert!(to <= self.len, "slice end {to} beyond length {}", self.len);
        VectorSlice {
            storage: &self.storage,
            offset: from,
            len: to - from,
            vtype: self.vtype,
        }
    }

    /// Elements `from..` as a borrowed window.
    #[must_use]
    pub fn slice_from(&self, from: usize) -> VectorSlice<'_> {
        self.slice(from, self.len)
    }

    /// The whole vector as a slice.
    #[must_use]
    pub fn as_slice(&self) -> VectorSlice<'_> {
        self.slice(0, self.len)
    }

    /// Sets every element to `value`.
    ///
    /// # Panics
    ///
    /// If the vector does not hold floats.
    pub fn fill(&self, queue: &CommandQueue, value: f32) {
        assert_eq!(self.vtype, ValueType::Float, "fill needs a float vector");
        let kernel = &self.device.tensor_kernels().fill;
        queue.enqueue_1d(&kernel.invoke().arg(self).arg(value), self.len);
    }

    /// Sets every element to one, whatever the element type.
    pub fn ones(&self, queue: &CommandQueue) {
        let pattern = match self.vtype {
            ValueType::Float => 1.0f32.to_ne_bytes().to_vec(),
            ValueType::Uint8 => vec![1],
            ValueType::Uint16 => 1u16.to_ne_bytes().to_vec(),
            ValueType::Uint32 => 1u32.to_ne_bytes().to_vec(),
        };
        queue.fill(&self.storage, self.byte_size(), &pattern);
    }

    pub fn zeros(&self, queue: &CommandQueue) {
        queue.fill(&self.storage, self.byte_size(), &[0]);
    }

    /// Replaces the contents with `data`.
    ///
    /// # Panics
    ///
    /// If `T` is not the element type or the lengths differ.
    pub fn write<T: Element>(&self, queue: &CommandQueue, data: &[T]) {
        assert_eq!(T::TYPE, self.vtype, "writing {} into a {} vector", T::TYPE, self.vtype);
        assert_eq!(data.len(), self.len, "writing {} elements into a vector of {}", data.len(), self.len);
        queue.blocking_write(&self.storage, bytemuck::cast_slice(data));
    }

    /// Reads the contents back to the host.
    ///
    /// # Panics
    ///
    /// If `T` is not the element type.
    #[must_use]
    pub fn read<T: Element>(&self, queue: &CommandQueue) -> Vec<T> {
        assert_eq!(T::TYPE, self.vtype, "reading a {} vector as {}", self.vtype, T::TYPE);
        let mut out = vec![T::default(); self.len];
        queue.blocking_read(&self.storage, bytemuck::cast_slice_mut(&mut out));
        out
    }

    /// Copies the contents into `dest`, which must match in type and length.
    pub fn copy_to(&self, queue: &CommandQueue, dest: &Vector) {
        self.as_slice().copy_to(queue, dest);
    }

    /// Copies the contents into a slice matching in type and length.
    pub fn copy_to_slice(&self, queue: &CommandQueue, dest: &VectorSlice<'_>) {
        self.as_slice().copy_to_slice(queue, dest);
    }

    /// Reallocates to `len` zeroed elements. Contents are not preserved.
    pub fn resize(&mut self, len: usize) {
        self.storage = Storage::new(&self.device, len * self.vtype.size());
        self.len = len;
    }

    /// Makes this vector an alias of `source`: both refer to the same buffer
    /// until either is resized or re-shared.
    pub fn share(&mut self, source: &Vector) {
        self.storage.share(&source.storage);
        self.len = source.len;
        self.vtype = source.vtype;
    }

    /// Whether both vectors refer to the same buffer.
    #[must_use]
    pub fn is_shared_with(&self, other: &Vector) -> bool {
        self.storage.is_shared_with(&other.storage)
    }

    /// Logs the float contents at debug level.
    pub fn dump(&self, queue: &CommandQueue, label: &str) {
        let values = self.read::<f32>(queue);
        tracing::debug!(label, ?values, "vector contents");
    }
}

/// A borrowed window of `len` elements starting at an element offset.
#[derive(Debug, Clone, Copy)]
pub struct VectorSlice<'a> {
    storage: &'a Storage,
    offset: usize,
    len: usize,
    vtype: ValueType,
}

impl<'a> VectorSlice<'a> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset in elements.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.vtype
    }

    /// Position of the first element in the underlying storage.
    #[must_use]
    pub fn storage_ref(&self) -> StorageRef<'a> {
        self.storage.at(self.offset * self.vtype.size())
    }

    fn byte_size(&self) -> usize {
        self.len * self.vtype.size()
    }

    /// Copies into `dest`, which must match in type and length.
    ///
    /// # Panics
    ///
    /// On a type or length mismatch.
    pub fn copy_to(&self, queue: &CommandQueue, dest: &Vector) {
        self.copy_to_slice(queue, &dest.as_slice());
    }

    /// Copies into another slice matching in type and length.
    ///
    /// # Panics
    ///
    /// On a type or length mismatch.
    pub fn copy_to_slice(&self, queue: &CommandQueue, dest: &VectorSlice<'_>) {
        assert_eq!(self.vtype, dest.vtype, "copying a {} slice into {}", self.vtype, dest.vtype);
        assert_eq!(self.len, dest.len, "copying {} elements into {}", self.len, dest.len);
        queue.copy(self.storage_ref(), dest.storage_ref(), self.byte_size());
    }

    /// Overwrites the window with `data`.
    ///
    /// # Panics
    ///
    /// If `T` is not the element type or the lengths differ.
    pub fn write<T: Element>(&self, queue: &CommandQueue, data: &[T]) {
        assert_eq!(T::TYPE, self.vtype, "writing {} into a {} slice", T::TYPE, self.vtype);
        assert_eq!(data.len(), self.len, "writing {} elements into a slice of {}", data.len(), self.len);
        queue.blocking_write(self.storage_ref(), bytemuck::cast_slice(data));
    }

    /// Reads the window back to the host.
    #[must_use]
    pub fn read<T: Element>(&self, queue: &CommandQueue) -> Vec<T> {
        assert_eq!(T::TYPE, self.vtype, "reading a {} slice as {}", self.vtype, T::TYPE);
        let mut out = vec![T::default(); self.len];
        queue.blocking_read(self.storage_ref(), bytemuck::cast_slice_mut(&mut out));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ones_matches_the_element_type() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let bytes = Vector::new(&device, 3, ValueType::Uint8);
        bytes.ones(&queue);
        assert_eq!(bytes.read::<u8>(&queue), vec![1, 1, 1]);
        let halves = Vector::new(&device, 2, ValueType::Uint16);
        halves.ones(&queue);
        assert_eq!(halves.read::<u16>(&queue), vec![1, 1]);
        let floats = Vector::zeroed(&device, 2);
        floats.ones(&queue);
        assert_eq!(floats.read::<f32>(&queue), vec![1.0, 1.0]);
    }

    #[test]
    fn resize_discards_contents() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let mut v = Vector::from_slice(&device, &[1.0f32, 2.0]);
        v.resize(3);
        assert_eq!(v.read::<f32>(&queue), vec![0.0; 3]);
    }
}
