//! Element types a device vector can hold.

use core::fmt;

/// The element type of a [`Vector`](super::Vector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ValueType {
    /// 32-bit IEEE float, used for every trainable quantity.
    #[default]
    Float = 0,
    /// Boolean and classification-match vectors.
    Uint8,
    /// Label vectors.
    Uint16,
    /// Counts.
    Uint32,
}

impl ValueType {
    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Float | Self::Uint32 => 4,
            Self::Uint16 => 2,
            Self::Uint8 => 1,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Host types that map onto a [`ValueType`].
pub trait Element: bytemuck::Pod + Default + Send + Sync + 'static {
    const TYPE: ValueType;
}

impl Element for f32 {
    const TYPE: ValueType = ValueType::Float;
}

impl Element for u8 {
    const TYPE: ValueType = ValueType::Uint8;
}

impl Element for u16 {
    const TYPE: ValueType = ValueType::Uint16;
}

impl Element for u32 {
    const TYPE: ValueType = ValueType::Uint32;
}

/// Returns the value type of `T`.
#[must_use]
pub const fn value_type<T: Element>() -> ValueType {
    T::TYPE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_sizes_match_host_types() {
        assert_eq!(value_type::<f32>().size(), size_of::<f32>());
        assert_eq!(value_type::<u8>().size(), size_of::<u8>());
        assert_eq!(value_type::<u16>().size(), size_of::<u16>());
        assert_eq!(value_type::<u32>().size(), size_of::<u32>());
    }
}
