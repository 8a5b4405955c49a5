//! Launch index spaces.

use core::ops::Index;

/// An `N`-dimensional size, used both for launch geometry and for
/// workgroup-size hints.
///
/// The all-zero range is the "not chosen" value: operations taking an optional
/// geometry treat it as a request to pick one automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeND<const N: usize> {
    sizes: [usize; N],
}

pub type Range1D = RangeND<1>;
pub type Range2D = RangeND<2>;
pub type Range3D = RangeND<3>;

impl<const N: usize> RangeND<N> {
    #[must_use]
    pub const fn new(sizes: [usize; N]) -> Self {
        Self { sizes }
    }

    /// Whether every dimension is zero.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.sizes.iter().all(|&s| s == 0)
    }

    /// Number of work items covered.
    #[must_use]
    pub fn volume(&self) -> usize {
        self.sizes.iter().product()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        &self.sizes
    }
}

impl<const N: usize> Default for RangeND<N> {
    fn default() -> Self {
        Self { sizes: [0; N] }
    }
}

impl<const N: usize> From<[usize; N]> for RangeND<N> {
    fn from(sizes: [usize; N]) -> Self {
        Self::new(sizes)
    }
}

impl<const N: usize> Index<usize> for RangeND<N> {
    type Output = usize;

    fn index(&self, i: usize) -> &usize {
        assert!(i < N, "range index {i} out of bounds for {N} dimensions");
        &self.sizes[i]
    }
}

impl Range2D {
    /// Launch hint for matrix-vector products: `(rows_per_workgroup, parts)`.
    #[must_use]
    pub const fn geometry(rows_per_workgroup: usize, parts: usize) -> Self {
        Self::new([rows_per_workgroup, parts])
    }
}

/// A launch range of one to three dimensions, as handed to a queue.
///
/// Unused trailing dimensions are 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NdRange {
    dims: usize,
    sizes: [usize; 3],
}

impl NdRange {
    #[must_use]
    pub fn dims(&self) -> usize {
        self.dims
    }

    #[must_use]
    pub fn sizes(&self) -> [usize; 3] {
        self.sizes
    }

    #[must_use]
    pub fn volume(&self) -> usize {
        self.sizes.iter().product()
    }
}

impl<const N: usize> From<RangeND<N>> for NdRange {
    fn from(range: RangeND<N>) -> Self {
        assert!((1..=3).contains(&N), "launch ranges have 1 to 3 dimensions");
        let mut sizes = [1; 3];
        sizes[..N].copy_from_slice(&range.sizes);
        Self { dims: N, sizes }
    }
}

impl From<usize> for NdRange {
    fn from(size: usize) -> Self {
        Self {
            dims: 1,
            sizes: [size, 1, 1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_range_is_auto() {
        assert!(Range2D::default().is_auto());
        assert!(!Range2D::geometry(4, 1).is_auto());
    }

    #[test]
    fn nd_range_pads_trailing_dimensions() {
        let r: NdRange = Range2D::new([3, 5]).into();
        assert_eq!(r.dims(), 2);
        assert_eq!(r.sizes(), [3, 5, 1]);
        assert_eq!(r.volume(), 15);
    }
}
