//! Approximate equality of `f32` results read back from a device.
//!
//! Device results are compared by grade: how far apart two values are decides
//! whether they are precisely, partially or only relatively equal.

/// The max epsilon accepted on `f32`s.
pub const F32_MAX_ERROR: f32 = 1e-3;

/// The expected minimum epsilon accepted on `f32`s.
pub const F32_AVG_ERROR: f32 = 1e-5;

/// The best expected epsilon accepted on `f32`s.
pub const F32_MIN_ERROR: f32 = 1e-6;

/// Grade of equality between two values, best first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Very strong epsilon.
    Precise = 0,

    /// Good epsilon.
    Partial = 1,

    /// Acceptable epsilon.
    Relative = 2,

    /// No relative equality.
    Scarce = 3,
}

/// Grades the distance between `self` and a right-hand side.
pub trait RelativeEq<Rhs: ?Sized> {
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality;
}

impl RelativeEq<Self> for f32 {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        // scale the distance for magnitudes above one
        let dif = (self - rhs).abs() / self.abs().max(rhs.abs()).max(1.0);

        if dif < F32_MIN_ERROR {
            ApproxEquality::Precise
        } else if dif < F32_AVG_ERROR {
            ApproxEquality::Partial
        } else if dif < F32_MAX_ERROR {
            ApproxEquality::Relative
        } else {
            ApproxEquality::Scarce
        }
    }
}

/// The worst grade over all pairs; slices of different lengths are scarce.
impl RelativeEq<[f32]> for [f32] {
    fn approx_eq(&self, rhs: &[f32]) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        self.iter()
            .zip(rhs)
            .map(|(a, b)| a.approx_eq(b))
            .max()
            .unwrap_or(ApproxEquality::Precise)
    }
}

/// Whether `a` and `b` are at least relatively equal.
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) != ApproxEquality::Scarce
}

/// Asserts that two float slices are at least relatively equal.
///
/// # Panics
///
/// When they are not, showing both slices.
#[track_caller]
pub fn assert_close(actual: &[f32], expected: &[f32]) {
    assert!(
        approx_eq(actual, expected),
        "values differ beyond tolerance\n  actual: {actual:?}\nexpected: {expected:?}"
    );
}
