//! `fixed` program: integer reductions.

use rayon::prelude::*;

use super::{HostKernelFn, HostLaunch};
use crate::error::Result;

pub(super) const KERNELS: &[(&str, HostKernelFn)] =
    &[("partialTrueCount", partial_true_count as HostKernelFn)];

/// `partialTrueCount(x: u8, len, partSize, dest: u32)`
fn partial_true_count(l: &HostLaunch<'_>) -> Result<()> {
    let parts = l.size(0);
    let len = l.uint(1)?;
    let part_size = l.uint(2)?;
    let x = l.read::<u8>(0, len)?;
    l.update(3, parts, |dest: &mut [u32]| {
        dest.par_iter_mut().enumerate().for_each(|(p, d)| {
            let start = (p * part_size).min(len);
            let end = (start + part_size).min(len);
            *d = x[start..end].iter().filter(|&&b| b != 0).count() as u32;
        });
    })
}
