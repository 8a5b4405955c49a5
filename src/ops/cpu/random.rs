//! `random` program: per-element xorshift128 generators.
//!
//! Every output element owns four consecutive state words.

use rayon::prelude::*;

use super::{HostKernelFn, HostLaunch};
use crate::error::Result;

pub(super) const KERNELS: &[(&str, HostKernelFn)] = &[
    ("uniformRandom", uniform_random as HostKernelFn),
    ("invertedDropout", inverted_dropout as HostKernelFn),
];

fn xorshift128(s: &mut [u32]) -> u32 {
    let mut t = s[3];
    let first = s[0];
    s[3] = s[2];
    s[2] = s[1];
    s[1] = first;
    t ^= t << 11;
    t ^= t >> 8;
    s[0] = t ^ first ^ (first >> 19);
    s[0]
}

/// Uniform in `[0, 1)` from the top 24 bits.
fn next_uniform(s: &mut [u32]) -> f32 {
    (xorshift128(s) >> 8) as f32 * (1.0 / 16_777_216.0)
}

/// Advances every generator once and returns the drawn numbers.
fn draw(l: &HostLaunch<'_>, n: usize) -> Result<Vec<f32>> {
    let mut drawn = vec![0.0f32; n];
    l.update(1, n * 4, |state: &mut [u32]| {
        drawn
            .par_iter_mut()
            .zip(state.par_chunks_mut(4))
            .for_each(|(u, s)| *u = next_uniform(s));
    })?;
    Ok(drawn)
}

/// `uniformRandom(dest, state)`
fn uniform_random(l: &HostLaunch<'_>) -> Result<()> {
    let n = l.size(0);
    let drawn = draw(l, n)?;
    l.update(0, n, |dest: &mut [f32]| dest.copy_from_slice(&drawn))
}

/// `invertedDropout(dest, state, p)`: keeps an element with probability `p`
/// and scales survivors by `1 / p`.
fn inverted_dropout(l: &HostLaunch<'_>) -> Result<()> {
    let n = l.size(0);
    let p = l.float(2)?;
    let drawn = draw(l, n)?;
    l.update(0, n, |dest: &mut [f32]| {
        dest.par_iter_mut()
            .zip(drawn.par_iter())
            .for_each(|(x, &u)| *x = if u < p { *x / p } else { 0.0 });
    })
}
