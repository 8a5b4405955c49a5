//! `optimizers` program: in-place weight updates.

use rayon::prelude::*;

use super::{HostKernelFn, HostLaunch};
use crate::error::Result;

pub(super) const KERNELS: &[(&str, HostKernelFn)] = &[
    ("gradientDescent", gradient_descent as HostKernelFn),
    ("momentum", momentum as HostKernelFn),
];

/// `gradientDescent(w, g, rate)`: `w -= rate * g`
fn gradient_descent(l: &HostLaunch<'_>) -> Result<()> {
    let n = l.size(0);
    let g = l.read::<f32>(1, n)?;
    let rate = l.float(2)?;
    l.update(0, n, |w: &mut [f32]| {
        w.par_iter_mut()
            .zip(g.par_iter())
            .for_each(|(w, &g)| *w -= rate * g);
    })
}

/// `momentum(w, g, velocity, rate, mu)`: `v = mu v - rate g; w += v`
fn momentum(l: &HostLaunch<'_>) -> Result<()> {
    let n = l.size(0);
    let g = l.read::<f32>(1, n)?;
    let rate = l.float(3)?;
    let mu = l.float(4)?;
    let mut velocity = l.read::<f32>(2, n)?;
    velocity
        .par_iter_mut()
        .zip(g.par_iter())
        .for_each(|(v, &g)| *v = mu * *v - rate * g);
    l.update(2, n, |v: &mut [f32]| v.copy_from_slice(&velocity))?;
    l.update(0, n, |w: &mut [f32]| {
        w.par_iter_mut()
            .zip(velocity.par_iter())
            .for_each(|(w, &v)| *w += v);
    })
}
