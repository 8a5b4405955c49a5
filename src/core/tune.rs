//! Empirical selection of matrix-vector launch geometry.

use super::tensor::{parallel_mvmul, PART_CANDIDATES, ROWS_PER_WORKGROUP_CANDIDATES};
use super::{CommandQueue, Device, Matrix, Range2D, Vector};

/// Every `(rows_per_workgroup, parts)` pair that divides `m` and fits in one
/// workgroup of `device`, in candidate order.
#[must_use]
pub fn candidate_geometries(device: &Device, m: &Matrix) -> Vec<Range2D> {
    let max_threads = device.max_threads_per_workgroup();
    let mut candidates = Vec::new();
    for rows in ROWS_PER_WORKGROUP_CANDIDATES {
        if m.rows() % rows != 0 {
            continue;
        }
        for parts in PART_CANDIDATES {
            if m.columns() % parts == 0 && rows * parts <= max_threads {
                candidates.push(Range2D::geometry(rows, parts));
            }
        }
    }
    candidates
}

/// Profiles `repetitions` products of `m` with `vector_count` stacked vectors
/// for every candidate geometry and returns the fastest.
///
/// Runs on a private profiling queue with scratch buffers; `m` is only read.
/// Ties keep the earlier candidate.
pub fn tune_geometry(device: &Device, m: &Matrix, vector_count: usize, repetitions: usize) -> Range2D {
    let queue = CommandQueue::with_profiling(device);
    let input = Vector::zeroed(device, m.columns() * vector_count);
    let output = Vector::zeroed(device, m.rows() * vector_count);

    let mut best: Option<(Range2D, std::time::Duration)> = None;
    for geometry in candidate_geometries(device, m) {
        queue.reset_profile();
        for _ in 0..repetitions {
            parallel_mvmul(&queue, &output, m, &input, geometry);
        }
        queue.finish();
        let elapsed = queue.profiled_time();
        tracing::trace!(rows = geometry[0], parts = geometry[1], ?elapsed, "geometry timed");
        if best.is_none_or(|(_, fastest)| elapsed < fastest) {
            best = Some((geometry, elapsed));
        }
    }

    let (geometry, elapsed) = best.unwrap_or((Range2D::geometry(1, 1), Default::default()));
    tracing::debug!(
        rows = m.rows(),
        columns = m.columns(),
        rows_per_workgroup = geometry[0],
        parts = geometry[1],
        ?elapsed,
        "tuned matrix-vector geometry"
    );
    geometry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_divide_the_matrix() {
        let device = Device::host();
        let m = Matrix::new(&device, 6, 12);
        let candidates = candidate_geometries(&device, &m);
        assert!(!candidates.is_empty());
        for c in &candidates {
            assert_eq!(6 % c[0], 0);
            assert_eq!(12 % c[1], 0);
        }
        assert_eq!(candidates[0], Range2D::geometry(3, 4));
        assert_eq!(*candidates.last().unwrap(), Range2D::geometry(1, 1));
    }

    #[test]
    fn tuned_geometry_is_a_candidate() {
        let device = Device::host();
        let m = Matrix::new(&device, 4, 8);
        let geometry = tune_geometry(&device, &m, 2, 2);
        assert!(candidate_geometries(&device, &m).contains(&geometry));
    }
}
