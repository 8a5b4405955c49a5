use nnfit::approx::assert_close;
use nnfit::core::*;

fn setup() -> (Device, CommandQueue) {
    let device = Device::host();
    let queue = CommandQueue::new(&device);
    (device, queue)
}

/// Values with a sign and magnitude pattern that does not line up with parts.
/// Quarters of small integers, so sums of their products are exact in any
/// order.
fn sample(len: usize, salt: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (((i * 7 + salt * 13) % 23) as f32 - 11.0) / 4.0)
        .collect()
}

fn reference_mvmul(m: &[f32], columns: usize, v: &[f32]) -> Vec<f32> {
    m.chunks(columns)
        .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
        .collect()
}

#[test]
fn add_then_sub_recovers_the_input() {
    let (device, queue) = setup();
    let x = Vector::from_slice(&device, &sample(37, 1));
    let y = Vector::from_slice(&device, &sample(37, 2));
    let sum = Vector::zeroed(&device, 37);
    add(&queue, &sum, &x, &y);
    sub_assign(&queue, &sum, &y);
    assert_close(&sum.read::<f32>(&queue), &x.read::<f32>(&queue));
}

#[test]
fn scalar_and_elementwise_products() {
    let (device, queue) = setup();
    let x = Vector::from_slice(&device, &[1.0f32, -2.0, 4.0]);
    let y = Vector::from_slice(&device, &[0.5f32, 3.0, -1.0]);
    let dest = Vector::zeroed(&device, 3);

    mul(&queue, &dest, &x, 2.0);
    assert_eq!(dest.read::<f32>(&queue), vec![2.0, -4.0, 8.0]);
    div_assign(&queue, &dest, 4.0);
    assert_eq!(dest.read::<f32>(&queue), vec![0.5, -1.0, 2.0]);
    elementwise_mul(&queue, &dest, &x, &y);
    assert_eq!(dest.read::<f32>(&queue), vec![0.5, -6.0, -4.0]);
}

#[test]
fn broadcast_add_over_stacked_vectors() {
    let (device, queue) = setup();
    let bias = Vector::from_slice(&device, &[1.0f32, 2.0]);
    let stacked = Vector::from_slice(&device, &[0.0f32, 0.0, 10.0, 10.0, -1.0, -2.0]);
    let dest = Vector::zeroed(&device, 6);
    parallel_add(&queue, &dest, &bias, &stacked);
    assert_eq!(dest.read::<f32>(&queue), vec![1.0, 2.0, 11.0, 12.0, 0.0, 0.0]);
}

#[test]
fn partial_sums_cover_contiguous_parts() {
    let (device, queue) = setup();
    let x: Vec<f32> = (1..=10).map(|i| i as f32).collect();
    let x = Vector::from_slice(&device, &x);
    let sums = Vector::zeroed(&device, 4);
    partial_sum(&queue, &sums, &x);
    assert_eq!(sums.read::<f32>(&queue), vec![6.0, 15.0, 24.0, 10.0]);

    let total = Vector::zeroed(&device, 1);
    partial_sum(&queue, &total, &x);
    assert_eq!(total.read::<f32>(&queue), vec![55.0]);
}

#[test]
fn partial_true_counts_cover_contiguous_parts() {
    let (device, queue) = setup();
    let x = Vector::from_slice(&device, &[0u8, 1, 1, 0, 0, 1, 1, 1, 0, 0]);
    let counts = Vector::new(&device, 4, ValueType::Uint32);
    partial_true_count(&queue, &counts, &x);
    assert_eq!(counts.read::<u32>(&queue), vec![2, 1, 2, 0]);

    let x = Vector::from_slice(&device, &[0u8, 1, 1, 0, 0, 1, 1, 1, 0, 0, 1, 0]);
    partial_true_count(&queue, &counts, &x);
    assert_eq!(counts.read::<u32>(&queue), vec![2, 1, 2, 1]);
}

#[test]
fn mvmul_is_invariant_to_launch_geometry() {
    let (device, queue) = setup();
    let (rows, columns) = (10, 16);
    let data = sample(rows * columns, 3);
    let m = Matrix::from_slice(&device, rows, columns, &data);
    let v_data = sample(columns, 4);
    let v = Vector::from_slice(&device, &v_data);
    let dest = Vector::zeroed(&device, rows);

    mvmul(&queue, &dest, &m, &v, Range2D::default());
    let baseline = dest.read::<f32>(&queue);
    assert_close(&baseline, &reference_mvmul(&data, columns, &v_data));

    let geometries = candidate_geometries(&device, &m);
    // covers both the scalar and the 4-wide kernels
    assert!(geometries.iter().any(|g| (columns / g[1]) % 4 == 0));
    assert!(geometries.iter().any(|g| (columns / g[1]) % 4 != 0));
    for geometry in geometries {
        dest.zeros(&queue);
        mvmul(&queue, &dest, &m, &v, geometry);
        assert_eq!(dest.read::<f32>(&queue), baseline, "geometry {geometry:?}");
    }
}

#[test]
fn mvmul_sums_column_parts_separately() {
    let (device, queue) = setup();
    // 1 is lost next to 1e8 unless it is added after the large terms cancel
    let m = Matrix::from_slice(&device, 1, 4, &[1.0e8f32, 1.0, -1.0e8, 1.0]);
    let v = Vector::from_slice(&device, &[1.0f32; 4]);
    let dest = Vector::zeroed(&device, 1);

    mvmul(&queue, &dest, &m, &v, Range2D::geometry(1, 1));
    assert_eq!(dest.read::<f32>(&queue), vec![1.0]);
    mvmul(&queue, &dest, &m, &v, Range2D::geometry(1, 2));
    assert_eq!(dest.read::<f32>(&queue), vec![0.0]);
    mvmul(&queue, &dest, &m, &v, Range2D::geometry(1, 4));
    assert_eq!(dest.read::<f32>(&queue), vec![1.0]);
}

#[test]
#[should_panic(expected = "not a supported part count")]
fn mvmul_rejects_unsupported_part_counts() {
    let (device, queue) = setup();
    let m = Matrix::new(&device, 2, 3);
    let v = Vector::zeroed(&device, 3);
    let dest = Vector::zeroed(&device, 2);
    mvmul(&queue, &dest, &m, &v, Range2D::geometry(1, 3));
}

#[test]
fn parallel_mvmul_matches_independent_products() {
    let (device, queue) = setup();
    let (rows, columns, count) = (5, 12, 3);
    let m = Matrix::from_slice(&device, rows, columns, &sample(rows * columns, 5));
    let stacked = Vector::from_slice(&device, &sample(columns * count, 6));
    let batched = Vector::zeroed(&device, rows * count);
    parallel_mvmul(&queue, &batched, &m, &stacked, Range2D::default());
    let batched = batched.read::<f32>(&queue);

    let single = Vector::zeroed(&device, columns);
    let out = Vector::zeroed(&device, rows);
    for k in 0..count {
        stacked
            .slice(k * columns, (k + 1) * columns)
            .copy_to(&queue, &single);
        mvmul(&queue, &out, &m, &single, Range2D::default());
        assert_eq!(out.read::<f32>(&queue), batched[k * rows..(k + 1) * rows].to_vec());
    }
}

#[test]
fn transpose_mvmul_propagates_error_terms() {
    let (device, queue) = setup();
    let m = Matrix::from_slice(&device, 2, 3, &[2.0, 3.0, 4.0, 1.0, 2.0, 3.0]);
    let v = Vector::from_slice(&device, &[2.5f32, 0.75, 1.0, 0.0]);
    let dest = Vector::zeroed(&device, 6);
    transpose_mvmul(&queue, &dest, &m, &v, 2);
    assert_eq!(dest.read::<f32>(&queue), vec![5.75, 9.0, 12.25, 2.0, 3.0, 4.0]);
}

#[test]
fn identity_matrix() {
    let (device, queue) = setup();
    let m = Matrix::new(&device, 2, 3);
    m.fill(&queue, 5.0);
    m.identity(&queue);
    assert_eq!(m.read::<f32>(&queue), vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
}

#[test]
fn slices_write_and_copy_in_place() {
    let (device, queue) = setup();
    let v = Vector::from_slice(&device, &[0.0f32; 6]);
    v.slice(2, 4).write(&queue, &[1.0f32, 2.0]);
    assert_eq!(v.read::<f32>(&queue), vec![0.0, 0.0, 1.0, 2.0, 0.0, 0.0]);

    let m = Matrix::from_slice(&device, 3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(m.row(1).read::<f32>(&queue), vec![3.0, 4.0]);
    m.row(2).copy_to_slice(&queue, &v.slice_from(4));
    assert_eq!(v.read::<f32>(&queue), vec![0.0, 0.0, 1.0, 2.0, 5.0, 6.0]);
}

#[test]
fn shared_vectors_see_each_others_writes() {
    let (device, queue) = setup();
    let source = Vector::from_slice(&device, &[1.0f32, 2.0]);
    let mut alias = Vector::zeroed(&device, 5);
    alias.share(&source);
    assert!(alias.is_shared_with(&source));
    assert_eq!(alias.len(), 2);

    alias.write(&queue, &[7.0f32, 8.0]);
    assert_eq!(source.read::<f32>(&queue), vec![7.0, 8.0]);

    alias.resize(2);
    assert!(!alias.is_shared_with(&source));
    alias.fill(&queue, 0.0);
    assert_eq!(source.read::<f32>(&queue), vec![7.0, 8.0]);
}

#[test]
fn random_numbers_are_reproducible_and_in_range() {
    let (device, queue) = setup();
    let a = RandomGenerator::new(&device, &queue, 256, 42);
    let b = RandomGenerator::new(&device, &queue, 256, 42);
    let x = Vector::zeroed(&device, 256);
    let y = Vector::zeroed(&device, 256);
    a.uniform(&queue, &x);
    b.uniform(&queue, &y);
    let values = x.read::<f32>(&queue);
    assert_eq!(values, y.read::<f32>(&queue));
    assert!(values.iter().all(|v| (0.0..1.0).contains(v)));
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    assert!((mean - 0.5).abs() < 0.1, "mean {mean}");

    a.uniform(&queue, &x);
    assert_ne!(x.read::<f32>(&queue), values);
}

#[test]
#[should_panic(expected = "lengths differ")]
fn mismatched_lengths_panic_before_any_work() {
    let (device, queue) = setup();
    let x = Vector::zeroed(&device, 3);
    let y = Vector::zeroed(&device, 4);
    add(&queue, &x, &x, &y);
}
