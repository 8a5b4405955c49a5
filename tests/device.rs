use nnfit::backend::Backend;
use nnfit::config::{Config, DEFAULT_TUNE_REPETITIONS};
use nnfit::core::*;
use nnfit::error::DeviceError;

#[test]
fn host_device_is_listed_first() {
    let devices = Device::find_all();
    assert!(!devices.is_empty());
    assert!(devices[0].ptr_eq(&Device::host()));
    assert_eq!(devices[0].kind(), DeviceKind::Cpu);
    assert!(devices[0].init());
    assert!(devices[0].max_threads_per_workgroup() > 0);
}

#[test]
fn programs_are_built_once() {
    let device = Device::new_host();
    let nn = device.program("nn");
    assert!(nn.is_usable());
    let again = device.program("nn");
    assert_eq!(again.name(), "nn");
    assert_eq!(device.error_count(), 0);

    let missing = device.program("no-such-program");
    assert!(!missing.is_usable());
    assert_eq!(device.error_count(), 1);
    assert!(matches!(device.last_error(), Some(DeviceError::ProgramBuild { .. })));

    // the failed build is cached as well
    let _ = device.program("no-such-program");
    assert_eq!(device.error_count(), 1);
}

#[test]
fn unknown_kernels_are_reported_and_unusable() {
    let device = Device::new_host();
    let queue = CommandQueue::new(&device);
    let kernel = device.program("generic").kernel("noSuchKernel");
    assert!(!kernel.is_usable());
    assert_eq!(device.error_count(), 1);
    let err = device.last_error().expect("error recorded");
    assert_eq!(err.code(), -46);
    assert_eq!(
        err,
        DeviceError::KernelNotFound {
            program: "generic".into(),
            kernel: "noSuchKernel".into(),
        }
    );

    // launching it reports again and leaves memory untouched
    let v = Vector::from_slice(&device, &[1.0f32, 2.0]);
    queue.enqueue_1d(&kernel.invoke().arg(&v), v.len());
    assert_eq!(device.error_count(), 2);
    assert!(matches!(device.last_error(), Some(DeviceError::Enqueue { .. })));
    assert_eq!(v.read::<f32>(&queue), vec![1.0, 2.0]);
}

#[test]
fn kernels_launch_through_invocations() {
    let device = Device::new_host();
    let queue = CommandQueue::new(&device);
    let fill = device.program("generic").kernel("fill");
    let v = Vector::zeroed(&device, 5);
    queue.enqueue_1d(&fill.invoke().arg(&v).arg(2.5f32), v.len());
    queue.finish();
    assert_eq!(v.read::<f32>(&queue), vec![2.5; 5]);
    assert_eq!(device.error_count(), 0);
}

#[test]
fn local_ranges_must_divide_the_global_range() {
    let device = Device::new_host();
    let queue = CommandQueue::new(&device);
    let fill = device.program("generic").kernel("fill");
    let v = Vector::zeroed(&device, 6);
    let local = NdRange::from(Range1D::new([3]));
    queue.enqueue(&fill.invoke().arg(&v).arg(1.5f32), v.len(), Some(local));
    assert_eq!(v.read::<f32>(&queue), vec![1.5; 6]);
    assert_eq!(device.error_count(), 0);
}

#[test]
#[should_panic(expected = "local size 4 does not divide global size 6")]
fn non_dividing_local_range_is_rejected() {
    let device = Device::new_host();
    let queue = CommandQueue::new(&device);
    let fill = device.program("generic").kernel("fill");
    let v = Vector::zeroed(&device, 6);
    let local = NdRange::from(Range1D::new([4]));
    queue.enqueue(&fill.invoke().arg(&v).arg(1.5f32), v.len(), Some(local));
}

#[test]
fn profiling_counts_invocations_per_kernel() {
    let device = Device::new_host();
    let queue = CommandQueue::with_profiling(&device);
    assert!(queue.is_profiling());
    let x = Vector::from_slice(&device, &[1.0f32, 2.0]);
    let dest = Vector::zeroed(&device, 2);
    add(&queue, &dest, &x, &x);
    add(&queue, &dest, &dest, &x);
    mul_assign(&queue, &dest, 2.0);

    let profile = queue.profile();
    let names: Vec<&str> = profile.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["constantMul", "elementAdd"]);
    assert_eq!(profile[1].1.invocations, 2);
    assert_eq!(dest.read::<f32>(&queue), vec![6.0, 12.0]);

    queue.reset_profile();
    assert!(queue.profile().is_empty());

    let plain = CommandQueue::new(&device);
    add(&plain, &dest, &x, &x);
    assert!(plain.profile().is_empty());
}

#[test]
fn queue_transfers_are_ordered() {
    let device = Device::host();
    let queue = CommandQueue::new(&device);
    let a = Vector::from_slice(&device, &[1.0f32, 2.0, 3.0, 4.0]);
    let b = Vector::zeroed(&device, 4);
    a.copy_to(&queue, &b);
    a.fill(&queue, 0.0);
    queue.flush();
    assert_eq!(b.read::<f32>(&queue), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(a.read::<f32>(&queue), vec![0.0; 4]);

    let bytes = Vector::from_slice(&device, &[0u8; 7]);
    bytes.ones(&queue);
    assert_eq!(bytes.read::<u8>(&queue), vec![1; 7]);
    let shorts = Vector::from_slice(&device, &[9u16, 9, 9]);
    shorts.zeros(&queue);
    assert_eq!(shorts.read::<u16>(&queue), vec![0; 3]);
}

#[test]
fn tuning_picks_a_dividing_geometry() {
    let device = Device::host();
    let m = Matrix::new(&device, 20, 24);
    let geometry = tune_geometry(&device, &m, 2, 2);
    assert_eq!(20 % geometry[0], 0);
    assert_eq!(24 % geometry[1], 0);
    assert!(candidate_geometries(&device, &m).contains(&geometry));
}

#[test]
fn default_configuration() {
    let config = Config::default();
    assert_eq!(config.backend, Backend::Host);
    assert_eq!(config.tune_repetitions, DEFAULT_TUNE_REPETITIONS);
}
