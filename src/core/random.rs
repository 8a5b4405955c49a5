//! Device-side random numbers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{CommandQueue, Device, Kernel, ValueType, Vector};

/// One xorshift128 generator per element of a fixed-size float vector.
///
/// Each generator keeps four 32-bit state words on the device, seeded from a
/// [`StdRng`] so a given seed always reproduces the same stream.
#[derive(Debug)]
pub struct RandomGenerator {
    state: Vector,
    uniform: Kernel,
    inverted_dropout: Kernel,
}

impl RandomGenerator {
    /// Generators for vectors of `size` elements.
    pub fn new(device: &Device, queue: &CommandQueue, size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        // xorshift128 never leaves the all-zero state
        let words: Vec<u32> = (0..size * 4).map(|_| rng.random::<u32>() | 1).collect();
        let state = Vector::new(device, words.len(), ValueType::Uint32);
        state.write(queue, &words);
        let program = device.program("random");
        Self {
            state,
            uniform: program.kernel("uniformRandom"),
            inverted_dropout: program.kernel("invertedDropout"),
        }
    }

    /// Number of elements the generator serves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len() / 4
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    fn check(&self, dest: &Vector) {
        assert_eq!(dest.value_type(), ValueType::Float, "random numbers are floats");
        assert_eq!(dest.len(), self.len(), "generator serves {} elements, not {}", self.len(), dest.len());
    }

    /// Overwrites `dest` with uniform numbers in `[0, 1)`.
    pub fn uniform(&self, queue: &CommandQueue, dest: &Vector) {
        self.check(dest);
        queue.enqueue_1d(&self.uniform.invoke().arg(dest).arg(&self.state), dest.len());
    }

    /// Keeps each element of `dest` with probability `keep_probability`,
    /// scaling survivors by its inverse and zeroing the rest.
    ///
    /// # Panics
    ///
    /// If the probability is not in `(0, 1]`.
    pub fn inverted_dropout(&self, queue: &CommandQueue, dest: &Vector, keep_probability: f32) {
        self.check(dest);
        assert!(
            keep_probability > 0.0 && keep_probability <= 1.0,
            "keep probability {keep_probability} outside (0, 1]"
        );
        queue.enqueue_1d(
            &self
                .inverted_dropout
                .invoke()
                .arg(dest)
                .arg(&self.state)
                .arg(keep_probability),
            dest.len(),
        );
    }
}
