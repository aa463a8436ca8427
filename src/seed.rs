// --- Файл: src/seed.rs ---

//! Deterministic seeding of every random source a training run touches.
//!
//! Instead of mutating process-wide generators, callers own a
//! [`RandomContext`] and pass it to whatever needs randomness (parameter
//! initialisation, samplers, dropout masks). Reseeding the context
//! resynchronises all of its sources at once.
//!
//! ```
//! use modelkit::seed::RandomContext;
//!
//! let mut a = RandomContext::new(42);
//! let mut b = RandomContext::new(42);
//! assert_eq!(a.uniform(0.0, 1.0), b.uniform(0.0, 1.0));
//! ```

use ndarray::{ArrayD, IxDyn};
use ndarray_rand::rand_distr::{Normal, NormalError, Uniform};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// Per-source salts keep the streams decorrelated while staying reproducible.
const TENSOR_SALT: u64 = 0x9E37_79B9_7F4A_7C15;
const DEVICE_SALT: u64 = 0xD1B5_4A32_D192_ED03;

/// A set of seeded generators: one for plain numbers, one for tensors and
/// one per accelerator device.
#[derive(Debug, Clone)]
pub struct RandomContext {
    seed: u64,
    numeric: StdRng,
    tensor: StdRng,
    devices: Vec<(usize, StdRng)>,
}

impl RandomContext {
    /// Creates a context with no accelerator devices.
    pub fn new(seed: u64) -> Self {
        Self::with_devices(seed, std::iter::empty())
    }

    /// Creates a context that also owns a generator for each listed device
    /// ordinal. An empty list is a normal CPU-only setup.
    pub fn with_devices(seed: u64, devices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            seed,
            numeric: StdRng::seed_from_u64(seed),
            tensor: StdRng::seed_from_u64(seed ^ TENSOR_SALT),
            devices: devices
                .into_iter()
                .map(|id| (id, StdRng::seed_from_u64(seed ^ DEVICE_SALT)))
                .collect(),
        }
    }

    /// Reseeds every source. Calling it twice with the same seed puts the
    /// context back into the same state.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.numeric = StdRng::seed_from_u64(seed);
        self.tensor = StdRng::seed_from_u64(seed ^ TENSOR_SALT);
        // All devices share one seed, like a "seed all" call on a GPU runtime.
        for (_, rng) in &mut self.devices {
            *rng = StdRng::seed_from_u64(seed ^ DEVICE_SALT);
        }
        tracing::debug!(seed, devices = self.devices.len(), "reseeded random context");
    }

    /// The seed the context was last reset with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// General-purpose numeric generator.
    pub fn numeric(&mut self) -> &mut StdRng {
        &mut self.numeric
    }

    /// Generator for the given device ordinal, if the context owns one.
    pub fn device(&mut self, id: usize) -> Option<&mut StdRng> {
        self.devices
            .iter_mut()
            .find(|(dev, _)| *dev == id)
            .map(|(_, rng)| rng)
    }

    /// Generator reserved for tensor initialisation.
    pub fn tensor(&mut self) -> &mut StdRng {
        &mut self.tensor
    }

    /// Device ordinals this context seeds.
    pub fn device_ids(&self) -> Vec<usize> {
        self.devices.iter().map(|(id, _)| *id).collect()
    }

    /// Draws one number from `[low, high)` using the numeric generator.
    ///
    /// Panics if `low >= high`, as `gen_range` does.
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.numeric.gen_range(low..high)
    }

    /// Tensor of the given shape filled from `U[low, high)`.
    ///
    /// Panics if `low >= high`, as `Uniform::new` does.
    pub fn uniform_tensor(&mut self, shape: &[usize], low: f32, high: f32) -> ArrayD<f32> {
        ArrayD::random_using(IxDyn(shape), Uniform::new(low, high), &mut self.tensor)
    }

    /// Tensor of the given shape filled from `N(mean, std^2)`.
    pub fn normal_tensor(
        &mut self,
        shape: &[usize],
        mean: f32,
        std: f32,
    ) -> Result<ArrayD<f32>, NormalError> {
        let dist = Normal::new(mean, std)?;
        Ok(ArrayD::random_using(IxDyn(shape), dist, &mut self.tensor))
    }
}
