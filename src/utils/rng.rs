//! Deterministic random number generation.
//!
//! A small xorshift PRNG keeps experiment runs reproducible from a single seed:
//! weight initialisation, dropout masks and epoch shuffles all draw from it.

/// Fallback state for a zero seed (xorshift never leaves the all-zero state).
const ZERO_SEED_STATE: u64 = 0x9e37_79b9_7f4a_7c15;

/// Xorshift RNG with uniform, normal and shuffling helpers.
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
    /// Second Box-Muller sample, returned by the next `next_gaussian` call.
    spare: Option<f32>,
}

impl SimpleRng {
    /// Create a new RNG with explicit seed (if zero, use a fixed value).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { ZERO_SEED_STATE } else { seed };
        Self { state, spare: None }
    }

    /// Derive an independent generator, e.g. one per experiment variant.
    ///
    /// The child seed mixes the parent seed with `stream` through splitmix64 so
    /// neighbouring stream ids do not produce correlated sequences.
    pub fn fork(seed: u64, stream: u64) -> Self {
        let mut z = seed
            .wrapping_add(stream.wrapping_mul(0x9e37_79b9_7f4a_7c15))
            .wrapping_add(0x9e37_79b9_7f4a_7c15);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        Self::new(z ^ (z >> 31))
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 32) as u32
    }

    /// Uniform sample in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        // 24 bits fit the f32 mantissa exactly, so the result never rounds up to 1.0.
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Normal sample with the given mean and standard deviation (Box-Muller).
    pub fn next_gaussian(&mut self, mean: f32, std_dev: f32) -> f32 {
        if let Some(z) = self.spare.take() {
            return mean + std_dev * z;
        }

        // u1 in (0, 1] so ln(u1) is finite.
        let u1 = 1.0 - self.next_f32();
        let u2 = self.next_f32();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f32::consts::PI * u2;

        self.spare = Some(radius * theta.sin());
        mean + std_dev * radius * theta.cos()
    }

    /// Integer sample in [0, upper).
    pub fn gen_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            (self.next_u32() as usize) % upper
        }
    }

    /// Fisher-Yates shuffle for usize slices.
    pub fn shuffle_usize(&mut self, data: &mut [usize]) {
        if data.len() <= 1 {
            return;
        }
        for i in (1..data.len()).rev() {
            let j = self.gen_usize(i + 1);
            data.swap(i, j);
        }
    }
}
