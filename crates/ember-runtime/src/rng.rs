//! Deterministic random number provision.
//!
//! All script-visible randomness flows through an explicitly injected
//! provider; the VM and runtime never touch ambient global state, so tests
//! can substitute fixed sequences.

/// Source of randomness for the `rand`/`randRange`/`randTile` natives.
pub trait RngProvider {
    /// Uniform f64 in [0, 1).
    fn random(&mut self) -> f64;

    /// Uniform f64 in [lo, hi).
    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.random() * (hi - lo)
    }

    /// Called at the start of every `run_init` with the scenario seed.
    /// Providers with externally managed state may ignore it.
    fn reseed(&mut self, _seed: u64) {}
}

/// SplitMix64: fast, portable, reproducible. The default provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub const fn new(seed: u64) -> Self {
        // SplitMix64 requires a non-zero state.
        let state = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        mix(self.state)
    }
}

impl Default for SplitMix64 {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RngProvider for SplitMix64 {
    fn random(&mut self) -> f64 {
        // 53 high bits give a uniform double in [0, 1).
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    fn reseed(&mut self, seed: u64) {
        *self = Self::new(seed);
    }
}

const fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
