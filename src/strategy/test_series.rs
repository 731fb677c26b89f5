//! Seeded synthetic price series for unit tests

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

pub struct SeriesGen {
    rng: StdRng,
}

impl SeriesGen {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn noise(std: f64) -> Normal<f64> {
        Normal::new(0.0, std).expect("noise std must be finite and non-negative")
    }

    pub fn random_walk(&mut self, n: usize, start: f64, step_std: f64) -> Vec<f64> {
        let steps = Self::noise(step_std);
        let mut x = start;
        (0..n)
            .map(|_| {
                x += steps.sample(&mut self.rng);
                x
            })
            .collect()
    }

    /// `y[i] = slope * x[i] + N(0, noise_std^2)`
    pub fn linear_with_noise(&mut self, x: &[f64], slope: f64, noise_std: f64) -> Vec<f64> {
        let noise = Self::noise(noise_std);
        x.iter().map(|v| slope * v + noise.sample(&mut self.rng)).collect()
    }

    /// AR(1) around `mu`: x[t] = mu + phi * (x[t-1] - mu) + noise
    pub fn ar1(&mut self, n: usize, mu: f64, phi: f64, noise_std: f64) -> Vec<f64> {
        let noise = Self::noise(noise_std);
        let mut x = mu;
        (0..n)
            .map(|_| {
                x = mu + phi * (x - mu) + noise.sample(&mut self.rng);
                x
            })
            .collect()
    }
}
