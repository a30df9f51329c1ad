use anyhow::{ensure, Context};
use dedispcore::math::geometry::dispersion_delay;
use dedispcore::Dataset;
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration for generating a synthetic dispersed burst.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub channels: usize,
    pub samples: usize,
    pub dt: f64,
    pub freq_top_mhz: f64,
    pub freq_bottom_mhz: f64,
    pub dm: f64,
    /// Arrival sample at the highest channel frequency.
    pub arrival: usize,
    pub amplitude: f32,
    pub noise: f32,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            channels: 64,
            samples: 1024,
            dt: 1e-3,
            freq_top_mhz: 900.0,
            freq_bottom_mhz: 700.0,
            dm: 12.0,
            arrival: 100,
            amplitude: 1.0,
            noise: 0.1,
            seed: 0,
        }
    }
}

impl GeneratorConfig {
    /// Channel centre frequencies, highest first.
    pub fn channel_frequencies(&self) -> Vec<f64> {
        let width = (self.freq_top_mhz - self.freq_bottom_mhz) / self.channels as f64;
        (0..self.channels)
            .map(|index| self.freq_top_mhz - (index as f64 + 0.5) * width)
            .collect()
    }
}

pub fn build_dataset(config: &GeneratorConfig) -> anyhow::Result<Dataset> {
    ensure!(config.channels > 0, "generator needs at least one channel");
    ensure!(config.samples > 0, "generator needs at least one sample");
    ensure!(
        config.freq_top_mhz > config.freq_bottom_mhz && config.freq_bottom_mhz > 0.0,
        "band edges {} / {} MHz are not ordered",
        config.freq_top_mhz,
        config.freq_bottom_mhz
    );
    ensure!(config.dt > 0.0, "sampling interval must be positive");
    ensure!(
        config.dm.is_finite() && config.dm >= 0.0,
        "dispersion measure must be finite and non-negative, got {}",
        config.dm
    );

    let freqs = config.channel_frequencies();
    let reference = freqs[0];
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut raw = Array2::<f32>::zeros((config.channels, config.samples));

    for (mut row, &nu) in raw.outer_iter_mut().zip(freqs.iter()) {
        if config.noise > 0.0 {
            for value in row.iter_mut() {
                *value = rng.gen_range(-config.noise..config.noise);
            }
        }
        // Pulses delayed past the end of the block are dropped.
        let offset = (dispersion_delay(config.dm, nu, reference) / config.dt).round();
        if offset >= config.samples as f64 {
            continue;
        }
        let landed = config
            .arrival
            .checked_add(offset as usize)
            .and_then(|sample| row.get_mut(sample));
        if let Some(value) = landed {
            *value += config.amplitude;
        }
    }

    Dataset::new(freqs, raw, config.dt).context("assembling synthetic dataset")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_builds_expected_shape() {
        let dataset = build_dataset(&GeneratorConfig::default()).unwrap();
        assert_eq!(dataset.raw_nchan(), 64);
        assert_eq!(dataset.ndata(), 1024);
        assert!(dataset.depth().is_none());
    }

    #[test]
    fn noiseless_pulse_lands_on_dispersion_curve() {
        let config = GeneratorConfig {
            channels: 4,
            samples: 256,
            noise: 0.0,
            ..Default::default()
        };
        let dataset = build_dataset(&config).unwrap();
        let raw = dataset.raw_data();
        assert_eq!(raw[[0, config.arrival]], 1.0);
        let arrivals: Vec<usize> = raw
            .outer_iter()
            .map(|row| row.iter().position(|&v| v == 1.0).unwrap())
            .collect();
        assert!(arrivals.windows(2).all(|pair| pair[1] > pair[0]));
        assert_eq!(raw.iter().filter(|&&v| v != 0.0).count(), 4);
    }

    #[test]
    fn generator_rejects_inverted_band() {
        let config = GeneratorConfig {
            freq_top_mhz: 600.0,
            ..Default::default()
        };
        assert!(build_dataset(&config).is_err());
    }

    #[test]
    fn huge_dm_keeps_only_reference_pulse() {
        let config = GeneratorConfig {
            channels: 8,
            samples: 256,
            noise: 0.0,
            dm: 1e30,
            ..Default::default()
        };
        let dataset = build_dataset(&config).unwrap();
        let raw = dataset.raw_data();
        assert_eq!(raw[[0, config.arrival]], 1.0);
        assert_eq!(raw.iter().filter(|&&v| v != 0.0).count(), 1);
    }

    #[test]
    fn generator_rejects_negative_or_nan_dm() {
        for dm in [-50.0, f64::NAN, f64::INFINITY] {
            let config = GeneratorConfig {
                dm,
                ..Default::default()
            };
            assert!(build_dataset(&config).is_err(), "dm {} accepted", dm);
        }
    }
}
