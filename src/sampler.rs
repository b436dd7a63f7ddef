use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Gamma, Normal, Poisson};

use crate::config::{ConfigError, PremiumConfig, SeverityConfig, SimulationConfig};

/// Source of every random input the driver consumes.
///
/// The waterfall never draws anything itself, so tests can swap in a
/// scripted implementation and drive the hive with known numbers.
pub trait Sampler {
    /// `n` premiums, already truncated to whole units and clamped at zero.
    fn premiums(&mut self, n: usize) -> Vec<f64>;
    /// One claim count per period.
    fn claim_counts(&mut self, periods: usize) -> Vec<u64>;
    /// `n` claim severities, truncated to non-negative whole units.
    fn claim_severities(&mut self, n: usize) -> Vec<f64>;
    /// Uniform index in `0..population`.
    fn pick_bee(&mut self, population: usize) -> usize;
}

pub struct PremiumModel {
    dist: Normal<f64>,
}

impl PremiumModel {
    pub fn new(config: &PremiumConfig) -> Result<Self, ConfigError> {
        let dist = Normal::new(config.mean, config.std_dev)
            .map_err(|_| ConfigError::Parameter { name: "premium.std_dev", value: config.std_dev })?;
        Ok(PremiumModel { dist })
    }

    /// Gaussian draws can go negative; a negative premium is charged as zero.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        self.dist.sample(rng).max(0.0).trunc()
    }
}

pub enum SeverityModel {
    Normal(Normal<f64>),
    Gamma { dist: Gamma<f64>, scale_factor: f64 },
}

impl SeverityModel {
    pub fn new(config: &SeverityConfig) -> Result<Self, ConfigError> {
        match *config {
            SeverityConfig::Normal { mean, std_dev } => Normal::new(mean, std_dev)
                .map(SeverityModel::Normal)
                .map_err(|_| ConfigError::Parameter { name: "severity.std_dev", value: std_dev }),
            SeverityConfig::Gamma { shape, scale, scale_factor } => Gamma::new(shape, scale)
                .map(|dist| SeverityModel::Gamma { dist, scale_factor })
                .map_err(|_| ConfigError::Parameter { name: "severity.shape", value: shape }),
        }
    }

    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        let raw = match self {
            SeverityModel::Normal(dist) => dist.sample(rng),
            SeverityModel::Gamma { dist, scale_factor } => dist.sample(rng) * scale_factor,
        };
        raw.max(0.0).trunc()
    }
}

/// Production sampler: the configured distributions over a seeded ChaCha20 stream.
pub struct DistributionSampler<R = ChaCha20Rng> {
    rng: R,
    premium: PremiumModel,
    claims: Poisson<f64>,
    severity: SeverityModel,
}

impl DistributionSampler<ChaCha20Rng> {
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigError> {
        Self::with_rng(config, ChaCha20Rng::seed_from_u64(config.seed))
    }
}

impl<R: Rng> DistributionSampler<R> {
    pub fn with_rng(config: &SimulationConfig, rng: R) -> Result<Self, ConfigError> {
        let claims = Poisson::new(config.claim_rate_lambda).map_err(|_| ConfigError::Parameter {
            name: "claim_rate_lambda",
            value: config.claim_rate_lambda,
        })?;
        Ok(DistributionSampler {
            rng,
            premium: PremiumModel::new(&config.premium)?,
            claims,
            severity: SeverityModel::new(&config.severity)?,
        })
    }
}

impl<R: Rng> Sampler for DistributionSampler<R> {
    fn premiums(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.premium.sample(&mut self.rng)).collect()
    }

    fn claim_counts(&mut self, periods: usize) -> Vec<u64> {
        (0..periods).map(|_| self.claims.sample(&mut self.rng) as u64).collect()
    }

    fn claim_severities(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.severity.sample(&mut self.rng)).collect()
    }

    fn pick_bee(&mut self, population: usize) -> usize {
        self.rng.random_range(0..population)
    }
}
