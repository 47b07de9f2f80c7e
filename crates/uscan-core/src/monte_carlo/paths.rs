use rand::rngs::StdRng;
use rand::Rng;
use statrs::distribution::Normal;

use super::correlation::CholeskyFactor;
use super::engine::MarketAssumptions;
use crate::error::UscanError;
use crate::structure::Structure;
use crate::types::Price;
use crate::UscanResult;

/// Simulated prices laid out as assets × paths × (steps + 1).
///
/// Step 0 holds the initial prices; the last step is maturity. Each
/// (asset, path) trajectory is contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTensor {
    n_assets: usize,
    n_paths: usize,
    n_steps: usize,
    prices: Vec<Price>,
}

impl PathTensor {
    fn new(n_assets: usize, n_paths: usize, n_steps: usize) -> Self {
        Self {
            n_assets,
            n_paths,
            n_steps,
            prices: vec![0.0; n_assets * n_paths * (n_steps + 1)],
        }
    }

    #[inline]
    fn offset(&self, asset: usize, path: usize) -> usize {
        (asset * self.n_paths + path) * (self.n_steps + 1)
    }

    pub fn n_assets(&self) -> usize {
        self.n_assets
    }

    pub fn n_paths(&self) -> usize {
        self.n_paths
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn price(&self, asset: usize, path: usize, step: usize) -> Price {
        self.prices[self.offset(asset, path) + step]
    }

    /// Full trajectory of one asset along one path, step 0 first.
    pub fn trajectory(&self, asset: usize, path: usize) -> &[Price] {
        let start = self.offset(asset, path);
        &self.prices[start..start + self.n_steps + 1]
    }

    pub fn terminal_price(&self, asset: usize, path: usize) -> Price {
        self.price(asset, path, self.n_steps)
    }

    /// Maturity prices of every asset on `path`.
    pub fn terminal_prices(&self, path: usize) -> Vec<Price> {
        (0..self.n_assets)
            .map(|asset| self.terminal_price(asset, path))
            .collect()
    }

    /// Allocation-free form of `terminal_prices`.
    pub fn terminal_prices_into(&self, path: usize, out: &mut [Price]) {
        for (asset, slot) in out.iter_mut().enumerate().take(self.n_assets) {
            *slot = self.terminal_price(asset, path);
        }
    }
}

/// Evolve correlated GBM paths for every underlying of `structure`.
///
/// Each step draws an assets × paths block of independent standard normals
/// (asset-major), correlates them path by path through `factor`, and applies
/// `S_t = S_{t-1} · exp((r - σ²/2)·dt + σ·√dt·z)`. All intermediate steps
/// are kept.
pub fn simulate_paths(
    structure: &Structure,
    assumptions: &MarketAssumptions,
    factor: &CholeskyFactor,
    rng: &mut StdRng,
    n_paths: usize,
) -> UscanResult<PathTensor> {
    let n_assets = structure.n_assets();
    if factor.dim() != n_assets {
        return Err(UscanError::DimensionMismatch {
            expected: n_assets,
            found: factor.dim(),
        });
    }

    let n_steps = assumptions.effective_steps();
    let n_paths = n_paths.max(1);
    let dt = structure.maturity() / n_steps as f64;
    let sigma = assumptions.volatility;
    let drift = (assumptions.rate - 0.5 * sigma * sigma) * dt;
    let diffusion = sigma * dt.sqrt();

    let normal = Normal::new(0.0, 1.0).map_err(|e| UscanError::InvalidInput {
        field: "distribution".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })?;

    let mut tensor = PathTensor::new(n_assets, n_paths, n_steps);
    for (asset, &s0) in structure.initial_prices().iter().enumerate() {
        for path in 0..n_paths {
            let at = tensor.offset(asset, path);
            tensor.prices[at] = s0;
        }
    }

    let mut shocks = vec![0.0_f64; n_assets * n_paths];
    let mut indep = vec![0.0_f64; n_assets];
    let mut correlated = vec![0.0_f64; n_assets];

    for step in 1..=n_steps {
        for z in shocks.iter_mut() {
            *z = rng.sample(&normal);
        }

        for path in 0..n_paths {
            for (asset, z) in indep.iter_mut().enumerate() {
                *z = shocks[asset * n_paths + path];
            }
            factor.correlate(&indep, &mut correlated);

            for (asset, &z) in correlated.iter().enumerate() {
                let at = tensor.offset(asset, path) + step;
                tensor.prices[at] = tensor.prices[at - 1] * (drift + diffusion * z).exp();
            }
        }
    }

    Ok(tensor)
}
