//! Piecewise-constant sampling distributions.
//!
//! These tables importance-sample among surface lights (discrete, one weight
//! per light), among the primitives of an emissive mesh (discrete, one weight
//! per triangle area), and over environment importance maps (continuous 2D).
//!
//! Prefix sums are accumulated with a compensated (Kahan) running sum so a
//! long run of small weights does not drift, and sampling walks the CDF with
//! a descending power-of-two stride instead of a generic binary search.

use crate::errors::{Result, SceneError};

/// Kahan summation accumulator.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CompensatedSum {
    result: f32,
    comp: f32,
}

impl CompensatedSum {
    pub(crate) fn add(&mut self, value: f32) {
        let corrected = value - self.comp;
        let sum = self.result + corrected;
        self.comp = (sum - self.result) - corrected;
        self.result = sum;
    }

    pub(crate) fn value(&self) -> f32 {
        self.result
    }
}

/// Largest power of two that is `<= x`. `x` must be non-zero.
#[inline]
fn prev_power_of_two(x: usize) -> usize {
    1 << (usize::BITS - 1 - x.leading_zeros())
}

fn validate_weights(weights: &[f32]) -> Result<()> {
    if weights.is_empty() {
        return Err(SceneError::EmptyDistribution);
    }
    for (index, &value) in weights.iter().enumerate() {
        if value < 0.0 {
            return Err(SceneError::NegativeWeight { index, value });
        }
    }
    Ok(())
}

/// Finds the interval containing `u` in a normalized CDF of `num_values + 1`
/// entries, by descending power-of-two strides.
#[inline]
fn find_interval(cdf: &[f32], num_values: usize, u: f32) -> usize {
    debug_assert!((0.0..1.0).contains(&u), "u must be in [0, 1): {u}");
    let mut idx = num_values;
    let mut d = prev_power_of_two(num_values);
    while d > 0 {
        if idx >= d {
            let new_idx = idx - d;
            if new_idx > 0 && cdf[new_idx] > u {
                idx = new_idx;
            }
        }
        d >>= 1;
    }
    idx - 1
}

/// A discrete distribution over `N` non-negative weights.
#[derive(Debug, Clone)]
pub struct DiscreteDistribution1d {
    pmf: Vec<f32>,
    /// `len() + 1` entries, normalized to `[0, 1]` when the integral is
    /// non-zero. All zero when every weight is zero.
    cdf: Vec<f32>,
    integral: f32,
}

impl DiscreteDistribution1d {
    pub fn new(weights: &[f32]) -> Result<Self> {
        validate_weights(weights)?;

        let n = weights.len();
        let mut cdf = Vec::with_capacity(n + 1);
        cdf.push(0.0);
        let mut sum = CompensatedSum::default();
        for &w in weights {
            sum.add(w);
            cdf.push(sum.result);
        }
        let integral = sum.result;

        let mut pmf = weights.to_vec();
        if integral > 0.0 {
            for p in &mut pmf {
                *p /= integral;
            }
            for c in &mut cdf {
                *c /= integral;
            }
        } else {
            // Degenerate: nothing to sample. Leave the CDF at zero; sampling
            // returns the last interval with probability mass 0.
            pmf.fill(0.0);
            cdf.fill(0.0);
        }

        Ok(Self { pmf, cdf, integral })
    }

    /// Samples an interval index for a uniform `u` in `[0, 1)`.
    ///
    /// Returns the index and its probability mass.
    #[must_use]
    pub fn sample(&self, u: f32) -> (usize, f32) {
        let idx = find_interval(&self.cdf, self.pmf.len(), u);
        (idx, self.pmf[idx])
    }

    /// Like [`sample`](Self::sample), additionally remapping `u` to a uniform
    /// position within the chosen interval.
    #[must_use]
    pub fn sample_remapped(&self, u: f32) -> (usize, f32, f32) {
        let idx = find_interval(&self.cdf, self.pmf.len(), u);
        let width = self.cdf[idx + 1] - self.cdf[idx];
        let remapped = if width > 0.0 {
            (u - self.cdf[idx]) / width
        } else {
            0.0
        };
        (idx, self.pmf[idx], remapped)
    }

    #[must_use]
    pub fn pmf(&self, idx: usize) -> f32 {
        self.pmf[idx]
    }

    #[must_use]
    pub fn integral(&self) -> f32 {
        self.integral
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pmf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pmf.is_empty()
    }
}

/// A regular piecewise-constant continuous distribution over `[0, 1)`.
#[derive(Debug, Clone)]
pub struct ContinuousDistribution1d {
    pdf: Vec<f32>,
    cdf: Vec<f32>,
    integral: f32,
}

impl ContinuousDistribution1d {
    pub fn new(weights: &[f32]) -> Result<Self> {
        validate_weights(weights)?;

        let n = weights.len();
        let mut cdf = Vec::with_capacity(n + 1);
        cdf.push(0.0);
        let mut sum = CompensatedSum::default();
        for &w in weights {
            sum.add(w / n as f32);
            cdf.push(sum.result);
        }
        let integral = sum.result;

        let mut pdf = weights.to_vec();
        if integral > 0.0 {
            for p in &mut pdf {
                *p /= integral;
            }
            for c in &mut cdf {
                *c /= integral;
            }
        } else {
            pdf.fill(0.0);
            cdf.fill(0.0);
        }

        Ok(Self { pdf, cdf, integral })
    }

    /// Samples a continuous value in `[0, 1)` for a uniform `u` in `[0, 1)`.
    ///
    /// Returns the sample and its probability density.
    #[must_use]
    pub fn sample(&self, u: f32) -> (f32, f32) {
        let n = self.pdf.len();
        let idx = find_interval(&self.cdf, n, u);
        let width = self.cdf[idx + 1] - self.cdf[idx];
        let t = if width > 0.0 {
            (u - self.cdf[idx]) / width
        } else {
            0.0
        };
        ((idx as f32 + t) / n as f32, self.pdf[idx])
    }

    /// Density at `x` in `[0, 1)`.
    #[must_use]
    pub fn pdf_at(&self, x: f32) -> f32 {
        let n = self.pdf.len();
        let idx = ((x * n as f32) as usize).min(n - 1);
        self.pdf[idx]
    }

    #[must_use]
    pub fn integral(&self) -> f32 {
        self.integral
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pdf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pdf.is_empty()
    }
}

/// A 2D distribution: a marginal over rows composed with one conditional
/// distribution per row. Sampling is hierarchical and rejection-free.
#[derive(Debug, Clone)]
pub struct ContinuousDistribution2d {
    conditional: Vec<ContinuousDistribution1d>,
    marginal: ContinuousDistribution1d,
}

impl ContinuousDistribution2d {
    /// Builds from a row-major weight buffer of `width * height` entries.
    pub fn new(weights: &[f32], width: usize, height: usize) -> Result<Self> {
        let expected = width * height;
        if weights.len() != expected {
            return Err(SceneError::DimensionMismatch {
                got: weights.len(),
                expected,
            });
        }

        let mut conditional = Vec::with_capacity(height);
        let mut row_integrals = Vec::with_capacity(height);
        for row in weights.chunks_exact(width) {
            let dist = ContinuousDistribution1d::new(row)?;
            row_integrals.push(dist.integral());
            conditional.push(dist);
        }
        let marginal = ContinuousDistribution1d::new(&row_integrals)?;

        Ok(Self {
            conditional,
            marginal,
        })
    }

    /// Samples `(d0, d1)` in `[0, 1)^2` and the joint probability density.
    /// `d1` selects a row via the marginal; `d0` samples within that row.
    #[must_use]
    pub fn sample(&self, u0: f32, u1: f32) -> (f32, f32, f32) {
        let (d1, top_pdf) = self.marginal.sample(u1);
        let rows = self.conditional.len();
        let row = ((d1 * rows as f32) as usize).min(rows - 1);
        let (d0, pdf) = self.conditional[row].sample(u0);
        (d0, d1, pdf * top_pdf)
    }

    /// Joint density at `(d0, d1)`.
    #[must_use]
    pub fn pdf_at(&self, d0: f32, d1: f32) -> f32 {
        let rows = self.conditional.len();
        let row = ((d1 * rows as f32) as usize).min(rows - 1);
        self.marginal.pdf_at(d1) * self.conditional[row].pdf_at(d0)
    }
}
