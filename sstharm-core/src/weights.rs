//! Per-cell averaging weights
//!
//! Two mutually exclusive strategies, chosen from a source's [`SourcePolicy`]:
//!
//! - **Latitude cosine** for observational products on regular grids, where
//!   cell area is proportional to `cos(lat)`.
//! - **Normalised cell area** for model output, where the native
//!   `areacello` field is divided by its maximum over the grid.
//!
//! Weights always lie in `[0, 1]`. A weight of zero removes a cell from every
//! regional mean regardless of region membership; masked, missing, or
//! non-physical areas are mapped to zero.

use crate::dataset::HorizontalGrid;
use crate::errors::{HarmonizeError, HarmonizeResult};
use crate::policy::SourcePolicy;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// How cell weights are derived.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingStrategy {
    LatitudeCosine,
    NormalizedCellArea,
}

/// Time-invariant weights over a grid's two horizontal dimensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightField {
    strategy: WeightingStrategy,
    values: Array2<f64>,
}

impl WeightField {
    /// Uniform weight of one, mostly useful for tests and unweighted means.
    pub fn uniform(shape: (usize, usize), strategy: WeightingStrategy) -> Self {
        Self {
            strategy,
            values: Array2::ones(shape),
        }
    }

    pub fn strategy(&self) -> WeightingStrategy {
        self.strategy
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Check the weights line up with a grid, cell for cell.
    pub fn check_grid(&self, grid: &HorizontalGrid) -> HarmonizeResult<()> {
        if self.shape() != grid.shape() {
            let (ny, nx) = grid.shape();
            return Err(HarmonizeError::ShapeMismatch {
                context: format!("{:?} weights", self.strategy),
                expected: vec![ny, nx],
                found: self.values.shape().to_vec(),
            });
        }
        Ok(())
    }
}

/// `cos(lat)` weights for a grid.
///
/// # Examples
///
/// ```rust
/// use sstharm_core::dataset::HorizontalGrid;
/// use sstharm_core::weights::latitude_cosine_weights;
///
/// let grid = HorizontalGrid::rectilinear(&[0.0, 60.0], &[140.0, 141.0]);
/// let weights = latitude_cosine_weights(&grid).unwrap();
/// assert_eq!(weights.values()[[0, 1]], 1.0);
/// assert!((weights.values()[[1, 0]] - 0.5).abs() < 1e-12);
/// ```
pub fn latitude_cosine_weights(grid: &HorizontalGrid) -> HarmonizeResult<WeightField> {
    let values = grid
        .lat()?
        .mapv(|lat| sanitize(lat.to_radians().cos().min(1.0)));
    Ok(WeightField {
        strategy: WeightingStrategy::LatitudeCosine,
        values,
    })
}

/// Native cell area divided by its grid maximum.
///
/// Cells with not-a-number or negative area get zero weight. A field with no
/// positive area at all is rejected rather than producing all-zero weights.
pub fn normalized_area_weights(area: &Array2<f64>) -> HarmonizeResult<WeightField> {
    let max_area = area
        .iter()
        .copied()
        .filter(|a| a.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !(max_area > 0.0) {
        return Err(HarmonizeError::Error(
            "cell area field has no positive finite values".to_string(),
        ));
    }
    let values = area.mapv(|a| sanitize(a / max_area));
    Ok(WeightField {
        strategy: WeightingStrategy::NormalizedCellArea,
        values,
    })
}

/// Weights for a source, dispatching on its policy.
///
/// `area` must be supplied for the cell-area strategy; it is ignored for the
/// latitude strategy.
pub fn weights_for_policy(
    policy: &SourcePolicy,
    grid: &HorizontalGrid,
    area: Option<&Array2<f64>>,
) -> HarmonizeResult<WeightField> {
    let weights = match policy.weighting {
        WeightingStrategy::LatitudeCosine => latitude_cosine_weights(grid)?,
        WeightingStrategy::NormalizedCellArea => {
            let area = area.ok_or_else(|| {
                HarmonizeError::MissingVariable(crate::policy::AREA.to_string())
            })?;
            normalized_area_weights(area)?
        }
    };
    weights.check_grid(grid)?;
    Ok(weights)
}

/// Clamp into `[0, 1]`, mapping not-a-number to zero.
fn sanitize(w: f64) -> f64 {
    if w.is_nan() || w < 0.0 {
        0.0
    } else {
        w.min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn cosine_weights_at_equator_and_poles() {
        let grid = HorizontalGrid::rectilinear(&[-90.0, 0.0, 90.0], &[145.0]);
        let w = latitude_cosine_weights(&grid).unwrap();
        assert_eq!(w.values()[[1, 0]], 1.0);
        assert_abs_diff_eq!(w.values()[[0, 0]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w.values()[[2, 0]], 0.0, epsilon = 1e-12);
        assert!(w.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn area_weights_peak_at_one() {
        let area = array![[2.0e9, 4.0e9], [f64::NAN, 1.0e9]];
        let w = normalized_area_weights(&area).unwrap();
        assert_eq!(w.values()[[0, 1]], 1.0);
        assert_eq!(w.values()[[0, 0]], 0.5);
        assert_eq!(w.values()[[1, 0]], 0.0);
        assert_eq!(w.strategy(), WeightingStrategy::NormalizedCellArea);
    }

    #[test]
    fn negative_area_gets_zero_weight() {
        let w = normalized_area_weights(&array![[-1.0, 3.0]]).unwrap();
        assert_eq!(w.values(), &array![[0.0, 1.0]]);
    }

    #[test]
    fn all_missing_area_is_rejected() {
        assert!(normalized_area_weights(&array![[f64::NAN, 0.0]]).is_err());
    }

    #[test]
    fn policy_dispatch() {
        let grid = HorizontalGrid::rectilinear(&[-40.0], &[145.0, 146.0]);
        let obs = weights_for_policy(&SourcePolicy::observation(), &grid, None).unwrap();
        assert_eq!(obs.strategy(), WeightingStrategy::LatitudeCosine);

        assert!(weights_for_policy(&SourcePolicy::model(), &grid, None).is_err());

        let wrong_shape = array![[1.0, 2.0, 3.0]];
        let err = weights_for_policy(&SourcePolicy::model(), &grid, Some(&wrong_shape)).unwrap_err();
        assert!(matches!(err, HarmonizeError::ShapeMismatch { .. }));
    }
}
