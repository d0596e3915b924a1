//! Weighted regional means
//!
//! For each region and time step the horizontal dimensions are reduced with
//!
//! ```text
//! mean = sum(value * mask * weight) / sum(mask * weight)
//! ```
//!
//! where both sums skip cells whose value is missing. Values at or below zero
//! are treated as missing: several models store land as zero SST.

use crate::calendar::CfDateTime;
use crate::dataset::{Gridded, GriddedField, Temporal};
use crate::errors::{HarmonizeError, HarmonizeResult};
use crate::regions::RegionMaskSet;
use crate::weights::WeightField;
use ndarray::{Array2, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

fn is_physical(value: f64) -> bool {
    value > 0.0
}

/// Replace non-positive (and already missing) values with not-a-number.
pub fn mask_unphysical(field: GriddedField) -> GriddedField {
    field.map_values(|v| if is_physical(v) { v } else { f64::NAN })
}

/// Time series of one region's weighted mean.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionalIndexSeries {
    pub region_code: String,
    pub region_name: String,
    times: Vec<CfDateTime>,
    values: Vec<f64>,
}

impl RegionalIndexSeries {
    pub fn new(region_code: &str, region_name: &str) -> Self {
        Self {
            region_code: region_code.to_string(),
            region_name: region_name.to_string(),
            times: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn push(&mut self, time: CfDateTime, value: f64) {
        self.times.push(time);
        self.values.push(value);
    }

    pub fn times(&self) -> &[CfDateTime] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CfDateTime, f64)> + '_ {
        self.times.iter().zip(self.values.iter().copied())
    }
}

fn weighted_mean(values: ArrayView2<f64>, cell_weights: &Array2<f64>) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    Zip::from(values).and(cell_weights).for_each(|&v, &w| {
        if is_physical(v) && w > 0.0 {
            numerator += v * w;
            denominator += w;
        }
    });
    if denominator > 0.0 {
        numerator / denominator
    } else {
        f64::NAN
    }
}

/// Reduce a field to one weighted-mean series per region.
///
/// The masks and weights must have been built for the field's grid. A region
/// with no valid weighted cells at a time step yields not-a-number there.
pub fn weighted_regional_means(
    field: &GriddedField,
    masks: &RegionMaskSet,
    weights: &WeightField,
) -> HarmonizeResult<Vec<RegionalIndexSeries>> {
    let grid_shape = field.grid().shape();
    if masks.grid_shape() != grid_shape {
        return Err(HarmonizeError::ShapeMismatch {
            context: "region masks".to_string(),
            expected: vec![grid_shape.0, grid_shape.1],
            found: vec![masks.grid_shape().0, masks.grid_shape().1],
        });
    }
    weights.check_grid(field.grid())?;

    let mut out = Vec::with_capacity(masks.len());
    for (i, (code, name)) in masks.codes().iter().zip(masks.names()).enumerate() {
        let cell_weights = &masks.layer(i) * weights.values();
        let mut series = RegionalIndexSeries::new(code, name);
        for (time, step) in field
            .times()
            .iter()
            .zip(field.values().axis_iter(Axis(0)))
        {
            series.push(*time, weighted_mean(step, &cell_weights));
        }
        out.push(series);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarKind;
    use crate::dataset::HorizontalGrid;
    use crate::regions::{Region, RegionSet};
    use crate::weights::WeightingStrategy;
    use ndarray::Array3;

    fn two_by_two(values: [f64; 4]) -> GriddedField {
        let grid = HorizontalGrid::rectilinear(&[-43.0, -40.0], &[144.0, 148.0]);
        let time = vec![CfDateTime::ymd(CalendarKind::NoLeap, 1990, 1, 1).unwrap()];
        GriddedField::new(
            "sst",
            time,
            grid,
            Array3::from_shape_vec((1, 2, 2), values.to_vec()).unwrap(),
        )
        .unwrap()
    }

    /// Mask covering the first row (the first two cells).
    fn first_row_masks(field: &GriddedField) -> RegionMaskSet {
        let set = RegionSet::new(
            "test",
            vec![Region::from_box("south", "South", [140.0, 150.0, -45.0, -41.0])],
        );
        set.mask_3d(field.grid()).unwrap()
    }

    #[test]
    fn mean_of_first_two_cells() {
        let field = two_by_two([10.0, 20.0, 30.0, 40.0]);
        let masks = first_row_masks(&field);
        let weights = WeightField::uniform((2, 2), WeightingStrategy::NormalizedCellArea);
        let series = weighted_regional_means(&field, &masks, &weights).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].values(), &[15.0]);
        assert_eq!(series[0].region_code, "south");
    }

    #[test]
    fn zero_and_missing_values_are_skipped() {
        let field = two_by_two([0.0, 20.0, f64::NAN, 40.0]);
        let masks = first_row_masks(&field);
        let weights = WeightField::uniform((2, 2), WeightingStrategy::NormalizedCellArea);
        let series = weighted_regional_means(&field, &masks, &weights).unwrap();
        assert_eq!(series[0].values(), &[20.0]);
    }

    #[test]
    fn empty_region_is_nan() {
        let field = two_by_two([-1.0, -2.0, 30.0, 40.0]);
        let masks = first_row_masks(&field);
        let weights = WeightField::uniform((2, 2), WeightingStrategy::LatitudeCosine);
        let series = weighted_regional_means(&field, &masks, &weights).unwrap();
        assert!(series[0].values()[0].is_nan());
    }

    #[test]
    fn mask_unphysical_sets_nan() {
        let field = mask_unphysical(two_by_two([0.0, -3.0, 1.5, 2.0]));
        assert!(field.values()[[0, 0, 0]].is_nan());
        assert!(field.values()[[0, 0, 1]].is_nan());
        assert_eq!(field.values()[[0, 1, 0]], 1.5);
    }

    #[test]
    fn mismatched_weights_are_rejected() {
        let field = two_by_two([10.0, 20.0, 30.0, 40.0]);
        let masks = first_row_masks(&field);
        let weights = WeightField::uniform((3, 2), WeightingStrategy::LatitudeCosine);
        assert!(weighted_regional_means(&field, &masks, &weights).is_err());
    }
}
