//! Named sub-regions and their rasterised masks
//!
//! Regions are simple polygons of `(lon, lat)` vertices, longitudes in the
//! 0–360 convention. A grid cell belongs to a region when its centre lies
//! inside the polygon by the even-odd rule. For axis-aligned boxes this puts
//! the west and south edges inside and the east and north edges outside, so
//! boxes that share an edge never both claim a cell.
//!
//! The Tasmanian case study uses five boxes: the whole region and four
//! quadrants split at 146.5°E and 42°S. The quadrants cover
//! 143.5–149.5°E × 44.5–39.5°S, a strict subset of the whole-region box.

use crate::dataset::HorizontalGrid;
use crate::errors::{HarmonizeError, HarmonizeResult};
use log::debug;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Header describing the Tasmanian region set
pub const TASMANIA_HEADER: &str = "Tasmanian case study regions";

/// A named polygon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    code: String,
    name: String,
    vertices: Vec<(f64, f64)>,
}

impl Region {
    pub fn new(code: &str, name: &str, vertices: Vec<(f64, f64)>) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            vertices,
        }
    }

    /// Quadrilateral from `[west, east, south, north]`.
    pub fn from_box(code: &str, name: &str, bounds: [f64; 4]) -> Self {
        let [west, east, south, north] = bounds;
        Self::new(
            code,
            name,
            vec![(west, south), (west, north), (east, north), (east, south)],
        )
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// Even-odd point-in-polygon test.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let n = self.vertices.len();
        if n < 3 || !lon.is_finite() || !lat.is_finite() {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// An ordered collection of regions under a common header.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionSet {
    name: String,
    regions: Vec<Region>,
}

impl RegionSet {
    pub fn new(name: &str, regions: Vec<Region>) -> Self {
        Self {
            name: name.to_string(),
            regions,
        }
    }

    /// Whole Tasmanian region and its four quadrants.
    pub fn tasmania() -> Self {
        Self::new(
            TASMANIA_HEADER,
            vec![
                Region::from_box("tas_all", "Whole Tas region", [142.0, 151.0, -45.0, -39.0]),
                Region::from_box("tas_se", "SE Tas", [146.5, 149.5, -44.5, -42.0]),
                Region::from_box("tas_ne", "NE Tas", [146.5, 149.5, -42.0, -39.5]),
                Region::from_box("tas_sw", "SW Tas", [143.5, 146.5, -44.5, -42.0]),
                Region::from_box("tas_nw", "NW Tas", [143.5, 146.5, -42.0, -39.5]),
            ],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// Rasterise every region onto a grid's cell centres.
    ///
    /// Cell longitudes are wrapped into [0, 360) before testing. Regions that
    /// cover no cell keep an all-zero layer so the region axis is the same for
    /// every grid; the grid is rejected only when no region covers anything.
    pub fn mask_3d(&self, grid: &HorizontalGrid) -> HarmonizeResult<RegionMaskSet> {
        if self.regions.is_empty() {
            return Err(HarmonizeError::RegionMaskGeometry(
                "no regions to rasterise".to_string(),
            ));
        }
        if grid.is_empty() {
            return Err(HarmonizeError::RegionMaskGeometry(format!(
                "grid has shape {:?}",
                grid.shape()
            )));
        }
        let lon = grid
            .lon()
            .map_err(|e| HarmonizeError::RegionMaskGeometry(e.to_string()))?;
        let lat = grid
            .lat()
            .map_err(|e| HarmonizeError::RegionMaskGeometry(e.to_string()))?;

        let (ny, nx) = grid.shape();
        let mut masks = Array3::zeros((self.regions.len(), ny, nx));
        for (region, mut layer) in self.regions.iter().zip(masks.outer_iter_mut()) {
            let mut cells = 0usize;
            ndarray::Zip::from(&mut layer)
                .and(lon)
                .and(lat)
                .for_each(|m, &x, &y| {
                    if region.contains(x.rem_euclid(360.0), y) {
                        *m = 1.0;
                        cells += 1;
                    }
                });
            debug!("region {} covers {} cells", region.code(), cells);
        }
        if masks.iter().all(|m| *m == 0.0) {
            return Err(HarmonizeError::RegionMaskGeometry(format!(
                "no {} cell centres fall inside any region",
                self.name
            )));
        }

        Ok(RegionMaskSet {
            header: self.name.clone(),
            codes: self.regions.iter().map(|r| r.code.clone()).collect(),
            names: self.regions.iter().map(|r| r.name.clone()).collect(),
            masks,
        })
    }
}

/// Membership layers laid out (region, y, x), values in [0, 1].
///
/// Only valid for the grid it was built from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionMaskSet {
    header: String,
    codes: Vec<String>,
    names: Vec<String>,
    masks: Array3<f64>,
}

impl RegionMaskSet {
    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn grid_shape(&self) -> (usize, usize) {
        let (_, ny, nx) = self.masks.dim();
        (ny, nx)
    }

    pub fn masks(&self) -> &Array3<f64> {
        &self.masks
    }

    pub fn layer(&self, index: usize) -> ArrayView2<'_, f64> {
        self.masks.index_axis(Axis(0), index)
    }

    /// Layer for a region code
    pub fn layer_for(&self, code: &str) -> Option<ArrayView2<'_, f64>> {
        self.codes
            .iter()
            .position(|c| c == code)
            .map(|i| self.masks.slice(s![i, .., ..]))
    }

    /// Sum of the given layers, cell by cell.
    pub fn sum_layers(&self, codes: &[&str]) -> Array2<f64> {
        let mut total = Array2::zeros(self.grid_shape());
        for layer in codes.iter().filter_map(|c| self.layer_for(c)) {
            total += &layer;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_degree_grid() -> HorizontalGrid {
        let lat: Vec<f64> = (0..29).map(|j| -49.0 + 0.5 * j as f64).collect();
        let lon: Vec<f64> = (0..35).map(|i| 138.0 + 0.5 * i as f64).collect();
        HorizontalGrid::rectilinear(&lat, &lon)
    }

    #[test]
    fn box_edges_are_half_open() {
        let region = Region::from_box("r", "R", [146.5, 149.5, -44.5, -42.0]);
        assert!(region.contains(146.5, -44.5));
        assert!(!region.contains(149.5, -43.0));
        assert!(!region.contains(147.0, -42.0));
        assert!(region.contains(149.49, -42.01));
    }

    #[test]
    fn tasmania_codes_and_names() {
        let set = RegionSet::tasmania();
        let codes: Vec<_> = set.iter().map(|r| r.code()).collect();
        assert_eq!(codes, vec!["tas_all", "tas_se", "tas_ne", "tas_sw", "tas_nw"]);
        assert_eq!(set.iter().next().unwrap().name(), "Whole Tas region");
        assert_eq!(set.name(), TASMANIA_HEADER);
    }

    #[test]
    fn quadrants_never_double_count() {
        let masks = RegionSet::tasmania().mask_3d(&half_degree_grid()).unwrap();
        let quadrants = masks.sum_layers(&["tas_se", "tas_ne", "tas_sw", "tas_nw"]);
        let whole = masks.layer_for("tas_all").unwrap();
        assert!(quadrants.iter().all(|v| *v <= 1.0));
        assert!(quadrants.iter().zip(whole.iter()).all(|(q, w)| q <= w));
    }

    #[test]
    fn signed_longitudes_are_wrapped() {
        let grid = HorizontalGrid::rectilinear(&[-43.0], &[-212.0, 147.0]);
        let masks = RegionSet::tasmania().mask_3d(&grid).unwrap();
        assert_eq!(masks.layer_for("tas_se").unwrap()[[0, 0]], 1.0);
        assert_eq!(masks.layer_for("tas_se").unwrap()[[0, 1]], 1.0);
    }

    #[test]
    fn grid_outside_every_region_is_rejected() {
        let grid = HorizontalGrid::rectilinear(&[10.0], &[20.0]);
        let err = RegionSet::tasmania().mask_3d(&grid).unwrap_err();
        assert!(matches!(err, HarmonizeError::RegionMaskGeometry(_)));
    }

    #[test]
    fn grid_without_coordinates_is_rejected() {
        let grid = HorizontalGrid::new("y", "x", (2, 2));
        assert!(matches!(
            RegionSet::tasmania().mask_3d(&grid),
            Err(HarmonizeError::RegionMaskGeometry(_))
        ));
    }
}
