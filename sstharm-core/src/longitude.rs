//! Longitude convention detection and coordinate-name harmonisation
//!
//! Archives disagree on how longitude is expressed. Three conventions occur in
//! practice, told apart by where the grid's largest longitude falls relative to
//! a target box given in the 0–360 convention:
//!
//! | max(lon)                       | convention                     |
//! |--------------------------------|--------------------------------|
//! | above the box's east edge      | [`LonConvention::ZeroTo360`]       |
//! | strictly inside (west, east)   | [`LonConvention::SignedOneEighty`] |
//! | below the box's west edge      | [`LonConvention::ShiftedNegative`] |
//!
//! The convention is resolved once per dataset by [`classify_longitude`] and then
//! drives the box filter in [`trim_to_box`].
//!
//! Coordinate spellings are also harmonised: `longitude`/`latitude` and
//! `nav_lon`/`nav_lat` become `lon`/`lat`.

use crate::dataset::{CellSelection, Gridded, LAT, LON};
use crate::errors::{HarmonizeError, HarmonizeResult};
use log::{debug, warn};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Alternate coordinate spellings, in the order they are tried.
const ALTERNATE_NAMES: [(&str, &str); 2] = [("longitude", "latitude"), ("nav_lon", "nav_lat")];

/// A longitude/latitude box, longitudes in the 0–360 convention.
///
/// All edges are exclusive when filtering cells.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Build from `[west, east, south, north]`, rejecting inverted bounds.
    pub fn from_bounds(bounds: [f64; 4]) -> HarmonizeResult<Self> {
        let [west, east, south, north] = bounds;
        if !(west < east && south < north) {
            return Err(HarmonizeError::Config(format!(
                "bounding box {bounds:?} must satisfy west < east and south < north"
            )));
        }
        Ok(Self {
            west,
            east,
            south,
            north,
        })
    }

    /// Storage box for the Tasmanian region, 138E-155E, 49S-35S
    pub fn tasmania() -> Self {
        Self {
            west: 138.0,
            east: 155.0,
            south: -49.0,
            north: -35.0,
        }
    }

    pub fn as_bounds(&self) -> [f64; 4] {
        [self.west, self.east, self.south, self.north]
    }

    fn includes_lat(&self, lat: f64) -> bool {
        lat > self.south && lat < self.north
    }
}

/// How a dataset expresses longitude.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LonConvention {
    /// Longitudes span 0..360
    ZeroTo360,
    /// Longitudes span -180..180
    SignedOneEighty,
    /// Longitudes are shifted down by a full turn, e.g. -300..60
    ShiftedNegative,
}

impl LonConvention {
    /// Whether `lon`, in this convention, falls inside the box's longitude band.
    pub fn includes(&self, lon: f64, bbox: &BoundingBox) -> bool {
        match self {
            LonConvention::ZeroTo360 => lon > bbox.west && lon < bbox.east,
            LonConvention::SignedOneEighty => lon > bbox.west || lon < bbox.east - 360.0,
            LonConvention::ShiftedNegative => {
                lon > bbox.west - 360.0 && lon < bbox.east - 360.0
            }
        }
    }
}

/// Whether trimmed longitudes are re-expressed in the 0–360 convention.
///
/// The SST extraction wraps; the cell-area extraction keeps the native
/// convention because area fields are reduced to weights before any
/// coordinate-based join.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LongitudeRemap {
    Wrap,
    Preserve,
}

/// Classify a grid's longitude convention from its largest longitude.
///
/// A maximum landing exactly on a box edge matches none of the conventions.
pub fn classify_longitude(max_lon: f64, bbox: &BoundingBox) -> HarmonizeResult<LonConvention> {
    if max_lon > bbox.east {
        Ok(LonConvention::ZeroTo360)
    } else if max_lon > bbox.west && max_lon < bbox.east {
        Ok(LonConvention::SignedOneEighty)
    } else if max_lon < bbox.west {
        Ok(LonConvention::ShiftedNegative)
    } else {
        Err(HarmonizeError::LongitudeConvention {
            max_lon,
            west: bbox.west,
            east: bbox.east,
        })
    }
}

/// Rename alternate coordinate spellings to canonical `lon`/`lat`.
///
/// When an alternate pair coexists with the canonical names the alternate
/// pair is dropped and a [`HarmonizeError::CoordinateAmbiguity`] is logged as a
/// warning; processing continues.
pub fn normalize_coordinate_names<G: Gridded>(mut field: G) -> HarmonizeResult<G> {
    let grid = field.grid_mut();
    for (alt_lon, alt_lat) in ALTERNATE_NAMES {
        if !grid.has_coordinate(alt_lon) && !grid.has_coordinate(alt_lat) {
            continue;
        }
        if grid.has_coordinate(LON) {
            let ambiguity = HarmonizeError::CoordinateAmbiguity {
                canonical: LON.to_string(),
                alternate: alt_lon.to_string(),
            };
            warn!("{ambiguity}");
            grid.drop_coordinate(alt_lon);
            grid.drop_coordinate(alt_lat);
        } else {
            for (from, to) in [(alt_lon, LON), (alt_lat, LAT)] {
                if grid.has_coordinate(from) && !grid.has_coordinate(to) {
                    grid.rename_coordinate(from, to)?;
                }
            }
        }
        break;
    }
    Ok(field)
}

fn finite_max(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        Some(m) if m >= v => Some(m),
        _ => Some(v),
    })
}

/// Trim a field to `bbox` in whatever longitude convention it uses.
///
/// Returns the trimmed field and the convention that was detected.
pub fn trim_to_box<G: Gridded>(
    field: G,
    bbox: &BoundingBox,
    remap: LongitudeRemap,
) -> HarmonizeResult<(G, LonConvention)> {
    let grid = field.grid();
    let lon = grid.lon()?;
    let lat = grid.lat()?;

    let max_lon = finite_max(lon.iter().copied()).ok_or_else(|| {
        HarmonizeError::LongitudeConvention {
            max_lon: f64::NAN,
            west: bbox.west,
            east: bbox.east,
        }
    })?;
    let min_lon = lon.iter().copied().filter(|v| v.is_finite()).fold(max_lon, f64::min);
    debug!("longitude range [{min_lon}, {max_lon}]");

    let convention = classify_longitude(max_lon, bbox)?;
    debug!("longitude convention {convention:?}");

    let mask = Zip::from(lon)
        .and(lat)
        .map_collect(|&x, &y| convention.includes(x, bbox) && bbox.includes_lat(y));
    let selection = CellSelection::from_mask(&mask);
    if selection.is_empty() {
        return Err(HarmonizeError::Error(format!(
            "no grid cells fall inside box {:?}",
            bbox.as_bounds()
        )));
    }

    let mut trimmed = field.select_cells(&selection);
    if remap == LongitudeRemap::Wrap && convention != LonConvention::ZeroTo360 {
        trimmed
            .grid_mut()
            .map_coordinate(LON, |x| x.rem_euclid(360.0))?;
    }
    Ok((trimmed, convention))
}

/// Canonicalise coordinate names, then trim to the box.
pub fn harmonize_grid<G: Gridded>(
    field: G,
    bbox: &BoundingBox,
    remap: LongitudeRemap,
) -> HarmonizeResult<(G, LonConvention)> {
    trim_to_box(normalize_coordinate_names(field)?, bbox, remap)
}
