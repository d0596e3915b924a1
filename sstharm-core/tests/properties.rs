//! Behavioural tests for the harmonisation engine.
//!
//! Each module exercises one stage end to end on small synthetic grids.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use ndarray::{Array2, Array3};
use sstharm_core::aggregate::weighted_regional_means;
use sstharm_core::calendar::{CalendarKind, CfDateTime};
use sstharm_core::dataset::{
    DataVariable, Dataset, Gridded, GriddedField, HorizontalGrid, Temporal, VariableData, LON,
};
use sstharm_core::descriptor::{parse_model_identifier, resolve_entry};
use sstharm_core::errors::HarmonizeError;
use sstharm_core::longitude::{harmonize_grid, BoundingBox, LonConvention, LongitudeRemap};
use sstharm_core::overrides::apply_known_issues;
use sstharm_core::policy::SourcePolicy;
use sstharm_core::regions::RegionSet;
use sstharm_core::time_window::{deduplicate_times, select_time_window};
use sstharm_core::weights::{
    latitude_cosine_weights, normalized_area_weights, WeightField, WeightingStrategy,
};

fn axis(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

fn one_step_field(lat: &[f64], lon: &[f64]) -> GriddedField {
    let grid = HorizontalGrid::rectilinear(lat, lon);
    let (ny, nx) = grid.shape();
    let time = vec![CfDateTime::ymd(CalendarKind::NoLeap, 2000, 1, 1).unwrap()];
    let values = Array3::from_shape_fn((1, ny, nx), |(_, j, i)| 10.0 + j as f64 + 0.01 * i as f64);
    GriddedField::new("sst", time, grid, values).unwrap()
}

mod longitude_normalisation {
    use super::*;

    #[test]
    fn test_normalised_grid_is_a_fixpoint() {
        let bbox = BoundingBox::tasmania();
        let global = one_step_field(&axis(-89.5, 1.0, 180), &axis(0.5, 1.0, 360));
        let (once, _) = harmonize_grid(global, &bbox, LongitudeRemap::Wrap).unwrap();
        let (twice, convention) =
            harmonize_grid(once.clone(), &bbox, LongitudeRemap::Wrap).unwrap();

        assert_eq!(convention, LonConvention::SignedOneEighty);
        assert_eq!(twice, once);
    }

    fn check_convention(lon: Vec<f64>, expected: LonConvention) {
        let bbox = BoundingBox::tasmania();
        let field = one_step_field(&axis(-89.5, 1.0, 180), &lon);
        let (trimmed, convention) = harmonize_grid(field, &bbox, LongitudeRemap::Wrap).unwrap();

        assert_eq!(convention, expected);
        let lons = trimmed.grid().coordinate(LON).unwrap();
        assert!(!lons.is_empty());
        assert!(lons.iter().all(|x| *x > bbox.west && *x < bbox.east));
        let lats = trimmed.grid().lat().unwrap();
        assert!(lats.iter().all(|y| *y > bbox.south && *y < bbox.north));
    }

    #[test]
    fn test_zero_to_360_grid() {
        check_convention(axis(0.5, 1.0, 360), LonConvention::ZeroTo360);
    }

    #[test]
    fn test_signed_grid() {
        check_convention(axis(-179.5, 1.0, 330), LonConvention::SignedOneEighty);
    }

    #[test]
    fn test_shifted_negative_grid() {
        check_convention(axis(-299.5, 1.0, 360), LonConvention::ShiftedNegative);
    }

    #[test]
    fn test_preserve_keeps_native_longitudes() {
        let field = one_step_field(&axis(-89.5, 1.0, 180), &axis(-299.5, 1.0, 360));
        let (trimmed, _) =
            harmonize_grid(field, &BoundingBox::tasmania(), LongitudeRemap::Preserve).unwrap();
        let lons = trimmed.grid().lon().unwrap();
        assert!(lons.iter().all(|x| *x > -222.0 && *x < -205.0));
    }
}

mod time_window {
    use super::*;

    fn field_at(times: Vec<CfDateTime>) -> GriddedField {
        let n = times.len();
        GriddedField::new(
            "sst",
            times,
            HorizontalGrid::rectilinear(&[-42.0], &[147.0]),
            Array3::from_elem((n, 1, 1), 14.0),
        )
        .unwrap()
    }

    fn retained(times: Vec<CfDateTime>, policy: &SourcePolicy) -> Vec<String> {
        let (out, _) = select_time_window(field_at(times), policy).unwrap();
        out.times().iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_start_bound_is_inclusive() {
        let start = CfDateTime::ymd(CalendarKind::Standard, 1982, 1, 1).unwrap();
        let before = start.add_seconds(-1).unwrap();
        let kept = retained(vec![before, start], &SourcePolicy::observation());
        assert_eq!(kept, vec!["1982-01-01 00:00:00"]);
    }

    #[test]
    fn test_noleap_end_bound_is_inclusive() {
        let end = CfDateTime::new(CalendarKind::NoLeap, 2100, 12, 31, 23, 59, 59).unwrap();
        let after = end.add_seconds(1).unwrap();
        assert_eq!(after.to_string(), "2101-01-01 00:00:00");
        let kept = retained(vec![end, after], &SourcePolicy::model());
        assert_eq!(kept, vec!["2100-12-31 23:59:59"]);
    }

    #[test]
    fn test_360_day_end_bound() {
        let end = CfDateTime::new(CalendarKind::Day360, 2100, 12, 30, 23, 59, 59).unwrap();
        let after = end.add_seconds(1).unwrap();
        let kept = retained(vec![end, after], &SourcePolicy::model());
        assert_eq!(kept, vec!["2100-12-30 23:59:59"]);
    }

    #[test]
    fn test_overlapping_axes_deduplicate() {
        let year = |y| CfDateTime::ymd(CalendarKind::NoLeap, y, 7, 1).unwrap();
        let part = |ys: &[i32], fill: f64| {
            let n = ys.len();
            Dataset::new(
                HorizontalGrid::rectilinear(&[-42.0], &[147.0]),
                ys.iter().map(|y| year(*y)).collect(),
            )
            .with_variable(
                "tos",
                DataVariable::new(VariableData::TimeVarying(Array3::from_elem((n, 1, 1), fill))),
            )
            .unwrap()
        };
        let joined =
            Dataset::concat_time(vec![part(&[2000, 2001, 2002], 1.0), part(&[2001, 2002, 2003], 2.0)])
                .unwrap();
        let field = deduplicate_times(joined).into_field("tos").unwrap();

        let years: Vec<i32> = field.times().iter().map(|t| t.year()).collect();
        assert_eq!(years, vec![2000, 2001, 2002, 2003]);
        let values: Vec<f64> = field.values().iter().copied().collect();
        assert_eq!(values, vec![1.0, 1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_year_span_label() {
        let times = (1980..1990)
            .map(|y| CfDateTime::ymd(CalendarKind::Day360, y, 6, 30).unwrap())
            .collect();
        let (_, span) = select_time_window(field_at(times), &SourcePolicy::model()).unwrap();
        assert_eq!(span.to_string(), "1982-1989");
    }
}

mod weights {
    use super::*;

    #[test]
    fn test_area_weights_bounds() {
        let area = Array2::from_shape_fn((6, 7), |(j, i)| {
            if (j + i) % 5 == 0 {
                f64::NAN
            } else {
                1.0e8 * (1.0 + j as f64) * (2.0 + (i % 3) as f64)
            }
        });
        let weights = normalized_area_weights(&area).unwrap();
        let max_area = area.iter().copied().filter(|a| a.is_finite()).fold(0.0, f64::max);

        for (w, a) in weights.values().iter().zip(area.iter()) {
            assert!((0.0..=1.0).contains(w));
            if *a == max_area {
                assert_eq!(*w, 1.0);
            }
            if a.is_nan() {
                assert_eq!(*w, 0.0);
            }
        }
    }

    #[test]
    fn test_cosine_weights_equator_and_poles() {
        let grid = HorizontalGrid::rectilinear(&[-90.0, -45.0, 0.0, 45.0, 90.0], &[147.0]);
        let w = latitude_cosine_weights(&grid).unwrap();
        assert_eq!(w.values()[[2, 0]], 1.0);
        assert_abs_diff_eq!(w.values()[[0, 0]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w.values()[[4, 0]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(w.values()[[1, 0]], w.values()[[3, 0]]);
    }
}

mod regional_means {
    use super::*;
    use sstharm_core::regions::Region;

    #[test]
    fn test_two_by_two_mean() {
        let grid = HorizontalGrid::rectilinear(&[-44.0, -40.0], &[145.0, 148.0]);
        let time = vec![CfDateTime::ymd(CalendarKind::Standard, 2000, 1, 1).unwrap()];
        let values = Array3::from_shape_vec((1, 2, 2), vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        let field = GriddedField::new("sst", time, grid, values).unwrap();

        let masks = RegionSet::new(
            "first row",
            vec![Region::from_box("row0", "Row 0", [144.0, 149.0, -45.0, -42.0])],
        )
        .mask_3d(field.grid())
        .unwrap();
        let weights = WeightField::uniform((2, 2), WeightingStrategy::LatitudeCosine);

        let series = weighted_regional_means(&field, &masks, &weights).unwrap();
        assert_eq!(series[0].values()[0], 15.0);
    }

    #[test]
    fn test_quadrants_partition_their_union() {
        let grid = HorizontalGrid::rectilinear(&axis(-48.875, 0.25, 56), &axis(138.125, 0.25, 68));
        let masks = RegionSet::tasmania().mask_3d(&grid).unwrap();
        let quadrants = masks.sum_layers(&["tas_se", "tas_ne", "tas_sw", "tas_nw"]);
        let whole = masks.layer_for("tas_all").unwrap();
        let lon = grid.lon().unwrap();
        let lat = grid.lat().unwrap();

        let mut union_cells = 0;
        for ((j, i), q) in quadrants.indexed_iter() {
            let in_union = (143.5..149.5).contains(&lon[[j, i]]) && (-44.5..-39.5).contains(&lat[[j, i]]);
            if in_union {
                union_cells += 1;
                assert_eq!(*q, whole[[j, i]]);
                assert_eq!(*q, 1.0);
            } else {
                assert_eq!(*q, 0.0);
            }
            assert!(*q <= whole[[j, i]]);
        }
        // 6 degrees by 5 degrees at 0.25 degree spacing
        assert_eq!(union_cells, 24 * 20);
    }

    #[test]
    fn test_region_means_follow_region_order() {
        let field = one_step_field(&axis(-48.875, 0.25, 56), &axis(138.125, 0.25, 68));
        let masks = RegionSet::tasmania().mask_3d(field.grid()).unwrap();
        let weights = latitude_cosine_weights(field.grid()).unwrap();
        let series = weighted_regional_means(&field, &masks, &weights).unwrap();

        let codes: Vec<&str> = series.iter().map(|s| s.region_code.as_str()).collect();
        assert_eq!(codes, vec!["tas_all", "tas_se", "tas_ne", "tas_sw", "tas_nw"]);
        // values increase northward, so north quadrants average warmer
        assert!(series[2].values()[0] > series[1].values()[0]);
        assert!(series[4].values()[0] > series[3].values()[0]);
    }
}

mod catalog_resolution {
    use super::*;

    const MRI_H: &str =
        "/g/data/oi10/replicas/CMIP6/CMIP/MRI/MRI-ESM2-0/historical/r1i1p1f1/Oday/tos/gn/v20191205/";
    const MRI_F: &str =
        "/g/data/oi10/replicas/CMIP6/ScenarioMIP/MRI/MRI-ESM2-0/ssp585/r1i1p1f1/Oday/tos/gn/v20210329/";

    #[test]
    fn test_override_truncates_file_list() {
        let scenario = parse_model_identifier(MRI_F).unwrap();
        let listing: Vec<String> = (0..9).map(|i| format!("file{i}.nc")).collect();
        let kept = apply_known_issues(&scenario, listing.clone());
        assert_eq!(kept, listing[0..5].to_vec());
    }

    #[test]
    fn test_mismatched_pair_is_rejected() {
        let other = MRI_F.replace("r1i1p1f1", "r2i1p1f1");
        let err = resolve_entry(4, MRI_H, &other).unwrap_err();
        assert!(matches!(err, HarmonizeError::Consistency { .. }));
    }

    #[test]
    fn test_consistent_pair_label() {
        let source = resolve_entry(4, MRI_H, MRI_F).unwrap();
        assert_eq!(source.label, "MRI-ESM2-0.historical+ssp585.r1i1p1f1");
        assert_eq!(source.policy, SourcePolicy::model());
    }
}
