//! Residual statistics over match lists with known injected offsets.


use approx::assert_relative_eq;
use sipfit::{
    make_match_statistics, make_match_statistics_in_local_pixels,
    make_match_statistics_in_pixels, make_match_statistics_in_radians, make_statistics,
    set_match_distance, update_match_ref_centroids, update_match_source_coords, Centroid,
    ReferenceMatch, ReferenceRecord, SourceRecord, StatKind, StatisticsControl, Wcs,
};
use test_data::{truth_wcs, PIXEL_SCALE_DEG};

/// Sources offset by (3, 4) px from the projected reference position, within
/// a few hundred pixels of CRPIX.
fn offset_matches() -> Vec<ReferenceMatch> {
    let wcs = truth_wcs();
    let mut matches = Vec::new();
    for i in 0..7 {
        for j in 0..7 {
            let c = Centroid::new(1200.0 + 100.0 * i as f64, 1200.0 + 100.0 * j as f64);
            let id = (i * 7 + j) as u64;
            matches.push(ReferenceMatch::new(
                ReferenceRecord::new(id, wcs.pixel_to_sky(&c)),
                SourceRecord::new(id, c + (3.0, 4.0)),
                f64::NAN,
            ));
        }
    }
    matches
}

#[test]
fn test_pixel_residuals() {
    let wcs = truth_wcs();
    let matches = offset_matches();
    let stats = make_match_statistics_in_pixels(
        &wcs,
        &matches,
        StatKind::MEDIAN | StatKind::MEAN | StatKind::STDEV | StatKind::NPOINT,
    )
    .unwrap();
    assert_relative_eq!(stats.get(StatKind::MEDIAN).unwrap(), 5.0, max_relative = 1e-7);
    assert_relative_eq!(stats.get(StatKind::MEAN).unwrap(), 5.0, max_relative = 1e-7);
    assert!(stats.get(StatKind::STDEV).unwrap() < 1e-6);
    assert_eq!(stats.npoint(), 49);
    assert_eq!(stats.get(StatKind::NPOINT), Some(49.0));
}

#[test]
fn test_sky_and_local_pixel_residuals() -> anyhow::Result<()> {
    let wcs = truth_wcs();
    let matches = offset_matches();
    let scale = PIXEL_SCALE_DEG.to_radians();

    let rad = make_match_statistics_in_radians(&wcs, &matches, StatKind::MEDIAN)?
        .value()
        .ok_or_else(|| anyhow::anyhow!("median not computed"))?;
    assert_relative_eq!(rad, 5.0 * scale, max_relative = 1e-5);

    let local = make_match_statistics_in_local_pixels(&wcs, &matches, StatKind::MEDIAN)?
        .value()
        .ok_or_else(|| anyhow::anyhow!("median not computed"))?;
    assert_relative_eq!(local, 5.0, max_relative = 1e-5);
    Ok(())
}

#[test]
fn test_stored_distances_after_sync() {
    let wcs = truth_wcs();
    let matches = update_match_ref_centroids(&wcs, &offset_matches());
    let mut matches = update_match_source_coords(&wcs, &matches);
    set_match_distance(&mut matches);

    let flags = StatKind::MEDIAN | StatKind::MEANCLIP;
    let stored = make_match_statistics(&matches, flags).unwrap();
    let direct = make_match_statistics_in_radians(&wcs, &matches, flags).unwrap();
    assert_eq!(stored, direct);
}

#[test]
fn test_stored_distances_unset_is_empty() {
    // Distances are NaN until set_match_distance runs.
    let err = make_match_statistics(&offset_matches(), StatKind::MEDIAN).unwrap_err();
    assert_eq!(err, sipfit::AstromError::EmptyInput);
}

#[test]
fn test_clipping_rejects_outlier() {
    let values = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
    let stats = make_statistics(
        &values,
        StatKind::STDEV | StatKind::STDEVCLIP | StatKind::MEANCLIP,
        &StatisticsControl::default(),
    )
    .unwrap();
    assert_relative_eq!(stats.get(StatKind::MEANCLIP).unwrap(), 3.0);
    assert_relative_eq!(stats.get(StatKind::STDEVCLIP).unwrap(), 2.0_f64.sqrt());
    assert!(stats.get(StatKind::STDEV).unwrap() > 30.0);
}
