//! End-to-end tests of the iterative TAN-SIP fit on synthetic matches.


use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use sipfit::distort::{Distortion, DistortionKind};
use sipfit::{
    AstromError, BoundingBox, CatalogScope, Centroid, DistortionFit, DistortionSolver,
    FitTanSipWcsConfig, FitTanSipWcsTask, ReferenceMatch, ReferenceRecord, SourceRecord,
    StatKind, TanSipWcs, Wcs,
};
use test_data::{bbox, grid_pixels, init_tracing, make_matches, truth_wcs};

fn task(order: u32) -> FitTanSipWcsTask {
    FitTanSipWcsTask::new(FitTanSipWcsConfig {
        order,
        ..Default::default()
    })
    .expect("valid config")
}

/// Linear fit of undistorted matches from the true WCS reproduces it exactly.
#[test]
fn test_linear_fit_zero_offset() {
    init_tracing();
    let wcs = truth_wcs();
    let matches = make_matches(&wcs, &grid_pixels(10, 15), &Distortion::from(DistortionKind::None));

    let result = task(0)
        .fit_wcs(
            &matches,
            &wcs,
            Some(bbox()),
            CatalogScope::MatchList,
            CatalogScope::MatchList,
        )
        .expect("fit should succeed");

    assert!(!result.wcs.has_distortion());
    assert!(
        result.scatter_arcsec() <= 1e-7,
        "scatter {:.3e} arcsec",
        result.scatter_arcsec()
    );
    for m in &result.matches {
        assert!(m.distance.is_finite());
        assert!(m.reference.centroid.distance(&m.source.centroid) < 1e-6);
    }
}

/// A quadratic distortion along x is absorbed by an order-4 SIP fit but not
/// by a linear one.
#[test]
fn test_sip_recovers_quadratic_x() {
    init_tracing();
    let wcs = truth_wcs();
    let distortion = Distortion::new(DistortionKind::QuadraticX, 1e-5);
    let matches = make_matches(&wcs, &grid_pixels(10, 20), &distortion);

    let linear = task(0)
        .fit_wcs(
            &matches,
            &wcs,
            Some(bbox()),
            CatalogScope::MatchList,
            CatalogScope::MatchList,
        )
        .expect("linear fit should pass the 10\" limit");
    let sip = task(4)
        .fit_wcs(
            &matches,
            &wcs,
            Some(bbox()),
            CatalogScope::MatchList,
            CatalogScope::MatchList,
        )
        .expect("SIP fit should succeed");

    println!(
        "scatter: linear {:.4}\", SIP {:.6}\"",
        linear.scatter_arcsec(),
        sip.scatter_arcsec()
    );
    assert!(linear.scatter_arcsec() > 0.04);
    assert!(sip.scatter_arcsec() < 0.01);
    assert!(sip.wcs.has_distortion());

    // The reverse transform must be consistent with the forward one.
    let px = sipfit::make_match_statistics_in_pixels(&sip.wcs, &sip.matches, StatKind::MEDIAN)
        .unwrap()
        .value()
        .unwrap();
    assert!(px < 0.01, "pixel scatter {px}");
    for m in &sip.matches {
        assert!(m.reference.centroid.distance(&m.source.centroid) < 0.05);
    }
}

/// Gaussian centroid noise shows up as scatter at the expected level.
#[test]
fn test_sip_fit_with_centroid_noise() {
    init_tracing();
    let wcs = truth_wcs();
    let distortion = Distortion::new(DistortionKind::QuadraticX, 1e-5);
    let mut matches = make_matches(&wcs, &grid_pixels(15, 20), &distortion);

    let mut rng = StdRng::seed_from_u64(42);
    let noise = Normal::new(0.0, 0.1).unwrap();
    for m in &mut matches {
        let c = m.source.centroid;
        m.source.centroid = Centroid::new(c.x + noise.sample(&mut rng), c.y + noise.sample(&mut rng));
    }

    let result = task(2)
        .fit_wcs(
            &matches,
            &wcs,
            None,
            CatalogScope::MatchList,
            CatalogScope::MatchList,
        )
        .expect("fit should succeed");

    // Median of a 2-D Gaussian radius with σ = 0.1 px is ≈ 0.118 px ≈ 0.022".
    let scatter = result.scatter_arcsec();
    assert!(scatter > 0.01 && scatter < 0.04, "scatter {scatter}");

    let stats = sipfit::make_match_statistics_in_local_pixels(
        &result.wcs,
        &result.matches,
        StatKind::MEDIAN | StatKind::MEANCLIP | StatKind::STDEVCLIP,
    )
    .unwrap();
    let median_px = stats.get(StatKind::MEDIAN).unwrap();
    assert!(median_px > 0.06 && median_px < 0.2, "median {median_px} px");
    assert!(stats.get(StatKind::STDEVCLIP).unwrap() < 0.2);
}

/// Returns the starting WCS unchanged.
struct IdentitySolver;

impl DistortionSolver for IdentitySolver {
    fn solve(
        &self,
        _matches: &[ReferenceMatch],
        starting_wcs: &TanSipWcs,
        _order: u32,
        _bbox: &BoundingBox,
    ) -> sipfit::Result<DistortionFit> {
        Ok(DistortionFit {
            wcs: starting_wcs.clone(),
            scatter_on_sky: 0.0,
        })
    }
}

#[test]
fn test_scatter_above_limit_fails() {
    init_tracing();
    let wcs = truth_wcs();
    let mut matches =
        make_matches(&wcs, &grid_pixels(5, 5), &Distortion::from(DistortionKind::None));
    // Move every reference object 50" away from its source in a varying direction.
    for (i, m) in matches.iter_mut().enumerate() {
        m.reference.coord = m
            .reference
            .coord
            .offset(i as f64 * 0.9, sipfit::coord::arcsec_to_rad(50.0));
    }

    let task = FitTanSipWcsTask::with_solver(FitTanSipWcsConfig::default(), IdentitySolver)
        .expect("valid config");
    let err = task
        .fit_wcs(
            &matches,
            &wcs,
            None,
            CatalogScope::MatchList,
            CatalogScope::MatchList,
        )
        .unwrap_err();
    match err {
        AstromError::FitQuality {
            scatter_arcsec,
            max_scatter_arcsec,
        } => {
            assert!((scatter_arcsec - 50.0).abs() < 1e-6, "scatter {scatter_arcsec}");
            assert_eq!(max_scatter_arcsec, 10.0);
        }
        other => panic!("expected FitQuality, got {other:?}"),
    }

    // A looser limit accepts the same fit.
    let loose = FitTanSipWcsTask::with_solver(
        FitTanSipWcsConfig {
            max_scatter_arcsec: 60.0,
            ..Default::default()
        },
        IdentitySolver,
    )
    .unwrap();
    assert!(loose
        .fit_wcs(
            &matches,
            &wcs,
            None,
            CatalogScope::MatchList,
            CatalogScope::MatchList
        )
        .is_ok());
}

/// Explicit catalogs are refreshed in full and the match list is relinked to
/// them; the fitted WCS does not depend on the scope.
#[test]
fn test_explicit_catalogs_match_list_scope_agree() {
    init_tracing();
    let wcs = truth_wcs();
    let distortion = Distortion::from(DistortionKind::QuadraticX);
    let matches = make_matches(&wcs, &grid_pixels(8, 12), &distortion);

    let mut refs: Vec<ReferenceRecord> = matches.iter().map(|m| m.reference.clone()).collect();
    refs.push(ReferenceRecord::new(5000, wcs.pixel_to_sky(&Centroid::new(500.0, 500.0))));
    let mut sources: Vec<SourceRecord> = matches.iter().map(|m| m.source.clone()).collect();
    sources.push(SourceRecord::new(6000, Centroid::new(700.0, 900.0)));

    let task = task(3);
    let with_catalogs = task
        .fit_wcs(
            &matches,
            &wcs,
            Some(bbox()),
            CatalogScope::Catalog(&refs),
            CatalogScope::Catalog(&sources),
        )
        .expect("fit should succeed");
    let match_only = task
        .fit_wcs(
            &matches,
            &wcs,
            Some(bbox()),
            CatalogScope::MatchList,
            CatalogScope::MatchList,
        )
        .expect("fit should succeed");

    assert_eq!(with_catalogs.wcs, match_only.wcs);
    assert_eq!(with_catalogs.matches, match_only.matches);

    let out_refs = with_catalogs.reference_catalog.expect("reference catalog");
    let out_sources = with_catalogs.source_catalog.expect("source catalog");
    assert_eq!(out_refs.len(), refs.len());
    assert_eq!(out_sources.len(), sources.len());
    for r in &out_refs {
        assert_eq!(r.centroid, with_catalogs.wcs.sky_to_pixel(&r.coord));
    }
    for s in &out_sources {
        assert_eq!(s.coord, with_catalogs.wcs.pixel_to_sky(&s.centroid));
    }
    for (m, r) in with_catalogs.matches.iter().zip(&out_refs) {
        assert_eq!(&m.reference, r);
    }
}

#[test]
fn test_solver_errors_propagate() {
    let wcs = truth_wcs();
    let matches = make_matches(&wcs, &grid_pixels(4, 4), &Distortion::from(DistortionKind::None));

    let err = task(4)
        .fit_wcs(
            &[],
            &wcs,
            None,
            CatalogScope::MatchList,
            CatalogScope::MatchList,
        )
        .unwrap_err();
    assert!(matches!(err, AstromError::TooFewMatches { found: 0, .. }));

    let err = task(9)
        .fit_wcs(
            &matches,
            &wcs,
            None,
            CatalogScope::MatchList,
            CatalogScope::MatchList,
        )
        .unwrap_err();
    assert!(matches!(err, AstromError::OrderOutOfRange { .. }));
}
