//! Iterative TAN-SIP refit of a WCS from a fixed match list.
//!
//! [`FitTanSipWcsTask::fit_wcs`] calls a [`DistortionSolver`] a fixed number of
//! times, each round starting from the previous round's WCS. The final WCS is
//! then pushed into the reference and source records (see [`CatalogScope`]),
//! match distances are recomputed, and the median distance is checked against
//! the configured maximum scatter.

pub mod solver;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bbox::BoundingBox;
use crate::catalog::{
    relink_references, relink_sources, set_match_distance, update_match_ref_centroids,
    update_match_source_coords, update_ref_centroids, update_source_coords, CatalogScope,
    ReferenceMatch, ReferenceRecord, SourceRecord,
};
use crate::coord::rad_to_arcsec;
use crate::error::{AstromError, Result};
use crate::stats::{make_statistics, StatKind, StatisticsControl};
use crate::wcs::TanSipWcs;

pub use solver::{DistortionFit, DistortionSolver, SipFit, SipSolver, SipSolverConfig};

/// Configuration for [`FitTanSipWcsTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitTanSipWcsConfig {
    /// SIP polynomial order passed to the solver. Default 4.
    pub order: u32,
    /// Number of solver rounds. Default 3.
    pub num_iter: u32,
    /// Maximum median on-sky scatter of the final fit, in arcseconds.
    /// Default 10.0.
    pub max_scatter_arcsec: f64,
}

impl Default for FitTanSipWcsConfig {
    fn default() -> Self {
        Self {
            order: 4,
            num_iter: 3,
            max_scatter_arcsec: 10.0,
        }
    }
}

impl FitTanSipWcsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_iter < 1 {
            return Err(AstromError::InvalidConfig(format!(
                "num_iter must be >= 1, got {}",
                self.num_iter
            )));
        }
        if self.max_scatter_arcsec.is_nan() || self.max_scatter_arcsec < 0.0 {
            return Err(AstromError::InvalidConfig(format!(
                "max_scatter_arcsec must be >= 0, got {}",
                self.max_scatter_arcsec
            )));
        }
        Ok(())
    }
}

/// Result of a successful [`FitTanSipWcsTask::fit_wcs`].
#[derive(Debug, Clone)]
pub struct FitResult {
    /// The fitted WCS.
    pub wcs: TanSipWcs,
    /// Median on-sky distance between matched reference objects and sources
    /// under the fitted WCS, in radians.
    pub scatter_on_sky: f64,
    /// The input matches, with refreshed records and distances.
    pub matches: Vec<ReferenceMatch>,
    /// The refreshed reference catalog, when one was supplied.
    pub reference_catalog: Option<Vec<ReferenceRecord>>,
    /// The refreshed source catalog, when one was supplied.
    pub source_catalog: Option<Vec<SourceRecord>>,
}

impl FitResult {
    pub fn scatter_arcsec(&self) -> f64 {
        rad_to_arcsec(self.scatter_on_sky)
    }
}

/// Fits a TAN-SIP WCS by repeated calls to a distortion solver.
#[derive(Debug, Clone)]
pub struct FitTanSipWcsTask<S = SipSolver> {
    config: FitTanSipWcsConfig,
    solver: S,
}

impl FitTanSipWcsTask<SipSolver> {
    /// Task using the least-squares [`SipSolver`] with default settings.
    pub fn new(config: FitTanSipWcsConfig) -> Result<Self> {
        Self::with_solver(config, SipSolver::default())
    }
}

impl<S: DistortionSolver> FitTanSipWcsTask<S> {
    pub fn with_solver(config: FitTanSipWcsConfig, solver: S) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, solver })
    }

    pub fn config(&self) -> &FitTanSipWcsConfig {
        &self.config
    }

    /// Fit a WCS to `matches`, starting from `initial_wcs`.
    ///
    /// `bbox` bounds the region over which the reverse transform must be
    /// accurate; `None` lets the solver derive it from the sources.
    ///
    /// The returned matches carry refreshed reference centroids, source sky
    /// coordinates and distances. If a catalog is given for a side, every row
    /// of it is refreshed and returned, and each match's record on that side
    /// is replaced by the catalog row with the same id.
    pub fn fit_wcs(
        &self,
        matches: &[ReferenceMatch],
        initial_wcs: &TanSipWcs,
        bbox: Option<BoundingBox>,
        ref_catalog: CatalogScope<'_, ReferenceRecord>,
        source_catalog: CatalogScope<'_, SourceRecord>,
    ) -> Result<FitResult> {
        let bbox = bbox.unwrap_or_default();

        let mut wcs = initial_wcs.clone();
        for i in 0..self.config.num_iter {
            let fit = self
                .solver
                .solve(matches, &wcs, self.config.order, &bbox)?;
            debug!(
                "Fit iteration {}/{}: solver scatter {:.4}\"",
                i + 1,
                self.config.num_iter,
                rad_to_arcsec(fit.scatter_on_sky),
            );
            wcs = fit.wcs;
        }

        let (matches, reference_catalog) = match ref_catalog {
            CatalogScope::Catalog(refs) => {
                info!("Updating centroids of {} reference objects", refs.len());
                let refs = update_ref_centroids(&wcs, refs);
                (relink_references(matches, &refs)?, Some(refs))
            }
            CatalogScope::MatchList => {
                warn!("No reference catalog supplied; updating reference centroids in the match list only");
                (update_match_ref_centroids(&wcs, matches), None)
            }
        };

        let (mut matches, source_catalog) = match source_catalog {
            CatalogScope::Catalog(sources) => {
                info!("Updating sky coordinates of {} sources", sources.len());
                let sources = update_source_coords(&wcs, sources);
                (relink_sources(&matches, &sources)?, Some(sources))
            }
            CatalogScope::MatchList => {
                warn!("No source catalog supplied; updating source coordinates in the match list only");
                (update_match_source_coords(&wcs, &matches), None)
            }
        };

        set_match_distance(&mut matches);

        let distances: Vec<f64> = matches.iter().map(|m| m.distance.abs()).collect();
        let scatter_on_sky = make_statistics(
            &distances,
            StatKind::MEDIAN,
            &StatisticsControl::default(),
        )?
        .get(StatKind::MEDIAN)
        .unwrap_or(f64::NAN);
        let scatter_arcsec = rad_to_arcsec(scatter_on_sky);

        info!(
            "Fit WCS: order {}, {} matches, scatter {:.3}\"",
            self.config.order,
            matches.len(),
            scatter_arcsec,
        );

        if scatter_arcsec > self.config.max_scatter_arcsec {
            return Err(AstromError::FitQuality {
                scatter_arcsec,
                max_scatter_arcsec: self.config.max_scatter_arcsec,
            });
        }

        Ok(FitResult {
            wcs,
            scatter_on_sky,
            matches,
            reference_catalog,
            source_catalog,
        })
    }
}
