//! # sipfit
//!
//! Iterative **TAN-SIP WCS refinement** from a list of reference/source matches.
//!
//! Given an approximate WCS and a list of claimed correspondences between
//! reference catalog objects (known sky positions) and detected sources
//! (measured pixel positions), `sipfit` repeatedly fits a gnomonic projection
//! with SIP polynomial distortion, pushes the final WCS back into both
//! catalogs, and checks the median on-sky scatter against a quality limit.
//!
//! ## Features
//!
//! - **Iterative refit**: a fixed number of least-squares solver rounds, each
//!   starting from the previous round's WCS
//! - **Catalog sync**: reference centroids and source sky coordinates refreshed
//!   in parallel with [rayon](https://docs.rs/rayon)
//! - **Robust statistics**: median, IQR and sigma-clipped mean/stdev of match
//!   residuals on the sky, in pixels, or in local pixel-scale units
//! - **Match selection**: magnitude cuts, sky → pixel conversion and flag
//!   filtering ahead of an external correspondence finder
//!
//! ## Example
//!
//! ```no_run
//! use sipfit::{
//!     CatalogScope, FitTanSipWcsConfig, FitTanSipWcsTask, ReferenceMatch, SkyCoord, TanSipWcs,
//! };
//!
//! let initial = TanSipWcs::from_pixel_scale(
//!     SkyCoord::from_degrees(215.5, 53.0),
//!     [1500.0, 1500.0],
//!     (0.18 / 3600.0_f64).to_radians(),
//! )
//! .unwrap();
//! let matches: Vec<ReferenceMatch> = Vec::new(); // from a matcher
//!
//! let task = FitTanSipWcsTask::new(FitTanSipWcsConfig::default()).unwrap();
//! match task.fit_wcs(&matches, &initial, None, CatalogScope::MatchList, CatalogScope::MatchList) {
//!     Ok(result) => println!("scatter {:.3}\"", result.scatter_arcsec()),
//!     Err(e) => eprintln!("fit failed: {e}"),
//! }
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Forward fit**: tangent-plane coordinates of each reference object are
//!    fitted as a polynomial in the source pixel offset from CRPIX (SVD least
//!    squares); the linear terms give CD, the constant terms shift CRPIX, the
//!    rest become SIP `A`/`B`
//! 2. **Reverse fit**: SIP `AP`/`BP` are fitted on a regular grid over the
//!    bounding box so that sky → pixel inverts pixel → sky
//! 3. **Iterate**: repeat from the new WCS
//! 4. **Sync and verify**: refresh derived positions, recompute match
//!    distances, and reject fits whose median distance exceeds the limit
//!

pub mod bbox;
pub mod catalog;
mod centroid;
pub mod coord;
pub mod distort;
pub mod error;
pub mod fit;
pub mod matching;
pub mod stats;
pub mod wcs;

pub use bbox::BoundingBox;
pub use catalog::*;
pub use centroid::*;
pub use coord::SkyCoord;
pub use error::{AstromError, Result};
pub use fit::{
    DistortionFit, DistortionSolver, FitResult, FitTanSipWcsConfig, FitTanSipWcsTask, SipSolver,
    SipSolverConfig,
};
pub use matching::{
    Column, ColumnRef, CorrespondenceFinder, MatchOutput, MatchProbabilisticConfig,
    MatchProbabilisticTask, Table,
};
pub use stats::{
    make_match_statistics, make_match_statistics_in_local_pixels,
    make_match_statistics_in_pixels, make_match_statistics_in_radians, make_statistics,
    StatKind, Statistics, StatisticsControl,
};
pub use wcs::{TanSipWcs, Wcs};
