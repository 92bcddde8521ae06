//! Reference/source records, match lists, and keeping them consistent with a WCS.
//!
//! Records are plain values. A reference record's sky coordinate is
//! authoritative and its centroid is derived; a source record's centroid is
//! authoritative and its sky coordinate is derived. After a WCS changes, the
//! derived fields are refreshed by the value-returning functions here, and
//! match distances must then be recomputed with [`set_match_distance`].
//!
//! # Aliasing
//!
//! A [`ReferenceMatch`] embeds its own copies of the two records. Catalog rows
//! and match records are linked by `id` only: after a catalog is refreshed,
//! [`relink_references`] / [`relink_sources`] copy the refreshed rows back into
//! the match list.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::centroid::Centroid;
use crate::coord::SkyCoord;
use crate::error::{AstromError, Result};
use crate::wcs::Wcs;

/// A reference catalog object: true sky position plus derived pixel position.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRecord {
    pub id: u64,
    /// Authoritative sky position.
    pub coord: SkyCoord,
    /// Pixel position implied by the current WCS.
    pub centroid: Centroid,
}

impl ReferenceRecord {
    /// New record with an unset (NaN) centroid.
    pub fn new(id: u64, coord: SkyCoord) -> Self {
        Self {
            id,
            coord,
            centroid: Centroid::nan(),
        }
    }

    /// Copy of this record with `centroid = wcs.sky_to_pixel(coord)`.
    pub fn with_updated_centroid<W: Wcs + ?Sized>(&self, wcs: &W) -> Self {
        Self {
            centroid: wcs.sky_to_pixel(&self.coord),
            ..self.clone()
        }
    }
}

/// A measured detection: authoritative pixel position plus derived sky position.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: u64,
    /// Authoritative measured pixel position.
    pub centroid: Centroid,
    /// Sky position implied by the current WCS.
    pub coord: SkyCoord,
}

impl SourceRecord {
    /// New record with an unset (NaN) sky coordinate.
    pub fn new(id: u64, centroid: Centroid) -> Self {
        Self {
            id,
            centroid,
            coord: SkyCoord::nan(),
        }
    }

    /// Copy of this record with `coord = wcs.pixel_to_sky(centroid)`.
    pub fn with_updated_coord<W: Wcs + ?Sized>(&self, wcs: &W) -> Self {
        Self {
            coord: wcs.pixel_to_sky(&self.centroid),
            ..self.clone()
        }
    }
}

/// A claimed correspondence between a reference object and a source.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceMatch {
    pub reference: ReferenceRecord,
    pub source: SourceRecord,
    /// Cached on-sky separation between the two records, in radians.
    pub distance: f64,
}

impl ReferenceMatch {
    pub fn new(reference: ReferenceRecord, source: SourceRecord, distance: f64) -> Self {
        Self {
            reference,
            source,
            distance,
        }
    }
}

/// Which records a synchronization pass writes.
#[derive(Debug, Clone, Copy)]
pub enum CatalogScope<'a, T> {
    /// Refresh only the records embedded in the match list.
    MatchList,
    /// Refresh every record of this catalog, then relink the match list to it.
    Catalog(&'a [T]),
}

// ── Synchronization ─────────────────────────────────────────────────────────

/// Recompute the centroid of every reference record from its sky coordinate.
pub fn update_ref_centroids<W: Wcs + ?Sized>(
    wcs: &W,
    refs: &[ReferenceRecord],
) -> Vec<ReferenceRecord> {
    refs.par_iter()
        .map(|r| r.with_updated_centroid(wcs))
        .collect()
}

/// Recompute the sky coordinate of every source record from its centroid.
pub fn update_source_coords<W: Wcs + ?Sized>(
    wcs: &W,
    sources: &[SourceRecord],
) -> Vec<SourceRecord> {
    sources
        .par_iter()
        .map(|s| s.with_updated_coord(wcs))
        .collect()
}

/// Refresh the reference centroids embedded in a match list.
pub fn update_match_ref_centroids<W: Wcs + ?Sized>(
    wcs: &W,
    matches: &[ReferenceMatch],
) -> Vec<ReferenceMatch> {
    matches
        .par_iter()
        .map(|m| ReferenceMatch {
            reference: m.reference.with_updated_centroid(wcs),
            ..m.clone()
        })
        .collect()
}

/// Refresh the source coordinates embedded in a match list.
pub fn update_match_source_coords<W: Wcs + ?Sized>(
    wcs: &W,
    matches: &[ReferenceMatch],
) -> Vec<ReferenceMatch> {
    matches
        .par_iter()
        .map(|m| ReferenceMatch {
            source: m.source.with_updated_coord(wcs),
            ..m.clone()
        })
        .collect()
}

/// Replace each match's reference record with the catalog row of the same id.
///
/// If the catalog holds duplicate ids, the last row wins.
pub fn relink_references(
    matches: &[ReferenceMatch],
    refs: &[ReferenceRecord],
) -> Result<Vec<ReferenceMatch>> {
    let by_id: HashMap<u64, &ReferenceRecord> = refs.iter().map(|r| (r.id, r)).collect();
    matches
        .iter()
        .map(|m| {
            let reference = by_id
                .get(&m.reference.id)
                .ok_or(AstromError::InconsistentCatalog {
                    catalog: "reference",
                    id: m.reference.id,
                })?;
            Ok(ReferenceMatch {
                reference: (*reference).clone(),
                ..m.clone()
            })
        })
        .collect()
}

/// Replace each match's source record with the catalog row of the same id.
///
/// If the catalog holds duplicate ids, the last row wins.
pub fn relink_sources(
    matches: &[ReferenceMatch],
    sources: &[SourceRecord],
) -> Result<Vec<ReferenceMatch>> {
    let by_id: HashMap<u64, &SourceRecord> = sources.iter().map(|s| (s.id, s)).collect();
    matches
        .iter()
        .map(|m| {
            let source = by_id
                .get(&m.source.id)
                .ok_or(AstromError::InconsistentCatalog {
                    catalog: "source",
                    id: m.source.id,
                })?;
            Ok(ReferenceMatch {
                source: (*source).clone(),
                ..m.clone()
            })
        })
        .collect()
}

/// Relink both sides of every match to the given catalogs.
pub fn relink_matches(
    matches: &[ReferenceMatch],
    refs: &[ReferenceRecord],
    sources: &[SourceRecord],
) -> Result<Vec<ReferenceMatch>> {
    relink_sources(&relink_references(matches, refs)?, sources)
}

/// Recompute the on-sky distance of every match from its current coordinates.
///
/// Must run after any pass that changed either side's position.
pub fn set_match_distance(matches: &mut [ReferenceMatch]) {
    matches.par_iter_mut().for_each(|m| {
        m.distance = m.reference.coord.separation(&m.source.coord);
    });
}
