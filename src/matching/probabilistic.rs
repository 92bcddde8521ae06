//! Preparation of reference and target catalogs for probabilistic matching.
//!
//! Before the finder runs, the reference catalog may gain a `flux_total`
//! column (with a magnitude cut folded into its selection mask) and pixel
//! coordinate columns converted from sky coordinates through a WCS. The target
//! selection mask may be narrowed by boolean flag columns.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Column, ColumnRef, CorrespondenceFinder, MatchOutput, Table};
use crate::coord::SkyCoord;
use crate::error::{AstromError, Result};
use crate::wcs::Wcs;

/// Name of the derived total-flux column written to the reference table.
pub const FLUX_TOTAL_COLUMN: &str = "flux_total";

/// Sky → pixel conversion of reference coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordConversion {
    pub ra_in: ColumnRef,
    pub dec_in: ColumnRef,
    pub x_out: ColumnRef,
    pub y_out: ColumnRef,
}

/// Configuration for [`MatchProbabilisticTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProbabilisticConfig {
    /// Reference flux columns summed into `flux_total`.
    pub columns_ref_flux: Vec<ColumnRef>,
    /// Column giving the match order. When set, no flux selection is made.
    pub column_order: Option<ColumnRef>,
    /// Brightest reference magnitude to select. Default −∞.
    pub mag_brightest_ref: f64,
    /// Faintest reference magnitude to select. Default +∞.
    pub mag_faintest_ref: f64,
    /// Magnitude zeropoint for reference fluxes. Default 31.4.
    pub mag_zeropoint_ref: f64,
    /// Reference sky coordinates to convert to pixels.
    pub coords_ref_to_convert: Option<CoordConversion>,
    /// Multiplier converting reference sky coordinates to degrees. Default 1.0.
    pub coords_ref_factor: f64,
    /// Target flag columns that must be true for a row to be selected.
    pub columns_target_select_true: Vec<ColumnRef>,
    /// Target flag columns that must be false for a row to be selected.
    pub columns_target_select_false: Vec<ColumnRef>,
}

impl Default for MatchProbabilisticConfig {
    fn default() -> Self {
        Self {
            columns_ref_flux: Vec::new(),
            column_order: None,
            mag_brightest_ref: f64::NEG_INFINITY,
            mag_faintest_ref: f64::INFINITY,
            mag_zeropoint_ref: 31.4,
            coords_ref_to_convert: None,
            coords_ref_factor: 1.0,
            columns_target_select_true: Vec::new(),
            columns_target_select_false: Vec::new(),
        }
    }
}

impl MatchProbabilisticConfig {
    pub fn validate(&self) -> Result<()> {
        if self.column_order.is_none() && self.columns_ref_flux.is_empty() {
            return Err(AstromError::InvalidConfig(
                "columns_ref_flux must not be empty when column_order is unset".into(),
            ));
        }
        if self.mag_brightest_ref > self.mag_faintest_ref {
            return Err(AstromError::InvalidConfig(format!(
                "mag_brightest_ref ({}) > mag_faintest_ref ({})",
                self.mag_brightest_ref, self.mag_faintest_ref
            )));
        }
        if !self.coords_ref_factor.is_finite() || self.coords_ref_factor == 0.0 {
            return Err(AstromError::InvalidConfig(format!(
                "coords_ref_factor must be finite and non-zero, got {}",
                self.coords_ref_factor
            )));
        }
        Ok(())
    }

    /// Reference columns read by the selection steps.
    pub fn columns_in_ref(&self) -> BTreeSet<ColumnRef> {
        let mut cols: BTreeSet<ColumnRef> = self.columns_ref_flux.iter().cloned().collect();
        cols.extend(self.column_order.iter().cloned());
        if let Some(conv) = &self.coords_ref_to_convert {
            cols.insert(conv.ra_in.clone());
            cols.insert(conv.dec_in.clone());
        }
        cols
    }

    /// Target columns read by the selection steps.
    pub fn columns_in_target(&self) -> BTreeSet<ColumnRef> {
        self.columns_target_select_true
            .iter()
            .chain(&self.columns_target_select_false)
            .cloned()
            .collect()
    }

    fn has_mag_limits(&self) -> bool {
        self.mag_brightest_ref != f64::NEG_INFINITY || self.mag_faintest_ref != f64::INFINITY
    }
}

// ── Selection steps ─────────────────────────────────────────────────────────

/// Initial mask: the caller's, after a length check, or all-true.
fn initial_mask(mask: Option<Vec<bool>>, nrows: usize) -> Result<Vec<bool>> {
    match mask {
        Some(m) if m.len() != nrows => Err(AstromError::LengthMismatch {
            expected: nrows,
            found: m.len(),
        }),
        Some(m) => Ok(m),
        None => Ok(vec![true; nrows]),
    }
}

/// Sum the configured flux columns into `flux_total` and fold the magnitude
/// (or finiteness) cut into the reference selection.
///
/// NaN fluxes are skipped in the sum; a row with only NaN fluxes totals 0.
pub fn select_ref_by_flux(
    config: &MatchProbabilisticConfig,
    reference: &mut Table,
    select_ref: Option<Vec<bool>>,
) -> Result<Vec<bool>> {
    let nrows = reference.len();
    let mut select = initial_mask(select_ref, nrows)?;

    let mut flux_total = vec![0.0; nrows];
    for col in &config.columns_ref_flux {
        for (total, &f) in flux_total.iter_mut().zip(reference.float(col.as_str())?) {
            if !f.is_nan() {
                *total += f;
            }
        }
    }

    let mag_limits = config.has_mag_limits();
    for (sel, &flux) in select.iter_mut().zip(&flux_total) {
        let keep = if mag_limits {
            let mag = -2.5 * flux.log10() + config.mag_zeropoint_ref;
            mag >= config.mag_brightest_ref && mag <= config.mag_faintest_ref
        } else {
            flux.is_finite()
        };
        *sel &= keep;
    }

    reference.set_column(FLUX_TOTAL_COLUMN, Column::Float(flux_total))?;
    Ok(select)
}

/// Project the reference sky coordinates through `wcs` into pixel columns.
///
/// Every row is converted, selected or not.
pub fn convert_ref_coords(
    conversion: &CoordConversion,
    factor: f64,
    reference: &mut Table,
    wcs: Option<&dyn Wcs>,
) -> Result<()> {
    let wcs = wcs.ok_or(AstromError::MissingWcs)?;
    let ra = reference.float(conversion.ra_in.as_str())?;
    let dec = reference.float(conversion.dec_in.as_str())?;

    let (x, y): (Vec<f64>, Vec<f64>) = ra
        .iter()
        .zip(dec)
        .map(|(&ra, &dec)| {
            let c = wcs.sky_to_pixel(&SkyCoord::from_degrees(ra * factor, dec * factor));
            (c.x, c.y)
        })
        .unzip();

    reference.set_column(conversion.x_out.as_str(), Column::Float(x))?;
    reference.set_column(conversion.y_out.as_str(), Column::Float(y))?;
    Ok(())
}

/// Narrow the target selection by the configured flag columns.
///
/// Returns the caller's mask unchanged (or all-true) when no flag columns are
/// configured.
pub fn select_target_by_flags(
    config: &MatchProbabilisticConfig,
    target: &Table,
    select_target: Option<Vec<bool>>,
) -> Result<Vec<bool>> {
    let mut select = initial_mask(select_target, target.len())?;
    for col in &config.columns_target_select_true {
        for (sel, &flag) in select.iter_mut().zip(target.bool(col.as_str())?) {
            *sel &= flag;
        }
    }
    for col in &config.columns_target_select_false {
        for (sel, &flag) in select.iter_mut().zip(target.bool(col.as_str())?) {
            *sel &= !flag;
        }
    }
    Ok(select)
}

// ── Task ────────────────────────────────────────────────────────────────────

/// Prepares catalogs and runs a [`CorrespondenceFinder`] on them.
#[derive(Debug, Clone)]
pub struct MatchProbabilisticTask<F> {
    config: MatchProbabilisticConfig,
    finder: F,
}

impl<F: CorrespondenceFinder> MatchProbabilisticTask<F> {
    pub fn new(config: MatchProbabilisticConfig, finder: F) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, finder })
    }

    pub fn config(&self) -> &MatchProbabilisticConfig {
        &self.config
    }

    /// Match `reference` against `target`.
    ///
    /// `select_ref` / `select_target` restrict which rows may be matched;
    /// `None` selects every row. A `wcs` is required only when reference
    /// coordinates are configured for conversion.
    pub fn match_catalogs(
        &self,
        reference: &Table,
        target: &Table,
        select_ref: Option<Vec<bool>>,
        select_target: Option<Vec<bool>>,
        wcs: Option<&dyn Wcs>,
    ) -> Result<MatchOutput> {
        let config = &self.config;
        let mut reference = reference.clone();

        let select_ref = if config.column_order.is_none() {
            select_ref_by_flux(config, &mut reference, select_ref)?
        } else {
            initial_mask(select_ref, reference.len())?
        };

        if let Some(conversion) = &config.coords_ref_to_convert {
            convert_ref_coords(conversion, config.coords_ref_factor, &mut reference, wcs)?;
        }

        let select_target = select_target_by_flags(config, target, select_target)?;

        info!(
            "Beginning probabilistic match with {}/{} ref sources selected vs {}/{} target",
            count_true(&select_ref),
            select_ref.len(),
            count_true(&select_target),
            select_target.len(),
        );

        self.finder
            .find(&reference, target, &select_ref, &select_target)
    }
}

fn count_true(mask: &[bool]) -> usize {
    mask.iter().filter(|&&b| b).count()
}
