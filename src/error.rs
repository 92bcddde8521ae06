//! Error type shared by the fitter, the statistics engine and the match
//! selection helpers.

use thiserror::Error;

/// Errors that can occur while fitting, synchronizing or measuring a WCS.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AstromError {
    /// The median on-sky scatter of the final fit exceeds the configured maximum.
    #[error(
        "Fit failed: median scatter on sky = {scatter_arcsec:.3} arcsec > {max_scatter_arcsec:.3} max_scatter_arcsec"
    )]
    FitQuality {
        scatter_arcsec: f64,
        max_scatter_arcsec: f64,
    },

    /// Statistics were requested over zero (finite) samples.
    #[error("cannot compute statistics of an empty sample")]
    EmptyInput,

    /// A match references a record id that is missing from a supplied catalog.
    #[error("match references {catalog} record {id}, which is absent from the supplied catalog")]
    InconsistentCatalog { catalog: &'static str, id: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("SIP order {order} exceeds the convention limit of {max}")]
    OrderOutOfRange { order: u32, max: u32 },

    #[error("too few matches for fit: found {found}, need at least {required}")]
    TooFewMatches { found: usize, required: usize },

    #[error("CD matrix is singular")]
    SingularCdMatrix,

    #[error("column not found: {0}")]
    MissingColumn(String),

    #[error("column {column} is not of type {expected}")]
    WrongColumnType {
        column: String,
        expected: &'static str,
    },

    #[error("length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    /// Reference coordinates must be converted but no WCS was provided.
    #[error("a WCS is required to convert reference coordinates to pixels")]
    MissingWcs,
}

pub type Result<T> = std::result::Result<T, AstromError>;
