use crate::types::Crs;
use thiserror::Error;

/// Failure reported by a site or facility source. Surfaced to the caller unmodified.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("could not parse source response: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("{provider} record {record}: required field '{field}' {reason}")]
    Schema {
        provider: String,
        field: String,
        record: usize,
        reason: String,
    },

    #[error("record '{location_id}' has out-of-range coordinates ({latitude}, {longitude})")]
    InvalidCoordinate {
        location_id: String,
        latitude: f64,
        longitude: f64,
    },

    #[error("coordinate reference mismatch: points are {points}, polygons are {polygons}")]
    CrsMismatch { points: Crs, polygons: Crs },

    #[error("invalid polygon geometry for '{id}': {reason}")]
    InvalidGeometry { id: String, reason: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("unknown layer '{0}'")]
    UnknownLayer(String),

    #[error("layer '{0}' appears more than once")]
    DuplicateLayer(String),

    #[error("at least one base layer is required")]
    NoBaseLayer,

    #[error("invalid color '{value}': {reason}")]
    InvalidColor { value: String, reason: String },
}

pub type Result<T> = std::result::Result<T, MapError>;
