use thiserror::Error;

/// Error type for harmonisation and aggregation failures.
///
/// Every variant is scoped to a single source: callers processing a batch
/// record the failure against that source and move on to its siblings.
#[derive(Error, Debug)]
pub enum HarmonizeError {
    #[error("{0}")]
    Error(String),
    #[error("Historical and scenario identifiers disagree on {field}: historical={historical}, scenario={scenario}")]
    Consistency {
        field: String,
        historical: String,
        scenario: String,
    },
    #[error("Could not determine the calendar of the time axis: {0}")]
    CalendarDetection(String),
    #[error("Ambiguous coordinates: both `{canonical}` and `{alternate}` are present, dropping `{alternate}`")]
    CoordinateAmbiguity { canonical: String, alternate: String },
    #[error("Missing {kind} artifact for {label}: nothing found at {location}")]
    MissingArtifact {
        kind: String,
        label: String,
        location: String,
    },
    #[error("Cannot rasterise regions onto grid: {0}")]
    RegionMaskGeometry(String),
    #[error("Malformed source identifier `{identifier}`: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },
    #[error("Longitude maximum {max_lon} matches no known convention for box [{west}, {east}]")]
    LongitudeConvention { max_lon: f64, west: f64, east: f64 },
    #[error("No timestamps remain between {start} and {end}")]
    EmptyTimeWindow { start: String, end: String },
    #[error("Invalid date {0}")]
    InvalidDate(String),
    #[error("Cannot parse CF time units `{0}`")]
    InvalidTimeUnits(String),
    #[error("Shape mismatch for {context}: expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Variable `{0}` not found in dataset")]
    MissingVariable(String),
    #[error("Coordinate `{0}` not found on grid")]
    MissingCoordinate(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Serialisation failed: {0}")]
    Serialization(String),
}

/// Convenience type for `Result<T, HarmonizeError>`.
pub type HarmonizeResult<T> = Result<T, HarmonizeError>;
