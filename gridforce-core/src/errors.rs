use thiserror::Error;

/// Error type for invalid operations.
///
/// All variants are fatal: a malformed input aborts the run rather than
/// producing partially-correct output. Unknown region labels and
/// zero-proxy regions are deliberately *not* errors (see the `region`
/// module); they degrade to ignored cells with a warning.
#[derive(Error, Debug)]
pub enum GridForceError {
    #[error("{0}")]
    Error(String),
    #[error("{file} - {variable}: {message}")]
    Format {
        file: String,
        variable: String,
        message: String,
    },
    #[error("No {axis} axis found in {file}")]
    AxisNotFound { file: String, axis: String },
    #[error("Grids not compatible in raster resolution: {0}")]
    IncompatibleGrids(String),
    #[error("Forcings are not related")]
    UnrelatedForcings,
    #[error("Time {0} already set")]
    TimeAlreadySet(i64),
    #[error("Incompatible reference time accuracies: {0} and {1} seconds per unit")]
    IncompatibleAccuracies(i64, i64),
    #[error("Unknown time reference '{0}'")]
    UnknownTimeReference(String),
}

/// Convenience type for `Result<T, GridForceError>`.
pub type GridForceResult<T> = Result<T, GridForceError>;
