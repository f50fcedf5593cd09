use thiserror::Error;

use crate::data::DataError;
use crate::fit::FitError;
use crate::model::ModelError;
use crate::nca::NcaError;
use crate::simulator::SolverError;

/// Top-level error type aggregating the per-module errors.
///
/// Every variant is recoverable at the call boundary: callers surface the
/// message to the user and decide whether to retry with different inputs.
#[derive(Error, Debug, Clone)]
pub enum PkError {
    /// Malformed observation data (column lengths, negative values, CSV)
    #[error(transparent)]
    Data(#[from] DataError),

    /// Invalid or non-physical model parameter, or incompatible dose-context
    #[error(transparent)]
    Domain(#[from] ModelError),

    /// The ODE solver could not reach a requested evaluation time
    #[error(transparent)]
    Integration(#[from] SolverError),

    /// Terminal-phase estimation failed
    #[error(transparent)]
    Estimation(#[from] NcaError),

    /// Nonlinear parameter fitting failed
    #[error(transparent)]
    Fit(#[from] FitError),
}
