use thiserror::Error;

/// Errors raised during non-compartmental analysis
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NcaError {
    /// Not enough observations to analyze at all
    #[error("NCA requires at least {required} observations, got {n}")]
    InsufficientData { n: usize, required: usize },

    /// The automatic window search produced no window with a negative slope
    #[error(
        "no terminal-phase window found: tried windows of {min_points} to {max_points} points \
         ending at tlast"
    )]
    TerminalPhaseNotFound { min_points: usize, max_points: usize },

    /// Too few usable points for the log-linear regression
    #[error("terminal-phase regression needs at least {required} positive-concentration points, got {n}")]
    TooFewTerminalPoints { n: usize, required: usize },

    /// The regression slope is non-negative, so lambda_z is undefined
    #[error("terminal-phase slope is non-negative ({slope}); concentrations are not declining")]
    NonNegativeSlope { slope: f64 },

    /// A manual selection matched no observations
    #[error("manual terminal-phase selection matched no observation times")]
    EmptySelection,

    /// Dose amount for clearance and volume must be positive
    #[error("dose must be positive, got {0}")]
    NonPositiveDose(f64),
}
