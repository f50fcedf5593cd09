//! Trapezoidal AUC calculation
//!
//! Two segment rules:
//!
//! - **Linear**: `(C1 + C2) / 2 * dt`, the default here.
//! - **LinUpLogDown**: linear for ascending concentrations, log-linear
//!   `(C1 - C2) * dt / ln(C1/C2)` for descending positive pairs, which
//!   integrates an exponential between the two points exactly.

use serde::{Deserialize, Serialize};

/// Segment rule for trapezoidal integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AucMethod {
    /// Linear trapezoid on every segment
    #[default]
    Linear,
    /// Linear for ascending, log-linear for descending segments
    LinUpLogDown,
}

/// AUC of a single segment between two observations
///
/// Returns 0.0 for a non-increasing time step. Log-linear falls back to the
/// linear rule whenever a concentration is non-positive or the pair is too
/// close for the log formula to be stable.
#[inline]
pub fn auc_segment(t1: f64, c1: f64, t2: f64, c2: f64, method: AucMethod) -> f64 {
    let dt = t2 - t1;
    if dt <= 0.0 {
        return 0.0;
    }

    match method {
        AucMethod::Linear => (c1 + c2) / 2.0 * dt,
        AucMethod::LinUpLogDown => {
            if c2 >= c1 || c1 <= 0.0 || c2 <= 0.0 {
                (c1 + c2) / 2.0 * dt
            } else {
                let ratio = c1 / c2;
                if (ratio - 1.0).abs() < 1e-10 {
                    (c1 + c2) / 2.0 * dt
                } else {
                    (c1 - c2) * dt / ratio.ln()
                }
            }
        }
    }
}

/// Cumulative AUC from the first observation to the one at `tlast_idx`
pub(crate) fn auc_to(times: &[f64], concentrations: &[f64], tlast_idx: usize, method: AucMethod) -> f64 {
    let mut auc = 0.0;
    for i in 1..=tlast_idx {
        auc += auc_segment(
            times[i - 1],
            concentrations[i - 1],
            times[i],
            concentrations[i],
            method,
        );
    }
    auc
}
