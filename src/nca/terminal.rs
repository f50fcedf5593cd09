//! Terminal-phase estimation: lambda_z and half-life
//!
//! The automatic search enumerates candidate windows of contiguous points
//! ending at Tlast, fits ln(C) against time in each, keeps windows with a
//! negative slope, and picks the one with the highest adjusted R². Windows
//! whose adjusted R² is within a small tolerance of the best are broken in
//! favor of more points, so the widest defensible window wins.

use serde::{Deserialize, Serialize};

use crate::data::Profile;
use crate::nca::NcaError;

/// Options for the terminal-phase window search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalOptions {
    /// Minimum number of points in a window (default: 3)
    pub min_points: usize,
    /// Whether windows may reach back to include Tmax (default: true)
    pub allow_tmax: bool,
    /// Minimum R² to accept a window (default: 0.0, accept any declining fit)
    pub min_r_squared: f64,
    /// Adjusted-R² band within which more points win a tie (default: 1e-4)
    pub r_squared_tolerance: f64,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            min_points: 3,
            allow_tmax: true,
            min_r_squared: 0.0,
            r_squared_tolerance: 1e-4,
        }
    }
}

/// One fitted terminal-phase window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalFit {
    /// Terminal elimination rate constant, -slope of ln(C) vs t
    pub lambda_z: f64,
    /// ln(2) / lambda_z
    pub half_life: f64,
    /// Intercept of the ln(C) regression
    pub intercept: f64,
    /// Coefficient of determination
    pub r_squared: f64,
    /// R² adjusted for the number of points
    pub adj_r_squared: f64,
    /// Number of points in the regression
    pub n_points: usize,
    /// First time in the window
    pub time_first: f64,
    /// Last time in the window
    pub time_last: f64,
}

impl TerminalFit {
    fn from_regression(slope: f64, intercept: f64, r_squared: f64, times: &[f64]) -> Self {
        let n = times.len() as f64;
        let adj_r_squared = if times.len() > 2 {
            1.0 - (1.0 - r_squared) * (n - 1.0) / (n - 2.0)
        } else {
            r_squared
        };
        TerminalFit {
            lambda_z: -slope,
            half_life: std::f64::consts::LN_2 / -slope,
            intercept,
            r_squared,
            adj_r_squared,
            n_points: times.len(),
            time_first: times[0],
            time_last: times[times.len() - 1],
        }
    }
}

/// Search for the best terminal-phase window ending at Tlast
pub(crate) fn automatic(profile: &Profile, options: &TerminalOptions) -> Result<TerminalFit, NcaError> {
    let times = profile.times();
    let concs = profile.concentrations();
    let tlast_idx = profile.tlast_idx();

    let start_idx = if options.allow_tmax {
        0
    } else {
        profile.cmax_idx() + 1
    };

    if tlast_idx + 1 < start_idx + options.min_points {
        return Err(NcaError::TooFewTerminalPoints {
            n: (tlast_idx + 1).saturating_sub(start_idx),
            required: options.min_points,
        });
    }

    let max_points = tlast_idx - start_idx + 1;
    let mut best: Option<TerminalFit> = None;
    let mut saw_candidate = false;

    for n_points in options.min_points..=max_points {
        let first_idx = tlast_idx + 1 - n_points;

        let mut reg_times = Vec::with_capacity(n_points);
        let mut reg_log_conc = Vec::with_capacity(n_points);
        for i in first_idx..=tlast_idx {
            if concs[i] > 0.0 {
                reg_times.push(times[i]);
                reg_log_conc.push(concs[i].ln());
            }
        }
        if reg_times.len() < options.min_points {
            continue;
        }

        let Some((slope, intercept, r_squared)) = linear_regression(&reg_times, &reg_log_conc)
        else {
            continue;
        };
        saw_candidate = true;

        if slope >= 0.0 || r_squared < options.min_r_squared {
            continue;
        }

        let fit = TerminalFit::from_regression(slope, intercept, r_squared, &reg_times);
        match &best {
            None => best = Some(fit),
            Some(current) => {
                let diff = fit.adj_r_squared - current.adj_r_squared;
                if diff > options.r_squared_tolerance
                    || (diff >= -options.r_squared_tolerance && fit.n_points > current.n_points)
                {
                    best = Some(fit);
                }
            }
        }
    }

    best.ok_or_else(|| {
        if saw_candidate {
            NcaError::TerminalPhaseNotFound {
                min_points: options.min_points,
                max_points,
            }
        } else {
            NcaError::TooFewTerminalPoints {
                n: 0,
                required: options.min_points,
            }
        }
    })
}

/// Fit a user-selected terminal window
///
/// `selected_times` are matched exactly against observation times; points
/// with zero concentration are dropped before the log transform.
pub(crate) fn manual(profile: &Profile, selected_times: &[f64]) -> Result<TerminalFit, NcaError> {
    let times = profile.times();
    let concs = profile.concentrations();

    let mut reg_times = Vec::new();
    let mut reg_log_conc = Vec::new();
    for (i, &t) in times.iter().enumerate() {
        if selected_times.contains(&t) && concs[i] > 0.0 {
            reg_times.push(t);
            reg_log_conc.push(concs[i].ln());
        }
    }

    if reg_times.is_empty() {
        return Err(NcaError::EmptySelection);
    }
    if reg_times.len() < 2 {
        return Err(NcaError::TooFewTerminalPoints {
            n: reg_times.len(),
            required: 2,
        });
    }

    let (slope, intercept, r_squared) = linear_regression(&reg_times, &reg_log_conc)
        .ok_or(NcaError::TooFewTerminalPoints {
            n: reg_times.len(),
            required: 2,
        })?;

    if slope >= 0.0 {
        return Err(NcaError::NonNegativeSlope { slope });
    }

    Ok(TerminalFit::from_regression(
        slope, intercept, r_squared, &reg_times,
    ))
}

/// Ordinary least squares y = a + b x, returning (slope, intercept, R²)
pub(crate) fn linear_regression(x: &[f64], y: &[f64]) -> Option<(f64, f64, f64)> {
    let n = x.len();
    if n < 2 || n != y.len() {
        return None;
    }
    let n_f = n as f64;

    let x_mean: f64 = x.iter().sum::<f64>() / n_f;
    let y_mean: f64 = y.iter().sum::<f64>() / n_f;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    for i in 0..n {
        let x_diff = x[i] - x_mean;
        let y_diff = y[i] - y_mean;
        ss_xy += x_diff * y_diff;
        ss_xx += x_diff * x_diff;
        ss_yy += y_diff * y_diff;
    }

    if ss_xx.abs() < 1e-15 {
        return None;
    }

    let slope = ss_xy / ss_xx;
    let intercept = y_mean - slope * x_mean;
    let r_squared = if ss_yy.abs() < 1e-15 {
        1.0
    } else {
        (ss_xy * ss_xy) / (ss_xx * ss_yy)
    };

    Some((slope, intercept, r_squared))
}
