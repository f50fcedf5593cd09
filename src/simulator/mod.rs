//! Concentration prediction
//!
//! [`concentrations`] is the single prediction entry point: given a model, a
//! dose-context, parameters and evaluation times it returns one concentration
//! per time, either from the closed form or by BDF integration of the
//! equivalent ODE system. The two paths agree to solver tolerance, which the
//! integration tests rely on.

pub(crate) mod closure;

use diffsol::{error::OdeSolverError, ode_solver::method::OdeSolverMethod, OdeBuilder, OdeSolverStopReason};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::PkError;
use crate::model::{Dosing, Model, ModelError};
use closure::PkProblem;

pub(crate) type T = f64;
pub(crate) type V = nalgebra::DVector<T>;
pub(crate) type M = nalgebra::DMatrix<T>;

/// How to evaluate a model's concentrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Closed-form exponential solution
    #[default]
    Exponential,
    /// BDF integration of the ODE representation
    Ode,
}

/// ODE solver configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    pub rtol: f64,
    pub atol: f64,
    pub h0: f64,
    pub max_steps: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-8,
            h0: 1e-3,
            max_steps: 100_000,
        }
    }
}

/// Errors raised while integrating the ODE representation
#[derive(Error, Debug, Clone)]
pub enum SolverError {
    /// The step size collapsed, usually a near-zero or huge parameter
    #[error("ODE step size collapsed near t = {t}; a parameter is close to zero or infinity")]
    StepSizeCollapse { t: f64 },

    /// The step budget ran out before the last requested time
    #[error("ODE solver exceeded {max_steps} steps before reaching t = {t}")]
    MaxStepsExceeded { max_steps: usize, t: f64 },

    /// The problem could not be constructed
    #[error("ODE problem setup failed: {0}")]
    Setup(String),

    /// Any other solver failure
    #[error("ODE solver error: {0}")]
    Solver(String),
}

/// Predict concentrations at the given times
///
/// Validates parameters and dose-context once, then dispatches on `method`.
/// Times must be non-negative; they do not have to be sorted for the
/// closed-form path, but the ODE path requires ascending order (as produced
/// by [`crate::data::Profile::times`]).
pub fn concentrations(
    model: Model,
    method: Method,
    params: &[f64],
    dosing: &Dosing,
    times: &[f64],
    options: &SolverOptions,
) -> Result<Vec<f64>, PkError> {
    match method {
        Method::Exponential => Ok(model.concentration_profile(params, dosing, times)?),
        Method::Ode => {
            model.validate_params(params)?;
            model.check_dosing(dosing)?;
            if let Some(&t) = times.iter().find(|&&t| t < 0.0) {
                return Err(ModelError::NegativeTime(t).into());
            }
            Ok(ode_concentrations(model, params, dosing, times, options)?)
        }
    }
}

/// Integrate the ODE system and sample the output at exactly `times`
///
/// The infusion cutover time is inserted as an extra, non-recorded stop so
/// the solver never steps across the input discontinuity.
pub(crate) fn ode_concentrations(
    model: Model,
    params: &[f64],
    dosing: &Dosing,
    times: &[f64],
    options: &SolverOptions,
) -> Result<Vec<f64>, SolverError> {
    if times.is_empty() {
        return Ok(Vec::new());
    }

    // (time, record) stop list, ascending; the cutover is solver-internal
    let mut targets: Vec<(f64, bool)> = times.iter().map(|&t| (t, true)).collect();
    if let Dosing::Infusion { duration, .. } = dosing {
        let pos = targets.partition_point(|&(t, _)| t < *duration);
        let already_there = targets.get(pos).is_some_and(|&(t, _)| t == *duration);
        if !already_there {
            targets.insert(pos, (*duration, false));
        }
    }

    let nstates = model.nstates();
    let problem = OdeBuilder::<M>::new()
        .atol(vec![options.atol; nstates])
        .rtol(options.rtol)
        .t0(0.0)
        .h0(options.h0)
        .p(params.to_vec())
        .build_from_eqn(PkProblem::new(model, *dosing, params.to_vec()))
        .map_err(|e| SolverError::Setup(e.to_string()))?;

    let mut solver = problem
        .bdf::<diffsol::NalgebraLU<f64>>()
        .map_err(|e| SolverError::Setup(e.to_string()))?;

    let mut out = Vec::with_capacity(times.len());
    let mut steps_taken = 0usize;

    for (target, record) in targets {
        if target > solver.state().t {
            match solver.set_stop_time(target) {
                Ok(_) => loop {
                    match solver.step() {
                        Ok(OdeSolverStopReason::InternalTimestep) => {
                            steps_taken += 1;
                            if steps_taken > options.max_steps {
                                return Err(SolverError::MaxStepsExceeded {
                                    max_steps: options.max_steps,
                                    t: target,
                                });
                            }
                        }
                        Ok(OdeSolverStopReason::TstopReached) => break,
                        Ok(reason) => {
                            return Err(SolverError::Solver(format!(
                                "unexpected stop reason: {reason:?}"
                            )))
                        }
                        Err(diffsol::error::DiffsolError::OdeSolverError(
                            OdeSolverError::StepSizeTooSmall { .. },
                        )) => {
                            return Err(SolverError::StepSizeCollapse { t: target });
                        }
                        Err(e) => return Err(SolverError::Solver(e.to_string())),
                    }
                },
                Err(diffsol::error::DiffsolError::OdeSolverError(
                    OdeSolverError::StopTimeAtCurrentTime,
                )) => {}
                Err(e) => return Err(SolverError::Solver(e.to_string())),
            }
        }
        if record {
            out.push(model.output(solver.state().y, params));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_options_defaults() {
        let opts = SolverOptions::default();
        assert_eq!(opts.rtol, 1e-6);
        assert_eq!(opts.atol, 1e-8);
        assert_eq!(opts.max_steps, 100_000);
    }

    #[test]
    fn test_exponential_dispatch() {
        let dosing = Dosing::bolus(100.0).unwrap();
        let preds = concentrations(
            Model::OneCompartmentIv,
            Method::Exponential,
            &[0.2, 10.0],
            &dosing,
            &[0.0, 1.0, 2.0],
            &SolverOptions::default(),
        )
        .unwrap();
        assert_eq!(preds.len(), 3);
        assert_eq!(preds[0], 10.0);
        assert!(preds[1] > preds[2]);
    }

    #[test]
    fn test_ode_rejects_negative_time() {
        let dosing = Dosing::bolus(100.0).unwrap();
        let err = concentrations(
            Model::OneCompartmentIv,
            Method::Ode,
            &[0.2, 10.0],
            &dosing,
            &[-1.0, 0.0, 1.0],
            &SolverOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PkError::Domain(ModelError::NegativeTime(_))
        ));
    }

    #[test]
    fn test_exponential_rejects_bad_params() {
        let dosing = Dosing::bolus(100.0).unwrap();
        assert!(concentrations(
            Model::OneCompartmentIv,
            Method::Exponential,
            &[0.2],
            &dosing,
            &[1.0],
            &SolverOptions::default(),
        )
        .is_err());
    }
}
