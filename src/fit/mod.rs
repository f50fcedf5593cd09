//! Nonlinear least-squares parameter estimation
//!
//! [`fit_model`] minimizes the residual sum of squares between observed
//! concentrations and model predictions with Nelder-Mead, starting from
//! data-informed initial guesses. Parameter positivity is enforced through a
//! large finite penalty below a small floor, so the simplex can approach the
//! boundary without ever evaluating a non-physical point. The fitted result
//! carries RSS, AIC and BIC for downstream model ranking.

use argmin::{
    core::{CostFunction, Error, Executor, TerminationReason, TerminationStatus},
    solver::neldermead::NelderMead,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Profile;
use crate::model::{Dosing, Model, ModelError};
use crate::simulator::{self, Method, SolverOptions};

/// Penalty magnitude for out-of-bounds or failed evaluations, large but
/// finite so the simplex keeps a usable gradient direction
const PENALTY: f64 = 1e12;

/// Fitting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Iteration cap for the optimizer
    pub max_iters: u64,
    /// Nelder-Mead standard-deviation convergence tolerance
    pub sd_tolerance: f64,
    /// Positivity floor below which the penalty applies
    pub lower_bound: f64,
    /// Relative perturbation used to build the initial simplex
    pub simplex_scale: f64,
    /// ODE solver settings, used when fitting with [`Method::Ode`]
    pub solver: SolverOptions,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            sd_tolerance: 1e-10,
            lower_bound: 1e-10,
            simplex_scale: 0.15,
            solver: SolverOptions::default(),
        }
    }
}

/// Errors raised during parameter estimation
#[derive(Error, Debug, Clone)]
pub enum FitError {
    /// Fewer observations than parameters
    #[error("{model} has {p} parameters but only {n} observations are available")]
    Underdetermined { model: Model, n: usize, p: usize },

    /// The optimizer stopped on its iteration cap instead of converging
    #[error("{model} did not converge within {iterations} iterations")]
    DidNotConverge {
        model: Model,
        iterations: u64,
        partial: Box<FitResult>,
    },

    /// The optimizer itself failed
    #[error("optimizer error: {0}")]
    Optimizer(String),

    /// Predictions could not be computed at the fitted parameters
    #[error("prediction failed at fitted parameters: {0}")]
    Prediction(String),

    /// Invalid model inputs
    #[error(transparent)]
    Domain(#[from] ModelError),
}

impl FitError {
    /// The best parameters found so far, when the failure preserved them
    pub fn partial(&self) -> Option<&FitResult> {
        match self {
            FitError::DidNotConverge { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// A fitted model with its goodness-of-fit summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub model: Model,
    pub method: Method,
    /// Estimates in [`Model::parameter_names`] order
    pub parameters: Vec<f64>,
    /// Model predictions at the observation times
    pub predictions: Vec<f64>,
    /// Residual sum of squares
    pub rss: f64,
    /// n ln(RSS/n) + 2 p
    pub aic: f64,
    /// n ln(RSS/n) + ln(n) p
    pub bic: f64,
    pub converged: bool,
    pub iterations: u64,
}

impl FitResult {
    /// Parameter estimates zipped with their names
    pub fn named_parameters(&self) -> Vec<(&'static str, f64)> {
        self.model
            .parameter_names()
            .iter()
            .zip(&self.parameters)
            .map(|(&name, &value)| (name, value))
            .collect()
    }

    /// Name/value map for export
    pub fn parameter_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        for (name, value) in self.named_parameters() {
            if let Some(n) = serde_json::Number::from_f64(value) {
                map.insert(name.to_string(), serde_json::Value::Number(n));
            }
        }
        map
    }
}

struct SsqCost<'a> {
    model: Model,
    method: Method,
    dosing: &'a Dosing,
    times: &'a [f64],
    observed: &'a [f64],
    lower_bound: f64,
    solver: &'a SolverOptions,
}

impl CostFunction for SsqCost<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, Error> {
        // penalize instead of erroring so the simplex can retreat
        let mut violation = 0.0;
        for &p in params {
            if !p.is_finite() {
                return Ok(2.0 * PENALTY);
            }
            if p < self.lower_bound {
                violation += self.lower_bound - p;
            }
        }
        if violation > 0.0 {
            return Ok(PENALTY * (1.0 + violation));
        }

        let predictions = match simulator::concentrations(
            self.model,
            self.method,
            params,
            self.dosing,
            self.times,
            self.solver,
        ) {
            Ok(p) => p,
            Err(_) => return Ok(PENALTY),
        };

        Ok(residual_sum_of_squares(self.observed, &predictions))
    }
}

fn residual_sum_of_squares(observed: &[f64], predicted: &[f64]) -> f64 {
    observed
        .iter()
        .zip(predicted)
        .map(|(o, p)| {
            let r = o - p;
            r * r
        })
        .sum()
}

/// AIC and BIC from the Gaussian log-likelihood of the residuals
///
/// RSS/n is floored at the smallest positive double so a perfect fit yields
/// a large negative criterion instead of ln(0).
fn information_criteria(rss: f64, n: usize, p: usize) -> (f64, f64) {
    let n_f = n as f64;
    let p_f = p as f64;
    let mean_rss = (rss / n_f).max(f64::MIN_POSITIVE);
    let base = n_f * mean_rss.ln();
    (base + 2.0 * p_f, base + n_f.ln() * p_f)
}

fn create_initial_simplex(initial_point: &[f64], scale: f64) -> Vec<Vec<f64>> {
    let mut vertices = Vec::with_capacity(initial_point.len() + 1);
    vertices.push(initial_point.to_vec());

    for i in 0..initial_point.len() {
        let perturbation = if initial_point[i] == 0.0 {
            0.00025
        } else {
            scale * initial_point[i]
        };
        let mut perturbed_point = initial_point.to_vec();
        perturbed_point[i] += perturbation;
        vertices.push(perturbed_point);
    }

    vertices
}

/// Data-informed starting point for the optimizer
///
/// A crude log-linear slope over the last few positive observations seeds
/// the elimination rate; the dose amount over Cmax seeds the volume. The
/// remaining parameters are scaled from those two.
fn initial_guess(model: Model, profile: &Profile, dosing: &Dosing) -> Vec<f64> {
    let times = profile.times();
    let concs = profile.concentrations();

    let mut tail_times = Vec::new();
    let mut tail_log_conc = Vec::new();
    for i in (0..=profile.tlast_idx()).rev() {
        if concs[i] > 0.0 {
            tail_times.push(times[i]);
            tail_log_conc.push(concs[i].ln());
            if tail_times.len() == 4 {
                break;
            }
        }
    }
    let k0 = crate::nca::terminal_slope_guess(&tail_times, &tail_log_conc).unwrap_or(0.1);

    let amount = dosing.amount();
    let cmax = profile.cmax();
    let v0 = if cmax > 0.0 {
        (amount / cmax).max(1e-3)
    } else {
        10.0
    };

    let ka0 = (5.0 * k0).max(0.5);
    let cl0 = k0 * v0;
    let q0 = 0.5 * cl0;
    let v2_0 = v0;

    match model {
        Model::OneCompartmentIv | Model::IvInfusion => vec![k0, v0],
        Model::OneCompartmentOral => vec![ka0, k0, v0],
        Model::TwoCompartmentIv => vec![cl0, v0, q0, v2_0],
        Model::TwoCompartmentOral => vec![ka0, cl0, v0, q0, v2_0],
    }
}

/// Fit a model to a profile with default options
pub fn fit_model(
    profile: &Profile,
    model: Model,
    method: Method,
    dosing: &Dosing,
) -> Result<FitResult, FitError> {
    fit_model_with(profile, model, method, dosing, &FitOptions::default())
}

/// Fit a model to a profile
///
/// Fails with [`FitError::Underdetermined`] when the profile has fewer
/// observations than the model has parameters, and with
/// [`FitError::DidNotConverge`] (carrying the best parameters found) when
/// the iteration cap is reached first.
pub fn fit_model_with(
    profile: &Profile,
    model: Model,
    method: Method,
    dosing: &Dosing,
    options: &FitOptions,
) -> Result<FitResult, FitError> {
    model.check_dosing(dosing)?;

    let n = profile.len();
    let p = model.nparams();
    if n < p {
        return Err(FitError::Underdetermined { model, n, p });
    }

    let guess = initial_guess(model, profile, dosing);
    let cost = SsqCost {
        model,
        method,
        dosing,
        times: profile.times(),
        observed: profile.concentrations(),
        lower_bound: options.lower_bound,
        solver: &options.solver,
    };

    let simplex = create_initial_simplex(&guess, options.simplex_scale);
    let solver: NelderMead<Vec<f64>, f64> = NelderMead::new(simplex)
        .with_sd_tolerance(options.sd_tolerance)
        .map_err(|e| FitError::Optimizer(e.to_string()))?;

    let res = Executor::new(cost, solver)
        .configure(|state| state.max_iters(options.max_iters))
        .run()
        .map_err(|e| FitError::Optimizer(e.to_string()))?;

    let parameters = res
        .state
        .best_param
        .clone()
        .ok_or_else(|| FitError::Optimizer("optimizer returned no parameters".to_string()))?;
    let iterations = res.state.iter;
    let converged = matches!(
        res.state.termination_status,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );

    let predictions = simulator::concentrations(
        model,
        method,
        &parameters,
        dosing,
        profile.times(),
        &options.solver,
    )
    .map_err(|e| FitError::Prediction(e.to_string()))?;

    let rss = residual_sum_of_squares(profile.concentrations(), &predictions);
    let (aic, bic) = information_criteria(rss, n, p);

    let result = FitResult {
        model,
        method,
        parameters,
        predictions,
        rss,
        aic,
        bic,
        converged,
        iterations,
    };

    if !converged {
        tracing::warn!(
            model = %model,
            iterations,
            rss,
            "fit stopped on the iteration cap without converging"
        );
        return Err(FitError::DidNotConverge {
            model,
            iterations,
            partial: Box::new(result),
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn iv_profile() -> Profile {
        let times = vec![0.0, 0.25, 0.5, 1.0, 2.0, 4.0, 6.0, 8.0, 12.0, 24.0];
        let concs: Vec<f64> = times.iter().map(|&t| 10.0 * (-0.2_f64 * t).exp()).collect();
        Profile::new(times, concs).unwrap()
    }

    #[test]
    fn test_information_criteria_formulas() {
        let (aic, bic) = information_criteria(10.0, 10, 2);
        assert_relative_eq!(aic, 10.0 * 1.0_f64.ln() + 4.0, max_relative = 1e-12);
        assert_relative_eq!(bic, 10.0 * 1.0_f64.ln() + 10.0_f64.ln() * 2.0, max_relative = 1e-12);
    }

    #[test]
    fn test_information_criteria_perfect_fit_is_finite() {
        let (aic, bic) = information_criteria(0.0, 10, 2);
        assert!(aic.is_finite());
        assert!(bic.is_finite());
        assert!(aic < -1000.0);
    }

    #[test]
    fn test_initial_simplex_shape() {
        let simplex = create_initial_simplex(&[0.2, 10.0], 0.15);
        assert_eq!(simplex.len(), 3);
        assert_eq!(simplex[0], vec![0.2, 10.0]);
        assert!(simplex[1][0] > 0.2);
        assert!(simplex[2][1] > 10.0);
    }

    #[test]
    fn test_underdetermined_rejected() {
        let profile = Profile::new(vec![0.0, 1.0, 2.0], vec![10.0, 8.0, 6.0]).unwrap();
        let dosing = Dosing::bolus(100.0).unwrap();
        let err = fit_model(&profile, Model::TwoCompartmentIv, Method::Exponential, &dosing)
            .unwrap_err();
        assert!(matches!(err, FitError::Underdetermined { n: 3, p: 4, .. }));
    }

    #[test]
    fn test_fit_recovers_one_compartment_iv() {
        let dosing = Dosing::bolus(100.0).unwrap();
        let result = fit_model(
            &iv_profile(),
            Model::OneCompartmentIv,
            Method::Exponential,
            &dosing,
        )
        .unwrap();

        assert!(result.converged);
        assert_relative_eq!(result.parameters[0], 0.2, max_relative = 1e-2);
        assert_relative_eq!(result.parameters[1], 10.0, max_relative = 1e-2);
        assert!(result.rss < 1e-6);
        assert_eq!(result.predictions.len(), 10);
    }

    #[test]
    fn test_fit_rejects_incompatible_dosing() {
        let dosing = Dosing::oral(100.0).unwrap();
        assert!(matches!(
            fit_model(&iv_profile(), Model::OneCompartmentIv, Method::Exponential, &dosing),
            Err(FitError::Domain(_))
        ));
    }

    #[test]
    fn test_cost_penalizes_bound_violation() {
        let profile = iv_profile();
        let dosing = Dosing::bolus(100.0).unwrap();
        let solver = SolverOptions::default();
        let cost = SsqCost {
            model: Model::OneCompartmentIv,
            method: Method::Exponential,
            dosing: &dosing,
            times: profile.times(),
            observed: profile.concentrations(),
            lower_bound: 1e-10,
            solver: &solver,
        };
        let in_bounds = cost.cost(&vec![0.2, 10.0]).unwrap();
        let violating = cost.cost(&vec![-0.2, 10.0]).unwrap();
        let worse = cost.cost(&vec![-0.4, 10.0]).unwrap();
        assert!(in_bounds < PENALTY);
        assert!(violating >= PENALTY);
        // the penalty slopes away from the boundary
        assert!(worse > violating);
    }

    #[test]
    fn test_named_parameters() {
        let dosing = Dosing::bolus(100.0).unwrap();
        let result = fit_model(
            &iv_profile(),
            Model::OneCompartmentIv,
            Method::Exponential,
            &dosing,
        )
        .unwrap();
        let named = result.named_parameters();
        assert_eq!(named[0].0, "k");
        assert_eq!(named[1].0, "v");
    }
}
