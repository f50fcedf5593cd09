//! Model library: the closed set of compartmental models
//!
//! Each [`Model`] variant carries a fixed parameter list and two equivalent
//! representations of the same kinetics:
//!
//! - a closed-form concentration function of `(t, params, dosing)`, and
//! - an ODE right-hand side over drug amounts, with an initial state and an
//!   output map (amount in the observed compartment divided by its volume).
//!
//! Parameter count and order are fixed per variant and shared by both
//! representations. Dose-context is the [`Dosing`] enum: an incompatible
//! `(model, dosing)` pair fails at the call boundary instead of living as a
//! nullable field.

mod one_compartment;
mod two_compartment;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::simulator::{T, V};

/// Relative separation below which two first-order rate constants are
/// treated as coincident (limiting-case branch or domain error).
pub(crate) const MIN_RATE_SEPARATION: f64 = 1e-8;

/// Errors for non-physical parameters and incompatible dose-contexts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A physically-positive parameter is zero or negative
    #[error("parameter {name} must be positive, got {value}")]
    NonPositiveParameter { name: &'static str, value: f64 },

    /// Wrong parameter vector length for the model
    #[error("{model} takes {expected} parameters, got {actual}")]
    ParameterCount {
        model: Model,
        expected: usize,
        actual: usize,
    },

    /// Dose-context does not match the model's route
    #[error("{model} requires {required} dosing, got {given}")]
    IncompatibleDosing {
        model: Model,
        required: &'static str,
        given: &'static str,
    },

    /// Dose-context information needed by the model was not supplied
    #[error("{model} requires {missing}")]
    MissingDoseContext {
        model: Model,
        missing: &'static str,
    },

    /// Dose amount must be positive
    #[error("dose amount must be positive, got {0}")]
    NonPositiveDose(f64),

    /// Infusion rate and duration must both be positive
    #[error("infusion rate and duration must be positive, got rate {rate}, duration {duration}")]
    InvalidInfusion { rate: f64, duration: f64 },

    /// Absorption rate coincides with a disposition rate, so the
    /// closed form is degenerate
    #[error("absorption rate ka = {ka} is too close to disposition rate {rate}")]
    RateCoincidence { ka: f64, rate: f64 },

    /// Evaluation time must be non-negative
    #[error("evaluation time must be non-negative, got {0}")]
    NegativeTime(f64),
}

/// Dose-context for one analysis
///
/// The variant encodes the route, so a PO model without a dose amount (or an
/// infusion model without rate/duration) cannot be represented at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dosing {
    /// Instantaneous IV bolus of `amount` into the central compartment
    Bolus { amount: f64 },
    /// Oral dose of `amount` into the absorption compartment
    Oral { amount: f64 },
    /// Constant-rate infusion of `rate` over `[0, duration]`
    Infusion { rate: f64, duration: f64 },
}

impl Dosing {
    pub fn bolus(amount: f64) -> Result<Self, ModelError> {
        if amount <= 0.0 || !amount.is_finite() {
            return Err(ModelError::NonPositiveDose(amount));
        }
        Ok(Dosing::Bolus { amount })
    }

    pub fn oral(amount: f64) -> Result<Self, ModelError> {
        if amount <= 0.0 || !amount.is_finite() {
            return Err(ModelError::NonPositiveDose(amount));
        }
        Ok(Dosing::Oral { amount })
    }

    pub fn infusion(rate: f64, duration: f64) -> Result<Self, ModelError> {
        if rate <= 0.0 || duration <= 0.0 || !rate.is_finite() || !duration.is_finite() {
            return Err(ModelError::InvalidInfusion { rate, duration });
        }
        Ok(Dosing::Infusion { rate, duration })
    }

    /// Build the dose-context a model requires from the optional
    /// dose/rate/duration triple the UI layer collects.
    pub fn for_model(
        model: Model,
        dose: Option<f64>,
        rate: Option<f64>,
        duration: Option<f64>,
    ) -> Result<Self, ModelError> {
        match model {
            Model::OneCompartmentIv | Model::TwoCompartmentIv => {
                let amount = dose.ok_or(ModelError::MissingDoseContext {
                    model,
                    missing: "a dose amount",
                })?;
                Dosing::bolus(amount)
            }
            Model::OneCompartmentOral | Model::TwoCompartmentOral => {
                let amount = dose.ok_or(ModelError::MissingDoseContext {
                    model,
                    missing: "a dose amount",
                })?;
                Dosing::oral(amount)
            }
            Model::IvInfusion => {
                let (rate, duration) = match (rate, duration) {
                    (Some(r), Some(d)) => (r, d),
                    _ => {
                        return Err(ModelError::MissingDoseContext {
                            model,
                            missing: "an infusion rate and duration",
                        })
                    }
                };
                Dosing::infusion(rate, duration)
            }
        }
    }

    /// Total administered amount (rate x duration for infusions)
    pub fn amount(&self) -> f64 {
        match *self {
            Dosing::Bolus { amount } | Dosing::Oral { amount } => amount,
            Dosing::Infusion { rate, duration } => rate * duration,
        }
    }

    /// Infusion input rate at time `t`, zero for non-infusion routes
    pub(crate) fn rate_at(&self, t: f64) -> f64 {
        match *self {
            Dosing::Infusion { rate, duration } if t >= 0.0 && t <= duration => rate,
            _ => 0.0,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Dosing::Bolus { .. } => "IV bolus",
            Dosing::Oral { .. } => "oral",
            Dosing::Infusion { .. } => "IV infusion",
        }
    }
}

/// The closed set of compartmental models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    /// 1-compartment IV bolus: C(t) = (D/v) e^(-k t)
    OneCompartmentIv,
    /// 1-compartment with first-order absorption
    OneCompartmentOral,
    /// 2-compartment IV bolus (bi-exponential disposition)
    TwoCompartmentIv,
    /// 2-compartment with first-order absorption
    TwoCompartmentOral,
    /// 1-compartment constant-rate IV infusion
    IvInfusion,
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Model::OneCompartmentIv => "1-compartment IV bolus",
            Model::OneCompartmentOral => "1-compartment oral",
            Model::TwoCompartmentIv => "2-compartment IV bolus",
            Model::TwoCompartmentOral => "2-compartment oral",
            Model::IvInfusion => "IV infusion",
        })
    }
}

impl Model {
    /// The full model set, in registry order
    pub const ALL: [Model; 5] = [
        Model::OneCompartmentIv,
        Model::OneCompartmentOral,
        Model::TwoCompartmentIv,
        Model::TwoCompartmentOral,
        Model::IvInfusion,
    ];

    /// Position in [`Model::ALL`]
    pub fn registry_index(&self) -> usize {
        Model::ALL
            .iter()
            .position(|m| m == self)
            .unwrap_or(Model::ALL.len())
    }

    /// Parameter names, in the order both representations expect
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            Model::OneCompartmentIv => &["k", "v"],
            Model::OneCompartmentOral => &["ka", "k", "v"],
            Model::TwoCompartmentIv => &["cl", "v1", "q", "v2"],
            Model::TwoCompartmentOral => &["ka", "cl", "v1", "q", "v2"],
            Model::IvInfusion => &["k", "v"],
        }
    }

    /// Number of parameters
    pub fn nparams(&self) -> usize {
        self.parameter_names().len()
    }

    /// Number of ODE states
    pub fn nstates(&self) -> usize {
        match self {
            Model::OneCompartmentIv | Model::IvInfusion => 1,
            Model::OneCompartmentOral | Model::TwoCompartmentIv => 2,
            Model::TwoCompartmentOral => 3,
        }
    }

    /// Check parameter vector length and positivity
    pub fn validate_params(&self, params: &[f64]) -> Result<(), ModelError> {
        let names = self.parameter_names();
        if params.len() != names.len() {
            return Err(ModelError::ParameterCount {
                model: *self,
                expected: names.len(),
                actual: params.len(),
            });
        }
        for (name, &value) in names.iter().zip(params) {
            if !value.is_finite() || value <= 0.0 {
                return Err(ModelError::NonPositiveParameter { name, value });
            }
        }
        Ok(())
    }

    /// Check that the dose-context matches the model's route
    pub fn check_dosing(&self, dosing: &Dosing) -> Result<(), ModelError> {
        let compatible = matches!(
            (self, dosing),
            (Model::OneCompartmentIv | Model::TwoCompartmentIv, Dosing::Bolus { .. })
                | (
                    Model::OneCompartmentOral | Model::TwoCompartmentOral,
                    Dosing::Oral { .. }
                )
                | (Model::IvInfusion, Dosing::Infusion { .. })
        );
        if compatible {
            Ok(())
        } else {
            Err(ModelError::IncompatibleDosing {
                model: *self,
                required: self.required_dosing(),
                given: dosing.kind(),
            })
        }
    }

    fn required_dosing(&self) -> &'static str {
        match self {
            Model::OneCompartmentIv | Model::TwoCompartmentIv => "IV bolus",
            Model::OneCompartmentOral | Model::TwoCompartmentOral => "oral",
            Model::IvInfusion => "IV infusion",
        }
    }

    /// Closed-form concentration at time `t`
    ///
    /// Fails with a [`ModelError`] on non-physical parameters or an
    /// incompatible dose-context; never silently returns NaN or a negative
    /// concentration.
    pub fn concentration(&self, t: f64, params: &[f64], dosing: &Dosing) -> Result<f64, ModelError> {
        self.validate_params(params)?;
        self.check_dosing(dosing)?;
        if t < 0.0 {
            return Err(ModelError::NegativeTime(t));
        }
        self.closed_form(t, params, dosing)
    }

    /// Closed-form concentrations at a sequence of times, validating once
    pub fn concentration_profile(
        &self,
        params: &[f64],
        dosing: &Dosing,
        times: &[f64],
    ) -> Result<Vec<f64>, ModelError> {
        self.validate_params(params)?;
        self.check_dosing(dosing)?;
        times
            .iter()
            .map(|&t| {
                if t < 0.0 {
                    return Err(ModelError::NegativeTime(t));
                }
                self.closed_form(t, params, dosing)
            })
            .collect()
    }

    /// Closed form with parameters and dosing already validated
    fn closed_form(&self, t: f64, params: &[f64], dosing: &Dosing) -> Result<f64, ModelError> {
        match (self, dosing) {
            (Model::OneCompartmentIv, Dosing::Bolus { amount }) => {
                Ok(one_compartment::iv_bolus(t, params[0], params[1], *amount))
            }
            (Model::OneCompartmentOral, Dosing::Oral { amount }) => Ok(one_compartment::oral(
                t, params[0], params[1], params[2], *amount,
            )),
            (Model::TwoCompartmentIv, Dosing::Bolus { amount }) => Ok(two_compartment::iv_bolus(
                t, params[0], params[1], params[2], params[3], *amount,
            )),
            (Model::TwoCompartmentOral, Dosing::Oral { amount }) => two_compartment::oral(
                t, params[0], params[1], params[2], params[3], params[4], *amount,
            ),
            (Model::IvInfusion, Dosing::Infusion { rate, duration }) => Ok(
                one_compartment::infusion(t, params[0], params[1], *rate, *duration),
            ),
            // check_dosing rules the remaining combinations out
            _ => Err(ModelError::IncompatibleDosing {
                model: *self,
                required: self.required_dosing(),
                given: dosing.kind(),
            }),
        }
    }

    /// ODE right-hand side over drug amounts
    ///
    /// `rateiv` is the infusion input rate at `t` (zero for other routes);
    /// boluses enter through [`Model::initial_state`], not the RHS.
    pub(crate) fn rhs(&self, x: &V, params: &[f64], _t: T, dx: &mut V, rateiv: f64) {
        match self {
            Model::OneCompartmentIv | Model::IvInfusion => {
                let k = params[0];
                dx[0] = -k * x[0] + rateiv;
            }
            Model::OneCompartmentOral => {
                let ka = params[0];
                let k = params[1];
                dx[0] = -ka * x[0];
                dx[1] = ka * x[0] - k * x[1] + rateiv;
            }
            Model::TwoCompartmentIv => {
                let (k10, k12, k21) =
                    two_compartment::micro_rates(params[0], params[1], params[2], params[3]);
                dx[0] = -(k10 + k12) * x[0] + k21 * x[1] + rateiv;
                dx[1] = k12 * x[0] - k21 * x[1];
            }
            Model::TwoCompartmentOral => {
                let ka = params[0];
                let (k10, k12, k21) =
                    two_compartment::micro_rates(params[1], params[2], params[3], params[4]);
                dx[0] = -ka * x[0];
                dx[1] = ka * x[0] - (k10 + k12) * x[1] + k21 * x[2] + rateiv;
                dx[2] = k12 * x[1] - k21 * x[2];
            }
        }
    }

    /// Initial amounts for the ODE representation
    pub(crate) fn initial_state(&self, dosing: &Dosing) -> V {
        let mut x = V::zeros(self.nstates());
        match (self, dosing) {
            (Model::OneCompartmentIv | Model::TwoCompartmentIv, Dosing::Bolus { amount }) => {
                x[0] = *amount;
            }
            (Model::OneCompartmentOral | Model::TwoCompartmentOral, Dosing::Oral { amount }) => {
                x[0] = *amount;
            }
            // infusion starts empty, input arrives through the RHS
            _ => {}
        }
        x
    }

    /// Map an ODE state to the observed concentration
    pub(crate) fn output(&self, x: &V, params: &[f64]) -> f64 {
        match self {
            Model::OneCompartmentIv | Model::IvInfusion => x[0] / params[1],
            Model::OneCompartmentOral => x[1] / params[2],
            Model::TwoCompartmentIv => x[0] / params[1],
            Model::TwoCompartmentOral => x[1] / params[2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dosing_validation() {
        assert!(Dosing::bolus(100.0).is_ok());
        assert!(matches!(
            Dosing::bolus(0.0),
            Err(ModelError::NonPositiveDose(_))
        ));
        assert!(matches!(
            Dosing::infusion(50.0, -1.0),
            Err(ModelError::InvalidInfusion { .. })
        ));
    }

    #[test]
    fn test_dosing_for_model() {
        let d = Dosing::for_model(Model::OneCompartmentOral, Some(100.0), None, None).unwrap();
        assert_eq!(d, Dosing::Oral { amount: 100.0 });

        assert!(matches!(
            Dosing::for_model(Model::OneCompartmentOral, None, None, None),
            Err(ModelError::MissingDoseContext { .. })
        ));
        assert!(matches!(
            Dosing::for_model(Model::IvInfusion, Some(100.0), Some(50.0), None),
            Err(ModelError::MissingDoseContext { .. })
        ));
    }

    #[test]
    fn test_incompatible_dosing_rejected() {
        let oral = Dosing::oral(100.0).unwrap();
        assert!(matches!(
            Model::OneCompartmentIv.concentration(1.0, &[0.2, 10.0], &oral),
            Err(ModelError::IncompatibleDosing { .. })
        ));
    }

    #[test]
    fn test_nonpositive_parameter_rejected() {
        let bolus = Dosing::bolus(100.0).unwrap();
        let err = Model::OneCompartmentIv
            .concentration(1.0, &[-0.2, 10.0], &bolus)
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::NonPositiveParameter { name: "k", .. }
        ));
    }

    #[test]
    fn test_parameter_count_rejected() {
        let bolus = Dosing::bolus(100.0).unwrap();
        assert!(matches!(
            Model::TwoCompartmentIv.concentration(1.0, &[0.2, 10.0], &bolus),
            Err(ModelError::ParameterCount {
                expected: 4,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_metadata_consistency() {
        for model in Model::ALL {
            assert_eq!(model.nparams(), model.parameter_names().len());
            assert!(model.nstates() >= 1);
        }
    }
}
